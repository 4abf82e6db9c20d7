//! Router integration tests: wiring, effect delivery rules, lifecycle.

mod common;

use common::*;
use std::time::Duration;
use transmission::{
    DispatchMode, Router, RouterBuilder, RouterConfig, RouterState, TransformerState,
    TransmissionError,
};

#[tokio::test]
async fn test_empty_transformer_set_is_rejected() {
    init_tracing();
    let result = Router::<TestTransmission>::new(Vec::new());
    assert!(matches!(result, Err(TransmissionError::EmptyTransformerSet)));
}

#[tokio::test]
async fn test_duplicate_and_reserved_ids_are_rejected() {
    let result = Router::new([signal_counter("same"), signal_counter("same")]);
    assert!(matches!(result, Err(TransmissionError::DuplicateTransformer(ref id)) if id.as_str() == "same"));

    let result = Router::new([signal_counter("transmission-router")]);
    assert!(matches!(result, Err(TransmissionError::ReservedIdentifier(_))));
}

#[tokio::test]
async fn test_transformer_cannot_join_two_routers() {
    let shared = signal_counter("shared");
    let _first = Router::new([shared.clone()]).unwrap();
    let second = Router::new([shared]);
    assert!(matches!(second, Err(TransmissionError::Configuration { .. })));
}

#[test]
fn test_initialize_requires_runtime() {
    let result = Router::new([signal_counter("lonely")]);
    assert!(matches!(result, Err(TransmissionError::NoRuntime(_))));
}

#[tokio::test]
async fn test_input_is_mirrored_into_output() {
    init_tracing();
    let router = RouterBuilder::new()
        .add_transformer(input_transformer())
        .add_transformer(output_transformer())
        .auto_initialize(false)
        .build()
        .unwrap();
    let mut data = router.data_stream();
    router.initialize().unwrap();
    router.initialize().unwrap();

    router.process_signal(TestSignal::Text("hi".into())).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(next(&mut data).await);
    }
    assert_eq!(
        seen,
        vec![
            TestData::Text(Text(String::new())),
            TestData::Mirror(Mirror(String::new())),
            TestData::Text(Text("hi".into())),
            TestData::Mirror(Mirror("hi".into())),
        ]
    );

    router.wait_processing_to_finish().await;
    assert_eq!(data.try_recv(), None);
}

#[tokio::test]
async fn test_addressed_effect_triggers_query_back_to_sender() {
    let a = TestTransformer::new("a");
    let text = a.data_holder(Text::default(), true).unwrap();
    a.on_signal(move |scope, signal| {
        let text = text.clone();
        async move {
            if let TestSignal::Text(value) = signal {
                text.set(Text(value.clone()));
                scope.send_effect(TestEffect::Marker(value), "b")?;
            }
            Ok(())
        }
    });

    let b = TestTransformer::new("b");
    let mirror = b.data_holder(Mirror::default(), true).unwrap();
    b.on_effect(move |scope, _| {
        let mirror = mirror.clone();
        async move {
            let Some(Text(value)) = scope.query_data::<Text>("a").await else {
                anyhow::bail!("a holds no text");
            };
            mirror.set(Mirror(value));
            Ok(())
        }
    });

    let router = RouterBuilder::new()
        .add_transformers([a, b, effect_counter("c")])
        .auto_initialize(false)
        .build()
        .unwrap();
    let mut data = router.data_stream();
    router.initialize().unwrap();

    router.process_signal(TestSignal::Text("hi".into())).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(next(&mut data).await);
    }
    assert_eq!(
        seen,
        vec![
            TestData::Text(Text(String::new())),
            TestData::Mirror(Mirror(String::new())),
            TestData::Text(Text("hi".into())),
            TestData::Mirror(Mirror("hi".into())),
        ]
    );

    router.wait_processing_to_finish().await;
    assert_eq!(
        router.request_handler().get_data::<Counter>("c").await,
        Some(Counter(0))
    );
    assert_eq!(router.stats().handler_failures, 0);
}

#[tokio::test]
async fn test_signal_reaches_every_transformer() {
    let router = Router::new([
        signal_counter("a"),
        signal_counter("b"),
        signal_counter("c"),
    ])
    .unwrap();

    for _ in 0..5 {
        router.process_signal(TestSignal::Poke).unwrap();
    }
    router.wait_processing_to_finish().await;

    let requests = router.request_handler();
    for id in ["a", "b", "c"] {
        assert_eq!(requests.get_data::<Counter>(id).await, Some(Counter(5)));
    }
    assert_eq!(router.stats().signals_processed, 5);
}

#[tokio::test]
async fn test_addressed_effect_reaches_only_its_receiver() {
    let sender = TestTransformer::new("sender");
    sender.on_signal(|scope, _| async move {
        scope.send_effect(TestEffect::Marker("for c".into()), "c")?;
        Ok(())
    });
    let router = Router::new([sender, effect_counter("b"), effect_counter("c")]).unwrap();
    let mut envelopes = router.effect_envelopes();

    router.process_signal(TestSignal::Poke).unwrap();
    router.wait_processing_to_finish().await;

    let requests = router.request_handler();
    assert_eq!(requests.get_data::<Counter>("b").await, Some(Counter(0)));
    assert_eq!(requests.get_data::<Counter>("c").await, Some(Counter(1)));

    let envelope = next(&mut envelopes).await;
    assert_eq!(envelope.sender.as_str(), "sender");
    assert_eq!(envelope.receiver.as_ref().map(|id| id.as_str()), Some("c"));
}

#[tokio::test]
async fn test_router_only_effects_skip_transformers() {
    let sender = TestTransformer::new("sender");
    sender.on_signal(|scope, _| async move {
        scope.publish_to_router(TestEffect::Echo("flagged".into()))?;
        scope.publish(TestEffect::Toast("typed".into()))?;
        Ok(())
    });
    let router = Router::new([sender, effect_counter("listener")]).unwrap();
    let mut effects = router.effect_stream();

    router.process_signal(TestSignal::Poke).unwrap();
    router.wait_processing_to_finish().await;

    assert_eq!(
        tokio::time::timeout(WAIT, effects.recv()).await.unwrap(),
        Some(TestEffect::Echo("flagged".into()))
    );
    assert_eq!(
        tokio::time::timeout(WAIT, effects.recv()).await.unwrap(),
        Some(TestEffect::Toast("typed".into()))
    );
    assert_eq!(
        router.request_handler().get_data::<Counter>("listener").await,
        Some(Counter(0))
    );
}

#[tokio::test]
async fn test_broadcast_effect_reaches_sender_too() {
    let echo = effect_counter("echo");
    echo.on_signal(|scope, _| async move {
        scope.publish(TestEffect::Marker("all".into()))?;
        Ok(())
    });
    let router = Router::new([echo, effect_counter("other")]).unwrap();

    router.process_signal(TestSignal::Poke).unwrap();
    router.wait_processing_to_finish().await;

    let requests = router.request_handler();
    assert_eq!(requests.get_data::<Counter>("echo").await, Some(Counter(1)));
    assert_eq!(requests.get_data::<Counter>("other").await, Some(Counter(1)));
}

#[tokio::test]
async fn test_handler_sends_data_without_a_holder() {
    let reporter = TestTransformer::new("reporter");
    reporter.on_signal(|scope, signal| async move {
        if let TestSignal::Step(n) = signal {
            scope.send_data(Product(u64::from(n)))?;
            scope.publish_to_router(TestEffect::Marker(format!("after {n}")))?;
        }
        Ok(())
    });
    let router = Router::new([reporter]).unwrap();
    let mut data = router.data_stream();
    let mut effects = router.effect_stream();

    router.process_signal(TestSignal::Step(3)).unwrap();

    assert_eq!(next(&mut data).await, TestData::Product(Product(3)));
    assert_eq!(
        tokio::time::timeout(WAIT, effects.recv()).await.unwrap(),
        Some(TestEffect::Marker("after 3".into()))
    );
    // Sent data is not held; queries for it miss
    assert_eq!(router.request_handler().get_data::<Product>("reporter").await, None);
}

#[tokio::test]
async fn test_late_subscriber_sees_only_new_data_but_queries_see_latest() {
    let router = Router::new([input_transformer()]).unwrap();
    router.process_signal(TestSignal::Text("first".into())).unwrap();
    router.wait_processing_to_finish().await;

    let mut late = router.data_stream();
    assert_eq!(late.try_recv(), None);
    assert_eq!(
        router.request_handler().get_data::<Text>("input").await,
        Some(Text("first".into()))
    );

    router.process_signal(TestSignal::Text("second".into())).unwrap();
    assert_eq!(next(&mut late).await, TestData::Text(Text("second".into())));
}

#[tokio::test]
async fn test_sequential_mode_handles_one_message_at_a_time() {
    let journal_owner = TestTransformer::new("journal").with_dispatch_mode(DispatchMode::Sequential);
    let journal = journal_owner.data_holder(Journal::default(), false).unwrap();
    journal_owner.on_signal(move |_, signal| {
        let journal = journal.clone();
        async move {
            if let TestSignal::Step(n) = signal {
                // Earlier steps sleep longer; only one-at-a-time keeps them ordered
                tokio::time::sleep(Duration::from_millis(u64::from(5 - n) * 10)).await;
                journal.update(|j| {
                    let mut steps = j.0.clone();
                    steps.push(n);
                    Journal(steps)
                });
            }
            Ok(())
        }
    });
    let router = Router::new([journal_owner]).unwrap();

    for n in 0..5 {
        router.process_signal(TestSignal::Step(n)).unwrap();
    }
    router.wait_processing_to_finish().await;

    assert_eq!(
        router.request_handler().get_data::<Journal>("journal").await,
        Some(Journal(vec![0, 1, 2, 3, 4]))
    );
}

#[tokio::test]
async fn test_config_override_wins_over_explicit_mode() {
    let pinned = signal_counter("pinned").with_dispatch_mode(DispatchMode::Concurrent);
    let defaulted = signal_counter("defaulted");
    let explicit = signal_counter("explicit").with_dispatch_mode(DispatchMode::Concurrent);
    let config = RouterConfig::default()
        .with_default_mode(DispatchMode::Sequential)
        .with_override("pinned", DispatchMode::Sequential);

    let router = Router::builder()
        .with_config(config)
        .add_transformers([pinned, defaulted, explicit])
        .build()
        .unwrap();

    let mode = |id: &str| router.transformer(id).unwrap().dispatch_mode();
    assert_eq!(mode("pinned"), DispatchMode::Sequential);
    assert_eq!(mode("defaulted"), DispatchMode::Sequential);
    assert_eq!(mode("explicit"), DispatchMode::Concurrent);
}

#[tokio::test]
async fn test_signal_before_initialize_is_rejected() {
    let router = RouterBuilder::new()
        .add_transformer(signal_counter("idle"))
        .auto_initialize(false)
        .build()
        .unwrap();
    assert_eq!(router.state(), RouterState::Constructed);
    assert_eq!(
        router.process_signal(TestSignal::Poke),
        Err(TransmissionError::RouterNotRunning)
    );
}

#[tokio::test]
async fn test_clear_is_idempotent_and_ends_streams() {
    let router = Router::new([input_transformer(), output_transformer()]).unwrap();
    let mut data = router.data_stream();
    let mut effects = router.effect_stream();
    let mut failures = router.failure_stream();
    let requests = router.request_handler();

    router.clear();
    router.clear();

    assert_eq!(router.state(), RouterState::Cleared);
    assert!(router
        .transformers()
        .iter()
        .all(|transformer| transformer.state() == TransformerState::Cleared));
    assert_eq!(
        router.process_signal(TestSignal::Poke),
        Err(TransmissionError::RouterCleared)
    );
    assert_eq!(router.initialize(), Err(TransmissionError::RouterCleared));

    assert_eq!(tokio::time::timeout(WAIT, data.recv()).await.unwrap(), None);
    assert_eq!(tokio::time::timeout(WAIT, effects.recv()).await.unwrap(), None);
    assert_eq!(tokio::time::timeout(WAIT, failures.recv()).await.unwrap(), None);
    assert_eq!(requests.get_data::<Text>("input").await, None);

    // Returns at once for a cleared router
    tokio::time::timeout(WAIT, router.wait_processing_to_finish())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_clearing_one_router_leaves_another_running() {
    let first = Router::new([input_transformer()]).unwrap();
    let second = Router::new([input_transformer(), output_transformer()]).unwrap();
    let mut data = second.data_stream();

    first.clear();
    second.process_signal(TestSignal::Text("alive".into())).unwrap();

    assert_eq!(next(&mut data).await, TestData::Text(Text("alive".into())));
    assert_eq!(next(&mut data).await, TestData::Mirror(Mirror("alive".into())));
    assert_eq!(second.state(), RouterState::Running);
}

#[tokio::test]
async fn test_dropping_router_clears_transformers() {
    let input = input_transformer();
    let handle = input.clone();
    {
        let router = Router::new([input]).unwrap();
        assert_eq!(router.state(), RouterState::Running);
        assert_eq!(handle.state(), TransformerState::Running);
    }
    assert_eq!(handle.state(), TransformerState::Cleared);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_on_multi_thread_runtime() {
    let ids: Vec<String> = (0..8).map(|i| format!("counter-{i}")).collect();
    let router = Router::new(ids.iter().map(|id| signal_counter(id))).unwrap();

    for _ in 0..50 {
        router.process_signal(TestSignal::Poke).unwrap();
    }
    router.wait_processing_to_finish().await;

    let requests = router.request_handler();
    for id in &ids {
        assert_eq!(requests.get_data::<Counter>(id.as_str()).await, Some(Counter(50)));
    }
    let stats = router.stats();
    assert_eq!(stats.transformers, 8);
    assert_eq!(stats.total_lagged(), 0);
}
