//! Common test utilities for router and bus tests
//!
//! Provides a small message family and the transformers most suites share.

#![allow(dead_code)]

use std::time::Duration;
use transmission::{
    transmission_data, BusSubscriber, Effect, Signal, Transformer, Transmission,
};

/// Upper bound for any single wait in a test
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum TestSignal {
    Text(String),
    Step(u32),
    Poke,
    Fail,
    Panic,
}

impl Signal for TestSignal {}

#[derive(Debug, Clone, PartialEq)]
pub enum TestEffect {
    Echo(String),
    Marker(String),
    /// Router-only by type
    Toast(String),
}

impl Effect for TestEffect {
    fn is_router_only(&self) -> bool {
        matches!(self, TestEffect::Toast(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Text(pub String);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mirror(pub String);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Counter(pub u32);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Journal(pub Vec<u32>);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Product(pub u64);

transmission_data! {
    #[derive(Debug, Clone, PartialEq)]
    pub enum TestData {
        Text(Text),
        Mirror(Mirror),
        Counter(Counter),
        Journal(Journal),
        Product(Product),
    }
}

pub struct TestTransmission;

impl Transmission for TestTransmission {
    type Signal = TestSignal;
    type Effect = TestEffect;
    type Data = TestData;
    type Args = u64;
}

pub type TestTransformer = Transformer<TestTransmission>;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Next item from a bus, failing the test after [`WAIT`]
pub async fn next<T: Clone + Send + 'static>(subscriber: &mut BusSubscriber<T>) -> T {
    tokio::time::timeout(WAIT, subscriber.recv())
        .await
        .expect("timed out waiting for bus item")
        .expect("bus closed")
}

/// Stores typed text and broadcasts it as an `Echo` effect
pub fn input_transformer() -> TestTransformer {
    let transformer = TestTransformer::new("input");
    let text = transformer
        .data_holder(Text::default(), true)
        .expect("fresh transformer");
    transformer.on_signal(move |scope, signal| {
        let text = text.clone();
        async move {
            if let TestSignal::Text(value) = signal {
                text.set(Text(value.clone()));
                scope.publish(TestEffect::Echo(value))?;
            }
            Ok(())
        }
    });
    transformer
}

/// Mirrors every `Echo` it receives
pub fn output_transformer() -> TestTransformer {
    let transformer = TestTransformer::new("output");
    let mirror = transformer
        .data_holder(Mirror::default(), true)
        .expect("fresh transformer");
    transformer.on_effect(move |_, effect| {
        let mirror = mirror.clone();
        async move {
            if let TestEffect::Echo(value) = effect {
                mirror.set(Mirror(value));
            }
            Ok(())
        }
    });
    transformer
}

/// Counts every effect its handler runs for, in a query-only holder
pub fn effect_counter(id: &str) -> TestTransformer {
    let transformer = TestTransformer::new(id);
    let counter = transformer
        .data_holder(Counter::default(), false)
        .expect("fresh transformer");
    transformer.on_effect(move |_, _| {
        let counter = counter.clone();
        async move {
            counter.update(|c| Counter(c.0 + 1));
            Ok(())
        }
    });
    transformer
}

/// Counts `Poke` signals, in a query-only holder
pub fn signal_counter(id: &str) -> TestTransformer {
    let transformer = TestTransformer::new(id);
    let counter = transformer
        .data_holder(Counter::default(), false)
        .expect("fresh transformer");
    transformer.on_signal(move |_, signal| {
        let counter = counter.clone();
        async move {
            if signal == TestSignal::Poke {
                counter.update(|c| Counter(c.0 + 1));
            }
            Ok(())
        }
    });
    transformer
}
