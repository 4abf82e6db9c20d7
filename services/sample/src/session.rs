//! One scripted run of the sample: observe, drive, report, clear

use crate::features::{COLOR_PICKER, INPUT};
use crate::protocol::{ColorPickerUiState, InputUiState, SampleSignal, SampleTransmission};
use crate::sample_router;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use transmission::{Router, RouterConfig};

/// What a session feeds into the router
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub inputs: Vec<String>,
    pub color: Option<usize>,
}

/// Run `script` against a fresh router and return the transmission log:
/// every signal sent, every effect and data item observed, handler
/// failures, and the final input and colour picker snapshots.
pub async fn run_session(config: RouterConfig, script: &Script) -> Result<Vec<String>> {
    let router = sample_router(config, false)?;
    let (log, mut lines) = mpsc::unbounded_channel();
    let observers = spawn_observers(&router, &log);
    router.initialize()?;
    info!(router_id = %router.instance_id(), "Sample session started");

    let signals = script
        .inputs
        .iter()
        .cloned()
        .map(SampleSignal::Input)
        .chain(script.color.map(SampleSignal::SelectColor));
    for signal in signals {
        let _ = log.send(format!("Signal: {signal:?}"));
        router.process_signal(signal)?;
        router.wait_processing_to_finish().await;
    }

    let requests = router.request_handler();
    let input = requests.get_data::<InputUiState>(INPUT).await;
    let picker = requests.get_data::<ColorPickerUiState>(COLOR_PICKER).await;
    let _ = log.send(format!("Current InputData: {input:?}"));
    let _ = log.send(format!("Current ColorPickerData: {picker:?}"));

    let stats = router.stats();
    info!(
        signals = stats.signals_processed,
        queries = stats.queries_relayed,
        failures = stats.handler_failures,
        lagged = stats.total_lagged(),
        "Sample session finished"
    );

    router.clear();
    drop(log);
    for observer in observers {
        if let Err(e) = observer.await {
            warn!(error = %e, "Observer ended abnormally");
        }
    }

    let mut collected = Vec::new();
    while let Some(line) = lines.recv().await {
        collected.push(line);
    }
    Ok(collected)
}

fn spawn_observers(
    router: &Router<SampleTransmission>,
    log: &mpsc::UnboundedSender<String>,
) -> Vec<JoinHandle<()>> {
    let mut data = router.data_stream();
    let data_log = log.clone();
    let data_observer = tokio::spawn(async move {
        while let Some(item) = data.recv().await {
            let _ = data_log.send(format!("Data: {item:?}"));
        }
    });

    let mut effects = router.effect_envelopes();
    let effect_log = log.clone();
    let effect_observer = tokio::spawn(async move {
        while let Some(envelope) = effects.recv().await {
            let line = match &envelope.receiver {
                Some(receiver) => format!("Effect: {:?} ({} -> {receiver})", envelope.effect, envelope.sender),
                None if envelope.is_router_only() => {
                    format!("Router Effect: {:?} (from {})", envelope.effect, envelope.sender)
                }
                None => format!("Effect: {:?} (from {})", envelope.effect, envelope.sender),
            };
            let _ = effect_log.send(line);
        }
    });

    let mut failures = router.failure_stream();
    let failure_log = log.clone();
    let failure_observer = tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            let _ = failure_log.send(format!(
                "Failure: {} {} handler: {}",
                failure.transformer, failure.kind, failure.message
            ));
        }
    });

    vec![data_observer, effect_observer, failure_observer]
}
