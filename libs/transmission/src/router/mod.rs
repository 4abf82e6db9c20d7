//! Router
//!
//! Owns the transformer set and the buses connecting it:
//!
//! | Bus      | Producers                  | Subscribers                          |
//! |----------|----------------------------|--------------------------------------|
//! | signal   | `process_signal`           | every transformer                    |
//! | data     | transformer holders        | external observers                   |
//! | effect   | transformer handlers       | every transformer, external observers|
//! | failure  | transformer handlers       | external observers                   |
//!
//! Queries are correlated traffic and stay off the buses. Every outgoing
//! query goes through a relay task that resolves "any holder" targets and
//! hands the query to the one transformer that should answer it. Results
//! come back on a single channel and are routed to the delegate of the
//! transformer (or router) that asked. Queries no transformer can take fall
//! back to the [`TestRegistry`] and otherwise answer `Missing` at once.
//!
//! # Lock Ordering
//!
//! The router's `state` is taken before any transformer lock. `initialize`
//! and `clear` hold it only while no task of this router can be waiting on it.

mod builder;
mod registry;

pub use builder::RouterBuilder;
pub use registry::TestRegistry;

use crate::bus::{Broadcast, BusSubscriber};
use crate::config::RouterConfig;
use crate::error::{Result, TransmissionError};
use crate::identifier::TransformerId;
use crate::message::{EffectEnvelope, HandlerFailure, Transmission};
use crate::metrics::{RouterMetrics, RouterStats};
use crate::query::{Query, QueryDelegate, QueryOutcome, QueryReply, QueryResult, QueryTarget, RequestHandler};
use crate::transformer::{TaskScope, Transformer, TransformerState};
use futures::stream::{self, Stream};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Router lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Constructed,
    Running,
    Cleared,
}

struct RouterInner<P: Transmission> {
    /// Instance id for correlating logs of one router
    instance: Uuid,
    id: TransformerId,
    config: RouterConfig,
    transformers: Vec<Transformer<P>>,
    signals: Broadcast<P::Signal>,
    data: Broadcast<P::Data>,
    effects: Broadcast<EffectEnvelope<P::Effect>>,
    failures: Broadcast<HandlerFailure>,
    relay_tx: mpsc::UnboundedSender<Query<P::Args>>,
    relay_rx: Mutex<Option<mpsc::UnboundedReceiver<Query<P::Args>>>>,
    results_tx: mpsc::UnboundedSender<QueryResult<P::Data>>,
    results_rx: Mutex<Option<mpsc::UnboundedReceiver<QueryResult<P::Data>>>>,
    stubs: TestRegistry<P>,
    delegate: Arc<QueryDelegate<P>>,
    tasks: TaskScope,
    state: RwLock<RouterState>,
    metrics: RouterMetrics,
}

/// Subscriptions taken for one transformer before any wiring starts
struct Subscriptions<P: Transmission> {
    signals: BusSubscriber<P::Signal>,
    effects: BusSubscriber<EffectEnvelope<P::Effect>>,
}

/// Owner of a transformer set and its buses. Dropping it clears it.
pub struct Router<P: Transmission> {
    inner: Arc<RouterInner<P>>,
}

impl<P: Transmission> fmt::Debug for Router<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("instance", &self.inner.instance)
            .field("state", &self.state())
            .field("transformers", &self.inner.transformers)
            .finish()
    }
}

impl<P: Transmission> Router<P> {
    /// Build and initialize a router with the default configuration
    pub fn new(transformers: impl IntoIterator<Item = Transformer<P>>) -> Result<Self> {
        RouterBuilder::new().add_transformers(transformers).build()
    }

    pub fn builder() -> RouterBuilder<P> {
        RouterBuilder::new()
    }

    pub(crate) fn construct(
        config: RouterConfig,
        transformers: Vec<Transformer<P>>,
        stubs: TestRegistry<P>,
    ) -> Self {
        let instance = Uuid::new_v4();
        let id = TransformerId::router();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let delegate = Arc::new(QueryDelegate::new(id.clone()));
        delegate.set_timeout(config.query_timeout());
        let buses = &config.buses;

        info!(
            router_id = %instance,
            transformers = transformers.len(),
            stubbed = !stubs.is_empty(),
            "Router constructed"
        );

        Self {
            inner: Arc::new(RouterInner {
                instance,
                signals: Broadcast::new("signals", buses.signal_capacity),
                data: Broadcast::new("data", buses.data_capacity),
                effects: Broadcast::new("effects", buses.effect_capacity),
                failures: Broadcast::new("failures", buses.failure_capacity),
                relay_tx,
                relay_rx: Mutex::new(Some(relay_rx)),
                results_tx,
                results_rx: Mutex::new(Some(results_rx)),
                stubs,
                delegate,
                tasks: TaskScope::new(TransmissionError::RouterCleared),
                state: RwLock::new(RouterState::Constructed),
                metrics: RouterMetrics::default(),
                transformers,
                config,
                id,
            }),
        }
    }

    /// Wire every transformer to every bus and start the relay.
    ///
    /// Subscriptions are in place when this returns, so any signal processed
    /// afterwards reaches every transformer. Idempotent while running.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        match *state {
            RouterState::Running => return Ok(()),
            RouterState::Cleared => return Err(TransmissionError::RouterCleared),
            RouterState::Constructed => {}
        }
        tokio::runtime::Handle::try_current()
            .map_err(|e| TransmissionError::NoRuntime(e.to_string()))?;

        if let Err(e) = self.inner.wire() {
            drop(state);
            warn!(router_id = %self.inner.instance, error = %e, "Router initialization failed");
            self.clear();
            return Err(e);
        }
        *state = RouterState::Running;
        info!(
            router_id = %self.inner.instance,
            transformers = self.inner.transformers.len(),
            "Router initialized"
        );
        Ok(())
    }

    /// Broadcast a signal to every transformer
    pub fn process_signal(&self, signal: P::Signal) -> Result<()> {
        match self.state() {
            RouterState::Constructed => return Err(TransmissionError::RouterNotRunning),
            RouterState::Cleared => return Err(TransmissionError::RouterCleared),
            RouterState::Running => {}
        }
        debug!(router_id = %self.inner.instance, ?signal, "Processing signal");
        self.inner.signals.send(signal)?;
        self.inner.metrics.record_signal();
        Ok(())
    }

    /// Every data item published from now on
    pub fn data_stream(&self) -> BusSubscriber<P::Data> {
        self.inner.data.subscribe()
    }

    /// Every effect sent from now on, addressed and router-only included
    pub fn effect_stream(&self) -> EffectStream<P::Effect> {
        EffectStream {
            envelopes: self.inner.effects.subscribe(),
        }
    }

    /// Like [`effect_stream`](Self::effect_stream) but with sender and addressing
    pub fn effect_envelopes(&self) -> BusSubscriber<EffectEnvelope<P::Effect>> {
        self.inner.effects.subscribe()
    }

    /// Handler errors and panics from every transformer
    pub fn failure_stream(&self) -> BusSubscriber<HandlerFailure> {
        self.inner.failures.subscribe()
    }

    /// Request handler owned by the router, for querying any transformer
    pub fn request_handler(&self) -> RequestHandler<P> {
        RequestHandler::new(self.inner.delegate.clone())
    }

    pub fn transformer(&self, id: impl AsRef<str>) -> Option<&Transformer<P>> {
        self.inner.find(id.as_ref())
    }

    pub fn transformers(&self) -> &[Transformer<P>] {
        &self.inner.transformers
    }

    pub fn state(&self) -> RouterState {
        *self.inner.state.read()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn instance_id(&self) -> Uuid {
        self.inner.instance
    }

    pub fn stats(&self) -> RouterStats {
        let inner = &self.inner;
        RouterStats {
            state: self.state(),
            transformers: inner.transformers.len(),
            signals_processed: inner.metrics.signals_processed.load(Ordering::Relaxed),
            queries_relayed: inner.metrics.queries_relayed.load(Ordering::Relaxed),
            queries_unresolved: inner.metrics.queries_unresolved.load(Ordering::Relaxed),
            handler_failures: inner
                .transformers
                .iter()
                .map(|transformer| transformer.failures_reported())
                .sum(),
            signal_bus: inner.signals.stats(),
            data_bus: inner.data.stats(),
            effect_bus: inner.effects.stats(),
            failure_bus: inner.failures.stats(),
        }
    }

    /// Wait until no transformer has pending input or running handlers
    pub async fn wait_processing_to_finish(&self) {
        loop {
            for transformer in &self.inner.transformers {
                transformer.wait_processing_to_finish().await;
            }
            // Work finishing late in one transformer may have fed an earlier one
            if self.inner.transformers.iter().all(|t| t.is_idle()) {
                return;
            }
        }
    }

    /// Tear down every transformer, then the router's own tasks, then close
    /// all buses so external streams end. Idempotent.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.write();
            if *state == RouterState::Cleared {
                return;
            }
            *state = RouterState::Cleared;
        }
        let inner = &self.inner;
        for transformer in &inner.transformers {
            transformer.clear();
        }
        inner.delegate.clear();
        let aborted = inner.tasks.cancel();
        inner.signals.close();
        inner.data.close();
        inner.effects.close();
        inner.failures.close();
        info!(router_id = %inner.instance, aborted_tasks = aborted, "Router cleared");
    }
}

impl<P: Transmission> Drop for Router<P> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<P: Transmission> RouterInner<P> {
    fn find(&self, id: &str) -> Option<&Transformer<P>> {
        self.transformers
            .iter()
            .find(|transformer| transformer.id().as_str() == id)
    }

    fn wire(self: &Arc<Self>) -> Result<()> {
        // Subscribe everyone before any outlet flushes its buffer
        let mut subscriptions = Vec::with_capacity(self.transformers.len());
        for transformer in &self.transformers {
            let mode = self
                .config
                .dispatch_mode_for(transformer.id(), transformer.explicit_dispatch_mode());
            transformer.apply_dispatch_mode(mode);
            if let Some(timeout) = self.config.query_timeout() {
                transformer.set_query_timeout(Some(timeout));
            }
            subscriptions.push(Subscriptions::<P> {
                signals: self.signals.subscribe(),
                effects: self.effects.subscribe(),
            });
        }

        let mut relay = self
            .relay_rx
            .lock()
            .take()
            .ok_or(TransmissionError::RouterCleared)?;
        let inner = self.clone();
        self.tasks.spawn(async move {
            while let Some(query) = relay.recv().await {
                inner.relay(query);
            }
        })?;

        let mut results = self
            .results_rx
            .lock()
            .take()
            .ok_or(TransmissionError::RouterCleared)?;
        let inner = self.clone();
        self.tasks.spawn(async move {
            while let Some(result) = results.recv().await {
                inner.route_result(result);
            }
        })?;
        self.delegate.outgoing().attach(self.relay_tx.clone())?;

        for (transformer, subscriptions) in self.transformers.iter().zip(subscriptions) {
            transformer.attach_failure_reporting(self.failures.producer())?;
            transformer.start_query_processing(self.relay_tx.clone())?;
            transformer.start_effect_processing(self.effects.producer(), subscriptions.effects)?;
            transformer.start_signal_collection(subscriptions.signals)?;
            transformer.start_data_publishing(self.data.producer())?;
            debug!(
                router_id = %self.instance,
                transformer = %transformer.id(),
                dispatch_mode = ?transformer.dispatch_mode(),
                "Transformer wired"
            );
        }
        Ok(())
    }

    fn relay(&self, query: Query<P::Args>) {
        self.metrics.record_relayed();
        let reply = QueryReply::new(&query, self.results_tx.clone());
        let target = match &query.target {
            QueryTarget::Transformer(id) => self
                .find(id.as_str())
                .filter(|transformer| transformer.state() != TransformerState::Cleared),
            QueryTarget::AnyHolder => self
                .transformers
                .iter()
                .find(|transformer| transformer.answers(&query.request)),
        };

        if let Some(transformer) = target {
            debug!(
                router_id = %self.instance,
                token = %query.token,
                sender = %query.sender,
                target = %transformer.id(),
                "Query relayed"
            );
            let query = Query {
                target: QueryTarget::Transformer(transformer.id().clone()),
                ..query
            };
            if let Err(e) = transformer.deliver_query(query, reply) {
                // The dropped reply has already answered Missing
                self.metrics.record_unresolved();
                debug!(router_id = %self.instance, error = %e, "Query target went away");
            }
            return;
        }

        if let Some(outcome) = self.stubs.answer(&query) {
            debug!(
                router_id = %self.instance,
                token = %query.token,
                sender = %query.sender,
                request = query.request.name(),
                "Query answered from test registry"
            );
            reply.send(outcome);
            return;
        }

        self.metrics.record_unresolved();
        debug!(
            router_id = %self.instance,
            token = %query.token,
            sender = %query.sender,
            request = query.request.name(),
            "No transformer can answer query"
        );
        reply.send(QueryOutcome::Missing);
    }

    /// Hand a result to the delegate of whoever asked
    fn route_result(&self, result: QueryResult<P::Data>) {
        if result.owner == self.id {
            self.delegate.resolve(result);
            return;
        }
        match self.find(result.owner.as_str()) {
            Some(transformer) => transformer.resolve_query(result),
            None => {
                warn!(
                    router_id = %self.instance,
                    token = %result.token,
                    owner = %result.owner,
                    "Query result for unknown owner"
                );
            }
        }
    }
}

/// Effects observed by the router, without their envelopes
pub struct EffectStream<E> {
    envelopes: BusSubscriber<EffectEnvelope<E>>,
}

impl<E: Clone + Send + Sync + 'static> EffectStream<E> {
    pub async fn recv(&mut self) -> Option<E> {
        self.envelopes.recv().await.map(|envelope| envelope.effect)
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.envelopes.try_recv().map(|envelope| envelope.effect)
    }

    pub fn into_stream(self) -> impl Stream<Item = E> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut effects| async move {
            effects.recv().await.map(|effect| (effect, effects))
        }))
    }
}
