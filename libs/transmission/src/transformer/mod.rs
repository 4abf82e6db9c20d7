//! Transformer Runtime
//!
//! A transformer is an independently scheduled processing unit. It owns its
//! data holders, computation registry, handlers and query delegate, and is
//! wired to the router's buses by the router during initialization.
//!
//! ## Lifecycle
//!
//! `Constructed → Running → Cleared`. Holders, computations and handlers are
//! set up while constructed; anything emitted before wiring is buffered and
//! flushed in order once the router attaches the outgoing paths. Clearing is
//! terminal and idempotent.
//!
//! ## Dispatch
//!
//! In [`DispatchMode::Concurrent`] every signal and effect gets its own task.
//! In [`DispatchMode::Sequential`] a single worker drains a mailbox shared by
//! signals and effects. Handler errors and panics are caught per invocation,
//! logged, and reported on the router's failure stream; the transformer
//! keeps running.
//!
//! # Lock Ordering
//!
//! 1. `state`
//! 2. storage holders, then a holder's value
//! 3. outlets
//! 4. bus sender slots

mod dispatch;
mod handler;
mod scope;

pub use dispatch::DispatchMode;
pub use handler::{EffectHandler, SignalHandler};
pub use scope::CommunicationScope;

pub(crate) use dispatch::TaskScope;

use crate::bus::{BusProducer, BusSubscriber};
use crate::computation::{ComputationEntry, ComputationFn, ExecutionEntry, ExecutionFn};
use crate::error::{Result, TransmissionError};
use crate::holder::DataHolder;
use crate::identifier::TransformerId;
use crate::message::{
    DataVariant, EffectEnvelope, ExecutionKey, FailureKind, HandlerFailure, Transmission,
};
use crate::outlet::Outlet;
use crate::query::{Query, QueryDelegate, QueryOutcome, QueryReply, QueryRequest, QueryResult, RequestHandler};
use crate::storage::TransformerStorage;
use dispatch::{InFlight, Intake, ProcessingTracker};
use futures::FutureExt;
use handler::{FnEffectHandler, FnSignalHandler};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Transformer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerState {
    Constructed,
    Running,
    Cleared,
}

enum Inbound<P: Transmission> {
    Signal(P::Signal),
    Effect(P::Effect),
}

struct Mail<P: Transmission> {
    inbound: Inbound<P>,
    _in_flight: InFlight,
}

/// A query handed to this transformer, counted as in flight until answered
struct QueryMail<P: Transmission> {
    query: Query<P::Args>,
    reply: QueryReply<P::Data>,
    _in_flight: InFlight,
}

struct Modes {
    explicit: Option<DispatchMode>,
    effective: DispatchMode,
}

struct TransformerInner<P: Transmission> {
    id: TransformerId,
    state: RwLock<TransformerState>,
    modes: Mutex<Modes>,
    storage: TransformerStorage<P>,
    signal_handler: RwLock<Option<Arc<dyn SignalHandler<P>>>>,
    effect_handler: RwLock<Option<Arc<dyn EffectHandler<P>>>>,
    data: Arc<Outlet<P::Data>>,
    effects: Arc<Outlet<EffectEnvelope<P::Effect>>>,
    failures: Outlet<HandlerFailure>,
    delegate: Arc<QueryDelegate<P>>,
    tasks: TaskScope,
    tracker: Arc<ProcessingTracker>,
    mailbox: Mutex<Option<mpsc::UnboundedSender<Mail<P>>>>,
    /// Open from construction so queries relayed before wiring wait in line
    query_inbox: Mutex<Option<mpsc::UnboundedSender<QueryMail<P>>>>,
    query_mail: Mutex<Option<mpsc::UnboundedReceiver<QueryMail<P>>>>,
    failures_reported: AtomicU64,
}

/// Handle to a transformer; clones share the same transformer
pub struct Transformer<P: Transmission> {
    inner: Arc<TransformerInner<P>>,
}

impl<P: Transmission> Clone for Transformer<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Transmission> fmt::Debug for Transformer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("dispatch_mode", &self.dispatch_mode())
            .finish()
    }
}

impl<P: Transmission> Transformer<P> {
    pub fn new(id: impl Into<TransformerId>) -> Self {
        let id = id.into();
        let (query_inbox, query_mail) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(TransformerInner {
                state: RwLock::new(TransformerState::Constructed),
                modes: Mutex::new(Modes {
                    explicit: None,
                    effective: DispatchMode::default(),
                }),
                storage: TransformerStorage::new(id.clone()),
                signal_handler: RwLock::new(None),
                effect_handler: RwLock::new(None),
                data: Arc::new(Outlet::new("data")),
                effects: Arc::new(Outlet::new("effects")),
                failures: Outlet::new("failures"),
                delegate: Arc::new(QueryDelegate::new(id.clone())),
                tasks: TaskScope::new(TransmissionError::TransformerCleared(id.clone())),
                tracker: Arc::new(ProcessingTracker::new()),
                mailbox: Mutex::new(None),
                query_inbox: Mutex::new(Some(query_inbox)),
                query_mail: Mutex::new(Some(query_mail)),
                failures_reported: AtomicU64::new(0),
                id,
            }),
        }
    }

    /// Pin the dispatch mode; the router default no longer applies
    pub fn with_dispatch_mode(self, mode: DispatchMode) -> Self {
        {
            let mut modes = self.inner.modes.lock();
            modes.explicit = Some(mode);
            modes.effective = mode;
        }
        self
    }

    pub fn id(&self) -> &TransformerId {
        &self.inner.id
    }

    pub fn state(&self) -> TransformerState {
        *self.inner.state.read()
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.dispatch_mode()
    }

    pub fn explicit_dispatch_mode(&self) -> Option<DispatchMode> {
        self.inner.modes.lock().explicit
    }

    pub(crate) fn apply_dispatch_mode(&self, mode: DispatchMode) {
        self.inner.modes.lock().effective = mode;
    }

    /// Create the holder for data variant `T`.
    ///
    /// With `publish`, the initial value and every update go out on the data
    /// stream; otherwise the holder only answers queries.
    pub fn data_holder<T: DataVariant<P::Data>>(
        &self,
        initial: T,
        publish: bool,
    ) -> Result<DataHolder<P, T>> {
        self.inner.ensure_active()?;
        let owner = self.inner.id.clone();
        let outlet = self.inner.data.clone();
        self.inner.storage.insert_holder_with(T::KEY, move || {
            let holder = DataHolder::<P, T>::new(owner, initial, publish, outlet);
            let source = holder.source();
            (holder, source)
        })
    }

    pub fn register_computation<R, F, Fut>(&self, use_cache: bool, f: F) -> Result<()>
    where
        R: DataVariant<P::Data>,
        F: Fn(RequestHandler<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<R>>> + Send + 'static,
    {
        self.inner.ensure_active()?;
        let body: ComputationFn<P> = Arc::new(move |requests: RequestHandler<P>, _args: Option<P::Args>| {
            let computed = f(requests);
            async move {
                let value: Option<R> = computed.await?;
                Ok::<_, anyhow::Error>(value.map(R::into_data))
            }
            .boxed()
        });
        self.inner
            .storage
            .registry()
            .register_computation(R::KEY, use_cache, body)?;
        debug!(transformer = %self.inner.id, computation = %R::KEY, use_cache, "Computation registered");
        Ok(())
    }

    pub fn register_computation_with_args<R, F, Fut>(&self, use_cache: bool, f: F) -> Result<()>
    where
        R: DataVariant<P::Data>,
        F: Fn(RequestHandler<P>, P::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<R>>> + Send + 'static,
    {
        self.inner.ensure_active()?;
        let key = R::KEY;
        let body: ComputationFn<P> =
            Arc::new(move |requests: RequestHandler<P>, args: Option<P::Args>| match args {
                Some(args) => {
                    let computed = f(requests, args);
                    async move {
                        let value: Option<R> = computed.await?;
                        Ok::<_, anyhow::Error>(value.map(R::into_data))
                    }
                    .boxed()
                }
                None => async move {
                    Err::<Option<P::Data>, _>(anyhow::anyhow!(
                        "computation '{key}' requires arguments"
                    ))
                }
                .boxed(),
            });
        self.inner
            .storage
            .registry()
            .register_computation(key, use_cache, body)?;
        debug!(transformer = %self.inner.id, computation = %key, use_cache, "Computation with args registered");
        Ok(())
    }

    pub fn register_execution<F, Fut>(&self, key: ExecutionKey, f: F) -> Result<()>
    where
        F: Fn(RequestHandler<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.ensure_active()?;
        let body: ExecutionFn<P> =
            Arc::new(move |requests: RequestHandler<P>, _args: Option<P::Args>| f(requests).boxed());
        self.inner.storage.registry().register_execution(key, body)?;
        debug!(transformer = %self.inner.id, execution = %key, "Execution registered");
        Ok(())
    }

    pub fn register_execution_with_args<F, Fut>(&self, key: ExecutionKey, f: F) -> Result<()>
    where
        F: Fn(RequestHandler<P>, P::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.ensure_active()?;
        let body: ExecutionFn<P> =
            Arc::new(move |requests: RequestHandler<P>, args: Option<P::Args>| match args {
                Some(args) => f(requests, args).boxed(),
                None => async move {
                    Err::<(), _>(anyhow::anyhow!("execution '{key}' requires arguments"))
                }
                .boxed(),
            });
        self.inner.storage.registry().register_execution(key, body)?;
        debug!(transformer = %self.inner.id, execution = %key, "Execution with args registered");
        Ok(())
    }

    /// Registered computation producing `R`, for inspection
    pub fn computation<R: DataVariant<P::Data>>(&self) -> Option<Arc<ComputationEntry<P>>> {
        self.inner.storage.registry().computation(R::KEY)
    }

    pub fn execution(&self, key: ExecutionKey) -> Option<Arc<ExecutionEntry<P>>> {
        self.inner.storage.registry().execution(key)
    }

    pub fn on_signal<F, Fut>(&self, f: F)
    where
        F: Fn(CommunicationScope<P>, P::Signal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.set_signal_handler(Arc::new(FnSignalHandler::<P, F>::new(f)));
    }

    pub fn on_effect<F, Fut>(&self, f: F)
    where
        F: Fn(CommunicationScope<P>, P::Effect) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.set_effect_handler(Arc::new(FnEffectHandler::<P, F>::new(f)));
    }

    pub fn set_signal_handler(&self, handler: Arc<dyn SignalHandler<P>>) {
        *self.inner.signal_handler.write() = Some(handler);
    }

    pub fn set_effect_handler(&self, handler: Arc<dyn EffectHandler<P>>) {
        *self.inner.effect_handler.write() = Some(handler);
    }

    /// Request handler owned by this transformer
    pub fn requests(&self) -> RequestHandler<P> {
        self.inner.requests()
    }

    /// Scope handlers receive; usable outside handlers as well
    pub fn communication_scope(&self) -> CommunicationScope<P> {
        self.inner.scope()
    }

    /// Bound how long this transformer's queries wait; `None` waits forever
    pub fn set_query_timeout(&self, timeout: Option<Duration>) {
        self.inner.delegate.set_timeout(timeout);
    }

    /// Handler errors and panics reported so far
    pub fn failures_reported(&self) -> u64 {
        self.inner.failures_reported.load(Ordering::Relaxed)
    }

    /// Dispatch every incoming signal to the signal handler
    pub fn start_signal_collection(&self, mut signals: BusSubscriber<P::Signal>) -> Result<()> {
        self.inner.mark_running()?;
        let intake = Arc::new(Intake::new(signals.metrics(), signals.baseline()));
        self.inner.tracker.register_intake(intake.clone());

        let inner = self.inner.clone();
        self.inner.tasks.spawn(async move {
            while let Some(signal) = signals.recv().await {
                debug!(transformer = %inner.id, ?signal, "Signal received");
                if inner.signal_handler.read().is_some() {
                    inner.dispatch(Inbound::Signal(signal));
                }
                inner.tracker.acknowledge(&intake, signals.position());
            }
            debug!(transformer = %inner.id, "Signal collection finished");
        })
    }

    /// Attach outgoing effects to `producer` and dispatch deliverable incoming ones
    pub fn start_effect_processing(
        &self,
        producer: BusProducer<EffectEnvelope<P::Effect>>,
        mut effects: BusSubscriber<EffectEnvelope<P::Effect>>,
    ) -> Result<()> {
        self.inner.mark_running()?;
        self.inner.effects.attach(producer)?;
        let intake = Arc::new(Intake::new(effects.metrics(), effects.baseline()));
        self.inner.tracker.register_intake(intake.clone());

        let inner = self.inner.clone();
        self.inner.tasks.spawn(async move {
            while let Some(envelope) = effects.recv().await {
                if envelope.is_deliverable_to(&inner.id) && inner.effect_handler.read().is_some() {
                    debug!(
                        transformer = %inner.id,
                        sender = %envelope.sender,
                        effect = ?envelope.effect,
                        "Effect received"
                    );
                    inner.dispatch(Inbound::Effect(envelope.effect));
                }
                inner.tracker.acknowledge(&intake, effects.position());
            }
            debug!(transformer = %inner.id, "Effect processing finished");
        })
    }

    /// Flush buffered data and publish straight onto `producer` from now on
    pub fn start_data_publishing(&self, producer: BusProducer<P::Data>) -> Result<()> {
        self.inner.mark_running()?;
        self.inner.data.attach(producer)
    }

    /// Send this transformer's queries to `outgoing` and start answering the
    /// queries relayed to it, each on its own task so computations can query
    /// back
    pub fn start_query_processing(
        &self,
        outgoing: mpsc::UnboundedSender<Query<P::Args>>,
    ) -> Result<()> {
        self.inner.mark_running()?;
        let mut mail = self
            .inner
            .query_mail
            .lock()
            .take()
            .ok_or_else(|| TransmissionError::configuration(
                format!("transformer '{}' already answers queries", self.inner.id),
                Some("transformers"),
            ))?;
        self.inner.delegate.outgoing().attach(outgoing)?;

        let inner = self.inner.clone();
        self.inner.tasks.spawn(async move {
            while let Some(QueryMail {
                query,
                reply,
                _in_flight: in_flight,
            }) = mail.recv().await
            {
                debug!(
                    transformer = %inner.id,
                    token = %query.token,
                    sender = %query.sender,
                    request = query.request.name(),
                    "Query received"
                );
                let responder = inner.clone();
                // A refused spawn drops the reply, which answers Missing
                let spawned = inner.tasks.spawn(async move {
                    let _in_flight = in_flight;
                    reply.send(responder.answer(query.request).await);
                });
                if spawned.is_err() {
                    break;
                }
            }
        })
    }

    /// Queue `query` for answering; `reply` carries the answer back.
    ///
    /// Fails once the transformer is cleared, answering `Missing` through the
    /// dropped reply.
    pub(crate) fn deliver_query(
        &self,
        query: Query<P::Args>,
        reply: QueryReply<P::Data>,
    ) -> Result<()> {
        let inbox = self.inner.query_inbox.lock();
        let Some(inbox) = inbox.as_ref() else {
            return Err(TransmissionError::TransformerCleared(self.inner.id.clone()));
        };
        let mail = QueryMail {
            query,
            reply,
            _in_flight: self.inner.tracker.begin(),
        };
        inbox
            .send(mail)
            .map_err(|_| TransmissionError::TransformerCleared(self.inner.id.clone()))
    }

    /// Hand a result to the query of this transformer waiting on it
    pub(crate) fn resolve_query(&self, result: QueryResult<P::Data>) {
        self.inner.delegate.resolve(result);
    }

    /// Route handler failures onto `producer`
    pub fn attach_failure_reporting(&self, producer: BusProducer<HandlerFailure>) -> Result<()> {
        self.inner.ensure_active()?;
        self.inner.failures.attach(producer)
    }

    /// Wait until every dispatched invocation of this transformer has finished
    pub async fn wait_processing_to_finish(&self) {
        let inner = &self.inner;
        inner
            .tracker
            .wait_idle(|| *inner.state.read() == TransformerState::Cleared)
            .await;
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state() == TransformerState::Cleared || self.inner.tracker.is_idle()
    }

    /// Whether this transformer can answer `request` right now
    pub(crate) fn answers(&self, request: &QueryRequest<P::Args>) -> bool {
        self.state() != TransformerState::Cleared && self.inner.storage.answers(request)
    }

    /// Abort all tasks, close outgoing paths and release storage. Idempotent.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.write();
            if *state == TransformerState::Cleared {
                return;
            }
            *state = TransformerState::Cleared;
        }
        let inner = &self.inner;
        inner.query_inbox.lock().take();
        let aborted = inner.tasks.cancel();
        inner.mailbox.lock().take();
        // Never started: queued queries answer Missing as they drop
        inner.query_mail.lock().take();
        inner.data.close();
        inner.effects.close();
        inner.failures.close();
        inner.delegate.clear();
        inner.storage.clear();
        inner.signal_handler.write().take();
        inner.effect_handler.write().take();
        inner.tracker.release();
        info!(transformer = %inner.id, aborted_tasks = aborted, "Transformer cleared");
    }
}

impl<P: Transmission> TransformerInner<P> {
    fn dispatch_mode(&self) -> DispatchMode {
        self.modes.lock().effective
    }

    fn ensure_active(&self) -> Result<()> {
        if *self.state.read() == TransformerState::Cleared {
            return Err(TransmissionError::TransformerCleared(self.id.clone()));
        }
        Ok(())
    }

    fn mark_running(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            TransformerState::Cleared => Err(TransmissionError::TransformerCleared(self.id.clone())),
            TransformerState::Running => Ok(()),
            TransformerState::Constructed => {
                *state = TransformerState::Running;
                info!(transformer = %self.id, dispatch_mode = ?self.dispatch_mode(), "Transformer running");
                Ok(())
            }
        }
    }

    fn requests(&self) -> RequestHandler<P> {
        RequestHandler::new(self.delegate.clone())
    }

    fn scope(&self) -> CommunicationScope<P> {
        CommunicationScope::new(
            self.id.clone(),
            self.data.clone(),
            self.effects.clone(),
            self.requests(),
        )
    }

    fn dispatch(self: &Arc<Self>, inbound: Inbound<P>) {
        let in_flight = self.tracker.begin();
        let dispatched = match self.dispatch_mode() {
            DispatchMode::Concurrent => {
                let inner = self.clone();
                self.tasks.spawn(async move {
                    let _in_flight = in_flight;
                    inner.handle(inbound).await;
                })
            }
            DispatchMode::Sequential => self.mailbox().and_then(|mailbox| {
                mailbox
                    .send(Mail {
                        inbound,
                        _in_flight: in_flight,
                    })
                    .map_err(|_| TransmissionError::TransformerCleared(self.id.clone()))
            }),
        };
        if let Err(e) = dispatched {
            debug!(transformer = %self.id, error = %e, "Inbound message dropped");
        }
    }

    fn mailbox(self: &Arc<Self>) -> Result<mpsc::UnboundedSender<Mail<P>>> {
        let mut slot = self.mailbox.lock();
        if let Some(mailbox) = slot.as_ref() {
            return Ok(mailbox.clone());
        }
        let (mailbox, mut letters) = mpsc::unbounded_channel::<Mail<P>>();
        let inner = self.clone();
        self.tasks.spawn(async move {
            while let Some(mail) = letters.recv().await {
                let Mail {
                    inbound,
                    _in_flight,
                } = mail;
                inner.handle(inbound).await;
            }
        })?;
        debug!(transformer = %self.id, "Sequential mailbox started");
        *slot = Some(mailbox.clone());
        Ok(mailbox)
    }

    async fn handle(&self, inbound: Inbound<P>) {
        let scope = self.scope();
        match inbound {
            Inbound::Signal(signal) => {
                let handler = self.signal_handler.read().clone();
                if let Some(handler) = handler {
                    let outcome = catch_failure(handler.on_signal(&scope, signal)).await;
                    if let Err(message) = outcome {
                        self.report_failure(FailureKind::Signal, message);
                    }
                }
            }
            Inbound::Effect(effect) => {
                let handler = self.effect_handler.read().clone();
                if let Some(handler) = handler {
                    let outcome = catch_failure(handler.on_effect(&scope, effect)).await;
                    if let Err(message) = outcome {
                        self.report_failure(FailureKind::Effect, message);
                    }
                }
            }
        }
    }

    async fn answer(&self, request: QueryRequest<P::Args>) -> QueryOutcome<P::Data> {
        match request {
            QueryRequest::Data { key } => match self.storage.snapshot(key) {
                Some(data) => QueryOutcome::Value(data),
                None => QueryOutcome::Missing,
            },
            QueryRequest::Computation {
                key,
                args,
                invalidate,
            } => {
                let Some(entry) = self.storage.registry().computation(key) else {
                    debug!(transformer = %self.id, computation = %key, "No such computation");
                    return QueryOutcome::Missing;
                };
                match catch_failure(entry.resolve(self.requests(), args, invalidate)).await {
                    Ok(Some(value)) => QueryOutcome::Value(value),
                    Ok(None) => QueryOutcome::Missing,
                    Err(message) => {
                        self.report_failure(FailureKind::Computation, message);
                        QueryOutcome::Missing
                    }
                }
            }
            QueryRequest::Execution { key, args, .. } => {
                let Some(entry) = self.storage.registry().execution(key) else {
                    debug!(transformer = %self.id, execution = %key, "No such execution");
                    return QueryOutcome::Missing;
                };
                match catch_failure(entry.run(self.requests(), args)).await {
                    Ok(()) => QueryOutcome::Executed,
                    Err(message) => {
                        self.report_failure(FailureKind::Execution, message);
                        QueryOutcome::Missing
                    }
                }
            }
        }
    }

    fn report_failure(&self, kind: FailureKind, message: String) {
        error!(transformer = %self.id, %kind, error = %message, "Handler failed");
        self.failures_reported.fetch_add(1, Ordering::Relaxed);
        let failure = HandlerFailure {
            transformer: self.id.clone(),
            kind,
            message,
        };
        if let Err(e) = self.failures.emit(failure) {
            warn!(transformer = %self.id, error = %e, "Failure report dropped");
        }
    }
}

/// Run a handler future, turning both errors and panics into a message
async fn catch_failure<T>(
    future: impl Future<Output = anyhow::Result<T>>,
) -> std::result::Result<T, String> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Broadcast;
    use crate::message::{Effect, Signal};

    #[derive(Debug, Clone, PartialEq)]
    struct Ping;
    impl Signal for Ping {}
    impl Effect for Ping {}

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Score(i32);

    crate::transmission_data! {
        #[derive(Debug, Clone, PartialEq)]
        enum UnitData {
            Score(Score),
        }
    }

    struct Family;
    impl Transmission for Family {
        type Signal = Ping;
        type Effect = Ping;
        type Data = UnitData;
        type Args = ();
    }

    #[test]
    fn test_second_holder_for_variant_rejected() {
        let transformer = Transformer::<Family>::new("scores");
        let _holder = transformer.data_holder(Score(1), true).unwrap();
        let err = transformer.data_holder(Score(2), true).err();
        assert!(matches!(err, Some(TransmissionError::DuplicateDataHolder { .. })));
        // The rejected holder did not emit its initial value
        assert_eq!(transformer.inner.data.buffered(), 1);
    }

    #[test]
    fn test_cleared_transformer_rejects_setup() {
        let transformer = Transformer::<Family>::new("scores");
        transformer.clear();
        transformer.clear();
        assert_eq!(transformer.state(), TransformerState::Cleared);
        assert!(matches!(
            transformer.data_holder(Score(0), false),
            Err(TransmissionError::TransformerCleared(_))
        ));
        let bus = Broadcast::<UnitData>::new("data", 4);
        assert!(transformer.start_data_publishing(bus.producer()).is_err());
    }

    #[test]
    fn test_explicit_mode_survives_default() {
        let transformer =
            Transformer::<Family>::new("seq").with_dispatch_mode(DispatchMode::Sequential);
        assert_eq!(transformer.dispatch_mode(), DispatchMode::Sequential);
        assert_eq!(transformer.explicit_dispatch_mode(), Some(DispatchMode::Sequential));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_caught() {
        let outcome = catch_failure(async {
            if true {
                panic!("boom");
            }
            Ok::<_, anyhow::Error>(())
        })
        .await;
        assert_eq!(outcome, Err("panicked: boom".to_string()));
    }
}
