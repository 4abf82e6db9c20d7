//! Computation Registry
//!
//! Named async operations a transformer exposes to queries. A computation
//! produces a data variant and may memoize its last result; an execution
//! produces nothing and is run for its side effects.
//!
//! The cache of an entry is a single cell guarded by a `parking_lot::Mutex`
//! that is never held across an `.await`. Two concurrent resolves of one
//! entry may both run the body; the later store wins.

use crate::error::{Result, TransmissionError};
use crate::identifier::TransformerId;
use crate::message::{DataKey, ExecutionKey, Transmission};
use crate::query::RequestHandler;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub(crate) type ComputationFn<P> = Arc<
    dyn Fn(
            RequestHandler<P>,
            Option<<P as Transmission>::Args>,
        ) -> BoxFuture<'static, anyhow::Result<Option<<P as Transmission>::Data>>>
        + Send
        + Sync,
>;

pub(crate) type ExecutionFn<P> = Arc<
    dyn Fn(RequestHandler<P>, Option<<P as Transmission>::Args>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

struct Cached<P: Transmission> {
    args: Option<P::Args>,
    value: P::Data,
}

/// One registered computation
pub struct ComputationEntry<P: Transmission> {
    key: DataKey,
    use_cache: bool,
    body: ComputationFn<P>,
    cache: Mutex<Option<Cached<P>>>,
    runs: AtomicU64,
}

impl<P: Transmission> ComputationEntry<P> {
    pub(crate) fn new(key: DataKey, use_cache: bool, body: ComputationFn<P>) -> Self {
        Self {
            key,
            use_cache,
            body,
            cache: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }

    /// Produce the result, from the cache when allowed.
    ///
    /// A cached value is reused only for equal arguments. Any other call
    /// clears the cache, runs the body and stores a `Some` result when
    /// caching is enabled.
    pub(crate) async fn resolve(
        &self,
        requests: RequestHandler<P>,
        args: Option<P::Args>,
        invalidate: bool,
    ) -> anyhow::Result<Option<P::Data>> {
        if self.use_cache && !invalidate {
            if let Some(value) = self.cached(&args) {
                debug!(computation = %self.key, "Computation served from cache");
                return Ok(Some(value));
            }
        }

        self.cache.lock().take();
        self.runs.fetch_add(1, Ordering::Relaxed);
        let value = (self.body)(requests, args.clone()).await?;

        if self.use_cache {
            if let Some(value) = &value {
                *self.cache.lock() = Some(Cached {
                    args,
                    value: value.clone(),
                });
            }
        }
        Ok(value)
    }

    fn cached(&self, args: &Option<P::Args>) -> Option<P::Data> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|cached| &cached.args == args)
            .map(|cached| cached.value.clone())
    }

    pub fn key(&self) -> DataKey {
        self.key
    }

    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    pub fn is_cached(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// How many times the body has run
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.cache.lock().take();
    }
}

/// One registered execution
pub struct ExecutionEntry<P: Transmission> {
    key: ExecutionKey,
    body: ExecutionFn<P>,
    runs: AtomicU64,
}

impl<P: Transmission> ExecutionEntry<P> {
    pub(crate) fn new(key: ExecutionKey, body: ExecutionFn<P>) -> Self {
        Self {
            key,
            body,
            runs: AtomicU64::new(0),
        }
    }

    pub(crate) async fn run(
        &self,
        requests: RequestHandler<P>,
        args: Option<P::Args>,
    ) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        (self.body)(requests, args).await
    }

    pub fn key(&self) -> ExecutionKey {
        self.key
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

/// Computations and executions of one transformer
pub(crate) struct ComputationRegistry<P: Transmission> {
    owner: TransformerId,
    computations: RwLock<HashMap<DataKey, Arc<ComputationEntry<P>>>>,
    executions: RwLock<HashMap<ExecutionKey, Arc<ExecutionEntry<P>>>>,
}

impl<P: Transmission> ComputationRegistry<P> {
    pub(crate) fn new(owner: TransformerId) -> Self {
        Self {
            owner,
            computations: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register_computation(
        &self,
        key: DataKey,
        use_cache: bool,
        body: ComputationFn<P>,
    ) -> Result<Arc<ComputationEntry<P>>> {
        let mut computations = self.computations.write();
        if computations.contains_key(&key) {
            return Err(TransmissionError::duplicate_computation(&self.owner, key));
        }
        let entry = Arc::new(ComputationEntry::new(key, use_cache, body));
        computations.insert(key, entry.clone());
        Ok(entry)
    }

    pub(crate) fn register_execution(
        &self,
        key: ExecutionKey,
        body: ExecutionFn<P>,
    ) -> Result<Arc<ExecutionEntry<P>>> {
        let mut executions = self.executions.write();
        if executions.contains_key(&key) {
            return Err(TransmissionError::duplicate_execution(&self.owner, key));
        }
        let entry = Arc::new(ExecutionEntry::new(key, body));
        executions.insert(key, entry.clone());
        Ok(entry)
    }

    pub(crate) fn computation(&self, key: DataKey) -> Option<Arc<ComputationEntry<P>>> {
        self.computations.read().get(&key).cloned()
    }

    pub(crate) fn execution(&self, key: ExecutionKey) -> Option<Arc<ExecutionEntry<P>>> {
        self.executions.read().get(&key).cloned()
    }

    pub(crate) fn clear(&self) {
        for entry in self.computations.write().drain().map(|(_, entry)| entry) {
            entry.clear();
        }
        self.executions.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DataVariant, Effect, Signal};
    use crate::query::QueryDelegate;
    use futures::FutureExt;

    #[derive(Debug, Clone, PartialEq)]
    struct Sum(u64);

    crate::transmission_data! {
        #[derive(Debug, Clone, PartialEq)]
        enum CData {
            Sum(Sum),
        }
    }

    #[derive(Debug, Clone)]
    struct Nothing;
    impl Signal for Nothing {}
    impl Effect for Nothing {}

    struct Family;
    impl Transmission for Family {
        type Signal = Nothing;
        type Effect = Nothing;
        type Data = CData;
        type Args = u64;
    }

    fn requests() -> RequestHandler<Family> {
        RequestHandler::new(Arc::new(QueryDelegate::new(TransformerId::new("calc"))))
    }

    fn counting_entry(use_cache: bool) -> (ComputationEntry<Family>, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let body: ComputationFn<Family> = Arc::new(move |_, args| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(Some(Sum(n * 100 + args.unwrap_or(0)).into_data())) }.boxed()
        });
        (ComputationEntry::new(Sum::KEY, use_cache, body), calls)
    }

    #[tokio::test]
    async fn test_cached_entry_runs_once_until_invalidated() {
        let (entry, calls) = counting_entry(true);
        let first = entry.resolve(requests(), None, false).await.unwrap();
        let second = entry.resolve(requests(), None, false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let third = entry.resolve(requests(), None, true).await.unwrap();
        assert_eq!(third, Some(CData::Sum(Sum(200))));
        assert_eq!(entry.runs(), 2);

        // The invalidating call stored its own result
        let fourth = entry.resolve(requests(), None, false).await.unwrap();
        assert_eq!(fourth, third);
        assert_eq!(entry.runs(), 2);
    }

    #[tokio::test]
    async fn test_uncached_entry_runs_every_time() {
        let (entry, calls) = counting_entry(false);
        for _ in 0..3 {
            entry.resolve(requests(), None, false).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!entry.is_cached());
    }

    #[tokio::test]
    async fn test_cache_hit_requires_equal_args() {
        let (entry, _) = counting_entry(true);
        let one = entry.resolve(requests(), Some(1), false).await.unwrap();
        let again = entry.resolve(requests(), Some(1), false).await.unwrap();
        assert_eq!(one, again);
        assert_eq!(entry.runs(), 1);

        let two = entry.resolve(requests(), Some(2), false).await.unwrap();
        assert_eq!(two, Some(CData::Sum(Sum(202))));
        assert_eq!(entry.runs(), 2);
    }

    #[tokio::test]
    async fn test_none_is_not_cached() {
        let body: ComputationFn<Family> = Arc::new(|_, _| async { Ok(None) }.boxed());
        let entry = ComputationEntry::new(Sum::KEY, true, body);
        assert_eq!(entry.resolve(requests(), None, false).await.unwrap(), None);
        assert_eq!(entry.resolve(requests(), None, false).await.unwrap(), None);
        assert_eq!(entry.runs(), 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ComputationRegistry::<Family>::new(TransformerId::new("calc"));
        let body: ComputationFn<Family> = Arc::new(|_, _| async { Ok(None) }.boxed());
        registry.register_computation(Sum::KEY, true, body.clone()).unwrap();
        let err = registry
            .register_computation(Sum::KEY, false, body)
            .err()
            .unwrap();
        assert_eq!(err.category(), "registration");

        let exec: ExecutionFn<Family> = Arc::new(|_, _| async { Ok(()) }.boxed());
        let key = ExecutionKey::new("flush");
        registry.register_execution(key, exec.clone()).unwrap();
        assert!(registry.register_execution(key, exec).is_err());

        registry.clear();
        assert!(registry.computation(Sum::KEY).is_none());
        assert!(registry.execution(key).is_none());
    }
}
