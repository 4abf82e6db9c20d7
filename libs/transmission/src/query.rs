//! Queries
//!
//! Request/response protocol between transformers. A caller's
//! [`RequestHandler`] turns "give me X from transformer Y" into a [`Query`]
//! carrying a fresh [`QueryToken`], parks a one-shot slot under that token and
//! suspends. Queries and results never ride the lossy broadcast buses: the
//! router hands each query to exactly one answerer together with a
//! [`QueryReply`], and routes the resulting [`QueryResult`] to the delegate of
//! its owner, which wakes the slot with the matching token. Overlapping
//! queries for the same variant never cross.
//!
//! A reply that is dropped unanswered (answerer cleared, task aborted, inbox
//! torn down) answers [`QueryOutcome::Missing`] on its way out, so every
//! caller resumes.

use crate::identifier::TransformerId;
use crate::message::{DataKey, DataVariant, ExecutionKey, Transmission};
use crate::outlet::Outlet;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique query correlation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryToken(u64);

impl QueryToken {
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Who should answer a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    Transformer(TransformerId),
    /// First transformer, in router order, able to answer the request
    AnyHolder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest<A> {
    Data {
        key: DataKey,
    },
    Computation {
        key: DataKey,
        args: Option<A>,
        invalidate: bool,
    },
    Execution {
        key: ExecutionKey,
        args: Option<A>,
        invalidate: bool,
    },
}

impl<A> QueryRequest<A> {
    pub fn name(&self) -> &'static str {
        match self {
            QueryRequest::Data { key } => key.as_str(),
            QueryRequest::Computation { key, .. } => key.as_str(),
            QueryRequest::Execution { key, .. } => key.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Query<A> {
    pub token: QueryToken,
    pub sender: TransformerId,
    pub target: QueryTarget,
    pub request: QueryRequest<A>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<D> {
    Value(D),
    Executed,
    Missing,
}

#[derive(Debug, Clone)]
pub struct QueryResult<D> {
    pub token: QueryToken,
    /// Transformer that asked
    pub owner: TransformerId,
    pub outcome: QueryOutcome<D>,
}

/// Obligation to answer one query.
///
/// Consumed by [`send`](Self::send); dropping it unanswered sends `Missing`.
pub(crate) struct QueryReply<D> {
    token: QueryToken,
    owner: TransformerId,
    results: Option<mpsc::UnboundedSender<QueryResult<D>>>,
}

impl<D> QueryReply<D> {
    pub(crate) fn new<A>(query: &Query<A>, results: mpsc::UnboundedSender<QueryResult<D>>) -> Self {
        Self {
            token: query.token,
            owner: query.sender.clone(),
            results: Some(results),
        }
    }

    pub(crate) fn send(mut self, outcome: QueryOutcome<D>) {
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: QueryOutcome<D>) {
        let Some(results) = self.results.take() else {
            return;
        };
        let result = QueryResult {
            token: self.token,
            owner: self.owner.clone(),
            outcome,
        };
        if results.send(result).is_err() {
            debug!(token = %self.token, owner = %self.owner, "Query result dropped, router gone");
        }
    }
}

impl<D> Drop for QueryReply<D> {
    fn drop(&mut self) {
        if self.results.is_some() {
            debug!(token = %self.token, owner = %self.owner, "Query abandoned by its answerer");
            self.deliver(QueryOutcome::Missing);
        }
    }
}

/// Requester side of the query protocol for one transformer
pub(crate) struct QueryDelegate<P: Transmission> {
    owner: TransformerId,
    outgoing: Outlet<Query<P::Args>>,
    pending: DashMap<QueryToken, oneshot::Sender<QueryOutcome<P::Data>>>,
    timeout: RwLock<Option<Duration>>,
    cleared: AtomicBool,
}

/// Removes the pending slot when the caller finishes or is dropped
struct PendingSlot<'a, D> {
    pending: &'a DashMap<QueryToken, oneshot::Sender<QueryOutcome<D>>>,
    token: QueryToken,
}

impl<D> Drop for PendingSlot<'_, D> {
    fn drop(&mut self) {
        self.pending.remove(&self.token);
    }
}

impl<P: Transmission> QueryDelegate<P> {
    pub(crate) fn new(owner: TransformerId) -> Self {
        Self {
            owner,
            outgoing: Outlet::new("queries"),
            pending: DashMap::new(),
            timeout: RwLock::new(None),
            cleared: AtomicBool::new(false),
        }
    }

    pub(crate) fn outgoing(&self) -> &Outlet<Query<P::Args>> {
        &self.outgoing
    }

    pub(crate) fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.write() = timeout;
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    pub(crate) async fn request(
        &self,
        target: QueryTarget,
        request: QueryRequest<P::Args>,
    ) -> QueryOutcome<P::Data> {
        if self.cleared.load(Ordering::Acquire) {
            return QueryOutcome::Missing;
        }

        let token = QueryToken::next();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(token, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            token,
        };

        let name = request.name();
        let query = Query {
            token,
            sender: self.owner.clone(),
            target,
            request,
        };
        debug!(transformer = %self.owner, %token, request = name, "Query sent");
        if let Err(e) = self.outgoing.emit(query) {
            warn!(transformer = %self.owner, %token, error = %e, "Query could not be sent");
            return QueryOutcome::Missing;
        }

        let timeout = *self.timeout.read();
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome.unwrap_or(QueryOutcome::Missing),
                Err(_) => {
                    warn!(
                        transformer = %self.owner,
                        %token,
                        request = name,
                        timeout_ms = limit.as_millis() as u64,
                        "Query timed out"
                    );
                    QueryOutcome::Missing
                }
            },
            None => rx.await.unwrap_or(QueryOutcome::Missing),
        }
    }

    /// Hand a result to the caller waiting on its token
    pub(crate) fn resolve(&self, result: QueryResult<P::Data>) {
        if result.owner != self.owner {
            return;
        }
        match self.pending.remove(&result.token) {
            Some((_, slot)) => {
                let _ = slot.send(result.outcome);
            }
            None => {
                debug!(transformer = %self.owner, token = %result.token, "Result for abandoned query");
            }
        }
    }

    /// Resume every waiting caller with a miss and refuse new queries
    pub(crate) fn clear(&self) {
        self.cleared.store(true, Ordering::Release);
        self.outgoing.close();
        self.pending.clear();
    }
}

/// Cloneable handle for querying other transformers.
///
/// Misses are `None` (or `false` for executions), never errors.
pub struct RequestHandler<P: Transmission> {
    delegate: Arc<QueryDelegate<P>>,
}

impl<P: Transmission> Clone for RequestHandler<P> {
    fn clone(&self) -> Self {
        Self {
            delegate: self.delegate.clone(),
        }
    }
}

impl<P: Transmission> RequestHandler<P> {
    pub(crate) fn new(delegate: Arc<QueryDelegate<P>>) -> Self {
        Self { delegate }
    }

    /// Identifier results are addressed to
    pub fn owner(&self) -> &TransformerId {
        &self.delegate.owner
    }

    /// Current value of data variant `D` held by `owner`
    pub async fn get_data<D: DataVariant<P::Data>>(
        &self,
        owner: impl Into<TransformerId>,
    ) -> Option<D> {
        let target = QueryTarget::Transformer(owner.into());
        self.value(target, QueryRequest::Data { key: D::KEY }).await
    }

    /// Current value of data variant `D` from whichever transformer holds it
    pub async fn find_data<D: DataVariant<P::Data>>(&self) -> Option<D> {
        self.value(QueryTarget::AnyHolder, QueryRequest::Data { key: D::KEY })
            .await
    }

    pub async fn compute<R: DataVariant<P::Data>>(
        &self,
        owner: impl Into<TransformerId>,
        invalidate: bool,
    ) -> Option<R> {
        let request = QueryRequest::Computation {
            key: R::KEY,
            args: None,
            invalidate,
        };
        self.value(QueryTarget::Transformer(owner.into()), request)
            .await
    }

    pub async fn compute_with_args<R: DataVariant<P::Data>>(
        &self,
        owner: impl Into<TransformerId>,
        args: P::Args,
        invalidate: bool,
    ) -> Option<R> {
        let request = QueryRequest::Computation {
            key: R::KEY,
            args: Some(args),
            invalidate,
        };
        self.value(QueryTarget::Transformer(owner.into()), request)
            .await
    }

    /// Run an execution; `true` once it completed successfully
    pub async fn execute(
        &self,
        owner: impl Into<TransformerId>,
        key: ExecutionKey,
        invalidate: bool,
    ) -> bool {
        let request = QueryRequest::Execution {
            key,
            args: None,
            invalidate,
        };
        self.executed(QueryTarget::Transformer(owner.into()), request)
            .await
    }

    pub async fn execute_with_args(
        &self,
        owner: impl Into<TransformerId>,
        key: ExecutionKey,
        args: P::Args,
        invalidate: bool,
    ) -> bool {
        let request = QueryRequest::Execution {
            key,
            args: Some(args),
            invalidate,
        };
        self.executed(QueryTarget::Transformer(owner.into()), request)
            .await
    }

    async fn value<D: DataVariant<P::Data>>(
        &self,
        target: QueryTarget,
        request: QueryRequest<P::Args>,
    ) -> Option<D> {
        match self.delegate.request(target, request).await {
            QueryOutcome::Value(data) => D::from_data(data),
            QueryOutcome::Executed | QueryOutcome::Missing => None,
        }
    }

    async fn executed(&self, target: QueryTarget, request: QueryRequest<P::Args>) -> bool {
        matches!(
            self.delegate.request(target, request).await,
            QueryOutcome::Executed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Data, DataKey, Effect, Signal};
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    struct Level(u8);

    crate::transmission_data! {
        #[derive(Debug, Clone, PartialEq)]
        enum QData {
            Level(Level),
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
        type Data = QData;
        type Args = u8;
    }

    fn wired(owner: &str) -> (RequestHandler<Family>, mpsc::UnboundedReceiver<Query<u8>>) {
        let delegate = Arc::new(QueryDelegate::<Family>::new(TransformerId::new(owner)));
        let (tx, rx) = mpsc::unbounded_channel();
        delegate.outgoing().attach(tx).unwrap();
        (RequestHandler::new(delegate), rx)
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = QueryToken::next();
        let b = QueryToken::next();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_results_match_by_token() {
        let (requests, mut rx) = wired("asker");
        let delegate = requests.delegate.clone();

        let first = tokio::spawn({
            let requests = requests.clone();
            async move { requests.compute_with_args::<Level>("calc", 1, false).await }
        });
        let second = tokio::spawn({
            let requests = requests.clone();
            async move { requests.compute_with_args::<Level>("calc", 2, false).await }
        });

        let mut queries = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        // Answer in reverse arrival order
        queries.reverse();
        for query in queries {
            let QueryRequest::Computation { args: Some(arg), .. } = query.request else {
                panic!("unexpected request");
            };
            delegate.resolve(QueryResult {
                token: query.token,
                owner: query.sender,
                outcome: QueryOutcome::Value(QData::Level(Level(arg * 10))),
            });
        }

        assert_eq!(first.await.unwrap(), Some(Level(10)));
        assert_eq!(second.await.unwrap(), Some(Level(20)));
        assert_eq!(delegate.pending(), 0);
    }

    #[tokio::test]
    async fn test_foreign_owner_is_ignored() {
        let (requests, mut rx) = wired("asker");
        let delegate = requests.delegate.clone();
        let waiting = tokio::spawn(async move { requests.get_data::<Level>("holder").await });

        let query = rx.recv().await.unwrap();
        assert_eq!(query.request, QueryRequest::Data { key: DataKey::new("Level") });
        delegate.resolve(QueryResult {
            token: query.token,
            owner: TransformerId::new("someone-else"),
            outcome: QueryOutcome::Value(QData::Level(Level(1))),
        });
        assert_eq!(delegate.pending(), 1);

        delegate.clear();
        assert_eq!(waiting.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_timeout_yields_none_and_frees_slot() {
        let (requests, _rx) = wired("asker");
        requests
            .delegate
            .set_timeout(Some(Duration::from_millis(20)));
        assert_eq!(requests.get_data::<Level>("silent").await, None);
        assert_eq!(requests.delegate.pending(), 0);
    }

    #[test]
    fn test_dropped_reply_answers_missing() {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueryResult<QData>>();
        let query = Query {
            token: QueryToken::next(),
            sender: TransformerId::new("asker"),
            target: QueryTarget::AnyHolder,
            request: QueryRequest::<u8>::Data { key: DataKey::new("Level") },
        };

        QueryReply::new(&query, tx.clone()).send(QueryOutcome::Value(QData::Level(Level(3))));
        drop(QueryReply::new(&query, tx));

        let answered = rx.try_recv().unwrap();
        assert_eq!(answered.token, query.token);
        assert_eq!(answered.outcome, QueryOutcome::Value(QData::Level(Level(3))));
        let abandoned = rx.try_recv().unwrap();
        assert_eq!(abandoned.owner.as_str(), "asker");
        assert_eq!(abandoned.outcome, QueryOutcome::Missing);
        // Exactly one result per reply
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_caller_removes_slot() {
        let (requests, mut rx) = wired("asker");
        let delegate = requests.delegate.clone();
        let waiting = tokio::spawn(async move { requests.get_data::<Level>("holder").await });
        let _query = rx.recv().await.unwrap();
        assert_eq!(delegate.pending(), 1);

        waiting.abort();
        let _ = waiting.await;
        assert_eq!(delegate.pending(), 0);
        assert_eq!(QData::Level(Level(0)).key(), DataKey::new("Level"));
    }
}
