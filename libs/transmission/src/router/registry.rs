//! Canned query answers for routers under test.
//!
//! A router built with [`RouterBuilder::testing`](super::RouterBuilder::testing)
//! can answer queries aimed at transformers it does not contain. The relay
//! consults the registry only when no live transformer of the router can
//! take a query, so a real transformer always wins over a stub.

use crate::identifier::TransformerId;
use crate::message::{DataKey, DataVariant, ExecutionKey, Transmission};
use crate::query::{Query, QueryOutcome, QueryRequest, QueryTarget};

/// Stub data, computation results and executions keyed by owner
pub struct TestRegistry<P: Transmission> {
    data: Vec<(TransformerId, DataKey, P::Data)>,
    computations: Vec<(TransformerId, DataKey, P::Data)>,
    executions: Vec<(TransformerId, ExecutionKey)>,
}

impl<P: Transmission> Default for TestRegistry<P> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            computations: Vec::new(),
            executions: Vec::new(),
        }
    }
}

impl<P: Transmission> TestRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer data queries for `D` held by `owner` with `value`
    pub fn add_data<D: DataVariant<P::Data>>(
        mut self,
        owner: impl Into<TransformerId>,
        value: D,
    ) -> Self {
        upsert(&mut self.data, owner.into(), D::KEY, value.into_data());
        self
    }

    /// Answer computations of `R` on `owner` with `value`, whatever the arguments
    pub fn add_computation<R: DataVariant<P::Data>>(
        mut self,
        owner: impl Into<TransformerId>,
        value: R,
    ) -> Self {
        upsert(&mut self.computations, owner.into(), R::KEY, value.into_data());
        self
    }

    /// Report execution `key` on `owner` as completed
    pub fn add_execution(mut self, owner: impl Into<TransformerId>, key: ExecutionKey) -> Self {
        let owner = owner.into();
        if !self.executions.iter().any(|(o, k)| *o == owner && *k == key) {
            self.executions.push((owner, key));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.computations.is_empty() && self.executions.is_empty()
    }

    pub(crate) fn owners(&self) -> impl Iterator<Item = &TransformerId> {
        self.data
            .iter()
            .map(|(owner, _, _)| owner)
            .chain(self.computations.iter().map(|(owner, _, _)| owner))
            .chain(self.executions.iter().map(|(owner, _)| owner))
    }

    /// Stub answer for `query`, if one was registered.
    ///
    /// "Any holder" data queries take the first stub registered for the key.
    pub(crate) fn answer(&self, query: &Query<P::Args>) -> Option<QueryOutcome<P::Data>> {
        let owner = match &query.target {
            QueryTarget::Transformer(id) => Some(id),
            QueryTarget::AnyHolder => None,
        };
        let matches = |id: &TransformerId| owner.map_or(true, |owner| owner == id);
        match &query.request {
            QueryRequest::Data { key } => lookup(&self.data, matches, *key),
            QueryRequest::Computation { key, .. } => lookup(&self.computations, matches, *key),
            QueryRequest::Execution { key, .. } => self
                .executions
                .iter()
                .any(|(id, k)| matches(id) && k == key)
                .then_some(QueryOutcome::Executed),
        }
    }
}

fn upsert<D>(entries: &mut Vec<(TransformerId, DataKey, D)>, owner: TransformerId, key: DataKey, value: D) {
    match entries.iter_mut().find(|(o, k, _)| *o == owner && *k == key) {
        Some(entry) => entry.2 = value,
        None => entries.push((owner, key, value)),
    }
}

fn lookup<D: Clone>(
    entries: &[(TransformerId, DataKey, D)],
    matches: impl Fn(&TransformerId) -> bool,
    key: DataKey,
) -> Option<QueryOutcome<D>> {
    entries
        .iter()
        .find(|(owner, k, _)| *k == key && matches(owner))
        .map(|(_, _, value)| QueryOutcome::Value(value.clone()))
}
