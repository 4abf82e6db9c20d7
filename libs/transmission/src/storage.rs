//! Per-transformer storage of data holders and computations.

use crate::computation::ComputationRegistry;
use crate::error::{Result, TransmissionError};
use crate::holder::DataSource;
use crate::identifier::TransformerId;
use crate::message::{DataKey, Transmission};
use crate::query::QueryRequest;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct TransformerStorage<P: Transmission> {
    owner: TransformerId,
    holders: RwLock<HashMap<DataKey, Arc<dyn DataSource<P::Data>>>>,
    registry: ComputationRegistry<P>,
}

impl<P: Transmission> TransformerStorage<P> {
    pub(crate) fn new(owner: TransformerId) -> Self {
        Self {
            registry: ComputationRegistry::new(owner.clone()),
            owner,
            holders: RwLock::new(HashMap::new()),
        }
    }

    /// Register a holder built by `make`; one per data variant.
    ///
    /// `make` runs under the storage lock, so a rejected duplicate never
    /// emits its initial value.
    pub(crate) fn insert_holder_with<H>(
        &self,
        key: DataKey,
        make: impl FnOnce() -> (H, Arc<dyn DataSource<P::Data>>),
    ) -> Result<H> {
        let mut holders = self.holders.write();
        if holders.contains_key(&key) {
            return Err(TransmissionError::duplicate_data_holder(&self.owner, key));
        }
        let (holder, source) = make();
        holders.insert(key, source);
        Ok(holder)
    }

    pub(crate) fn holds(&self, key: DataKey) -> bool {
        self.holders.read().contains_key(&key)
    }

    pub(crate) fn snapshot(&self, key: DataKey) -> Option<P::Data> {
        let source = self.holders.read().get(&key).cloned();
        source.map(|source| source.snapshot())
    }

    pub(crate) fn registry(&self) -> &ComputationRegistry<P> {
        &self.registry
    }

    /// Whether this storage has something registered for `request`
    pub(crate) fn answers(&self, request: &QueryRequest<P::Args>) -> bool {
        match request {
            QueryRequest::Data { key } => self.holds(*key),
            QueryRequest::Computation { key, .. } => self.registry.computation(*key).is_some(),
            QueryRequest::Execution { key, .. } => self.registry.execution(*key).is_some(),
        }
    }

    pub(crate) fn clear(&self) {
        self.holders.write().clear();
        self.registry.clear();
    }
}
