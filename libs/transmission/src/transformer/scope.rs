//! What a handler may do while it runs.

use crate::error::Result;
use crate::identifier::TransformerId;
use crate::message::{DataVariant, EffectEnvelope, ExecutionKey, Transmission};
use crate::outlet::Outlet;
use crate::query::RequestHandler;
use std::sync::Arc;

/// Communication surface handed to signal and effect handlers
pub struct CommunicationScope<P: Transmission> {
    id: TransformerId,
    data: Arc<Outlet<P::Data>>,
    effects: Arc<Outlet<EffectEnvelope<P::Effect>>>,
    requests: RequestHandler<P>,
}

impl<P: Transmission> Clone for CommunicationScope<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            data: self.data.clone(),
            effects: self.effects.clone(),
            requests: self.requests.clone(),
        }
    }
}

impl<P: Transmission> CommunicationScope<P> {
    pub(crate) fn new(
        id: TransformerId,
        data: Arc<Outlet<P::Data>>,
        effects: Arc<Outlet<EffectEnvelope<P::Effect>>>,
        requests: RequestHandler<P>,
    ) -> Self {
        Self {
            id,
            data,
            effects,
            requests,
        }
    }

    /// Transformer this scope belongs to
    pub fn id(&self) -> &TransformerId {
        &self.id
    }

    /// Publish a data item without storing it in a holder
    pub fn send_data<D: DataVariant<P::Data>>(&self, data: D) -> Result<()> {
        self.data.emit(data.into_data())
    }

    /// Send an effect to exactly one transformer
    pub fn send_effect(&self, effect: P::Effect, to: impl Into<TransformerId>) -> Result<()> {
        self.effects
            .emit(EffectEnvelope::addressed(effect, self.id.clone(), to.into()))
    }

    /// Broadcast an effect to every transformer and the external observer
    pub fn publish(&self, effect: P::Effect) -> Result<()> {
        self.effects
            .emit(EffectEnvelope::broadcast(effect, self.id.clone()))
    }

    /// Send an effect to the external observer only
    pub fn publish_to_router(&self, effect: P::Effect) -> Result<()> {
        self.effects
            .emit(EffectEnvelope::router_only(effect, self.id.clone()))
    }

    pub async fn query_data<D: DataVariant<P::Data>>(
        &self,
        owner: impl Into<TransformerId>,
    ) -> Option<D> {
        self.requests.get_data(owner).await
    }

    pub async fn find_data<D: DataVariant<P::Data>>(&self) -> Option<D> {
        self.requests.find_data().await
    }

    pub async fn query_computation<R: DataVariant<P::Data>>(
        &self,
        owner: impl Into<TransformerId>,
        invalidate: bool,
    ) -> Option<R> {
        self.requests.compute(owner, invalidate).await
    }

    pub async fn query_computation_with_args<R: DataVariant<P::Data>>(
        &self,
        owner: impl Into<TransformerId>,
        args: P::Args,
        invalidate: bool,
    ) -> Option<R> {
        self.requests.compute_with_args(owner, args, invalidate).await
    }

    pub async fn execute(
        &self,
        owner: impl Into<TransformerId>,
        key: ExecutionKey,
        invalidate: bool,
    ) -> bool {
        self.requests.execute(owner, key, invalidate).await
    }

    pub async fn execute_with_args(
        &self,
        owner: impl Into<TransformerId>,
        key: ExecutionKey,
        args: P::Args,
        invalidate: bool,
    ) -> bool {
        self.requests
            .execute_with_args(owner, key, args, invalidate)
            .await
    }

    /// Underlying request handler, for passing into spawned work
    pub fn requests(&self) -> &RequestHandler<P> {
        &self.requests
    }
}
