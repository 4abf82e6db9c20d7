//! Signal and effect handlers.
//!
//! Handlers are async traits receiving the transformer's
//! [`CommunicationScope`]. Closures can be used instead through
//! [`Transformer::on_signal`](super::Transformer::on_signal) and
//! [`Transformer::on_effect`](super::Transformer::on_effect).

use super::scope::CommunicationScope;
use crate::message::Transmission;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

#[async_trait]
pub trait SignalHandler<P: Transmission>: Send + Sync {
    async fn on_signal(
        &self,
        scope: &CommunicationScope<P>,
        signal: P::Signal,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait EffectHandler<P: Transmission>: Send + Sync {
    async fn on_effect(
        &self,
        scope: &CommunicationScope<P>,
        effect: P::Effect,
    ) -> anyhow::Result<()>;
}

pub(crate) struct FnSignalHandler<P, F> {
    f: F,
    _family: PhantomData<fn() -> P>,
}

impl<P, F> FnSignalHandler<P, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _family: PhantomData,
        }
    }
}

#[async_trait]
impl<P, F, Fut> SignalHandler<P> for FnSignalHandler<P, F>
where
    P: Transmission,
    F: Fn(CommunicationScope<P>, P::Signal) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_signal(
        &self,
        scope: &CommunicationScope<P>,
        signal: P::Signal,
    ) -> anyhow::Result<()> {
        (self.f)(scope.clone(), signal).await
    }
}

pub(crate) struct FnEffectHandler<P, F> {
    f: F,
    _family: PhantomData<fn() -> P>,
}

impl<P, F> FnEffectHandler<P, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _family: PhantomData,
        }
    }
}

#[async_trait]
impl<P, F, Fut> EffectHandler<P> for FnEffectHandler<P, F>
where
    P: Transmission,
    F: Fn(CommunicationScope<P>, P::Effect) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_effect(
        &self,
        scope: &CommunicationScope<P>,
        effect: P::Effect,
    ) -> anyhow::Result<()> {
        (self.f)(scope.clone(), effect).await
    }
}
