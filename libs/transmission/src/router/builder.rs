//! Router construction and validation.

use super::{Router, TestRegistry};
use crate::config::RouterConfig;
use crate::error::{Result, TransmissionError};
use crate::message::Transmission;
use crate::transformer::{Transformer, TransformerState};
use std::collections::HashSet;
use tracing::warn;

/// Builder for [`Router`]
pub struct RouterBuilder<P: Transmission> {
    config: RouterConfig,
    transformers: Vec<Transformer<P>>,
    auto_initialize: bool,
    stubs: TestRegistry<P>,
}

impl<P: Transmission> Default for RouterBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Transmission> RouterBuilder<P> {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            transformers: Vec::new(),
            auto_initialize: true,
            stubs: TestRegistry::new(),
        }
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_transformer(mut self, transformer: Transformer<P>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn add_transformers(mut self, transformers: impl IntoIterator<Item = Transformer<P>>) -> Self {
        self.transformers.extend(transformers);
        self
    }

    /// Wire everything inside `build` (default). Turn off to subscribe to the
    /// router's streams before the first data is published.
    pub fn auto_initialize(mut self, enabled: bool) -> Self {
        self.auto_initialize = enabled;
        self
    }

    /// Stub answers for peers the router under test does not contain.
    ///
    /// ```no_run
    /// # use transmission::{RouterBuilder, Transmission, DataVariant};
    /// # fn stubbed<P: Transmission, D: DataVariant<P::Data>>(price: D) -> RouterBuilder<P> {
    /// RouterBuilder::<P>::new().testing(|registry| registry.add_data("pricing", price))
    /// # }
    /// ```
    pub fn testing(mut self, register: impl FnOnce(TestRegistry<P>) -> TestRegistry<P>) -> Self {
        self.stubs = register(std::mem::take(&mut self.stubs));
        self
    }

    /// Validate and construct. A rejected build spawns nothing.
    pub fn build(self) -> Result<Router<P>> {
        if let Err(e) = self.validate() {
            warn!(error = %e, category = e.category(), "Router build rejected");
            return Err(e);
        }
        let router = Router::construct(self.config, self.transformers, self.stubs);
        if self.auto_initialize {
            router.initialize()?;
        }
        Ok(router)
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.transformers.is_empty() {
            return Err(TransmissionError::EmptyTransformerSet);
        }
        let mut seen = HashSet::new();
        for transformer in &self.transformers {
            let id = transformer.id();
            if id.is_reserved() {
                return Err(TransmissionError::ReservedIdentifier(id.clone()));
            }
            if !seen.insert(id.clone()) {
                return Err(TransmissionError::DuplicateTransformer(id.clone()));
            }
            if transformer.state() != TransformerState::Constructed {
                return Err(TransmissionError::configuration(
                    format!("transformer '{id}' already belongs to a router"),
                    Some("transformers"),
                ));
            }
        }
        if let Some(owner) = self.stubs.owners().find(|owner| owner.is_reserved()) {
            return Err(TransmissionError::ReservedIdentifier(owner.clone()));
        }
        Ok(())
    }
}
