//! # Router Configuration
//!
//! Bus capacities, query timeout and dispatch policy for one router. Every
//! field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [buses]
//! signal_capacity = 1024    # ring size per bus; lagging subscribers lose oldest items
//! data_capacity = 1024
//! effect_capacity = 1024
//! failure_capacity = 256
//!
//! [query]
//! timeout_ms = 5000         # absent = queries wait forever
//!
//! [dispatch]
//! default_mode = "concurrent"   # or "sequential"
//!
//! [dispatch.overrides]
//! output = "sequential"     # per transformer, wins over everything else
//! ```
//!
//! Mode resolution for a transformer: config override, then the mode set on
//! the transformer itself, then `default_mode`.

use crate::error::{Result, TransmissionError};
use crate::identifier::TransformerId;
use crate::transformer::DispatchMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main router configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    pub buses: BusConfig,
    pub query: QueryConfig,
    pub dispatch: DispatchConfig,
}

/// Ring capacity of each bus
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    pub signal_capacity: usize,
    pub data_capacity: usize,
    pub effect_capacity: usize,
    pub failure_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            signal_capacity: 1024,
            data_capacity: 1024,
            effect_capacity: 1024,
            failure_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound on waiting for a query result
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub default_mode: DispatchMode,
    /// Transformer name to mode
    pub overrides: HashMap<String, DispatchMode>,
}

impl RouterConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TransmissionError::Io(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| {
            TransmissionError::configuration(format!("Failed to parse config: {}", e), None)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("buses.signal_capacity", self.buses.signal_capacity),
            ("buses.data_capacity", self.buses.data_capacity),
            ("buses.effect_capacity", self.buses.effect_capacity),
            ("buses.failure_capacity", self.buses.failure_capacity),
        ];
        for (field, capacity) in capacities {
            if capacity == 0 {
                return Err(TransmissionError::configuration(
                    "bus capacity must be greater than zero",
                    Some(field),
                ));
            }
        }

        if self.query.timeout_ms == Some(0) {
            return Err(TransmissionError::configuration(
                "query timeout must be greater than zero when set",
                Some("query.timeout_ms"),
            ));
        }

        if self.dispatch.overrides.keys().any(|name| name.trim().is_empty()) {
            return Err(TransmissionError::configuration(
                "dispatch override names must not be empty",
                Some("dispatch.overrides"),
            ));
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query.timeout_ms.map(Duration::from_millis)
    }

    /// Effective dispatch mode for a transformer
    pub fn dispatch_mode_for(
        &self,
        id: &TransformerId,
        explicit: Option<DispatchMode>,
    ) -> DispatchMode {
        self.dispatch
            .overrides
            .get(id.as_str())
            .copied()
            .or(explicit)
            .unwrap_or(self.dispatch.default_mode)
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_default_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch.default_mode = mode;
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, mode: DispatchMode) -> Self {
        self.dispatch.overrides.insert(name.into(), mode);
        self
    }
}
