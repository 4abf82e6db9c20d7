//! Transformer identifiers
//!
//! A transformer is addressed by a stable name chosen at construction time.
//! Effect receivers, query targets and query result owners all use it.

use std::fmt;
use std::sync::Arc;

/// Identifier reserved for the router's own request handler
pub const ROUTER_IDENTIFIER: &str = "transmission-router";

/// Stable, cheap-to-clone transformer name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransformerId(Arc<str>);

impl TransformerId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Identifier used by the router when it issues queries
    pub fn router() -> Self {
        Self::new(ROUTER_IDENTIFIER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_reserved(&self) -> bool {
        self.as_str() == ROUTER_IDENTIFIER
    }
}

impl fmt::Display for TransformerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransformerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TransformerId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&TransformerId> for TransformerId {
    fn from(id: &TransformerId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for TransformerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_identifier_is_reserved() {
        assert!(TransformerId::router().is_reserved());
        assert!(!TransformerId::new("input").is_reserved());
    }

    #[test]
    fn test_equality_across_constructors() {
        let a = TransformerId::from("output");
        let b = TransformerId::from(String::from("output"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "output");
    }
}
