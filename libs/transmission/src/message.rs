//! Message Families
//!
//! A transmission family is a closed set of enums: signals arrive from
//! outside, effects travel between transformers, data snapshots are
//! published outward. Handlers dispatch on them with an exhaustive `match`.
//!
//! Data variants are addressed by a [`DataKey`]. The [`transmission_data!`]
//! macro generates the data enum together with its variant table, so a
//! payload type can be used directly as a query or computation key:
//!
//! ```
//! use transmission::transmission_data;
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! pub struct Counter(pub u32);
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! pub struct Label(pub String);
//!
//! transmission_data! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub enum DemoData {
//!         Counter(Counter),
//!         Label(Label),
//!     }
//! }
//! ```

use crate::identifier::TransformerId;
use std::fmt;

/// External-origin one-way message
pub trait Signal: Clone + fmt::Debug + Send + Sync + 'static {}

/// Message exchanged between transformers or sent to the external observer
pub trait Effect: Clone + fmt::Debug + Send + Sync + 'static {
    /// Effects of a router-only type never reach a transformer
    fn is_router_only(&self) -> bool {
        false
    }
}

/// State snapshot published by a transformer
pub trait Data: Clone + fmt::Debug + Send + Sync + 'static {
    fn key(&self) -> DataKey;
}

/// Payload type of exactly one variant of a data family
pub trait DataVariant<D: Data>: Clone + Send + Sync + 'static {
    const KEY: DataKey;

    fn into_data(self) -> D;

    fn from_data(data: D) -> Option<Self>;
}

/// Message family bundling the four types a router moves around
pub trait Transmission: Send + Sync + 'static {
    type Signal: Signal;
    type Effect: Effect;
    type Data: Data;
    /// Arguments for parameterized computations and executions
    type Args: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;
}

/// Static name of a data variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey(&'static str);

impl DataKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Static name of a registered execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionKey(&'static str);

impl ExecutionKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Effect as carried on the effect bus
#[derive(Debug, Clone)]
pub struct EffectEnvelope<E> {
    pub effect: E,
    pub sender: TransformerId,
    /// Single transformer meant to receive the effect
    pub receiver: Option<TransformerId>,
    /// Deliver to the external observer only
    pub router_only: bool,
}

impl<E: Effect> EffectEnvelope<E> {
    /// Effect for every transformer
    pub fn broadcast(effect: E, sender: TransformerId) -> Self {
        Self {
            effect,
            sender,
            receiver: None,
            router_only: false,
        }
    }

    /// Effect for exactly one transformer
    pub fn addressed(effect: E, sender: TransformerId, receiver: TransformerId) -> Self {
        Self {
            effect,
            sender,
            receiver: Some(receiver),
            router_only: false,
        }
    }

    /// Effect for the external observer only
    pub fn router_only(effect: E, sender: TransformerId) -> Self {
        Self {
            effect,
            sender,
            receiver: None,
            router_only: true,
        }
    }

    pub fn is_router_only(&self) -> bool {
        self.router_only || self.effect.is_router_only()
    }

    /// Whether the transformer `id` should run its effect handler for this envelope
    pub fn is_deliverable_to(&self, id: &TransformerId) -> bool {
        if self.is_router_only() {
            return false;
        }
        match &self.receiver {
            Some(receiver) => receiver == id,
            None => true,
        }
    }
}

/// Which handler produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Signal,
    Effect,
    Computation,
    Execution,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Signal => "signal",
            FailureKind::Effect => "effect",
            FailureKind::Computation => "computation",
            FailureKind::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// Error or panic raised inside a handler, reported on the failure stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub transformer: TransformerId,
    pub kind: FailureKind,
    pub message: String,
}

/// Generate a closed data enum and its variant table.
///
/// Every variant wraps one payload type, and each payload type may appear in
/// only one variant. The variant name becomes the [`DataKey`] of its payload.
/// Derives are taken from the attributes given to the enum.
#[macro_export]
macro_rules! transmission_data {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident($payload:ty) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $variant($payload), )+
        }

        impl $crate::Data for $name {
            fn key(&self) -> $crate::DataKey {
                match self {
                    $( $name::$variant(_) => $crate::DataKey::new(stringify!($variant)), )+
                }
            }
        }

        $(
            impl $crate::DataVariant<$name> for $payload {
                const KEY: $crate::DataKey = $crate::DataKey::new(stringify!($variant));

                fn into_data(self) -> $name {
                    $name::$variant(self)
                }

                fn from_data(data: $name) -> ::core::option::Option<Self> {
                    #[allow(unreachable_patterns)]
                    match data {
                        $name::$variant(value) => ::core::option::Option::Some(value),
                        _ => ::core::option::Option::None,
                    }
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note(String);

    impl Effect for Note {}

    #[derive(Debug, Clone, PartialEq)]
    struct Toast;

    impl Effect for Toast {
        fn is_router_only(&self) -> bool {
            true
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Count(u32);

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Title(String);

    crate::transmission_data! {
        #[derive(Debug, Clone, PartialEq)]
        enum TestData {
            Count(Count),
            Title(Title),
        }
    }

    #[test]
    fn test_data_variant_table() {
        assert_eq!(<Count as DataVariant<TestData>>::KEY, DataKey::new("Count"));
        let data = Title("hello".into()).into_data();
        assert_eq!(data.key().as_str(), "Title");
        assert_eq!(Title::from_data(data.clone()), Some(Title("hello".into())));
        assert_eq!(Count::from_data(data), None);
    }

    #[test]
    fn test_envelope_delivery_rules() {
        let me = TransformerId::new("me");
        let other = TransformerId::new("other");

        let broadcast = EffectEnvelope::broadcast(Note("x".into()), me.clone());
        assert!(broadcast.is_deliverable_to(&me));
        assert!(broadcast.is_deliverable_to(&other));

        let addressed = EffectEnvelope::addressed(Note("x".into()), me.clone(), other.clone());
        assert!(!addressed.is_deliverable_to(&me));
        assert!(addressed.is_deliverable_to(&other));

        let flagged = EffectEnvelope::router_only(Note("x".into()), me.clone());
        assert!(!flagged.is_deliverable_to(&me));

        let typed = EffectEnvelope::broadcast(Toast, me.clone());
        assert!(typed.is_router_only());
        assert!(!typed.is_deliverable_to(&other));
    }
}
