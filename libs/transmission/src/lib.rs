//! # Transmission
//!
//! In-process runtime for independent processing units ("transformers") that
//! talk only through the router.
//!
//! - **Signals** come from outside through [`Router::process_signal`] and
//!   reach every transformer.
//! - **Effects** travel between transformers: broadcast, addressed to one
//!   transformer, or sent to the external observer only.
//! - **Data** snapshots are kept in [`DataHolder`]s and published on the
//!   router's data stream.
//! - **Queries** pull another transformer's current data or the result of one
//!   of its (optionally cached) computations through a [`RequestHandler`].
//!   Each query is delivered to exactly one answerer and always resumes its
//!   caller, with `None` when nothing could answer.
//!
//! ## Usage
//!
//! ```no_run
//! use transmission::{transmission_data, Effect, Router, Signal, Transformer, Transmission};
//!
//! #[derive(Debug, Clone)]
//! enum AppSignal { Typed(String) }
//! impl Signal for AppSignal {}
//!
//! #[derive(Debug, Clone)]
//! enum AppEffect { Echo(String) }
//! impl Effect for AppEffect {}
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! pub struct Text(pub String);
//!
//! transmission_data! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub enum AppData { Text(Text) }
//! }
//!
//! struct App;
//! impl Transmission for App {
//!     type Signal = AppSignal;
//!     type Effect = AppEffect;
//!     type Data = AppData;
//!     type Args = ();
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let input = Transformer::<App>::new("input");
//! let text = input.data_holder(Text::default(), true)?;
//! input.on_signal(move |scope, signal| {
//!     let text = text.clone();
//!     async move {
//!         let AppSignal::Typed(value) = signal;
//!         text.set(Text(value.clone()));
//!         scope.publish(AppEffect::Echo(value))?;
//!         Ok(())
//!     }
//! });
//!
//! let router = Router::new([input])?;
//! let mut data = router.data_stream();
//! router.process_signal(AppSignal::Typed("hi".into()))?;
//! assert_eq!(data.recv().await, Some(AppData::Text(Text("hi".into()))));
//! router.clear();
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod computation;
pub mod config;
pub mod error;
pub mod holder;
pub mod identifier;
pub mod message;
pub mod metrics;
pub mod query;
pub mod router;
pub mod transformer;

mod outlet;
mod storage;

pub use bus::{channel, Broadcast, BusMetrics, BusOutput, BusProducer, BusStats, BusSubscriber};
pub use computation::{ComputationEntry, ExecutionEntry};
pub use config::{BusConfig, DispatchConfig, QueryConfig, RouterConfig};
pub use error::{Result, TransmissionError};
pub use holder::DataHolder;
pub use identifier::{TransformerId, ROUTER_IDENTIFIER};
pub use message::{
    Data, DataKey, DataVariant, Effect, EffectEnvelope, ExecutionKey, FailureKind,
    HandlerFailure, Signal, Transmission,
};
pub use metrics::{RouterMetrics, RouterStats};
pub use outlet::OutletSink;
pub use query::{Query, QueryOutcome, QueryRequest, QueryResult, QueryTarget, QueryToken, RequestHandler};
pub use router::{EffectStream, Router, RouterBuilder, RouterState, TestRegistry};
pub use transformer::{
    CommunicationScope, DispatchMode, EffectHandler, SignalHandler, Transformer, TransformerState,
};
