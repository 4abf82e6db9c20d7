//! Sample application for the transmission runtime.
//!
//! Four transformers cooperate only through the router:
//!
//! - `input` publishes typed text and broadcasts `InputUpdate`
//! - `output` mirrors it, asks the colour picker for its selection and owns a
//!   cached `OutputCalculationResult` computation
//! - `multi-output` upper-cases the text and re-runs that computation
//! - `color-picker` selects a palette colour, broadcasts the background and
//!   sends the selection to `multi-output` only

pub mod features;
pub mod protocol;
pub mod session;

pub use session::{run_session, Script};

use features::{
    color_picker_transformer, input_transformer, multi_output_transformer, output_transformer,
};
use protocol::SampleTransmission;
use transmission::{Result, Router, RouterConfig};

/// The sample's transformer set behind one router
pub fn sample_router(config: RouterConfig, auto_initialize: bool) -> Result<Router<SampleTransmission>> {
    Router::builder()
        .with_config(config)
        .add_transformer(input_transformer()?)
        .add_transformer(output_transformer()?)
        .add_transformer(multi_output_transformer()?)
        .add_transformer(color_picker_transformer()?)
        .auto_initialize(auto_initialize)
        .build()
}
