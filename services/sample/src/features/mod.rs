//! Feature transformers of the sample application

pub mod color_picker;
pub mod input;
pub mod multi_output;
pub mod output;

pub use color_picker::{color_picker_transformer, COLOR_PICKER};
pub use input::{input_transformer, INPUT};
pub use multi_output::{multi_output_transformer, MULTI_OUTPUT};
pub use output::{output_transformer, OUTPUT};
