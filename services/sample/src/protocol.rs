//! Message family shared by the sample transformers

use transmission::{transmission_data, Effect, Signal, Transmission};

/// Colours the picker can select, by index
pub const PALETTE: [&str; 5] = ["gray", "red", "green", "blue", "yellow"];

#[derive(Debug, Clone, PartialEq)]
pub enum SampleSignal {
    /// Text typed into the input field
    Input(String),
    /// Palette index chosen in the colour picker
    SelectColor(usize),
}

impl Signal for SampleSignal {}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleEffect {
    InputUpdate(String),
    BackgroundColorUpdate(String),
    SelectedColorUpdate(String),
    /// Output snapshot meant for the application, never for transformers
    RouterPayload(OutputUiState),
}

impl Effect for SampleEffect {
    fn is_router_only(&self) -> bool {
        matches!(self, SampleEffect::RouterPayload(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputUiState {
    pub written_text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputUiState {
    pub output_text: String,
    pub background_color: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiOutputUiState {
    pub written_uppercase_text: String,
    pub background_color: String,
    pub selected_color: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorPickerUiState {
    pub selected_color_index: usize,
    pub background_color: String,
}

/// Raw text last written, held for queries only
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WrittenInput(pub String);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputCalculationResult(pub String);

transmission_data! {
    #[derive(Debug, Clone, PartialEq)]
    pub enum SampleData {
        InputUiState(InputUiState),
        OutputUiState(OutputUiState),
        MultiOutputUiState(MultiOutputUiState),
        ColorPickerUiState(ColorPickerUiState),
        WrittenInput(WrittenInput),
        OutputCalculationResult(OutputCalculationResult),
    }
}

pub struct SampleTransmission;

impl Transmission for SampleTransmission {
    type Signal = SampleSignal;
    type Effect = SampleEffect;
    type Data = SampleData;
    type Args = ();
}

pub type SampleTransformer = transmission::Transformer<SampleTransmission>;
