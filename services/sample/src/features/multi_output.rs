//! Multi-output: combines input, colours and the output calculation

use crate::features::OUTPUT;
use crate::protocol::{MultiOutputUiState, OutputCalculationResult, SampleEffect, SampleTransformer};
use transmission::Result;

pub const MULTI_OUTPUT: &str = "multi-output";

pub fn multi_output_transformer() -> Result<SampleTransformer> {
    let transformer = SampleTransformer::new(MULTI_OUTPUT);
    let state = transformer.data_holder(MultiOutputUiState::default(), true)?;

    transformer.on_effect(move |scope, effect| {
        let state = state.clone();
        async move {
            match effect {
                SampleEffect::InputUpdate(text) => {
                    state.update(|s| MultiOutputUiState {
                        written_uppercase_text: text.to_uppercase(),
                        ..s.clone()
                    });
                    let result = scope
                        .query_computation::<OutputCalculationResult>(OUTPUT, true)
                        .await
                        .map(|result| result.0)
                        .unwrap_or_else(|| "unavailable".to_string());
                    state.update(|s| MultiOutputUiState {
                        written_uppercase_text: format!("{} {result}", s.written_uppercase_text),
                        ..s.clone()
                    });
                }
                SampleEffect::BackgroundColorUpdate(color) => {
                    state.update(|s| MultiOutputUiState {
                        background_color: color,
                        ..s.clone()
                    });
                }
                SampleEffect::SelectedColorUpdate(color) => {
                    state.update(|s| MultiOutputUiState {
                        selected_color: color,
                        ..s.clone()
                    });
                }
                SampleEffect::RouterPayload(_) => {}
            }
            Ok(())
        }
    });
    Ok(transformer)
}
