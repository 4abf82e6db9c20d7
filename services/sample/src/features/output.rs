//! Output: mirrors the input and owns the cached calculation

use crate::features::{COLOR_PICKER, INPUT};
use crate::protocol::{
    ColorPickerUiState, OutputCalculationResult, OutputUiState, SampleEffect, SampleTransformer,
    WrittenInput,
};
use transmission::Result;

pub const OUTPUT: &str = "output";

pub fn output_transformer() -> Result<SampleTransformer> {
    let transformer = SampleTransformer::new(OUTPUT);
    let state = transformer.data_holder(OutputUiState::default(), true)?;

    // Cached until a caller asks for a fresh run
    transformer.register_computation::<OutputCalculationResult, _, _>(true, |requests| async move {
        let Some(WrittenInput(written)) = requests.get_data::<WrittenInput>(INPUT).await else {
            return Ok(None);
        };
        let index = requests
            .find_data::<ColorPickerUiState>()
            .await
            .map(|picker| picker.selected_color_index)
            .unwrap_or_default();
        let result = written.chars().count() * (index + 1);
        Ok(Some(OutputCalculationResult(format!(
            "result is {result} with ({written}) and {index}"
        ))))
    })?;

    transformer.on_effect(move |scope, effect| {
        let state = state.clone();
        async move {
            match effect {
                SampleEffect::InputUpdate(text) => {
                    state.update(|s| OutputUiState {
                        output_text: text.clone(),
                        ..s.clone()
                    });
                    let selected = scope
                        .query_data::<ColorPickerUiState>(COLOR_PICKER)
                        .await
                        .map(|picker| picker.selected_color_index.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    let snapshot = state.update(|s| OutputUiState {
                        output_text: format!("{} and selected color index is {selected}", s.output_text),
                        ..s.clone()
                    });
                    scope.publish(SampleEffect::RouterPayload(snapshot))?;
                }
                SampleEffect::BackgroundColorUpdate(color) => {
                    state.update(|s| OutputUiState {
                        background_color: color,
                        ..s.clone()
                    });
                }
                SampleEffect::SelectedColorUpdate(_) | SampleEffect::RouterPayload(_) => {}
            }
            Ok(())
        }
    });
    Ok(transformer)
}
