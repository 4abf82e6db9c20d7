//! Colour picker: selects a palette colour and tells the others

use crate::features::MULTI_OUTPUT;
use crate::protocol::{ColorPickerUiState, SampleEffect, SampleSignal, SampleTransformer, PALETTE};
use anyhow::anyhow;
use transmission::Result;

pub const COLOR_PICKER: &str = "color-picker";

pub fn color_picker_transformer() -> Result<SampleTransformer> {
    let transformer = SampleTransformer::new(COLOR_PICKER);
    let state = transformer.data_holder(
        ColorPickerUiState {
            selected_color_index: 0,
            background_color: PALETTE[0].to_string(),
        },
        true,
    )?;

    let selected = state.clone();
    transformer.on_signal(move |scope, signal| {
        let state = selected.clone();
        async move {
            let SampleSignal::SelectColor(index) = signal else {
                return Ok(());
            };
            let color = PALETTE
                .get(index)
                .ok_or_else(|| anyhow!("no colour at palette index {index}"))?
                .to_string();
            state.update(|s| ColorPickerUiState {
                selected_color_index: index,
                ..s.clone()
            });
            scope.publish(SampleEffect::BackgroundColorUpdate(color.clone()))?;
            scope.send_effect(SampleEffect::SelectedColorUpdate(color), MULTI_OUTPUT)?;
            Ok(())
        }
    });

    transformer.on_effect(move |_, effect| {
        let state = state.clone();
        async move {
            if let SampleEffect::BackgroundColorUpdate(color) = effect {
                state.update(|s| ColorPickerUiState {
                    background_color: color,
                    ..s.clone()
                });
            }
            Ok(())
        }
    });
    Ok(transformer)
}
