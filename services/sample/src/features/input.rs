//! Text input: publishes what was typed and announces it to the others

use crate::protocol::{InputUiState, SampleEffect, SampleSignal, SampleTransformer, WrittenInput};
use transmission::Result;

pub const INPUT: &str = "input";

pub fn input_transformer() -> Result<SampleTransformer> {
    let transformer = SampleTransformer::new(INPUT);
    let state = transformer.data_holder(InputUiState::default(), true)?;
    let written = transformer.data_holder(WrittenInput::default(), false)?;

    transformer.on_signal(move |scope, signal| {
        let state = state.clone();
        let written = written.clone();
        async move {
            if let SampleSignal::Input(text) = signal {
                state.set(InputUiState {
                    written_text: text.clone(),
                });
                written.set(WrittenInput(text.clone()));
                scope.publish(SampleEffect::InputUpdate(text))?;
            }
            Ok(())
        }
    });
    Ok(transformer)
}
