use crate::settings::{Mode, StrengthTier, Style, StyleStrength};

/// Inputs for [`compose_prompt`]. Values are assumed to already satisfy the
/// settings invariants.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub mode: Mode,
    pub style: Style,
    pub strength: StyleStrength,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
}

pub fn style_instruction(style: Style, strength: StyleStrength) -> String {
    let descriptor = style.descriptor();
    match strength.tier() {
        StrengthTier::Subtle => {
            format!("Subtly blend the provided image(s) with the style of {descriptor}.")
        }
        StrengthTier::ClearInfluence => format!(
            "Redraw the provided image(s) with a clear influence from the style of {descriptor}."
        ),
        StrengthTier::CompleteRedraw => {
            format!("Completely redraw the provided image(s) in the style of {descriptor}.")
        }
    }
}

/// Builds the final model instruction.
///
/// The mode does not change the wording today; both modes refer to
/// "the provided image(s)".
pub fn compose_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut out = style_instruction(inputs.style, inputs.strength);
    if !inputs.prompt.trim().is_empty() {
        out.push_str(" Also, incorporate this description: ");
        out.push_str(inputs.prompt);
    }
    let negative = inputs.negative_prompt.trim();
    if !negative.is_empty() {
        out.push_str(" Avoid the following elements: ");
        out.push_str(negative);
    }
    out
}
