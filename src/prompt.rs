use crate::{
    config::ModelSettings,
    error::{Result, WorkbenchError},
    providers::GeminiProvider,
};

fn enhancement_instructions(original: &str) -> String {
    format!(
        "You are an expert prompt engineer for image generation. Rewrite and improve the following prompt for better image generation results.

Requirements:
- Rewrite the prompt in clear, detailed English
- Focus on visual details, style, composition, and artistic elements
- Keep the core concept but enhance the description
- Your response must contain ONLY the improved prompt text
- Do not include any explanations, prefixes, quotes, or additional text

Original prompt: \"{}\"",
        original
    )
}

/// Rewrites a prompt with Gemini's text model. Needs the Gemini key.
pub async fn enhance_prompt(
    gemini: &GeminiProvider,
    original: &str,
    settings: &ModelSettings,
) -> Result<String> {
    if original.trim().is_empty() {
        return Err(WorkbenchError::RequestError(
            "Please provide a prompt to enhance.".into(),
        ));
    }

    let enhanced = gemini
        .generate_text(&enhancement_instructions(original), settings)
        .await?;
    let enhanced = enhanced.trim().to_string();
    log::debug!("Enhanced prompt ({} -> {} chars)", original.len(), enhanced.len());
    Ok(enhanced)
}
