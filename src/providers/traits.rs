use crate::{
    config::{ModelSettings, Provider},
    models::{GenerationOutcome, ResolvedGenerationInputs, ValidationError},
};
use async_trait::async_trait;

/// What a provider can do with a resolved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub accepts_mask: bool,
    /// `None` means any number of input images.
    pub max_images: Option<usize>,
    pub reports_cost: bool,
}

impl ProviderCapabilities {
    /// Rejects inputs this provider cannot take, without contacting it.
    pub fn validate(
        &self,
        provider: Provider,
        inputs: &ResolvedGenerationInputs,
    ) -> Result<(), ValidationError> {
        if inputs.mask.is_some() && !self.accepts_mask {
            return Err(ValidationError::MaskNotSupported { provider });
        }
        if let Some(max) = self.max_images {
            if inputs.images.len() > max {
                return Err(ValidationError::TooManyImages { provider, max });
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Performs one provider call. Failures, including a missing credential,
    /// come back as `GenerationOutcome::Error`.
    async fn generate(
        &self,
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
    ) -> GenerationOutcome;
}

/// Message returned when the provider's key slot is empty.
pub fn missing_key_message(provider: Provider) -> String {
    format!(
        "{} API key not configured. Add it to your API key settings.",
        provider.display_name()
    )
}
