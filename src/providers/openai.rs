use std::time::Duration;

use crate::{
    config::{ModelSettings, Provider},
    error::{Result, WorkbenchError},
    mask::decode_base64,
    models::{GenerationOutcome, ResolvedGenerationInputs},
    providers::traits::{missing_key_message, ImageProvider, ProviderCapabilities},
};
use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use serde_json::{json, Value};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const IMAGE_MODEL: &str = "gpt-image-1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3 * 60);

// Dollars per token.
const TEXT_INPUT_TOKEN_PRICE: f64 = 0.000005;
const IMAGE_INPUT_TOKEN_PRICE: f64 = 0.00001;
const IMAGE_OUTPUT_TOKEN_PRICE: f64 = 0.00004;

#[derive(Debug, Deserialize)]
pub struct OpenAiImagesResponse {
    #[serde(default)]
    pub data: Vec<OpenAiImageData>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiImageData {
    pub b64_json: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: OpenAiInputTokensDetails,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiInputTokensDetails {
    #[serde(default)]
    pub text_tokens: u64,
    #[serde(default)]
    pub image_tokens: u64,
}

impl OpenAiUsage {
    pub fn cost_dollars(&self) -> f64 {
        self.input_tokens_details.text_tokens as f64 * TEXT_INPUT_TOKEN_PRICE
            + self.input_tokens_details.image_tokens as f64 * IMAGE_INPUT_TOKEN_PRICE
            + self.output_tokens as f64 * IMAGE_OUTPUT_TOKEN_PRICE
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// `gpt-image-1` adapter: text-to-image, multi-image edit and masked edit.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WorkbenchError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn generation_payload(request: &ResolvedGenerationInputs, settings: &ModelSettings) -> Value {
        json!({
            "model": IMAGE_MODEL,
            "prompt": request.prompt,
            "quality": settings.quality.as_str(),
            "size": settings.size.as_str(),
            "background": settings.background.as_str(),
            "output_format": "png",
        })
    }

    pub fn edit_form(
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
    ) -> Result<multipart::Form> {
        let mut form = multipart::Form::new()
            .text("model", IMAGE_MODEL)
            .text("prompt", request.prompt.clone())
            .text("quality", settings.quality.as_str());

        for image in &request.images {
            form = form.part("image[]", png_part(image)?);
        }
        if let Some(mask) = &request.mask {
            form = form.part("mask", png_part(mask)?);
        }
        Ok(form)
    }

    async fn call(
        &self,
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
        api_key: &str,
    ) -> Result<OpenAiImagesResponse> {
        let builder = if request.images.is_empty() {
            log::info!("Generating image with model: {}", IMAGE_MODEL);
            self.client
                .post(format!("{}/images/generations", self.base_url))
                .json(&Self::generation_payload(request, settings))
        } else {
            log::info!(
                "Editing {} image(s) with model: {} (mask: {})",
                request.images.len(),
                IMAGE_MODEL,
                request.mask.is_some()
            );
            self.client
                .post(format!("{}/images/edits", self.base_url))
                .multipart(Self::edit_form(request, settings)?)
        };

        let _timer = crate::logger::timer("openai image request");
        let response = builder
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| WorkbenchError::RequestError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WorkbenchError::ResponseError(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(WorkbenchError::ProviderError(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        serde_json::from_str(&body).map_err(|e| WorkbenchError::ResponseError(e.to_string()))
    }

    pub fn outcome_from_response(response: OpenAiImagesResponse) -> GenerationOutcome {
        let cost = response.usage.as_ref().map(OpenAiUsage::cost_dollars);
        match response.data.into_iter().find_map(|d| d.b64_json) {
            Some(b64) => GenerationOutcome::success(b64, cost),
            None => GenerationOutcome::error("OpenAI API error: no image data in response"),
        }
    }
}

fn png_part(b64: &str) -> Result<multipart::Part> {
    multipart::Part::bytes(decode_base64(b64)?)
        .file_name("image.png")
        .mime_str("image/png")
        .map_err(|e| WorkbenchError::RequestError(e.to_string()))
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            accepts_mask: true,
            max_images: None,
            reports_cost: true,
        }
    }

    async fn generate(
        &self,
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
    ) -> GenerationOutcome {
        let Some(api_key) = settings.api_key(Provider::OpenAi) else {
            return GenerationOutcome::error(missing_key_message(Provider::OpenAi));
        };

        match self.call(request, settings, api_key).await {
            Ok(response) => Self::outcome_from_response(response),
            Err(e) => {
                log::error!("OpenAI image request failed: {}", e);
                GenerationOutcome::error(format!("OpenAI API error: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Background, ImageSize, Quality};

    #[test]
    fn test_cost_from_usage() {
        let response: OpenAiImagesResponse = serde_json::from_value(json!({
            "data": [{ "b64_json": "QQ==" }],
            "usage": {
                "input_tokens": 150,
                "output_tokens": 1000,
                "input_tokens_details": { "text_tokens": 50, "image_tokens": 100 }
            }
        }))
        .unwrap();

        match OpenAiProvider::outcome_from_response(response) {
            GenerationOutcome::Success {
                image_b64,
                cost_dollars,
            } => {
                assert_eq!(image_b64, "QQ==");
                let expected = 50.0 * 0.000005 + 100.0 * 0.00001 + 1000.0 * 0.00004;
                assert!((cost_dollars.unwrap() - expected).abs() < 1e-12);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_missing_usage_means_no_cost() {
        let response: OpenAiImagesResponse =
            serde_json::from_value(json!({ "data": [{ "b64_json": "QQ==" }] })).unwrap();
        assert_eq!(
            OpenAiProvider::outcome_from_response(response),
            GenerationOutcome::success("QQ==", None)
        );
    }

    #[test]
    fn test_empty_data_is_error() {
        let response: OpenAiImagesResponse = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert!(!OpenAiProvider::outcome_from_response(response).is_success());
    }

    #[test]
    fn test_generation_payload_uses_settings() {
        let settings = ModelSettings::new()
            .with_quality(Quality::High)
            .with_size(ImageSize::Landscape)
            .with_background(Background::Transparent);
        let request = ResolvedGenerationInputs {
            prompt: "a lighthouse".to_string(),
            ..Default::default()
        };

        let payload = OpenAiProvider::generation_payload(&request, &settings);
        assert_eq!(payload["model"], "gpt-image-1");
        assert_eq!(payload["prompt"], "a lighthouse");
        assert_eq!(payload["quality"], "high");
        assert_eq!(payload["size"], "1536x1024");
        assert_eq!(payload["background"], "transparent");
    }

    #[test]
    fn test_edit_form_rejects_invalid_base64() {
        let request = ResolvedGenerationInputs {
            prompt: "p".to_string(),
            images: vec!["not base64!!".to_string()],
            mask: None,
        };
        assert!(OpenAiProvider::edit_form(&request, &ModelSettings::new()).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let provider = OpenAiProvider::new().unwrap().with_base_url("http://127.0.0.1:9");
        let outcome = provider
            .generate(&ResolvedGenerationInputs::default(), &ModelSettings::new())
            .await;
        assert_eq!(
            outcome.error_message(),
            Some("OpenAI API key not configured. Add it to your API key settings.")
        );
    }
}
