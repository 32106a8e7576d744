use crate::{
    config::{ModelSettings, Provider},
    error::{Result, WorkbenchError},
    mask::strip_data_url,
    models::{GenerationOutcome, ResolvedGenerationInputs},
    providers::traits::{missing_key_message, ImageProvider, ProviderCapabilities},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";
const TEXT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Default, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    pub text: Option<String>,
    pub inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiInlineData {
    pub mime_type: Option<String>,
    pub data: String,
}

impl GeminiResponse {
    fn first_parts(&self) -> &[GeminiPart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    pub fn image_data(&self) -> Option<&str> {
        self.first_parts()
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.first_parts().first().and_then(|p| p.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

/// Gemini image adapter. Accepts reference images but no edit mask.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn image_payload(request: &ResolvedGenerationInputs) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        parts.extend(request.images.iter().map(|b64| {
            json!({
                "inlineData": {
                    "data": strip_data_url(b64),
                    "mimeType": "image/png"
                }
            })
        }));

        json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            }
        })
    }

    async fn generate_content(&self, model: &str, payload: &Value, api_key: &str) -> Result<GeminiResponse> {
        log::info!("Invoking Gemini model: {}", model);

        let _timer = crate::logger::timer("gemini generateContent");
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| WorkbenchError::RequestError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WorkbenchError::ResponseError(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorBody>(&body)
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

    /// Plain text completion, used by the prompt enhancer.
    pub async fn generate_text(&self, prompt: &str, settings: &ModelSettings) -> Result<String> {
        let api_key = settings.api_key(Provider::Gemini).ok_or_else(|| {
            WorkbenchError::CredentialError(missing_key_message(Provider::Gemini))
        })?;

        let payload = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = self.generate_content(TEXT_MODEL, &payload, api_key).await?;

        response
            .text()
            .map(str::to_string)
            .ok_or_else(|| {
                WorkbenchError::ResponseError("No text response found in Gemini response.".into())
            })
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            accepts_mask: false,
            max_images: None,
            reports_cost: false,
        }
    }

    async fn generate(
        &self,
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
    ) -> GenerationOutcome {
        let Some(api_key) = settings.api_key(Provider::Gemini) else {
            return GenerationOutcome::error(missing_key_message(Provider::Gemini));
        };

        log::debug!("Gemini request with {} reference image(s)", request.images.len());
        let payload = Self::image_payload(request);

        match self.generate_content(IMAGE_MODEL, &payload, api_key).await {
            Ok(response) => match response.image_data() {
                Some(b64) => GenerationOutcome::success(b64, None),
                None => GenerationOutcome::error("No image data found in Gemini response."),
            },
            Err(e) => {
                log::error!("Gemini image request failed: {}", e);
                GenerationOutcome::error(format!("Gemini API error: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_payload_parts() {
        let request = ResolvedGenerationInputs {
            prompt: "make it snow".to_string(),
            images: vec![
                "data:image/png;base64,QUFB".to_string(),
                "QkJC".to_string(),
            ],
            mask: None,
        };

        let payload = GeminiProvider::image_payload(&request);
        let parts = payload["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "make it snow");
        assert_eq!(parts[1]["inlineData"]["data"], "QUFB");
        assert_eq!(parts[2]["inlineData"]["data"], "QkJC");
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn test_image_found_after_text_part() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": "SU1H" } }
                    ]
                }
            }]
        }))
        .unwrap();
        assert_eq!(response.image_data(), Some("SU1H"));
        assert_eq!(response.text(), Some("Here you go"));
    }

    #[test]
    fn test_no_candidates() {
        let response: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.image_data(), None);
        assert_eq!(response.text(), None);
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let provider = GeminiProvider::new().with_base_url("http://127.0.0.1:9");
        let outcome = provider
            .generate(&ResolvedGenerationInputs::default(), &ModelSettings::new())
            .await;
        assert!(outcome.error_message().unwrap().starts_with("Gemini API key not configured"));

        let text = provider.generate_text("hi", &ModelSettings::new()).await;
        assert!(matches!(text, Err(WorkbenchError::CredentialError(_))));
    }
}
