use std::time::Duration;

use crate::{
    config::{ModelSettings, Provider},
    error::{Result, WorkbenchError},
    mask::{encode_base64, strip_data_url},
    models::{GenerationOutcome, ResolvedGenerationInputs},
    providers::traits::{missing_key_message, ImageProvider, ProviderCapabilities},
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: usize = 120;

#[derive(Debug, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Value,
    pub urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
}

impl Prediction {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL; models return either a string or a list.
    pub fn output_url(&self) -> Option<&str> {
        match &self.output {
            Value::String(url) => Some(url.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    fn error_detail(&self) -> String {
        match &self.error {
            Value::Null => format!("prediction {}", self.status),
            Value::String(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Flux adapter: text-to-image, or single-image edit through a Kontext model.
#[derive(Clone)]
pub struct ReplicateProvider {
    client: Client,
    base_url: String,
}

impl ReplicateProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: REPLICATE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Picks the model and builds its input. Editing takes exactly one image.
    pub fn prediction_input(
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
    ) -> std::result::Result<(&'static str, Value), String> {
        match request.images.as_slice() {
            [] => Ok((
                settings.replicate_generation_model.model_id(),
                json!({
                    "prompt": request.prompt,
                    "output_format": "png"
                }),
            )),
            [image] => Ok((
                settings.replicate_editing_model.model_id(),
                json!({
                    "prompt": request.prompt,
                    "output_format": "png",
                    "image": format!("data:image/png;base64,{}", strip_data_url(image))
                }),
            )),
            _ => Err(
                "Replicate editing models accept only one input image. Please connect only one image."
                    .to_string(),
            ),
        }
    }

    async fn fetch_prediction(&self, url: &str, api_key: &str) -> Result<Prediction> {
        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| WorkbenchError::RequestError(e.to_string()))?;
        parse_prediction(response).await
    }

    async fn run(&self, model_id: &str, input: Value, api_key: &str) -> Result<Prediction> {
        log::info!("Running Replicate model: {}", model_id);

        let _timer = crate::logger::timer("replicate prediction");
        let response = self
            .client
            .post(format!("{}/models/{}/predictions", self.base_url, model_id))
            .bearer_auth(api_key)
            .header("Prefer", "wait")
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| WorkbenchError::RequestError(e.to_string()))?;

        let mut prediction = parse_prediction(response).await?;

        let mut polls = 0;
        while !prediction.is_terminal() {
            let Some(get_url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                return Err(WorkbenchError::ResponseError(
                    "prediction has no status URL".into(),
                ));
            };
            if polls >= MAX_POLLS {
                return Err(WorkbenchError::ResponseError(format!(
                    "prediction {} did not finish in time",
                    prediction.id
                )));
            }
            polls += 1;
            log::debug!("Prediction {} is {}, polling", prediction.id, prediction.status);
            tokio::time::sleep(POLL_INTERVAL).await;
            prediction = self.fetch_prediction(&get_url, api_key).await?;
        }

        Ok(prediction)
    }

    async fn download_b64(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WorkbenchError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkbenchError::ResponseError(format!(
                "Failed to fetch image: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WorkbenchError::ResponseError(e.to_string()))?;
        Ok(encode_base64(&bytes))
    }

    async fn generate_b64(
        &self,
        model_id: &str,
        input: Value,
        api_key: &str,
    ) -> Result<Option<String>> {
        let prediction = self.run(model_id, input, api_key).await?;
        if prediction.status != "succeeded" {
            return Err(WorkbenchError::ProviderError(classify_error(
                None,
                &prediction.error_detail(),
            )));
        }
        match prediction.output_url() {
            Some(url) => self.download_b64(url).await.map(Some),
            None => Ok(None),
        }
    }
}

impl Default for ReplicateProvider {
    fn default() -> Self {
        Self::new()
    }
}

async fn parse_prediction(response: reqwest::Response) -> Result<Prediction> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| WorkbenchError::ResponseError(e.to_string()))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        return Err(WorkbenchError::ProviderError(classify_error(Some(status), &detail)));
    }

    serde_json::from_str(&body).map_err(|e| WorkbenchError::ResponseError(e.to_string()))
}

/// Maps a failure onto the user-facing Replicate message.
pub fn classify_error(status: Option<StatusCode>, detail: &str) -> String {
    let lower = detail.to_lowercase();
    if status == Some(StatusCode::UNAUTHORIZED) || lower.contains("authentication") {
        "Invalid Replicate API key. Please check your API key configuration.".to_string()
    } else if status == Some(StatusCode::PAYMENT_REQUIRED)
        || lower.contains("quota")
        || lower.contains("billing")
    {
        "Replicate API quota exceeded or billing issue. Please check your account.".to_string()
    } else {
        format!("Replicate API error: {}", detail)
    }
}

#[async_trait]
impl ImageProvider for ReplicateProvider {
    fn provider(&self) -> Provider {
        Provider::Replicate
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            accepts_mask: false,
            max_images: Some(1),
            reports_cost: false,
        }
    }

    async fn generate(
        &self,
        request: &ResolvedGenerationInputs,
        settings: &ModelSettings,
    ) -> GenerationOutcome {
        let Some(api_key) = settings.api_key(Provider::Replicate) else {
            return GenerationOutcome::error(missing_key_message(Provider::Replicate));
        };

        let (model_id, input) = match Self::prediction_input(request, settings) {
            Ok(built) => built,
            Err(message) => return GenerationOutcome::error(message),
        };

        match self.generate_b64(model_id, input, api_key).await {
            Ok(Some(b64)) => GenerationOutcome::success(b64, None),
            Ok(None) => GenerationOutcome::error("No image generated from Replicate API"),
            Err(WorkbenchError::ProviderError(message)) => {
                log::error!("Replicate request failed: {}", message);
                GenerationOutcome::error(message)
            }
            Err(e) => {
                log::error!("Replicate request failed: {}", e);
                GenerationOutcome::error(classify_error(None, &e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplicateEditingModel, ReplicateGenerationModel};

    fn request(images: &[&str]) -> ResolvedGenerationInputs {
        ResolvedGenerationInputs {
            prompt: "neon city".to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
            mask: None,
        }
    }

    #[test]
    fn test_generation_model_without_images() {
        let settings = ModelSettings::new().with_replicate_models(
            ReplicateEditingModel::FluxKontextMax,
            ReplicateGenerationModel::Flux11Pro,
        );
        let (model, input) = ReplicateProvider::prediction_input(&request(&[]), &settings).unwrap();
        assert_eq!(model, "black-forest-labs/flux-1.1-pro");
        assert_eq!(input["output_format"], "png");
        assert!(input.get("image").is_none());
    }

    #[test]
    fn test_editing_model_with_one_image() {
        let settings = ModelSettings::new().with_replicate_models(
            ReplicateEditingModel::FluxKontextMax,
            ReplicateGenerationModel::FluxSchnell,
        );
        let (model, input) =
            ReplicateProvider::prediction_input(&request(&["QUJD"]), &settings).unwrap();
        assert_eq!(model, "black-forest-labs/flux-kontext-max");
        assert_eq!(input["image"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_two_images_rejected() {
        let result = ReplicateProvider::prediction_input(&request(&["A", "B"]), &ModelSettings::new());
        assert!(result.unwrap_err().contains("only one input image"));
    }

    #[test]
    fn test_prediction_output_shapes() {
        let list: Prediction = serde_json::from_value(json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://example.test/a.png", "https://example.test/b.png"]
        }))
        .unwrap();
        assert!(list.is_terminal());
        assert_eq!(list.output_url(), Some("https://example.test/a.png"));

        let single: Prediction = serde_json::from_value(json!({
            "status": "processing",
            "output": "https://example.test/c.png",
            "urls": { "get": "https://api.replicate.com/v1/predictions/p2" }
        }))
        .unwrap();
        assert!(!single.is_terminal());
        assert_eq!(single.output_url(), Some("https://example.test/c.png"));
    }

    #[test]
    fn test_error_classification() {
        assert!(classify_error(Some(StatusCode::UNAUTHORIZED), "nope").starts_with("Invalid Replicate API key"));
        assert!(classify_error(None, "Authentication token invalid").starts_with("Invalid Replicate API key"));
        assert!(classify_error(Some(StatusCode::PAYMENT_REQUIRED), "x").contains("quota exceeded"));
        assert!(classify_error(None, "monthly billing limit").contains("billing issue"));
        assert_eq!(classify_error(None, "boom"), "Replicate API error: boom");
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let provider = ReplicateProvider::new().with_base_url("http://127.0.0.1:9");
        let outcome = provider
            .generate(&request(&[]), &ModelSettings::new())
            .await;
        assert!(outcome.error_message().unwrap().starts_with("Replicate API key not configured"));
    }
}
