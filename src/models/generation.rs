use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::graph::Base64Image;
use crate::config::Provider;

/// Effective inputs of one generation attempt, computed fresh from the graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedGenerationInputs {
    pub prompt: String,
    pub images: Vec<Base64Image>,
    pub mask: Option<Base64Image>,
}

/// Unified result of a generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationOutcome {
    Error {
        message: String,
    },
    Success {
        #[serde(rename = "imageB64")]
        image_b64: Base64Image,
        #[serde(rename = "costDollars", skip_serializing_if = "Option::is_none")]
        cost_dollars: Option<f64>,
    },
}

impl GenerationOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        GenerationOutcome::Error {
            message: message.into(),
        }
    }

    pub fn success(image_b64: impl Into<String>, cost_dollars: Option<f64>) -> Self {
        GenerationOutcome::Success {
            image_b64: image_b64.into(),
            cost_dollars,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Error { message } => Some(message),
            GenerationOutcome::Success { .. } => None,
        }
    }
}

impl From<ValidationError> for GenerationOutcome {
    fn from(e: ValidationError) -> Self {
        GenerationOutcome::error(e.to_string())
    }
}

/// Problems detected locally, before any provider is contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Only one inpainting node is allowed")]
    TooManyInpaintingNodes,
    #[error("{} does not support inpainting. Disconnect the inpainting node or switch to OpenAI.", .provider.display_name())]
    MaskNotSupported { provider: Provider },
    #[error("{} accepts {}", .provider.display_name(), image_limit(*.max))]
    TooManyImages { provider: Provider, max: usize },
    #[error("Unknown provider selected")]
    UnknownProvider,
}

fn image_limit(max: usize) -> String {
    match max {
        0 => "no input images. Disconnect the image nodes to generate from the prompt.".to_string(),
        1 => "only one input image. Connect only one image node for editing.".to_string(),
        n => format!(
            "at most {} input images. Connect at most {} image nodes for editing.",
            n, n
        ),
    }
}
