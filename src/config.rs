use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::WorkbenchError;

/// Image generation backend selected for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
    Replicate,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Gemini, Provider::Replicate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Replicate => "replicate",
        }
    }

    /// Name used in user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Gemini => "Gemini",
            Provider::Replicate => "Replicate",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = WorkbenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "replicate" => Ok(Provider::Replicate),
            other => Err(WorkbenchError::ConfigError(format!(
                "Unknown provider: {}",
                other
            ))),
        }
    }
}

/// Declares a settings enum whose variants map one-to-one onto wire strings.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = WorkbenchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($wire => Ok($name::$variant),)+
                    other => Err(WorkbenchError::ConfigError(format!(
                        "Invalid {}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum!(
    /// OpenAI rendering quality.
    Quality { Low => "low", Medium => "medium", High => "high" }
);

wire_enum!(
    /// OpenAI output size.
    ImageSize {
        Square => "1024x1024",
        Landscape => "1536x1024",
        Portrait => "1024x1536",
    }
);

wire_enum!(
    /// OpenAI background handling.
    Background { Transparent => "transparent", Opaque => "opaque", Auto => "auto" }
);

wire_enum!(
    ReplicateEditingModel {
        FluxKontextPro => "flux-kontext-pro",
        FluxKontextMax => "flux-kontext-max",
    }
);

wire_enum!(
    ReplicateGenerationModel {
        FluxSchnell => "flux-schnell",
        Flux11Pro => "flux-1.1-pro",
        Flux11ProUltra => "flux-1.1-pro-ultra",
    }
);

impl ReplicateEditingModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            ReplicateEditingModel::FluxKontextPro => "black-forest-labs/flux-kontext-pro",
            ReplicateEditingModel::FluxKontextMax => "black-forest-labs/flux-kontext-max",
        }
    }
}

impl ReplicateGenerationModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            ReplicateGenerationModel::FluxSchnell => "black-forest-labs/flux-schnell",
            ReplicateGenerationModel::Flux11Pro => "black-forest-labs/flux-1.1-pro",
            ReplicateGenerationModel::Flux11ProUltra => "black-forest-labs/flux-1.1-pro-ultra",
        }
    }
}

/// Per-provider credentials. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicate: Option<String>,
}

impl ApiKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        let slot = match provider {
            Provider::OpenAi => &self.openai,
            Provider::Gemini => &self.gemini,
            Provider::Replicate => &self.replicate,
        };
        slot.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn set(&mut self, provider: Provider, key: Option<String>) {
        let slot = match provider {
            Provider::OpenAi => &mut self.openai,
            Provider::Gemini => &mut self.gemini,
            Provider::Replicate => &mut self.replicate,
        };
        *slot = key.filter(|key| !key.trim().is_empty());
    }

    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.set(provider, Some(key.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        Provider::ALL.iter().all(|p| self.get(*p).is_none())
    }

    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = ApiKeys::new();
        keys.set(Provider::OpenAi, var("OPENAI_API_KEY"));
        keys.set(Provider::Gemini, var("GEMINI_API_KEY"));
        keys.set(Provider::Replicate, var("REPLICATE_API_TOKEN"));
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    pub provider: Provider,
    pub quality: Quality,
    pub size: ImageSize,
    pub background: Background,
    pub replicate_editing_model: ReplicateEditingModel,
    pub replicate_generation_model: ReplicateGenerationModel,
    #[serde(default)]
    pub api_keys: ApiKeys,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            provider: Provider::OpenAi,
            quality: Quality::Medium,
            size: ImageSize::Square,
            background: Background::Auto,
            replicate_editing_model: ReplicateEditingModel::FluxKontextPro,
            replicate_generation_model: ReplicateGenerationModel::FluxSchnell,
            api_keys: ApiKeys::default(),
        }
    }
}

fn parse_or_default<T: FromStr<Err = WorkbenchError>>(
    name: &str,
    raw: Option<String>,
    default: T,
) -> T {
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            log::warn!("Ignoring {}: {}", name, e);
            default
        }),
        None => default,
    }
}

impl ModelSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `WORKBENCH_*` knobs and provider keys. An unrecognized
    /// `WORKBENCH_PROVIDER` is an error; other bad values fall back to defaults.
    pub fn from_env() -> Result<Self, WorkbenchError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, WorkbenchError> {
        let defaults = ModelSettings::default();

        let provider = match var("WORKBENCH_PROVIDER").filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => raw.parse().map_err(|_| {
                WorkbenchError::ConfigError(format!(
                    "Unknown provider selected: WORKBENCH_PROVIDER={}",
                    raw
                ))
            })?,
            None => defaults.provider,
        };

        Ok(ModelSettings {
            provider,
            quality: parse_or_default(
                "WORKBENCH_QUALITY",
                var("WORKBENCH_QUALITY"),
                defaults.quality,
            ),
            size: parse_or_default("WORKBENCH_SIZE", var("WORKBENCH_SIZE"), defaults.size),
            background: parse_or_default(
                "WORKBENCH_BACKGROUND",
                var("WORKBENCH_BACKGROUND"),
                defaults.background,
            ),
            replicate_editing_model: parse_or_default(
                "WORKBENCH_REPLICATE_EDITING_MODEL",
                var("WORKBENCH_REPLICATE_EDITING_MODEL"),
                defaults.replicate_editing_model,
            ),
            replicate_generation_model: parse_or_default(
                "WORKBENCH_REPLICATE_GENERATION_MODEL",
                var("WORKBENCH_REPLICATE_GENERATION_MODEL"),
                defaults.replicate_generation_model,
            ),
            api_keys: ApiKeys::from_vars(&var),
        })
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn with_replicate_models(
        mut self,
        editing: ReplicateEditingModel,
        generation: ReplicateGenerationModel,
    ) -> Self {
        self.replicate_editing_model = editing;
        self.replicate_generation_model = generation;
        self
    }

    pub fn with_api_keys(mut self, api_keys: ApiKeys) -> Self {
        self.api_keys = api_keys;
        self
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.api_keys.get(provider)
    }

    /// Key for the currently selected provider, if configured.
    pub fn active_api_key(&self) -> Option<&str> {
        self.api_key(self.provider)
    }
}
