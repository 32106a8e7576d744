pub mod gemini;
pub mod openai;
pub mod replicate;
pub mod traits;

use crate::{config::Provider, error::Result};
use std::collections::HashMap;
use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use replicate::ReplicateProvider;
pub use traits::{ImageProvider, ProviderCapabilities};

/// Provider-keyed lookup table of adapters.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    /// Empty registry; every dispatch fails until adapters are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the OpenAI, Gemini and Replicate adapters.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new()
            .with_adapter(Arc::new(OpenAiProvider::new()?))
            .with_adapter(Arc::new(GeminiProvider::new()))
            .with_adapter(Arc::new(ReplicateProvider::new())))
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ImageProvider>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn ImageProvider>) {
        log::debug!("Registering image provider: {}", adapter.provider());
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn ImageProvider>> {
        self.adapters.get(&provider)
    }

    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }
}
