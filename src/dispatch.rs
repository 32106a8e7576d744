use std::sync::Arc;

use crate::{
    config::{ModelSettings, Provider},
    models::{GenerationOutcome, Graph, ResolvedGenerationInputs, ValidationError},
    providers::{ImageProvider, ProviderRegistry},
    resolver,
};

/// A validated request bound to its adapter, ready to run without the graph.
pub struct PreparedDispatch {
    adapter: Arc<dyn ImageProvider>,
    inputs: ResolvedGenerationInputs,
    settings: ModelSettings,
}

impl PreparedDispatch {
    pub fn provider(&self) -> Provider {
        self.adapter.provider()
    }

    pub fn inputs(&self) -> &ResolvedGenerationInputs {
        &self.inputs
    }

    /// Runs the provider call and normalizes its outcome.
    pub async fn execute(self) -> GenerationOutcome {
        let provider = self.adapter.provider();
        let reports_cost = self.adapter.capabilities().reports_cost;

        match self.adapter.generate(&self.inputs, &self.settings).await {
            GenerationOutcome::Success {
                image_b64,
                cost_dollars,
            } => {
                let cost_dollars = if reports_cost { cost_dollars } else { None };
                log::info!(
                    "{} generation succeeded (cost: {})",
                    provider.display_name(),
                    cost_dollars
                        .map(|c| format!("${:.4}", c))
                        .unwrap_or_else(|| "n/a".to_string())
                );
                GenerationOutcome::Success {
                    image_b64,
                    cost_dollars,
                }
            }
            GenerationOutcome::Error { message } => {
                log::warn!("{} generation failed: {}", provider.display_name(), message);
                GenerationOutcome::Error { message }
            }
        }
    }
}

/// Selects the configured provider and checks its capabilities before calling it.
#[derive(Clone)]
pub struct Router {
    registry: ProviderRegistry,
}

impl Router {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolves inputs for `target_id` and validates them for the selected provider.
    ///
    /// # Panics
    ///
    /// Panics if `target_id` is not a generated-image node of `graph`.
    pub fn prepare(
        &self,
        target_id: &str,
        graph: &Graph,
        settings: &ModelSettings,
    ) -> Result<PreparedDispatch, ValidationError> {
        let inputs = resolver::resolve(target_id, graph)?;

        let adapter = self
            .registry
            .get(settings.provider)
            .ok_or(ValidationError::UnknownProvider)?;

        adapter
            .capabilities()
            .validate(settings.provider, &inputs)?;

        Ok(PreparedDispatch {
            adapter: Arc::clone(adapter),
            inputs,
            settings: settings.clone(),
        })
    }

    /// Full pipeline: resolve, validate, call the adapter. Never retries.
    pub async fn dispatch(
        &self,
        target_id: &str,
        graph: &Graph,
        settings: &ModelSettings,
    ) -> GenerationOutcome {
        match self.prepare(target_id, graph, settings) {
            Ok(prepared) => prepared.execute().await,
            Err(e) => {
                log::warn!("Generation for node {} rejected: {}", target_id, e);
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        GeneratedImageData, GenerationStatus, InpaintingData, Node, NodeData, ProvidedImageData,
    };
    use crate::providers::ProviderCapabilities;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeProvider {
        provider: Provider,
        capabilities: ProviderCapabilities,
        calls: Mutex<Vec<ResolvedGenerationInputs>>,
    }

    impl FakeProvider {
        fn new(provider: Provider, accepts_mask: bool, max_images: Option<usize>, reports_cost: bool) -> Arc<Self> {
            Arc::new(Self {
                provider,
                capabilities: ProviderCapabilities {
                    accepts_mask,
                    max_images,
                    reports_cost,
                },
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ResolvedGenerationInputs> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageProvider for FakeProvider {
        fn provider(&self) -> Provider {
            self.provider
        }

        fn capabilities(&self) -> ProviderCapabilities {
            self.capabilities
        }

        async fn generate(
            &self,
            request: &ResolvedGenerationInputs,
            _settings: &ModelSettings,
        ) -> GenerationOutcome {
            self.calls.lock().unwrap().push(request.clone());
            GenerationOutcome::success("RESULT", Some(0.042))
        }
    }

    struct Fakes {
        openai: Arc<FakeProvider>,
        gemini: Arc<FakeProvider>,
        replicate: Arc<FakeProvider>,
        router: Router,
    }

    fn fakes() -> Fakes {
        let openai = FakeProvider::new(Provider::OpenAi, true, None, true);
        let gemini = FakeProvider::new(Provider::Gemini, false, None, false);
        let replicate = FakeProvider::new(Provider::Replicate, false, Some(1), false);
        let registry = ProviderRegistry::new()
            .with_adapter(openai.clone())
            .with_adapter(gemini.clone())
            .with_adapter(replicate.clone());
        Fakes {
            openai,
            gemini,
            replicate,
            router: Router::new(registry),
        }
    }

    fn image_node(id: &str, image: &str) -> Node {
        Node::new(
            id,
            NodeData::ProvidedImage(ProvidedImageData {
                name: id.to_string(),
                image_b64: image.to_string(),
                width: 2,
                height: 2,
            }),
        )
    }

    fn target(id: &str) -> Node {
        Node::new(
            id,
            NodeData::GeneratedImage(GeneratedImageData {
                prompt: "paint it blue".to_string(),
                name: id.to_string(),
                image_b64: None,
                status: GenerationStatus::Prompt,
                cost_dollars: None,
                width: None,
                height: None,
            }),
        )
    }

    /// t <- i(mask) <- b, plus direct c -> t.
    fn masked_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(image_node("b", "IMG_B"));
        graph.add_node(image_node("c", "IMG_C"));
        graph.add_node(Node::new(
            "i",
            NodeData::Inpainting(InpaintingData {
                name: "i".to_string(),
                image_b64: "MASK".to_string(),
                width: 2,
                height: 2,
            }),
        ));
        graph.add_node(target("t"));
        graph.connect("b", "i");
        graph.connect("i", "t");
        graph.connect("c", "t");
        graph
    }

    fn two_image_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(image_node("a", "IMG_A"));
        graph.add_node(image_node("b", "IMG_B"));
        graph.add_node(target("t"));
        graph.connect("a", "t");
        graph.connect("b", "t");
        graph
    }

    fn settings(provider: Provider) -> ModelSettings {
        ModelSettings::new().with_provider(provider)
    }

    #[tokio::test]
    async fn test_openai_receives_images_and_mask() {
        let f = fakes();
        let outcome = f
            .router
            .dispatch("t", &masked_graph(), &settings(Provider::OpenAi))
            .await;

        assert_eq!(outcome, GenerationOutcome::success("RESULT", Some(0.042)));
        let calls = f.openai.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].images, vec!["IMG_B", "IMG_C"]);
        assert_eq!(calls[0].mask.as_deref(), Some("MASK"));
        assert_eq!(calls[0].prompt, "paint it blue");
    }

    #[tokio::test]
    async fn test_mask_rejected_for_gemini_and_replicate() {
        let f = fakes();
        for provider in [Provider::Gemini, Provider::Replicate] {
            let outcome = f.router.dispatch("t", &masked_graph(), &settings(provider)).await;
            let message = outcome.error_message().unwrap().to_string();
            assert!(message.contains("does not support inpainting"), "{}", message);
        }
        assert!(f.gemini.calls().is_empty());
        assert!(f.replicate.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replicate_rejects_two_images() {
        let f = fakes();
        let outcome = f
            .router
            .dispatch("t", &two_image_graph(), &settings(Provider::Replicate))
            .await;
        assert!(outcome
            .error_message()
            .unwrap()
            .contains("accepts only one input image"));
        assert!(f.replicate.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gemini_takes_multiple_images_without_cost() {
        let f = fakes();
        let outcome = f
            .router
            .dispatch("t", &two_image_graph(), &settings(Provider::Gemini))
            .await;
        assert_eq!(outcome, GenerationOutcome::success("RESULT", None));
        assert_eq!(f.gemini.calls()[0].images, vec!["IMG_A", "IMG_B"]);
    }

    #[tokio::test]
    async fn test_too_many_inpainting_nodes_contacts_nobody() {
        let f = fakes();
        let mut graph = masked_graph();
        graph.add_node(Node::new(
            "i2",
            NodeData::Inpainting(InpaintingData {
                name: "i2".to_string(),
                image_b64: "MASK2".to_string(),
                width: 2,
                height: 2,
            }),
        ));
        graph.connect("i2", "t");

        let outcome = f.router.dispatch("t", &graph, &settings(Provider::OpenAi)).await;
        assert_eq!(
            outcome.error_message(),
            Some("Only one inpainting node is allowed")
        );
        assert!(f.openai.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_unknown() {
        let router = Router::new(ProviderRegistry::new());
        let outcome = router
            .dispatch("t", &two_image_graph(), &settings(Provider::OpenAi))
            .await;
        assert_eq!(outcome.error_message(), Some("Unknown provider selected"));
    }

    #[test]
    fn test_prepare_exposes_provider_and_inputs() {
        let f = fakes();
        let prepared = f
            .router
            .prepare("t", &two_image_graph(), &settings(Provider::OpenAi))
            .unwrap();
        assert_eq!(prepared.provider(), Provider::OpenAi);
        assert_eq!(prepared.inputs().images.len(), 2);
    }
}
