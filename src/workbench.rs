use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    config::{ApiKeys, ModelSettings},
    dispatch::Router,
    error::{Result, WorkbenchError},
    mask,
    models::{
        GeneratedImageData, GenerationOutcome, GenerationStatus, Graph, InpaintingData, Node,
        NodeData, ProvidedImageData,
    },
    providers::traits::missing_key_message,
    storage::{CredentialStore, ProjectDirectory},
};

/// The inpainting node currently open in the paint tool.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintSession {
    pub block_id: String,
    pub image_b64: String,
}

/// Application state: the graph, model settings and paint session, shared by
/// every operation. Wrap in an `Arc` to run generations for different nodes
/// concurrently; locks are never held across a provider call.
pub struct Workbench {
    graph: RwLock<Graph>,
    settings: RwLock<ModelSettings>,
    router: Router,
    credentials: Option<CredentialStore>,
    inpainter: Mutex<Option<PaintSession>>,
}

fn poisoned(what: &str) -> WorkbenchError {
    WorkbenchError::InternalError(format!("{} lock poisoned", what))
}

impl Workbench {
    pub fn new(settings: ModelSettings, router: Router) -> Self {
        Self {
            graph: RwLock::new(Graph::new()),
            settings: RwLock::new(settings),
            router,
            credentials: None,
            inpainter: Mutex::new(None),
        }
    }

    /// Attaches durable key storage. Stored keys replace the in-memory ones
    /// when any are present.
    pub fn with_credential_store(self, store: CredentialStore) -> Result<Self> {
        let stored = store.load()?;
        if !stored.is_empty() {
            self.write_settings()?.api_keys = stored;
        }
        Ok(Self {
            credentials: Some(store),
            ..self
        })
    }

    fn read_graph(&self) -> Result<RwLockReadGuard<'_, Graph>> {
        self.graph.read().map_err(|_| poisoned("graph"))
    }

    fn write_graph(&self) -> Result<RwLockWriteGuard<'_, Graph>> {
        self.graph.write().map_err(|_| poisoned("graph"))
    }

    fn write_settings(&self) -> Result<RwLockWriteGuard<'_, ModelSettings>> {
        self.settings.write().map_err(|_| poisoned("settings"))
    }

    fn lock_inpainter(&self) -> Result<MutexGuard<'_, Option<PaintSession>>> {
        self.inpainter.lock().map_err(|_| poisoned("inpainter"))
    }

    pub fn graph(&self) -> Result<Graph> {
        Ok(self.read_graph()?.clone())
    }

    pub fn node(&self, id: &str) -> Result<Node> {
        self.read_graph()?
            .node(id)
            .cloned()
            .ok_or_else(|| WorkbenchError::NodeNotFound(id.to_string()))
    }

    pub fn replace_graph(&self, graph: Graph) -> Result<()> {
        *self.write_graph()? = graph;
        Ok(())
    }

    pub fn settings(&self) -> Result<ModelSettings> {
        Ok(self.settings.read().map_err(|_| poisoned("settings"))?.clone())
    }

    /// Applies a settings change. API key changes go through [`Self::set_api_keys`].
    pub fn update_settings(&self, update: impl FnOnce(&mut ModelSettings)) -> Result<()> {
        let mut settings = self.write_settings()?;
        let keys = settings.api_keys.clone();
        update(&mut settings);
        settings.api_keys = keys;
        Ok(())
    }

    pub fn set_api_keys(&self, keys: ApiKeys) -> Result<()> {
        if let Some(store) = &self.credentials {
            store.save(&keys)?;
        }
        self.write_settings()?.api_keys = keys;
        log::info!("🔑 API keys saved");
        Ok(())
    }

    pub fn clear_api_keys(&self) -> Result<()> {
        if let Some(store) = &self.credentials {
            store.clear()?;
        }
        self.write_settings()?.api_keys = ApiKeys::new();
        log::info!("🔑 All API keys cleared");
        Ok(())
    }

    /// Loads a saved graph. Nothing is in flight after a load, so nodes saved
    /// mid-generation go back to `Prompt`.
    pub fn load_project(&self, project: &ProjectDirectory) -> Result<()> {
        let mut graph = project.load()?;
        let stale = graph.reset_processing();
        if stale > 0 {
            log::warn!(
                "Reset {} node(s) saved while processing in {}",
                stale,
                project.root().display()
            );
        }
        self.replace_graph(graph)
    }

    pub fn save_project(&self, project: &ProjectDirectory) -> Result<()> {
        let graph = self.graph()?;
        project.save(&graph)
    }

    pub fn create_provided_image_node(&self, name: &str, image_b64: &str) -> Result<String> {
        let image_b64 = mask::strip_data_url(image_b64).to_string();
        let (width, height) = mask::png_dimensions(&image_b64)?;
        let node = Node::with_new_id(NodeData::ProvidedImage(ProvidedImageData {
            name: name.to_string(),
            image_b64,
            width,
            height,
        }));
        log::info!("🖼️  Added image node '{}' ({}x{})", name, width, height);
        Ok(self.write_graph()?.add_node(node))
    }

    /// Imports a PNG file as a provided-image node named after the file stem.
    pub fn import_image(&self, path: &Path) -> Result<String> {
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if !is_png {
            return Err(WorkbenchError::ImageError(format!(
                "{} is not a PNG image",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();
        self.create_provided_image_node(&name, &mask::encode_base64(&bytes))
    }

    pub fn create_generated_image_node(&self, prompt: &str) -> Result<String> {
        let node = Node::with_new_id(NodeData::GeneratedImage(GeneratedImageData {
            prompt: prompt.to_string(),
            name: uuid::Uuid::new_v4().to_string(),
            image_b64: None,
            status: GenerationStatus::Prompt,
            cost_dollars: None,
            width: None,
            height: None,
        }));
        Ok(self.write_graph()?.add_node(node))
    }

    pub fn set_prompt(&self, id: &str, prompt: &str) -> Result<()> {
        let mut graph = self.write_graph()?;
        generated_mut(&mut graph, id)?.prompt = prompt.to_string();
        Ok(())
    }

    pub fn connect(&self, source: &str, target: &str) -> Result<String> {
        let mut graph = self.write_graph()?;
        for id in [source, target] {
            if graph.node(id).is_none() {
                return Err(WorkbenchError::NodeNotFound(id.to_string()));
            }
        }
        Ok(graph.connect(source, target))
    }

    /// Adds an inpainting node fed by `source_id`. Its mask starts as a copy
    /// of the source image.
    pub fn derive_inpainting(&self, source_id: &str) -> Result<String> {
        let mut graph = self.write_graph()?;
        let source = graph
            .node(source_id)
            .ok_or_else(|| WorkbenchError::NodeNotFound(source_id.to_string()))?;
        let image = source
            .data
            .image()
            .ok_or_else(|| WorkbenchError::MissingImage(source_id.to_string()))?
            .to_string();
        let (width, height) = match source.data.dimensions() {
            Some(dims) => dims,
            None => mask::png_dimensions(&image)?,
        };

        let id = graph.add_node(Node::with_new_id(NodeData::Inpainting(InpaintingData {
            name: uuid::Uuid::new_v4().to_string(),
            image_b64: image,
            width,
            height,
        })));
        graph.connect(source_id, id.clone());
        log::info!("🩹 Derived inpainting node {} from {}", id, source_id);
        Ok(id)
    }

    pub fn update_inpainting_mask(&self, id: &str, mask_b64: &str) -> Result<()> {
        let mut graph = self.write_graph()?;
        let data = graph
            .node_mut(id)
            .ok_or_else(|| WorkbenchError::NodeNotFound(id.to_string()))?
            .as_inpainting_mut()
            .ok_or_else(|| WorkbenchError::NodeKindMismatch {
                id: id.to_string(),
                expected: "inpainting",
            })?;
        data.image_b64 = mask::strip_data_url(mask_b64).to_string();
        Ok(())
    }

    pub fn open_inpainter(&self, id: &str) -> Result<PaintSession> {
        let node = self.node(id)?;
        let NodeData::Inpainting(data) = node.data else {
            return Err(WorkbenchError::NodeKindMismatch {
                id: id.to_string(),
                expected: "inpainting",
            });
        };
        let session = PaintSession {
            block_id: id.to_string(),
            image_b64: data.image_b64,
        };
        *self.lock_inpainter()? = Some(session.clone());
        Ok(session)
    }

    pub fn paint_session(&self) -> Result<Option<PaintSession>> {
        Ok(self.lock_inpainter()?.clone())
    }

    pub fn close_inpainter(&self) -> Result<()> {
        *self.lock_inpainter()? = None;
        Ok(())
    }

    /// Composites the painted layers into the open node's mask and closes the session.
    pub fn save_mask(&self, width: u32, height: u32, base: &[u8], strokes: &[u8]) -> Result<()> {
        let mut inpainter = self.lock_inpainter()?;
        let session = inpainter
            .take()
            .ok_or(WorkbenchError::NoActivePaintSession)?;
        let mask_b64 = mask::composite(width, height, base, strokes);
        self.finish_paint_session(&mut inpainter, session, mask_b64)
    }

    /// Like [`Self::save_mask`], with the session image as the base layer and
    /// the strokes given as a PNG.
    pub fn save_mask_png(&self, strokes_b64: &str) -> Result<()> {
        let mut inpainter = self.lock_inpainter()?;
        let session = inpainter
            .take()
            .ok_or(WorkbenchError::NoActivePaintSession)?;
        let mask_b64 = mask::composite_png(&session.image_b64, strokes_b64);
        self.finish_paint_session(&mut inpainter, session, mask_b64)
    }

    /// Stores the mask and leaves the session closed. A failed composite keeps it open.
    fn finish_paint_session(
        &self,
        inpainter: &mut Option<PaintSession>,
        session: PaintSession,
        mask_b64: Result<String>,
    ) -> Result<()> {
        let mask_b64 = match mask_b64 {
            Ok(mask_b64) => mask_b64,
            Err(e) => {
                *inpainter = Some(session);
                return Err(e);
            }
        };
        self.update_inpainting_mask(&session.block_id, &mask_b64)?;
        log::info!("🩹 Saved mask for node {}", session.block_id);
        Ok(())
    }

    /// Runs one generation for `id` and records the result on the node.
    ///
    /// Recoverable failures come back as `GenerationOutcome::Error` with the
    /// node reverted to `Prompt`. A missing node, a node of another kind or a
    /// node already processing is an `Err`.
    pub async fn generate_image(&self, id: &str) -> Result<GenerationOutcome> {
        let settings = self.settings()?;

        let prepared = {
            let mut graph = self.write_graph()?;
            let data = generated_mut(&mut graph, id)?;
            if data.status == GenerationStatus::Processing {
                return Err(WorkbenchError::AlreadyProcessing(id.to_string()));
            }
            if settings.active_api_key().is_none() {
                log::warn!("No API key for {}", settings.provider.display_name());
                return Ok(GenerationOutcome::error(missing_key_message(settings.provider)));
            }
            data.status = GenerationStatus::Processing;

            match self.router.prepare(id, &graph, &settings) {
                Ok(prepared) => prepared,
                Err(e) => {
                    generated_mut(&mut graph, id)?.status = GenerationStatus::Prompt;
                    log::warn!("Generation for node {} rejected: {}", id, e);
                    return Ok(e.into());
                }
            }
        };

        log::info!(
            "🎨 Generating node {} with {}",
            id,
            prepared.provider().display_name()
        );
        let in_flight = InFlight {
            workbench: self,
            id,
            settled: false,
        };
        let outcome = prepared.execute().await;
        self.record_outcome(id, &outcome)?;
        in_flight.settle();
        Ok(outcome)
    }

    fn record_outcome(&self, id: &str, outcome: &GenerationOutcome) -> Result<()> {
        let mut graph = self.write_graph()?;
        let Some(data) = graph.node_mut(id).and_then(Node::as_generated_mut) else {
            log::warn!("Node {} disappeared while generating", id);
            return Ok(());
        };

        match outcome {
            GenerationOutcome::Error { .. } => data.status = GenerationStatus::Prompt,
            GenerationOutcome::Success {
                image_b64,
                cost_dollars,
            } => {
                let dims = match mask::png_dimensions(image_b64) {
                    Ok(dims) => Some(dims),
                    Err(e) => {
                        log::warn!("Could not read size of generated image: {}", e);
                        None
                    }
                };
                data.image_b64 = Some(image_b64.clone());
                data.cost_dollars = *cost_dollars;
                data.width = dims.map(|(w, _)| w);
                data.height = dims.map(|(_, h)| h);
                data.status = GenerationStatus::Completed;
            }
        }
        Ok(())
    }
}

/// Marks a generation in progress. Dropped unsettled (future cancelled or
/// outcome not recorded), it puts the node back to `Prompt`.
struct InFlight<'a> {
    workbench: &'a Workbench,
    id: &'a str,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut graph = self
            .workbench
            .graph
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(data) = graph.node_mut(self.id).and_then(Node::as_generated_mut) {
            if data.status == GenerationStatus::Processing {
                log::warn!("Generation for node {} abandoned", self.id);
                data.status = GenerationStatus::Prompt;
            }
        }
    }
}

fn generated_mut<'a>(graph: &'a mut Graph, id: &str) -> Result<&'a mut GeneratedImageData> {
    graph
        .node_mut(id)
        .ok_or_else(|| WorkbenchError::NodeNotFound(id.to_string()))?
        .as_generated_mut()
        .ok_or_else(|| WorkbenchError::NodeKindMismatch {
            id: id.to_string(),
            expected: "generated-image",
        })
}
