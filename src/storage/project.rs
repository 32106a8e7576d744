use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    error::{Result, WorkbenchError},
    mask::decode_base64,
    models::Graph,
};

pub const PROJECT_FILE: &str = "workbench.json";

/// File-system name for a node: anything but ASCII word chars and `-` becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A user-chosen directory holding `workbench.json` and one PNG per image node.
#[derive(Debug, Clone)]
pub struct ProjectDirectory {
    root: PathBuf,
}

impl ProjectDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_file(&self) -> PathBuf {
        self.root.join(PROJECT_FILE)
    }

    /// Starts an empty project, creating the directory if needed.
    pub fn reset(&self) -> Result<Graph> {
        let graph = Graph::new();
        self.save(&graph)?;
        Ok(graph)
    }

    /// Writes the graph snapshot and a PNG for every node with image bytes.
    pub fn save(&self, graph: &Graph) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            WorkbenchError::StorageError(format!(
                "failed to create project directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut images = 0;
        for node in &graph.nodes {
            if let Some(image) = node.data.image() {
                let path = self
                    .root
                    .join(format!("{}.png", sanitize_name(node.data.name())));
                fs::write(&path, decode_base64(image)?).map_err(|e| {
                    WorkbenchError::StorageError(format!("failed to write {}: {}", path.display(), e))
                })?;
                images += 1;
            }
        }

        let content = serde_json::to_string_pretty(graph)?;
        fs::write(self.project_file(), content)?;

        log::info!(
            "💾 Project saved to {} ({} nodes, {} images)",
            self.root.display(),
            graph.nodes.len(),
            images
        );
        Ok(())
    }

    pub fn load(&self) -> Result<Graph> {
        let path = self.project_file();
        let content = fs::read_to_string(&path).map_err(|e| {
            WorkbenchError::StorageError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let graph: Graph = serde_json::from_str(&content).map_err(|e| {
            WorkbenchError::SerializationError(format!("failed to parse {}: {}", path.display(), e))
        })?;

        log::info!(
            "📂 Loaded project {} ({} nodes, {} edges)",
            self.root.display(),
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }
}
