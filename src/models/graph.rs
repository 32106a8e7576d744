use serde::{Deserialize, Serialize};

/// Base64-encoded PNG without a data-URL prefix.
pub type Base64Image = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Prompt,
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidedImageData {
    pub name: String,
    #[serde(rename = "imageB64")]
    pub image_b64: Base64Image,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImageData {
    pub prompt: String,
    pub name: String,
    #[serde(rename = "imageB64", default, skip_serializing_if = "Option::is_none")]
    pub image_b64: Option<Base64Image>,
    #[serde(default)]
    pub status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_dollars: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Mask node. `image_b64` holds the alpha-encoded mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InpaintingData {
    pub name: String,
    #[serde(rename = "imageB64")]
    pub image_b64: Base64Image,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeData {
    ProvidedImage(ProvidedImageData),
    GeneratedImage(GeneratedImageData),
    Inpainting(InpaintingData),
}

impl NodeData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeData::ProvidedImage(_) => "provided-image",
            NodeData::GeneratedImage(_) => "generated-image",
            NodeData::Inpainting(_) => "inpainting",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeData::ProvidedImage(data) => &data.name,
            NodeData::GeneratedImage(data) => &data.name,
            NodeData::Inpainting(data) => &data.name,
        }
    }

    /// Image bytes of any node kind, including an inpainting mask.
    pub fn image(&self) -> Option<&str> {
        let image = match self {
            NodeData::ProvidedImage(data) => Some(data.image_b64.as_str()),
            NodeData::GeneratedImage(data) => data.image_b64.as_deref(),
            NodeData::Inpainting(data) => Some(data.image_b64.as_str()),
        };
        image.filter(|b64| !b64.is_empty())
    }

    /// Image that may feed a generation as an input picture. Masks never do.
    pub fn input_image(&self) -> Option<&str> {
        match self {
            NodeData::ProvidedImage(_) | NodeData::GeneratedImage(_) => self.image(),
            NodeData::Inpainting(_) => None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            NodeData::ProvidedImage(data) => Some((data.width, data.height)),
            NodeData::GeneratedImage(data) => data.width.zip(data.height),
            NodeData::Inpainting(data) => Some((data.width, data.height)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn with_new_id(data: NodeData) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), data)
    }

    pub fn as_generated(&self) -> Option<&GeneratedImageData> {
        match &self.data {
            NodeData::GeneratedImage(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_generated_mut(&mut self) -> Option<&mut GeneratedImageData> {
        match &mut self.data {
            NodeData::GeneratedImage(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_inpainting_mut(&mut self) -> Option<&mut InpaintingData> {
        match &mut self.data {
            NodeData::Inpainting(data) => Some(data),
            _ => None,
        }
    }
}

/// Directed connection: `source` feeds `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Node and edge lists as the graph editor exposes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Edges pointing at `target`, in insertion order.
    pub fn incoming<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.target == target)
    }

    /// Source nodes of all edges into `target`. Dangling sources are skipped.
    pub fn predecessors<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.incoming(target)
            .filter_map(move |edge| self.node(&edge.source))
    }

    pub fn add_node(&mut self, node: Node) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) -> String {
        let edge = Edge::new(source, target);
        let id = edge.id.clone();
        self.edges.push(edge);
        id
    }

    /// Puts generated-image nodes stuck in `processing` back to `prompt`.
    /// Returns how many were reset.
    pub fn reset_processing(&mut self) -> usize {
        let mut reset = 0;
        for data in self.nodes.iter_mut().filter_map(Node::as_generated_mut) {
            if data.status == GenerationStatus::Processing {
                data.status = GenerationStatus::Prompt;
                reset += 1;
            }
        }
        reset
    }
}
