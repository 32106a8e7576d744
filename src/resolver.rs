use crate::models::{Graph, Node, NodeData, ResolvedGenerationInputs, ValidationError};

/// Computes the prompt, input images and optional mask feeding `target_id`.
///
/// Direct predecessors of the target are split into inpainting nodes and
/// image-bearing nodes (provided or generated, with an image already present).
/// At most one inpainting predecessor is allowed. Its mask becomes the
/// request mask, and the image feeding the inpainting node is placed first in
/// the image list, ahead of the direct image predecessors in edge order.
///
/// # Panics
///
/// Panics if `target_id` does not name a generated-image node. Callers pass
/// ids taken from the graph itself.
pub fn resolve(
    target_id: &str,
    graph: &Graph,
) -> Result<ResolvedGenerationInputs, ValidationError> {
    let target = match graph.node(target_id).map(|node| &node.data) {
        Some(NodeData::GeneratedImage(data)) => data,
        Some(other) => panic!(
            "node {} is a {} node, not a generated-image node",
            target_id,
            other.kind_name()
        ),
        None => panic!("node {} not found", target_id),
    };

    let mut inpainting: Vec<&Node> = Vec::new();
    let mut direct_images: Vec<String> = Vec::new();
    for node in graph.predecessors(target_id) {
        match &node.data {
            NodeData::Inpainting(_) => inpainting.push(node),
            data => {
                if let Some(image) = data.input_image() {
                    direct_images.push(image.to_string());
                }
            }
        }
    }

    if inpainting.len() > 1 {
        log::warn!(
            "Node {} has {} inpainting predecessors",
            target_id,
            inpainting.len()
        );
        return Err(ValidationError::TooManyInpaintingNodes);
    }

    let mut images = Vec::with_capacity(direct_images.len() + 1);
    let mut mask = None;
    if let Some(inpaint) = inpainting.first() {
        mask = inpaint.data.image().map(str::to_string);
        if let Some(base) = inpainting_source_image(graph, &inpaint.id) {
            images.push(base.to_string());
        }
    }
    images.extend(direct_images);

    log::debug!(
        "Resolved node {}: {} image(s), mask: {}",
        target_id,
        images.len(),
        mask.is_some()
    );

    Ok(ResolvedGenerationInputs {
        prompt: target.prompt.clone(),
        images,
        mask,
    })
}

/// Image of the node feeding an inpainting node, one hop back.
fn inpainting_source_image<'a>(graph: &'a Graph, inpainting_id: &str) -> Option<&'a str> {
    let edge = graph.incoming(inpainting_id).next()?;
    graph.node(&edge.source)?.data.input_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        GeneratedImageData, GenerationStatus, InpaintingData, ProvidedImageData,
    };

    fn provided(id: &str, image: &str) -> Node {
        Node::new(
            id,
            NodeData::ProvidedImage(ProvidedImageData {
                name: id.to_string(),
                image_b64: image.to_string(),
                width: 8,
                height: 8,
            }),
        )
    }

    fn generated(id: &str, prompt: &str, image: Option<&str>) -> Node {
        Node::new(
            id,
            NodeData::GeneratedImage(GeneratedImageData {
                prompt: prompt.to_string(),
                name: id.to_string(),
                image_b64: image.map(str::to_string),
                status: GenerationStatus::Prompt,
                cost_dollars: None,
                width: None,
                height: None,
            }),
        )
    }

    fn inpainting(id: &str, mask: &str) -> Node {
        Node::new(
            id,
            NodeData::Inpainting(InpaintingData {
                name: id.to_string(),
                image_b64: mask.to_string(),
                width: 8,
                height: 8,
            }),
        )
    }

    #[test]
    fn test_single_direct_image() {
        let mut graph = Graph::new();
        graph.add_node(provided("b", "IMG_B"));
        graph.add_node(generated("t", "a red fox", None));
        graph.connect("b", "t");

        let resolved = resolve("t", &graph).unwrap();
        assert_eq!(
            resolved,
            ResolvedGenerationInputs {
                prompt: "a red fox".to_string(),
                images: vec!["IMG_B".to_string()],
                mask: None,
            }
        );
    }

    #[test]
    fn test_no_predecessors() {
        let mut graph = Graph::new();
        graph.add_node(generated("t", "empty canvas", None));

        let resolved = resolve("t", &graph).unwrap();
        assert!(resolved.images.is_empty());
        assert!(resolved.mask.is_none());
    }

    #[test]
    fn test_direct_images_keep_edge_order_and_skip_pending() {
        let mut graph = Graph::new();
        graph.add_node(generated("t", "collage", None));
        graph.add_node(provided("a", "IMG_A"));
        graph.add_node(generated("pending", "not yet", None));
        graph.add_node(generated("done", "earlier", Some("IMG_DONE")));
        graph.add_node(provided("empty", ""));
        graph.connect("done", "t");
        graph.connect("pending", "t");
        graph.connect("missing", "t");
        graph.connect("empty", "t");
        graph.connect("a", "t");

        let resolved = resolve("t", &graph).unwrap();
        assert_eq!(resolved.images, vec!["IMG_DONE", "IMG_A"]);
        assert!(resolved.mask.is_none());
    }

    #[test]
    fn test_inpainting_chain_prepends_base_image() {
        let mut graph = Graph::new();
        graph.add_node(provided("b", "IMG_B"));
        graph.add_node(inpainting("i", "MASK_M"));
        graph.add_node(provided("c", "IMG_C"));
        graph.add_node(generated("t", "replace the sky", None));
        graph.connect("c", "t");
        graph.connect("b", "i");
        graph.connect("i", "t");

        let resolved = resolve("t", &graph).unwrap();
        assert_eq!(resolved.images, vec!["IMG_B", "IMG_C"]);
        assert_eq!(resolved.mask.as_deref(), Some("MASK_M"));
        assert_eq!(resolved.prompt, "replace the sky");
    }

    #[test]
    fn test_inpainting_without_source() {
        let mut graph = Graph::new();
        graph.add_node(inpainting("i", "MASK_M"));
        graph.add_node(generated("t", "p", None));
        graph.connect("i", "t");

        let resolved = resolve("t", &graph).unwrap();
        assert!(resolved.images.is_empty());
        assert_eq!(resolved.mask.as_deref(), Some("MASK_M"));
    }

    #[test]
    fn test_inpainting_source_from_generated_node() {
        let mut graph = Graph::new();
        graph.add_node(generated("g", "base", Some("IMG_G")));
        graph.add_node(inpainting("i", "MASK_M"));
        graph.add_node(generated("t", "p", None));
        graph.connect("g", "i");
        graph.connect("i", "t");

        let resolved = resolve("t", &graph).unwrap();
        assert_eq!(resolved.images, vec!["IMG_G"]);
    }

    #[test]
    fn test_two_inpainting_nodes_rejected() {
        let mut graph = Graph::new();
        graph.add_node(provided("b", "IMG_B"));
        graph.add_node(inpainting("i1", "M1"));
        graph.add_node(inpainting("i2", "M2"));
        graph.add_node(generated("t", "p", None));
        graph.connect("b", "t");
        graph.connect("i1", "t");
        graph.connect("i2", "t");

        assert_eq!(
            resolve("t", &graph),
            Err(ValidationError::TooManyInpaintingNodes)
        );
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn test_missing_target_panics() {
        let graph = Graph::new();
        let _ = resolve("nope", &graph);
    }

    #[test]
    #[should_panic(expected = "not a generated-image node")]
    fn test_wrong_target_kind_panics() {
        let mut graph = Graph::new();
        graph.add_node(provided("b", "IMG_B"));
        let _ = resolve("b", &graph);
    }
}
