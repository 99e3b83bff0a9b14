//! Render layers and the ordered layer registry.
//!
//! Layers are named, visibility-flagged drawing buckets. The editor draws
//! them back to front; within each layer the whole object tree is walked
//! and filtered to that layer. The registry itself is owned by the
//! application shell, this core only consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier a layer is persisted and looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A single render layer.
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
}

impl Layer {
    pub fn new(id: impl Into<LayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visible: true,
        }
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

/// Ordered collection of layers, drawn first to last.
///
/// The first layer doubles as the registry default: lookups for an
/// unknown identifier resolve to it so that an object referencing a
/// removed layer still lands somewhere drawable.
#[derive(Debug, Clone, Default)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl LayerRegistry {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Looks up a layer by its exact identifier.
    pub fn get(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| &layer.id == id)
    }

    /// Looks up a layer by identifier, falling back to the default layer.
    ///
    /// Returns `None` only when the registry is empty.
    pub fn resolve(&self, id: &LayerId) -> Option<&Layer> {
        self.get(id).or_else(|| self.default_layer())
    }

    /// The registry default, i.e. the first layer in draw order.
    pub fn default_layer(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// Whether the layer an identifier resolves to is currently visible.
    pub fn is_visible(&self, id: &LayerId) -> bool {
        self.resolve(id).is_some_and(|layer| layer.visible)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LayerRegistry {
        LayerRegistry::new(vec![
            Layer::new("ground", "Ground"),
            Layer::new("objects", "Objects"),
            Layer::new("overlay", "Overlay").with_visible(false),
        ])
    }

    #[test]
    fn test_lookup_by_id() {
        let layers = registry();
        assert_eq!(layers.get(&LayerId::new("objects")).unwrap().name, "Objects");
        assert!(layers.get(&LayerId::new("missing")).is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let layers = registry();
        let resolved = layers.resolve(&LayerId::new("missing")).unwrap();
        assert_eq!(resolved.id, LayerId::new("ground"));

        let empty = LayerRegistry::default();
        assert!(empty.resolve(&LayerId::new("ground")).is_none());
    }

    #[test]
    fn test_visibility() {
        let layers = registry();
        assert!(layers.is_visible(&LayerId::new("objects")));
        assert!(!layers.is_visible(&LayerId::new("overlay")));
        // unknown ids take the default layer's visibility
        assert!(layers.is_visible(&LayerId::new("missing")));
    }

    #[test]
    fn test_order_preserved() {
        let layers = registry();
        let ids: Vec<&str> = layers.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["ground", "objects", "overlay"]);
    }

    #[test]
    fn test_layer_id_serializes_as_string() {
        let id = LayerId::new("ground");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("ground"));
        let back: LayerId = serde_json::from_value(serde_json::json!("ground")).unwrap();
        assert_eq!(back, id);
    }
}
