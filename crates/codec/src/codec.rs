//! Persistence codec for map object trees.
//!
//! Objects travel as abstract structured documents, represented here as
//! [`serde_json::Value`]; whether those land on disk as JSON text or
//! something else is the application's business. Two modes exist: a full
//! save keeps names and the child hierarchy so a whole tree round-trips,
//! and a copy snapshot captures a single detached object at its world
//! position for clipboard-style duplication.
//!
//! Reconstruction is polymorphic: documents carry a kind identifier and
//! the [`KindRegistry`] maps it back to a factory for that kind.

use anyhow::{bail, Result};
use glam::Vec2;
use map_object::{MapObject, MapTree, ObjectId, ObjectKind};
use maproom_core::layer::{LayerId, LayerRegistry};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Factory producing a default-constructed kind, ready to be populated
/// by a load.
pub type KindFactory = Box<dyn Fn() -> Box<dyn ObjectKind>>;

/// Maps stable kind identifiers to factories.
#[derive(Default)]
pub struct KindRegistry {
    factories: HashMap<String, KindFactory>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind_id: impl Into<String>,
        factory: impl Fn() -> Box<dyn ObjectKind> + 'static,
    ) {
        self.factories.insert(kind_id.into(), Box::new(factory));
    }

    pub fn contains(&self, kind_id: &str) -> bool {
        self.factories.contains_key(kind_id)
    }

    /// Instantiates a default kind, or `None` for unknown identifiers.
    pub fn create(&self, kind_id: &str) -> Option<Box<dyn ObjectKind>> {
        self.factories.get(kind_id).map(|factory| factory())
    }
}

/// Serializes and reconstructs object trees.
pub struct Codec<'a> {
    kinds: &'a KindRegistry,
    layers: &'a LayerRegistry,
}

impl<'a> Codec<'a> {
    pub fn new(kinds: &'a KindRegistry, layers: &'a LayerRegistry) -> Self {
        Self { kinds, layers }
    }

    /// Saves an object to a document.
    ///
    /// A full save (`for_copy` false) stores the parent-relative
    /// position, requires a name, and recurses into children; objects
    /// flagged as not needing saving yield `Ok(None)` and contribute
    /// nothing. A copy snapshot stores the world position and omits both
    /// name and children.
    ///
    /// Fields matching their defaults (`active` true, the kind's default
    /// layer) are omitted, as is the kind identifier of objects whose
    /// recreation on load is forbidden.
    pub fn save(&self, tree: &MapTree, id: ObjectId, for_copy: bool) -> Result<Option<Value>> {
        let Some(object) = tree.get(id) else {
            return Ok(None);
        };
        if !object.needs_saving() && !for_copy {
            return Ok(None);
        }

        let inner = object.kind().save_inner(for_copy);
        let mut doc = Map::new();

        if for_copy {
            doc.insert("pos".into(), save_vec2(tree.world_position(id)));
        } else {
            let Some(name) = object.name() else {
                let parent = tree
                    .parent(id)
                    .and_then(|p| tree.get(p))
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "none".into());
                bail!(
                    "map object has no name and can't be saved (kind: {}, parent: {})",
                    object.kind().kind_id(),
                    parent
                );
            };
            doc.insert("name".into(), Value::String(name.to_owned()));
            doc.insert("pos".into(), save_vec2(object.parent_position()));
        }

        if !object.active() {
            doc.insert("active".into(), Value::Bool(false));
        }
        if object.render_layer() != &object.kind().default_layer() {
            doc.insert(
                "layer".into(),
                Value::String(object.render_layer().as_str().to_owned()),
            );
        }
        if !object.load_creation_forbidden() {
            let kind_id = if for_copy {
                object.kind().copy_kind_id()
            } else {
                object.kind().kind_id()
            };
            doc.insert("type".into(), Value::String(kind_id.to_owned()));
        }
        if let Some(inner) = inner {
            let empty = matches!(&inner, Value::Object(map) if map.is_empty());
            if !empty {
                doc.insert("data".into(), inner);
            }
        }
        if !for_copy && !tree.children(id).is_empty() {
            let mut children = Vec::new();
            for &child in tree.children(id) {
                if let Some(child_doc) = self.save(tree, child, false)? {
                    children.push(child_doc);
                }
            }
            doc.insert("children".into(), Value::Array(children));
        }

        Ok(Some(Value::Object(doc)))
    }

    /// Applies a document to an existing object in place.
    ///
    /// Child documents are matched by name against the object's own
    /// children; an unmatched entry that carries a kind identifier is
    /// created and attached, anything else is skipped. The `shallow`
    /// flag is only propagated to kind loaders.
    pub fn load_into(&self, tree: &mut MapTree, id: ObjectId, doc: &Value, shallow: bool) {
        if let Some(data) = doc.get("data") {
            if let Some(object) = tree.get_mut(id) {
                object.kind_mut().load_inner(data, shallow);
            }
        }

        if let Some(object) = tree.get_mut(id) {
            if let Some(name) = doc.get("name").and_then(Value::as_str) {
                object.set_name(name);
            }
            if let Some(pos) = doc.get("pos").and_then(load_vec2) {
                object.set_parent_position(pos);
            }
            if let Some(active) = doc.get("active").and_then(Value::as_bool) {
                object.set_active(active);
            }
            if let Some(layer) = doc.get("layer").and_then(Value::as_str) {
                let layer_id = LayerId::new(layer);
                let resolved = if self.layers.get(&layer_id).is_some() {
                    layer_id
                } else {
                    object.kind().default_layer()
                };
                object.set_render_layer(resolved);
            }
        }

        if let Some(children) = doc.get("children").and_then(Value::as_array) {
            for child_doc in children {
                let candidates: Vec<ObjectId> = tree.children(id).to_vec();
                if self.load_matching(tree, &candidates, child_doc, shallow) {
                    continue;
                }
                if self.create(tree, Some(id), child_doc, shallow).is_none() {
                    log::debug!("skipped child document with unknown or missing kind");
                }
            }
        }
    }

    /// Loads a document onto whichever candidate matches it by name.
    ///
    /// Returns false without touching anything when the document has no
    /// name or no candidate carries it.
    pub fn load_matching(
        &self,
        tree: &mut MapTree,
        candidates: &[ObjectId],
        doc: &Value,
        shallow: bool,
    ) -> bool {
        let Some(name) = doc.get("name").and_then(Value::as_str) else {
            return false;
        };
        let found = candidates
            .iter()
            .copied()
            .find(|&candidate| {
                tree.get(candidate)
                    .is_some_and(|object| object.name() == Some(name))
            });
        let Some(found) = found else {
            return false;
        };
        self.load_into(tree, found, doc, shallow);
        true
    }

    /// Creates a new object from a document and attaches it to `parent`
    /// (or the root collection).
    ///
    /// Yields `None`, creating nothing, when the document has no kind
    /// identifier or the identifier is not registered. Objects without a
    /// saved name get a generated one.
    pub fn create(
        &self,
        tree: &mut MapTree,
        parent: Option<ObjectId>,
        doc: &Value,
        shallow: bool,
    ) -> Option<ObjectId> {
        let kind_id = doc.get("type").and_then(Value::as_str)?;
        let kind = self.kinds.create(kind_id)?;

        let mut object = MapObject::new(kind);
        match doc.get("name").and_then(Value::as_str) {
            Some(name) => object.set_name(name),
            None => object.regenerate_name(),
        }

        let id = tree.insert(parent, object);
        self.load_into(tree, id, doc, shallow);
        Some(id)
    }
}

fn save_vec2(v: Vec2) -> Value {
    Value::Array(vec![v.x.into(), v.y.into()])
}

fn load_vec2(value: &Value) -> Option<Vec2> {
    let parts = value.as_array()?;
    match parts.as_slice() {
        [x, y] => Some(Vec2::new(x.as_f64()? as f32, y.as_f64()? as f32)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use map_object::Renderer;
    use serde_json::json;

    struct MarkerKind;

    impl ObjectKind for MarkerKind {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }

        fn kind_id(&self) -> &str {
            "marker"
        }

        fn size(&self) -> Vec2 {
            Vec2::new(1.0, 1.0)
        }

        fn default_layer(&self) -> LayerId {
            LayerId::new("objects")
        }

        fn draw(&self, _renderer: &mut dyn Renderer, _world_position: Vec2) {}
    }

    #[test]
    fn test_vec2_round_trip() {
        let v = Vec2::new(12.5, -3.0);
        assert_eq!(load_vec2(&save_vec2(v)), Some(v));
        assert_eq!(load_vec2(&json!([1, 2])), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(load_vec2(&json!([1.0])), None);
        assert_eq!(load_vec2(&json!("12,3")), None);
    }

    #[test]
    fn test_registry_creates_by_id() {
        let mut kinds = KindRegistry::new();
        assert!(!kinds.contains("marker"));
        assert!(kinds.create("marker").is_none());

        kinds.register("marker", || Box::new(MarkerKind));
        assert!(kinds.contains("marker"));
        assert_eq!(kinds.create("marker").unwrap().kind_id(), "marker");
    }
}
