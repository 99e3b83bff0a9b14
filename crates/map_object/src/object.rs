//! The map object itself: identity, geometry, state flags, shade
//! parameters, and the polymorphic kind contract concrete object types
//! plug into.

use crate::shade::{ShadeSlot, ShadeState};
use crate::{ObjectId, Renderer};
use glam::Vec2;
use maproom_core::layer::LayerId;
use maproom_core::texture::Texture;
use regex::Regex;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::LazyLock;

static NAME_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("_([0-9A-Fa-f]+)$").expect("static regex"));

/// Behavior a concrete object kind contributes to the scene core.
///
/// The core handles hierarchy, transforms, layers, shading, and
/// persistence plumbing; everything specific to a kind of map object
/// (what it looks like, what extra data it carries) comes through this
/// trait. Kinds are registered with the persistence codec by their
/// `kind_id` so trees can be reconstructed from documents.
pub trait ObjectKind {
    /// Get a reference to self as Any for downcasting
    fn as_any(&self) -> &dyn std::any::Any;

    /// Get a mutable reference to self as Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    /// Stable identifier used for polymorphic reconstruction.
    fn kind_id(&self) -> &str;

    /// Kind identifier recorded in copy snapshots. Defaults to
    /// [`ObjectKind::kind_id`]; kinds that paste as something simpler
    /// than themselves override this.
    fn copy_kind_id(&self) -> &str {
        self.kind_id()
    }

    /// The object's own size in world units.
    fn size(&self) -> Vec2;

    /// Layer newly created objects of this kind land on.
    fn default_layer(&self) -> LayerId;

    /// Draws the object's own content. Children are drawn by the tree,
    /// not by the kind.
    fn draw(&self, renderer: &mut dyn Renderer, world_position: Vec2);

    /// Kind-specific data for the `data` field of a saved document.
    /// `None` (or an empty object) is omitted from the document.
    fn save_inner(&self, for_copy: bool) -> Option<Value> {
        let _ = for_copy;
        None
    }

    /// Applies a previously saved `data` field. `shallow` asks the kind
    /// to skip expensive or recursive reconstruction; what exactly that
    /// means is up to the kind.
    fn load_inner(&mut self, data: &Value, shallow: bool) {
        let _ = (data, shallow);
    }
}

/// A positioned, layered object in the map tree.
///
/// Hierarchy links (`parent`, `children`) are arena keys managed by
/// [`crate::MapTree`]; everything else is plain per-object state.
pub struct MapObject {
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: SmallVec<[ObjectId; 4]>,
    pub(crate) shade: ShadeSlot,
    name: Option<String>,
    parent_position: Vec2,
    active: bool,
    selectable: bool,
    needs_saving: bool,
    load_creation_forbidden: bool,
    render_layer: LayerId,
    shade_size: u32,
    shade_corner_radius: Option<u32>,
    kind: Box<dyn ObjectKind>,
}

impl MapObject {
    pub fn new(kind: Box<dyn ObjectKind>) -> Self {
        let render_layer = kind.default_layer();
        Self {
            parent: None,
            children: SmallVec::new(),
            shade: ShadeSlot::new(),
            name: None,
            parent_position: Vec2::ZERO,
            active: true,
            selectable: true,
            needs_saving: true,
            load_creation_forbidden: false,
            render_layer,
            shade_size: 0,
            shade_corner_radius: None,
            kind,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Position relative to the parent's world position.
    pub fn parent_position(&self) -> Vec2 {
        self.parent_position
    }

    pub fn set_parent_position(&mut self, position: Vec2) {
        self.parent_position = position;
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    pub fn set_selectable(&mut self, selectable: bool) {
        self.selectable = selectable;
    }

    /// Whether a full save includes this object. Transient objects set
    /// this to false and contribute nothing to saved documents.
    pub fn needs_saving(&self) -> bool {
        self.needs_saving
    }

    pub fn set_needs_saving(&mut self, needs_saving: bool) {
        self.needs_saving = needs_saving;
    }

    /// Whether the kind identifier is withheld from saved documents,
    /// preventing the codec from recreating this object on load.
    pub fn load_creation_forbidden(&self) -> bool {
        self.load_creation_forbidden
    }

    pub fn set_load_creation_forbidden(&mut self, forbidden: bool) {
        self.load_creation_forbidden = forbidden;
    }

    pub fn render_layer(&self) -> &LayerId {
        &self.render_layer
    }

    pub fn set_render_layer(&mut self, layer: LayerId) {
        self.render_layer = layer;
    }

    /// Shade halo radius in pixels. Zero disables shading entirely.
    pub fn shade_size(&self) -> u32 {
        self.shade_size
    }

    pub fn set_shade_size(&mut self, shade_size: u32) {
        if shade_size == self.shade_size {
            return;
        }
        self.shade_size = shade_size;
        if shade_size == 0 {
            self.shade.clear();
        } else {
            self.shade.mark_size_changed();
        }
    }

    pub fn shade_corner_radius(&self) -> Option<u32> {
        self.shade_corner_radius
    }

    pub fn set_shade_corner_radius(&mut self, radius: Option<u32>) {
        if radius != self.shade_corner_radius {
            self.shade_corner_radius = radius;
            self.shade.mark_dirty();
        }
    }

    /// Forces the shade texture to regenerate on the next shade draw.
    pub fn mark_shade_dirty(&mut self) {
        self.shade.mark_dirty();
    }

    pub fn shade_state(&self) -> ShadeState {
        self.shade.state()
    }

    pub fn shade_texture(&self) -> Option<&Texture> {
        self.shade.texture()
    }

    pub fn kind(&self) -> &dyn ObjectKind {
        &*self.kind
    }

    pub fn kind_mut(&mut self) -> &mut dyn ObjectKind {
        &mut *self.kind
    }

    /// The object's own size, as reported by its kind.
    pub fn size(&self) -> Vec2 {
        self.kind.size()
    }

    /// Size of the drawn footprint including the shade halo.
    pub fn visual_size(&self) -> Vec2 {
        self.size() + Vec2::splat(self.shade_size as f32 * 2.0)
    }

    /// Offset from the world position to the visual top-left corner.
    pub fn visual_offset(&self) -> Vec2 {
        -Vec2::splat(self.shade_size as f32)
    }

    /// Assigns or refreshes the random name suffix.
    ///
    /// Unnamed objects get `{kind}_{hex}`. A name already ending in
    /// `_<hex>` has just that suffix replaced; any other name gets a
    /// suffix appended. Used for brand-new objects and to disambiguate
    /// pasted copies.
    pub fn regenerate_name(&mut self) {
        let suffix = format!("_{:x}", rand::random::<u32>());
        self.name = Some(match self.name.take() {
            None => format!("{}{}", self.kind.kind_id(), suffix),
            Some(name) => match NAME_SUFFIX.find(&name) {
                Some(found) => format!("{}{}", &name[..found.start()], suffix),
                None => format!("{name}{suffix}"),
            },
        });
    }
}

impl fmt::Display for MapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => f.write_str(self.kind.kind_id()),
        }
    }
}

impl fmt::Debug for MapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapObject")
            .field("name", &self.name)
            .field("kind", &self.kind.kind_id())
            .field("parent_position", &self.parent_position)
            .field("active", &self.active)
            .field("render_layer", &self.render_layer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NullKind;
    use regex::Regex;

    fn object() -> MapObject {
        MapObject::new(Box::new(NullKind::sized(10.0, 10.0)))
    }

    #[test]
    fn test_defaults() {
        let object = object();
        assert!(object.active());
        assert!(object.is_selectable());
        assert!(object.needs_saving());
        assert!(!object.load_creation_forbidden());
        assert_eq!(object.name(), None);
        assert_eq!(object.render_layer().as_str(), "objects");
        assert_eq!(object.shade_size(), 0);
    }

    #[test]
    fn test_visual_extent_includes_shade() {
        let mut object = object();
        object.set_shade_size(3);
        assert_eq!(object.visual_size(), Vec2::new(16.0, 16.0));
        assert_eq!(object.visual_offset(), Vec2::new(-3.0, -3.0));
    }

    #[test]
    fn test_regenerate_name_from_nothing() {
        let mut object = object();
        object.regenerate_name();
        let pattern = Regex::new("^null_[0-9a-f]{1,8}$").unwrap();
        assert!(pattern.is_match(object.name().unwrap()));
    }

    #[test]
    fn test_regenerate_name_replaces_hex_suffix() {
        let mut object = object();
        object.set_name("Rock_1a2b");
        // a fresh random suffix will differ from the old one in practice;
        // retry a few times so a one-in-four-billion collision can't flake
        let mut changed = false;
        for _ in 0..4 {
            object.regenerate_name();
            let name = object.name().unwrap();
            assert!(Regex::new("^Rock_[0-9a-f]{1,8}$").unwrap().is_match(name));
            if name != "Rock_1a2b" {
                changed = true;
                break;
            }
        }
        assert!(changed);
    }

    #[test]
    fn test_regenerate_name_appends_when_no_suffix() {
        let mut object = object();
        object.set_name("Spawn Point");
        object.regenerate_name();
        let pattern = Regex::new("^Spawn Point_[0-9a-f]{1,8}$").unwrap();
        assert!(pattern.is_match(object.name().unwrap()));
    }

    #[test]
    fn test_display_prefers_name() {
        let mut object = object();
        assert_eq!(object.to_string(), "null");
        object.set_name("Gate");
        assert_eq!(object.to_string(), "Gate");
    }
}
