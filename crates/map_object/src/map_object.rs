//! # Map object tree
//!
//! The object tree is the core architectural component of the map
//! editor: a hierarchy of positioned, layered objects that can be drawn,
//! hit-tested, shaded, and serialized.
//!
//! ## Key concepts
//!
//! - **Objects**: every map object is a [`MapObject`] stored in an arena
//!   and addressed by [`ObjectId`]; parent/child links are ids, never
//!   references, so the hierarchy cannot form ownership cycles
//! - **Transforms**: objects store a parent-relative position; world
//!   positions are always recomputed by summing the parent chain and are
//!   never cached
//! - **Collections own their members**: attaching an object to a new
//!   parent atomically removes it from the previous collection, and
//!   removing an object from the tree drops its whole subtree
//! - **Layered drawing**: a draw pass is filtered to a single layer but
//!   recursion into children is unconditional, so one subtree can span
//!   several layers while layers are drawn back to front globally
//!
//! The concrete look of an object and its extra persisted data come from
//! its [`ObjectKind`]; this crate only handles the shared machinery.

pub mod object;
pub mod query;
pub mod render;
pub mod shade;

pub use object::{MapObject, ObjectKind};
pub use query::{find_intersecting_selectables, find_selectable_at_pos, IntersectingSelectables};
pub use render::Renderer;
pub use shade::{BufferPool, ShadeContext, ShadeState, ShadeStaleness};

use anyhow::Result;
use glam::Vec2;
use maproom_core::bounds::Bounds;
use maproom_core::layer::LayerId;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Unique identifier for an object in the map tree.
    pub struct ObjectId;
}

/// Arena-backed tree of map objects.
///
/// The tree owns every object. Top-level objects live in the root
/// collection; everything else hangs off some parent's children list.
pub struct MapTree {
    objects: SlotMap<ObjectId, MapObject>,
    roots: Vec<ObjectId>,
}

impl MapTree {
    pub fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
            roots: Vec::new(),
        }
    }

    /// Inserts an object, attaching it to `parent` or, with `None` (or an
    /// unknown parent), to the root collection.
    pub fn insert(&mut self, parent: Option<ObjectId>, object: MapObject) -> ObjectId {
        let parent = parent.filter(|&p| self.objects.contains_key(p));
        let id = self.objects.insert(object);
        self.objects[id].parent = parent;
        match parent {
            Some(p) => self.objects[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Moves an object into a new collection: `parent`'s children, or the
    /// root collection for `None`.
    ///
    /// This is a move, never a duplicate: the object leaves whatever
    /// collection held it before. Returns false (and changes nothing) for
    /// unknown ids or when the move would make an object its own
    /// ancestor.
    pub fn add_child(&mut self, parent: Option<ObjectId>, child: ObjectId) -> bool {
        if !self.objects.contains_key(child) {
            return false;
        }
        if let Some(p) = parent {
            if !self.objects.contains_key(p) || self.is_ancestor(child, p) {
                return false;
            }
        }

        self.detach_from_collection(child);
        self.objects[child].parent = parent;
        match parent {
            Some(p) => self.objects[p].children.push(child),
            None => self.roots.push(child),
        }
        true
    }

    /// Removes an object and drops its entire subtree.
    ///
    /// Returns the removed object itself (with its hierarchy links
    /// cleared); its descendants are gone.
    pub fn remove(&mut self, id: ObjectId) -> Option<MapObject> {
        if !self.objects.contains_key(id) {
            return None;
        }
        self.detach_from_collection(id);
        let mut object = self.remove_subtree(id)?;
        object.parent = None;
        object.children.clear();
        Some(object)
    }

    /// Orphans all children of an object without destroying them.
    ///
    /// The children keep existing in the arena and stay addressable by
    /// id, but belong to no collection until re-attached with
    /// [`MapTree::add_child`] or dropped with [`MapTree::remove`].
    pub fn clear_children(&mut self, id: ObjectId) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut object.children);
        for child in children {
            if let Some(child_object) = self.objects.get_mut(child) {
                child_object.parent = None;
            }
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&MapObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut MapObject> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The ordered top-level collection.
    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    /// An object's ordered children (empty for unknown ids).
    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.objects
            .get(id)
            .map(|object| object.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(id).and_then(|object| object.parent)
    }

    /// Absolute position, resolved by summing parent-relative positions
    /// up the ancestor chain.
    pub fn world_position(&self, id: ObjectId) -> Vec2 {
        let Some(object) = self.objects.get(id) else {
            return Vec2::ZERO;
        };
        match object.parent {
            Some(parent) => self.world_position(parent) + object.parent_position(),
            None => object.parent_position(),
        }
    }

    /// Moves an object to an absolute position by storing the matching
    /// parent-relative position. The parent chain itself is untouched.
    pub fn set_world_position(&mut self, id: ObjectId, position: Vec2) {
        let Some(object) = self.objects.get(id) else {
            return;
        };
        let parent_world = match object.parent {
            Some(parent) => self.world_position(parent),
            None => Vec2::ZERO,
        };
        if let Some(object) = self.objects.get_mut(id) {
            object.set_parent_position(position - parent_world);
        }
    }

    /// World-space rectangle of the object's drawn footprint, shade halo
    /// included.
    pub fn visual_bounds(&self, id: ObjectId) -> Option<Bounds> {
        let object = self.objects.get(id)?;
        let origin = self.world_position(id) + object.visual_offset();
        Some(Bounds::from_origin_size(origin, object.visual_size()))
    }

    /// Half-open containment test against the visual bounds.
    pub fn contains_point(&self, id: ObjectId, point: Vec2) -> bool {
        self.visual_bounds(id)
            .is_some_and(|bounds| bounds.contains_point(point))
    }

    /// Draws the subtree rooted at `id` for one layer pass.
    ///
    /// An inactive object silences its whole subtree. The object's own
    /// content is drawn only when its layer matches the pass, but
    /// children are visited regardless so a subtree can span layers.
    pub fn draw(&self, id: ObjectId, renderer: &mut dyn Renderer, layer: &LayerId) {
        let Some(object) = self.objects.get(id) else {
            return;
        };
        if !object.active() {
            return;
        }
        if object.render_layer() == layer {
            renderer.begin_object_capture(id, false);
            object.kind().draw(renderer, self.world_position(id));
            renderer.end_object_capture();
        }
        for &child in &object.children {
            self.draw(child, renderer, layer);
        }
    }

    /// Mirror of [`MapTree::draw`] that draws cached shade textures
    /// instead of object content, regenerating them as needed.
    pub fn draw_shade(
        &mut self,
        id: ObjectId,
        ctx: &mut ShadeContext,
        renderer: &mut dyn Renderer,
        layer: &LayerId,
    ) -> Result<()> {
        let Some(object) = self.objects.get(id) else {
            return Ok(());
        };
        if !object.active() {
            return Ok(());
        }
        if object.render_layer() == layer {
            self.ensure_shade_texture(id, ctx)?;
            let object = &self.objects[id];
            if object.shade_size() > 0 {
                if let Some(texture) = object.shade_texture() {
                    let top_left =
                        self.world_position(id) - Vec2::splat(object.shade_size() as f32);
                    renderer.begin_object_capture(id, true);
                    renderer.draw_texture(texture, top_left);
                    renderer.end_object_capture();
                }
            }
        }
        let mut index = 0;
        while let Some(&child) = self
            .objects
            .get(id)
            .and_then(|object| object.children.get(index))
        {
            self.draw_shade(child, ctx, renderer, layer)?;
            index += 1;
        }
        Ok(())
    }

    /// Regenerates the object's shade texture if it is missing, stale, or
    /// was generated for a different radius. A radius of zero drops the
    /// texture instead.
    pub fn ensure_shade_texture(&mut self, id: ObjectId, ctx: &mut ShadeContext) -> Result<()> {
        let Some(object) = self.objects.get(id) else {
            return Ok(());
        };
        let radius = object.shade_size();
        if radius == 0 {
            self.objects[id].shade.clear();
            return Ok(());
        }
        if object.shade.is_valid_for(radius) {
            return Ok(());
        }
        log::trace!("regenerating shade texture for {object} (radius {radius})");
        let world_position = self.world_position(id);
        let (width, height, pixels) = {
            let object = &self.objects[id];
            ctx.generate(object, world_position)?
        };
        self.objects[id].shade.install(width, height, &pixels, radius);
        Ok(())
    }

    /// Whether `node` appears in `descendant`'s ancestor chain.
    ///
    /// Used to refuse reparenting operations that would create a cycle,
    /// which would otherwise hang every recursive walk over the tree.
    fn is_ancestor(&self, node: ObjectId, descendant: ObjectId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == node {
                return true;
            }
            current = self.objects.get(id).and_then(|object| object.parent);
        }
        false
    }

    fn detach_from_collection(&mut self, id: ObjectId) {
        match self.objects[id].parent {
            Some(old_parent) => {
                if let Some(parent) = self.objects.get_mut(old_parent) {
                    parent.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|c| *c != id),
        }
    }

    fn remove_subtree(&mut self, id: ObjectId) -> Option<MapObject> {
        let object = self.objects.remove(id)?;
        for &child in &object.children {
            self.remove_subtree(child);
        }
        Some(object)
    }
}

impl Default for MapTree {
    fn default() -> Self {
        Self::new()
    }
}
