//! The boundary between the object tree and the concrete rendering
//! backend. The core never touches the screen directly; it hands
//! textures and world positions to whatever implements [`Renderer`].

use crate::ObjectId;
use glam::Vec2;
use maproom_core::texture::Texture;

/// Sink for draw calls produced by the object tree.
///
/// The capture hooks bracket each object's own draw so that
/// implementations which record per-object draw regions (screenshot
/// export, region pickers) can attribute primitives to objects. They
/// default to no-ops; ordinary backends ignore them.
pub trait Renderer {
    /// Draws a texture with its top-left corner at a world position.
    fn draw_texture(&mut self, texture: &Texture, world_top_left: Vec2);

    fn begin_object_capture(&mut self, object: ObjectId, shade: bool) {
        let _ = (object, shade);
    }

    fn end_object_capture(&mut self) {}
}
