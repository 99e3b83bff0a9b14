//! Shade texture generation.
//!
//! A shade is the halo drawn behind an object: the object is rendered in
//! isolation into a scratch target, its opaque silhouette is dilated by
//! the shade radius, and the result becomes a black-on-transparent
//! texture cached on the object. The dilation probes a square
//! neighborhood around each pixel, optionally masked to a rounded
//! pattern, and stops at the first opaque neighbor it finds.
//!
//! All the shared mutable resources live in [`ShadeContext`]: the
//! scratch target (grown on demand, never shrunk) and the pixel buffer
//! pool. Generation takes the context by `&mut`, so only one generation
//! can ever be in flight.

use crate::object::MapObject;
use crate::render::Renderer;
use anyhow::{Context, Result};
use glam::Vec2;
use maproom_core::texture::Texture;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Why a cached shade texture is no longer usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeStaleness {
    /// The object's shade radius changed since generation.
    SizeChanged,
    /// The object was explicitly marked dirty.
    MarkedDirty,
}

/// Lifecycle of an object's cached shade texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeState {
    /// No texture exists (never generated, or shading disabled).
    Absent,
    /// A texture exists but must be regenerated before the next use.
    Stale(ShadeStaleness),
    /// The texture matches the current object at the given radius.
    Valid { radius: u32 },
}

/// Per-object slot holding the cached shade texture and its state.
#[derive(Debug)]
pub struct ShadeSlot {
    texture: Option<Texture>,
    state: ShadeState,
}

impl ShadeSlot {
    pub(crate) fn new() -> Self {
        Self {
            texture: None,
            state: ShadeState::Absent,
        }
    }

    pub fn state(&self) -> ShadeState {
        self.state
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    /// Drops the texture entirely. Used when shading is disabled.
    pub(crate) fn clear(&mut self) {
        self.texture = None;
        self.state = ShadeState::Absent;
    }

    pub(crate) fn mark_size_changed(&mut self) {
        if self.texture.is_some() {
            self.state = ShadeState::Stale(ShadeStaleness::SizeChanged);
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        if self.texture.is_some() {
            self.state = ShadeState::Stale(ShadeStaleness::MarkedDirty);
        }
    }

    pub(crate) fn is_valid_for(&self, radius: u32) -> bool {
        self.texture.is_some()
            && matches!(self.state, ShadeState::Valid { radius: r } if r == radius)
    }

    /// Stores freshly generated pixels, reusing the existing texture
    /// allocation when the dimensions are unchanged.
    pub(crate) fn install(&mut self, width: u32, height: u32, rgba: &[u8], radius: u32) {
        match self.texture.as_mut() {
            Some(texture) => texture.replace(width, height, rgba),
            None => self.texture = Some(Texture::from_rgba(width, height, rgba)),
        }
        self.state = ShadeState::Valid { radius };
    }
}

/// Pool of reusable byte buffers for pixel scratch work.
///
/// Buffers come back zeroed at the requested length and return to the
/// pool when their guard drops, so early exits can't leak them.
pub struct BufferPool {
    free: RefCell<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            free: RefCell::new(Vec::new()),
        }
    }

    pub fn acquire(&self, len: usize) -> PooledBuf<'_> {
        let mut buf = self.free.borrow_mut().pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, 0);
        PooledBuf {
            buf: Some(buf),
            pool: self,
        }
    }

    #[cfg(test)]
    fn idle_buffers(&self) -> usize {
        self.free.borrow().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped handle to a pooled buffer.
pub struct PooledBuf<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.free.borrow_mut().push(buf);
        }
    }
}

/// Offscreen RGBA target the object is drawn into in isolation.
///
/// The buffer only ever grows. Clearing is deferred: `begin_frame` sets
/// a flag and the first draw call performs the actual clear, so a frame
/// in which nothing was drawn can be recognized without paying for a
/// full clear.
struct ScratchTarget {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    needs_clear: bool,
}

impl ScratchTarget {
    fn new() -> Self {
        Self {
            pixels: Vec::new(),
            width: 0,
            height: 0,
            needs_clear: false,
        }
    }

    /// Grows the target to cover at least `width` x `height`.
    fn ensure_size(&mut self, width: u32, height: u32) -> Result<()> {
        let target_width = width.max(self.width);
        let target_height = height.max(self.height);
        if target_width == self.width && target_height == self.height {
            return Ok(());
        }
        let len = (target_width as usize) * (target_height as usize) * 4;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .context("failed to allocate shade scratch target")?;
        pixels.resize(len, 0);
        self.pixels = pixels;
        self.width = target_width;
        self.height = target_height;
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.needs_clear = true;
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Copies a texture's pixels into the target, skipping transparent
    /// texels and anything outside the target.
    fn stamp(&mut self, width: u32, height: u32, rgba: &[u8], x: i32, y: i32) {
        let target_width = self.width as i32;
        let target_height = self.height as i32;
        for sy in 0..height as i32 {
            let dy = y + sy;
            if dy < 0 || dy >= target_height {
                continue;
            }
            for sx in 0..width as i32 {
                let dx = x + sx;
                if dx < 0 || dx >= target_width {
                    continue;
                }
                let src = ((sy * width as i32 + sx) * 4) as usize;
                if rgba[src + 3] == 0 {
                    continue;
                }
                let dst = ((dy * target_width + dx) * 4) as usize;
                self.pixels[dst..dst + 4].copy_from_slice(&rgba[src..src + 4]);
            }
        }
    }

    /// Copies the top-left `width` x `height` region into `out`.
    fn read_rect(&self, width: u32, height: u32, out: &mut [u8]) {
        let row_len = (width as usize) * 4;
        let pitch = (self.width as usize) * 4;
        for row in 0..height as usize {
            let src = row * pitch;
            let dst = row * row_len;
            out[dst..dst + row_len].copy_from_slice(&self.pixels[src..src + row_len]);
        }
    }
}

/// Renderer that captures an object's isolated draw into the scratch
/// target, translating world coordinates into target pixels.
struct ShadeCapture<'a> {
    target: &'a mut ScratchTarget,
    origin: Vec2,
}

impl Renderer for ShadeCapture<'_> {
    fn draw_texture(&mut self, texture: &Texture, world_top_left: Vec2) {
        if self.target.needs_clear {
            self.target.clear();
            self.target.needs_clear = false;
        }
        let at = world_top_left - self.origin;
        self.target.stamp(
            texture.width(),
            texture.height(),
            texture.pixels(),
            at.x.floor() as i32,
            at.y.floor() as i32,
        );
    }
}

/// Owns the shared resources of shade generation: the scratch render
/// target and the pixel buffer pool.
///
/// Generation goes through `&mut self`, which statically rules out the
/// re-entrant and concurrent use the shared scratch target cannot
/// support.
pub struct ShadeContext {
    scratch: ScratchTarget,
    pool: BufferPool,
}

impl ShadeContext {
    pub fn new() -> Self {
        Self {
            scratch: ScratchTarget::new(),
            pool: BufferPool::new(),
        }
    }

    /// Current scratch target dimensions. Grows with demand, never
    /// shrinks.
    pub fn scratch_size(&self) -> (u32, u32) {
        (self.scratch.width, self.scratch.height)
    }

    /// Renders the object in isolation and produces its shade pixels.
    ///
    /// Returns the shade dimensions and the RGBA buffer (opaque black
    /// inside the shade, transparent elsewhere). The buffer is pooled;
    /// it returns to the pool when dropped.
    pub(crate) fn generate(
        &mut self,
        object: &MapObject,
        world_position: Vec2,
    ) -> Result<(u32, u32, PooledBuf<'_>)> {
        let radius = object.shade_size();
        let extent = object.size() + Vec2::splat(radius as f32 * 2.0);
        let width = extent.x.ceil() as u32;
        let height = extent.y.ceil() as u32;

        self.scratch.ensure_size(width, height)?;
        self.scratch.begin_frame();
        {
            let mut capture = ShadeCapture {
                target: &mut self.scratch,
                origin: world_position - Vec2::splat(radius as f32),
            };
            object.kind().draw(&mut capture, world_position);
        }

        let len = (width as usize) * (height as usize) * 4;
        let mut out = self.pool.acquire(len);
        if self.scratch.needs_clear {
            // nothing was drawn; the buffer is already fully transparent
        } else {
            self.scratch.read_rect(width, height, &mut out);
            process_shade(
                &mut out,
                width as usize,
                height as usize,
                radius,
                object.shade_corner_radius(),
                &self.pool,
            );
        }
        Ok((width, height, out))
    }
}

impl Default for ShadeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Dilates the opaque pixels of an RGBA buffer in place.
///
/// A pixel joins the shade if it is opaque itself or if any pixel within
/// the square neighborhood of radius `size` is opaque; with a corner
/// radius the neighborhood is restricted to offsets whose squared
/// distance from the center fits inside it. Output is opaque black for
/// shade pixels and fully transparent otherwise.
fn process_shade(
    pixels: &mut [u8],
    width: usize,
    height: usize,
    size: u32,
    corner_radius: Option<u32>,
    pool: &BufferPool,
) {
    let area = width * height;
    let mut shade = pool.acquire(area);
    let size = size as i32;
    let pattern_side = (size as usize) * 2 + 1;

    // precomputed rounded-corner mask over the probe neighborhood
    let pattern = corner_radius.map(|radius| {
        let mut pattern = pool.acquire(pattern_side * pattern_side);
        let radius_sq = (radius * radius) as i32;
        for j in 0..pattern_side {
            for i in 0..pattern_side {
                let dx = size - i as i32;
                let dy = size - j as i32;
                pattern[i + pattern_side * j] = u8::from(dx * dx + dy * dy <= radius_sq);
            }
        }
        pattern
    });

    for j in 0..height {
        for i in 0..width {
            let index = width * j + i;

            if pixels[index * 4 + 3] > 0 {
                shade[index] = 1;
                continue;
            }
            if size <= 0 {
                continue;
            }

            'probe: for l in -size..=size {
                for k in -size..=size {
                    if let Some(pattern) = &pattern {
                        let pattern_index =
                            ((l + size) as usize) * pattern_side + (k + size) as usize;
                        if pattern[pattern_index] == 0 {
                            continue;
                        }
                    }

                    let x = i as i32 + k;
                    let y = j as i32 + l;
                    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32
                        || (k == 0 && l == 0)
                    {
                        continue;
                    }

                    if pixels[(width * y as usize + x as usize) * 4 + 3] > 0 {
                        shade[index] = 1;
                        break 'probe;
                    }
                }
            }
        }
    }

    for index in 0..area {
        let pixel = &mut pixels[index * 4..index * 4 + 4];
        if shade[index] == 1 {
            pixel.copy_from_slice(&[0, 0, 0, 255]);
        } else {
            pixel.copy_from_slice(&[0, 0, 0, 0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{NullKind, RectKind};
    use crate::{MapObject, MapTree};

    fn shaded_object(kind: Box<dyn crate::ObjectKind>, radius: u32) -> MapObject {
        let mut object = MapObject::new(kind);
        object.set_shade_size(radius);
        object
    }

    fn alpha_at(pixels: &[u8], width: usize, x: usize, y: usize) -> u8 {
        pixels[(width * y + x) * 4 + 3]
    }

    fn shade_pixels(tree: &mut MapTree, id: crate::ObjectId, ctx: &mut ShadeContext) -> Vec<u8> {
        tree.ensure_shade_texture(id, ctx).unwrap();
        tree.get(id)
            .unwrap()
            .shade_texture()
            .map(|texture| texture.pixels().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn test_shade_surrounds_silhouette() {
        let mut tree = MapTree::new();
        let id = tree.insert(None, shaded_object(Box::new(RectKind::opaque(4, 4)), 2));
        let mut ctx = ShadeContext::new();

        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        let texture = tree.get(id).unwrap().shade_texture().unwrap();
        assert_eq!((texture.width(), texture.height()), (8, 8));

        let pixels = texture.pixels();
        // center pixel (inside the silhouette) is shaded black
        assert_eq!(alpha_at(pixels, 8, 4, 4), 255);
        assert_eq!(pixels[(8 * 4 + 4) * 4], 0);
        // a pixel just outside the silhouette but within the radius is shaded
        assert_eq!(alpha_at(pixels, 8, 0, 4), 255);
        // the corner is exactly radius (2,2) away from the nearest opaque
        // pixel, which the square neighborhood still reaches
        assert_eq!(alpha_at(pixels, 8, 0, 0), 255);
    }

    #[test]
    fn test_corner_radius_rounds_the_halo() {
        let mut tree = MapTree::new();
        let mut object = shaded_object(Box::new(RectKind::opaque(2, 2)), 2);
        object.set_shade_corner_radius(Some(2));
        let square = tree.insert(None, shaded_object(Box::new(RectKind::opaque(2, 2)), 2));
        let rounded = tree.insert(None, object);
        let mut ctx = ShadeContext::new();

        let square_pixels = shade_pixels(&mut tree, square, &mut ctx);
        let rounded_pixels = shade_pixels(&mut tree, rounded, &mut ctx);

        // both are 6x6; the square halo fills the corner, the rounded one
        // leaves it transparent because (2,2) is farther than the corner
        // radius from the nearest opaque pixel
        assert_eq!(alpha_at(&square_pixels, 6, 0, 0), 255);
        assert_eq!(alpha_at(&rounded_pixels, 6, 0, 0), 0);
        // straight edges are still shaded
        assert_eq!(alpha_at(&rounded_pixels, 6, 0, 2), 255);
    }

    #[test]
    fn test_empty_draw_yields_transparent_texture() {
        let mut tree = MapTree::new();
        let id = tree.insert(None, shaded_object(Box::new(NullKind::sized(3.0, 3.0)), 1));
        let mut ctx = ShadeContext::new();

        let pixels = shade_pixels(&mut tree, id, &mut ctx);
        assert!(!pixels.is_empty());
        assert!(pixels.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn test_fully_transparent_draw_equals_empty_draw() {
        // drawing only alpha-zero pixels is indistinguishable from drawing
        // nothing at all; both produce an all-transparent shade
        let mut tree = MapTree::new();
        let empty = tree.insert(None, shaded_object(Box::new(NullKind::sized(3.0, 3.0)), 1));
        let clear = tree.insert(None, shaded_object(Box::new(RectKind::transparent(3, 3)), 1));
        let mut ctx = ShadeContext::new();

        let empty_pixels = shade_pixels(&mut tree, empty, &mut ctx);
        let clear_pixels = shade_pixels(&mut tree, clear, &mut ctx);
        assert_eq!(empty_pixels, clear_pixels);
    }

    #[test]
    fn test_shade_idempotent() {
        let mut tree = MapTree::new();
        let id = tree.insert(None, shaded_object(Box::new(RectKind::opaque(5, 3)), 2));
        let mut ctx = ShadeContext::new();

        let first = shade_pixels(&mut tree, id, &mut ctx);
        tree.get_mut(id).unwrap().mark_shade_dirty();
        let second = shade_pixels(&mut tree, id, &mut ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn test_shade_monotonic_in_radius() {
        let mut tree = MapTree::new();
        let id = tree.insert(None, shaded_object(Box::new(RectKind::opaque(4, 4)), 1));
        let mut ctx = ShadeContext::new();

        let small = shade_pixels(&mut tree, id, &mut ctx);
        tree.get_mut(id).unwrap().set_shade_size(3);
        let large = shade_pixels(&mut tree, id, &mut ctx);

        // every shaded pixel at radius 1 is still shaded at radius 3,
        // accounting for the larger texture's offset
        for y in 0..6usize {
            for x in 0..6usize {
                if alpha_at(&small, 6, x, y) > 0 {
                    assert!(alpha_at(&large, 10, x + 2, y + 2) > 0);
                }
            }
        }
    }

    #[test]
    fn test_texture_reused_for_same_dimensions() {
        let mut tree = MapTree::new();
        let id = tree.insert(None, shaded_object(Box::new(RectKind::opaque(4, 4)), 2));
        let mut ctx = ShadeContext::new();

        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        let first_id = tree.get(id).unwrap().shade_texture().unwrap().id();
        tree.get_mut(id).unwrap().mark_shade_dirty();
        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        let second_id = tree.get(id).unwrap().shade_texture().unwrap().id();
        assert_eq!(first_id, second_id);
    }

    #[test]
    fn test_zero_radius_disables_shading() {
        let mut tree = MapTree::new();
        let id = tree.insert(None, shaded_object(Box::new(RectKind::opaque(4, 4)), 2));
        let mut ctx = ShadeContext::new();

        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        assert!(tree.get(id).unwrap().shade_texture().is_some());

        tree.get_mut(id).unwrap().set_shade_size(0);
        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        assert!(tree.get(id).unwrap().shade_texture().is_none());
        assert_eq!(tree.get(id).unwrap().shade_state(), ShadeState::Absent);
    }

    #[test]
    fn test_scratch_target_grows_never_shrinks() {
        let mut tree = MapTree::new();
        let big = tree.insert(None, shaded_object(Box::new(RectKind::opaque(20, 10)), 2));
        let small = tree.insert(None, shaded_object(Box::new(RectKind::opaque(2, 2)), 1));
        let mut ctx = ShadeContext::new();

        tree.ensure_shade_texture(big, &mut ctx).unwrap();
        assert_eq!(ctx.scratch_size(), (24, 14));
        tree.ensure_shade_texture(small, &mut ctx).unwrap();
        assert_eq!(ctx.scratch_size(), (24, 14));

        // growing one axis keeps the other
        let tall = tree.insert(None, shaded_object(Box::new(RectKind::opaque(2, 30)), 1));
        tree.ensure_shade_texture(tall, &mut ctx).unwrap();
        assert_eq!(ctx.scratch_size(), (24, 32));
    }

    #[test]
    fn test_pool_buffers_return_after_use() {
        let pool = BufferPool::new();
        {
            let _a = pool.acquire(16);
            let _b = pool.acquire(32);
            assert_eq!(pool.idle_buffers(), 0);
        }
        assert_eq!(pool.idle_buffers(), 2);

        // reacquired buffers come back zeroed
        let buf = pool.acquire(8);
        assert!(buf.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn test_shade_state_transitions() {
        let mut object = MapObject::new(Box::new(RectKind::opaque(2, 2)));
        assert_eq!(object.shade_state(), ShadeState::Absent);

        object.set_shade_size(2);
        // no texture yet, so still absent rather than stale
        assert_eq!(object.shade_state(), ShadeState::Absent);

        let mut tree = MapTree::new();
        let id = tree.insert(None, object);
        let mut ctx = ShadeContext::new();
        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        assert_eq!(tree.get(id).unwrap().shade_state(), ShadeState::Valid { radius: 2 });

        tree.get_mut(id).unwrap().set_shade_size(4);
        assert_eq!(
            tree.get(id).unwrap().shade_state(),
            ShadeState::Stale(ShadeStaleness::SizeChanged)
        );

        tree.ensure_shade_texture(id, &mut ctx).unwrap();
        tree.get_mut(id).unwrap().mark_shade_dirty();
        assert_eq!(
            tree.get(id).unwrap().shade_state(),
            ShadeState::Stale(ShadeStaleness::MarkedDirty)
        );
    }
}
