//! CPU-side texture objects.
//!
//! The core keeps pixel data on the CPU; the concrete rendering backend
//! mirrors each [`Texture`] into its own GPU resource, keyed by
//! [`TextureId`]. The id is stable while a texture's dimensions stay
//! unchanged and changes whenever the backing allocation is replaced, so
//! a backend that sees a new id on a known object must release the old
//! resource. The `version` counter signals in-place pixel updates that
//! need a re-upload.

use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a texture allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        TextureId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An RGBA pixel buffer with allocation identity.
#[derive(Debug, Clone)]
pub struct Texture {
    id: TextureId,
    image: RgbaImage,
    version: u64,
}

impl Texture {
    /// Creates a fully transparent texture of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: TextureId::next(),
            image: RgbaImage::new(width, height),
            version: 0,
        }
    }

    /// Creates a texture from raw RGBA bytes (row-major, 4 bytes per pixel).
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Self {
        let mut texture = Self::new(width, height);
        texture.write_pixels(rgba);
        texture
    }

    /// Wraps an existing image buffer.
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            id: TextureId::next(),
            image,
            version: 0,
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Bumped on every in-place pixel update.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Overwrites the pixel contents without changing dimensions.
    pub fn write_pixels(&mut self, rgba: &[u8]) {
        assert_eq!(
            rgba.len(),
            (self.width() * self.height() * 4) as usize,
            "pixel data length must match texture dimensions"
        );
        self.image.copy_from_slice(rgba);
        self.version += 1;
    }

    /// Replaces the texture contents.
    ///
    /// When the dimensions are unchanged the existing allocation is
    /// reused and the id stays stable; otherwise the buffer is replaced
    /// and a fresh id is taken, which tells backends to release the
    /// resource backing the old one.
    pub fn replace(&mut self, width: u32, height: u32, rgba: &[u8]) {
        if self.width() == width && self.height() == height {
            self.write_pixels(rgba);
        } else {
            assert_eq!(
                rgba.len(),
                (width * height * 4) as usize,
                "pixel data length must match texture dimensions"
            );
            let mut image = RgbaImage::new(width, height);
            image.copy_from_slice(rgba);
            self.image = image;
            self.id = TextureId::next();
            self.version = 0;
        }
    }
}
