//! # Core utilities and shared types for Maproom
//!
//! This crate provides the common types used throughout the map editor
//! core: axis-aligned bounds for hit testing and visual extents, the
//! render layer registry consumed by draw passes and spatial queries,
//! and CPU-side texture objects handed across the renderer boundary.

pub mod bounds;
pub mod layer;
pub mod texture;
