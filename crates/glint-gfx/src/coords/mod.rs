//! Coordinate and geometry types shared across the renderer.
//!
//! Canonical CPU space:
//! - Logical pixels, established per frame by `frame_begin`
//! - Origin top-left
//! - +X right, +Y down
//!
//! The backend converts to clip space using a resolution uniform.

mod vec2;

pub use vec2::Vec2;
