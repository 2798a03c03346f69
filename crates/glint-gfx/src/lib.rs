//! glint rendering core.
//!
//! A batched immediate-mode 2D renderer: drawing calls accumulate packed
//! vertices CPU-side and are submitted to a pluggable [`backend`] in large
//! texture-coherent batches. This crate is backend-agnostic; `glint-wgpu`
//! provides the GPU implementation.

pub mod backend;
pub mod batch;
pub mod coords;
pub mod logging;
pub mod pack;
pub mod registry;
pub mod renderer;
pub mod state;

pub use backend::{BackendTextureId, ClipRect, Filtering, RenderBackend, Submission, TextureUpload};
pub use coords::Vec2;
pub use pack::{pack_color, unpack_color, Vertex, UV_MAX};
pub use registry::{
    FileLoader, FontHandle, LoadTicket, PixelImage, ResourceLoader, TextMetrics, TextureHandle,
    TextureInfo, TextureOptions, TileOptions,
};
pub use renderer::{Align, Flip, InstanceComps, Renderer};
pub use state::{BlendMode, GraphicsState, StateChange, Transform2D, STACK_DEPTH};
