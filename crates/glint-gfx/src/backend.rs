//! The seam between the batching core and whatever actually draws.
//!
//! [`RenderBackend`] is the whole GPU surface the core depends on: texture
//! lifecycle, blend/clip state, clearing, and vertex submission. The core is
//! fully testable against [`RecordingBackend`], which records every call and
//! never touches a device.

use std::collections::HashMap;

use crate::pack::Vertex;
use crate::state::BlendMode;

/// Backend-assigned texture identifier. `0` is reserved as invalid; real
/// ids start at 1.
pub type BackendTextureId = u32;

/// Sampler filtering for a texture.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Filtering {
    Nearest,
    #[default]
    Linear,
    /// Linear with mipmaps.
    Trilinear,
}

/// Pixel data plus sampler options for texture creation or update.
#[derive(Debug)]
pub struct TextureUpload<'a> {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, `width * height * 4` bytes.
    pub pixels: &'a [u8],
    pub filtering: Filtering,
    pub repeat: bool,
}

/// Scissor rectangle in physical pixels, top-left origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// One flushed batch: everything the backend needs to draw it.
#[derive(Debug)]
pub struct Submission<'a> {
    pub vertices: &'a [Vertex],
    pub texture: BackendTextureId,
    pub resolution: [f32; 2],
}

/// Device abstraction the renderer core drives.
pub trait RenderBackend {
    /// Creates a texture and returns its id (never 0).
    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> BackendTextureId;

    /// Replaces the contents (and possibly dimensions) of a texture.
    fn update_texture(&mut self, id: BackendTextureId, upload: &TextureUpload<'_>);

    fn delete_texture(&mut self, id: BackendTextureId);

    fn set_blend(&mut self, mode: BlendMode);

    /// `None` disables scissoring.
    fn set_clip(&mut self, clip: Option<ClipRect>);

    /// Clears the target to an RGBA color in `0.0..=1.0`.
    fn clear(&mut self, color: [f32; 4]);

    /// Draws one batch of triangles.
    fn submit(&mut self, submission: Submission<'_>);
}

// ── recording backend ───────────────────────────────────────────────────────

/// A batch captured by [`RecordingBackend`].
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub vertices: Vec<Vertex>,
    pub texture: BackendTextureId,
    pub resolution: [f32; 2],
}

/// Headless backend that records calls instead of drawing.
///
/// Useful both for tests and for inspecting what a frame would submit.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: BackendTextureId,
    pub textures: HashMap<BackendTextureId, (u32, u32)>,
    pub submissions: Vec<RecordedSubmission>,
    pub clears: Vec<[f32; 4]>,
    pub blend: BlendMode,
    pub clip: Option<ClipRect>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total vertices across all recorded submissions.
    pub fn vertex_count(&self) -> usize {
        self.submissions.iter().map(|s| s.vertices.len()).sum()
    }
}

impl RenderBackend for RecordingBackend {
    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> BackendTextureId {
        self.next_id += 1;
        self.textures.insert(self.next_id, (upload.width, upload.height));
        self.next_id
    }

    fn update_texture(&mut self, id: BackendTextureId, upload: &TextureUpload<'_>) {
        if let Some(dims) = self.textures.get_mut(&id) {
            *dims = (upload.width, upload.height);
        }
    }

    fn delete_texture(&mut self, id: BackendTextureId) {
        self.textures.remove(&id);
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_clip(&mut self, clip: Option<ClipRect>) {
        self.clip = clip;
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.clears.push(color);
    }

    fn submit(&mut self, submission: Submission<'_>) {
        self.submissions.push(RecordedSubmission {
            vertices: submission.vertices.to_vec(),
            texture: submission.texture,
            resolution: submission.resolution,
        });
    }
}
