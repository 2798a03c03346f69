//! Texture records and handle bookkeeping types.

use crate::backend::{BackendTextureId, Filtering};

/// Public texture handle.
///
/// Handle 0 ([`TextureHandle::WHITE`]) is the reserved 2×2 opaque white
/// texture: always valid to draw with, returned by creation failures, and
/// invisible to `query_texture`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// The built-in solid white surface.
    pub const WHITE: TextureHandle = TextureHandle(0);

    /// The built-in 64×64 circle point sprite (centered, draw scale 1/64).
    pub const CIRCLE: TextureHandle = TextureHandle(1);

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Sampler options carried from creation through async completion.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TextureOptions {
    pub filtering: Filtering,
    pub repeat: bool,
}

/// Per-tile creation options.
///
/// Tiles inherit the parent's fractional pivot by default; either axis can
/// be overridden here.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct TileOptions {
    /// Pivot x as a fraction of the tile width.
    pub center_x: Option<f32>,
    /// Pivot y as a fraction of the tile height.
    pub center_y: Option<f32>,
}

/// Whether a record owns a backend texture or views part of another one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TextureKind {
    /// Owns the backend texture.
    Root { backend: BackendTextureId },
    /// Sub-rectangle of another surface. Stores the ultimate non-tile
    /// ancestor so resolving the backend texture is a single hop.
    Tile { ancestor: TextureHandle },
}

/// One registry slot.
#[derive(Debug, Clone)]
pub(crate) struct TextureRecord {
    pub kind: TextureKind,
    /// Source rectangle in backing-surface pixels. For roots this spans the
    /// whole surface.
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// Backing surface dimensions, for pixel-to-fixed-point UV conversion.
    pub surface_w: u32,
    pub surface_h: u32,
    /// Pivot as fractions of the region size.
    pub cx: f32,
    pub cy: f32,
    /// Extra scale applied by `draw_image` (point sprites draw smaller than
    /// their backing texture).
    pub draw_scale: f32,
    pub ready: bool,
    pub released: bool,
    pub opts: TextureOptions,
}

impl TextureRecord {
    pub fn root(backend: BackendTextureId, width: u32, height: u32, opts: TextureOptions) -> Self {
        Self {
            kind: TextureKind::Root { backend },
            x: 0.0,
            y: 0.0,
            w: width as f32,
            h: height as f32,
            surface_w: width,
            surface_h: height,
            cx: 0.0,
            cy: 0.0,
            draw_scale: 1.0,
            ready: true,
            released: false,
            opts,
        }
    }
}

/// How a deferred tile computes its rectangle once the parent is ready.
#[derive(Debug, Copy, Clone)]
pub(crate) enum TileSpec {
    /// Fractional coordinates of the parent region.
    Fractional { x: f32, y: f32, w: f32, h: f32 },
    /// Cell of a uniform grid with a pixel border inset.
    GridCell { tiles_x: u32, tiles_y: u32, col: u32, row: u32, border: u32 },
}

/// What `query_texture` reports.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureInfo {
    /// Region width in pixels.
    pub width: f32,
    /// Region height in pixels.
    pub height: f32,
    /// Draw scale (1.0 for ordinary textures).
    pub scale: f32,
    /// Pivot as fractions of the region size.
    pub center_x: f32,
    pub center_y: f32,
    /// `false` while an async load is outstanding or after release.
    pub ready: bool,
}
