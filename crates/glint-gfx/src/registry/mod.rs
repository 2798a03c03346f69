//! Texture and font registry.
//!
//! Handles are indices into append-only slot tables; records are never
//! removed, only marked released, so stale handles degrade to no-ops
//! instead of aliasing new resources.
//!
//! Two built-in textures exist from construction:
//! - handle 0: 2×2 opaque white, the fallback for untextured fills and
//!   failed creations
//! - handle 1: 64×64 anti-aliased circle sprite (draw scale 1/64,
//!   centered) used for thick line joints and points

mod fonts;
mod loader;
mod textures;

pub use fonts::{FontHandle, TextMetrics, GLYPH_COUNT, GLYPH_MIN};
pub use loader::{FileLoader, LoadTicket, NullLoader, PixelImage, ResourceLoader};
pub use textures::{TextureHandle, TextureInfo, TextureOptions, TileOptions};

pub(crate) use fonts::{uv_rect, FontRecord, Glyph};
pub(crate) use textures::{TextureKind, TextureRecord};

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::backend::{BackendTextureId, Filtering, RenderBackend, TextureUpload};
use loader::LoadCompletion;
use textures::TileSpec;

/// Invoked once when an asynchronously loaded texture becomes ready.
pub type ReadyCallback = Box<dyn FnOnce(TextureHandle)>;

pub struct Registry {
    textures: Vec<TextureRecord>,
    fonts: Vec<FontRecord>,
    tx: Sender<LoadCompletion>,
    rx: Receiver<LoadCompletion>,
    pending_tiles: Vec<(TextureHandle, TextureHandle, TileSpec, TileOptions)>,
    pending_centers: Vec<(TextureHandle, f32, f32)>,
    pending_image_fonts: Vec<(FontHandle, TextureHandle, u32)>,
    ready_callbacks: Vec<(TextureHandle, ReadyCallback)>,
}

impl Registry {
    /// Creates the registry with the two built-in textures installed.
    pub(crate) fn new(backend: &mut dyn RenderBackend) -> Self {
        let (tx, rx) = channel();
        let mut reg = Self {
            textures: Vec::new(),
            fonts: Vec::new(),
            tx,
            rx,
            pending_tiles: Vec::new(),
            pending_centers: Vec::new(),
            pending_image_fonts: Vec::new(),
            ready_callbacks: Vec::new(),
        };

        // Handle 0: solid white.
        let white = backend.create_texture(&TextureUpload {
            width: 2,
            height: 2,
            pixels: &[255u8; 16],
            filtering: Filtering::Nearest,
            repeat: false,
        });
        reg.textures.push(TextureRecord::root(white, 2, 2, TextureOptions {
            filtering: Filtering::Nearest,
            repeat: false,
        }));

        // Handle 1: circle point sprite.
        let circle_pixels = circle_sprite(64);
        let circle = backend.create_texture(&TextureUpload {
            width: 64,
            height: 64,
            pixels: &circle_pixels,
            filtering: Filtering::Linear,
            repeat: false,
        });
        let mut rec = TextureRecord::root(circle, 64, 64, TextureOptions::default());
        rec.cx = 0.5;
        rec.cy = 0.5;
        rec.draw_scale = 1.0 / 64.0;
        reg.textures.push(rec);

        reg
    }

    // ── textures ────────────────────────────────────────────────────────────

    /// Creates a texture from pixels already in memory.
    ///
    /// Returns [`TextureHandle::WHITE`] and logs an error if `pixels` does
    /// not hold exactly `width * height * 4` bytes.
    pub fn create_texture(
        &mut self,
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        pixels: &[u8],
        opts: TextureOptions,
    ) -> TextureHandle {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            log::error!(
                "create_texture: {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            );
            return TextureHandle::WHITE;
        }
        let id = backend.create_texture(&TextureUpload {
            width,
            height,
            pixels,
            filtering: opts.filtering,
            repeat: opts.repeat,
        });
        self.push_record(TextureRecord::root(id, width, height, opts))
    }

    /// Starts an asynchronous load and returns the handle immediately.
    ///
    /// Until the load completes the handle draws as a 1×1 opaque blue
    /// placeholder and reports `ready: false`. Failed loads are logged and
    /// stay placeholders.
    pub fn load_texture(
        &mut self,
        backend: &mut dyn RenderBackend,
        loader: &mut dyn ResourceLoader,
        path: &str,
        opts: TextureOptions,
        on_ready: Option<ReadyCallback>,
    ) -> TextureHandle {
        let id = backend.create_texture(&TextureUpload {
            width: 1,
            height: 1,
            pixels: &[0, 0, 255, 255],
            filtering: opts.filtering,
            repeat: opts.repeat,
        });
        let mut rec = TextureRecord::root(id, 1, 1, opts);
        rec.ready = false;
        let handle = self.push_record(rec);
        if let Some(cb) = on_ready {
            self.ready_callbacks.push((handle, cb));
        }
        loader.request(path, LoadTicket::new(handle, self.tx.clone()));
        handle
    }

    /// Creates a view of a sub-rectangle of `parent`, in fractional
    /// coordinates of the parent region (`0.0..=1.0` on each axis). The
    /// tile inherits the parent's pivot unless `opts` overrides it.
    ///
    /// If the parent is not ready yet, the tile is recorded and resolved
    /// when the parent's pixels arrive.
    pub fn create_tile(
        &mut self,
        parent: TextureHandle,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        opts: TileOptions,
    ) -> TextureHandle {
        let Some(p) = self.live_record(parent) else {
            log::warn!("create_tile: invalid parent handle {}", parent.0);
            return TextureHandle::WHITE;
        };
        if p.ready {
            let rec = self.resolve_fractional(parent, x, y, w, h, opts);
            self.push_record(rec)
        } else {
            let handle = self.push_deferred_tile(parent);
            self.pending_tiles
                .push((handle, parent, TileSpec::Fractional { x, y, w, h }, opts));
            handle
        }
    }

    /// Splits `parent` into a `tiles_x × tiles_y` grid, insetting each cell
    /// by `border` pixels. Returns handles row-major.
    pub fn create_tiles(
        &mut self,
        parent: TextureHandle,
        tiles_x: u32,
        tiles_y: u32,
        border: u32,
        opts: TileOptions,
    ) -> Vec<TextureHandle> {
        if tiles_x == 0 || tiles_y == 0 {
            log::warn!("create_tiles: zero grid dimension");
            return Vec::new();
        }
        let Some(p) = self.live_record(parent) else {
            log::warn!("create_tiles: invalid parent handle {}", parent.0);
            return Vec::new();
        };
        let ready = p.ready;
        let mut handles = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for row in 0..tiles_y {
            for col in 0..tiles_x {
                let spec = TileSpec::GridCell { tiles_x, tiles_y, col, row, border };
                if ready {
                    let rec = self.resolve_tile_spec(parent, spec, opts);
                    handles.push(self.push_record(rec));
                } else {
                    let handle = self.push_deferred_tile(parent);
                    self.pending_tiles.push((handle, parent, spec, opts));
                    handles.push(handle);
                }
            }
        }
        handles
    }

    /// Releases a texture. Root records free their backend texture; tiles
    /// only drop their view. Returns the freed backend id (for the renderer
    /// to flush against) if one was owned and bound-able.
    pub fn release_texture(
        &mut self,
        backend: &mut dyn RenderBackend,
        handle: TextureHandle,
    ) -> Option<BackendTextureId> {
        if handle == TextureHandle::WHITE || handle.0 == 1 {
            log::warn!("release_texture: built-in handle {}", handle.0);
            return None;
        }
        let rec = self.textures.get_mut(handle.index())?;
        if rec.released {
            return None;
        }
        let freed = match rec.kind {
            TextureKind::Root { backend: id } => {
                backend.delete_texture(id);
                Some(id)
            }
            TextureKind::Tile { .. } => None,
        };
        rec.released = true;
        rec.ready = false;
        rec.w = 0.0;
        rec.h = 0.0;
        rec.surface_w = 0;
        rec.surface_h = 0;
        freed
    }

    /// Dimensions, pivot and readiness of a handle. `None` for handle 0,
    /// out-of-range and released handles.
    pub fn query_texture(&self, handle: TextureHandle) -> Option<TextureInfo> {
        if handle.0 < 1 {
            return None;
        }
        let rec = self.textures.get(handle.index())?;
        if rec.released {
            return None;
        }
        Some(TextureInfo {
            width: rec.w,
            height: rec.h,
            scale: rec.draw_scale,
            center_x: rec.cx,
            center_y: rec.cy,
            ready: rec.ready,
        })
    }

    /// Sets the draw pivot as fractions of the region size. Deferred until
    /// ready for still-loading textures.
    pub fn set_texture_center(&mut self, handle: TextureHandle, cx: f32, cy: f32) {
        let Some(rec) = self.textures.get_mut(handle.index()) else {
            log::warn!("set_texture_center: invalid handle {}", handle.0);
            return;
        };
        if rec.released {
            return;
        }
        if rec.ready {
            rec.cx = cx;
            rec.cy = cy;
        } else {
            self.pending_centers.push((handle, cx, cy));
        }
    }

    /// Drains async load completions and resolves everything that was
    /// waiting on them. Called once per frame.
    pub fn poll_loads(&mut self, backend: &mut dyn RenderBackend) {
        let mut any_ready = false;
        while let Ok(done) = self.rx.try_recv() {
            match done.result {
                Ok(img) => {
                    if self.finish_load(backend, done.handle, img) {
                        any_ready = true;
                    }
                }
                Err(e) => log::warn!("texture load failed: {e:#}"),
            }
        }
        if any_ready {
            self.resolve_pending();
        }
    }

    // ── fonts ───────────────────────────────────────────────────────────────

    /// Rasterizes a vector font at `px_height` into a fresh glyph atlas.
    ///
    /// Returns [`FontHandle::INVALID`] (and logs) if the bytes do not parse
    /// or the atlas overflows.
    pub fn create_font(
        &mut self,
        backend: &mut dyn RenderBackend,
        bytes: &[u8],
        px_height: f32,
    ) -> FontHandle {
        match fonts::bake_font(bytes, px_height) {
            Ok((atlas, glyphs, height)) => {
                let id = backend.create_texture(&TextureUpload {
                    width: atlas.width,
                    height: atlas.height,
                    pixels: &atlas.pixels,
                    filtering: Filtering::Linear,
                    repeat: false,
                });
                self.push_font(FontRecord { backend: id, glyphs, height, ready: true })
            }
            Err(e) => {
                log::error!("create_font: {e:#}");
                FontHandle::INVALID
            }
        }
    }

    /// Builds a font from a 16×16 character-grid texture. Deferred while
    /// the texture is still loading.
    pub fn create_image_font(&mut self, texture: TextureHandle, border: u32) -> FontHandle {
        let Some(rec) = self.live_record(texture) else {
            log::warn!("create_image_font: invalid texture handle {}", texture.0);
            return FontHandle::INVALID;
        };
        if rec.ready {
            let region = (rec.x, rec.y, rec.w, rec.h);
            let surface = (rec.surface_w, rec.surface_h);
            let backend = self.backend_of(texture);
            let (glyphs, height) = fonts::grid_glyphs(region, surface, border);
            self.push_font(FontRecord { backend, glyphs, height, ready: true })
        } else {
            let handle = self.push_font(FontRecord {
                backend: 0,
                glyphs: vec![Glyph::default(); GLYPH_COUNT],
                height: 0.0,
                ready: false,
            });
            self.pending_image_fonts.push((handle, texture, border));
            handle
        }
    }

    /// Measures `text` with `font`. Unknown or unready fonts measure as
    /// zero.
    pub fn measure_text(&self, font: FontHandle, text: &str) -> TextMetrics {
        match self.font(font) {
            Some(f) => f.measure(text),
            None => TextMetrics::default(),
        }
    }

    // ── internal accessors ──────────────────────────────────────────────────

    pub(crate) fn record(&self, handle: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(handle.index())
    }

    pub(crate) fn font(&self, handle: FontHandle) -> Option<&FontRecord> {
        if handle.0 < 1 {
            return None;
        }
        self.fonts.get(handle.0 as usize - 1).filter(|f| f.ready)
    }

    /// Backend texture backing `handle` (the ancestor's for tiles).
    pub(crate) fn backend_of(&self, handle: TextureHandle) -> BackendTextureId {
        match self.textures.get(handle.index()).map(|r| r.kind) {
            Some(TextureKind::Root { backend }) => backend,
            Some(TextureKind::Tile { ancestor }) => {
                match self.textures.get(ancestor.index()).map(|r| r.kind) {
                    Some(TextureKind::Root { backend }) => backend,
                    _ => 0,
                }
            }
            None => 0,
        }
    }

    // ── plumbing ────────────────────────────────────────────────────────────

    fn push_record(&mut self, rec: TextureRecord) -> TextureHandle {
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(rec);
        handle
    }

    fn push_font(&mut self, rec: FontRecord) -> FontHandle {
        self.fonts.push(rec);
        FontHandle(self.fonts.len() as u32)
    }

    fn live_record(&self, handle: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(handle.index()).filter(|r| !r.released)
    }

    /// Placeholder record for a tile whose parent has no pixels yet.
    fn push_deferred_tile(&mut self, parent: TextureHandle) -> TextureHandle {
        let ancestor = self.ancestor_of(parent);
        self.push_record(TextureRecord {
            kind: TextureKind::Tile { ancestor },
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 0.0,
            surface_w: 0,
            surface_h: 0,
            cx: 0.0,
            cy: 0.0,
            draw_scale: 1.0,
            ready: false,
            released: false,
            opts: TextureOptions::default(),
        })
    }

    fn ancestor_of(&self, handle: TextureHandle) -> TextureHandle {
        match self.textures.get(handle.index()).map(|r| r.kind) {
            Some(TextureKind::Tile { ancestor }) => ancestor,
            _ => handle,
        }
    }

    fn resolve_fractional(
        &self,
        parent: TextureHandle,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        tile_opts: TileOptions,
    ) -> TextureRecord {
        let p = &self.textures[parent.index()];
        TextureRecord {
            kind: TextureKind::Tile { ancestor: self.ancestor_of(parent) },
            x: p.x + x * p.w,
            y: p.y + y * p.h,
            w: w * p.w,
            h: h * p.h,
            surface_w: p.surface_w,
            surface_h: p.surface_h,
            cx: tile_opts.center_x.unwrap_or(p.cx),
            cy: tile_opts.center_y.unwrap_or(p.cy),
            draw_scale: 1.0,
            ready: true,
            released: false,
            opts: p.opts,
        }
    }

    fn resolve_tile_spec(
        &self,
        parent: TextureHandle,
        spec: TileSpec,
        tile_opts: TileOptions,
    ) -> TextureRecord {
        match spec {
            TileSpec::Fractional { x, y, w, h } => {
                self.resolve_fractional(parent, x, y, w, h, tile_opts)
            }
            TileSpec::GridCell { tiles_x, tiles_y, col, row, border } => {
                let p = &self.textures[parent.index()];
                let cell_w = p.w / tiles_x as f32;
                let cell_h = p.h / tiles_y as f32;
                let b = border as f32;
                TextureRecord {
                    kind: TextureKind::Tile { ancestor: self.ancestor_of(parent) },
                    x: p.x + col as f32 * cell_w + b,
                    y: p.y + row as f32 * cell_h + b,
                    w: cell_w - 2.0 * b,
                    h: cell_h - 2.0 * b,
                    surface_w: p.surface_w,
                    surface_h: p.surface_h,
                    cx: tile_opts.center_x.unwrap_or(p.cx),
                    cy: tile_opts.center_y.unwrap_or(p.cy),
                    draw_scale: 1.0,
                    ready: true,
                    released: false,
                    opts: p.opts,
                }
            }
        }
    }

    /// Uploads arrived pixels over the placeholder. Returns whether the
    /// record transitioned to ready.
    fn finish_load(
        &mut self,
        backend: &mut dyn RenderBackend,
        handle: TextureHandle,
        img: PixelImage,
    ) -> bool {
        let Some(rec) = self.textures.get_mut(handle.index()) else {
            return false;
        };
        if rec.released {
            return false;
        }
        let TextureKind::Root { backend: id } = rec.kind else {
            return false;
        };
        if img.pixels.len() != img.width as usize * img.height as usize * 4 {
            log::warn!("texture load returned malformed pixel buffer, keeping placeholder");
            return false;
        }
        backend.update_texture(id, &TextureUpload {
            width: img.width,
            height: img.height,
            pixels: &img.pixels,
            filtering: rec.opts.filtering,
            repeat: rec.opts.repeat,
        });
        rec.w = img.width as f32;
        rec.h = img.height as f32;
        rec.surface_w = img.width;
        rec.surface_h = img.height;
        rec.ready = true;
        true
    }

    /// Resolves deferred tiles, centers, image fonts and callbacks whose
    /// prerequisites became ready. Loops because tiles can unlock further
    /// pending entries (tiles of tiles).
    fn resolve_pending(&mut self) {
        loop {
            let mut progressed = false;

            let mut still_pending = Vec::new();
            for (tile, parent, spec, opts) in std::mem::take(&mut self.pending_tiles) {
                let parent_ready = self.live_record(parent).is_some_and(|r| r.ready);
                if parent_ready {
                    let rec = self.resolve_tile_spec(parent, spec, opts);
                    self.textures[tile.index()] = rec;
                    progressed = true;
                } else {
                    still_pending.push((tile, parent, spec, opts));
                }
            }
            self.pending_tiles = still_pending;

            let mut still_pending = Vec::new();
            for (handle, cx, cy) in std::mem::take(&mut self.pending_centers) {
                match self.textures.get_mut(handle.index()) {
                    Some(rec) if rec.ready => {
                        rec.cx = cx;
                        rec.cy = cy;
                        progressed = true;
                    }
                    Some(rec) if !rec.released => still_pending.push((handle, cx, cy)),
                    _ => {}
                }
            }
            self.pending_centers = still_pending;

            let mut still_pending = Vec::new();
            for (font, texture, border) in std::mem::take(&mut self.pending_image_fonts) {
                let tex_ready = self.live_record(texture).is_some_and(|r| r.ready);
                if tex_ready {
                    let rec = &self.textures[texture.index()];
                    let region = (rec.x, rec.y, rec.w, rec.h);
                    let surface = (rec.surface_w, rec.surface_h);
                    let backend = self.backend_of(texture);
                    let (glyphs, height) = fonts::grid_glyphs(region, surface, border);
                    self.fonts[font.0 as usize - 1] =
                        FontRecord { backend, glyphs, height, ready: true };
                    progressed = true;
                } else {
                    still_pending.push((font, texture, border));
                }
            }
            self.pending_image_fonts = still_pending;

            if !progressed {
                break;
            }
        }

        let mut still_pending = Vec::new();
        for (handle, cb) in std::mem::take(&mut self.ready_callbacks) {
            if self.live_record(handle).is_some_and(|r| r.ready) {
                cb(handle);
            } else {
                still_pending.push((handle, cb));
            }
        }
        self.ready_callbacks = still_pending;
    }

    /// Test hook: installs a prebuilt font record.
    #[cfg(test)]
    pub(crate) fn inject_font(&mut self, rec: FontRecord) -> FontHandle {
        self.push_font(rec)
    }
}

/// Procedural anti-aliased filled circle, white with coverage alpha.
fn circle_sprite(side: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (side * side * 4) as usize];
    let r = side as f32 / 2.0;
    for y in 0..side {
        for x in 0..side {
            let dx = x as f32 + 0.5 - r;
            let dy = y as f32 + 0.5 - r;
            let d = (dx * dx + dy * dy).sqrt();
            // 1px anti-aliasing band at the rim.
            let cov = ((r - d).clamp(0.0, 1.0) * 255.0) as u8;
            let o = ((y * side + x) * 4) as usize;
            pixels[o] = 255;
            pixels[o + 1] = 255;
            pixels[o + 2] = 255;
            pixels[o + 3] = cov;
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn setup() -> (RecordingBackend, Registry) {
        let mut backend = RecordingBackend::new();
        let registry = Registry::new(&mut backend);
        (backend, registry)
    }

    fn rgba(w: u32, h: u32) -> Vec<u8> {
        vec![128u8; (w * h * 4) as usize]
    }

    // ── creation and queries ────────────────────────────────────────────────

    #[test]
    fn builtins_occupy_first_two_slots() {
        let (backend, reg) = setup();
        assert_eq!(backend.textures.len(), 2);
        assert!(reg.query_texture(TextureHandle::WHITE).is_none());
        let circle = reg.query_texture(TextureHandle(1)).unwrap();
        assert_eq!(circle.width, 64.0);
        assert_eq!(circle.scale, 1.0 / 64.0);
        assert_eq!((circle.center_x, circle.center_y), (0.5, 0.5));
    }

    #[test]
    fn create_and_query() {
        let (mut backend, mut reg) = setup();
        let h = reg.create_texture(&mut backend, 2, 2, &rgba(2, 2), TextureOptions::default());
        let info = reg.query_texture(h).unwrap();
        assert_eq!((info.width, info.height), (2.0, 2.0));
        assert!(info.ready);
        assert_eq!(info.scale, 1.0);
    }

    #[test]
    fn create_rejects_wrong_buffer_size() {
        let (mut backend, mut reg) = setup();
        let h = reg.create_texture(&mut backend, 4, 4, &rgba(2, 2), TextureOptions::default());
        assert_eq!(h, TextureHandle::WHITE);
    }

    #[test]
    fn create_rejects_oversized_dimensions() {
        let (mut backend, mut reg) = setup();
        // width * height * 4 would wrap a u32; the length check must not.
        let h = reg.create_texture(&mut backend, 1 << 16, 1 << 16, &[0u8; 4], TextureOptions::default());
        assert_eq!(h, TextureHandle::WHITE);
    }

    #[test]
    fn query_rejects_bad_handles() {
        let (_, reg) = setup();
        assert!(reg.query_texture(TextureHandle(0)).is_none());
        assert!(reg.query_texture(TextureHandle(999)).is_none());
    }

    // ── tiles ───────────────────────────────────────────────────────────────

    #[test]
    fn tile_of_ready_parent_uses_fractional_coords() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 100, 50, &rgba(100, 50), TextureOptions::default());
        let tile = reg.create_tile(parent, 0.5, 0.0, 0.5, 1.0, TileOptions::default());
        let info = reg.query_texture(tile).unwrap();
        assert_eq!((info.width, info.height), (50.0, 50.0));
        let rec = reg.record(tile).unwrap();
        assert_eq!((rec.x, rec.y), (50.0, 0.0));
        assert_eq!(reg.backend_of(tile), reg.backend_of(parent));
    }

    #[test]
    fn nested_tiles_reference_the_root() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 64, 64, &rgba(64, 64), TextureOptions::default());
        let tile = reg.create_tile(parent, 0.0, 0.0, 0.5, 0.5, TileOptions::default());
        let sub = reg.create_tile(tile, 0.5, 0.5, 0.5, 0.5, TileOptions::default());
        let rec = reg.record(sub).unwrap();
        assert_eq!(rec.kind, TextureKind::Tile { ancestor: parent });
        assert_eq!((rec.x, rec.y, rec.w, rec.h), (16.0, 16.0, 16.0, 16.0));
    }

    #[test]
    fn grid_tiles_inset_border() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 64, 32, &rgba(64, 32), TextureOptions::default());
        let tiles = reg.create_tiles(parent, 4, 2, 1, TileOptions::default());
        assert_eq!(tiles.len(), 8);
        // Second cell of the second row: cell 16x16 at (16, 16), inset 1.
        let rec = reg.record(tiles[5]).unwrap();
        assert_eq!((rec.x, rec.y, rec.w, rec.h), (17.0, 17.0, 14.0, 14.0));
    }

    #[test]
    fn tile_inherits_parent_pivot() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 64, 64, &rgba(64, 64), TextureOptions::default());
        reg.set_texture_center(parent, 0.5, 0.5);
        let tile = reg.create_tile(parent, 0.0, 0.0, 0.5, 0.5, TileOptions::default());
        let info = reg.query_texture(tile).unwrap();
        assert_eq!((info.center_x, info.center_y), (0.5, 0.5));
    }

    #[test]
    fn tile_pivot_override_per_axis() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 64, 64, &rgba(64, 64), TextureOptions::default());
        reg.set_texture_center(parent, 0.5, 0.5);
        let tile = reg.create_tile(
            parent,
            0.0,
            0.0,
            1.0,
            1.0,
            TileOptions { center_x: Some(0.0), center_y: None },
        );
        let info = reg.query_texture(tile).unwrap();
        assert_eq!((info.center_x, info.center_y), (0.0, 0.5));
    }

    #[test]
    fn grid_tiles_inherit_parent_pivot() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 32, 32, &rgba(32, 32), TextureOptions::default());
        reg.set_texture_center(parent, 0.5, 1.0);
        let tiles = reg.create_tiles(parent, 2, 2, 0, TileOptions::default());
        let info = reg.query_texture(tiles[3]).unwrap();
        assert_eq!((info.center_x, info.center_y), (0.5, 1.0));
    }

    // ── async loading ───────────────────────────────────────────────────────

    struct ManualLoader {
        tickets: Vec<LoadTicket>,
    }

    impl ResourceLoader for ManualLoader {
        fn request(&mut self, _path: &str, ticket: LoadTicket) {
            self.tickets.push(ticket);
        }
    }

    #[test]
    fn load_starts_as_placeholder_then_becomes_ready() {
        let (mut backend, mut reg) = setup();
        let mut loader = ManualLoader { tickets: Vec::new() };
        let h = reg.load_texture(&mut backend, &mut loader, "a.png", TextureOptions::default(), None);

        let info = reg.query_texture(h).unwrap();
        assert!(!info.ready);
        assert_eq!((info.width, info.height), (1.0, 1.0));

        loader.tickets.pop().unwrap().complete(Ok(PixelImage {
            width: 8,
            height: 4,
            pixels: rgba(8, 4),
        }));
        reg.poll_loads(&mut backend);

        let info = reg.query_texture(h).unwrap();
        assert!(info.ready);
        assert_eq!((info.width, info.height), (8.0, 4.0));
        assert_eq!(backend.textures.get(&reg.backend_of(h)), Some(&(8, 4)));
    }

    #[test]
    fn failed_load_stays_placeholder() {
        let (mut backend, mut reg) = setup();
        let mut loader = ManualLoader { tickets: Vec::new() };
        let h = reg.load_texture(&mut backend, &mut loader, "a.png", TextureOptions::default(), None);
        loader.tickets.pop().unwrap().complete(Err(anyhow::anyhow!("decode failed")));
        reg.poll_loads(&mut backend);
        let info = reg.query_texture(h).unwrap();
        assert!(!info.ready);
        assert_eq!((info.width, info.height), (1.0, 1.0));
    }

    #[test]
    fn pending_tile_and_center_resolve_on_ready() {
        let (mut backend, mut reg) = setup();
        let mut loader = ManualLoader { tickets: Vec::new() };
        let parent =
            reg.load_texture(&mut backend, &mut loader, "a.png", TextureOptions::default(), None);
        let tile = reg.create_tile(parent, 0.25, 0.25, 0.5, 0.5, TileOptions::default());
        reg.set_texture_center(tile, 0.5, 1.0);
        assert!(!reg.query_texture(tile).unwrap().ready);

        loader.tickets.pop().unwrap().complete(Ok(PixelImage {
            width: 40,
            height: 40,
            pixels: rgba(40, 40),
        }));
        reg.poll_loads(&mut backend);

        let info = reg.query_texture(tile).unwrap();
        assert!(info.ready);
        assert_eq!((info.width, info.height), (20.0, 20.0));
        assert_eq!((info.center_x, info.center_y), (0.5, 1.0));
        let rec = reg.record(tile).unwrap();
        assert_eq!((rec.x, rec.y), (10.0, 10.0));
    }

    #[test]
    fn deferred_tile_keeps_its_pivot_options() {
        let (mut backend, mut reg) = setup();
        let mut loader = ManualLoader { tickets: Vec::new() };
        let parent =
            reg.load_texture(&mut backend, &mut loader, "a.png", TextureOptions::default(), None);
        let tile = reg.create_tile(
            parent,
            0.0,
            0.0,
            1.0,
            1.0,
            TileOptions { center_x: Some(0.25), center_y: Some(0.75) },
        );
        loader.tickets.pop().unwrap().complete(Ok(PixelImage {
            width: 8,
            height: 8,
            pixels: rgba(8, 8),
        }));
        reg.poll_loads(&mut backend);
        let info = reg.query_texture(tile).unwrap();
        assert_eq!((info.center_x, info.center_y), (0.25, 0.75));
    }

    #[test]
    fn ready_callback_fires_once() {
        let (mut backend, mut reg) = setup();
        let mut loader = ManualLoader { tickets: Vec::new() };
        let fired = std::rc::Rc::new(std::cell::Cell::new(0));
        let fired2 = fired.clone();
        let h = reg.load_texture(
            &mut backend,
            &mut loader,
            "a.png",
            TextureOptions::default(),
            Some(Box::new(move |_| fired2.set(fired2.get() + 1))),
        );
        reg.poll_loads(&mut backend);
        assert_eq!(fired.get(), 0);
        loader.tickets.pop().unwrap().complete(Ok(PixelImage {
            width: 2,
            height: 2,
            pixels: rgba(2, 2),
        }));
        reg.poll_loads(&mut backend);
        reg.poll_loads(&mut backend);
        assert_eq!(fired.get(), 1);
        assert!(reg.query_texture(h).unwrap().ready);
    }

    // ── release ─────────────────────────────────────────────────────────────

    #[test]
    fn release_frees_backend_and_hides_handle() {
        let (mut backend, mut reg) = setup();
        let h = reg.create_texture(&mut backend, 2, 2, &rgba(2, 2), TextureOptions::default());
        let id = reg.backend_of(h);
        let freed = reg.release_texture(&mut backend, h);
        assert_eq!(freed, Some(id));
        assert!(reg.query_texture(h).is_none());
        assert!(!backend.textures.contains_key(&id));
        // Double release is a no-op.
        assert_eq!(reg.release_texture(&mut backend, h), None);
    }

    #[test]
    fn release_tile_keeps_ancestor_texture() {
        let (mut backend, mut reg) = setup();
        let parent =
            reg.create_texture(&mut backend, 8, 8, &rgba(8, 8), TextureOptions::default());
        let tile = reg.create_tile(parent, 0.0, 0.0, 0.5, 0.5, TileOptions::default());
        assert_eq!(reg.release_texture(&mut backend, tile), None);
        assert!(reg.query_texture(parent).is_some());
        assert!(backend.textures.contains_key(&reg.backend_of(parent)));
    }

    #[test]
    fn builtins_cannot_be_released() {
        let (mut backend, mut reg) = setup();
        assert_eq!(reg.release_texture(&mut backend, TextureHandle(0)), None);
        assert_eq!(reg.release_texture(&mut backend, TextureHandle(1)), None);
        assert!(reg.query_texture(TextureHandle(1)).is_some());
    }

    // ── image fonts ─────────────────────────────────────────────────────────

    #[test]
    fn image_font_over_ready_texture() {
        let (mut backend, mut reg) = setup();
        let tex =
            reg.create_texture(&mut backend, 160, 160, &rgba(160, 160), TextureOptions::default());
        let font = reg.create_image_font(tex, 1);
        assert_ne!(font, FontHandle::INVALID);
        let m = reg.measure_text(font, "ab");
        assert_eq!(m.width, 16.0); // two 8px cells
    }

    #[test]
    fn image_font_defers_until_texture_ready() {
        let (mut backend, mut reg) = setup();
        let mut loader = ManualLoader { tickets: Vec::new() };
        let tex =
            reg.load_texture(&mut backend, &mut loader, "f.png", TextureOptions::default(), None);
        let font = reg.create_image_font(tex, 0);
        assert_eq!(reg.measure_text(font, "ab"), TextMetrics::default());

        loader.tickets.pop().unwrap().complete(Ok(PixelImage {
            width: 160,
            height: 160,
            pixels: rgba(160, 160),
        }));
        reg.poll_loads(&mut backend);
        assert_eq!(reg.measure_text(font, "ab").width, 20.0);
    }
}
