//! The batched immediate-mode renderer.
//!
//! Drawing calls transform their geometry through the active graphics state
//! and append finished vertices to the batch. The batch is submitted to the
//! backend ("flushed") when the bound texture changes, the batch reaches
//! capacity, or a submission-level state change (line width, blend, clip)
//! arrives. Transform and color changes never flush; they are baked into
//! vertices at call time.
//!
//! Drawing is only legal between `frame_begin` and `frame_end`; calls
//! outside a frame are dropped with a one-time warning.

use core::ops::BitOr;

use crate::backend::{BackendTextureId, ClipRect, RenderBackend, Submission};
use crate::batch::{BatchBuffer, DEFAULT_CAPACITY};
use crate::coords::Vec2;
use crate::pack::{pack_color, pack_uv, unpack_color, Vertex, UV_MAX};
use crate::registry::{
    FileLoader, FontHandle, ReadyCallback, Registry, ResourceLoader, TextMetrics, TextureHandle,
    TextureInfo, TextureKind, TextureOptions, TileOptions,
};
use crate::state::{BlendMode, StateStack};

/// Text alignment flags, combinable with `|`.
///
/// Horizontal: [`Align::LEFT`] (default), [`Align::CENTER`], [`Align::RIGHT`].
/// Vertical: [`Align::TOP`] (default), [`Align::MIDDLE`], [`Align::BOTTOM`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Align(u8);

impl Align {
    pub const LEFT: Align = Align(0);
    pub const CENTER: Align = Align(1);
    pub const RIGHT: Align = Align(2);
    pub const TOP: Align = Align(0);
    pub const MIDDLE: Align = Align(4);
    pub const BOTTOM: Align = Align(8);

    #[inline]
    pub const fn contains(self, flag: Align) -> bool {
        self.0 & flag.0 != 0
    }
}

impl BitOr for Align {
    type Output = Align;
    #[inline]
    fn bitor(self, rhs: Align) -> Align {
        Align(self.0 | rhs.0)
    }
}

/// Image mirroring flags, combinable with `|`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Flip(u8);

impl Flip {
    pub const NONE: Flip = Flip(0);
    pub const X: Flip = Flip(1);
    pub const Y: Flip = Flip(2);

    #[inline]
    pub const fn contains(self, flag: Flip) -> bool {
        self.0 & flag.0 != 0
    }
}

impl BitOr for Flip {
    type Output = Flip;
    #[inline]
    fn bitor(self, rhs: Flip) -> Flip {
        Flip(self.0 | rhs.0)
    }
}

/// Per-instance component layout for [`Renderer::draw_images`], combinable
/// with `|`.
///
/// Every instance carries x and y; the flags name the extra components in
/// the order they appear: image offset, rotation, scale, then color
/// channels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct InstanceComps(u8);

impl InstanceComps {
    pub const IMG_OFFSET: InstanceComps = InstanceComps(1);
    pub const ROT: InstanceComps = InstanceComps(2);
    pub const SCALE: InstanceComps = InstanceComps(4);
    pub const COLOR_R: InstanceComps = InstanceComps(8);
    pub const COLOR_G: InstanceComps = InstanceComps(16);
    pub const COLOR_B: InstanceComps = InstanceComps(32);
    pub const COLOR_A: InstanceComps = InstanceComps(64);
    pub const COLOR_RGBA: InstanceComps = InstanceComps(8 | 16 | 32 | 64);

    #[inline]
    pub const fn contains(self, flag: InstanceComps) -> bool {
        self.0 & flag.0 != 0
    }
}

impl BitOr for InstanceComps {
    type Output = InstanceComps;
    #[inline]
    fn bitor(self, rhs: InstanceComps) -> InstanceComps {
        InstanceComps(self.0 | rhs.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Building,
}

/// Owns the backend, the resource registry and all per-frame drawing state.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    loader: Box<dyn ResourceLoader>,
    registry: Registry,
    batch: BatchBuffer,
    stack: StateStack,
    /// Backend texture the pending vertices sample from.
    bound: BackendTextureId,
    white: BackendTextureId,
    circle: BackendTextureId,
    resolution: [f32; 2],
    phase: Phase,
    clip: Option<ClipRect>,
    warned_idle_draw: bool,
}

impl<B: RenderBackend> Renderer<B> {
    /// Creates a renderer that loads texture files from the local
    /// filesystem.
    pub fn new(backend: B) -> Self {
        Self::with_loader(backend, Box::new(FileLoader))
    }

    pub fn with_loader(backend: B, loader: Box<dyn ResourceLoader>) -> Self {
        Self::with_capacity(backend, loader, DEFAULT_CAPACITY)
    }

    /// `capacity` is the batch size in primitives.
    pub fn with_capacity(mut backend: B, loader: Box<dyn ResourceLoader>, capacity: usize) -> Self {
        let registry = Registry::new(&mut backend);
        let white = registry.backend_of(TextureHandle::WHITE);
        let circle = registry.backend_of(TextureHandle::CIRCLE);
        backend.set_blend(BlendMode::Alpha);
        Self {
            backend,
            loader,
            registry,
            batch: BatchBuffer::new(capacity),
            stack: StateStack::new(),
            bound: white,
            white,
            circle,
            resolution: [0.0, 0.0],
            phase: Phase::Idle,
            clip: None,
            warned_idle_draw: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // ── frame protocol ──────────────────────────────────────────────────────

    /// Opens a frame: pumps async load completions, sets the logical
    /// resolution and clears the target to `clear` (RGB, opaque).
    pub fn frame_begin(&mut self, width: u32, height: u32, clear: [u8; 3]) {
        self.registry.poll_loads(&mut self.backend);
        self.resolution = [width as f32, height as f32];
        self.phase = Phase::Building;
        self.backend.clear([
            clear[0] as f32 / 255.0,
            clear[1] as f32 / 255.0,
            clear[2] as f32 / 255.0,
            1.0,
        ]);
    }

    /// Closes the frame: flushes pending vertices and resets all graphics
    /// state so nothing leaks into the next frame.
    pub fn frame_end(&mut self) {
        self.reset();
        if self.clip.is_some() {
            self.clip = None;
            self.backend.set_clip(None);
        }
        self.phase = Phase::Idle;
    }

    /// Submits pending vertices to the backend.
    pub fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        self.backend.submit(Submission {
            vertices: self.batch.vertices(),
            texture: self.bound,
            resolution: self.resolution,
        });
        self.batch.reset();
    }

    // ── graphics state ──────────────────────────────────────────────────────

    pub fn set_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.stack.top_mut().color = pack_color(r, g, b, a);
    }

    /// Float variant; channels are clamped to `0.0..=1.0`.
    pub fn set_colorf(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.set_color(q(r), q(g), q(b), q(a));
    }

    pub fn color(&self) -> u32 {
        self.stack.top().color
    }

    pub fn set_line_width(&mut self, width: f32) {
        if self.stack.top().line_width != width {
            self.flush();
            self.stack.top_mut().line_width = width;
        }
    }

    pub fn line_width(&self) -> f32 {
        self.stack.top().line_width
    }

    pub fn set_blend(&mut self, mode: BlendMode) {
        if self.stack.top().blend != mode {
            self.flush();
            self.stack.top_mut().blend = mode;
            self.backend.set_blend(mode);
        }
    }

    pub fn blend(&self) -> BlendMode {
        self.stack.top().blend
    }

    /// Pushes a copy of the active state. Silent no-op at the depth limit.
    pub fn save(&mut self) {
        self.stack.save();
    }

    /// Pops back to the previously saved state. Flushes only if the popped
    /// state differed in a submission-level value (line width, blend).
    pub fn restore(&mut self) {
        let Some(popped) = self.stack.restore() else {
            return;
        };
        let top = *self.stack.top();
        if popped.line_width != top.line_width {
            self.flush();
        }
        if popped.blend != top.blend {
            self.flush();
            self.backend.set_blend(top.blend);
        }
    }

    /// Replaces the active transform absolutely.
    pub fn set_transform(&mut self, origin: Vec2, rotation: f32, scale: f32) {
        self.stack.set_transform(origin, rotation, scale);
    }

    /// Composes a relative transform; the translation delta is in the
    /// current local space.
    pub fn transform(&mut self, delta: Vec2, rotation: f32, scale: f32) {
        self.stack.transform(delta, rotation, scale);
    }

    /// Flushes and collapses the state stack to a single default state.
    pub fn reset(&mut self) {
        let old_blend = self.stack.top().blend;
        self.flush();
        self.stack.reset();
        if old_blend != BlendMode::Alpha {
            self.backend.set_blend(BlendMode::Alpha);
        }
    }

    /// Restricts drawing to a rectangle in logical pixels.
    pub fn clip_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.flush();
        self.clip = Some(ClipRect { x, y, w, h });
        self.backend.set_clip(self.clip);
    }

    pub fn clear_clip(&mut self) {
        if self.clip.is_some() {
            self.flush();
            self.clip = None;
            self.backend.set_clip(None);
        }
    }

    // ── resources (registry delegation) ─────────────────────────────────────

    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
        opts: TextureOptions,
    ) -> TextureHandle {
        self.registry.create_texture(&mut self.backend, width, height, pixels, opts)
    }

    pub fn load_texture(
        &mut self,
        path: &str,
        opts: TextureOptions,
        on_ready: Option<ReadyCallback>,
    ) -> TextureHandle {
        self.registry
            .load_texture(&mut self.backend, self.loader.as_mut(), path, opts, on_ready)
    }

    pub fn create_tile(
        &mut self,
        parent: TextureHandle,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        opts: TileOptions,
    ) -> TextureHandle {
        self.registry.create_tile(parent, x, y, w, h, opts)
    }

    pub fn create_tiles(
        &mut self,
        parent: TextureHandle,
        tiles_x: u32,
        tiles_y: u32,
        border: u32,
        opts: TileOptions,
    ) -> Vec<TextureHandle> {
        self.registry.create_tiles(parent, tiles_x, tiles_y, border, opts)
    }

    pub fn release_texture(&mut self, handle: TextureHandle) {
        // Pending vertices may sample the texture about to disappear.
        if self.registry.backend_of(handle) == self.bound {
            self.flush();
            self.bound = self.white;
        }
        self.registry.release_texture(&mut self.backend, handle);
    }

    pub fn query_texture(&self, handle: TextureHandle) -> Option<TextureInfo> {
        self.registry.query_texture(handle)
    }

    pub fn set_texture_center(&mut self, handle: TextureHandle, cx: f32, cy: f32) {
        self.registry.set_texture_center(handle, cx, cy);
    }

    pub fn create_font(&mut self, bytes: &[u8], px_height: f32) -> FontHandle {
        self.registry.create_font(&mut self.backend, bytes, px_height)
    }

    pub fn create_image_font(&mut self, texture: TextureHandle, border: u32) -> FontHandle {
        self.registry.create_image_font(texture, border)
    }

    pub fn measure_text(&self, font: FontHandle, text: &str) -> TextMetrics {
        self.registry.measure_text(font, text)
    }

    // ── primitives ──────────────────────────────────────────────────────────

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if !self.ensure_building() {
            return;
        }
        self.set_texture(self.white);
        self.quad(x, y, x + w, y + h);
        self.end_primitive();
    }

    /// Stroked line with the current line width, expanded into a quad along
    /// the segment normal. Zero-length segments are dropped.
    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        if !self.ensure_building() {
            return;
        }
        self.line_segment(x1, y1, x2, y2);
    }

    /// Stroked rectangle outline built from four lines, inset by half the
    /// line width so the stroke stays inside `w × h`.
    pub fn draw_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if !self.ensure_building() {
            return;
        }
        let lw = self.stroke_width();
        let lw2 = lw / 2.0;
        let x1 = x;
        let x2 = x + w;
        let y1 = y + lw2;
        let y2 = y1 + h - lw;
        self.line_segment(x1, y1, x2, y1);
        self.line_segment(x2 - lw2, y1 + lw2, x2 - lw2, y2 - lw2);
        self.line_segment(x2, y2, x1, y2);
        self.line_segment(x1 + lw2, y2 - lw2, x1 + lw2, y1 + lw2);
    }

    /// Square points up to width 2, circle sprites above that.
    pub fn draw_points(&mut self, points: &[Vec2]) {
        if !self.ensure_building() || points.is_empty() {
            return;
        }
        let lw = self.stroke_width();
        let lw2 = lw / 2.0;
        if lw <= 2.0 {
            self.set_texture(self.white);
            for p in points {
                self.quad(p.x - lw2, p.y - lw2, p.x + lw2, p.y + lw2);
                self.end_primitive();
            }
        } else {
            self.set_texture(self.circle);
            for p in points {
                self.sprite_quad(p.x - lw2, p.y - lw2, p.x + lw2, p.y + lw2);
                self.end_primitive();
            }
        }
    }

    /// Connected segments through `points`, with round joints on the
    /// interior vertices.
    pub fn draw_line_strip(&mut self, points: &[Vec2]) {
        if !self.ensure_building() || points.len() < 2 {
            return;
        }
        for pair in points.windows(2) {
            self.line_segment(pair[0].x, pair[0].y, pair[1].x, pair[1].y);
        }
        self.draw_points(&points[1..points.len() - 1]);
    }

    /// Like [`draw_line_strip`](Self::draw_line_strip) but closed, with
    /// joints on every vertex.
    pub fn draw_line_loop(&mut self, points: &[Vec2]) {
        if !self.ensure_building() || points.len() < 2 {
            return;
        }
        for pair in points.windows(2) {
            self.line_segment(pair[0].x, pair[0].y, pair[1].x, pair[1].y);
        }
        let first = points[0];
        let last = points[points.len() - 1];
        self.line_segment(last.x, last.y, first.x, first.y);
        self.draw_points(points);
    }

    pub fn fill_triangle(&mut self, a: Vec2, b: Vec2, c: Vec2) {
        if !self.ensure_building() {
            return;
        }
        self.set_texture(self.white);
        self.vertex(a.x, a.y, 1, 1);
        self.vertex(b.x, b.y, 1, 1);
        self.vertex(c.x, c.y, 1, 1);
        self.end_primitive();
    }

    /// Triangle list; a trailing partial triangle is completed by repeating
    /// its last vertex (zero area, draws nothing).
    pub fn fill_triangles(&mut self, coords: &[Vec2]) {
        if !self.ensure_building() || coords.is_empty() {
            return;
        }
        self.set_texture(self.white);
        let chunks = coords.chunks_exact(3);
        let rest = chunks.remainder();
        for tri in chunks {
            for p in tri {
                self.vertex(p.x, p.y, 1, 1);
            }
            self.end_primitive();
        }
        if !rest.is_empty() {
            for p in rest {
                self.vertex(p.x, p.y, 1, 1);
            }
            let last = rest[rest.len() - 1];
            for _ in rest.len()..3 {
                self.vertex(last.x, last.y, 1, 1);
            }
            self.end_primitive();
        }
    }

    /// Triangle list with one packed RGBA color per vertex; missing colors
    /// fall back to the current fill color. Partial triangles are padded as
    /// in [`fill_triangles`](Self::fill_triangles).
    pub fn fill_triangles_colored(&mut self, coords: &[Vec2], colors: &[u32]) {
        if !self.ensure_building() || coords.is_empty() {
            return;
        }
        self.set_texture(self.white);
        let fallback = self.stack.top().color;
        let at = |i: usize| colors.get(i).copied().unwrap_or(fallback);
        let chunks = coords.chunks_exact(3);
        let rest = chunks.remainder();
        for (i, tri) in chunks.enumerate() {
            for (j, p) in tri.iter().enumerate() {
                self.colored_vertex(p.x, p.y, at(i * 3 + j), 1, 1);
            }
            self.end_primitive();
        }
        if !rest.is_empty() {
            let base = coords.len() - rest.len();
            for (j, p) in rest.iter().enumerate() {
                self.colored_vertex(p.x, p.y, at(base + j), 1, 1);
            }
            let last = rest[rest.len() - 1];
            for _ in rest.len()..3 {
                self.colored_vertex(last.x, last.y, at(coords.len() - 1), 1, 1);
            }
            self.end_primitive();
        }
    }

    /// Draws a texture (or tile) with its pivot at `(x, y)`, rotated by
    /// `angle` radians and scaled by `scale` on top of the handle's own
    /// draw scale.
    ///
    /// Still-loading root textures render their placeholder; unready tiles
    /// and released handles are no-ops.
    pub fn draw_image(
        &mut self,
        handle: TextureHandle,
        x: f32,
        y: f32,
        angle: f32,
        scale: f32,
        flip: Flip,
    ) {
        if !self.ensure_building() {
            return;
        }
        let Some(img) = self.drawable(handle) else {
            return;
        };
        let w = img.w * img.draw_scale * scale;
        let h = img.h * img.draw_scale * scale;
        self.image_quad(img, x, y, w, h, angle, flip);
    }

    /// Draws a texture stretched to `w × h` with its top-left at `(x, y)`.
    pub fn stretch_image(&mut self, handle: TextureHandle, x: f32, y: f32, w: f32, h: f32) {
        if !self.ensure_building() {
            return;
        }
        let Some(mut img) = self.drawable(handle) else {
            return;
        };
        img.cx = 0.0;
        img.cy = 0.0;
        self.image_quad(img, x, y, w, h, 0.0, Flip::NONE);
    }

    /// Draws a `tiles_x × tiles_y` grid of images whose cells step by the
    /// base texture's size. `offsets` picks the handle `base + offset` per
    /// cell, `colors` sets the fill color per cell (packed RGBA, sticky like
    /// [`set_color`](Self::set_color)), and `stride` is the row pitch into
    /// both arrays (usually `tiles_x`).
    pub fn draw_tiles(
        &mut self,
        base: TextureHandle,
        tiles_x: u32,
        tiles_y: u32,
        offsets: Option<&[u32]>,
        colors: Option<&[u32]>,
        stride: usize,
    ) {
        if !self.ensure_building() {
            return;
        }
        let Some(rec) = self.registry.record(base) else {
            log::debug!("draw_tiles with unknown base handle {}", base.0);
            return;
        };
        let (w, h) = (rec.w, rec.h);
        for row in 0..tiles_y {
            for col in 0..tiles_x {
                let index = row as usize * stride + col as usize;
                if let Some(&color) = colors.and_then(|c| c.get(index)) {
                    self.stack.top_mut().color = color;
                }
                let img = match offsets {
                    Some(offs) => match offs.get(index) {
                        Some(&off) => TextureHandle(base.0 + off),
                        None => continue,
                    },
                    None => base,
                };
                self.draw_image(img, col as f32 * w, row as f32 * h, 0.0, 1.0, Flip::NONE);
            }
        }
    }

    /// Draws one image per `stride`-float instance in `data`. Each instance
    /// holds the components named by `comps` in declaration order; the color
    /// channels (0..=255) are sticky across instances and start from the
    /// current fill color. Instances with alpha ≤ 0 or an invalid handle are
    /// skipped.
    pub fn draw_images(
        &mut self,
        base: TextureHandle,
        stride: usize,
        comps: InstanceComps,
        data: &[f32],
    ) {
        if !self.ensure_building() {
            return;
        }
        let mut required = 2;
        for flag in [
            InstanceComps::IMG_OFFSET,
            InstanceComps::ROT,
            InstanceComps::SCALE,
            InstanceComps::COLOR_R,
            InstanceComps::COLOR_G,
            InstanceComps::COLOR_B,
            InstanceComps::COLOR_A,
        ] {
            if comps.contains(flag) {
                required += 1;
            }
        }
        if stride < required {
            log::error!("draw_images: stride {stride} smaller than the {required} components");
            return;
        }

        let has_colors = comps.contains(InstanceComps::COLOR_RGBA);
        let (r0, g0, b0, a0) = unpack_color(self.stack.top().color);
        let (mut cr, mut cg, mut cb, mut ca) = (r0 as f32, g0 as f32, b0 as f32, a0 as f32);
        for inst in data.chunks_exact(stride) {
            let mut fields = inst.iter().copied();
            let img = if comps.contains(InstanceComps::IMG_OFFSET) {
                let id = base.0 as i64 + fields.next().unwrap_or(0.0) as i64;
                if id <= 0 {
                    continue;
                }
                TextureHandle(id as u32)
            } else {
                base
            };
            let x = fields.next().unwrap_or(0.0);
            let y = fields.next().unwrap_or(0.0);
            let rot =
                if comps.contains(InstanceComps::ROT) { fields.next().unwrap_or(0.0) } else { 0.0 };
            let scale = if comps.contains(InstanceComps::SCALE) {
                fields.next().unwrap_or(1.0)
            } else {
                1.0
            };
            if has_colors {
                if comps.contains(InstanceComps::COLOR_R) {
                    cr = fields.next().unwrap_or(cr);
                }
                if comps.contains(InstanceComps::COLOR_G) {
                    cg = fields.next().unwrap_or(cg);
                }
                if comps.contains(InstanceComps::COLOR_B) {
                    cb = fields.next().unwrap_or(cb);
                }
                if comps.contains(InstanceComps::COLOR_A) {
                    ca = fields.next().unwrap_or(ca);
                }
                if ca <= 0.0 {
                    continue;
                }
                let q = |c: f32| c.clamp(0.0, 255.0) as u8;
                self.stack.top_mut().color = pack_color(q(cr), q(cg), q(cb), q(ca));
            }
            self.draw_image(img, x, y, rot, scale, Flip::NONE);
        }
    }

    /// Draws `text` with its anchor at `(x, y)` per `align`. Character
    /// codes outside 32..=255 are skipped without advancing; spaces advance
    /// without emitting a quad. Unknown or unready fonts are dropped with a
    /// warning.
    pub fn fill_text(&mut self, x: f32, y: f32, text: &str, font: FontHandle, align: Align) {
        if !self.ensure_building() {
            return;
        }
        let Some(f) = self.registry.font(font) else {
            log::warn!("fill_text: font {} is unknown or not ready", font.0);
            return;
        };
        let atlas = f.backend;

        let mut x = x;
        let mut y = y;
        if align != Align::default() {
            let m = self.registry.measure_text(font, text);
            if align.contains(Align::CENTER) {
                x -= m.width / 2.0;
            } else if align.contains(Align::RIGHT) {
                x -= m.width;
            }
            if align.contains(Align::MIDDLE) {
                y -= m.height / 2.0;
            } else if align.contains(Align::BOTTOM) {
                y -= m.height;
            }
        }

        self.set_texture(atlas);
        let mut pen = x;
        for ch in text.chars() {
            let code = ch as u32;
            let Some(g) = self.registry.font(font).and_then(|f| f.glyph(code)).copied() else {
                continue;
            };
            if code != 32 {
                let gx = pen + g.xoff;
                let gy = y + g.yoff;
                let [u0, v0, u1, v1] = g.uv;
                self.vertex(gx, gy, u0, v0);
                self.vertex(gx + g.w, gy, u1, v0);
                self.vertex(gx, gy + g.h, u0, v1);
                self.vertex(gx, gy + g.h, u0, v1);
                self.vertex(gx + g.w, gy, u1, v0);
                self.vertex(gx + g.w, gy + g.h, u1, v1);
                self.end_primitive();
            }
            pen += g.advance;
        }
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn ensure_building(&mut self) -> bool {
        if self.phase == Phase::Building {
            return true;
        }
        if !self.warned_idle_draw {
            log::warn!("draw call outside frame_begin/frame_end, ignoring");
            self.warned_idle_draw = true;
        }
        false
    }

    /// Binds a backend texture for subsequent vertices, flushing what was
    /// batched against the previous one.
    fn set_texture(&mut self, id: BackendTextureId) {
        if self.bound != id {
            self.flush();
            self.bound = id;
        }
    }

    fn end_primitive(&mut self) {
        if self.batch.end_primitive() {
            self.flush();
        }
    }

    /// Transforms and appends one vertex with the current fill color.
    #[inline]
    fn vertex(&mut self, x: f32, y: f32, u: i32, v: i32) {
        let color = self.stack.top().color;
        self.colored_vertex(x, y, color, u, v);
    }

    #[inline]
    fn colored_vertex(&mut self, x: f32, y: f32, color: u32, u: i32, v: i32) {
        let p = self.stack.matrix().apply(Vec2::new(x, y));
        self.batch.push(Vertex { pos: [p.x, p.y], color, uv: pack_uv(u, v) });
    }

    /// Untextured axis-aligned quad between two corners, as two triangles.
    fn quad(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.vertex(x1, y1, 1, 1);
        self.vertex(x2, y1, 1, 1);
        self.vertex(x1, y2, 1, 1);
        self.vertex(x1, y2, 1, 1);
        self.vertex(x2, y1, 1, 1);
        self.vertex(x2, y2, 1, 1);
    }

    /// Quad sampling the full bound texture.
    fn sprite_quad(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.vertex(x1, y1, 0, 0);
        self.vertex(x2, y1, UV_MAX, 0);
        self.vertex(x1, y2, 0, UV_MAX);
        self.vertex(x1, y2, 0, UV_MAX);
        self.vertex(x2, y1, UV_MAX, 0);
        self.vertex(x2, y2, UV_MAX, UV_MAX);
    }

    fn stroke_width(&self) -> f32 {
        let lw = self.stack.top().line_width;
        if lw <= 0.0 { 1.0 } else { lw }
    }

    fn line_segment(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let dir = Vec2::new(x2 - x1, y2 - y1);
        let d = dir.length();
        if d == 0.0 {
            return;
        }
        let n = dir.perp() * (self.stroke_width() / 2.0 / d);
        self.set_texture(self.white);
        self.vertex(x1 - n.x, y1 - n.y, 1, 1);
        self.vertex(x2 - n.x, y2 - n.y, 1, 1);
        self.vertex(x1 + n.x, y1 + n.y, 1, 1);
        self.vertex(x1 + n.x, y1 + n.y, 1, 1);
        self.vertex(x2 - n.x, y2 - n.y, 1, 1);
        self.vertex(x2 + n.x, y2 + n.y, 1, 1);
        self.end_primitive();
    }

    /// Everything needed to emit an image quad, copied out of the registry.
    fn drawable(&self, handle: TextureHandle) -> Option<DrawableImage> {
        let rec = self.registry.record(handle)?;
        if rec.released {
            log::debug!("draw with released texture handle {}", handle.0);
            return None;
        }
        if !rec.ready && matches!(rec.kind, TextureKind::Tile { .. }) {
            return None;
        }
        Some(DrawableImage {
            backend: self.registry.backend_of(handle),
            uv: crate::registry::uv_rect(rec.x, rec.y, rec.w, rec.h, rec.surface_w, rec.surface_h),
            w: rec.w,
            h: rec.h,
            cx: rec.cx,
            cy: rec.cy,
            draw_scale: rec.draw_scale,
        })
    }

    /// Rotated, pivoted, possibly flipped textured quad.
    fn image_quad(
        &mut self,
        img: DrawableImage,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        angle: f32,
        flip: Flip,
    ) {
        let [mut u0, mut v0, mut u1, mut v1] = img.uv;
        if flip.contains(Flip::X) {
            core::mem::swap(&mut u0, &mut u1);
        }
        if flip.contains(Flip::Y) {
            core::mem::swap(&mut v0, &mut v1);
        }

        let xmin = -img.cx * w;
        let ymin = -img.cy * h;
        let xmax = xmin + w;
        let ymax = ymin + h;
        let (sin, cos) = angle.sin_cos();
        let rot = |px: f32, py: f32| (x + px * cos - py * sin, y + px * sin + py * cos);

        self.set_texture(img.backend);
        let (ax, ay) = rot(xmin, ymin);
        let (bx, by) = rot(xmax, ymin);
        let (cx, cy) = rot(xmin, ymax);
        let (dx, dy) = rot(xmax, ymax);
        self.vertex(ax, ay, u0, v0);
        self.vertex(bx, by, u1, v0);
        self.vertex(cx, cy, u0, v1);
        self.vertex(cx, cy, u0, v1);
        self.vertex(bx, by, u1, v0);
        self.vertex(dx, dy, u1, v1);
        self.end_primitive();
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }
}

#[derive(Debug, Copy, Clone)]
struct DrawableImage {
    backend: BackendTextureId,
    uv: [i32; 4],
    w: f32,
    h: f32,
    cx: f32,
    cy: f32,
    draw_scale: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::pack::unpack_color;
    use crate::registry::{FontRecord, Glyph, LoadTicket, NullLoader, PixelImage, GLYPH_COUNT, GLYPH_MIN};

    fn renderer() -> Renderer<RecordingBackend> {
        Renderer::with_loader(RecordingBackend::new(), Box::new(NullLoader))
    }

    fn positions(sub: &crate::backend::RecordedSubmission) -> Vec<(f32, f32)> {
        sub.vertices.iter().map(|v| (v.pos[0], v.pos[1])).collect()
    }

    struct ManualLoader {
        tickets: std::rc::Rc<std::cell::RefCell<Vec<LoadTicket>>>,
    }

    impl ResourceLoader for ManualLoader {
        fn request(&mut self, _path: &str, ticket: LoadTicket) {
            self.tickets.borrow_mut().push(ticket);
        }
    }

    fn mono_font(advance: f32, h: f32) -> FontRecord {
        let mut glyphs = vec![Glyph::default(); GLYPH_COUNT];
        for g in glyphs.iter_mut() {
            g.advance = advance;
            g.w = advance;
            g.h = h;
            g.uv = [0, 0, 100, 100];
        }
        let vbar = &mut glyphs[(b'|' as u32 - GLYPH_MIN) as usize];
        vbar.yoff = 0.0;
        vbar.h = h;
        FontRecord { backend: 7, glyphs, height: h, ready: true }
    }

    // ── frame protocol ──────────────────────────────────────────────────────

    #[test]
    fn draw_outside_frame_is_dropped() {
        let mut r = renderer();
        r.fill_rect(0.0, 0.0, 10.0, 10.0);
        r.flush();
        assert!(r.backend().submissions.is_empty());
    }

    #[test]
    fn frame_end_resets_state() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.save();
        r.set_color(255, 0, 0, 255);
        r.set_blend(BlendMode::Add);
        r.set_line_width(5.0);
        r.clip_rect(0, 0, 10, 10);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.frame_end();

        assert_eq!(r.color(), pack_color(255, 255, 255, 255));
        assert_eq!(r.blend(), BlendMode::Alpha);
        assert_eq!(r.line_width(), 1.0);
        assert_eq!(r.backend().blend, BlendMode::Alpha);
        assert_eq!(r.backend().clip, None);
        // The pending rect was flushed on the way out.
        assert_eq!(r.backend().vertex_count(), 6);
    }

    #[test]
    fn frame_begin_clears() {
        let mut r = renderer();
        r.frame_begin(100, 100, [255, 0, 0]);
        assert_eq!(r.backend().clears, vec![[1.0, 0.0, 0.0, 1.0]]);
    }

    // ── flush policy ────────────────────────────────────────────────────────

    #[test]
    fn color_and_transform_changes_do_not_flush() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.set_color(255, 0, 0, 255);
        r.transform(Vec2::new(10.0, 0.0), 0.5, 2.0);
        r.save();
        r.restore();
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.frame_end();
        assert_eq!(r.backend().submissions.len(), 1);
        assert_eq!(r.backend().vertex_count(), 12);
    }

    #[test]
    fn line_width_change_flushes() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.set_line_width(4.0);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.frame_end();
        assert_eq!(r.backend().submissions.len(), 2);
    }

    #[test]
    fn blend_change_flushes_and_reaches_backend() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.set_blend(BlendMode::Add);
        assert_eq!(r.backend().submissions.len(), 1);
        assert_eq!(r.backend().blend, BlendMode::Add);
        r.frame_end();
    }

    #[test]
    fn restore_reapplies_blend() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.save();
        r.set_blend(BlendMode::Add);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.restore();
        assert_eq!(r.blend(), BlendMode::Alpha);
        assert_eq!(r.backend().blend, BlendMode::Alpha);
        // The Add-blended rect went out before the mode switched back.
        assert_eq!(r.backend().submissions.len(), 1);
        r.frame_end();
    }

    #[test]
    fn batch_capacity_forces_flush() {
        let mut r = Renderer::with_capacity(RecordingBackend::new(), Box::new(NullLoader), 2);
        r.frame_begin(100, 100, [0, 0, 0]);
        for _ in 0..3 {
            r.fill_rect(0.0, 0.0, 1.0, 1.0);
        }
        assert_eq!(r.backend().submissions.len(), 1);
        assert_eq!(r.backend().submissions[0].vertices.len(), 12);
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 18);
    }

    #[test]
    fn texture_switch_flushes() {
        let mut r = renderer();
        let tex = r.create_texture(2, 2, &[0u8; 16], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.draw_image(tex, 0.0, 0.0, 0.0, 1.0, Flip::NONE);
        r.fill_rect(0.0, 0.0, 1.0, 1.0);
        r.frame_end();
        assert_eq!(r.backend().submissions.len(), 3);
        let white = r.backend().submissions[0].texture;
        assert_ne!(r.backend().submissions[1].texture, white);
        assert_eq!(r.backend().submissions[2].texture, white);
    }

    // ── shapes ──────────────────────────────────────────────────────────────

    #[test]
    fn fill_rect_emits_colored_quad() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.set_color(255, 0, 0, 255);
        r.fill_rect(10.0, 20.0, 30.0, 40.0);
        r.frame_end();

        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.len(), 6);
        assert_eq!(sub.resolution, [100.0, 100.0]);
        for v in &sub.vertices {
            assert_eq!(unpack_color(v.color), (255, 0, 0, 255));
        }
        let pos = positions(sub);
        for corner in [(10.0, 20.0), (40.0, 20.0), (10.0, 60.0), (40.0, 60.0)] {
            assert!(pos.contains(&corner), "missing corner {corner:?}");
        }
    }

    #[test]
    fn line_expands_by_half_width_along_normal() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.set_line_width(4.0);
        r.draw_line(0.0, 0.0, 10.0, 0.0);
        r.frame_end();

        let pos = positions(&r.backend().submissions[0]);
        for corner in [(0.0, -2.0), (10.0, -2.0), (0.0, 2.0), (10.0, 2.0)] {
            assert!(pos.contains(&corner), "missing corner {corner:?}");
        }
    }

    #[test]
    fn zero_length_line_emits_nothing() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_line(5.0, 5.0, 5.0, 5.0);
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 0);
    }

    #[test]
    fn fill_triangle_emits_exactly_three_vertices() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_triangle(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(0.0, 10.0));
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 3);
    }

    #[test]
    fn fill_triangles_pads_partial_remainder() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        let pts: Vec<Vec2> = (0..7).map(|i| Vec2::new(i as f32, 0.0)).collect();
        r.fill_triangles(&pts);
        r.frame_end();
        // Two full triangles plus the seventh point padded out to three.
        assert_eq!(r.backend().vertex_count(), 9);
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos[6..].iter().all(|&p| p == (6.0, 0.0)));
    }

    #[test]
    fn colored_triangles_pad_partial_remainder() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        let pts: Vec<Vec2> = (0..5).map(|i| Vec2::new(i as f32, 0.0)).collect();
        let colors: Vec<u32> = (0..5).map(|i| pack_color(i, 0, 0, 255)).collect();
        r.fill_triangles_colored(&pts, &colors);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.len(), 6);
        // Padding repeats the last remainder vertex and its color.
        assert_eq!(sub.vertices[4].pos, sub.vertices[5].pos);
        assert_eq!(sub.vertices[5].color, colors[4]);
    }

    #[test]
    fn colored_triangles_carry_per_vertex_colors() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        let pts = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
        let colors = [pack_color(255, 0, 0, 255), pack_color(0, 255, 0, 255), pack_color(0, 0, 255, 255)];
        r.fill_triangles_colored(&pts, &colors);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.iter().map(|v| v.color).collect::<Vec<_>>(), colors.to_vec());
    }

    #[test]
    fn thin_points_are_quads_thick_points_are_sprites() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        let pts = [Vec2::new(10.0, 10.0)];
        r.set_line_width(2.0);
        r.draw_points(&pts);
        r.set_line_width(6.0);
        r.draw_points(&pts);
        r.frame_end();

        // Width change and texture switch split the submissions.
        assert_eq!(r.backend().submissions.len(), 2);
        let thick = &r.backend().submissions[1];
        assert_ne!(thick.texture, r.backend().submissions[0].texture);
        let pos = positions(thick);
        assert!(pos.contains(&(7.0, 7.0)) && pos.contains(&(13.0, 13.0)));
    }

    #[test]
    fn line_strip_joints_interior_only() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        let pts = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)];
        r.draw_line_strip(&pts);
        r.frame_end();
        // 2 segments + 1 interior joint, 6 verts each.
        assert_eq!(r.backend().vertex_count(), 18);
    }

    #[test]
    fn line_loop_closes_and_joints_every_vertex() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        let pts = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)];
        r.draw_line_loop(&pts);
        r.frame_end();
        // 3 segments + 3 joints.
        assert_eq!(r.backend().vertex_count(), 36);
    }

    // ── transforms applied to vertices ──────────────────────────────────────

    #[test]
    fn transform_bakes_into_positions() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.set_transform(Vec2::new(50.0, 50.0), 0.0, 2.0);
        r.fill_rect(0.0, 0.0, 10.0, 10.0);
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos.contains(&(50.0, 50.0)) && pos.contains(&(70.0, 70.0)));
    }

    // ── images ──────────────────────────────────────────────────────────────

    #[test]
    fn draw_image_spans_texture_size() {
        let mut r = renderer();
        let tex = r.create_texture(8, 4, &[0u8; 8 * 4 * 4], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tex, 20.0, 30.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        let pos = positions(sub);
        assert!(pos.contains(&(20.0, 30.0)) && pos.contains(&(28.0, 34.0)));
        // Full-surface UV rect.
        let (u, v) = crate::pack::unpack_uv(sub.vertices[5].uv);
        assert_eq!((u, v), (UV_MAX, UV_MAX));
    }

    #[test]
    fn draw_image_honors_pivot() {
        let mut r = renderer();
        let tex = r.create_texture(10, 10, &[0u8; 400], TextureOptions::default());
        r.set_texture_center(tex, 0.5, 0.5);
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tex, 50.0, 50.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos.contains(&(45.0, 45.0)) && pos.contains(&(55.0, 55.0)));
    }

    #[test]
    fn flip_x_swaps_horizontal_uvs() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tex, 0.0, 0.0, 0.0, 1.0, Flip::X);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        // First vertex is the top-left corner; flipped it samples u = max.
        let (u, _) = crate::pack::unpack_uv(sub.vertices[0].uv);
        assert_eq!(u, UV_MAX);
    }

    #[test]
    fn stretch_image_ignores_pivot() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.set_texture_center(tex, 0.5, 0.5);
        r.frame_begin(100, 100, [0, 0, 0]);
        r.stretch_image(tex, 10.0, 10.0, 30.0, 20.0);
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos.contains(&(10.0, 10.0)) && pos.contains(&(40.0, 30.0)));
    }

    #[test]
    fn released_handle_draw_is_a_noop() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.release_texture(tex);
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tex, 0.0, 0.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 0);
    }

    #[test]
    fn unready_tile_draws_nothing_until_parent_loads() {
        let tickets = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let loader = ManualLoader { tickets: tickets.clone() };
        let mut r = Renderer::with_loader(RecordingBackend::new(), Box::new(loader));

        let parent = r.load_texture("sheet.png", TextureOptions::default(), None);
        let tile = r.create_tile(parent, 0.0, 0.0, 0.5, 0.5, TileOptions::default());

        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tile, 0.0, 0.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 0);

        tickets.borrow_mut().pop().unwrap().complete(Ok(PixelImage {
            width: 16,
            height: 16,
            pixels: vec![0u8; 16 * 16 * 4],
        }));

        // Completion is picked up at the next frame begin.
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tile, 0.0, 0.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.len(), 6);
        let pos = positions(sub);
        assert!(pos.contains(&(8.0, 8.0)), "tile should draw at its 8x8 size");
    }

    #[test]
    fn unready_root_draws_placeholder() {
        let tickets = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let loader = ManualLoader { tickets };
        let mut r = Renderer::with_loader(RecordingBackend::new(), Box::new(loader));
        let tex = r.load_texture("a.png", TextureOptions::default(), None);
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tex, 0.0, 0.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos.contains(&(1.0, 1.0)), "placeholder is 1x1");
    }

    #[test]
    fn drawn_tile_pivots_around_inherited_center() {
        let mut r = renderer();
        let parent = r.create_texture(10, 10, &[0u8; 400], TextureOptions::default());
        r.set_texture_center(parent, 0.5, 0.5);
        let tile = r.create_tile(parent, 0.0, 0.0, 1.0, 1.0, TileOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tile, 50.0, 50.0, 0.0, 1.0, Flip::NONE);
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos.contains(&(45.0, 45.0)) && pos.contains(&(55.0, 55.0)));
    }

    #[test]
    fn draw_tiles_steps_cells_by_the_base_size() {
        let mut r = renderer();
        let base = r.create_texture(8, 8, &[0u8; 256], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_tiles(base, 2, 2, None, None, 2);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.len(), 24);
        let pos = positions(sub);
        assert!(pos.contains(&(8.0, 8.0)) && pos.contains(&(16.0, 16.0)));
    }

    #[test]
    fn draw_tiles_applies_offsets_and_colors() {
        let mut r = renderer();
        let base = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        let tile = r.create_tile(base, 0.0, 0.0, 0.5, 0.5, TileOptions::default());
        assert_eq!(tile.0, base.0 + 1);
        r.frame_begin(100, 100, [0, 0, 0]);
        let offsets = [0u32, 1];
        let colors = [pack_color(255, 0, 0, 255), pack_color(0, 255, 0, 255)];
        r.draw_tiles(base, 2, 1, Some(&offsets[..]), Some(&colors[..]), 2);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.len(), 12);
        assert_eq!(sub.vertices[0].color, colors[0]);
        assert_eq!(sub.vertices[6].color, colors[1]);
        // The second cell draws the 2x2 tile at the base-sized cell origin.
        let pos = positions(sub);
        assert!(pos.contains(&(4.0, 0.0)) && pos.contains(&(6.0, 2.0)));
    }

    #[test]
    fn draw_images_reads_packed_instances() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        let data = [10.0, 20.0, 2.0, 30.0, 40.0, 1.0];
        r.draw_images(tex, 3, InstanceComps::SCALE, &data);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.vertices.len(), 12);
        let pos = positions(sub);
        // First instance is scaled by 2, the second is not.
        assert!(pos.contains(&(10.0, 20.0)) && pos.contains(&(18.0, 28.0)));
        assert!(pos.contains(&(30.0, 40.0)) && pos.contains(&(34.0, 44.0)));
    }

    #[test]
    fn draw_images_skips_transparent_and_invalid_instances() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        let comps = InstanceComps::IMG_OFFSET | InstanceComps::COLOR_A;
        let data = [
            0.0, 10.0, 10.0, 255.0, // drawn
            0.0, 20.0, 20.0, 0.0, // transparent
            99.0, 30.0, 30.0, 255.0, // no such handle
        ];
        r.draw_images(tex, 4, comps, &data);
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 6);
        let pos = positions(&r.backend().submissions[0]);
        assert!(pos.contains(&(10.0, 10.0)));
    }

    #[test]
    fn draw_images_colors_start_from_the_current_fill() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.set_color(0, 0, 200, 255);
        let comps = InstanceComps::COLOR_R;
        r.draw_images(tex, 3, comps, &[10.0, 10.0, 128.0]);
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(unpack_color(sub.vertices[0].color), (128, 0, 200, 255));
    }

    #[test]
    fn release_of_bound_texture_flushes_first() {
        let mut r = renderer();
        let tex = r.create_texture(4, 4, &[0u8; 64], TextureOptions::default());
        r.frame_begin(100, 100, [0, 0, 0]);
        r.draw_image(tex, 0.0, 0.0, 0.0, 1.0, Flip::NONE);
        r.release_texture(tex);
        assert_eq!(r.backend().submissions.len(), 1);
        r.frame_end();
    }

    // ── text ────────────────────────────────────────────────────────────────

    #[test]
    fn text_of_spaces_advances_without_vertices() {
        let mut r = renderer();
        let font = r.registry_mut().inject_font(mono_font(8.0, 12.0));
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_text(0.0, 0.0, "   ", font, Align::default());
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 0);
        assert_eq!(r.measure_text(font, "   ").width, 24.0);
    }

    #[test]
    fn text_emits_one_quad_per_visible_glyph() {
        let mut r = renderer();
        let font = r.registry_mut().inject_font(mono_font(8.0, 12.0));
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_text(0.0, 0.0, "ab c", font, Align::default());
        r.frame_end();
        let sub = &r.backend().submissions[0];
        assert_eq!(sub.texture, 7);
        assert_eq!(sub.vertices.len(), 18);
        // 'c' starts after three 8px advances.
        let pos = positions(sub);
        assert!(pos.contains(&(24.0, 0.0)));
    }

    #[test]
    fn control_characters_are_skipped_without_advance() {
        let mut r = renderer();
        let font = r.registry_mut().inject_font(mono_font(8.0, 12.0));
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_text(0.0, 0.0, "a\n\u{20AC}b", font, Align::default());
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        // 'b' follows 'a' directly.
        assert!(pos.contains(&(8.0, 0.0)));
        assert_eq!(r.backend().vertex_count(), 12);
    }

    #[test]
    fn alignment_offsets_the_anchor() {
        let mut r = renderer();
        let font = r.registry_mut().inject_font(mono_font(8.0, 12.0));
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_text(50.0, 50.0, "ab", font, Align::CENTER | Align::BOTTOM);
        r.frame_end();
        let pos = positions(&r.backend().submissions[0]);
        // Width 16, height 12: anchor shifts to (42, 38).
        assert!(pos.contains(&(42.0, 38.0)));
    }

    #[test]
    fn unknown_font_is_a_noop() {
        let mut r = renderer();
        r.frame_begin(100, 100, [0, 0, 0]);
        r.fill_text(0.0, 0.0, "hi", FontHandle::INVALID, Align::default());
        r.fill_text(0.0, 0.0, "hi", FontHandle(42), Align::default());
        r.frame_end();
        assert_eq!(r.backend().vertex_count(), 0);
    }
}
