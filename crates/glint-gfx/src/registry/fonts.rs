//! Font records: fontdue-baked glyph atlases and image-grid fonts.
//!
//! Both kinds resolve to the same [`FontRecord`] shape so text drawing and
//! measurement have a single code path. Glyph slots cover character codes
//! 32..=255; anything outside that range is not drawable.

use anyhow::Context;

use crate::backend::BackendTextureId;
use crate::pack::UV_MAX;
use crate::registry::loader::PixelImage;

/// First drawable character code.
pub const GLYPH_MIN: u32 = 32;
/// Number of glyph slots (codes 32..=255).
pub const GLYPH_COUNT: usize = 224;

/// Public font handle. Handle 0 is reserved as invalid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FontHandle(pub u32);

impl FontHandle {
    /// Returned by failed font creation; drawing with it is a no-op.
    pub const INVALID: FontHandle = FontHandle(0);
}

/// Placement and sampling data for one glyph.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct Glyph {
    /// Pen-relative offset of the bitmap's top-left corner.
    pub xoff: f32,
    pub yoff: f32,
    /// Bitmap size in pixels.
    pub w: f32,
    pub h: f32,
    /// Pen advance after this glyph.
    pub advance: f32,
    /// Fixed-point UV rect `[u0, v0, u1, v1]`.
    pub uv: [i32; 4],
}

#[derive(Debug, Clone)]
pub(crate) struct FontRecord {
    /// Atlas (or image-font backing) texture on the backend. Zero while an
    /// image font waits for its texture to load.
    pub backend: BackendTextureId,
    pub glyphs: Vec<Glyph>,
    /// Nominal line height in pixels.
    pub height: f32,
    pub ready: bool,
}

/// Vertical metrics plus advance width for a string.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl FontRecord {
    #[inline]
    pub fn glyph(&self, code: u32) -> Option<&Glyph> {
        if !(GLYPH_MIN..GLYPH_MIN + GLYPH_COUNT as u32).contains(&code) {
            return None;
        }
        self.glyphs.get((code - GLYPH_MIN) as usize)
    }

    /// String metrics.
    ///
    /// Vertical metrics come from two reference glyphs: `|` spans the full
    /// ascender-to-descender range, `M` spans the ascender-to-baseline
    /// range, so `height = |.yoff + |.h`, `ascent = M.h` and
    /// `descent = height - M.yoff - M.h`. Out-of-range characters measure
    /// as a space.
    pub fn measure(&self, text: &str) -> TextMetrics {
        let vbar = self.glyphs[(b'|' as u32 - GLYPH_MIN) as usize];
        let m = self.glyphs[(b'M' as u32 - GLYPH_MIN) as usize];
        let space = self.glyphs[0];

        let height = vbar.yoff + vbar.h;
        let width = text
            .chars()
            .map(|ch| self.glyph(ch as u32).unwrap_or(&space).advance)
            .sum();

        TextMetrics {
            width,
            height,
            ascent: m.h,
            descent: height - m.yoff - m.h,
        }
    }
}

/// Converts a pixel rect on a `tex_w × tex_h` surface to a fixed-point
/// UV rect.
pub(crate) fn uv_rect(x: f32, y: f32, w: f32, h: f32, tex_w: u32, tex_h: u32) -> [i32; 4] {
    let fu = UV_MAX as f32 / tex_w.max(1) as f32;
    let fv = UV_MAX as f32 / tex_h.max(1) as f32;
    [
        (x * fu).round() as i32,
        (y * fv).round() as i32,
        ((x + w) * fu).round() as i32,
        ((y + h) * fv).round() as i32,
    ]
}

// ── fontdue bake ────────────────────────────────────────────────────────────

/// Rasterizes codes 32..=255 at `px_height` into a fresh RGBA atlas
/// (white RGB, coverage in alpha).
pub(crate) fn bake_font(bytes: &[u8], px_height: f32) -> anyhow::Result<(PixelImage, Vec<Glyph>, f32)> {
    let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("font parse failed")?;

    let side: u32 = if px_height > 64.0 {
        2048
    } else if px_height > 48.0 {
        1024
    } else {
        512
    };

    let ascent = font
        .horizontal_line_metrics(px_height)
        .map(|m| m.ascent)
        .unwrap_or(px_height);

    let mut pixels = vec![0u8; (side * side * 4) as usize];
    let mut glyphs = vec![Glyph::default(); GLYPH_COUNT];

    // Shelf packer: left to right, 1px padding, new row when a glyph does
    // not fit, error when the atlas is exhausted.
    let mut pen_x: u32 = 1;
    let mut pen_y: u32 = 1;
    let mut row_h: u32 = 0;

    for slot in 0..GLYPH_COUNT {
        let code = GLYPH_MIN + slot as u32;
        let ch = char::from_u32(code).unwrap_or(' ');
        let (metrics, bitmap) = font.rasterize(ch, px_height);
        let (gw, gh) = (metrics.width as u32, metrics.height as u32);

        if pen_x + gw + 1 > side {
            pen_x = 1;
            pen_y += row_h + 1;
            row_h = 0;
        }
        if pen_y + gh + 1 > side {
            anyhow::bail!("glyph atlas overflow at {px_height}px (code {code})");
        }

        for by in 0..gh {
            for bx in 0..gw {
                let cov = bitmap[(by * gw + bx) as usize];
                let o = (((pen_y + by) * side + pen_x + bx) * 4) as usize;
                pixels[o] = 255;
                pixels[o + 1] = 255;
                pixels[o + 2] = 255;
                pixels[o + 3] = cov;
            }
        }

        glyphs[slot] = Glyph {
            xoff: metrics.xmin as f32,
            yoff: ascent - metrics.height as f32 - metrics.ymin as f32,
            w: gw as f32,
            h: gh as f32,
            advance: metrics.advance_width,
            uv: uv_rect(pen_x as f32, pen_y as f32, gw as f32, gh as f32, side, side),
        };

        pen_x += gw + 1;
        row_h = row_h.max(gh);
    }

    let atlas = PixelImage { width: side, height: side, pixels };
    Ok((atlas, glyphs, px_height))
}

// ── image-font grid ─────────────────────────────────────────────────────────

/// Builds glyph slots for a 16×16 character grid over a region of a loaded
/// surface. Codes map row-major from 32, `border` pixels are inset on every
/// cell edge, and each glyph advances by its full cell width.
pub(crate) fn grid_glyphs(
    region: (f32, f32, f32, f32),
    surface: (u32, u32),
    border: u32,
) -> (Vec<Glyph>, f32) {
    let (rx, ry, rw, rh) = region;
    let (tex_w, tex_h) = surface;
    let cell_w = rw / 16.0;
    let cell_h = rh / 16.0;
    let b = border as f32;
    let gw = cell_w - 2.0 * b;
    let gh = cell_h - 2.0 * b;

    let mut glyphs = vec![Glyph::default(); GLYPH_COUNT];
    for slot in 0..GLYPH_COUNT {
        let code = GLYPH_MIN + slot as u32;
        let col = (code % 16) as f32;
        let row = (code / 16) as f32;
        let x = rx + col * cell_w + b;
        let y = ry + row * cell_h + b;
        glyphs[slot] = Glyph {
            xoff: 0.0,
            yoff: 0.0,
            w: gw,
            h: gh,
            advance: gw,
            uv: uv_rect(x, y, gw, gh, tex_w, tex_h),
        };
    }
    (glyphs, gh)
}
