//! Vertex attribute packing.
//!
//! The batch stores one 16-byte vertex per corner:
//!
//!  offset  0  pos    [f32; 2]   loc 0  Float32x2
//!  offset  8  color  u32        loc 1  Unorm8x4  (bytes r, g, b, a)
//!  offset 12  uv     u32        loc 2  Sint16x2  (low lane u, high lane v)
//!
//! Texture coordinates are signed 14-bit fixed point, not normalized floats,
//! so sub-pixel atlas coordinates stay exact in 16 bits. The shader divides
//! by [`UV_MAX`] to reach normalized texture space.
//!
//! Packing is plain integer bit manipulation over `u32`; no float aliasing
//! is involved, and `unpack(pack(x)) == x` holds for every valid input.

use bytemuck::{Pod, Zeroable};

/// Fixed-point range constant for packed texture coordinates.
///
/// Valid lane values are `-16384..=16383`; the backend shader divides by
/// this constant, so a lane of `UV_MAX` maps to texture coordinate 1.0.
pub const UV_MAX: i32 = 16383;

/// One batched vertex. See the module docs for the exact attribute layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: u32,
    pub uv: u32,
}

/// Packs 8-bit RGBA into one word, byte order `r, g, b, a` from the lowest
/// address (little-endian layout matching an `Unorm8x4` vertex attribute).
#[inline]
pub const fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
}

/// Inverse of [`pack_color`].
#[inline]
pub const fn unpack_color(c: u32) -> (u8, u8, u8, u8) {
    (c as u8, (c >> 8) as u8, (c >> 16) as u8, (c >> 24) as u8)
}

/// Packs two fixed-point texture coordinates into one word, `u` in the low
/// 16 bits, `v` in the high 16 bits, both two's complement.
///
/// Inputs outside `[-16384, 16383]` are clamped.
#[inline]
pub fn pack_uv(u: i32, v: i32) -> u32 {
    let u = u.clamp(-UV_MAX - 1, UV_MAX) as i16;
    let v = v.clamp(-UV_MAX - 1, UV_MAX) as i16;
    (u as u16 as u32) | (v as u16 as u32) << 16
}

/// Inverse of [`pack_uv`]; lanes are sign-extended back to `i32`.
#[inline]
pub const fn unpack_uv(uv: u32) -> (i32, i32) {
    (uv as u16 as i16 as i32, (uv >> 16) as u16 as i16 as i32)
}
