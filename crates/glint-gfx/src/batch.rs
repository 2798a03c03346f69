//! CPU-side vertex accumulation.
//!
//! The batch is a flat vertex list sized in primitives, where one primitive
//! is at most [`VERTS_PER_PRIMITIVE_MAX`] vertices (one textured quad as two
//! triangles). Drawing calls push vertices, close each primitive with
//! [`BatchBuffer::end_primitive`], and flush when it reports the buffer full.

use crate::pack::Vertex;

/// Upper bound on vertices a single primitive contributes.
pub const VERTS_PER_PRIMITIVE_MAX: usize = 6;

/// Default batch capacity in primitives.
pub const DEFAULT_CAPACITY: usize = 500;

/// Growable-at-construction, fixed-at-runtime vertex staging buffer.
#[derive(Debug)]
pub struct BatchBuffer {
    verts: Vec<Vertex>,
    primitives: usize,
    capacity: usize,
}

impl BatchBuffer {
    /// `capacity` is in primitives; the vertex store is preallocated so
    /// pushes inside a frame never reallocate.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            verts: Vec::with_capacity(capacity * VERTS_PER_PRIMITIVE_MAX),
            primitives: 0,
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, v: Vertex) {
        self.verts.push(v);
    }

    /// Closes the current primitive. Returns `true` when the buffer has
    /// reached capacity and must be flushed before the next primitive.
    #[inline]
    pub fn end_primitive(&mut self) -> bool {
        self.primitives += 1;
        self.primitives >= self.capacity
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.verts
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.verts.is_empty()
    }

    #[inline]
    pub fn primitives(&self) -> usize {
        self.primitives
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clears accumulated vertices without releasing the allocation.
    pub fn reset(&mut self) {
        self.verts.clear();
        self.primitives = 0;
    }
}
