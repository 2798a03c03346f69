//! Graphics state stack and the derived affine transform.
//!
//! A [`GraphicsState`] holds everything a drawing call samples at emission
//! time. States form a bounded stack driven by `save`/`restore`; the bottom
//! entry is never popped, so the stack always has at least one state.
//!
//! # Flush policy
//!
//! Vertex positions and colors are baked into the batch at call time, so
//! changing the transform or the fill color never requires flushing pending
//! vertices. Line width, blend mode, and the clip rect live in backend state
//! that applies to a whole submission; changing any of them while vertices
//! are queued would retroactively alter those vertices, so the renderer must
//! flush first. [`StateChange::requires_flush`] is the single source of
//! truth for this rule.

use crate::coords::Vec2;
use crate::pack::pack_color;

/// Maximum state stack depth; `save()` beyond this is a silent no-op.
pub const STACK_DEPTH: usize = 8;

/// Backend compositing function.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Source replaces destination.
    None,
    /// Standard alpha compositing.
    #[default]
    Alpha,
    /// Additive.
    Add,
    /// Destination multiplied by source color, ignoring alpha.
    Modulate,
    /// Multiply with alpha compositing.
    Multiply,
}

/// A graphics-state mutation the renderer is about to apply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StateChange {
    Color,
    Transform,
    LineWidth,
    Blend,
    Clip,
}

impl StateChange {
    /// Whether pending vertices must be submitted before this change takes
    /// effect. Per-vertex values (color, transform) never flush.
    #[inline]
    pub const fn requires_flush(self) -> bool {
        matches!(self, Self::LineWidth | Self::Blend | Self::Clip)
    }
}

/// One entry of the graphics state stack.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GraphicsState {
    pub origin: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
    /// Uniform scale.
    pub scale: f32,
    /// Packed RGBA fill color (see [`crate::pack::pack_color`]).
    pub color: u32,
    pub line_width: f32,
    pub blend: BlendMode,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            origin: Vec2::zero(),
            rotation: 0.0,
            scale: 1.0,
            color: pack_color(255, 255, 255, 255),
            line_width: 1.0,
            blend: BlendMode::Alpha,
        }
    }
}

/// 2×3 affine transform derived from the active [`GraphicsState`].
///
/// Maps a local point `(x, y)` to `(a*x + c*y + tx, b*x + d*y + ty)`.
/// Recomputed whenever the state changes, applied CPU-side to every vertex.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Transform2D {
    #[inline]
    pub const fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 }
    }

    /// Rotation-then-scale matrix with the state origin as translation.
    pub fn from_state(s: &GraphicsState) -> Self {
        let (sin, cos) = s.rotation.sin_cos();
        Self {
            a: cos * s.scale,
            b: sin * s.scale,
            c: -sin * s.scale,
            d: cos * s.scale,
            tx: s.origin.x,
            ty: s.origin.y,
        }
    }

    #[inline]
    pub fn apply(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }
}

/// Bounded stack of graphics states plus the cached active transform.
#[derive(Debug)]
pub struct StateStack {
    states: Vec<GraphicsState>,
    matrix: Transform2D,
}

impl StateStack {
    pub fn new() -> Self {
        Self {
            states: vec![GraphicsState::default()],
            matrix: Transform2D::identity(),
        }
    }

    #[inline]
    pub fn top(&self) -> &GraphicsState {
        // Invariant: never empty.
        self.states.last().expect("state stack is never empty")
    }

    #[inline]
    pub fn top_mut(&mut self) -> &mut GraphicsState {
        self.states.last_mut().expect("state stack is never empty")
    }

    #[inline]
    pub fn matrix(&self) -> &Transform2D {
        &self.matrix
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    /// Pushes a copy of the active state. No-op past [`STACK_DEPTH`].
    pub fn save(&mut self) {
        if self.states.len() < STACK_DEPTH {
            self.states.push(*self.top());
        }
    }

    /// Pops the active state and reactivates the one below.
    ///
    /// Returns the popped state, or `None` when only the bottom state
    /// remains (which is never popped).
    pub fn restore(&mut self) -> Option<GraphicsState> {
        if self.states.len() < 2 {
            return None;
        }
        let popped = self.states.pop();
        self.rebuild_matrix();
        popped
    }

    /// Sets the transform components of the active state absolutely.
    pub fn set_transform(&mut self, origin: Vec2, rotation: f32, scale: f32) {
        let top = self.top_mut();
        top.origin = origin;
        top.rotation = rotation;
        top.scale = scale;
        self.rebuild_matrix();
    }

    /// Composes a relative transform onto the active state.
    ///
    /// The translation delta is expressed in the caller's local space: it is
    /// mapped through the current matrix's linear part before being added to
    /// the origin, so `transform(Vec2::new(10.0, 0.0), ..)` moves along the
    /// current rotated x axis.
    pub fn transform(&mut self, delta: Vec2, rotation: f32, scale: f32) {
        let m = self.matrix;
        let top = self.top_mut();
        top.origin.x += m.a * delta.x + m.c * delta.y;
        top.origin.y += m.b * delta.x + m.d * delta.y;
        top.rotation += rotation;
        top.scale *= scale;
        self.rebuild_matrix();
    }

    /// Collapses the stack to a single default state.
    pub fn reset(&mut self) {
        self.states.clear();
        self.states.push(GraphicsState::default());
        self.matrix = Transform2D::identity();
    }

    fn rebuild_matrix(&mut self) {
        self.matrix = Transform2D::from_state(self.top());
    }
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}
