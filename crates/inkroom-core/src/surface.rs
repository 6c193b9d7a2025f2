//! Raster surface abstraction.
//!
//! Stroking a segment into pixels is left to the host platform. Boards talk to
//! their surface only through [`StrokeSurface`], so a GPU scene, a browser
//! canvas or the headless [`RecordingSurface`] can sit behind a board.

use crate::tools::ToolSnapshot;
use kurbo::Point;

/// A drawable raster owned by exactly one board.
pub trait StrokeSurface {
    /// Make `tool` the attribute bundle used by subsequent segments.
    fn apply_tool(&mut self, tool: &ToolSnapshot);

    /// Stroke one segment with the current attributes. `from == to` paints a dot.
    fn stroke_segment(&mut self, from: Point, to: Point);

    /// Clear all pixels and resize. Applied attributes are forgotten too.
    fn reset(&mut self, width: f64, height: f64);
}

impl<T: StrokeSurface + ?Sized> StrokeSurface for Box<T> {
    fn apply_tool(&mut self, tool: &ToolSnapshot) {
        (**self).apply_tool(tool);
    }

    fn stroke_segment(&mut self, from: Point, to: Point) {
        (**self).stroke_segment(from, to);
    }

    fn reset(&mut self, width: f64, height: f64) {
        (**self).reset(width, height);
    }
}

/// Creates the surface for a newly created board.
pub trait SurfaceFactory<S> {
    fn create(&mut self, width: f64, height: f64) -> S;
}

impl<S, F> SurfaceFactory<S> for F
where
    F: FnMut(f64, f64) -> S,
{
    fn create(&mut self, width: f64, height: f64) -> S {
        self(width, height)
    }
}

/// One operation recorded by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    ApplyTool(ToolSnapshot),
    Segment { from: Point, to: Point },
}

/// Headless surface that records every operation since the last reset.
///
/// Two recordings are equal exactly when a deterministic rasterizer would
/// produce the same pixels from them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    width: f64,
    height: f64,
    ops: Vec<SurfaceOp>,
    resets: usize,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
            resets: 0,
        }
    }

    /// Operations painted since the last reset.
    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    /// Number of segments painted since the last reset.
    pub fn segment_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Segment { .. }))
            .count()
    }

    /// Number of attribute applications since the last reset.
    pub fn tool_changes(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SurfaceOp::ApplyTool(_)))
            .count()
    }

    /// How many times the surface has been cleared.
    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}

impl StrokeSurface for RecordingSurface {
    fn apply_tool(&mut self, tool: &ToolSnapshot) {
        self.ops.push(SurfaceOp::ApplyTool(tool.clone()));
    }

    fn stroke_segment(&mut self, from: Point, to: Point) {
        self.ops.push(SurfaceOp::Segment { from, to });
    }

    fn reset(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.ops.clear();
        self.resets += 1;
    }
}
