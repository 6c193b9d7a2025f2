//! Append-only stroke history of a board and its incremental renderer.

use crate::surface::StrokeSurface;
use crate::tools::ToolSnapshot;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// A recorded coordinate with its continuation flag and tool snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawPoint {
    pub x: f64,
    pub y: f64,
    /// `false` starts a new stroke (move-to), `true` connects to the previous point.
    pub continues: bool,
    pub tool: ToolSnapshot,
}

impl DrawPoint {
    pub fn new(x: f64, y: f64, continues: bool, tool: ToolSnapshot) -> Self {
        Self { x, y, continues, tool }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One entry of a stroke log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointEvent {
    Draw(DrawPoint),
    /// Separates two unrelated strokes; the next point never connects across it.
    Break,
}

impl PointEvent {
    pub fn as_point(&self) -> Option<&DrawPoint> {
        match self {
            PointEvent::Draw(point) => Some(point),
            PointEvent::Break => None,
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, PointEvent::Break)
    }
}

/// Ordered point events plus the cursor of what has already been painted.
///
/// Invariant: `rendered_through <= events.len()`. The only non-append mutation
/// is [`StrokeLog::invalidate`], which rewinds the cursor for a full repaint.
#[derive(Debug, Clone, Default)]
pub struct StrokeLog {
    events: Vec<PointEvent>,
    rendered_through: usize,
    /// Attributes applied for the most recent painted point.
    last_applied: Option<ToolSnapshot>,
    full_redraw: bool,
}

impl StrokeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, point: DrawPoint) {
        self.events.push(PointEvent::Draw(point));
    }

    pub fn append_break(&mut self) {
        self.events.push(PointEvent::Break);
    }

    /// Events from `cursor` to the end. Restartable: earlier results never change.
    pub fn points_since(&self, cursor: usize) -> impl Iterator<Item = &PointEvent> + '_ {
        self.events.get(cursor..).unwrap_or(&[]).iter()
    }

    pub fn events(&self) -> &[PointEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn rendered_through(&self) -> usize {
        self.rendered_through
    }

    /// Force the next render to repaint everything from index 0.
    pub fn invalidate(&mut self) {
        self.rendered_through = 0;
        self.last_applied = None;
        self.full_redraw = true;
    }

    /// Whether a full repaint is pending.
    pub fn needs_full_redraw(&self) -> bool {
        self.full_redraw
    }

    /// Whether there are events that have not been painted yet.
    pub fn has_pending(&self) -> bool {
        self.full_redraw || self.rendered_through < self.events.len()
    }

    /// Paint `[rendered_through, len)` and advance the cursor.
    /// Returns the number of segments painted.
    pub fn render_incremental<S: StrokeSurface + ?Sized>(&mut self, surface: &mut S) -> usize {
        let start = self.rendered_through;
        self.paint_range(surface, start)
    }

    /// Repaint every event from index 0, regardless of the surface contents.
    ///
    /// Attributes are always re-applied for the first painted point, so running
    /// this against a freshly cleared surface gives the same result every time.
    pub fn render_all<S: StrokeSurface + ?Sized>(&mut self, surface: &mut S) -> usize {
        self.last_applied = None;
        self.full_redraw = false;
        self.paint_range(surface, 0)
    }

    fn paint_range<S: StrokeSurface + ?Sized>(&mut self, surface: &mut S, start: usize) -> usize {
        let mut painted = 0;
        for index in start..self.events.len() {
            let PointEvent::Draw(point) = &self.events[index] else {
                continue;
            };

            if self.last_applied.as_ref() != Some(&point.tool) {
                surface.apply_tool(&point.tool);
                self.last_applied = Some(point.tool.clone());
            }

            let to = point.position();
            let from = match index.checked_sub(1).map(|prev| &self.events[prev]) {
                Some(PointEvent::Draw(prev)) if point.continues => prev.position(),
                _ => to,
            };
            surface.stroke_segment(from, to);
            painted += 1;
        }
        self.rendered_through = self.events.len();
        painted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{RecordingSurface, SurfaceOp};
    use crate::tools::ToolKind;

    fn pen() -> ToolSnapshot {
        ToolKind::Pen.defaults()
    }

    fn stroke(log: &mut StrokeLog, points: &[(f64, f64)]) {
        for (i, &(x, y)) in points.iter().enumerate() {
            log.append(DrawPoint::new(x, y, i > 0, pen()));
        }
    }

    #[test]
    fn test_empty_log_renders_nothing() {
        let mut log = StrokeLog::new();
        let mut surface = RecordingSurface::new(100.0, 100.0);
        assert_eq!(log.render_incremental(&mut surface), 0);
        assert!(surface.ops().is_empty());
    }

    #[test]
    fn test_points_since_preserves_order() {
        let mut log = StrokeLog::new();
        let calls = [(1.0, 2.0, false), (3.0, 4.0, true), (5.0, 6.0, true)];
        for &(x, y, continues) in &calls {
            log.append(DrawPoint::new(x, y, continues, pen()));
        }

        let replayed: Vec<(f64, f64, bool)> = log
            .points_since(0)
            .filter_map(PointEvent::as_point)
            .map(|p| (p.x, p.y, p.continues))
            .collect();
        assert_eq!(replayed, calls);

        // Restartable and bounded.
        assert_eq!(log.points_since(1).count(), 2);
        assert_eq!(log.points_since(1).count(), 2);
        assert_eq!(log.points_since(10).count(), 0);
    }

    #[test]
    fn test_incremental_advances_cursor() {
        let mut log = StrokeLog::new();
        let mut surface = RecordingSurface::new(100.0, 100.0);
        stroke(&mut log, &[(0.0, 0.0), (10.0, 10.0)]);

        assert_eq!(log.render_incremental(&mut surface), 2);
        assert_eq!(log.rendered_through(), 2);
        assert!(!log.has_pending());

        // Nothing new: nothing painted.
        assert_eq!(log.render_incremental(&mut surface), 0);
    }

    #[test]
    fn test_incremental_matches_single_pass() {
        let points = [(0.0, 0.0), (5.0, 5.0), (10.0, 0.0), (15.0, 5.0), (20.0, 0.0)];

        let mut split = StrokeLog::new();
        let mut split_surface = RecordingSurface::new(100.0, 100.0);
        stroke(&mut split, &points[..2]);
        split.render_incremental(&mut split_surface);
        for &(x, y) in &points[2..] {
            split.append(DrawPoint::new(x, y, true, pen()));
        }
        split.render_incremental(&mut split_surface);

        let mut whole = StrokeLog::new();
        let mut whole_surface = RecordingSurface::new(100.0, 100.0);
        stroke(&mut whole, &points);
        whole.render_incremental(&mut whole_surface);

        assert_eq!(split_surface.ops(), whole_surface.ops());
    }

    #[test]
    fn test_full_redraw_is_idempotent() {
        let mut log = StrokeLog::new();
        stroke(&mut log, &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        log.append_break();
        stroke(&mut log, &[(50.0, 50.0), (60.0, 60.0)]);

        let mut surface = RecordingSurface::new(100.0, 100.0);
        surface.reset(100.0, 100.0);
        log.render_all(&mut surface);
        let first = surface.ops().to_vec();

        surface.reset(100.0, 100.0);
        log.render_all(&mut surface);
        assert_eq!(surface.ops(), first.as_slice());
    }

    #[test]
    fn test_tool_applied_only_on_change() {
        let mut log = StrokeLog::new();
        let mut thick = pen();
        thick.width = 9.0;
        log.append(DrawPoint::new(0.0, 0.0, false, pen()));
        log.append(DrawPoint::new(1.0, 0.0, true, pen()));
        log.append(DrawPoint::new(2.0, 0.0, true, thick.clone()));
        log.append(DrawPoint::new(3.0, 0.0, true, thick));

        let mut surface = RecordingSurface::new(100.0, 100.0);
        log.render_incremental(&mut surface);
        assert_eq!(surface.tool_changes(), 2);
        assert_eq!(surface.segment_count(), 4);

        // Same tool across an incremental boundary is not re-applied.
        let mut more = pen();
        more.width = 9.0;
        log.append(DrawPoint::new(4.0, 0.0, true, more));
        log.render_incremental(&mut surface);
        assert_eq!(surface.tool_changes(), 2);
    }

    #[test]
    fn test_point_after_break_starts_new_stroke() {
        let mut log = StrokeLog::new();
        log.append(DrawPoint::new(0.0, 0.0, false, pen()));
        log.append_break();
        // Stored as continuing, but must not connect across the break.
        log.append(DrawPoint::new(30.0, 30.0, true, pen()));

        let mut surface = RecordingSurface::new(100.0, 100.0);
        log.render_incremental(&mut surface);

        let last = surface.ops().last().unwrap();
        assert_eq!(
            last,
            &SurfaceOp::Segment {
                from: Point::new(30.0, 30.0),
                to: Point::new(30.0, 30.0)
            }
        );
    }

    #[test]
    fn test_trailing_break_not_rendered() {
        let mut log = StrokeLog::new();
        log.append(DrawPoint::new(0.0, 0.0, false, pen()));
        log.append_break();

        let mut surface = RecordingSurface::new(100.0, 100.0);
        assert_eq!(log.render_incremental(&mut surface), 1);
        assert_eq!(surface.segment_count(), 1);
        assert_eq!(log.rendered_through(), 2);
    }

    #[test]
    fn test_continuing_point_connects_to_previous() {
        let mut log = StrokeLog::new();
        stroke(&mut log, &[(0.0, 0.0), (10.0, 20.0)]);

        let mut surface = RecordingSurface::new(100.0, 100.0);
        log.render_incremental(&mut surface);
        assert_eq!(
            surface.ops().last().unwrap(),
            &SurfaceOp::Segment {
                from: Point::new(0.0, 0.0),
                to: Point::new(10.0, 20.0)
            }
        );
    }

    #[test]
    fn test_invalidate_keeps_events() {
        let mut log = StrokeLog::new();
        stroke(&mut log, &[(0.0, 0.0), (1.0, 1.0)]);
        let mut surface = RecordingSurface::new(100.0, 100.0);
        log.render_incremental(&mut surface);

        log.invalidate();
        assert_eq!(log.len(), 2);
        assert_eq!(log.rendered_through(), 0);
        assert!(log.needs_full_redraw());

        log.render_all(&mut surface);
        assert!(!log.needs_full_redraw());
        assert_eq!(log.rendered_through(), 2);
    }
}
