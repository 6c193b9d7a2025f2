//! Region copy and translated paste over a stroke log.

use crate::stroke_log::{DrawPoint, PointEvent, StrokeLog};
use crate::tools::ToolSnapshot;
use kurbo::{Point, Rect, Vec2};

/// One captured entry, positioned relative to the capture origin.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipEntry {
    Point {
        offset: Vec2,
        continues: bool,
        tool: ToolSnapshot,
    },
    Break,
}

/// Points captured from a rectangular region of a board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clipboard {
    entries: Vec<ClipEntry>,
    origin: Point,
}

impl Clipboard {
    /// Capture every point of `log` inside `region`, bounds inclusive.
    ///
    /// Included points whose source indices are not adjacent get a break
    /// between them. Adjacency is by log index, so two strokes that were
    /// recorded back to back still join when both lie in the region.
    pub fn capture(log: &StrokeLog, region: Rect) -> Self {
        let region = region.abs();
        let origin = Point::new(region.x0, region.y0);
        let mut entries = Vec::new();
        let mut last_index: Option<usize> = None;

        for (index, event) in log.events().iter().enumerate() {
            let Some(point) = event.as_point() else {
                continue;
            };
            if !contains_inclusive(region, point.position()) {
                continue;
            }
            if last_index.is_some_and(|last| index != last + 1) {
                entries.push(ClipEntry::Break);
            }
            entries.push(ClipEntry::Point {
                offset: point.position() - origin,
                continues: point.continues,
                tool: point.tool.clone(),
            });
            last_index = Some(index);
        }

        Self { entries, origin }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClipEntry] {
        &self.entries
    }

    /// Top-left corner of the captured region.
    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Events that reproduce the capture with its origin moved to `target`:
    /// a leading break, then every entry translated. Empty when nothing was captured.
    pub fn paste_ops(&self, target: Point) -> Vec<PointEvent> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let mut ops = Vec::with_capacity(self.entries.len() + 1);
        ops.push(PointEvent::Break);
        for entry in &self.entries {
            ops.push(match entry {
                ClipEntry::Point {
                    offset,
                    continues,
                    tool,
                } => {
                    let at = target + *offset;
                    PointEvent::Draw(DrawPoint::new(at.x, at.y, *continues, tool.clone()))
                }
                ClipEntry::Break => PointEvent::Break,
            });
        }
        ops
    }
}

fn contains_inclusive(rect: Rect, point: Point) -> bool {
    point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
}
