//! A single drawable board: stroke log, surface size and visibility.

use crate::error::{BoardError, BoardResult};
use crate::stroke_log::{DrawPoint, StrokeLog};
use crate::surface::StrokeSurface;
use crate::tools::ToolSnapshot;
use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distance from the right/bottom edge at which a board grows.
pub const GROWTH_MARGIN: f64 = 50.0;
/// Multiplier applied to both dimensions on growth.
pub const GROWTH_FACTOR: f64 = 1.5;
/// Default surface width for new boards.
pub const DEFAULT_BOARD_WIDTH: f64 = 1280.0;
/// Default surface height for new boards.
pub const DEFAULT_BOARD_HEIGHT: f64 = 720.0;

/// Sequential board identifier, stable for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub u64);

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One drawable surface with its own stroke history.
///
/// A board is either visible or hidden. Only the visible board paints; a hidden
/// board keeps accepting points so replicas stay consistent, and repaints in
/// full once it becomes visible again.
#[derive(Debug)]
pub struct Board<S> {
    id: BoardId,
    name: String,
    log: StrokeLog,
    size: Size,
    visible: bool,
    surface: S,
}

impl<S: StrokeSurface> Board<S> {
    /// Create a hidden board with the given surface.
    pub fn new(id: BoardId, name: impl Into<String>, size: Size, mut surface: S) -> Self {
        let size = Size::new(size.width.max(1.0), size.height.max(1.0));
        surface.reset(size.width, size.height);
        Self {
            id,
            name: name.into(),
            log: StrokeLog::new(),
            size,
            visible: false,
            surface,
        }
    }

    pub fn id(&self) -> BoardId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn log(&self) -> &StrokeLog {
        &self.log
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Make the board visible; its next render repaints everything.
    pub fn show(&mut self) {
        self.visible = true;
        self.log.invalidate();
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Whether pointer-driven painting should be routed to this board.
    pub fn accepts_pointer(&self) -> bool {
        self.visible
    }

    /// Record a point. `x` and `y` are surface coordinates, already translated
    /// from any viewport scroll offset.
    pub fn add_point(&mut self, x: f64, y: f64, dragging: bool, tool: ToolSnapshot) -> BoardResult<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(BoardError::InvalidInput(format!("non-finite coordinates ({x}, {y})")));
        }
        self.grow_to_fit(x, y);
        self.log.append(DrawPoint::new(x, y, dragging, tool));
        Ok(())
    }

    /// Record a stroke break.
    pub fn add_break(&mut self) {
        self.log.append_break();
    }

    /// Grow the surface until `(x, y)` is clear of the growth margin.
    /// Returns true if the board grew.
    fn grow_to_fit(&mut self, x: f64, y: f64) -> bool {
        let mut grew = false;
        while x >= self.size.width - GROWTH_MARGIN || y >= self.size.height - GROWTH_MARGIN {
            self.size = Size::new(self.size.width * GROWTH_FACTOR, self.size.height * GROWTH_FACTOR);
            grew = true;
        }
        if grew {
            log::debug!(
                "Board {} grew to {}x{}",
                self.id,
                self.size.width,
                self.size.height
            );
            // Enlarging the backing surface discards its pixels.
            self.log.invalidate();
        }
        grew
    }

    /// Paint pending events if the board is visible. A pending full redraw
    /// clears and resizes the surface first. Returns the segments painted.
    pub fn render(&mut self) -> usize {
        if !self.visible {
            return 0;
        }
        if self.log.needs_full_redraw() {
            self.surface.reset(self.size.width, self.size.height);
            self.log.render_all(&mut self.surface)
        } else {
            self.log.render_incremental(&mut self.surface)
        }
    }

    /// Clear the surface and repaint the whole log, visible or not.
    pub fn redraw(&mut self) -> usize {
        self.surface.reset(self.size.width, self.size.height);
        self.log.render_all(&mut self.surface)
    }
}
