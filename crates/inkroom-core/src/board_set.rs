//! The collection of boards and the active-board invariant.

use crate::board::{Board, BoardId, DEFAULT_BOARD_HEIGHT, DEFAULT_BOARD_WIDTH};
use crate::clipboard::Clipboard;
use crate::error::{BoardError, BoardResult};
use crate::stroke_log::PointEvent;
use crate::surface::{RecordingSurface, StrokeSurface, SurfaceFactory};
use crate::tools::ToolSnapshot;
use kurbo::{Point, Size};

/// First id handed out by a fresh board set.
pub const FIRST_BOARD_ID: u64 = 1;

/// Comparable state of one board (everything except its pixels).
#[derive(Debug, Clone, PartialEq)]
pub struct BoardState {
    pub id: BoardId,
    pub name: String,
    pub size: Size,
    pub events: Vec<PointEvent>,
}

/// Comparable state of a whole board set.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSetState {
    pub boards: Vec<BoardState>,
    pub active: Option<BoardId>,
    pub next_id: u64,
}

/// Owns every board, in creation order, and tracks which one is active.
///
/// Invariant: `active` is `None` exactly when there are no boards, and
/// otherwise names an existing board, the only visible one.
///
/// Ids come from a local counter. Replicas stay in lockstep because they
/// replay the same sequence of creations, not because ids travel on the wire.
pub struct BoardSet<S = Box<dyn StrokeSurface>> {
    boards: Vec<Board<S>>,
    active: Option<BoardId>,
    next_id: u64,
    board_size: Size,
    factory: Box<dyn SurfaceFactory<S>>,
}

impl BoardSet<Box<dyn StrokeSurface>> {
    /// Board set whose boards paint into headless recording surfaces.
    pub fn headless() -> Self {
        Self::new(|width: f64, height: f64| -> Box<dyn StrokeSurface> {
            Box::new(RecordingSurface::new(width, height))
        })
    }
}

impl<S: StrokeSurface> BoardSet<S> {
    /// Create an empty board set. `factory` builds the surface of every new board.
    pub fn new(factory: impl SurfaceFactory<S> + 'static) -> Self {
        Self {
            boards: Vec::new(),
            active: None,
            next_id: FIRST_BOARD_ID,
            board_size: Size::new(DEFAULT_BOARD_WIDTH, DEFAULT_BOARD_HEIGHT),
            factory: Box::new(factory),
        }
    }

    /// Set the initial surface size of boards created from now on.
    pub fn with_board_size(mut self, width: f64, height: f64) -> Self {
        self.board_size = Size::new(width, height);
        self
    }

    /// Create a board, make it active and hide all others.
    pub fn create_board(&mut self) -> BoardId {
        let id = BoardId(self.next_id);
        self.next_id += 1;

        let surface = self.factory.create(self.board_size.width, self.board_size.height);
        let mut board = Board::new(id, format!("Board {id}"), self.board_size, surface);

        for other in &mut self.boards {
            other.hide();
        }
        board.show();
        self.boards.push(board);
        self.active = Some(id);

        log::debug!("Created board {id}");
        id
    }

    /// Make `id` the active, visible board. Its full repaint happens on the
    /// next frame; hidden boards do not repaint.
    pub fn switch_to(&mut self, id: BoardId) -> BoardResult<()> {
        if !self.contains(id) {
            return Err(BoardError::NotFound(id));
        }
        for board in &mut self.boards {
            if board.id() == id {
                board.show();
            } else {
                board.hide();
            }
        }
        self.active = Some(id);
        Ok(())
    }

    /// Rename a board. Unknown ids are ignored; returns whether a board was renamed.
    pub fn rename(&mut self, id: BoardId, name: impl Into<String>) -> bool {
        match self.board_mut(id) {
            Some(board) => {
                board.set_name(name);
                true
            }
            None => false,
        }
    }

    /// Delete a board. Unknown ids are ignored; returns whether a board was removed.
    ///
    /// Deleting the active board promotes the first remaining board.
    pub fn delete(&mut self, id: BoardId) -> bool {
        let Some(index) = self.boards.iter().position(|b| b.id() == id) else {
            return false;
        };
        self.boards.remove(index);

        if self.active == Some(id) {
            self.active = self.boards.first().map(Board::id);
            if let Some(next) = self.boards.first_mut() {
                next.show();
            }
        }
        log::debug!("Deleted board {id}, active is now {:?}", self.active);
        true
    }

    /// Drop every board and rewind the id counter.
    pub fn reset(&mut self) {
        self.boards.clear();
        self.active = None;
        self.next_id = FIRST_BOARD_ID;
    }

    /// Append a point to any board, visible or not.
    pub fn add_point(
        &mut self,
        id: BoardId,
        x: f64,
        y: f64,
        dragging: bool,
        tool: ToolSnapshot,
    ) -> BoardResult<()> {
        self.board_mut(id)
            .ok_or(BoardError::NotFound(id))?
            .add_point(x, y, dragging, tool)
    }

    /// Append a stroke break to any board.
    pub fn add_break(&mut self, id: BoardId) -> BoardResult<()> {
        self.board_mut(id).ok_or(BoardError::NotFound(id))?.add_break();
        Ok(())
    }

    /// Capture the active board's points inside `region`.
    pub fn copy(&self, region: kurbo::Rect) -> Option<Clipboard> {
        self.active().map(|board| Clipboard::capture(board.log(), region))
    }

    /// Replay `clipboard` onto the active board at `target`.
    /// Returns the number of events appended; zero when there is nothing to do.
    pub fn paste(&mut self, clipboard: &Clipboard, target: Point) -> BoardResult<usize> {
        let Some(id) = self.active else {
            return Ok(0);
        };
        let ops = clipboard.paste_ops(target);
        for op in &ops {
            match op {
                PointEvent::Draw(p) => self.add_point(id, p.x, p.y, p.continues, p.tool.clone())?,
                PointEvent::Break => self.add_break(id)?,
            }
        }
        Ok(ops.len())
    }

    /// Paint whatever is pending on the active board. Called once per frame,
    /// so any number of points added since the last frame share one render.
    pub fn render_frame(&mut self) -> usize {
        self.active_mut().map_or(0, Board::render)
    }

    pub fn contains(&self, id: BoardId) -> bool {
        self.boards.iter().any(|b| b.id() == id)
    }

    pub fn board(&self, id: BoardId) -> Option<&Board<S>> {
        self.boards.iter().find(|b| b.id() == id)
    }

    pub fn board_mut(&mut self, id: BoardId) -> Option<&mut Board<S>> {
        self.boards.iter_mut().find(|b| b.id() == id)
    }

    pub fn active_id(&self) -> Option<BoardId> {
        self.active
    }

    pub fn active(&self) -> Option<&Board<S>> {
        self.active.and_then(|id| self.board(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Board<S>> {
        let id = self.active?;
        self.board_mut(id)
    }

    /// Boards in creation order.
    pub fn boards(&self) -> impl Iterator<Item = &Board<S>> {
        self.boards.iter()
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Snapshot the replicated state for comparison.
    pub fn snapshot(&self) -> BoardSetState {
        BoardSetState {
            boards: self
                .boards
                .iter()
                .map(|b| BoardState {
                    id: b.id(),
                    name: b.name().to_string(),
                    size: b.size(),
                    events: b.log().events().to_vec(),
                })
                .collect(),
            active: self.active,
            next_id: self.next_id,
        }
    }
}
