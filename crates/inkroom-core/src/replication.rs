//! Replication session: local operations, outbound queue and inbound apply.
//!
//! The host is the only writer. Every local host operation is applied to the
//! board set and queued as one self-contained [`Mutation`]. Viewers apply the
//! same mutations in arrival order. Whenever the host (re)connects it asks the
//! relay for the room history, rebuilds its board set from it, then re-applies
//! and resends whatever the relay has not recorded.

use std::collections::{HashMap, VecDeque};

use crate::board::BoardId;
use crate::board_set::{BoardSet, FIRST_BOARD_ID};
use crate::clipboard::Clipboard;
use crate::config::{ReconnectPolicy, SessionConfig};
use crate::error::{BoardError, BoardResult};
use crate::events::{BoardEvent, EventBus, SubscriptionId};
use crate::protocol::{ClientMessage, Mutation, Role, RosterEntry, ServerMessage};
use crate::surface::{StrokeSurface, SurfaceFactory};
use crate::tools::{ToolRegistry, ToolSelection};
use crate::transport::{ConnectionState, TransportEvent};
use kurbo::{Point, Rect};

/// How an inbound mutation is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyMode {
    /// Part of a history replay: the mutation already happened once, so no
    /// "just happened" notification is published for it.
    pub reconnect: bool,
}

impl ApplyMode {
    pub const LIVE: Self = Self { reconnect: false };
    pub const RECONNECT: Self = Self { reconnect: true };
}

/// The board-set operation a mutation turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    BoardCreated(BoardId),
    BoardSwitched(BoardId),
    PointAdded(BoardId),
    BreakAdded(BoardId),
    BoardRenamed { board_id: BoardId, name: String },
    BoardDeleted { board_id: BoardId, new_active: Option<BoardId> },
    /// Rename or delete of an unknown board.
    Ignored,
}

impl Applied {
    /// The notification for this operation, if any.
    pub fn event(&self) -> Option<BoardEvent> {
        match self {
            Applied::BoardCreated(board_id) => Some(BoardEvent::BoardCreated { board_id: *board_id }),
            Applied::BoardSwitched(board_id) => Some(BoardEvent::BoardSwitched { board_id: *board_id }),
            Applied::PointAdded(board_id) | Applied::BreakAdded(board_id) => {
                Some(BoardEvent::PointAdded { board_id: *board_id })
            }
            Applied::BoardRenamed { board_id, name } => Some(BoardEvent::BoardRenamed {
                board_id: *board_id,
                name: name.clone(),
            }),
            Applied::BoardDeleted { board_id, new_active } => Some(BoardEvent::BoardDeleted {
                board_id: *board_id,
                new_active: *new_active,
            }),
            Applied::Ignored => None,
        }
    }
}

/// Apply one mutation as exactly one board-set operation.
pub fn apply_mutation<S: StrokeSurface>(boards: &mut BoardSet<S>, mutation: &Mutation) -> BoardResult<Applied> {
    match mutation {
        Mutation::BoardCreated => Ok(Applied::BoardCreated(boards.create_board())),
        Mutation::BoardSwitched { board_id } => {
            boards.switch_to(*board_id)?;
            Ok(Applied::BoardSwitched(*board_id))
        }
        Mutation::Point {
            board_id,
            x,
            y,
            dragging,
            tool,
        } => match (x, y, tool) {
            (None, None, _) => {
                boards.add_break(*board_id)?;
                Ok(Applied::BreakAdded(*board_id))
            }
            (Some(x), Some(y), Some(tool)) => {
                boards.add_point(*board_id, *x, *y, *dragging, tool.clone())?;
                Ok(Applied::PointAdded(*board_id))
            }
            (Some(_), Some(_), None) => Err(BoardError::InvalidInput(format!(
                "point on board {board_id} has no tool"
            ))),
            _ => Err(BoardError::InvalidInput(format!(
                "point on board {board_id} has only one coordinate"
            ))),
        },
        Mutation::BoardRenamed { board_id, new_name } => {
            if boards.rename(*board_id, new_name.clone()) {
                Ok(Applied::BoardRenamed {
                    board_id: *board_id,
                    name: new_name.clone(),
                })
            } else {
                Ok(Applied::Ignored)
            }
        }
        Mutation::BoardDeleted { board_id } => {
            if boards.delete(*board_id) {
                Ok(Applied::BoardDeleted {
                    board_id: *board_id,
                    new_active: boards.active_id(),
                })
            } else {
                Ok(Applied::Ignored)
            }
        }
    }
}

/// One participant's view of a room.
pub struct Session<S = Box<dyn StrokeSurface>> {
    role: Role,
    display_name: String,
    room: Option<String>,
    boards: BoardSet<S>,
    bus: EventBus,
    tools: ToolSelection,
    registry: ToolRegistry,
    clipboard: Clipboard,
    roster: Vec<RosterEntry>,
    connection: ConnectionState,
    reconnect: ReconnectPolicy,
    /// Set by the first successful connect; later connects are reconnects.
    has_connected: bool,
    outgoing: VecDeque<ClientMessage>,
    /// A history request is in flight. Host mutations are held until it is answered.
    awaiting_history: bool,
    /// Every host mutation of the room, in the order the relay should record them.
    journal: Vec<Mutation>,
    /// Length of the journal prefix the relay last reported holding.
    confirmed: usize,
}

impl<S: StrokeSurface> Session<S> {
    /// Create a session around an injected board set.
    pub fn new(role: Role, display_name: impl Into<String>, boards: BoardSet<S>) -> Self {
        Self {
            role,
            display_name: display_name.into(),
            room: None,
            boards,
            bus: EventBus::new(),
            tools: ToolSelection::new(),
            registry: ToolRegistry::new(),
            clipboard: Clipboard::default(),
            roster: Vec::new(),
            connection: ConnectionState::Disconnected,
            reconnect: ReconnectPolicy::for_role(role),
            has_connected: false,
            outgoing: VecDeque::new(),
            awaiting_history: false,
            journal: Vec::new(),
            confirmed: 0,
        }
    }

    /// Build a session from validated configuration. Joins the configured
    /// room, if any, as soon as the transport connects.
    pub fn from_config(config: &SessionConfig, factory: impl SurfaceFactory<S> + 'static) -> BoardResult<Self> {
        config.validate()?;
        let boards = BoardSet::new(factory).with_board_size(config.board_width, config.board_height);
        let mut session =
            Self::new(config.role, config.display_name.clone(), boards).with_reconnect(config.reconnect_policy());
        if !config.room.is_empty() {
            session.join_room(config.room.clone());
        }
        Ok(session)
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    pub fn boards(&self) -> &BoardSet<S> {
        &self.boards
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn is_awaiting_history(&self) -> bool {
        self.awaiting_history
    }

    pub fn tools(&self) -> &ToolSelection {
        &self.tools
    }

    /// The current tool. Adjustments affect only points drawn afterwards.
    pub fn tools_mut(&mut self) -> &mut ToolSelection {
        &mut self.tools
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&BoardEvent) + 'static) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // --- Host operations ---

    pub fn create_board(&mut self) -> BoardResult<BoardId> {
        match self.commit(Mutation::BoardCreated)? {
            Applied::BoardCreated(id) => Ok(id),
            other => Err(BoardError::InvalidInput(format!("unexpected result {other:?}"))),
        }
    }

    pub fn switch_to(&mut self, board_id: BoardId) -> BoardResult<()> {
        self.commit(Mutation::BoardSwitched { board_id }).map(|_| ())
    }

    /// Rename a board. Returns false, and sends nothing, if the board is unknown.
    pub fn rename(&mut self, board_id: BoardId, new_name: impl Into<String>) -> BoardResult<bool> {
        let applied = self.commit(Mutation::BoardRenamed {
            board_id,
            new_name: new_name.into(),
        })?;
        Ok(applied != Applied::Ignored)
    }

    /// Delete a board. Returns false, and sends nothing, if the board is unknown.
    pub fn delete(&mut self, board_id: BoardId) -> BoardResult<bool> {
        let applied = self.commit(Mutation::BoardDeleted { board_id })?;
        Ok(applied != Applied::Ignored)
    }

    /// Draw a point on the active board with the current tool. `x` and `y`
    /// are surface coordinates, already adjusted for scrolling.
    pub fn add_point(&mut self, x: f64, y: f64, dragging: bool) -> BoardResult<()> {
        let board_id = self.active_board()?;
        let tool = self.tools.snapshot();
        self.commit(Mutation::point(board_id, x, y, dragging, tool)).map(|_| ())
    }

    /// End the current stroke on the active board.
    pub fn add_break(&mut self) -> BoardResult<()> {
        let board_id = self.active_board()?;
        self.commit(Mutation::stroke_break(board_id)).map(|_| ())
    }

    /// Replace the clipboard with the active board's points inside `region`.
    /// Returns false when there is no active board.
    pub fn copy(&mut self, region: Rect) -> BoardResult<bool> {
        self.require_host()?;
        match self.boards.copy(region) {
            Some(clipboard) => {
                self.clipboard = clipboard;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replay the clipboard onto the active board at `target`, replicating
    /// every point. Returns the number of events appended.
    pub fn paste(&mut self, target: Point) -> BoardResult<usize> {
        self.require_host()?;
        let Some(board_id) = self.boards.active_id() else {
            return Ok(0);
        };
        let ops = self.clipboard.paste_ops(target);
        for op in &ops {
            let mutation = match op.as_point() {
                Some(p) => Mutation::point(board_id, p.x, p.y, p.continues, p.tool.clone()),
                None => Mutation::stroke_break(board_id),
            };
            self.commit(mutation)?;
        }
        Ok(ops.len())
    }

    // --- Viewer operations ---

    /// Send a question to the host.
    pub fn ask_question(&mut self, text: impl Into<String>) -> BoardResult<()> {
        if self.role == Role::Host {
            return Err(BoardError::InvalidInput("the host cannot ask questions".to_string()));
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(BoardError::InvalidInput("empty question".to_string()));
        }
        self.outgoing.push_back(ClientMessage::Question { text });
        Ok(())
    }

    // --- Room membership ---

    /// Join `room`. The join goes out ahead of anything already queued.
    pub fn join_room(&mut self, room: impl Into<String>) {
        let room = room.into();
        log::info!("Joining room {} as {:?}", room, self.role);
        if self.room.as_deref().is_some_and(|current| current != room) {
            self.forget_journal();
        }
        if self.connection == ConnectionState::Connected {
            self.queue_setup(&room);
        } else {
            let join = self.join_message(&room);
            self.outgoing
                .retain(|msg| !matches!(msg, ClientMessage::Join { .. }));
            self.outgoing.push_front(join);
        }
        self.room = Some(room);
    }

    pub fn leave_room(&mut self) {
        if self.room.take().is_some() {
            self.outgoing.push_back(ClientMessage::Leave);
        }
        self.roster.clear();
        self.awaiting_history = false;
        self.forget_journal();
    }

    // --- Transport ---

    /// Feed one transport event. Fails only when the very first connect
    /// attempt fails, or when an inbound message cannot be applied.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> BoardResult<()> {
        match event {
            TransportEvent::Connected => {
                let reconnect = self.has_connected;
                self.has_connected = true;
                self.on_connected(reconnect);
                Ok(())
            }
            TransportEvent::Disconnected => {
                let state = if self.has_connected && self.reconnect.enabled {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Disconnected
                };
                log::info!("Connection lost, now {:?}", state);
                self.set_connection(state);
                Ok(())
            }
            TransportEvent::Error { message } if !self.has_connected => {
                self.set_connection(ConnectionState::Error);
                Err(BoardError::Channel(message))
            }
            TransportEvent::Error { message } => {
                log::warn!("Connection error mid-session: {}", message);
                let state = if self.reconnect.enabled {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Error
                };
                self.set_connection(state);
                Ok(())
            }
            TransportEvent::Message(text) => self.handle_message(&text),
        }
    }

    fn on_connected(&mut self, reconnect: bool) {
        self.set_connection(ConnectionState::Connected);
        let Some(room) = self.room.clone() else {
            return;
        };
        if self.role == Role::Host {
            log::info!(
                "{} to {}, requesting history ({} mutations unconfirmed)",
                if reconnect { "Reconnected" } else { "Connected" },
                room,
                self.journal.len().saturating_sub(self.confirmed)
            );
        }
        self.queue_setup(&room);
    }

    /// Queue the join, plus the history request for a host. The room may hold
    /// history from an earlier host session, and the host's board ids must
    /// continue from it, so queued host mutations wait for the answer and are
    /// resent from the journal.
    fn queue_setup(&mut self, room: &str) {
        let host = self.role == Role::Host;
        self.outgoing.retain(|msg| match msg {
            ClientMessage::Join { .. } | ClientMessage::HistoryRequest | ClientMessage::Leave => false,
            ClientMessage::Mutation { .. } => !host,
            ClientMessage::Question { .. } => true,
        });
        if host {
            self.awaiting_history = true;
            self.outgoing.push_front(ClientMessage::HistoryRequest);
        }
        let join = self.join_message(room);
        self.outgoing.push_front(join);
    }

    /// Parse and apply one server message.
    pub fn handle_message(&mut self, json: &str) -> BoardResult<()> {
        let msg: ServerMessage = serde_json::from_str(json)?;
        match msg {
            ServerMessage::Joined { room, roster } => {
                log::info!("Joined room {} with {} participants", room, roster.len());
                self.room = Some(room);
                self.set_roster(roster);
            }
            ServerMessage::RosterChanged { entries } => self.set_roster(entries),
            ServerMessage::Mutation { mutation } => {
                if self.role == Role::Host {
                    log::warn!("Host ignoring inbound mutation {:?}", mutation);
                } else {
                    log::debug!("Applying {:?}", mutation);
                    self.apply(&mutation, ApplyMode::LIVE)?;
                }
            }
            ServerMessage::HistoryReplay { mutations } => {
                if self.role == Role::Host && !self.awaiting_history {
                    log::warn!("Ignoring unrequested history of {} mutations", mutations.len());
                } else {
                    self.replay_history(&mutations);
                }
            }
            ServerMessage::Question { from, text } => {
                self.bus.publish(&BoardEvent::QuestionReceived { from, text });
            }
            ServerMessage::Error { message } => return Err(BoardError::Channel(message)),
        }
        Ok(())
    }

    /// Rebuild the board set from `history`. A host then re-applies and
    /// resends its own mutations the relay has not recorded.
    fn replay_history(&mut self, history: &[Mutation]) {
        let (unrecorded, mut old_next) = match self.role {
            Role::Host => self.unrecorded(history),
            Role::Viewer => (Vec::new(), FIRST_BOARD_ID),
        };
        self.boards.reset();

        let mut applied = 0;
        let mut skipped = 0;
        for mutation in history {
            match self.apply(mutation, ApplyMode::RECONNECT) {
                Ok(_) => applied += 1,
                Err(e) => {
                    log::warn!("Skipping replayed mutation {:?}: {}", mutation, e);
                    skipped += 1;
                }
            }
        }

        if self.role == Role::Host {
            self.journal = history.to_vec();
            self.confirmed = history.len();
        }

        // Boards created locally are renumbered to follow the history.
        let mut renumbered: HashMap<BoardId, BoardId> = HashMap::new();
        for mut mutation in unrecorded {
            if let Some(board_id) = mutation.board_id_mut() {
                if let Some(new_id) = renumbered.get(&*board_id) {
                    *board_id = *new_id;
                }
            }
            match self.apply(&mutation, ApplyMode::RECONNECT) {
                Ok(Applied::Ignored) => continue,
                Ok(Applied::BoardCreated(new_id)) => {
                    renumbered.insert(BoardId(old_next), new_id);
                    old_next += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Dropping local mutation {:?}: {}", mutation, e);
                    skipped += 1;
                    continue;
                }
            }
            applied += 1;
            self.journal.push(mutation.clone());
            self.outgoing.push_back(ClientMessage::Mutation { mutation });
        }

        self.awaiting_history = false;
        log::info!("History replayed: {} applied, {} skipped", applied, skipped);
        self.bus.publish(&BoardEvent::HistoryReplayed { applied, skipped });
    }

    /// Journal entries missing from `history`, with the board id the first
    /// of them would have created.
    fn unrecorded(&self, history: &[Mutation]) -> (Vec<Mutation>, u64) {
        let start = if self.journal.starts_with(history) {
            history.len()
        } else {
            log::info!(
                "Room history of {} mutations was not written by this session; appending {} local mutations",
                history.len(),
                self.journal.len().saturating_sub(self.confirmed)
            );
            self.confirmed.min(self.journal.len())
        };
        let created = self.journal[..start]
            .iter()
            .filter(|m| matches!(m, Mutation::BoardCreated))
            .count() as u64;
        (self.journal[start..].to_vec(), FIRST_BOARD_ID + created)
    }

    /// Drain the outbound queue as JSON. Empty while not connected; queued
    /// messages wait for the next connection.
    pub fn take_outgoing(&mut self) -> BoardResult<Vec<String>> {
        if self.connection != ConnectionState::Connected {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(self.outgoing.len());
        while let Some(msg) = self.outgoing.pop_front() {
            out.push(serde_json::to_string(&msg)?);
        }
        Ok(out)
    }

    /// Number of messages waiting to be sent.
    pub fn pending_outgoing(&self) -> usize {
        self.outgoing.len()
    }

    /// Paint the active board. Call once per frame.
    pub fn frame(&mut self) -> usize {
        self.boards.render_frame()
    }

    // --- Internals ---

    fn apply(&mut self, mutation: &Mutation, mode: ApplyMode) -> BoardResult<Applied> {
        let applied = apply_mutation(&mut self.boards, mutation)?;
        if !mode.reconnect {
            if let Some(event) = applied.event() {
                self.bus.publish(&event);
            }
        }
        Ok(applied)
    }

    /// Apply a local host mutation and queue it for the relay.
    fn commit(&mut self, mutation: Mutation) -> BoardResult<Applied> {
        self.require_host()?;
        let applied = self.apply(&mutation, ApplyMode::LIVE)?;
        if applied != Applied::Ignored {
            self.journal.push(mutation.clone());
            if !self.awaiting_history {
                self.outgoing.push_back(ClientMessage::Mutation { mutation });
            }
        }
        Ok(applied)
    }

    fn forget_journal(&mut self) {
        self.journal.clear();
        self.confirmed = 0;
    }

    fn require_host(&self) -> BoardResult<()> {
        match self.role {
            Role::Host => Ok(()),
            Role::Viewer => Err(BoardError::ReadOnly),
        }
    }

    fn active_board(&self) -> BoardResult<BoardId> {
        self.require_host()?;
        self.boards
            .active_id()
            .ok_or_else(|| BoardError::InvalidInput("no active board".to_string()))
    }

    fn join_message(&self, room: &str) -> ClientMessage {
        ClientMessage::Join {
            room: room.to_string(),
            role: self.role,
            display_name: self.display_name.clone(),
        }
    }

    fn set_roster(&mut self, entries: Vec<RosterEntry>) {
        self.roster = entries.clone();
        self.bus.publish(&BoardEvent::RosterChanged { entries });
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            self.connection = state;
            self.bus.publish(&BoardEvent::ConnectionChanged { state });
        }
    }
}
