//! Typed notifications from the session to the embedding UI.

use crate::board::BoardId;
use crate::protocol::RosterEntry;
use crate::transport::ConnectionState;

/// Something that just happened to the board set or the session.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    BoardCreated { board_id: BoardId },
    BoardSwitched { board_id: BoardId },
    BoardRenamed { board_id: BoardId, name: String },
    BoardDeleted { board_id: BoardId, new_active: Option<BoardId> },
    PointAdded { board_id: BoardId },
    RosterChanged { entries: Vec<RosterEntry> },
    QuestionReceived { from: String, text: String },
    /// A history replay finished. Published once per replay, never per mutation.
    HistoryReplayed { applied: usize, skipped: usize },
    ConnectionChanged { state: ConnectionState },
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&BoardEvent)>;

/// Process-scoped dispatcher with explicit subscriber registration.
/// Handlers run synchronously, in subscription order.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, Handler)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&BoardEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub, _)| *sub != id);
        self.handlers.len() != before
    }

    pub fn publish(&mut self, event: &BoardEvent) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_publish_reaches_subscribers_in_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&seen);
        bus.subscribe(move |_| first.borrow_mut().push("first"));
        let second = Rc::clone(&seen);
        bus.subscribe(move |_| second.borrow_mut().push("second"));

        bus.publish(&BoardEvent::BoardCreated { board_id: BoardId(1) });
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        let id = bus.subscribe(move |_| *counter.borrow_mut() += 1);

        bus.publish(&BoardEvent::PointAdded { board_id: BoardId(1) });
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&BoardEvent::PointAdded { board_id: BoardId(1) });

        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
