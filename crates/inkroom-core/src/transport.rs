//! WebSocket clients carrying protocol messages to and from the relay.
//!
//! Both clients are polled: the embedding loop calls `poll_events()` once per
//! frame and feeds every [`TransportEvent`] to the session.

use crate::config::ReconnectPolicy;

/// Connection state as seen by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The connection dropped mid-session and a new attempt is pending.
    Reconnecting,
    Error,
}

/// Events from a WebSocket client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// A text frame, not yet parsed.
    Message(String),
    Error { message: String },
}

// ============================================================================
// WASM WebSocket Client
// ============================================================================

#[cfg(target_arch = "wasm32")]
mod wasm_client {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

    /// WebSocket client for the browser.
    ///
    /// Callbacks queue events; call `poll_events()` to drain them. The browser
    /// offers no blocking reconnect, so after a drop the caller reconnects by
    /// calling `connect()` again once its backoff delay has elapsed.
    pub struct WasmWebSocket {
        ws: Option<WebSocket>,
        state: ConnectionState,
        policy: ReconnectPolicy,
        events: Rc<RefCell<Vec<TransportEvent>>>,
        // Keep the callbacks alive as long as the socket.
        _on_open: Option<Closure<dyn Fn()>>,
        _on_message: Option<Closure<dyn Fn(MessageEvent)>>,
        _on_close: Option<Closure<dyn Fn(CloseEvent)>>,
        _on_error: Option<Closure<dyn Fn(ErrorEvent)>>,
    }

    impl WasmWebSocket {
        pub fn new(policy: ReconnectPolicy) -> Self {
            Self {
                ws: None,
                state: ConnectionState::Disconnected,
                policy,
                events: Rc::new(RefCell::new(Vec::new())),
                _on_open: None,
                _on_message: None,
                _on_close: None,
                _on_error: None,
            }
        }

        /// Open a socket to `url`. Allowed again after the previous socket closed.
        pub fn connect(&mut self, url: &str) -> Result<(), String> {
            if self.ws.is_some() && matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
                return Err("Already connected".to_string());
            }
            self.release();

            let ws = WebSocket::new(url).map_err(|e| format!("Failed to create WebSocket: {:?}", e))?;
            ws.set_binary_type(web_sys::BinaryType::Arraybuffer);
            self.state = ConnectionState::Connecting;

            let events_open = self.events.clone();
            let on_open = Closure::wrap(Box::new(move || {
                events_open.borrow_mut().push(TransportEvent::Connected);
            }) as Box<dyn Fn()>);
            ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

            let events_msg = self.events.clone();
            let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
                if let Ok(txt) = e.data().dyn_into::<js_sys::JsString>() {
                    events_msg.borrow_mut().push(TransportEvent::Message(txt.into()));
                }
            }) as Box<dyn Fn(MessageEvent)>);
            ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

            let events_close = self.events.clone();
            let on_close = Closure::wrap(Box::new(move |_e: CloseEvent| {
                events_close.borrow_mut().push(TransportEvent::Disconnected);
            }) as Box<dyn Fn(CloseEvent)>);
            ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

            let events_err = self.events.clone();
            let on_error = Closure::wrap(Box::new(move |_e: ErrorEvent| {
                events_err.borrow_mut().push(TransportEvent::Error {
                    message: "WebSocket error".to_string(),
                });
            }) as Box<dyn Fn(ErrorEvent)>);
            ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            self.ws = Some(ws);
            self._on_open = Some(on_open);
            self._on_message = Some(on_message);
            self._on_close = Some(on_close);
            self._on_error = Some(on_error);
            Ok(())
        }

        fn release(&mut self) {
            if let Some(ws) = self.ws.take() {
                let _ = ws.close();
            }
            self._on_open = None;
            self._on_message = None;
            self._on_close = None;
            self._on_error = None;
        }

        pub fn disconnect(&mut self) {
            self.release();
            self.state = ConnectionState::Disconnected;
        }

        pub fn send(&self, msg: &str) -> Result<(), String> {
            match &self.ws {
                Some(ws) if self.state == ConnectionState::Connected => {
                    ws.send_with_str(msg).map_err(|e| format!("Send failed: {:?}", e))
                }
                _ => Err("Not connected".to_string()),
            }
        }

        pub fn poll_events(&mut self) -> Vec<TransportEvent> {
            let mut events = self.events.borrow_mut();
            for event in events.iter() {
                match event {
                    TransportEvent::Connected => self.state = ConnectionState::Connected,
                    TransportEvent::Disconnected if self.policy.enabled => {
                        self.state = ConnectionState::Reconnecting
                    }
                    TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    TransportEvent::Error { .. } => self.state = ConnectionState::Error,
                    TransportEvent::Message(_) => {}
                }
            }
            std::mem::take(&mut *events)
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn policy(&self) -> &ReconnectPolicy {
            &self.policy
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for WasmWebSocket {
        fn default() -> Self {
            Self::new(ReconnectPolicy::disabled())
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_client::WasmWebSocket;

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::net::TcpStream;
    use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket, connect};
    use url::Url;

    enum WsCommand {
        Send(String),
        Close,
    }

    /// Why a connected socket loop ended.
    #[derive(Debug, PartialEq, Eq)]
    enum SocketEnd {
        /// Local close or the client was dropped.
        Closed,
        /// Server close frame or an I/O failure.
        Dropped,
    }

    /// WebSocket client for native platforms.
    ///
    /// A background thread owns the socket and reconnects with exponential
    /// backoff when the policy allows it. The initial connect is never retried.
    pub struct NativeWebSocket {
        state: ConnectionState,
        policy: ReconnectPolicy,
        events: Vec<TransportEvent>,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<TransportEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new(policy: ReconnectPolicy) -> Self {
            Self {
                state: ConnectionState::Disconnected,
                policy,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        pub fn connect(&mut self, url: &str) -> Result<(), String> {
            if self.cmd_tx.is_some() {
                return Err("Already connected".to_string());
            }

            let parsed_url = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(format!("Invalid WebSocket URL scheme: {}", parsed_url.scheme()));
            }

            self.state = ConnectionState::Connecting;
            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let url = url.to_string();
            let policy = self.policy.clone();

            let handle = thread::spawn(move || run_connection(&url, &policy, &cmd_rx, &event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        pub fn send(&self, msg: &str) -> Result<(), String> {
            if let Some(ref tx) = self.cmd_tx {
                tx.send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| format!("Send failed: {}", e))
            } else {
                Err("Not connected".to_string())
            }
        }

        pub fn poll_events(&mut self) -> Vec<TransportEvent> {
            let mut finished = false;
            if let Some(ref rx) = self.event_rx {
                loop {
                    match rx.try_recv() {
                        Ok(event) => {
                            self.state = next_state(self.state, &event, &self.policy);
                            self.events.push(event);
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            finished = true;
                            break;
                        }
                    }
                }
            }
            if finished {
                // The connection thread gave up; allow a fresh connect().
                self.cmd_tx = None;
                self.event_rx = None;
                self._thread = None;
                if self.state == ConnectionState::Reconnecting {
                    self.state = ConnectionState::Disconnected;
                }
            }
            std::mem::take(&mut self.events)
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new(ReconnectPolicy::disabled())
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    fn next_state(
        current: ConnectionState,
        event: &TransportEvent,
        policy: &ReconnectPolicy,
    ) -> ConnectionState {
        match event {
            TransportEvent::Connected => ConnectionState::Connected,
            TransportEvent::Disconnected if policy.enabled => ConnectionState::Reconnecting,
            TransportEvent::Disconnected => ConnectionState::Disconnected,
            TransportEvent::Error { .. } if current == ConnectionState::Reconnecting => {
                ConnectionState::Reconnecting
            }
            TransportEvent::Error { .. } => ConnectionState::Error,
            TransportEvent::Message(_) => current,
        }
    }

    fn run_connection(
        url: &str,
        policy: &ReconnectPolicy,
        cmd_rx: &Receiver<WsCommand>,
        event_tx: &Sender<TransportEvent>,
    ) {
        let mut delay = policy.initial_delay();
        let mut connected_once = false;

        loop {
            log::info!("WebSocket thread: connecting to {}", url);
            match connect(url) {
                Ok((mut socket, response)) => {
                    log::info!("WebSocket connected, status: {}", response.status());
                    connected_once = true;
                    delay = policy.initial_delay();
                    let _ = event_tx.send(TransportEvent::Connected);

                    let end = pump(&mut socket, cmd_rx, event_tx);
                    let _ = event_tx.send(TransportEvent::Disconnected);
                    if end == SocketEnd::Closed || !policy.enabled {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("WebSocket connection failed: {}", e);
                    let _ = event_tx.send(TransportEvent::Error {
                        message: format!("Connection failed: {}", e),
                    });
                    if !connected_once || !policy.enabled {
                        break;
                    }
                }
            }

            log::info!("WebSocket reconnecting in {} ms", delay.as_millis());
            if !wait_before_retry(cmd_rx, delay) {
                break;
            }
            delay = policy.next_delay(delay);
        }
        log::info!("WebSocket thread exiting");
    }

    /// Sleep for `delay` while draining commands. Returns false if the client
    /// asked to close. Sends issued while offline are dropped; after the next
    /// connect the session compares its journal with the room history and
    /// resends what the relay is missing.
    fn wait_before_retry(cmd_rx: &Receiver<WsCommand>, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match cmd_rx.recv_timeout(remaining) {
                Ok(WsCommand::Send(_)) => log::warn!("WebSocket offline, dropping outgoing message"),
                Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return false,
                Err(RecvTimeoutError::Timeout) => return true,
            }
        }
    }

    fn pump(
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
        cmd_rx: &Receiver<WsCommand>,
        event_tx: &Sender<TransportEvent>,
    ) -> SocketEnd {
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => log::debug!("TLS or other stream - using default timeout handling"),
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::debug!("WebSocket sending: {}", preview(&msg));
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        return SocketEnd::Dropped;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    return SocketEnd::Closed;
                }
                Err(TryRecvError::Disconnected) => return SocketEnd::Closed,
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    log::debug!("WebSocket received: {}", preview(&txt));
                    let _ = event_tx.send(TransportEvent::Message(txt));
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    return SocketEnd::Dropped;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    return SocketEnd::Dropped;
                }
            }
        }
    }

    fn preview(msg: &str) -> &str {
        let mut end = msg.len().min(100);
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        &msg[..end]
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_rejects_non_websocket_url() {
            let mut ws = NativeWebSocket::default();
            assert!(ws.connect("http://localhost:3030/ws").is_err());
            assert!(ws.connect("not a url").is_err());
            assert_eq!(ws.state(), ConnectionState::Disconnected);
        }

        #[test]
        fn test_send_without_connection() {
            let ws = NativeWebSocket::default();
            assert!(ws.send("{}").is_err());
        }

        #[test]
        fn test_state_transitions() {
            let host = ReconnectPolicy::host();
            let viewer = ReconnectPolicy::disabled();
            let dropped = TransportEvent::Disconnected;

            assert_eq!(
                next_state(ConnectionState::Connected, &dropped, &host),
                ConnectionState::Reconnecting
            );
            assert_eq!(
                next_state(ConnectionState::Connected, &dropped, &viewer),
                ConnectionState::Disconnected
            );
            let failed = TransportEvent::Error { message: "refused".into() };
            assert_eq!(
                next_state(ConnectionState::Reconnecting, &failed, &host),
                ConnectionState::Reconnecting
            );
            assert_eq!(
                next_state(ConnectionState::Connecting, &failed, &host),
                ConnectionState::Error
            );
        }

        #[test]
        fn test_preview_respects_char_boundaries() {
            let text = "é".repeat(80);
            assert!(preview(&text).len() <= 100);
        }

        #[test]
        fn test_initial_connect_failure_reports_error() {
            // Port 1 on localhost refuses connections.
            let mut ws = NativeWebSocket::new(ReconnectPolicy::host());
            ws.connect("ws://127.0.0.1:1/ws").unwrap();

            let deadline = Instant::now() + Duration::from_secs(5);
            let mut events = Vec::new();
            while Instant::now() < deadline && events.is_empty() {
                events = ws.poll_events();
                thread::sleep(Duration::from_millis(10));
            }
            assert!(matches!(events.first(), Some(TransportEvent::Error { .. })));
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

/// Platform-specific WebSocket client.
#[cfg(target_arch = "wasm32")]
pub type PlatformWebSocket = WasmWebSocket;

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformWebSocket = NativeWebSocket;
