//! Loopback peer connections
//!
//! Simulates the offer/answer handshake without a network. An initiator
//! emits an offer as soon as it is created and reports "connected" once it is
//! fed an answer. A responder answers the first offer it is fed and reports
//! "connected" right away. The connector's mode decides whether handshakes
//! complete, stall, or fail.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::trace;

use linx_core::{LinxResult, PublicKey};
use linx_topology::{LinkEvents, PeerConnection, PeerConnector, Role};

/// How new loopback connections behave
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopbackMode {
    /// Handshakes complete
    #[default]
    Complete,
    /// Offers go out but nobody ever reports connected
    Stall,
    /// Connections fail as soon as they are created or offered
    Fail,
}

#[derive(Debug, Default)]
struct Stats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// `PeerConnector` for in-process swarms
#[derive(Debug, Default)]
pub struct LoopbackConnector {
    mode: Mutex<LoopbackMode>,
    stats: Arc<Stats>,
    next_id: AtomicU64,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: LoopbackMode) -> Self {
        let connector = Self::default();
        connector.set_mode(mode);
        connector
    }

    /// Applies to connections created from now on
    pub fn set_mode(&self, mode: LoopbackMode) {
        *self.mode.lock() = mode;
    }

    pub fn mode(&self) -> LoopbackMode {
        *self.mode.lock()
    }

    /// Connections created so far
    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far
    pub fn closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }
}

impl PeerConnector for LoopbackConnector {
    fn connect(
        &self,
        role: Role,
        remote: PublicKey,
        events: LinkEvents,
    ) -> LinxResult<Box<dyn PeerConnection>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mode = self.mode();
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        trace!(id, ?role, remote = %remote.short(), ?mode, "loopback connection");

        if role == Role::Initiator {
            match mode {
                LoopbackMode::Fail => events.failed("loopback: refused"),
                _ => events.local_signal(json!({"type": "offer", "sdp": format!("loopback-{}", id)})),
            }
        }

        Ok(Box::new(LoopbackConnection {
            id,
            role,
            mode,
            events,
            state: State::Negotiating,
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Negotiating,
    Connected,
    Closed,
}

struct LoopbackConnection {
    id: u64,
    role: Role,
    mode: LoopbackMode,
    events: LinkEvents,
    state: State,
    stats: Arc<Stats>,
}

impl PeerConnection for LoopbackConnection {
    fn signal(&mut self, signal: Value) {
        if self.state != State::Negotiating {
            return;
        }

        let kind = signal.get("type").and_then(Value::as_str).unwrap_or_default();
        match (self.role, kind, self.mode) {
            (_, _, LoopbackMode::Stall) => {}
            (Role::Responder, "offer", LoopbackMode::Fail) => {
                self.events.failed("loopback: refused");
            }
            (Role::Responder, "offer", LoopbackMode::Complete) => {
                self.events
                    .local_signal(json!({"type": "answer", "sdp": format!("loopback-{}", self.id)}));
                self.events.connected();
                self.state = State::Connected;
            }
            (Role::Initiator, "answer", _) => {
                self.events.connected();
                self.state = State::Connected;
            }
            _ => {}
        }
    }

    fn close(&mut self) {
        if self.state != State::Closed {
            self.state = State::Closed;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
