//! Transport seam
//!
//! The session never owns a socket. It sends through a [`Transport`] and is
//! fed decoded messages by whoever drives the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use luadbg_protocol::Message;
use luadbg_utils::{LuadbgError, Result};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Outgoing side of a debug connection
pub trait Transport {
    /// Queue a message for the runtime without blocking
    fn send_message(&self, message: Message) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Target is running under the debugger (not necessarily stopped)
    fn is_debugging(&self) -> bool;

    /// Between an update begin and its end
    fn is_update_in_progress(&self) -> bool;
}

/// Connection flags shared between a transport and its driver
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    connected: Arc<AtomicBool>,
    debugging: Arc<AtomicBool>,
    updating: Arc<AtomicBool>,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::SeqCst);
    }

    pub fn set_debugging(&self, value: bool) {
        self.debugging.store(value, Ordering::SeqCst);
    }

    pub fn set_update_in_progress(&self, value: bool) {
        self.updating.store(value, Ordering::SeqCst);
    }
}

/// [`Transport`] over a bounded channel drained by a connection task
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Message>,
    state: LinkState,
    capacity: usize,
}

impl ChannelTransport {
    /// Create a transport and the receiver the writer task drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            tx,
            state: LinkState::new(),
            capacity: capacity.max(1),
        };
        (transport, rx)
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }
}

impl Transport for ChannelTransport {
    fn send_message(&self, message: Message) -> Result<()> {
        if !self.is_connected() {
            return Err(LuadbgError::NotConnected);
        }
        trace!(type_code = ?message.type_code(), "queue message");
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => LuadbgError::SendQueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => LuadbgError::ConnectionClosed,
        })
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn is_debugging(&self) -> bool {
        self.state.debugging.load(Ordering::SeqCst)
    }

    fn is_update_in_progress(&self) -> bool {
        self.state.updating.load(Ordering::SeqCst)
    }
}
