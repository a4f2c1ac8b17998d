//! Connection capability consumed by players
//!
//! A player only needs to know whether its connection is still open, how to
//! close it, and how to hand an outbound packet to the network layer. Writes
//! are fire-and-forget: nothing here blocks the tick loop.

use crate::network::GameMessage;
use log::{debug, error};
use shared::{ServerPacket, SessionId};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::sync::mpsc;

pub trait Transport: Send + Sync + fmt::Debug {
    fn is_connected(&self) -> bool;

    /// Closes the connection. Closing an already closed connection is a no-op.
    fn disconnect(&self);

    /// Binds the connection to the session that owns it
    fn attach(&self, session_id: SessionId);

    fn attachment(&self) -> Option<SessionId>;

    /// Hands a packet to the network layer without waiting for delivery
    fn send(&self, packet: ServerPacket);
}

/// Transport backed by the server's UDP socket and sender task
#[derive(Debug)]
pub struct UdpTransport {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<GameMessage>,
    connected: AtomicBool,
    attachment: OnceLock<SessionId>,
}

impl UdpTransport {
    pub fn new(addr: SocketAddr, outbound: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self {
            addr,
            outbound,
            connected: AtomicBool::new(true),
            attachment: OnceLock::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.outbound.send(message) {
            error!("Failed to queue outbound message for {}: {}", self.addr, e);
        }
    }
}

impl Transport for UdpTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            debug!("Connection {} already closed", self.addr);
            return;
        }

        self.queue(GameMessage::SendPacket {
            packet: ServerPacket::Disconnected {
                reason: "Logged out".to_string(),
            },
            addr: self.addr,
        });
        self.queue(GameMessage::CloseRoute {
            addr: self.addr,
            session_id: self.attachment(),
        });
    }

    fn attach(&self, session_id: SessionId) {
        if self.attachment.set(session_id).is_err() {
            debug!("Connection {} is already attached", self.addr);
        }
    }

    fn attachment(&self) -> Option<SessionId> {
        self.attachment.get().copied()
    }

    fn send(&self, packet: ServerPacket) {
        if !self.is_connected() {
            return;
        }
        self.queue(GameMessage::SendPacket {
            packet,
            addr: self.addr,
        });
    }
}

/// In-memory transport that records everything sent through it
///
/// Used by tests and local simulations that run the world without sockets.
#[derive(Debug)]
pub struct RecordingTransport {
    connected: AtomicBool,
    attachment: OnceLock<SessionId>,
    sent: Mutex<Vec<ServerPacket>>,
    disconnects: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            attachment: OnceLock::new(),
            sent: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn sent_packets(&self) -> Vec<ServerPacket> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn game_messages(&self) -> Vec<String> {
        self.sent_packets()
            .into_iter()
            .filter_map(|packet| match packet {
                ServerPacket::GameMessage { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Number of times the connection was actually closed
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::Acquire)
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.disconnects.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn attach(&self, session_id: SessionId) {
        let _ = self.attachment.set(session_id);
    }

    fn attachment(&self) -> Option<SessionId> {
        self.attachment.get().copied()
    }

    fn send(&self, packet: ServerPacket) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(packet);
        }
    }
}
