//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Command dispatch and acknowledgment protocol."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::ack::{AckNotification, AckStatus};
use crate::command::CommandFrame;

/// Errors surfaced by command transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not hand the frame to the device link.
    #[error("transport send failed: {0}")]
    Send(String),
    /// Raised when a transport backend is not yet implemented.
    #[error("transport not yet implemented: {0}")]
    Unimplemented(&'static str),
    /// Frame encoding problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport result alias.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Device link abstraction used by the dispatcher and the ack pump.
///
/// Encoding and delivery are the collaborator's concern; the protocol only
/// hands over frames and drains acknowledgments.
pub trait Transport: Send + Sync {
    /// Hand a command frame to the device link.
    fn send(&self, device_id: &str, frame: &CommandFrame) -> Result<()>;
    /// Drain the next acknowledgment, if one has arrived.
    fn poll_ack(&self) -> Option<AckNotification>;
    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

/// In-memory transport backed by mutex protected queues.
///
/// In loopback mode every sent frame is acknowledged immediately, which
/// lets the full control loop run without hardware (simulation mode).
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    sent: Mutex<VecDeque<(String, CommandFrame)>>,
    acks: Mutex<VecDeque<AckNotification>>,
    loopback: bool,
}

impl InMemoryTransport {
    /// Transport that only records frames; acks are pushed by the test.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that immediately acknowledges every frame.
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Inject an acknowledgment, as a remote device would.
    pub fn push_ack(&self, ack: AckNotification) {
        self.acks.lock().push_back(ack);
    }

    /// Drain the frames sent so far (test helper).
    pub fn take_sent(&self) -> Vec<(String, CommandFrame)> {
        self.sent.lock().drain(..).collect()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, device_id: &str, frame: &CommandFrame) -> Result<()> {
        self.sent
            .lock()
            .push_back((device_id.to_owned(), frame.clone()));
        if self.loopback {
            self.push_ack(AckNotification {
                command_id: frame.id,
                status: AckStatus::Acked,
            });
        }
        Ok(())
    }

    fn poll_ack(&self) -> Option<AckNotification> {
        self.acks.lock().pop_front()
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Placeholder WebSocket transport; the production device link lives in a
/// separate deployment component.
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn send(&self, _device_id: &str, _frame: &CommandFrame) -> Result<()> {
        Err(TransportError::Unimplemented("websocket transport"))
    }

    fn poll_ack(&self) -> Option<AckNotification> {
        None
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandName, RelayAction};

    #[test]
    fn in_memory_records_frames_in_order() {
        let transport = InMemoryTransport::new();
        transport
            .send("dev1", &CommandFrame::new(1, CommandName::Wind, Some(RelayAction::Off)))
            .expect("send");
        transport
            .send("dev1", &CommandFrame::new(2, CommandName::Brake, Some(RelayAction::On)))
            .expect("send");

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.command, CommandName::Wind);
        assert_eq!(sent[1].1.command, CommandName::Brake);
        assert!(transport.poll_ack().is_none());
    }

    #[test]
    fn loopback_acknowledges_every_frame() {
        let transport = InMemoryTransport::loopback();
        transport
            .send("dev1", &CommandFrame::new(7, CommandName::Solar, Some(RelayAction::On)))
            .expect("send");
        let ack = transport.poll_ack().expect("ack queued");
        assert_eq!(ack.command_id, 7);
        assert_eq!(ack.status, AckStatus::Acked);
    }

    #[test]
    fn placeholder_transport_returns_unimplemented() {
        let ws = WebSocketTransport;
        let err = ws
            .send("dev1", &CommandFrame::new(1, CommandName::AllOff, None))
            .unwrap_err();
        assert!(matches!(err, TransportError::Unimplemented("websocket transport")));
    }
}
