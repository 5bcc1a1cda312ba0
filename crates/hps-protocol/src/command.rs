//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Command dispatch and acknowledgment protocol."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use hps_telemetry::Relay;

/// Unique identifier per dispatch. Monotonic counter starting at 1;
/// uniqueness is the only contract, terminal ids are never reused.
pub type CommandId = u64;

/// Fixed actuation vocabulary of the remote controller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandName {
    /// Toggle the solar input relay.
    Solar,
    /// Toggle the wind input relay.
    Wind,
    /// Toggle the grid backup relay.
    Grid,
    /// Toggle the consumer load relay.
    Load,
    /// Toggle the brake resistor relay.
    Brake,
    /// Emergency stop: open every relay. Takes no parameter.
    AllOff,
}

impl CommandName {
    /// The relay this command actuates; `None` for `all_off`.
    pub fn relay(&self) -> Option<Relay> {
        match self {
            CommandName::Solar => Some(Relay::Solar),
            CommandName::Wind => Some(Relay::Wind),
            CommandName::Grid => Some(Relay::Grid),
            CommandName::Load => Some(Relay::Load),
            CommandName::Brake => Some(Relay::Brake),
            CommandName::AllOff => None,
        }
    }
}

/// Relay command parameter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelayAction {
    /// Close the relay (connect).
    On,
    /// Open the relay (disconnect).
    Off,
}

/// JSON frame handed to the transport.
///
/// Wire shape matches the embedded controller firmware:
/// `{"type":"command","id":3,"command":"wind","parameter":"off"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    /// Frame discriminator, always `"command"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dispatch identifier echoed back in the acknowledgment.
    pub id: CommandId,
    /// Command name.
    pub command: CommandName,
    /// Relay parameter; absent for `all_off`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<RelayAction>,
}

impl CommandFrame {
    /// Build a command frame for the wire.
    pub fn new(id: CommandId, command: CommandName, parameter: Option<RelayAction>) -> Self {
        Self {
            kind: "command".to_owned(),
            id,
            command,
            parameter,
        }
    }
}

/// Lifecycle state of a dispatched command. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandState {
    /// Sent, no acknowledgment yet.
    AwaitingAck,
    /// Positively acknowledged by the device.
    Acked,
    /// No acknowledgment within the budget; relay position unknown.
    TimedOut,
    /// Transport failure, device rejection, or device removal.
    Failed,
}

impl CommandState {
    /// Whether this state accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandState::AwaitingAck)
    }
}

/// Resolution observed by an ack waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandOutcome {
    /// Device confirmed the command.
    Acked,
    /// The acknowledgment budget elapsed; the relay state is unknown.
    TimedOut,
    /// The transport failed or the device rejected the command.
    Failed,
    /// The device was unregistered while the command was in flight.
    DeviceRemoved,
}

impl CommandOutcome {
    /// The terminal command state this outcome maps to.
    pub fn state(&self) -> CommandState {
        match self {
            CommandOutcome::Acked => CommandState::Acked,
            CommandOutcome::TimedOut => CommandState::TimedOut,
            CommandOutcome::Failed | CommandOutcome::DeviceRemoved => CommandState::Failed,
        }
    }
}

/// One dispatched command, tracked from send until resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCommand {
    /// Dispatch identifier.
    pub command_id: CommandId,
    /// Target device.
    pub device_id: String,
    /// Command name.
    pub command: CommandName,
    /// Relay parameter; absent for `all_off`.
    pub parameter: Option<RelayAction>,
    /// When the frame was handed to the transport.
    pub dispatched_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: CommandState,
}
