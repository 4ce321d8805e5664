use crate::fleet::{BusStatus, MAX_FLEET_SIZE};
use crate::telemetry::{current_timestamp_ms, TelemetryFrame};
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

pub const MAX_COMMAND_SIZE: usize = 512;
pub const MAX_RESPONSE_SIZE: usize = 64 * 1024;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub type CommandBuffer = ArrayString<MAX_COMMAND_SIZE>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub timestamp: u64,
    pub command_type: CommandType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandType {
    Ping,
    FleetStatus,
    GetFleet,
    GetBus { bus_id: String },
    StopArrivals { stop: String },
    SetBusStatus { bus_id: String, status: BusStatus },
    Restart { bus_count: usize },
    Subscribe,
}

impl CommandType {
    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Ping => "Ping",
            CommandType::FleetStatus => "FleetStatus",
            CommandType::GetFleet => "GetFleet",
            CommandType::GetBus { .. } => "GetBus",
            CommandType::StopArrivals { .. } => "StopArrivals",
            CommandType::SetBusStatus { .. } => "SetBusStatus",
            CommandType::Restart { .. } => "Restart",
            CommandType::Subscribe => "Subscribe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u32,
    pub timestamp: u64,
    pub status: ResponseStatus,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    Error,
    InvalidCommand,
    NotFound,
    /// Connection now receives telemetry frames.
    Subscribed,
    ParseError,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Message exceeds buffer size")]
    MessageTooLarge,
    #[error("Serialization failed")]
    SerializationError,
    #[error("Invalid command")]
    InvalidCommand,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug)]
pub struct ProtocolHandler {
    command_counter: u32,
    command_buffer: CommandBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            command_counter: 0,
            command_buffer: ArrayString::new(),
        }
    }

    pub fn parse_command(&mut self, json_str: &str) -> Result<Command, ProtocolError> {
        self.command_buffer.clear();
        let trimmed = json_str.trim();
        self.command_buffer
            .try_push_str(trimmed)
            .map_err(|_| ProtocolError::MessageTooLarge)?;

        serde_json::from_str::<Command>(&self.command_buffer).map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn validate_command(&self, command: &Command) -> Result<(), ProtocolError> {
        if command.id == 0 {
            return Err(ProtocolError::InvalidCommand);
        }

        match &command.command_type {
            CommandType::Restart { bus_count } => {
                if *bus_count == 0 || *bus_count > MAX_FLEET_SIZE {
                    return Err(ProtocolError::InvalidParameter(format!(
                        "bus_count must be between 1 and {}",
                        MAX_FLEET_SIZE
                    )));
                }
            }
            CommandType::GetBus { bus_id } | CommandType::SetBusStatus { bus_id, .. } => {
                if bus_id.trim().is_empty() {
                    return Err(ProtocolError::InvalidParameter("bus_id must not be empty".into()));
                }
            }
            CommandType::StopArrivals { stop } => {
                if stop.trim().is_empty() {
                    return Err(ProtocolError::InvalidParameter("stop must not be empty".into()));
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn serialize_response(&self, response: &CommandResponse) -> Result<String, ProtocolError> {
        let json_str = serde_json::to_string(response).map_err(|_| ProtocolError::SerializationError)?;
        if json_str.len() > MAX_RESPONSE_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        Ok(json_str)
    }

    pub fn serialize_frame(&self, frame: &TelemetryFrame) -> Result<String, ProtocolError> {
        let json_str = serde_json::to_string(frame).map_err(|_| ProtocolError::SerializationError)?;
        if json_str.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        Ok(json_str)
    }

    pub fn create_response(&self, command_id: u32, status: ResponseStatus, message: Option<&str>) -> CommandResponse {
        CommandResponse {
            id: command_id,
            timestamp: current_timestamp_ms(),
            status,
            message: message.map(ToString::to_string),
            payload: None,
        }
    }

    pub fn create_payload_response<T: Serialize>(
        &self,
        command_id: u32,
        payload: &T,
    ) -> Result<CommandResponse, ProtocolError> {
        let value = serde_json::to_value(payload).map_err(|_| ProtocolError::SerializationError)?;
        let mut response = self.create_response(command_id, ResponseStatus::Success, None);
        response.payload = Some(value);
        Ok(response)
    }

    /// Response for a line that could not be parsed into a command at all.
    pub fn create_parse_error_response(&self, error: &ProtocolError) -> CommandResponse {
        self.create_response(0, ResponseStatus::ParseError, Some(&format!("Invalid command format: {}", error)))
    }

    pub fn next_command_id(&mut self) -> u32 {
        self.command_counter = self.command_counter.wrapping_add(1);
        self.command_counter
    }

    pub fn build_command(&mut self, command_type: CommandType) -> Command {
        Command {
            id: self.next_command_id(),
            timestamp: current_timestamp_ms(),
            command_type,
        }
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}
