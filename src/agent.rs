use crate::config::SimulationConfig;
use crate::engine::{FleetWatch, SimulationEngine};
use crate::protocol::{Command, CommandResponse, CommandType, ProtocolError, ProtocolHandler, ResponseStatus};
use crate::simulation::SimulationError;
use crate::telemetry::{arrivals_for_stop, FleetSummary, TelemetryCollector, TelemetryFrame};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    pub running: bool,
    pub uptime_seconds: u64,
    pub command_count: u32,
    pub rejected_count: u32,
    pub frames_emitted: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

/// Dispatches protocol commands against the simulation engine and turns
/// snapshots into telemetry frames.
#[derive(Debug)]
pub struct FleetAgent {
    engine: SimulationEngine,
    protocol_handler: ProtocolHandler,
    telemetry_collector: TelemetryCollector,
    state: AgentState,
    start_time: Instant,
}

impl FleetAgent {
    pub fn new(config: SimulationConfig) -> Result<Self, AgentError> {
        Ok(Self {
            engine: SimulationEngine::new(config)?,
            protocol_handler: ProtocolHandler::new(),
            telemetry_collector: TelemetryCollector::new(),
            state: AgentState::default(),
            start_time: Instant::now(),
        })
    }

    /// Start the configured fleet.
    pub async fn start(&mut self) -> FleetWatch {
        let bus_count = self.engine.config().bus_count;
        let watch = self.engine.start(bus_count).await;
        self.state.running = true;
        self.start_time = Instant::now();
        info!(bus_count, "fleet agent started");
        watch
    }

    pub async fn stop(&mut self) {
        self.engine.stop().await;
        self.state.running = false;
        info!("fleet agent stopped");
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    pub fn protocol_handler(&self) -> &ProtocolHandler {
        &self.protocol_handler
    }

    pub fn state(&self) -> AgentState {
        let mut state = self.state.clone();
        state.running = self.engine.is_running();
        state.uptime_seconds = if state.running {
            self.start_time.elapsed().as_secs()
        } else {
            0
        };
        state
    }

    /// Telemetry frame for the latest snapshot.
    pub fn next_frame(&mut self) -> TelemetryFrame {
        let snapshot = self.engine.snapshot();
        self.state.frames_emitted = self.state.frames_emitted.wrapping_add(1);
        self.telemetry_collector.collect(&snapshot)
    }

    pub fn serialize_frame(&self, frame: &TelemetryFrame) -> Result<String, AgentError> {
        Ok(self.protocol_handler.serialize_frame(frame)?)
    }

    pub fn recent_summaries(&self) -> &[FleetSummary] {
        self.telemetry_collector.history()
    }

    /// Parse one protocol line and execute it. Never fails: parse errors
    /// become a `ParseError` response.
    pub async fn handle_line(&mut self, line: &str) -> CommandResponse {
        match self.protocol_handler.parse_command(line) {
            Ok(command) => self.execute_command(command).await,
            Err(e) => {
                warn!(error = %e, "failed to parse command");
                self.state.rejected_count = self.state.rejected_count.wrapping_add(1);
                self.state.last_error = Some(e.to_string());
                self.protocol_handler.create_parse_error_response(&e)
            }
        }
    }

    pub async fn execute_command(&mut self, command: Command) -> CommandResponse {
        self.state.command_count = self.state.command_count.wrapping_add(1);

        if let Err(e) = self.protocol_handler.validate_command(&command) {
            warn!(id = command.id, command = command.command_type.name(), error = %e, "command rejected");
            self.state.rejected_count = self.state.rejected_count.wrapping_add(1);
            self.state.last_error = Some(e.to_string());
            return self
                .protocol_handler
                .create_response(command.id, ResponseStatus::InvalidCommand, Some(&e.to_string()));
        }

        match self.dispatch(&command).await {
            Ok(response) => response,
            Err(AgentError::Simulation(SimulationError::UnknownBus(bus_id))) => self.protocol_handler.create_response(
                command.id,
                ResponseStatus::NotFound,
                Some(&format!("Unknown bus: {}", bus_id)),
            ),
            Err(e) => {
                warn!(id = command.id, command = command.command_type.name(), error = %e, "command failed");
                self.state.last_error = Some(e.to_string());
                self.protocol_handler
                    .create_response(command.id, ResponseStatus::Error, Some(&e.to_string()))
            }
        }
    }

    async fn dispatch(&mut self, command: &Command) -> Result<CommandResponse, AgentError> {
        let handler = &self.protocol_handler;

        let response = match &command.command_type {
            CommandType::Ping => handler.create_response(command.id, ResponseStatus::Success, Some("pong")),

            CommandType::FleetStatus => {
                let snapshot = self.engine.snapshot();
                handler.create_payload_response(command.id, &FleetSummary::from_buses(&snapshot.buses))?
            }

            CommandType::GetFleet => handler.create_payload_response(command.id, &*self.engine.snapshot())?,

            CommandType::GetBus { bus_id } => {
                let snapshot = self.engine.snapshot();
                let bus = snapshot
                    .bus(bus_id)
                    .ok_or_else(|| SimulationError::UnknownBus(bus_id.clone()))?;
                handler.create_payload_response(command.id, bus)?
            }

            CommandType::StopArrivals { stop } => {
                let snapshot = self.engine.snapshot();
                handler.create_payload_response(command.id, &arrivals_for_stop(&snapshot.buses, stop))?
            }

            CommandType::SetBusStatus { bus_id, status } => {
                let bus = self.engine.set_status(bus_id, *status).await?;
                info!(bus_id = %bus_id, status = %status, "bus status set");
                self.protocol_handler.create_payload_response(command.id, &bus)?
            }

            CommandType::Restart { bus_count } => {
                self.engine.start(*bus_count).await;
                self.state.running = true;
                self.start_time = Instant::now();
                info!(bus_count, generation = self.engine.generation(), "fleet restarted");
                self.protocol_handler.create_response(
                    command.id,
                    ResponseStatus::Success,
                    Some(&format!("Fleet restarted with {} buses", bus_count)),
                )
            }

            CommandType::Subscribe => {
                handler.create_response(command.id, ResponseStatus::Subscribed, Some("Streaming fleet telemetry"))
            }
        };

        Ok(response)
    }
}
