//! # Campus Bus Fleet Simulator
//!
//! A simulation library for a campus shuttle fleet: synthetic buses drift
//! around the campus on a fixed timer while a telemetry layer turns each
//! snapshot into map markers, fleet statistics and stop arrival boards.
//!
//! ## Features
//!
//! - **Deterministic fleet generation**: round-robin route assignment with
//!   seeded or entropy-backed randomness
//! - **Bounded tick updates**: position jitter, ETA and distance drift with
//!   hard floors, forward-only stop progression
//! - **Single-writer engine**: one tokio task owns the fleet, with explicit
//!   start, restart and stop
//! - **Telemetry**: sequenced frames, fleet summaries, marker styling and
//!   arrival boards
//! - **JSON line protocol**: commands and telemetry over TCP
//!
//! ## Quick Start
//!
//! ```rust
//! use campusbus::{FleetSimulator, SimRng, SimulationConfig};
//!
//! let mut simulator = FleetSimulator::new(&SimulationConfig::default(), SimRng::new(42));
//! simulator.initialize(8);
//! simulator.tick();
//!
//! for bus in simulator.buses() {
//!     println!("{} on {} - ETA {} min", bus.bus_number, bus.route, bus.eta);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`fleet`] - Bus records, statuses, route catalog
//! - [`rng`] - Injectable random source
//! - [`simulation`] - Fleet generation and tick rules
//! - [`engine`] - Timer-driven simulation task and snapshots
//! - [`telemetry`] - Summaries, markers, arrivals, frames
//! - [`protocol`] - Command/response wire format
//! - [`agent`] - Command dispatch for the simulator server
//! - [`config`] - Simulation and server settings

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

pub mod agent;
pub mod config;
pub mod engine;
pub mod fleet;
pub mod protocol;
pub mod rng;
pub mod simulation;
pub mod telemetry;

// Re-export main public types for convenience
pub use agent::FleetAgent;
pub use config::{Config, SimulationConfig};
pub use engine::{FleetSnapshot, FleetWatch, SimulationEngine};
pub use fleet::{BusRecord, BusStatus};
pub use protocol::{Command, CommandResponse, CommandType};
pub use rng::SimRng;
pub use simulation::{FleetSimulator, SimulationError};
