//! Timer-driven simulation engine.
//!
//! A [`SimulationEngine`] owns at most one running simulation task. The task
//! is the only writer of the fleet: ticks and external status overrides are
//! handled one at a time in the same loop, and each completed mutation is
//! published as an immutable [`FleetSnapshot`] on a watch channel.
//!
//! Starting a new run cancels the previous task before the new fleet is
//! built, and stopping waits for the task to finish so no tick can land after
//! `stop` returns.

use crate::config::SimulationConfig;
use crate::fleet::{BusRecord, BusStatus};
use crate::rng::SimRng;
use crate::simulation::{FleetSimulator, SimulationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// The fleet as of the latest completed tick of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub generation: u64,
    pub tick: u64,
    pub buses: Vec<BusRecord>,
}

impl FleetSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            tick: 0,
            buses: Vec::new(),
        }
    }

    pub fn bus(&self, bus_id: &str) -> Option<&BusRecord> {
        self.buses.iter().find(|bus| bus.id == bus_id)
    }

    fn capture(generation: u64, simulator: &FleetSimulator) -> Self {
        Self {
            generation,
            tick: simulator.tick_count(),
            buses: simulator.buses().to_vec(),
        }
    }
}

/// Live, read-only view of an engine's snapshots.
#[derive(Debug, Clone)]
pub struct FleetWatch {
    rx: watch::Receiver<Arc<FleetSnapshot>>,
}

impl FleetWatch {
    pub fn current(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next published snapshot.
    ///
    /// Fails only once the owning engine has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<FleetSnapshot>, SimulationError> {
        self.rx
            .changed()
            .await
            .map_err(|_| SimulationError::NotRunning)?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}

enum Control {
    SetStatus {
        bus_id: String,
        status: BusStatus,
        reply: oneshot::Sender<Result<BusRecord, SimulationError>>,
    },
}

struct RunHandle {
    generation: u64,
    task: JoinHandle<()>,
    control: mpsc::Sender<Control>,
}

pub struct SimulationEngine {
    config: SimulationConfig,
    snapshot_tx: Arc<watch::Sender<Arc<FleetSnapshot>>>,
    run: Option<RunHandle>,
    generation: u64,
}

impl SimulationEngine {
    /// Fails with [`SimulationError::InvalidTickPeriod`] for a zero period.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        if config.tick_period_ms == 0 {
            return Err(SimulationError::InvalidTickPeriod);
        }

        let (snapshot_tx, _) = watch::channel(Arc::new(FleetSnapshot::empty()));
        Ok(Self {
            config,
            snapshot_tx: Arc::new(snapshot_tx),
            run: None,
            generation: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Start a new run with `bus_count` buses, cancelling any run in progress.
    ///
    /// Must be called from within a tokio runtime. The initial fleet is
    /// published before this returns; the first tick follows one period later.
    pub async fn start(&mut self, bus_count: usize) -> FleetWatch {
        self.stop().await;

        self.generation += 1;
        let generation = self.generation;

        // The configured seed drives the first run; later runs step off it so
        // restarts don't replay the same fleet.
        let seed = self.config.seed.map(|seed| seed.wrapping_add(generation - 1));
        let mut simulator = FleetSimulator::new(&self.config, SimRng::from_seed_option(seed));
        simulator.initialize(bus_count);
        self.snapshot_tx
            .send_replace(Arc::new(FleetSnapshot::capture(generation, &simulator)));

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_simulation(
            simulator,
            generation,
            self.config.tick_period(),
            Arc::clone(&self.snapshot_tx),
            control_rx,
        ));

        info!(
            generation,
            bus_count,
            tick_period_ms = self.config.tick_period_ms,
            "simulation started"
        );

        self.run = Some(RunHandle {
            generation,
            task,
            control: control_tx,
        });
        self.watch()
    }

    /// Cancel the running simulation, if any, and wait for its task to end.
    pub async fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.task.abort();
            match run.task.await {
                Err(e) if e.is_panic() => {
                    error!(generation = run.generation, error = %e, "simulation task panicked");
                }
                _ => info!(generation = run.generation, "simulation stopped"),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().map_or(false, |run| !run.task.is_finished())
    }

    /// Sequence number of the most recent run; zero before the first start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    pub fn watch(&self) -> FleetWatch {
        FleetWatch {
            rx: self.snapshot_tx.subscribe(),
        }
    }

    /// Override one bus's status on the running fleet.
    pub async fn set_status(&self, bus_id: &str, status: BusStatus) -> Result<BusRecord, SimulationError> {
        let run = self.run.as_ref().ok_or(SimulationError::NotRunning)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        run.control
            .send(Control::SetStatus {
                bus_id: bus_id.to_string(),
                status,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SimulationError::NotRunning)?;

        reply_rx.await.map_err(|_| SimulationError::NotRunning)?
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.task.abort();
        }
    }
}

impl core::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("config", &self.config)
            .field("generation", &self.generation)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_simulation(
    mut simulator: FleetSimulator,
    generation: u64,
    period: Duration,
    snapshot_tx: Arc<watch::Sender<Arc<FleetSnapshot>>>,
    mut control_rx: mpsc::Receiver<Control>,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                simulator.tick();
            }
            Some(control) = control_rx.recv() => {
                match control {
                    Control::SetStatus { bus_id, status, reply } => {
                        let result = simulator.set_status(&bus_id, status);
                        if result.is_ok() {
                            debug!(generation, bus_id = %bus_id, status = %status, "bus status overridden");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
        }

        snapshot_tx.send_replace(Arc::new(FleetSnapshot::capture(generation, &simulator)));
    }
}
