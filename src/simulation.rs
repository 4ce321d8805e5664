use crate::config::SimulationConfig;
use crate::fleet::{
    bus_id, bus_number, round_tenth, route_for_index, BusRecord, BusStatus, GeoPoint,
    MIN_DISTANCE_KM, MIN_ETA_MINUTES,
};
use crate::rng::SimRng;
use tracing::{debug, warn};

// Initial placement and state ranges
const SPAWN_OFFSET_DEG: f64 = 0.01;
const MIN_INITIAL_ETA: u32 = 2;
const MAX_INITIAL_ETA: u32 = 16;
const MIN_INITIAL_DISTANCE_KM: f64 = 0.5;
const MAX_INITIAL_DISTANCE_KM: f64 = 5.5;
const IDLE_PROBABILITY: f64 = 0.2;

// Per-tick drift for active buses
const POSITION_JITTER_DEG: f64 = 0.0005;
const DISTANCE_JITTER_KM: f64 = 0.1;
const STOP_ADVANCE_PROBABILITY: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("unknown bus '{0}'")]
    UnknownBus(String),
    #[error("simulation is not running")]
    NotRunning,
    #[error("tick period must be greater than zero")]
    InvalidTickPeriod,
}

/// Build a fresh fleet of `count` buses around `origin`.
///
/// Routes are assigned round-robin; positions, ETA, distance, status and the
/// starting stop are drawn from `rng`. A count of zero yields an empty fleet.
pub fn initialize(count: usize, rng: &mut SimRng, origin: GeoPoint) -> Vec<BusRecord> {
    (0..count)
        .map(|index| {
            let route = route_for_index(index);
            let status = if rng.gen_bool(IDLE_PROBABILITY) {
                BusStatus::Idle
            } else {
                BusStatus::Active
            };

            BusRecord {
                id: bus_id(index),
                bus_number: bus_number(index),
                route: route.name.to_string(),
                stops: route.stops.iter().map(|stop| (*stop).to_string()).collect(),
                latitude: origin.latitude + rng.gen_range(-SPAWN_OFFSET_DEG..SPAWN_OFFSET_DEG),
                longitude: origin.longitude + rng.gen_range(-SPAWN_OFFSET_DEG..SPAWN_OFFSET_DEG),
                eta: rng.gen_range(MIN_INITIAL_ETA..=MAX_INITIAL_ETA),
                distance: round_tenth(rng.gen_range(MIN_INITIAL_DISTANCE_KM..MAX_INITIAL_DISTANCE_KM)),
                status,
                current_stop_index: rng.gen_range(0..route.stops.len()),
            }
        })
        .collect()
}

/// Advance one bus by a single tick. Non-active buses are left untouched.
pub fn advance_bus(bus: &mut BusRecord, rng: &mut SimRng) {
    if !bus.is_active() {
        return;
    }

    bus.latitude += rng.gen_range(-POSITION_JITTER_DEG..POSITION_JITTER_DEG);
    bus.longitude += rng.gen_range(-POSITION_JITTER_DEG..POSITION_JITTER_DEG);

    let stepped_eta = if rng.gen_bool(0.5) {
        bus.eta.saturating_sub(1)
    } else {
        bus.eta.saturating_add(1)
    };
    bus.eta = stepped_eta.max(MIN_ETA_MINUTES);

    let drifted = bus.distance + rng.gen_range(-DISTANCE_JITTER_KM..DISTANCE_JITTER_KM);
    bus.distance = round_tenth(drifted).max(MIN_DISTANCE_KM);

    if rng.gen_bool(STOP_ADVANCE_PROBABILITY) {
        bus.current_stop_index = (bus.current_stop_index + 1) % bus.stops.len();
    }

    debug_assert!(bus.current_stop_index < bus.stops.len());
    debug_assert!(bus.eta >= MIN_ETA_MINUTES);
    debug_assert!(bus.distance >= MIN_DISTANCE_KM);
}

/// One mutation pass over the whole fleet.
pub fn tick(buses: &mut [BusRecord], rng: &mut SimRng) {
    for bus in buses.iter_mut() {
        advance_bus(bus, rng);
    }
}

/// A fleet together with the random source that drives it.
#[derive(Debug)]
pub struct FleetSimulator {
    buses: Vec<BusRecord>,
    rng: SimRng,
    origin: GeoPoint,
    tick_count: u64,
}

impl FleetSimulator {
    pub fn new(config: &SimulationConfig, rng: SimRng) -> Self {
        Self {
            buses: Vec::new(),
            rng,
            origin: config.origin,
            tick_count: 0,
        }
    }

    /// Replace the fleet with `count` freshly generated buses.
    pub fn initialize(&mut self, count: usize) -> &[BusRecord] {
        self.buses = initialize(count, &mut self.rng, self.origin);
        self.tick_count = 0;
        &self.buses
    }

    pub fn tick(&mut self) -> &[BusRecord] {
        tick(&mut self.buses, &mut self.rng);
        self.tick_count += 1;
        debug!(
            tick = self.tick_count,
            active = self.active_count(),
            "fleet advanced"
        );
        &self.buses
    }

    pub fn buses(&self) -> &[BusRecord] {
        &self.buses
    }

    pub fn bus(&self, bus_id: &str) -> Option<&BusRecord> {
        self.buses.iter().find(|bus| bus.id == bus_id)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn active_count(&self) -> usize {
        self.buses.iter().filter(|bus| bus.is_active()).count()
    }

    /// Externally override a bus's status. This is the only path by which a
    /// status changes; ticks never transition it.
    pub fn set_status(&mut self, bus_id: &str, status: BusStatus) -> Result<BusRecord, SimulationError> {
        match self.buses.iter_mut().find(|bus| bus.id == bus_id) {
            Some(bus) => {
                bus.status = status;
                Ok(bus.clone())
            }
            None => {
                warn!(bus_id, "status change requested for unknown bus");
                Err(SimulationError::UnknownBus(bus_id.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::CAMPUS_CENTER;

    fn active_bus(eta: u32, distance: f64) -> BusRecord {
        let mut rng = SimRng::new(3);
        let mut bus = initialize(1, &mut rng, CAMPUS_CENTER).remove(0);
        bus.status = BusStatus::Active;
        bus.eta = eta;
        bus.distance = distance;
        bus
    }

    #[test]
    fn test_initial_values_within_ranges() {
        let mut rng = SimRng::new(11);
        let fleet = initialize(200, &mut rng, CAMPUS_CENTER);

        for bus in &fleet {
            assert!((bus.latitude - CAMPUS_CENTER.latitude).abs() <= SPAWN_OFFSET_DEG + 1e-9);
            assert!((bus.longitude - CAMPUS_CENTER.longitude).abs() <= SPAWN_OFFSET_DEG + 1e-9);
            assert!((MIN_INITIAL_ETA..=MAX_INITIAL_ETA).contains(&bus.eta));
            assert!(bus.distance >= MIN_INITIAL_DISTANCE_KM && bus.distance <= MAX_INITIAL_DISTANCE_KM);
            assert_ne!(bus.status, BusStatus::Maintenance);
        }
    }

    #[test]
    fn test_idle_share_is_roughly_one_fifth() {
        let mut rng = SimRng::new(5);
        let fleet = initialize(2000, &mut rng, CAMPUS_CENTER);
        let idle = fleet.iter().filter(|bus| bus.status == BusStatus::Idle).count();
        assert!(idle > 300 && idle < 500, "idle count {}", idle);
    }

    #[test]
    fn test_eta_floor_holds() {
        let mut rng = SimRng::new(9);
        for _ in 0..200 {
            let mut bus = active_bus(1, 2.0);
            advance_bus(&mut bus, &mut rng);
            assert!(bus.eta == 1 || bus.eta == 2);
        }
    }

    #[test]
    fn test_distance_floor_holds() {
        let mut rng = SimRng::new(13);
        for _ in 0..200 {
            let mut bus = active_bus(5, 0.15);
            advance_bus(&mut bus, &mut rng);
            assert!(bus.distance >= MIN_DISTANCE_KM);
        }
    }

    #[test]
    fn test_set_status_unknown_bus() {
        let mut sim = FleetSimulator::new(&SimulationConfig::default(), SimRng::new(1));
        sim.initialize(2);
        assert_eq!(
            sim.set_status("bus-9", BusStatus::Maintenance),
            Err(SimulationError::UnknownBus("bus-9".to_string()))
        );
    }

    #[test]
    fn test_initialize_resets_tick_count() {
        let mut sim = FleetSimulator::new(&SimulationConfig::default(), SimRng::new(1));
        sim.initialize(4);
        sim.tick();
        sim.tick();
        assert_eq!(sim.tick_count(), 2);
        sim.initialize(3);
        assert_eq!(sim.tick_count(), 0);
        assert_eq!(sim.buses().len(), 3);
    }
}
