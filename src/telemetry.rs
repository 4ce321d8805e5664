use crate::engine::FleetSnapshot;
use crate::fleet::{BusRecord, BusStatus, ROUTE_CATALOG};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const SUMMARY_HISTORY_SIZE: usize = 16;

/// Fleet-wide counts for the dashboard stat cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub maintenance: usize,
    /// Mean ETA across active buses, in minutes.
    pub average_eta_min: Option<f64>,
    pub active_by_route: alloc::vec::Vec<RouteLoad>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLoad {
    pub route: String,
    pub active: usize,
}

impl FleetSummary {
    pub fn from_buses(buses: &[BusRecord]) -> Self {
        let count = |status: BusStatus| buses.iter().filter(|bus| bus.status == status).count();
        let active = count(BusStatus::Active);

        let average_eta_min = if active == 0 {
            None
        } else {
            let eta_sum: u64 = buses
                .iter()
                .filter(|bus| bus.is_active())
                .map(|bus| u64::from(bus.eta))
                .sum();
            Some(eta_sum as f64 / active as f64)
        };

        let active_by_route = ROUTE_CATALOG
            .iter()
            .map(|route| RouteLoad {
                route: route.name.to_string(),
                active: buses
                    .iter()
                    .filter(|bus| bus.is_active() && bus.route == route.name)
                    .count(),
            })
            .collect();

        Self {
            total: buses.len(),
            active,
            idle: count(BusStatus::Idle),
            maintenance: count(BusStatus::Maintenance),
            average_eta_min,
            active_by_route,
        }
    }
}

/// Visual treatment of a map marker, one per bus status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerStyle {
    Primary,
    Muted,
    Destructive,
}

impl From<BusStatus> for MarkerStyle {
    fn from(status: BusStatus) -> Self {
        match status {
            BusStatus::Active => MarkerStyle::Primary,
            BusStatus::Idle => MarkerStyle::Muted,
            BusStatus::Maintenance => MarkerStyle::Destructive,
        }
    }
}

/// Map marker plus the hover overlay for one bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMarker {
    pub bus_id: String,
    pub bus_number: String,
    pub route: String,
    pub eta: u32,
    pub status: BusStatus,
    pub style: MarkerStyle,
    pub pulsing: bool,
    pub latitude: f64,
    pub longitude: f64,
}

impl BusMarker {
    pub fn from_record(bus: &BusRecord) -> Self {
        Self {
            bus_id: bus.id.clone(),
            bus_number: bus.bus_number.clone(),
            route: bus.route.clone(),
            eta: bus.eta,
            status: bus.status,
            style: MarkerStyle::from(bus.status),
            pulsing: bus.is_active(),
            latitude: bus.latitude,
            longitude: bus.longitude,
        }
    }

    pub fn overlay_text(&self) -> String {
        format!("{} | {} | ETA: {} min", self.bus_number, self.route, self.eta)
    }
}

/// A bus that will reach a given stop, as shown on the rider arrival board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopArrival {
    pub bus_id: String,
    pub bus_number: String,
    pub route: String,
    pub eta: u32,
    pub distance: f64,
    pub stops_away: usize,
    pub status: BusStatus,
}

/// Buses whose route serves `stop`, soonest first.
///
/// Buses in maintenance are out of service and never listed. Ties on ETA
/// are broken by bus number so the board order is stable.
pub fn arrivals_for_stop(buses: &[BusRecord], stop: &str) -> alloc::vec::Vec<StopArrival> {
    let mut arrivals: alloc::vec::Vec<StopArrival> = buses
        .iter()
        .filter(|bus| bus.status != BusStatus::Maintenance)
        .filter_map(|bus| {
            bus.stops_until(stop).map(|stops_away| StopArrival {
                bus_id: bus.id.clone(),
                bus_number: bus.bus_number.clone(),
                route: bus.route.clone(),
                eta: bus.eta,
                distance: bus.distance,
                stops_away,
                status: bus.status,
            })
        })
        .collect();

    arrivals.sort_by(|a, b| a.eta.cmp(&b.eta).then_with(|| a.bus_number.cmp(&b.bus_number)));
    arrivals
}

/// One sequenced telemetry message derived from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub sequence: u32,
    pub generation: u64,
    pub tick: u64,
    pub timestamp_ms: u64,
    pub summary: FleetSummary,
    pub markers: alloc::vec::Vec<BusMarker>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub frames_generated: u32,
    pub last_generation: u64,
    pub last_tick: u64,
}

#[derive(Debug)]
pub struct TelemetryCollector {
    sequence: u32,
    history: Vec<FleetSummary, SUMMARY_HISTORY_SIZE>,
    stats: TelemetryStats,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            history: Vec::new(),
            stats: TelemetryStats::default(),
        }
    }

    pub fn collect(&mut self, snapshot: &FleetSnapshot) -> TelemetryFrame {
        self.sequence = self.sequence.wrapping_add(1);
        let summary = FleetSummary::from_buses(&snapshot.buses);

        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(summary.clone());

        self.stats.frames_generated = self.stats.frames_generated.wrapping_add(1);
        self.stats.last_generation = snapshot.generation;
        self.stats.last_tick = snapshot.tick;

        TelemetryFrame {
            sequence: self.sequence,
            generation: snapshot.generation,
            tick: snapshot.tick,
            timestamp_ms: current_timestamp_ms(),
            summary,
            markers: snapshot.buses.iter().map(BusMarker::from_record).collect(),
        }
    }

    /// Recent summaries, oldest first.
    pub fn history(&self) -> &[FleetSummary] {
        &self.history
    }

    pub fn stats(&self) -> &TelemetryStats {
        &self.stats
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
