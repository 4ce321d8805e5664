use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

pub const MIN_ETA_MINUTES: u32 = 1;
pub const MIN_DISTANCE_KM: f64 = 0.1;

/// Upper bound on a single fleet. Keeps a full snapshot inside one telemetry frame.
pub const MAX_FLEET_SIZE: usize = 64;

const_assert!(MIN_ETA_MINUTES >= 1);
const_assert!(MAX_FLEET_SIZE >= ROUTE_CATALOG.len());

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Campus center used as the origin for initial bus placement.
pub const CAMPUS_CENTER: GeoPoint = GeoPoint {
    latitude: 40.7128,
    longitude: -74.0060,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub stops: &'static [&'static str],
}

pub const ROUTE_CATALOG: [Route; 4] = [
    Route {
        name: "Route A",
        stops: &["Main Gate", "Library", "Engineering Block", "Cafeteria", "Sports Complex"],
    },
    Route {
        name: "Route B",
        stops: &["Main Gate", "Admin Block", "Medical Center", "Hostel Area", "Back Gate"],
    },
    Route {
        name: "Route C",
        stops: &["Library", "Science Block", "Arts Building", "Parking Lot", "Main Gate"],
    },
    Route {
        name: "Route D",
        stops: &["Hostel Area", "Cafeteria", "Engineering Block", "Admin Block", "Main Gate"],
    },
];

/// Route assigned to the bus created at `index` (round-robin over the catalog).
pub fn route_for_index(index: usize) -> &'static Route {
    &ROUTE_CATALOG[index % ROUTE_CATALOG.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    Active,
    Idle,
    Maintenance,
}

impl BusStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BusStatus::Active => "active",
            BusStatus::Idle => "idle",
            BusStatus::Maintenance => "maintenance",
        }
    }
}

impl core::fmt::Display for BusStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for BusStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(BusStatus::Active),
            "idle" => Ok(BusStatus::Idle),
            "maintenance" => Ok(BusStatus::Maintenance),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown bus status '{0}' (expected active, idle or maintenance)")]
pub struct UnknownStatus(pub String);

/// One simulated vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    pub id: String,
    pub bus_number: String,
    pub route: String,
    pub stops: Vec<String>,
    pub current_stop_index: usize,
    pub latitude: f64,
    pub longitude: f64,
    /// Minutes until arrival at the current stop.
    pub eta: u32,
    /// Kilometres to the current stop.
    pub distance: f64,
    pub status: BusStatus,
}

impl BusRecord {
    pub fn is_active(&self) -> bool {
        self.status == BusStatus::Active
    }

    /// `None` only for a record with no stops, which the simulator never builds.
    pub fn current_stop(&self) -> Option<&str> {
        self.stops.get(self.current_stop_index).map(String::as_str)
    }

    pub fn next_stop(&self) -> Option<&str> {
        self.current_stop()?;
        self.stops
            .get((self.current_stop_index + 1) % self.stops.len())
            .map(String::as_str)
    }

    /// Number of forward hops from the current stop to `stop`, or `None`
    /// if the route does not serve it.
    pub fn stops_until(&self, stop: &str) -> Option<usize> {
        let len = self.stops.len();
        (0..len).find(|hops| self.stops[(self.current_stop_index + hops) % len] == stop)
    }
}

pub fn bus_id(index: usize) -> String {
    format!("bus-{}", index + 1)
}

pub fn bus_number(index: usize) -> String {
    format!("BUS-{:03}", index + 1)
}

/// Round to one decimal place.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
