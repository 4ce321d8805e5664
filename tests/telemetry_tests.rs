use campusbus::fleet::*;
use campusbus::telemetry::*;
use campusbus::FleetSnapshot;

fn bus(index: usize, status: BusStatus, eta: u32, current_stop_index: usize) -> BusRecord {
    let route = route_for_index(index);
    BusRecord {
        id: bus_id(index),
        bus_number: bus_number(index),
        route: route.name.to_string(),
        stops: route.stops.iter().map(|stop| stop.to_string()).collect(),
        current_stop_index,
        latitude: CAMPUS_CENTER.latitude,
        longitude: CAMPUS_CENTER.longitude,
        eta,
        distance: 1.5,
        status,
    }
}

#[test]
fn test_summary_counts() {
    let buses = vec![
        bus(0, BusStatus::Active, 4, 0),
        bus(1, BusStatus::Active, 10, 0),
        bus(2, BusStatus::Idle, 7, 0),
        bus(3, BusStatus::Maintenance, 2, 0),
        bus(4, BusStatus::Active, 7, 0),
    ];

    let summary = FleetSummary::from_buses(&buses);
    assert_eq!(summary.total, 5);
    assert_eq!(summary.active, 3);
    assert_eq!(summary.idle, 1);
    assert_eq!(summary.maintenance, 1);
    assert_eq!(summary.average_eta_min, Some(7.0));

    let route_a = summary.active_by_route.iter().find(|load| load.route == "Route A").unwrap();
    assert_eq!(route_a.active, 2);
    let route_d = summary.active_by_route.iter().find(|load| load.route == "Route D").unwrap();
    assert_eq!(route_d.active, 0);
    assert_eq!(summary.active_by_route.len(), ROUTE_CATALOG.len());
}

#[test]
fn test_summary_without_active_buses() {
    let buses = vec![bus(0, BusStatus::Idle, 4, 0), bus(1, BusStatus::Maintenance, 9, 0)];
    let summary = FleetSummary::from_buses(&buses);
    assert_eq!(summary.active, 0);
    assert!(summary.average_eta_min.is_none());
}

#[test]
fn test_marker_styles_follow_status() {
    let active = BusMarker::from_record(&bus(0, BusStatus::Active, 5, 0));
    assert_eq!(active.style, MarkerStyle::Primary);
    assert!(active.pulsing);

    let idle = BusMarker::from_record(&bus(1, BusStatus::Idle, 5, 0));
    assert_eq!(idle.style, MarkerStyle::Muted);
    assert!(!idle.pulsing);

    let maintenance = BusMarker::from_record(&bus(2, BusStatus::Maintenance, 5, 0));
    assert_eq!(maintenance.style, MarkerStyle::Destructive);
    assert!(!maintenance.pulsing);
}

#[test]
fn test_marker_overlay_text() {
    let marker = BusMarker::from_record(&bus(2, BusStatus::Active, 12, 0));
    assert_eq!(marker.overlay_text(), "BUS-003 | Route C | ETA: 12 min");
}

#[test]
fn test_arrivals_sorted_by_eta_then_number() {
    // Route A, B, C and D all serve Main Gate
    let buses = vec![
        bus(0, BusStatus::Active, 9, 0),
        bus(1, BusStatus::Active, 3, 0),
        bus(2, BusStatus::Idle, 3, 0),
        bus(3, BusStatus::Active, 6, 0),
    ];

    let arrivals = arrivals_for_stop(&buses, "Main Gate");
    let order: Vec<&str> = arrivals.iter().map(|arrival| arrival.bus_number.as_str()).collect();
    assert_eq!(order, vec!["BUS-002", "BUS-003", "BUS-004", "BUS-001"]);
}

#[test]
fn test_arrivals_skip_maintenance_and_unserved_routes() {
    let buses = vec![
        bus(0, BusStatus::Active, 4, 0),
        bus(1, BusStatus::Maintenance, 2, 0),
        bus(2, BusStatus::Active, 6, 0),
    ];

    // Only Route A serves the Sports Complex
    let arrivals = arrivals_for_stop(&buses, "Sports Complex");
    assert_eq!(arrivals.len(), 1);
    assert_eq!(arrivals[0].bus_id, "bus-1");
    assert_eq!(arrivals[0].stops_away, 4);

    // Route B serves Back Gate but its bus is in maintenance
    assert!(arrivals_for_stop(&buses, "Back Gate").is_empty());
    assert!(arrivals_for_stop(&buses, "Observatory").is_empty());
}

#[test]
fn test_arrivals_count_hops_around_the_loop() {
    // Route A at Cafeteria (index 3): Main Gate is two hops ahead after wrapping
    let buses = vec![bus(0, BusStatus::Active, 4, 3)];
    let arrivals = arrivals_for_stop(&buses, "Main Gate");
    assert_eq!(arrivals[0].stops_away, 2);

    let arrivals = arrivals_for_stop(&buses, "Cafeteria");
    assert_eq!(arrivals[0].stops_away, 0);
}

#[test]
fn test_frames_mirror_snapshot() {
    let snapshot = FleetSnapshot {
        generation: 3,
        tick: 17,
        buses: vec![
            bus(0, BusStatus::Active, 4, 1),
            bus(1, BusStatus::Idle, 8, 2),
            bus(2, BusStatus::Maintenance, 6, 0),
        ],
    };

    let mut collector = TelemetryCollector::new();
    let frame = collector.collect(&snapshot);

    assert_eq!(frame.sequence, 1);
    assert_eq!(frame.generation, 3);
    assert_eq!(frame.tick, 17);
    assert!(frame.timestamp_ms > 0);
    assert_eq!(frame.summary, FleetSummary::from_buses(&snapshot.buses));
    assert_eq!(frame.markers.len(), 3);
    for (marker, record) in frame.markers.iter().zip(snapshot.buses.iter()) {
        assert_eq!(marker.bus_id, record.id);
        assert_eq!(marker.status, record.status);
        assert_eq!(marker.latitude, record.latitude);
    }

    let stats = collector.stats();
    assert_eq!(stats.frames_generated, 1);
    assert_eq!(stats.last_generation, 3);
    assert_eq!(stats.last_tick, 17);
    assert_eq!(collector.history().len(), 1);
}
