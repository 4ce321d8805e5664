use campusbus::fleet::*;
use campusbus::simulation::{advance_bus, initialize, tick, FleetSimulator};
use campusbus::*;
use std::collections::HashSet;

const POSITION_STEP: f64 = 0.0005;
const FLOAT_SLACK: f64 = 1e-9;

fn seeded_fleet(count: usize, seed: u64) -> (Vec<BusRecord>, SimRng) {
    let mut rng = SimRng::new(seed);
    let fleet = initialize(count, &mut rng, CAMPUS_CENTER);
    (fleet, rng)
}

fn assert_invariants(bus: &BusRecord) {
    assert!(
        bus.current_stop_index < bus.stops.len(),
        "{} stop index {} out of range",
        bus.id,
        bus.current_stop_index
    );
    assert!(bus.eta >= MIN_ETA_MINUTES, "{} eta {}", bus.id, bus.eta);
    assert!(bus.distance >= MIN_DISTANCE_KM, "{} distance {}", bus.id, bus.distance);
}

#[test]
fn test_fleet_size_and_unique_ids() {
    for count in [0, 1, 4, 8, 13, 64] {
        let (fleet, _) = seeded_fleet(count, count as u64);
        assert_eq!(fleet.len(), count);

        let ids: HashSet<&str> = fleet.iter().map(|bus| bus.id.as_str()).collect();
        assert_eq!(ids.len(), count);
    }
}

#[test]
fn test_empty_fleet_ticks_cleanly() {
    let (mut fleet, mut rng) = seeded_fleet(0, 1);
    tick(&mut fleet, &mut rng);
    assert!(fleet.is_empty());
}

#[test]
fn test_structure_is_deterministic() {
    let (fleet, _) = seeded_fleet(9, 77);

    for (index, bus) in fleet.iter().enumerate() {
        let route = &ROUTE_CATALOG[index % 4];
        assert_eq!(bus.id, format!("bus-{}", index + 1));
        assert_eq!(bus.bus_number, format!("BUS-{:03}", index + 1));
        assert_eq!(bus.route, route.name);
        assert_eq!(bus.stops, route.stops.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }
}

#[test]
fn test_generation_never_produces_maintenance() {
    let (fleet, _) = seeded_fleet(500, 4);
    assert!(fleet.iter().all(|bus| bus.status != BusStatus::Maintenance));
    assert!(fleet.iter().any(|bus| bus.status == BusStatus::Idle));
    assert!(fleet.iter().any(|bus| bus.status == BusStatus::Active));
}

#[test]
fn test_initial_distance_has_one_decimal() {
    let (fleet, _) = seeded_fleet(100, 21);
    for bus in &fleet {
        let scaled = bus.distance * 10.0;
        assert!((scaled - scaled.round()).abs() < FLOAT_SLACK, "distance {}", bus.distance);
    }
}

#[test]
fn test_same_seed_same_run() {
    let (mut a, mut rng_a) = seeded_fleet(8, 1234);
    let (mut b, mut rng_b) = seeded_fleet(8, 1234);
    assert_eq!(a, b);

    for _ in 0..25 {
        tick(&mut a, &mut rng_a);
        tick(&mut b, &mut rng_b);
    }
    assert_eq!(a, b);
}

#[test]
fn test_single_tick_scenario() {
    let (initial, mut rng) = seeded_fleet(8, 2024);
    let mut fleet = initial.clone();
    tick(&mut fleet, &mut rng);

    assert_eq!(fleet.len(), 8);
    for (before, after) in initial.iter().zip(fleet.iter()) {
        if before.is_active() {
            assert!((after.latitude - before.latitude).abs() <= POSITION_STEP + FLOAT_SLACK);
            assert!((after.longitude - before.longitude).abs() <= POSITION_STEP + FLOAT_SLACK);
            assert!(after.eta.abs_diff(before.eta) <= 1);
        } else {
            assert_eq!(before, after);
        }
    }
}

#[test]
fn test_invariants_hold_over_many_ticks() {
    let (initial, mut rng) = seeded_fleet(16, 99);
    let mut fleet = initial.clone();

    for _ in 0..1000 {
        tick(&mut fleet, &mut rng);
        fleet.iter().for_each(assert_invariants);
    }

    for (before, after) in initial.iter().zip(fleet.iter()) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.bus_number, after.bus_number);
        assert_eq!(before.route, after.route);
        assert_eq!(before.stops, after.stops);
        assert_eq!(before.status, after.status);
        if !before.is_active() {
            assert_eq!(before, after);
        }
    }
}

#[test]
fn test_stop_index_wraps_at_end_of_route() {
    let (mut fleet, mut rng) = seeded_fleet(1, 8);
    let bus = &mut fleet[0];
    bus.status = BusStatus::Active;
    bus.current_stop_index = bus.stops.len() - 1;

    let mut wrapped = false;
    for _ in 0..1000 {
        let before = bus.current_stop_index;
        advance_bus(bus, &mut rng);
        if before == bus.stops.len() - 1 && bus.current_stop_index == 0 {
            wrapped = true;
        }
        assert_invariants(bus);
    }
    assert!(wrapped, "stop pointer never wrapped in 1000 ticks");
}

#[test]
fn test_stop_index_only_moves_forward_by_one() {
    let (mut fleet, mut rng) = seeded_fleet(12, 31);
    for _ in 0..300 {
        let before: Vec<usize> = fleet.iter().map(|bus| bus.current_stop_index).collect();
        tick(&mut fleet, &mut rng);
        for (bus, previous) in fleet.iter().zip(before) {
            let expected_next = (previous + 1) % bus.stops.len();
            assert!(bus.current_stop_index == previous || bus.current_stop_index == expected_next);
        }
    }
}

#[test]
fn test_eta_of_one_stays_positive() {
    let (mut fleet, mut rng) = seeded_fleet(1, 55);
    let bus = &mut fleet[0];
    bus.status = BusStatus::Active;

    for _ in 0..500 {
        bus.eta = 1;
        advance_bus(bus, &mut rng);
        assert!(bus.eta == 1 || bus.eta == 2);
    }
}

#[test]
fn test_small_distance_is_clamped() {
    let (mut fleet, mut rng) = seeded_fleet(1, 56);
    let bus = &mut fleet[0];
    bus.status = BusStatus::Active;

    for _ in 0..500 {
        bus.distance = 0.15;
        advance_bus(bus, &mut rng);
        assert!(bus.distance >= MIN_DISTANCE_KM);
        assert!(bus.distance <= 0.3);
    }
}

#[test]
fn test_frozen_statuses_are_untouched() {
    let (mut fleet, mut rng) = seeded_fleet(6, 3);
    fleet[0].status = BusStatus::Idle;
    fleet[1].status = BusStatus::Maintenance;
    let idle = fleet[0].clone();
    let maintenance = fleet[1].clone();

    for _ in 0..200 {
        tick(&mut fleet, &mut rng);
    }

    assert_eq!(fleet[0], idle);
    assert_eq!(fleet[1], maintenance);
}

#[test]
fn test_simulator_status_override() {
    let mut simulator = FleetSimulator::new(&SimulationConfig::default(), SimRng::new(10));
    simulator.initialize(4);

    let updated = simulator.set_status("bus-2", BusStatus::Maintenance).unwrap();
    assert_eq!(updated.status, BusStatus::Maintenance);

    let frozen = simulator.bus("bus-2").cloned().unwrap();
    for _ in 0..50 {
        simulator.tick();
    }
    assert_eq!(simulator.bus("bus-2"), Some(&frozen));
    assert_eq!(simulator.tick_count(), 50);

    let reactivated = simulator.set_status("bus-2", BusStatus::Active).unwrap();
    assert!(reactivated.is_active());
}

#[test]
fn test_simulator_uses_configured_origin() {
    let config = SimulationConfig {
        origin: GeoPoint {
            latitude: 51.5,
            longitude: -0.12,
        },
        ..SimulationConfig::default()
    };
    let mut simulator = FleetSimulator::new(&config, SimRng::new(6));

    for bus in simulator.initialize(20) {
        assert!((bus.latitude - 51.5).abs() <= 0.01 + FLOAT_SLACK);
        assert!((bus.longitude + 0.12).abs() <= 0.01 + FLOAT_SLACK);
    }
}
