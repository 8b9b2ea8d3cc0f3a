//! Edge aggregation tests

mod common;

use common::{broken, ids, unknown, ScriptedSession};
use proptest::prelude::*;
use traffic_link::facade::{
    compute_edge_stats, EdgeStats, ReadCommand, Reply, TrafficFacade, VehicleSample,
};

fn sample(id: &str, edge: &str, speed: f64) -> VehicleSample {
    VehicleSample {
        id: id.to_string(),
        edge: edge.to_string(),
        speed,
    }
}

#[test]
fn test_every_known_edge_is_reported() {
    let stats = compute_edge_stats(&ids(&["E1", "E2", "E3"]), &[]);
    assert_eq!(stats.len(), 3);
    for edge in ["E1", "E2", "E3"] {
        assert_eq!(stats[edge], EdgeStats::empty());
        assert_eq!(stats[edge].average_speed, EdgeStats::NO_VEHICLES);
    }
}

#[test]
fn test_average_over_vehicles_on_edge() {
    let vehicles = [
        sample("a", "E1", 10.0),
        sample("b", "E1", 20.0),
        sample("c", "E2", 0.0),
    ];
    let stats = compute_edge_stats(&ids(&["E1", "E2", "E3"]), &vehicles);

    assert_eq!(stats["E1"].vehicle_count, 2);
    assert_eq!(stats["E1"].average_speed, 15.0);
    // Stationary vehicles give 0, not the empty sentinel
    assert_eq!(stats["E2"].vehicle_count, 1);
    assert_eq!(stats["E2"].average_speed, 0.0);
    assert!(stats["E3"].is_empty());
}

#[test]
fn test_vehicles_on_unknown_edges_are_dropped() {
    let vehicles = [sample("a", ":J1_0", 5.0), sample("b", "E1", 4.0)];
    let stats = compute_edge_stats(&ids(&["E1"]), &vehicles);

    assert_eq!(stats.len(), 1);
    assert_eq!(stats["E1"].vehicle_count, 1);
    assert!(!stats.contains_key(":J1_0"));
}

#[test]
fn test_facade_skips_vehicles_that_vanish_mid_scan() {
    let session = ScriptedSession::new().on_read(|command| match command {
        ReadCommand::EdgeIds => Ok(Reply::StrList(ids(&["E1", ":J0_0"]))),
        ReadCommand::VehicleIds => Ok(Reply::StrList(ids(&["v1", "gone", "v2"]))),
        ReadCommand::VehicleSpeed(id) if id == "gone" => Err(unknown(id)),
        ReadCommand::VehicleSpeed(id) if id == "v1" => Ok(Reply::Double(6.0)),
        ReadCommand::VehicleSpeed(_) => Ok(Reply::Int(2)),
        ReadCommand::VehicleRoadId(id) if id == "v2" => Ok(Reply::Str(":J0_0".to_string())),
        ReadCommand::VehicleRoadId(_) => Ok(Reply::Str("E1".to_string())),
        other => Err(unknown(&format!("{:?}", other))),
    });
    let mut facade = TrafficFacade::new(session);

    let stats = facade.edge_stats();

    // Internal edges are not reported; v2 sits on one and is not attributed
    assert_eq!(stats.len(), 1);
    assert_eq!(stats["E1"].vehicle_count, 1);
    assert_eq!(stats["E1"].average_speed, 6.0);
}

#[test]
fn test_facade_edge_stats_connection_fault_returns_empty() {
    let session = ScriptedSession::new().on_read(|command| match command {
        ReadCommand::EdgeIds => Ok(Reply::StrList(ids(&["E1"]))),
        _ => Err(broken()),
    });
    let mut facade = TrafficFacade::new(session);

    assert!(facade.edge_stats().is_empty());
    assert_eq!(facade.session().reported_faults.len(), 1);
    assert!(!facade.session().connected);
}

fn arb_roster() -> impl Strategy<Value = (usize, Vec<(usize, f64)>)> {
    (1..8usize).prop_flat_map(|edge_count| {
        (
            Just(edge_count),
            // Indexes past edge_count land on edges outside the known set
            proptest::collection::vec((0..edge_count + 3, 0.0..40.0f64), 0..30),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Empty edges carry the sentinel; others carry the exact mean
    #[test]
    fn edge_stats_invariant((edge_count, roster) in arb_roster()) {
        let edges: Vec<String> = (0..edge_count).map(|i| format!("e{}", i)).collect();
        let vehicles: Vec<VehicleSample> = roster
            .iter()
            .enumerate()
            .map(|(i, (edge, speed))| sample(&format!("v{}", i), &format!("e{}", edge), *speed))
            .collect();

        let stats = compute_edge_stats(&edges, &vehicles);
        prop_assert_eq!(stats.len(), edge_count);

        for edge in &edges {
            let on_edge: Vec<f64> = vehicles
                .iter()
                .filter(|v| &v.edge == edge)
                .map(|v| v.speed)
                .collect();
            let edge_stats = stats[edge];

            prop_assert_eq!(edge_stats.vehicle_count, on_edge.len());
            prop_assert_eq!(
                edge_stats.vehicle_count == 0,
                edge_stats.average_speed == EdgeStats::NO_VEHICLES
            );
            if !on_edge.is_empty() {
                let mean = on_edge.iter().sum::<f64>() / on_edge.len() as f64;
                prop_assert!((edge_stats.average_speed - mean).abs() < 1e-9);
            }
        }
    }
}
