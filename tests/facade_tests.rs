//! Façade accessor tests: sentinels, color resolution and the local session

mod common;

use common::{broken, ids, unknown, ScriptedSession};
use traffic_link::facade::{
    EdgeStats, LocalSession, Position2D, ReadCommand, Reply, Rgba, SessionError, TrafficFacade,
    DEFAULT_VEHICLE_COLOR, NO_PHASE, NO_READING, STATE_UNAVAILABLE,
};

#[test]
fn test_vehicle_count_is_zero_when_not_ready() {
    let mut facade = TrafficFacade::new(ScriptedSession::disconnected());
    assert_eq!(facade.vehicle_count(), 0);
    assert!(facade.session().reads.is_empty());
}

#[test]
fn test_sentinels_when_not_ready() {
    let mut facade = TrafficFacade::new(ScriptedSession::disconnected());

    assert!(facade.vehicle_ids().is_empty());
    assert!(facade.edge_ids().is_empty());
    assert!(facade.route_ids().is_empty());
    assert!(facade.lane_ids().is_empty());
    assert!(facade.traffic_light_ids().is_empty());
    assert!(facade.bus_stop_ids().is_empty());
    assert!(facade.vehicle_rows().is_empty());
    assert!(facade.edge_stats().is_empty());
    assert_eq!(facade.vehicle_state("v1"), None);
    assert_eq!(facade.lane_length("E1_0"), NO_READING);
    assert_eq!(facade.traffic_light_state("tl"), STATE_UNAVAILABLE);
    assert_eq!(facade.traffic_light_phase("tl"), NO_PHASE);
    assert_eq!(facade.traffic_light_phase_duration("tl"), NO_READING);
    assert_eq!(facade.traffic_light_next_switch("tl"), NO_READING);
    assert_eq!(facade.bus_stop_name("stop"), "");
    assert_eq!(facade.bus_stop_waiting_count("stop"), 0);
    assert_eq!(facade.simulation_time(), NO_READING);
    assert_eq!(facade.find_reachable_route("E1", "", true), None);

    assert!(facade.session().reads.is_empty());
}

#[test]
fn test_sentinels_on_operation_faults() {
    let mut facade = TrafficFacade::new(ScriptedSession::new());

    assert_eq!(facade.vehicle_count(), 0);
    assert_eq!(facade.traffic_light_state("tl"), "N/A");
    assert_eq!(facade.traffic_light_phase("tl"), -1);
    assert_eq!(facade.lane_length("E1_0"), -1.0);
    assert_eq!(facade.bus_stop_name("stop"), "");

    // Operation faults never count as connection faults
    assert!(facade.session().reported_faults.is_empty());
    assert!(facade.session().connected);
}

#[test]
fn test_wrongly_shaped_replies_yield_sentinels() {
    let session = ScriptedSession::new().on_read(|command| match command {
        ReadCommand::VehicleCount => Ok(Reply::Str("three".to_string())),
        ReadCommand::TrafficLightState(_) => Ok(Reply::Int(4)),
        ReadCommand::VehicleIds => Ok(Reply::Double(1.0)),
        other => Err(unknown(&format!("{:?}", other))),
    });
    let mut facade = TrafficFacade::new(session);

    assert_eq!(facade.vehicle_count(), 0);
    assert_eq!(facade.traffic_light_state("tl"), STATE_UNAVAILABLE);
    assert!(facade.vehicle_ids().is_empty());
}

#[test]
fn test_connection_fault_on_read_is_reported_once() {
    let session = ScriptedSession::new().on_read(|_| Err(broken()));
    let mut facade = TrafficFacade::new(session);

    assert_eq!(facade.vehicle_count(), 0);
    assert_eq!(facade.session().reported_faults.len(), 1);

    // The session owner now considers the connection broken
    assert_eq!(facade.vehicle_count(), 0);
    assert_eq!(facade.session().reads.len(), 1);
}

#[test]
fn test_vehicle_row_colors() {
    let session = ScriptedSession::new().on_read(|command| match command {
        ReadCommand::VehicleIds => Ok(Reply::StrList(ids(&["v1", "v2", "v3", "v4"]))),
        ReadCommand::VehicleSpeed(id) if id == "v4" => Err(unknown(id)),
        ReadCommand::VehicleSpeed(_) => Ok(Reply::Double(3.5)),
        ReadCommand::VehicleRoadId(_) => Ok(Reply::Str("E1".to_string())),
        ReadCommand::VehicleColor(id) if id == "v1" => Ok(Reply::IntList(vec![1, 2, 3])),
        ReadCommand::VehicleColor(id) if id == "v2" => Ok(Reply::IntList(vec![300, 0, 0, 0])),
        other => Err(unknown(&format!("{:?}", other))),
    });
    let mut facade = TrafficFacade::new(session);
    let preferred = Rgba::new(10, 20, 30, 128);
    facade.set_vehicle_color("v1", preferred);
    facade.set_vehicle_color("v2", preferred);

    let rows = facade.vehicle_rows();

    let row_ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(row_ids, vec!["v1", "v2", "v3"]);
    // A well-formed session color wins over the preferred color
    assert_eq!(rows[0].color, Rgba::new(1, 2, 3, 255));
    // A malformed one falls back to the preferred color
    assert_eq!(rows[1].color, preferred);
    assert!((rows[1].opacity() - 128.0 / 255.0).abs() < 1e-6);
    assert_eq!(rows[2].color, DEFAULT_VEHICLE_COLOR);
    assert!(rows.iter().all(|row| row.speed == 3.5 && row.edge == "E1"));
}

#[test]
fn test_color_components_must_be_in_range() {
    assert_eq!(
        Rgba::from_components(&[0, 255, 0, 255]),
        Some(Rgba::new(0, 255, 0, 255))
    );
    assert_eq!(Rgba::from_components(&[-1, 0, 0, 255]), None);
    assert_eq!(Rgba::from_components(&[0, 0]), None);
    assert_eq!(Rgba::from_components(&[0, 0, 0, 0, 0]), None);
}

#[test]
fn test_traffic_light_accessors_on_local_session() {
    let session = LocalSession::demo_network().expect("demo network builds");
    let mut facade = TrafficFacade::new(session);

    assert_eq!(facade.traffic_light_ids(), ids(&["J11"]));
    assert_eq!(facade.traffic_light_state("J11"), "GGrrGGrr");
    assert_eq!(facade.traffic_light_phase("J11"), 0);
    assert_eq!(facade.traffic_light_phase_duration("J11"), 30.0);

    facade.set_traffic_light_phase("J11", 2);
    assert_eq!(facade.traffic_light_phase("J11"), 2);
    assert_eq!(facade.traffic_light_state("J11"), "rrGGrrGG");

    facade.session_mut().step(1.0).expect("session connected");
    assert_eq!(facade.traffic_light_next_switch("J11"), 30.0);
    assert_eq!(facade.simulation_time(), 1.0);

    // Out-of-range phase is rejected by the session and only logged
    facade.set_traffic_light_phase("J11", 9);
    assert_eq!(facade.traffic_light_phase("J11"), 2);

    assert_eq!(facade.traffic_light_state("missing"), STATE_UNAVAILABLE);
}

#[test]
fn test_network_accessors_on_local_session() {
    let session = LocalSession::demo_network().expect("demo network builds");
    let mut facade = TrafficFacade::new(session);

    assert_eq!(facade.route_ids(), ids(&["r_main"]));
    assert!(facade.edge_ids().iter().any(|edge| edge == ":J11_0"));
    assert!(facade.lane_ids().iter().any(|lane| lane == "J00_J01_0"));
    assert_eq!(facade.lane_length("J00_J01_0"), 100.0);
    assert_eq!(facade.lane_length("J00_J01_7"), NO_READING);

    assert_eq!(facade.bus_stop_ids(), ids(&["stop_0"]));
    assert_eq!(facade.bus_stop_name("stop_0"), "Central");
    facade
        .session_mut()
        .set_waiting_persons("stop_0", 4)
        .expect("stop exists");
    assert_eq!(facade.bus_stop_waiting_count("stop_0"), 4);
}

#[test]
fn test_vehicle_state_on_local_session() {
    let session = LocalSession::demo_network().expect("demo network builds");
    let mut facade = TrafficFacade::new(session);

    assert!(facade
        .inject_vehicle("bus", "r_main", 0.0, Rgba::new(0, 0, 255, 255))
        .is_success());
    assert_eq!(facade.vehicle_state("bus"), None);

    facade.session_mut().step(1.0).expect("session connected");

    let state = facade.vehicle_state("bus").expect("vehicle is live");
    assert_eq!(state.edge, "J00_J01");
    assert_eq!(state.speed, 0.0);
    assert_eq!(Position2D::new(state.x, state.y), Position2D::new(0.0, 0.0));
    assert_eq!(facade.session().vehicle_color("bus"), Some(Rgba::new(0, 0, 255, 255)));
}

#[test]
fn test_local_session_traffic_flows() {
    let session = LocalSession::demo_network().expect("demo network builds");
    let mut facade = TrafficFacade::new_with_seed(session, 99);

    for (index, start) in ["r_main", "J00_J10", "J20_J21", "J22_J12"].iter().enumerate() {
        let outcome = facade.inject_vehicle(
            &format!("veh{}", index),
            start,
            10.0,
            Rgba::new(0, 255, 0, 255),
        );
        assert!(outcome.is_success(), "{:?}", outcome);
    }

    for _ in 0..20 {
        facade.session_mut().step(0.5).expect("session connected");
        let stats = facade.edge_stats();
        let attributed: usize = stats.values().map(|s| s.vehicle_count).sum();
        assert!(attributed <= facade.vehicle_count());
        for edge_stats in stats.values() {
            assert_eq!(
                edge_stats.is_empty(),
                edge_stats.average_speed == EdgeStats::NO_VEHICLES
            );
        }
    }

    assert!(facade.pending().is_empty());
    // Bare-edge vehicles had their single-edge route extended
    for vehicle in ["veh1", "veh2", "veh3"] {
        let route = facade.session().vehicle_route(vehicle).expect("vehicle is live");
        assert!(route.len() >= 2, "{} kept route {:?}", vehicle, route);
    }
    assert!(facade
        .vehicle_rows()
        .iter()
        .all(|row| row.speed > 0.0 && row.speed <= 10.0));
}

#[test]
fn test_disconnect_returns_sentinels_until_reconnected() {
    let session = LocalSession::demo_network().expect("demo network builds");
    let mut facade = TrafficFacade::new(session);
    assert!(facade
        .inject_vehicle("v1", "r_main", 5.0, Rgba::new(255, 0, 0, 255))
        .is_success());
    facade.session_mut().step(0.5).expect("session connected");
    assert_eq!(facade.vehicle_count(), 1);

    facade.session_mut().disconnect();
    assert_eq!(facade.vehicle_count(), 0);
    assert_eq!(facade.traffic_light_state("J11"), STATE_UNAVAILABLE);
    assert!(facade.session_mut().step(0.5).is_err());

    facade.session_mut().reconnect();
    assert_eq!(facade.vehicle_count(), 1);
    assert_eq!(facade.session().faults_reported(), 0);
}

#[test]
fn test_step_rejects_unusable_deltas() {
    let mut session = LocalSession::demo_network().expect("demo network builds");

    for delta in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.0, -0.5] {
        let result = session.step(delta);
        assert!(
            matches!(result, Err(SessionError::InvalidArgument { .. })),
            "delta {} gave {:?}",
            delta,
            result
        );
    }
    assert_eq!(session.time(), 0.0);

    session.step(0.5).expect("session connected");
    assert_eq!(session.time(), 0.5);
}

#[test]
fn test_dropped_link_is_reported_once_and_recovers() {
    let session = LocalSession::demo_network().expect("demo network builds");
    let mut facade = TrafficFacade::new(session);
    assert!(facade
        .inject_vehicle("v1", "r_main", 5.0, Rgba::new(255, 0, 0, 255))
        .is_success());
    facade.session_mut().step(0.5).expect("session connected");

    facade.session_mut().break_link();
    assert!(facade.session_mut().step(0.5).is_err());
    assert!(facade.edge_stats().is_empty());
    assert_eq!(facade.vehicle_count(), 0);
    assert_eq!(facade.session().faults_reported(), 1);

    facade.session_mut().reconnect();
    facade.session_mut().step(0.5).expect("session connected");
    assert_eq!(facade.vehicle_count(), 1);
    assert_eq!(facade.session().faults_reported(), 1);
}
