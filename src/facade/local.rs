//! In-process simulation session
//!
//! A small stand-in for a remote simulator: a road graph with routes,
//! vehicles, traffic lights and bus stops, driven by explicit `step` calls.
//! Vehicles added through the session stay pending until the next step, so
//! mutations against them fail the same way they do against a live remote
//! engine.

use anyhow::{Context, Result};
use log::{debug, warn};
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::config::DEFAULT_VEHICLE_TYPE;
use super::fault::SessionError;
use super::session::{ReadCommand, Reply, Session, WriteCommand};
use super::types::{EntityId, Position2D, Rgba};

/// Speed limit applied to every edge, in m/s
pub const DEFAULT_SPEED_LIMIT: f64 = 13.89;

/// Acceleration of every vehicle, in m/s²
pub const ACCELERATION: f64 = 2.6;

#[derive(Debug, Clone)]
struct LocalEdge {
    from: NodeIndex,
    to: NodeIndex,
    length: f64,
    speed_limit: f64,
}

#[derive(Debug, Clone)]
struct LocalVehicle {
    route: Vec<EntityId>,
    route_index: usize,
    distance_along_edge: f64,
    speed: f64,
    max_speed: f64,
    forced_speed: Option<f64>,
    color: Option<Rgba>,
    /// Internal edge the vehicle is crossing, if between two edges
    junction_edge: Option<EntityId>,
}

#[derive(Debug, Clone)]
struct LocalTrafficLight {
    /// (signal state, duration in seconds)
    phases: Vec<(String, f64)>,
    phase: usize,
    phase_started: f64,
}

#[derive(Debug, Clone)]
struct LocalBusStop {
    name: String,
    waiting: usize,
}

/// A self-contained [`Session`] backed by an in-memory road graph
pub struct LocalSession {
    /// Junctions are nodes, edges carry their edge id
    graph: DiGraph<EntityId, EntityId>,
    junctions: BTreeMap<EntityId, NodeIndex>,
    junction_positions: HashMap<NodeIndex, Position2D>,
    edges: BTreeMap<EntityId, LocalEdge>,
    routes: BTreeMap<EntityId, Vec<EntityId>>,
    vehicle_types: HashSet<String>,
    vehicles: BTreeMap<EntityId, LocalVehicle>,
    /// Vehicles added since the last step
    departing: Vec<(EntityId, LocalVehicle)>,
    traffic_lights: BTreeMap<EntityId, LocalTrafficLight>,
    bus_stops: BTreeMap<EntityId, LocalBusStop>,
    time: f64,
    connected: bool,
    /// Transport lost without the owner being told yet
    link_broken: bool,
    faults_reported: usize,
    arrived: usize,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            junctions: BTreeMap::new(),
            junction_positions: HashMap::new(),
            edges: BTreeMap::new(),
            routes: BTreeMap::new(),
            vehicle_types: HashSet::from([DEFAULT_VEHICLE_TYPE.to_string()]),
            vehicles: BTreeMap::new(),
            departing: Vec::new(),
            traffic_lights: BTreeMap::new(),
            bus_stops: BTreeMap::new(),
            time: 0.0,
            connected: true,
            link_broken: false,
            faults_reported: 0,
            arrived: 0,
        }
    }

    /// A 3x3 grid of junctions joined by two-way edges, with a signalized
    /// center, one predefined route and a bus stop
    pub fn demo_network() -> Result<Self> {
        let mut session = Self::new();
        let spacing = 100.0;

        for row in 0..3 {
            for col in 0..3 {
                session.add_junction(
                    &format!("J{}{}", row, col),
                    col as f64 * spacing,
                    row as f64 * spacing,
                );
            }
        }

        for row in 0..3 {
            for col in 0..3 {
                let here = format!("J{}{}", row, col);
                if col < 2 {
                    let east = format!("J{}{}", row, col + 1);
                    session.add_two_way_edge(&here, &east)?;
                }
                if row < 2 {
                    let south = format!("J{}{}", row + 1, col);
                    session.add_two_way_edge(&here, &south)?;
                }
            }
        }

        session.add_route(
            "r_main",
            vec![
                "J00_J01".to_string(),
                "J01_J11".to_string(),
                "J11_J21".to_string(),
                "J21_J22".to_string(),
            ],
        )?;
        session.add_traffic_light(
            "J11",
            vec![
                ("GGrrGGrr", 30.0),
                ("yyrryyrr", 4.0),
                ("rrGGrrGG", 30.0),
                ("rryyrryy", 4.0),
            ],
        )?;
        session.add_bus_stop("stop_0", "Central", "J01_J11_0")?;

        Ok(session)
    }

    pub fn add_junction(&mut self, id: &str, x: f64, y: f64) {
        if self.junctions.contains_key(id) {
            return;
        }
        let node = self.graph.add_node(id.to_string());
        self.junctions.insert(id.to_string(), node);
        self.junction_positions.insert(node, Position2D::new(x, y));
    }

    /// Add a one-way edge; its length is the distance between the junctions
    pub fn add_edge(&mut self, id: &str, from: &str, to: &str) -> Result<()> {
        if self.edges.contains_key(id) {
            anyhow::bail!("Edge {} already exists", id);
        }
        let from_node = *self
            .junctions
            .get(from)
            .with_context(|| format!("Start junction {} not found", from))?;
        let to_node = *self
            .junctions
            .get(to)
            .with_context(|| format!("End junction {} not found", to))?;

        let length = self.junction_positions[&from_node]
            .distance(&self.junction_positions[&to_node])
            .max(1.0);

        self.graph.add_edge(from_node, to_node, id.to_string());
        self.edges.insert(
            id.to_string(),
            LocalEdge {
                from: from_node,
                to: to_node,
                length,
                speed_limit: DEFAULT_SPEED_LIMIT,
            },
        );
        Ok(())
    }

    /// Add edges `a_b` and `b_a`
    pub fn add_two_way_edge(&mut self, a: &str, b: &str) -> Result<()> {
        self.add_edge(&format!("{}_{}", a, b), a, b)?;
        self.add_edge(&format!("{}_{}", b, a), b, a)
    }

    pub fn add_route(&mut self, id: &str, edges: Vec<EntityId>) -> Result<()> {
        self.insert_route(id, edges)
            .with_context(|| format!("Could not add route {}", id))
    }

    pub fn add_traffic_light(&mut self, id: &str, phases: Vec<(&str, f64)>) -> Result<()> {
        if phases.is_empty() {
            anyhow::bail!("Traffic light {} needs at least one phase", id);
        }
        if phases.iter().any(|(_, duration)| *duration <= 0.0) {
            anyhow::bail!("Traffic light {} has a non-positive phase duration", id);
        }
        self.traffic_lights.insert(
            id.to_string(),
            LocalTrafficLight {
                phases: phases
                    .into_iter()
                    .map(|(state, duration)| (state.to_string(), duration))
                    .collect(),
                phase: 0,
                phase_started: self.time,
            },
        );
        Ok(())
    }

    pub fn add_bus_stop(&mut self, id: &str, name: &str, lane: &str) -> Result<()> {
        self.edge_of_lane(lane)
            .with_context(|| format!("Lane {} not found for bus stop {}", lane, id))?;
        self.bus_stops.insert(
            id.to_string(),
            LocalBusStop {
                name: name.to_string(),
                waiting: 0,
            },
        );
        Ok(())
    }

    pub fn set_waiting_persons(&mut self, stop_id: &str, waiting: usize) -> Result<()> {
        let stop = self
            .bus_stops
            .get_mut(stop_id)
            .with_context(|| format!("Bus stop {} not found", stop_id))?;
        stop.waiting = waiting;
        Ok(())
    }

    /// Drop the connection; every command fails until [`Self::reconnect`]
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Lose the transport while still reporting connected; commands fail
    /// with a transport error until [`Self::reconnect`]
    pub fn break_link(&mut self) {
        self.link_broken = true;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
        self.link_broken = false;
    }

    pub fn faults_reported(&self) -> usize {
        self.faults_reported
    }

    pub fn arrived_count(&self) -> usize {
        self.arrived
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_vehicle_pending(&self, id: &str) -> bool {
        self.departing.iter().any(|(pending_id, _)| pending_id == id)
    }

    pub fn vehicle_color(&self, id: &str) -> Option<Rgba> {
        self.vehicles.get(id).and_then(|v| v.color)
    }

    pub fn vehicle_max_speed(&self, id: &str) -> Option<f64> {
        self.vehicles.get(id).map(|v| v.max_speed)
    }

    pub fn vehicle_route(&self, id: &str) -> Option<&[EntityId]> {
        self.vehicles.get(id).map(|v| v.route.as_slice())
    }

    pub fn route(&self, id: &str) -> Option<&[EntityId]> {
        self.routes.get(id).map(|r| r.as_slice())
    }

    /// Advance the simulation by `delta` seconds
    ///
    /// Moves live vehicles, then inserts vehicles added since the last step
    /// at the start of their route with speed 0, then cycles signals.
    /// `delta` must be finite and positive.
    pub fn step(&mut self, delta: f64) -> Result<(), SessionError> {
        self.check_link()?;
        if !delta.is_finite() || delta <= 0.0 {
            return Err(SessionError::InvalidArgument {
                detail: format!("step delta {} must be finite and positive", delta),
            });
        }
        self.time += delta;

        let mut arrived = Vec::new();
        for (id, vehicle) in self.vehicles.iter_mut() {
            if advance_vehicle(vehicle, &self.edges, &self.graph, delta) {
                arrived.push(id.clone());
            }
        }
        for id in arrived {
            debug!("Vehicle {} arrived", id);
            self.vehicles.remove(&id);
            self.arrived += 1;
        }

        for (id, vehicle) in self.departing.drain(..) {
            debug!("Vehicle {} departed", id);
            self.vehicles.insert(id, vehicle);
        }

        for light in self.traffic_lights.values_mut() {
            loop {
                let duration = light.phases[light.phase].1;
                if self.time - light.phase_started < duration {
                    break;
                }
                light.phase_started += duration;
                light.phase = (light.phase + 1) % light.phases.len();
            }
        }

        Ok(())
    }

    fn check_link(&self) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        if self.link_broken {
            return Err(SessionError::Transport {
                detail: "link dropped".to_string(),
            });
        }
        Ok(())
    }

    fn insert_route(&mut self, id: &str, edges: Vec<EntityId>) -> Result<(), SessionError> {
        if self.routes.contains_key(id) {
            return Err(SessionError::InvalidArgument {
                detail: format!("route {} already exists", id),
            });
        }
        self.check_connected_edges(&edges)?;
        self.routes.insert(id.to_string(), edges);
        Ok(())
    }

    /// Every edge must exist and lead into the next one
    fn check_connected_edges(&self, edges: &[EntityId]) -> Result<(), SessionError> {
        if edges.is_empty() {
            return Err(SessionError::InvalidArgument {
                detail: "empty edge list".to_string(),
            });
        }
        for pair in edges.windows(2) {
            let current = self.edge(&pair[0])?;
            let next = self.edge(&pair[1])?;
            if current.to != next.from {
                return Err(SessionError::InvalidArgument {
                    detail: format!("{} does not connect to {}", pair[0], pair[1]),
                });
            }
        }
        self.edge(&edges[edges.len() - 1])?;
        Ok(())
    }

    fn edge(&self, id: &str) -> Result<&LocalEdge, SessionError> {
        self.edges
            .get(id)
            .ok_or_else(|| SessionError::UnknownEntity { id: id.to_string() })
    }

    fn live_vehicle(&mut self, id: &str) -> Result<&mut LocalVehicle, SessionError> {
        self.vehicles
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownEntity { id: id.to_string() })
    }

    fn vehicle(&self, id: &str) -> Result<&LocalVehicle, SessionError> {
        self.vehicles
            .get(id)
            .ok_or_else(|| SessionError::UnknownEntity { id: id.to_string() })
    }

    fn traffic_light(&self, id: &str) -> Result<&LocalTrafficLight, SessionError> {
        self.traffic_lights
            .get(id)
            .ok_or_else(|| SessionError::UnknownEntity { id: id.to_string() })
    }

    fn bus_stop(&self, id: &str) -> Result<&LocalBusStop, SessionError> {
        self.bus_stops
            .get(id)
            .ok_or_else(|| SessionError::UnknownEntity { id: id.to_string() })
    }

    /// Lanes are named `<edge>_<index>`; every edge has a single lane 0
    fn edge_of_lane(&self, lane: &str) -> Option<&LocalEdge> {
        let (edge_id, index) = lane.rsplit_once('_')?;
        if index != "0" {
            return None;
        }
        self.edges.get(edge_id)
    }

    fn internal_edge_ids(&self) -> Vec<EntityId> {
        self.junctions
            .keys()
            .map(|junction| internal_edge_id(junction))
            .collect()
    }

    fn current_edge(&self, vehicle: &LocalVehicle) -> EntityId {
        vehicle
            .junction_edge
            .clone()
            .unwrap_or_else(|| vehicle.route[vehicle.route_index].clone())
    }

    fn vehicle_position(&self, vehicle: &LocalVehicle) -> Result<Position2D, SessionError> {
        let edge = self.edge(&vehicle.route[vehicle.route_index])?;
        let start = self.junction_positions[&edge.from];
        let end = self.junction_positions[&edge.to];
        if vehicle.junction_edge.is_some() {
            return Ok(end);
        }
        Ok(start.lerp(&end, (vehicle.distance_along_edge / edge.length).clamp(0.0, 1.0)))
    }

    /// Shortest edge sequence from `from` to `to`, both included
    fn find_route(&self, from: &str, to: &str) -> Result<Vec<EntityId>, SessionError> {
        let from_edge = self.edge(from)?;
        let to_edge = self.edge(to)?;
        if from == to {
            return Ok(vec![from.to_string()]);
        }

        let Some((_, nodes)) = astar(
            &self.graph,
            from_edge.to,
            |node| node == to_edge.from,
            |edge| self.edges.get(edge.weight()).map_or(f64::MAX, |e| e.length),
            |_| 0.0,
        ) else {
            return Ok(Vec::new());
        };

        let mut route = vec![from.to_string()];
        for pair in nodes.windows(2) {
            let Some(edge_index) = self.graph.find_edge(pair[0], pair[1]) else {
                return Ok(Vec::new());
            };
            route.push(self.graph[edge_index].clone());
        }
        route.push(to.to_string());
        Ok(route)
    }

    fn add_vehicle(
        &mut self,
        id: &str,
        route: &str,
        vehicle_type: &str,
    ) -> Result<(), SessionError> {
        if self.vehicles.contains_key(id) || self.is_vehicle_pending(id) {
            return Err(SessionError::InvalidArgument {
                detail: format!("vehicle {} already exists", id),
            });
        }
        let edges = self
            .routes
            .get(route)
            .cloned()
            .ok_or_else(|| SessionError::UnknownEntity { id: route.to_string() })?;
        if !vehicle_type.is_empty() && !self.vehicle_types.contains(vehicle_type) {
            return Err(SessionError::Rejected {
                detail: format!("unknown vehicle type '{}'", vehicle_type),
            });
        }

        self.departing.push((
            id.to_string(),
            LocalVehicle {
                route: edges,
                route_index: 0,
                distance_along_edge: 0.0,
                speed: 0.0,
                max_speed: DEFAULT_SPEED_LIMIT * 2.0,
                forced_speed: None,
                color: None,
                junction_edge: None,
            },
        ));
        Ok(())
    }

    fn set_vehicle_route(&mut self, id: &str, edges: Vec<EntityId>) -> Result<(), SessionError> {
        self.check_connected_edges(&edges)?;
        let vehicle = self.live_vehicle(id)?;
        if vehicle.junction_edge.is_some() {
            return Err(SessionError::Rejected {
                detail: format!("vehicle {} is crossing a junction", id),
            });
        }
        if vehicle.route[vehicle.route_index] != edges[0] {
            return Err(SessionError::InvalidArgument {
                detail: format!("route for {} must start on its current edge", id),
            });
        }
        vehicle.route = edges;
        vehicle.route_index = 0;
        Ok(())
    }
}

fn internal_edge_id(junction: &str) -> EntityId {
    format!(":{}_0", junction)
}

fn non_negative(speed: f64) -> Result<f64, SessionError> {
    if speed.is_finite() && speed >= 0.0 {
        Ok(speed)
    } else {
        Err(SessionError::InvalidArgument {
            detail: format!("speed {} out of range", speed),
        })
    }
}

/// Move one vehicle forward; returns true once it has left its last edge
fn advance_vehicle(
    vehicle: &mut LocalVehicle,
    edges: &BTreeMap<EntityId, LocalEdge>,
    graph: &DiGraph<EntityId, EntityId>,
    delta: f64,
) -> bool {
    if vehicle.junction_edge.take().is_some() {
        vehicle.route_index += 1;
        vehicle.distance_along_edge = 0.0;
        return false;
    }

    let Some(edge) = edges.get(&vehicle.route[vehicle.route_index]) else {
        return true;
    };

    let target = vehicle
        .forced_speed
        .unwrap_or_else(|| vehicle.max_speed.min(edge.speed_limit));
    vehicle.speed = if vehicle.speed < target {
        (vehicle.speed + ACCELERATION * delta).min(target)
    } else {
        target
    };
    vehicle.distance_along_edge += vehicle.speed * delta;

    if vehicle.distance_along_edge < edge.length {
        return false;
    }
    if vehicle.route_index + 1 >= vehicle.route.len() {
        return true;
    }
    vehicle.distance_along_edge = edge.length;
    vehicle.junction_edge = Some(internal_edge_id(&graph[edge.to]));
    false
}

impl Session for LocalSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn execute_read(&mut self, command: &ReadCommand) -> Result<Reply, SessionError> {
        self.check_link()?;

        let reply = match command {
            ReadCommand::VehicleIds => Reply::StrList(self.vehicles.keys().cloned().collect()),
            ReadCommand::VehicleCount => Reply::Int(self.vehicles.len() as i64),
            ReadCommand::VehicleSpeed(id) => Reply::Double(self.vehicle(id)?.speed),
            ReadCommand::VehicleRoadId(id) => Reply::Str(self.current_edge(self.vehicle(id)?)),
            ReadCommand::VehicleColor(id) => Reply::IntList(
                self.vehicle(id)?
                    .color
                    .map(|c| vec![c.r as i64, c.g as i64, c.b as i64, c.a as i64])
                    .unwrap_or_default(),
            ),
            ReadCommand::VehiclePosition(id) => {
                Reply::Position(self.vehicle_position(self.vehicle(id)?)?)
            }
            ReadCommand::EdgeIds => {
                let mut ids: Vec<EntityId> = self.edges.keys().cloned().collect();
                ids.extend(self.internal_edge_ids());
                Reply::StrList(ids)
            }
            ReadCommand::RouteIds => Reply::StrList(self.routes.keys().cloned().collect()),
            ReadCommand::RouteEdges(id) => Reply::StrList(
                self.routes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| SessionError::UnknownEntity { id: id.clone() })?,
            ),
            ReadCommand::LaneIds => Reply::StrList(
                self.edges.keys().map(|edge| format!("{}_0", edge)).collect(),
            ),
            ReadCommand::LaneLength(lane) => Reply::Double(
                self.edge_of_lane(lane)
                    .ok_or_else(|| SessionError::UnknownEntity { id: lane.clone() })?
                    .length,
            ),
            ReadCommand::TrafficLightIds => {
                Reply::StrList(self.traffic_lights.keys().cloned().collect())
            }
            ReadCommand::TrafficLightState(id) => {
                let light = self.traffic_light(id)?;
                Reply::Str(light.phases[light.phase].0.clone())
            }
            ReadCommand::TrafficLightPhase(id) => Reply::Int(self.traffic_light(id)?.phase as i64),
            ReadCommand::TrafficLightPhaseDuration(id) => {
                let light = self.traffic_light(id)?;
                Reply::Double(light.phases[light.phase].1)
            }
            ReadCommand::TrafficLightNextSwitch(id) => {
                let light = self.traffic_light(id)?;
                Reply::Double(light.phase_started + light.phases[light.phase].1)
            }
            ReadCommand::BusStopIds => Reply::StrList(self.bus_stops.keys().cloned().collect()),
            ReadCommand::BusStopName(id) => Reply::Str(self.bus_stop(id)?.name.clone()),
            ReadCommand::BusStopWaitingCount(id) => Reply::Int(self.bus_stop(id)?.waiting as i64),
            ReadCommand::FindRoute { from, to, .. } => Reply::StrList(self.find_route(from, to)?),
            ReadCommand::SimulationTime => Reply::Double(self.time),
        };

        Ok(reply)
    }

    fn execute_write(&mut self, command: &WriteCommand) -> Result<(), SessionError> {
        self.check_link()?;

        match command {
            WriteCommand::AddRoute { id, edges } => self.insert_route(id, edges.clone()),
            WriteCommand::AddVehicle {
                id,
                route,
                vehicle_type,
                ..
            } => self.add_vehicle(id, route, vehicle_type),
            WriteCommand::SetVehicleColor { id, color } => {
                self.live_vehicle(id)?.color = Some(*color);
                Ok(())
            }
            WriteCommand::SetVehicleMaxSpeed { id, speed } => {
                let speed = non_negative(*speed)?;
                self.live_vehicle(id)?.max_speed = speed;
                Ok(())
            }
            WriteCommand::SetVehicleSpeed { id, speed } => {
                let speed = non_negative(*speed)?;
                self.live_vehicle(id)?.forced_speed = Some(speed);
                Ok(())
            }
            WriteCommand::SetVehicleRoute { id, edges } => self.set_vehicle_route(id, edges.clone()),
            WriteCommand::SetTrafficLightPhase { id, phase } => {
                let time = self.time;
                let light = self
                    .traffic_lights
                    .get_mut(id)
                    .ok_or_else(|| SessionError::UnknownEntity { id: id.clone() })?;
                let index = usize::try_from(*phase)
                    .ok()
                    .filter(|index| *index < light.phases.len())
                    .ok_or_else(|| SessionError::InvalidArgument {
                        detail: format!("phase {} out of range for {}", phase, id),
                    })?;
                light.phase = index;
                light.phase_started = time;
                Ok(())
            }
        }
    }

    fn report_connection_fault(&mut self, error: &SessionError) {
        warn!("Local session marked broken: {}", error);
        self.faults_reported += 1;
        self.connected = false;
    }
}
