//! The session collaborator boundary
//!
//! The façade never talks to a simulator directly. It issues typed read and
//! write commands through the [`Session`] trait and normalizes the
//! loosely-typed [`Reply`] values that come back.

use super::fault::SessionError;
use super::types::{EntityId, Position2D, Rgba};

/// Queries understood by a session
#[derive(Debug, Clone, PartialEq)]
pub enum ReadCommand {
    VehicleIds,
    VehicleCount,
    VehicleSpeed(EntityId),
    VehicleRoadId(EntityId),
    VehicleColor(EntityId),
    VehiclePosition(EntityId),
    EdgeIds,
    RouteIds,
    /// Edge sequence of a registered route
    RouteEdges(EntityId),
    LaneIds,
    LaneLength(EntityId),
    TrafficLightIds,
    TrafficLightState(EntityId),
    TrafficLightPhase(EntityId),
    TrafficLightPhaseDuration(EntityId),
    TrafficLightNextSwitch(EntityId),
    BusStopIds,
    BusStopName(EntityId),
    BusStopWaitingCount(EntityId),
    /// Ask the routing engine for an edge sequence from `from` to `to`
    FindRoute {
        from: EntityId,
        to: EntityId,
        vehicle_type: String,
    },
    SimulationTime,
}

/// Depart and arrival parameters for a new vehicle, in the session's string form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartParams {
    pub depart: String,
    pub depart_lane: String,
    pub depart_pos: String,
    pub depart_speed: String,
    pub arrival_lane: String,
    pub arrival_pos: String,
    pub arrival_speed: String,
}

impl Default for DepartParams {
    fn default() -> Self {
        Self {
            depart: "now".to_string(),
            depart_lane: "first".to_string(),
            depart_pos: "base".to_string(),
            depart_speed: "0".to_string(),
            arrival_lane: "current".to_string(),
            arrival_pos: "max".to_string(),
            arrival_speed: "current".to_string(),
        }
    }
}

/// Mutations understood by a session
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    AddRoute {
        id: EntityId,
        edges: Vec<EntityId>,
    },
    AddVehicle {
        id: EntityId,
        route: EntityId,
        vehicle_type: String,
        params: DepartParams,
    },
    SetVehicleColor {
        id: EntityId,
        color: Rgba,
    },
    SetVehicleMaxSpeed {
        id: EntityId,
        speed: f64,
    },
    SetVehicleSpeed {
        id: EntityId,
        speed: f64,
    },
    SetVehicleRoute {
        id: EntityId,
        edges: Vec<EntityId>,
    },
    SetTrafficLightPhase {
        id: EntityId,
        phase: i32,
    },
}

/// A loosely-typed reply payload
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Int(i64),
    Double(f64),
    Str(String),
    StrList(Vec<String>),
    IntList(Vec<i64>),
    Position(Position2D),
}

impl Reply {
    /// Numeric value, accepting either integer or floating replies
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reply::Double(value) => Some(*value),
            Reply::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Reply::Int(value) => Some(*value),
            Reply::Double(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Reply::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            Reply::StrList(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<Position2D> {
        match self {
            Reply::Position(position) => Some(*position),
            _ => None,
        }
    }

    /// A color, if the reply is a well-formed component list
    pub fn as_color(&self) -> Option<Rgba> {
        match self {
            Reply::IntList(components) => Rgba::from_components(components),
            _ => None,
        }
    }
}

/// A live command/response connection to a simulation
///
/// Implementations own connection management and protocol encoding; calls
/// block until the session replies or fails.
pub trait Session {
    /// Whether the underlying connection is up
    fn is_connected(&self) -> bool;

    /// Whether commands can be executed right now
    fn is_ready(&self) -> bool {
        self.is_connected()
    }

    fn execute_read(&mut self, command: &ReadCommand) -> Result<Reply, SessionError>;

    fn execute_write(&mut self, command: &WriteCommand) -> Result<(), SessionError>;

    /// Tell the session owner the connection must be considered broken
    fn report_connection_fault(&mut self, error: &SessionError);
}
