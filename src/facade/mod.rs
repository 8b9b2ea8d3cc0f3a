//! Resilient façade over a live traffic-simulation session
//!
//! This module keeps a caller's intent consistent with a remote session that
//! can be briefly unavailable, can reject mutations on entities that have not
//! materialized yet, and answers with loosely-typed payloads. It can be
//! exercised end to end against the in-process [`LocalSession`].

mod aggregator;
mod client;
mod config;
mod deferred;
mod fault;
mod injector;
mod local;
mod route_discovery;
mod session;
mod types;

pub use aggregator::compute_edge_stats;
pub use client::{TrafficFacade, NO_PHASE, NO_READING, STATE_UNAVAILABLE};
pub use config::{
    FacadeConfig, DEFAULT_VEHICLE_COLOR, DEFAULT_VEHICLE_TYPE, INTERNAL_EDGE_PREFIX,
    ROUTE_DISCOVERY_TRIALS, SYNTHESIZED_ROUTE_PREFIX,
};
pub use deferred::{
    DeferredOperation, DeferredQueue, DrainInterrupted, DrainReport, OperationKind, PendingValue,
};
pub use fault::{classify, escalate, ConnectionFault, Fault, SessionError};
pub use injector::{InjectOutcome, InjectReport};
pub use local::{LocalSession, ACCELERATION, DEFAULT_SPEED_LIMIT};
pub use route_discovery::{find_reachable_route, find_reachable_route_with};
pub use session::{DepartParams, ReadCommand, Reply, Session, WriteCommand};
pub use types::{
    is_internal_edge, EdgeStats, EntityId, Position2D, Rgba, VehicleRow, VehicleSample,
    VehicleState,
};
