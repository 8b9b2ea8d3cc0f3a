//! Façade configuration

use super::types::Rgba;

/// Vehicle type used for injected vehicles
pub const DEFAULT_VEHICLE_TYPE: &str = "DEFAULT_VEHTYPE";

/// Upper bound on destination samples per route discovery
pub const ROUTE_DISCOVERY_TRIALS: usize = 10;

/// Leading character of simulator-internal junction edge ids
pub const INTERNAL_EDGE_PREFIX: char = ':';

/// Prefix of routes synthesized for injections onto a bare edge
pub const SYNTHESIZED_ROUTE_PREFIX: &str = "route_";

/// Color shown for a vehicle with neither a session nor a preferred color
pub const DEFAULT_VEHICLE_COLOR: Rgba = Rgba::new(255, 255, 0, 255);

/// Tunables of a [`TrafficFacade`](super::TrafficFacade)
#[derive(Debug, Clone, PartialEq)]
pub struct FacadeConfig {
    pub default_vehicle_type: String,
    pub route_trials: usize,
    pub internal_edge_prefix: char,
    pub synthesized_route_prefix: String,
    /// Drop every pending operation once a connection fault is observed
    pub clear_pending_on_fault: bool,
    pub default_color: Rgba,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            default_vehicle_type: DEFAULT_VEHICLE_TYPE.to_string(),
            route_trials: ROUTE_DISCOVERY_TRIALS,
            internal_edge_prefix: INTERNAL_EDGE_PREFIX,
            synthesized_route_prefix: SYNTHESIZED_ROUTE_PREFIX.to_string(),
            clear_pending_on_fault: true,
            default_color: DEFAULT_VEHICLE_COLOR,
        }
    }
}

impl FacadeConfig {
    /// Name of the single-edge route synthesized for `vehicle_id`
    pub fn synthesized_route_id(&self, vehicle_id: &str) -> String {
        format!("{}{}", self.synthesized_route_prefix, vehicle_id)
    }
}
