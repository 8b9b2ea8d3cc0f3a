//! Vehicle injection
//!
//! Injection is fire-and-forget with no rollback. Mutations that follow the
//! creation of the vehicle are parked in the deferred queue when the new
//! vehicle has not materialized yet.

use log::{debug, info, warn};

use super::client::TrafficFacade;
use super::deferred::{OperationKind, PendingValue};
use super::fault::ConnectionFault;
use super::session::{DepartParams, ReadCommand, Reply, Session, WriteCommand};
use super::types::{EntityId, Rgba};

/// Result of [`TrafficFacade::inject_vehicle`]
#[derive(Debug, Clone, PartialEq)]
pub enum InjectOutcome {
    /// The vehicle was created; follow-up mutations may still be pending
    Injected(InjectReport),
    /// Empty vehicle or route id; nothing was sent
    InvalidInput,
    /// The session was not ready; nothing was sent
    NotReady,
    /// The session refused to create the vehicle
    CreationFailed,
    /// A connection fault cut the injection short
    ConnectionLost,
}

impl InjectOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InjectOutcome::Injected(_))
    }
}

/// Details of a successful injection
#[derive(Debug, Clone, PartialEq)]
pub struct InjectReport {
    pub route_id: EntityId,
    /// Whether `route_id` was synthesized from a bare edge
    pub synthesized_route: bool,
    /// The vehicle type the session accepted
    pub vehicle_type: String,
    /// The longer route found for a bare-edge injection, if any
    pub extended_route: Option<Vec<EntityId>>,
    /// Mutations that could not be applied yet
    pub deferred: Vec<OperationKind>,
}

impl<S: Session> TrafficFacade<S> {
    /// Create a vehicle on a route, or on a bare edge
    ///
    /// # Arguments
    /// * `vehicle_id` - Id of the new vehicle
    /// * `route_or_edge` - An existing route id, or an edge id to start on
    /// * `speed` - Maximum speed in m/s; ignored unless positive
    /// * `color` - Display color, remembered as the vehicle's preferred color
    pub fn inject_vehicle(
        &mut self,
        vehicle_id: &str,
        route_or_edge: &str,
        speed: f64,
        color: Rgba,
    ) -> InjectOutcome {
        if vehicle_id.is_empty() {
            debug!("Ignoring injection with empty vehicle id");
            return InjectOutcome::InvalidInput;
        }
        self.preferred_colors.insert(vehicle_id.to_string(), color);

        if route_or_edge.is_empty() {
            debug!("Ignoring injection of {} with empty route", vehicle_id);
            return InjectOutcome::InvalidInput;
        }
        if !self.session.is_ready() {
            warn!("Cannot inject {}: session not ready", vehicle_id);
            return InjectOutcome::NotReady;
        }

        match self.try_inject(vehicle_id, route_or_edge, speed, color) {
            Ok(outcome) => outcome,
            Err(fault) => {
                warn!("Injection of {} interrupted", vehicle_id);
                self.handle_connection_fault(fault);
                InjectOutcome::ConnectionLost
            }
        }
    }

    fn try_inject(
        &mut self,
        vehicle_id: &str,
        route_or_edge: &str,
        speed: f64,
        color: Rgba,
    ) -> Result<InjectOutcome, ConnectionFault> {
        let Some((route_id, synthesized_route)) = self.resolve_route(vehicle_id, route_or_edge)?
        else {
            return Ok(InjectOutcome::CreationFailed);
        };

        let Some(vehicle_type) = self.create_vehicle(vehicle_id, &route_id)? else {
            warn!("Session refused to create vehicle {}", vehicle_id);
            return Ok(InjectOutcome::CreationFailed);
        };

        let mut deferred = Vec::new();

        let mut extended_route = None;
        if synthesized_route {
            extended_route = self.discover_route(route_or_edge, &vehicle_type, true)?;
            match &extended_route {
                Some(edges) => {
                    if self.apply_tracked(vehicle_id, PendingValue::Route(edges.clone()))? {
                        deferred.push(OperationKind::SetRoute);
                    }
                }
                None => debug!("No onward route from {} for {}", route_or_edge, vehicle_id),
            }
        }

        if self.apply_tracked(vehicle_id, PendingValue::Color(color))? {
            deferred.push(OperationKind::SetColor);
        }

        if speed > 0.0 && self.apply_tracked(vehicle_id, PendingValue::MaxSpeed(speed))? {
            deferred.push(OperationKind::SetMaxSpeed);
        }

        info!(
            "Injected vehicle {} on route {} ({} deferred)",
            vehicle_id,
            route_id,
            deferred.len()
        );

        Ok(InjectOutcome::Injected(InjectReport {
            route_id,
            synthesized_route,
            vehicle_type,
            extended_route,
            deferred,
        }))
    }

    /// Use an existing route, or register a single-edge route for a bare edge
    ///
    /// Returns `None` when the synthesized route id is already taken by a
    /// route other than the single edge `route_or_edge`.
    fn resolve_route(
        &mut self,
        vehicle_id: &str,
        route_or_edge: &str,
    ) -> Result<Option<(EntityId, bool)>, ConnectionFault> {
        let routes = self
            .query(&ReadCommand::RouteIds)?
            .and_then(Reply::into_list)
            .unwrap_or_default();

        if routes.iter().any(|route| route == route_or_edge) {
            return Ok(Some((route_or_edge.to_string(), false)));
        }

        let route_id = self.config.synthesized_route_id(vehicle_id);
        let edges = vec![route_or_edge.to_string()];
        let command = WriteCommand::AddRoute {
            id: route_id.clone(),
            edges: edges.clone(),
        };
        if let Err(err) = self.write(&command)? {
            let registered = self
                .query(&ReadCommand::RouteEdges(route_id.clone()))?
                .and_then(Reply::into_list);
            if registered.as_ref() != Some(&edges) {
                warn!(
                    "Could not register route {} on {}: {}",
                    route_id, route_or_edge, err
                );
                return Ok(None);
            }
            debug!("Reusing registered route {} on {}", route_id, route_or_edge);
        }
        Ok(Some((route_id, true)))
    }

    /// Add the vehicle with the default type, then with an empty type.
    /// Returns the accepted type, or `None` if both attempts failed.
    fn create_vehicle(
        &mut self,
        vehicle_id: &str,
        route_id: &str,
    ) -> Result<Option<String>, ConnectionFault> {
        let default_type = self.config.default_vehicle_type.clone();

        for vehicle_type in [default_type, String::new()] {
            let command = WriteCommand::AddVehicle {
                id: vehicle_id.to_string(),
                route: route_id.to_string(),
                vehicle_type: vehicle_type.clone(),
                params: DepartParams::default(),
            };
            match self.write(&command)? {
                Ok(()) => return Ok(Some(vehicle_type)),
                Err(err) => debug!(
                    "Adding {} with type '{}' failed: {}",
                    vehicle_id, vehicle_type, err
                ),
            }
        }

        Ok(None)
    }

    /// Apply now or defer; returns whether the mutation was deferred
    fn apply_tracked(&mut self, vehicle_id: &str, value: PendingValue) -> Result<bool, ConnectionFault> {
        let kind = value.kind();
        self.apply_or_defer(vehicle_id, value)?;
        Ok(self.pending.get(vehicle_id, kind).is_some())
    }
}
