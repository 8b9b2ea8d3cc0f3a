//! The façade callers use to read and steer a simulation session
//!
//! Reads return fixed sentinel values when the session is not ready or a
//! query fails. Mutations never fail outward: an operation fault parks the
//! mutation in the deferred queue and a connection fault is handed to the
//! session owner.

use log::{debug, error, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

use super::aggregator::compute_edge_stats;
use super::config::FacadeConfig;
use super::deferred::{DeferredQueue, DrainReport, OperationKind, PendingValue};
use super::fault::{escalate, ConnectionFault, SessionError};
use super::route_discovery::find_reachable_route_with;
use super::session::{ReadCommand, Reply, Session, WriteCommand};
use super::types::{is_internal_edge, EdgeStats, EntityId, Rgba, VehicleRow, VehicleSample, VehicleState};

/// Returned by [`TrafficFacade::traffic_light_state`] when no state is available
pub const STATE_UNAVAILABLE: &str = "N/A";

/// Returned by numeric accessors that have no reading
pub const NO_READING: f64 = -1.0;

/// Returned by [`TrafficFacade::traffic_light_phase`] when no phase is available
pub const NO_PHASE: i32 = -1;

/// Resilient client-side view of a simulation session
pub struct TrafficFacade<S: Session> {
    pub(crate) session: S,

    /// Mutations waiting for their entity to become ready
    pub(crate) pending: DeferredQueue,

    /// Caller-declared colors per vehicle
    pub(crate) preferred_colors: HashMap<EntityId, Rgba>,

    pub(crate) config: FacadeConfig,

    /// Optional seeded RNG for reproducible route discovery
    rng: Option<StdRng>,
}

impl<S: Session> TrafficFacade<S> {
    fn new_internal(session: S, config: FacadeConfig, rng: Option<StdRng>) -> Self {
        Self {
            session,
            pending: DeferredQueue::new(),
            preferred_colors: HashMap::new(),
            config,
            rng,
        }
    }

    pub fn new(session: S) -> Self {
        Self::new_internal(session, FacadeConfig::default(), None)
    }

    /// Create a façade with a seeded RNG for reproducible route discovery
    pub fn new_with_seed(session: S, seed: u64) -> Self {
        Self::new_internal(session, FacadeConfig::default(), Some(StdRng::seed_from_u64(seed)))
    }

    pub fn with_config(session: S, config: FacadeConfig, seed: Option<u64>) -> Self {
        Self::new_internal(session, config, seed.map(StdRng::seed_from_u64))
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn pending(&self) -> &DeferredQueue {
        &self.pending
    }

    pub fn preferred_color(&self, vehicle_id: &str) -> Option<Rgba> {
        self.preferred_colors.get(vehicle_id).copied()
    }

    // ----------------------------------------------------------------------
    // Fault handling
    // ----------------------------------------------------------------------

    /// Report a connection fault to the session owner and invalidate queued state
    pub(crate) fn handle_connection_fault(&mut self, fault: ConnectionFault) {
        error!("Connection fault: {}", fault.error());
        self.session.report_connection_fault(fault.error());

        if self.config.clear_pending_on_fault && !self.pending.is_empty() {
            warn!(
                "Dropping {} pending operations after connection fault",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Run a batch against the session, falling back to `fallback` when the
    /// session is not ready or the batch hits a connection fault
    fn guarded<T>(
        &mut self,
        fallback: T,
        batch: impl FnOnce(&mut Self) -> Result<T, ConnectionFault>,
    ) -> T {
        if !self.session.is_ready() {
            return fallback;
        }
        match batch(self) {
            Ok(value) => value,
            Err(fault) => {
                self.handle_connection_fault(fault);
                fallback
            }
        }
    }

    /// Execute a read; `Ok(None)` on an operation fault
    pub(crate) fn query(&mut self, command: &ReadCommand) -> Result<Option<Reply>, ConnectionFault> {
        match escalate(self.session.execute_read(command))? {
            Ok(reply) => Ok(Some(reply)),
            Err(err) => {
                debug!("{:?} failed: {}", command, err);
                Ok(None)
            }
        }
    }

    /// Execute a read and decode it; undecodable replies count as operation faults
    fn query_as<T>(
        &mut self,
        command: ReadCommand,
        decode: impl FnOnce(Reply) -> Option<T>,
    ) -> Result<Option<T>, ConnectionFault> {
        let decoded = self.query(&command)?.and_then(decode);
        if decoded.is_none() {
            debug!("{:?} produced no usable value", command);
        }
        Ok(decoded)
    }

    fn query_list(&mut self, command: ReadCommand) -> Result<Vec<String>, ConnectionFault> {
        Ok(self.query_as(command, Reply::into_list)?.unwrap_or_default())
    }

    /// Execute a write; `Ok(Err(_))` on an operation fault
    pub(crate) fn write(
        &mut self,
        command: &WriteCommand,
    ) -> Result<Result<(), SessionError>, ConnectionFault> {
        escalate(self.session.execute_write(command))
    }

    // ----------------------------------------------------------------------
    // Deferred operations
    // ----------------------------------------------------------------------

    /// Replay pending operations against the session
    ///
    /// Called at the start of every read that depends on entity state.
    pub fn refresh(&mut self) -> DrainReport {
        if self.pending.is_empty() || !self.session.is_ready() {
            return DrainReport::default();
        }
        match self.pending.drain(&mut self.session) {
            Ok(report) => {
                if report.applied > 0 {
                    debug!(
                        "Drained {} deferred operations, {} still pending",
                        report.applied, report.retained
                    );
                }
                report
            }
            Err(interrupted) => {
                debug!(
                    "Drained {} deferred operations before connection fault",
                    interrupted.report.applied
                );
                self.handle_connection_fault(interrupted.fault);
                interrupted.report
            }
        }
    }

    /// Apply a mutation now, or park it for replay if the entity is not ready
    pub(crate) fn apply_or_defer(
        &mut self,
        entity: &str,
        value: PendingValue,
    ) -> Result<(), ConnectionFault> {
        let command = value.to_command(entity);
        match self.write(&command)? {
            Ok(()) => {
                self.pending.cancel(entity, value.kind());
            }
            Err(err) => {
                debug!("Deferring {:?} for {}: {}", value.kind(), entity, err);
                self.pending.enqueue(entity, value);
            }
        }
        Ok(())
    }

    fn mutate_deferred(&mut self, entity: &str, value: PendingValue) {
        self.guarded((), |this| this.apply_or_defer(entity, value));
    }

    /// Apply a mutation with no retry; operation faults are only logged
    fn mutate_once(&mut self, command: WriteCommand) {
        self.guarded((), |this| {
            if let Err(err) = this.write(&command)? {
                warn!("{:?} failed: {}", command, err);
            }
            Ok(())
        });
    }

    // ----------------------------------------------------------------------
    // Vehicles
    // ----------------------------------------------------------------------

    pub fn vehicle_count(&mut self) -> usize {
        self.guarded(0, |this| {
            Ok(this
                .query_as(ReadCommand::VehicleCount, |r| r.as_i64())?
                .and_then(|count| usize::try_from(count).ok())
                .unwrap_or(0))
        })
    }

    pub fn vehicle_ids(&mut self) -> Vec<EntityId> {
        self.guarded(Vec::new(), |this| this.query_list(ReadCommand::VehicleIds))
    }

    /// Snapshot of one vehicle, or `None` if any part of it is unavailable
    pub fn vehicle_state(&mut self, vehicle_id: &str) -> Option<VehicleState> {
        if vehicle_id.is_empty() {
            return None;
        }
        self.refresh();
        self.guarded(None, |this| {
            let id = vehicle_id.to_string();
            let Some(position) =
                this.query_as(ReadCommand::VehiclePosition(id.clone()), |r| r.as_position())?
            else {
                return Ok(None);
            };
            let Some(speed) = this.query_as(ReadCommand::VehicleSpeed(id.clone()), |r| r.as_f64())?
            else {
                return Ok(None);
            };
            let Some(edge) =
                this.query_as(ReadCommand::VehicleRoadId(id.clone()), Reply::into_string)?
            else {
                return Ok(None);
            };
            Ok(Some(VehicleState {
                id,
                x: position.x,
                y: position.y,
                speed,
                edge,
            }))
        })
    }

    /// Display rows for every live vehicle
    ///
    /// Vehicles that vanish mid-scan are skipped.
    pub fn vehicle_rows(&mut self) -> Vec<VehicleRow> {
        self.refresh();
        self.guarded(Vec::new(), |this| {
            let ids = this.query_list(ReadCommand::VehicleIds)?;
            let mut rows = Vec::with_capacity(ids.len());

            for id in ids {
                let Some(sample) = this.sample_vehicle(&id)? else {
                    continue;
                };
                let reported = this.query_as(ReadCommand::VehicleColor(id.clone()), |r| r.as_color())?;
                let color = this.display_color(&id, reported);
                rows.push(VehicleRow {
                    id,
                    speed: sample.speed,
                    edge: sample.edge,
                    color,
                });
            }

            Ok(rows)
        })
    }

    /// Per-edge statistics over all regular edges
    pub fn edge_stats(&mut self) -> HashMap<EntityId, EdgeStats> {
        self.refresh();
        self.guarded(HashMap::new(), |this| {
            let prefix = this.config.internal_edge_prefix;
            let edges: Vec<EntityId> = this
                .query_list(ReadCommand::EdgeIds)?
                .into_iter()
                .filter(|edge| !is_internal_edge(edge, prefix))
                .collect();

            let mut samples = Vec::new();
            for id in this.query_list(ReadCommand::VehicleIds)? {
                if let Some(sample) = this.sample_vehicle(&id)? {
                    samples.push(sample);
                }
            }

            Ok(compute_edge_stats(&edges, &samples))
        })
    }

    fn sample_vehicle(&mut self, id: &str) -> Result<Option<VehicleSample>, ConnectionFault> {
        let Some(speed) = self.query_as(ReadCommand::VehicleSpeed(id.to_string()), |r| r.as_f64())?
        else {
            return Ok(None);
        };
        let Some(edge) =
            self.query_as(ReadCommand::VehicleRoadId(id.to_string()), Reply::into_string)?
        else {
            return Ok(None);
        };
        Ok(Some(VehicleSample {
            id: id.to_string(),
            edge,
            speed: speed.max(0.0),
        }))
    }

    /// The session's color when well-formed, else the caller's preferred color
    fn display_color(&self, vehicle_id: &str, reported: Option<Rgba>) -> Rgba {
        reported
            .or_else(|| self.preferred_color(vehicle_id))
            .unwrap_or(self.config.default_color)
    }

    pub fn set_vehicle_color(&mut self, vehicle_id: &str, color: Rgba) {
        if vehicle_id.is_empty() {
            debug!("Ignoring color change for empty vehicle id");
            return;
        }
        self.preferred_colors.insert(vehicle_id.to_string(), color);
        self.mutate_deferred(vehicle_id, PendingValue::Color(color));
    }

    pub fn set_vehicle_max_speed(&mut self, vehicle_id: &str, speed: f64) {
        if vehicle_id.is_empty() || !speed.is_finite() || speed < 0.0 {
            debug!("Ignoring max speed {} for vehicle '{}'", speed, vehicle_id);
            return;
        }
        self.mutate_deferred(vehicle_id, PendingValue::MaxSpeed(speed));
    }

    pub fn set_vehicle_route(&mut self, vehicle_id: &str, edges: Vec<EntityId>) {
        if vehicle_id.is_empty() || edges.is_empty() {
            debug!("Ignoring route change for vehicle '{}'", vehicle_id);
            return;
        }
        self.mutate_deferred(vehicle_id, PendingValue::Route(edges));
    }

    /// Set the current speed; not retried if the vehicle is not ready
    pub fn set_vehicle_speed(&mut self, vehicle_id: &str, speed: f64) {
        if vehicle_id.is_empty() || !speed.is_finite() || speed < 0.0 {
            debug!("Ignoring speed {} for vehicle '{}'", speed, vehicle_id);
            return;
        }
        self.mutate_once(WriteCommand::SetVehicleSpeed {
            id: vehicle_id.to_string(),
            speed,
        });
    }

    /// Discover a route of two or more edges leaving `start`
    pub fn find_reachable_route(
        &mut self,
        start: &str,
        vehicle_type: &str,
        exclude_internal: bool,
    ) -> Option<Vec<EntityId>> {
        if start.is_empty() {
            return None;
        }
        self.guarded(None, |this| this.discover_route(start, vehicle_type, exclude_internal))
    }

    pub(crate) fn discover_route(
        &mut self,
        start: &str,
        vehicle_type: &str,
        exclude_internal: bool,
    ) -> Result<Option<Vec<EntityId>>, ConnectionFault> {
        let trials = self.config.route_trials;
        let prefix = self.config.internal_edge_prefix;
        match &mut self.rng {
            Some(rng) => find_reachable_route_with(
                &mut self.session,
                rng,
                start,
                vehicle_type,
                exclude_internal,
                trials,
                prefix,
            ),
            None => find_reachable_route_with(
                &mut self.session,
                &mut rand::rng(),
                start,
                vehicle_type,
                exclude_internal,
                trials,
                prefix,
            ),
        }
    }

    // ----------------------------------------------------------------------
    // Network
    // ----------------------------------------------------------------------

    pub fn edge_ids(&mut self) -> Vec<EntityId> {
        self.guarded(Vec::new(), |this| this.query_list(ReadCommand::EdgeIds))
    }

    pub fn route_ids(&mut self) -> Vec<EntityId> {
        self.guarded(Vec::new(), |this| this.query_list(ReadCommand::RouteIds))
    }

    pub fn lane_ids(&mut self) -> Vec<EntityId> {
        self.guarded(Vec::new(), |this| this.query_list(ReadCommand::LaneIds))
    }

    /// Lane length in meters, or [`NO_READING`]
    pub fn lane_length(&mut self, lane_id: &str) -> f64 {
        if lane_id.is_empty() {
            return NO_READING;
        }
        self.guarded(NO_READING, |this| {
            Ok(this
                .query_as(ReadCommand::LaneLength(lane_id.to_string()), |r| r.as_f64())?
                .unwrap_or(NO_READING))
        })
    }

    /// Simulation clock in seconds, or [`NO_READING`]
    pub fn simulation_time(&mut self) -> f64 {
        self.guarded(NO_READING, |this| {
            Ok(this
                .query_as(ReadCommand::SimulationTime, |r| r.as_f64())?
                .unwrap_or(NO_READING))
        })
    }

    // ----------------------------------------------------------------------
    // Traffic lights
    // ----------------------------------------------------------------------

    pub fn traffic_light_ids(&mut self) -> Vec<EntityId> {
        self.guarded(Vec::new(), |this| this.query_list(ReadCommand::TrafficLightIds))
    }

    /// Signal state string such as `"GrGr"`, or [`STATE_UNAVAILABLE`]
    pub fn traffic_light_state(&mut self, tls_id: &str) -> String {
        if tls_id.is_empty() {
            return STATE_UNAVAILABLE.to_string();
        }
        self.guarded(STATE_UNAVAILABLE.to_string(), |this| {
            Ok(this
                .query_as(
                    ReadCommand::TrafficLightState(tls_id.to_string()),
                    Reply::into_string,
                )?
                .unwrap_or_else(|| STATE_UNAVAILABLE.to_string()))
        })
    }

    pub fn traffic_light_phase(&mut self, tls_id: &str) -> i32 {
        if tls_id.is_empty() {
            return NO_PHASE;
        }
        self.guarded(NO_PHASE, |this| {
            Ok(this
                .query_as(ReadCommand::TrafficLightPhase(tls_id.to_string()), |r| r.as_i64())?
                .and_then(|phase| i32::try_from(phase).ok())
                .unwrap_or(NO_PHASE))
        })
    }

    pub fn traffic_light_phase_duration(&mut self, tls_id: &str) -> f64 {
        if tls_id.is_empty() {
            return NO_READING;
        }
        self.guarded(NO_READING, |this| {
            Ok(this
                .query_as(
                    ReadCommand::TrafficLightPhaseDuration(tls_id.to_string()),
                    |r| r.as_f64(),
                )?
                .unwrap_or(NO_READING))
        })
    }

    /// Absolute simulation time of the next phase switch
    pub fn traffic_light_next_switch(&mut self, tls_id: &str) -> f64 {
        if tls_id.is_empty() {
            return NO_READING;
        }
        self.guarded(NO_READING, |this| {
            Ok(this
                .query_as(
                    ReadCommand::TrafficLightNextSwitch(tls_id.to_string()),
                    |r| r.as_f64(),
                )?
                .unwrap_or(NO_READING))
        })
    }

    pub fn set_traffic_light_phase(&mut self, tls_id: &str, phase: i32) {
        if tls_id.is_empty() || phase < 0 {
            debug!("Ignoring phase {} for traffic light '{}'", phase, tls_id);
            return;
        }
        self.mutate_once(WriteCommand::SetTrafficLightPhase {
            id: tls_id.to_string(),
            phase,
        });
    }

    // ----------------------------------------------------------------------
    // Bus stops
    // ----------------------------------------------------------------------

    pub fn bus_stop_ids(&mut self) -> Vec<EntityId> {
        self.guarded(Vec::new(), |this| this.query_list(ReadCommand::BusStopIds))
    }

    pub fn bus_stop_name(&mut self, stop_id: &str) -> String {
        if stop_id.is_empty() {
            return String::new();
        }
        self.guarded(String::new(), |this| {
            Ok(this
                .query_as(ReadCommand::BusStopName(stop_id.to_string()), Reply::into_string)?
                .unwrap_or_default())
        })
    }

    pub fn bus_stop_waiting_count(&mut self, stop_id: &str) -> usize {
        if stop_id.is_empty() {
            return 0;
        }
        self.guarded(0, |this| {
            Ok(this
                .query_as(ReadCommand::BusStopWaitingCount(stop_id.to_string()), |r| {
                    r.as_i64()
                })?
                .and_then(|count| usize::try_from(count).ok())
                .unwrap_or(0))
        })
    }
}
