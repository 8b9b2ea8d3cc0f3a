//! Deferred mutations awaiting a ready entity
//!
//! A mutation that fails because its target is not ready yet is parked here
//! and replayed on every refresh until it sticks. At most one value is held
//! per (entity, kind); a newer value replaces the older one in place.

use log::debug;

use super::fault::{escalate, ConnectionFault};
use super::session::{Session, WriteCommand};
use super::types::{EntityId, Rgba};

/// The kinds of mutation that can be deferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    SetColor,
    SetMaxSpeed,
    SetRoute,
}

/// The value a deferred mutation will apply
#[derive(Debug, Clone, PartialEq)]
pub enum PendingValue {
    Color(Rgba),
    MaxSpeed(f64),
    Route(Vec<EntityId>),
}

impl PendingValue {
    pub fn kind(&self) -> OperationKind {
        match self {
            PendingValue::Color(_) => OperationKind::SetColor,
            PendingValue::MaxSpeed(_) => OperationKind::SetMaxSpeed,
            PendingValue::Route(_) => OperationKind::SetRoute,
        }
    }

    /// The session command that applies this value to `entity`
    pub fn to_command(&self, entity: &str) -> WriteCommand {
        let id = entity.to_string();
        match self {
            PendingValue::Color(color) => WriteCommand::SetVehicleColor { id, color: *color },
            PendingValue::MaxSpeed(speed) => WriteCommand::SetVehicleMaxSpeed { id, speed: *speed },
            PendingValue::Route(edges) => WriteCommand::SetVehicleRoute {
                id,
                edges: edges.clone(),
            },
        }
    }
}

/// A mutation waiting to be replayed
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredOperation {
    pub entity: EntityId,
    pub value: PendingValue,
}

impl DeferredOperation {
    pub fn kind(&self) -> OperationKind {
        self.value.kind()
    }
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations applied and removed
    pub applied: usize,
    /// Operations that failed again and stay queued
    pub retained: usize,
}

/// A drain pass cut short by a connection fault
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("drain interrupted after {} applied: {fault}", report.applied)]
pub struct DrainInterrupted {
    /// Progress made before the fault
    pub report: DrainReport,
    pub fault: ConnectionFault,
}

/// Pending mutations in insertion order
#[derive(Debug, Default, Clone)]
pub struct DeferredQueue {
    entries: Vec<DeferredOperation>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for `entity`, replacing any pending value of the same kind
    pub fn enqueue(&mut self, entity: &str, value: PendingValue) {
        let kind = value.kind();
        match self.position(entity, kind) {
            Some(index) => self.entries[index].value = value,
            None => self.entries.push(DeferredOperation {
                entity: entity.to_string(),
                value,
            }),
        }
    }

    /// Drop the pending value for (entity, kind), if any
    pub fn cancel(&mut self, entity: &str, kind: OperationKind) -> Option<PendingValue> {
        self.position(entity, kind)
            .map(|index| self.entries.remove(index).value)
    }

    pub fn get(&self, entity: &str, kind: OperationKind) -> Option<&PendingValue> {
        self.position(entity, kind)
            .map(|index| &self.entries[index].value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeferredOperation> {
        self.entries.iter()
    }

    /// Replay every pending operation against `session`
    ///
    /// Applied operations are removed. Operation faults leave the entry for
    /// the next pass. A connection fault stops the pass at once: entries
    /// already applied stay removed, the failing entry and everything after
    /// it stay queued untried, and the progress so far comes back with the
    /// fault.
    pub fn drain<S: Session + ?Sized>(&mut self, session: &mut S) -> Result<DrainReport, DrainInterrupted> {
        let mut report = DrainReport::default();
        let mut index = 0;

        while index < self.entries.len() {
            let operation = &self.entries[index];
            let command = operation.value.to_command(&operation.entity);

            let outcome = match escalate(session.execute_write(&command)) {
                Ok(outcome) => outcome,
                Err(fault) => return Err(DrainInterrupted { report, fault }),
            };

            match outcome {
                Ok(()) => {
                    let applied = self.entries.remove(index);
                    debug!("Applied deferred {:?} to {}", applied.kind(), applied.entity);
                    report.applied += 1;
                }
                Err(err) => {
                    debug!(
                        "Deferred {:?} for {} still pending: {}",
                        operation.kind(),
                        operation.entity,
                        err
                    );
                    report.retained += 1;
                    index += 1;
                }
            }
        }

        Ok(report)
    }

    fn position(&self, entity: &str, kind: OperationKind) -> Option<usize> {
        self.entries
            .iter()
            .position(|op| op.entity == entity && op.kind() == kind)
    }
}
