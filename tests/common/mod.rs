//! Scripted session double shared by the integration tests

#![allow(dead_code)]

use traffic_link::facade::{ReadCommand, Reply, Session, SessionError, WriteCommand};

type ReadRule = Box<dyn FnMut(&ReadCommand) -> Result<Reply, SessionError>>;
type WriteRule = Box<dyn FnMut(&WriteCommand) -> Result<(), SessionError>>;

/// A session whose replies are produced by closures and whose traffic is recorded
pub struct ScriptedSession {
    pub connected: bool,
    pub reads: Vec<ReadCommand>,
    pub writes: Vec<WriteCommand>,
    pub reported_faults: Vec<SessionError>,
    read_rule: ReadRule,
    write_rule: WriteRule,
}

impl ScriptedSession {
    /// Every read fails as an unknown entity, every write succeeds
    pub fn new() -> Self {
        Self {
            connected: true,
            reads: Vec::new(),
            writes: Vec::new(),
            reported_faults: Vec::new(),
            read_rule: Box::new(|command| {
                Err(SessionError::UnknownEntity {
                    id: format!("{:?}", command),
                })
            }),
            write_rule: Box::new(|_| Ok(())),
        }
    }

    pub fn disconnected() -> Self {
        let mut session = Self::new();
        session.connected = false;
        session
    }

    pub fn on_read(
        mut self,
        rule: impl FnMut(&ReadCommand) -> Result<Reply, SessionError> + 'static,
    ) -> Self {
        self.read_rule = Box::new(rule);
        self
    }

    pub fn on_write(
        mut self,
        rule: impl FnMut(&WriteCommand) -> Result<(), SessionError> + 'static,
    ) -> Self {
        self.write_rule = Box::new(rule);
        self
    }

    pub fn path_queries(&self) -> usize {
        self.reads
            .iter()
            .filter(|command| matches!(command, ReadCommand::FindRoute { .. }))
            .count()
    }
}

impl Session for ScriptedSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn execute_read(&mut self, command: &ReadCommand) -> Result<Reply, SessionError> {
        self.reads.push(command.clone());
        (self.read_rule)(command)
    }

    fn execute_write(&mut self, command: &WriteCommand) -> Result<(), SessionError> {
        self.writes.push(command.clone());
        (self.write_rule)(command)
    }

    fn report_connection_fault(&mut self, error: &SessionError) {
        self.reported_faults.push(error.clone());
        self.connected = false;
    }
}

pub fn unknown(id: &str) -> SessionError {
    SessionError::UnknownEntity { id: id.to_string() }
}

pub fn broken() -> SessionError {
    SessionError::Transport {
        detail: "socket closed".to_string(),
    }
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// The entity a write command targets
pub fn target(command: &WriteCommand) -> &str {
    match command {
        WriteCommand::AddRoute { id, .. }
        | WriteCommand::AddVehicle { id, .. }
        | WriteCommand::SetVehicleColor { id, .. }
        | WriteCommand::SetVehicleMaxSpeed { id, .. }
        | WriteCommand::SetVehicleSpeed { id, .. }
        | WriteCommand::SetVehicleRoute { id, .. }
        | WriteCommand::SetTrafficLightPhase { id, .. } => id,
    }
}
