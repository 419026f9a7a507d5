use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use glint_proto::{Command, PackedHash};

use crate::accessory::{Accessory, TransportError};
use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::arbitrator::Clock;

#[derive(Default)]
struct FakeState {
    commands: Vec<Command>,
    hash: PackedHash,
    hash_writes: Vec<PackedHash>,
    /// `None` means writes never fail
    writes_left: Option<usize>,
    fail_reads: bool,
}

/// In-memory accessory that records what it was sent
pub struct FakeAccessory {
    name: String,
    state: Mutex<FakeState>,
}

impl FakeAccessory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn set_hash(&self, hash: PackedHash) {
        self.state.lock().unwrap().hash = hash;
    }

    pub fn hash(&self) -> PackedHash {
        self.state.lock().unwrap().hash
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn hash_writes(&self) -> Vec<PackedHash> {
        self.state.lock().unwrap().hash_writes.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().writes_left = fail.then_some(0);
    }

    /// Accept `n` more writes, then fail every one after
    pub fn fail_writes_after(&self, n: usize) {
        self.state.lock().unwrap().writes_left = Some(n);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }
}

fn take_write(state: &mut FakeState) -> Result<(), TransportError> {
    match &mut state.writes_left {
        Some(0) => Err(TransportError::Disconnected),
        Some(n) => {
            *n -= 1;
            Ok(())
        }
        None => Ok(()),
    }
}

#[async_trait]
impl Accessory for FakeAccessory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_command(&self, command: Command) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        take_write(&mut state)?;
        state.commands.push(command);
        Ok(())
    }

    async fn read_configuration_hash(&self) -> Result<PackedHash, TransportError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(TransportError::Io("read failed".to_string()));
        }
        Ok(state.hash)
    }

    async fn write_configuration_hash(&self, hash: PackedHash) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        take_write(&mut state)?;
        state.hash = hash;
        state.hash_writes.push(hash);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
