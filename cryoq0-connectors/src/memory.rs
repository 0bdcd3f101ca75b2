//! In-memory collaborators for tests and offline replays

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::{ArchiveExport, ConnectorError, ControlSystem, ExportRequest, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct Points {
    values: HashMap<String, VecDeque<String>>,
    writes: usize,
}

/// Control system holding point values in a map
///
/// A point may carry a script of successive values: each `get` consumes
/// one, and the last value sticks.
#[derive(Debug, Default)]
pub struct MemoryControlSystem {
    points: Mutex<Points>,
}

impl MemoryControlSystem {
    /// Empty control system; every point is unknown
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `values` to be returned by successive reads of `point`
    pub fn script<I, S>(&self, point: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = values.into_iter().map(Into::into).collect();
        lock(&self.points).values.insert(point.to_string(), queue);
    }

    /// Number of `set` calls so far
    pub fn write_count(&self) -> usize {
        lock(&self.points).writes
    }
}

impl ControlSystem for MemoryControlSystem {
    fn get(&self, point: &str) -> Result<String> {
        let mut points = lock(&self.points);
        let queue = points
            .values
            .get_mut(point)
            .ok_or_else(|| ConnectorError::UnknownPoint(point.to_string()))?;

        let value = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        value.ok_or_else(|| ConnectorError::UnknownPoint(point.to_string()))
    }

    fn set(&self, point: &str, value: &str) -> Result<()> {
        let mut points = lock(&self.points);
        points.values.insert(point.to_string(), VecDeque::from([value.to_string()]));
        points.writes += 1;
        Ok(())
    }
}

/// Archive answering every request with the same export
#[derive(Debug, Default)]
pub struct StaticArchive {
    export: Option<String>,
    requests: Mutex<Vec<ExportRequest>>,
}

impl StaticArchive {
    /// Archive returning `export` verbatim
    pub fn new(export: impl Into<String>) -> Self {
        Self { export: Some(export.into()), requests: Mutex::default() }
    }

    /// Archive whose every export fails
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ExportRequest> {
        lock(&self.requests).clone()
    }
}

impl ArchiveExport for StaticArchive {
    fn export(&self, request: &ExportRequest) -> Result<String> {
        lock(&self.requests).push(request.clone());
        self.export
            .clone()
            .ok_or_else(|| ConnectorError::Archive("archive unavailable".to_string()))
    }
}
