//! Session cache keyed by session identity
//!
//! Two requests with the same identity share one session. Identity is a
//! plain struct key so no two distinct parameter sets can collide.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channels::CryomoduleId;
use crate::session::SessionWindow;

/// Identity of a calibration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationKey {
    /// Window start
    pub start: NaiveDateTime,
    /// Window end
    pub end: NaiveDateTime,
    /// Sample interval (s)
    pub sample_interval_secs: u32,
    /// Cryomodule identifiers
    pub ids: CryomoduleId,
}

impl CalibrationKey {
    /// Key of a window over a cryomodule
    pub fn new(window: &SessionWindow, ids: CryomoduleId) -> Self {
        Self {
            start: window.start(),
            end: window.end(),
            sample_interval_secs: window.sample_interval_secs(),
            ids,
        }
    }
}

/// Identity of a Q0 session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Q0Key {
    /// Window start
    pub start: NaiveDateTime,
    /// Window end
    pub end: NaiveDateTime,
    /// Sample interval (s)
    pub sample_interval_secs: u32,
    /// Cryomodule identifiers
    pub ids: CryomoduleId,
    /// Calibration the session depends on
    pub calibration: CalibrationKey,
    /// Bit pattern of the reference gradient
    pub reference_gradient_bits: u64,
}

impl Q0Key {
    /// Key of a window over a cavity of `ids`
    pub fn new(
        window: &SessionWindow,
        ids: CryomoduleId,
        calibration: CalibrationKey,
        reference_gradient: f64,
    ) -> Self {
        // -0.0 and 0.0 are the same gradient
        let gradient = if reference_gradient == 0.0 { 0.0 } else { reference_gradient };
        Self {
            start: window.start(),
            end: window.end(),
            sample_interval_secs: window.sample_interval_secs(),
            ids,
            calibration,
            reference_gradient_bits: gradient.to_bits(),
        }
    }

    /// Reference gradient (MV/m)
    pub fn reference_gradient(&self) -> f64 {
        f64::from_bits(self.reference_gradient_bits)
    }
}

/// Per-container map from identity to processed session
#[derive(Debug)]
pub struct SessionCache<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for SessionCache<K, V> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash, V> SessionCache<K, V> {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are inserted whole, so a map left behind by a panicking
    // builder is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached session for `key`
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.lock().get(key).cloned()
    }

    /// Cached session for `key`, building and storing it on a miss
    ///
    /// A failed build stores nothing. The lock is held while building, so
    /// concurrent requests for one container never build the same session
    /// twice.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, build: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let session = Arc::new(build()?);
        entries.insert(key, Arc::clone(&session));
        Ok(session)
    }

    /// Number of cached sessions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Nothing cached yet
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
