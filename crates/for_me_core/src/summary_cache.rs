//! crates/for_me_core/src/summary_cache.rs
//!
//! Local map from day to conversation summary, persisted as a whole to local
//! settings after every write. It is independent of `DailyRecord::summary`;
//! callers reconcile the two.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::domain::DateKey;
use crate::ports::{KeyValueStore, PortError, PortResult};

/// Settings key holding the serialized map.
pub const SUMMARIES_KEY: &str = "chatSummaries";

pub struct SummaryCache {
    settings: Arc<dyn KeyValueStore>,
    summaries: Mutex<BTreeMap<String, String>>,
}

impl SummaryCache {
    /// Loads the persisted map once. A missing or unreadable value starts an
    /// empty cache.
    pub fn load(settings: Arc<dyn KeyValueStore>) -> Self {
        let summaries = match settings.get(SUMMARIES_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable summary cache: {}", e);
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("Could not read summary cache: {}", e);
                BTreeMap::new()
            }
        };
        Self { settings, summaries: Mutex::new(summaries) }
    }

    pub fn get_summary(&self, date: DateKey) -> Option<String> {
        self.lock().get(&date.to_string()).cloned()
    }

    /// Upserts the entry and writes the entire map back synchronously. The
    /// in-memory map only changes once the write has succeeded.
    pub fn save_summary(&self, text: &str, date: DateKey) -> PortResult<()> {
        let mut summaries = self.lock();
        let mut staged = summaries.clone();
        staged.insert(date.to_string(), text.to_string());
        let encoded = serde_json::to_string(&staged).map_err(|e| PortError::Storage(e.to_string()))?;
        self.settings.set(SUMMARIES_KEY, &encoded)?;
        *summaries = staged;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.summaries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
