//! crates/for_me_core/src/records.rs
//!
//! The Record Store: one document per (user, calendar day), written with
//! create-or-update semantics against the remote document database.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{DailyRecord, DateKey, RecordFields, Score, UserId};
use crate::ports::{DocumentStore, PortError, PortResult};

#[derive(Clone)]
pub struct RecordStore {
    documents: Arc<dyn DocumentStore>,
}

impl RecordStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Creates the day's document if absent, otherwise updates it in place.
    ///
    /// The creation timestamp is only ever written by the create path. A `None`
    /// summary is not part of the write, so an existing summary survives.
    /// Failures are reported, never retried.
    pub async fn save_record(
        &self,
        user_id: &UserId,
        date: DateKey,
        score: u8,
        tasks: Vec<String>,
        summary: Option<String>,
    ) -> PortResult<()> {
        let score = Score::new(score).ok_or_else(|| {
            PortError::Invalid(format!("score {} is outside 0..={}", score, Score::MAX))
        })?;
        let existing = self.existing(user_id, date).await?;
        self.write(user_id, RecordFields { date, score, tasks, summary }, existing.is_some())
            .await
    }

    /// Stores `summary` on the day, keeping the stored score and tasks. A day
    /// without a record is created with an unset score and no tasks.
    pub async fn attach_summary(&self, user_id: &UserId, date: DateKey, summary: String) -> PortResult<()> {
        let existing = self.existing(user_id, date).await?;
        let exists = existing.is_some();
        let (score, tasks) = existing.map(|record| (record.score, record.tasks)).unwrap_or_default();
        self.write(user_id, RecordFields { date, score, tasks, summary: Some(summary) }, exists)
            .await
    }

    async fn existing(&self, user_id: &UserId, date: DateKey) -> PortResult<Option<DailyRecord>> {
        self.documents.get_record(user_id, &date).await.map_err(|e| {
            warn!("Existence check for {} failed: {}", date, e);
            e
        })
    }

    async fn write(&self, user_id: &UserId, fields: RecordFields, exists: bool) -> PortResult<()> {
        if exists {
            self.documents.update_record(user_id, &fields).await?;
            info!("Updated record for {}", fields.date);
        } else {
            self.documents.create_record(user_id, &fields).await?;
            info!("Created record for {}", fields.date);
        }
        Ok(())
    }

    /// `Ok(None)` means the day has no record; only transport or permission
    /// failures are errors.
    pub async fn fetch_record(&self, user_id: &UserId, date: DateKey) -> PortResult<Option<DailyRecord>> {
        let record = self.documents.get_record(user_id, &date).await?;
        if record.is_none() {
            debug!("No record stored for {}", date);
        }
        Ok(record)
    }

    /// All of the user's records keyed by day; empty when there are none.
    pub async fn fetch_all_records(&self, user_id: &UserId) -> PortResult<BTreeMap<DateKey, DailyRecord>> {
        let records = self.documents.list_records(user_id).await?;
        Ok(records.into_iter().map(|record| (record.date, record)).collect())
    }

    pub async fn delete_record(&self, user_id: &UserId, date: DateKey) -> PortResult<()> {
        self.documents.delete_record(user_id, &date).await?;
        info!("Deleted record for {}", date);
        Ok(())
    }
}
