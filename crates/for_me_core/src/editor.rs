//! crates/for_me_core/src/editor.rs
//!
//! The per-day editor: loads a day's record, edits score and tasks in memory,
//! and writes back through the Record Store. The summary shown is reconciled
//! from the Summary Cache on open and written through on save.

use std::sync::Arc;

use crate::domain::{DateKey, Score, UserId};
use crate::ports::PortError;
use crate::records::RecordStore;
use crate::summary_cache::SummaryCache;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("task text is empty")]
    EmptyTask,
    #[error("task '{0}' already exists")]
    DuplicateTask(String),
    #[error("task '{0}' does not exist")]
    UnknownTask(String),
    #[error("{0} is not today and cannot be scored")]
    ReadOnlyDay(DateKey),
    #[error("score {0} is outside 0..=5")]
    InvalidScore(u8),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub struct DayEditor {
    records: Arc<RecordStore>,
    summaries: Arc<SummaryCache>,
    user_id: UserId,
    date: DateKey,
    today: DateKey,
    score: Score,
    tasks: Vec<String>,
    summary: Option<String>,
    persisted: bool,
}

impl DayEditor {
    /// Loads the day. A day with no record opens as an empty draft.
    pub async fn open(
        records: Arc<RecordStore>,
        summaries: Arc<SummaryCache>,
        user_id: UserId,
        date: DateKey,
        today: DateKey,
    ) -> Result<Self, EditorError> {
        let record = records.fetch_record(&user_id, date).await?;
        let cached = summaries.get_summary(date);
        let (score, tasks, stored_summary, persisted) = match record {
            Some(record) => (record.score, record.tasks, record.summary, true),
            None => (Score::UNSET, Vec::new(), None, false),
        };
        Ok(Self {
            records,
            summaries,
            user_id,
            date,
            today,
            score,
            tasks,
            summary: cached.or(stored_summary),
            persisted,
        })
    }

    pub fn date(&self) -> DateKey {
        self.date
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// True once the day exists in the Record Store.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_today(&self) -> bool {
        self.date == self.today
    }

    /// Conversations are only offered for the current day.
    pub fn is_chat_available(&self) -> bool {
        self.is_today()
    }

    pub fn add_task(&mut self, text: &str) -> Result<(), EditorError> {
        let text = self.validate_task(text)?;
        self.tasks.push(text);
        Ok(())
    }

    pub fn rename_task(&mut self, old: &str, new: &str) -> Result<(), EditorError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task == old)
            .ok_or_else(|| EditorError::UnknownTask(old.to_string()))?;
        if old == new.trim() {
            return Ok(());
        }
        let new = self.validate_task(new)?;
        self.tasks[index] = new;
        Ok(())
    }

    pub fn remove_task(&mut self, text: &str) -> Result<(), EditorError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task == text)
            .ok_or_else(|| EditorError::UnknownTask(text.to_string()))?;
        self.tasks.remove(index);
        Ok(())
    }

    pub fn set_score(&mut self, value: u8) -> Result<(), EditorError> {
        if !self.is_today() {
            return Err(EditorError::ReadOnlyDay(self.date));
        }
        self.score = Score::new(value).ok_or(EditorError::InvalidScore(value))?;
        Ok(())
    }

    /// Picks up a summary written to the cache after the editor was opened,
    /// e.g. by a conversation that just closed.
    pub fn refresh_summary(&mut self) {
        if let Some(cached) = self.summaries.get_summary(self.date) {
            self.summary = Some(cached);
        }
    }

    /// Writes the day through the Record Store. Only a cached summary is
    /// written; without one the stored summary is left untouched.
    pub async fn save(&mut self) -> Result<(), EditorError> {
        let cached = self.summaries.get_summary(self.date);
        self.records
            .save_record(&self.user_id, self.date, self.score.value(), self.tasks.clone(), cached.clone())
            .await?;
        if cached.is_some() {
            self.summary = cached;
        }
        self.persisted = true;
        Ok(())
    }

    /// Deletes the stored record and resets the draft.
    pub async fn delete(&mut self) -> Result<(), EditorError> {
        self.records.delete_record(&self.user_id, self.date).await?;
        self.score = Score::UNSET;
        self.tasks.clear();
        self.persisted = false;
        Ok(())
    }

    fn validate_task(&self, text: &str) -> Result<String, EditorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EditorError::EmptyTask);
        }
        if self.tasks.iter().any(|task| task == text) {
            return Err(EditorError::DuplicateTask(text.to_string()));
        }
        Ok(text.to_string())
    }
}
