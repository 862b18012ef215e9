//! services/journal/src/adapters/memory_store.rs
//!
//! A process-local `DocumentStore`, selected with `RECORD_BACKEND=memory`.
//! Behaves like the remote store (server-side timestamps, partial updates)
//! but forgets everything when the process exits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use for_me_core::{
    domain::{record_document_path, records_collection_path, DailyRecord, DateKey, RecordFields, UserId},
    ports::{DocumentStore, PortError, PortResult},
};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    /// Keyed by document path, so a collection is a path-prefix range.
    documents: Mutex<BTreeMap<String, DailyRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The store's clock. Never returns a time at or before `after`.
fn request_time(after: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match after {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<Option<DailyRecord>> {
        let documents = self.documents.lock().await;
        Ok(documents.get(&record_document_path(user_id, date)).cloned())
    }

    async fn create_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()> {
        let path = record_document_path(user_id, &fields.date);
        let mut documents = self.documents.lock().await;
        if documents.contains_key(&path) {
            return Err(PortError::Rejected(format!("{} already exists", path)));
        }
        let now = request_time(None);
        documents.insert(
            path,
            DailyRecord {
                date: fields.date,
                score: fields.score,
                tasks: fields.tasks.clone(),
                summary: fields.summary.clone(),
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
        Ok(())
    }

    async fn update_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()> {
        let path = record_document_path(user_id, &fields.date);
        let mut documents = self.documents.lock().await;
        let record = documents.get_mut(&path).ok_or(PortError::NotFound(path))?;
        record.score = fields.score;
        record.tasks = fields.tasks.clone();
        if let Some(summary) = &fields.summary {
            record.summary = Some(summary.clone());
        }
        record.updated_at = Some(request_time(record.updated_at));
        Ok(())
    }

    async fn list_records(&self, user_id: &UserId) -> PortResult<Vec<DailyRecord>> {
        let prefix = format!("{}/", records_collection_path(user_id));
        let documents = self.documents.lock().await;
        Ok(documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<()> {
        self.documents.lock().await.remove(&record_document_path(user_id, date));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use for_me_core::domain::Score;

    fn fields(day: u32, summary: Option<&str>) -> RecordFields {
        RecordFields {
            date: DateKey::from_ymd(2025, 3, day).unwrap(),
            score: Score::new(3).unwrap(),
            tasks: vec!["stretch".to_string()],
            summary: summary.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn update_advances_updated_at_only() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new("U1");
        store.create_record(&user, &fields(16, Some("first"))).await.unwrap();
        let created = store.get_record(&user, &fields(16, None).date).await.unwrap().unwrap();

        store.update_record(&user, &fields(16, None)).await.unwrap();
        let updated = store.get_record(&user, &created.date).await.unwrap().unwrap();

        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.summary.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_user() {
        let store = InMemoryDocumentStore::new();
        let alice = UserId::new("A");
        let alicia = UserId::new("AB");
        store.create_record(&alice, &fields(1, None)).await.unwrap();
        store.create_record(&alice, &fields(2, None)).await.unwrap();
        store.create_record(&alicia, &fields(3, None)).await.unwrap();

        let listed = store.list_records(&alice).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|record| record.date.date().format("%d").to_string() != "03"));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.update_record(&UserId::new("U"), &fields(4, None)).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
