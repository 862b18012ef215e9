//! In-process fakes of every port, used by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::domain::{AdSurface, ChatMessage, DailyRecord, DateKey, RecordFields, UserId};
use crate::ports::{
    AdNetwork, CompletionService, DocumentStore, KeyValueStore, LoadedAd, PortError, PortResult,
    PresentationEnd, PresentationHost,
};

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
    pub writes: AtomicUsize,
    /// When set, every `set` fails with this error and stores nothing.
    pub fail_set: Mutex<Option<PortError>>,
    /// Delay inside `get`, to widen read-then-write races.
    pub get_delay: Mutex<Option<Duration>>,
}

impl KeyValueStore for MemorySettings {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        let value = self.values.lock().unwrap().get(key).cloned();
        if let Some(delay) = *self.get_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        if let Some(err) = self.fail_set.lock().unwrap().clone() {
            return Err(err);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Document store whose server clock ticks one second per write.
#[derive(Default)]
pub struct MemoryDocuments {
    docs: Mutex<HashMap<(UserId, DateKey), DailyRecord>>,
    clock: AtomicI64,
    pub fail_with: Mutex<Option<PortError>>,
    pub gets: AtomicUsize,
}

impl MemoryDocuments {
    fn tick(&self) -> DateTime<Utc> {
        let secs = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn check(&self) -> PortResult<()> {
        match self.fail_with.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn get_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<Option<DailyRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.docs.lock().unwrap().get(&(user_id.clone(), *date)).cloned())
    }

    async fn create_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()> {
        self.check()?;
        let now = self.tick();
        self.docs.lock().unwrap().insert(
            (user_id.clone(), fields.date),
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
        self.check()?;
        let now = self.tick();
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .get_mut(&(user_id.clone(), fields.date))
            .ok_or_else(|| PortError::NotFound(fields.date.to_string()))?;
        doc.score = fields.score;
        doc.tasks = fields.tasks.clone();
        if let Some(summary) = &fields.summary {
            doc.summary = Some(summary.clone());
        }
        doc.updated_at = Some(now);
        Ok(())
    }

    async fn list_records(&self, user_id: &UserId) -> PortResult<Vec<DailyRecord>> {
        self.check()?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<()> {
        self.check()?;
        self.docs.lock().unwrap().remove(&(user_id.clone(), *date));
        Ok(())
    }
}

/// Replays queued replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<PortResult<String>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn with_replies(replies: Vec<PortResult<String>>) -> Self {
        Self { replies: Mutex::new(replies.into()), requests: Mutex::default() }
    }

    pub fn push(&self, reply: PortResult<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> PortResult<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("mock reply".to_string()))
    }
}

/// Ad network whose load and present outcomes are switchable per test.
pub struct ScriptedAds {
    pub load_ok: AtomicBool,
    pub present_ok: AtomicBool,
    pub loads: Mutex<Vec<AdSurface>>,
    pub presented: Mutex<Vec<AdSurface>>,
    counter: AtomicUsize,
}

impl Default for ScriptedAds {
    fn default() -> Self {
        Self {
            load_ok: AtomicBool::new(true),
            present_ok: AtomicBool::new(true),
            loads: Mutex::default(),
            presented: Mutex::default(),
            counter: AtomicUsize::new(0),
        }
    }
}

impl ScriptedAds {
    pub fn load_count(&self, surface: AdSurface) -> usize {
        self.loads.lock().unwrap().iter().filter(|s| **s == surface).count()
    }
}

#[async_trait]
impl AdNetwork for ScriptedAds {
    async fn load(&self, surface: AdSurface, unit_id: &str) -> PortResult<LoadedAd> {
        self.loads.lock().unwrap().push(surface);
        if !self.load_ok.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("no fill".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(LoadedAd { surface, unit_id: unit_id.to_string(), handle: format!("ad-{}", n) })
    }

    async fn present(&self, ad: LoadedAd) -> PortResult<PresentationEnd> {
        self.presented.lock().unwrap().push(ad.surface);
        if !self.present_ok.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("presentation failed".to_string()));
        }
        Ok(match ad.surface {
            AdSurface::Rewarded => PresentationEnd::RewardEarned,
            _ => PresentationEnd::Dismissed,
        })
    }
}

#[derive(Default)]
pub struct SwitchHost {
    pub transitioning: AtomicBool,
}

impl PresentationHost for SwitchHost {
    fn is_transitioning(&self) -> bool {
        self.transitioning.load(Ordering::SeqCst)
    }
}
