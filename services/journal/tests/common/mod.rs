//! Shared fixtures for the journal integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use for_me_core::{
    AdGate, AdUnits, ChatMessage, CompletionService, ConversationConfig, DateKey, IdentityProvider, KeyValueStore,
    PortResult, RecordStore, RetryPolicy, SummaryCache,
};
use journal_lib::{
    adapters::{HeadlessHost, HouseAdNetwork, InMemoryDocumentStore, JsonFileSettings},
    web::state::AppState,
};

/// Replays queued replies, then answers with a fixed one.
#[derive(Default)]
pub struct StubCompletion {
    replies: Mutex<VecDeque<PortResult<String>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl StubCompletion {
    pub fn push(&self, reply: PortResult<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl CompletionService for StubCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> PortResult<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("That sounds like a good day. What made it special?".to_string()))
    }
}

pub fn today() -> DateKey {
    DateKey::new(Local::now().date_naive())
}

/// Builds an app over a fresh settings file in `dir`, the in-memory record
/// store and an instant house ad network, with every ad preloaded.
pub async fn test_app(dir: &Path, completion: Arc<StubCompletion>) -> Arc<AppState> {
    let settings: Arc<dyn KeyValueStore> = Arc::new(JsonFileSettings::open(dir.join("settings.json")).unwrap());
    let ads = AdGate::new(
        Arc::new(HouseAdNetwork::new(Duration::ZERO, Duration::ZERO)),
        Arc::new(HeadlessHost),
        AdUnits {
            banner: "house-banner".to_string(),
            interstitial: "house-interstitial".to_string(),
            rewarded: "house-rewarded".to_string(),
        },
        RetryPolicy::default(),
    );
    ads.preload_all().await;

    Arc::new(AppState {
        identity: Arc::new(IdentityProvider::new(settings.clone())),
        records: Arc::new(RecordStore::new(Arc::new(InMemoryDocumentStore::new()))),
        summaries: Arc::new(SummaryCache::load(settings)),
        ads,
        completion,
        conversation: ConversationConfig::default(),
    })
}
