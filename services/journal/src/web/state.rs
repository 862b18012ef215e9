//! services/journal/src/web/state.rs
//!
//! Defines the application's shared state and the per-connection chat state.

use std::sync::Arc;

use chrono::Local;
use for_me_core::{
    AdGate, CompletionService, ConversationConfig, ConversationSession, DateKey, IdentityProvider, RecordStore,
    SummaryCache, UserId,
};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Each service exists exactly once per process; handlers only ever see it
/// through this struct.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityProvider>,
    pub records: Arc<RecordStore>,
    pub summaries: Arc<SummaryCache>,
    pub ads: Arc<AdGate>,
    pub completion: Arc<dyn CompletionService>,
    pub conversation: ConversationConfig,
}

impl AppState {
    /// The calendar day the server considers "today", in local time.
    pub fn today(&self) -> DateKey {
        DateKey::new(Local::now().date_naive())
    }
}

//=========================================================================================
// ChatState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single chat connection. The session is `None` until the
/// client opens one, and again after it has been summarized.
#[derive(Default)]
pub struct ChatState {
    pub user_id: Option<UserId>,
    pub session: Option<ConversationSession>,
}
