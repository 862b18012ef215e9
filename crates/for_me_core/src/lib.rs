pub mod ads;
pub mod calendar;
pub mod conversation;
pub mod domain;
pub mod editor;
pub mod identity;
pub mod ports;
pub mod records;
pub mod summary_cache;

#[cfg(test)]
mod fakes;

pub use ads::{AdGate, AdReadiness, AdUnits, RetryPolicy, RewardOutcome};
pub use conversation::{
    ConversationConfig, ConversationSession, ExtensionGrant, FailedTurnPolicy, SessionError, SessionState,
    TurnOutcome,
};
pub use domain::{AdSurface, ChatMessage, ChatRole, ConversationTurn, DailyRecord, DateKey, RecordFields, Score, Speaker, UserId};
pub use editor::{DayEditor, EditorError};
pub use identity::IdentityProvider;
pub use ports::{
    AdNetwork, CompletionService, DocumentStore, KeyValueStore, LoadedAd, PortError, PortResult, PresentationEnd,
    PresentationHost,
};
pub use records::RecordStore;
pub use summary_cache::SummaryCache;
