//! crates/for_me_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the journal's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the document database, local settings, chat vendor and
//! ad network actually in use.

use async_trait::async_trait;

use crate::domain::{AdSurface, ChatMessage, DailyRecord, DateKey, RecordFields, UserId};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, disk).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with a non-success status (including permission errors).
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Local storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Process-wide local preferences (string keys to string values).
///
/// Writes are synchronous and durable once `set` returns.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PortResult<()>;
}

/// The remote document database holding `DailyRecords/{userId}/records/{dateKey}`.
///
/// Timestamps are assigned by the store, never by the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns `None` when no document exists at the path.
    async fn get_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<Option<DailyRecord>>;

    /// Creates the document, setting both `createdAt` and `updatedAt`.
    async fn create_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()>;

    /// Updates the supplied fields and `updatedAt` only. A `None` summary is
    /// left out of the write.
    async fn update_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()>;

    async fn list_records(&self, user_id: &UserId) -> PortResult<Vec<DailyRecord>>;

    async fn delete_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<()>;
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends the messages in order and returns the first choice's content.
    async fn complete(&self, messages: &[ChatMessage]) -> PortResult<String>;
}

/// A loaded, not yet presented full-screen or banner ad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAd {
    pub surface: AdSurface,
    pub unit_id: String,
    /// Network-specific handle, opaque to the core.
    pub handle: String,
}

/// How a presentation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationEnd {
    /// The user dismissed the ad.
    Dismissed,
    /// A rewarded ad ran to completion and the network granted its reward.
    RewardEarned,
}

#[async_trait]
pub trait AdNetwork: Send + Sync {
    async fn load(&self, surface: AdSurface, unit_id: &str) -> PortResult<LoadedAd>;

    /// Presents the ad and resolves once it is dismissed.
    async fn present(&self, ad: LoadedAd) -> PortResult<PresentationEnd>;
}

/// The host UI the ads are presented over.
pub trait PresentationHost: Send + Sync {
    /// True while the topmost view context is itself being presented or dismissed.
    fn is_transitioning(&self) -> bool;
}
