//! crates/for_me_core/src/identity.rs
//!
//! Issues and persists the per-installation user identifier.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;
use uuid::Uuid;

use crate::domain::UserId;
use crate::ports::{KeyValueStore, PortResult};

/// Settings key under which the identifier is persisted.
pub const USER_ID_KEY: &str = "com.forme.app.userId";

pub struct IdentityProvider {
    settings: Arc<dyn KeyValueStore>,
    /// Held across every read-then-write of the id.
    issuing: Mutex<()>,
}

impl IdentityProvider {
    pub fn new(settings: Arc<dyn KeyValueStore>) -> Self {
        Self { settings, issuing: Mutex::new(()) }
    }

    /// Returns the persisted id, creating and persisting one on first access.
    /// Concurrent first calls agree on a single id.
    pub fn get_user_id(&self) -> PortResult<UserId> {
        let _issuing = self.issuing();
        if let Some(saved) = self.settings.get(USER_ID_KEY)? {
            return Ok(UserId::new(saved));
        }
        let user_id = Self::generate();
        self.settings.set(USER_ID_KEY, user_id.as_str())?;
        info!("Issued new installation id {}", user_id);
        Ok(user_id)
    }

    /// Overwrites the persisted id with a fresh one. Records stored under the
    /// previous id are no longer reachable.
    pub fn reset_user_id(&self) -> PortResult<UserId> {
        let _issuing = self.issuing();
        let user_id = Self::generate();
        self.settings.set(USER_ID_KEY, user_id.as_str())?;
        info!("Installation id reset to {}", user_id);
        Ok(user_id)
    }

    pub fn has_user_id(&self) -> PortResult<bool> {
        Ok(self.settings.get(USER_ID_KEY)?.is_some())
    }

    fn issuing(&self) -> MutexGuard<'_, ()> {
        self.issuing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn generate() -> UserId {
        UserId::new(Uuid::new_v4().to_string().to_uppercase())
    }
}
