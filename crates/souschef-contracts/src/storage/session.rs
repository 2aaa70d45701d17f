use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::store::LocalStore;

pub const VERIFICATION_IDLE_TIMEOUT_MINUTES: i64 = 15;

const VERIFIED_KEY: &str = "human_verified";
const LAST_ACTIVITY_KEY: &str = "last_activity";

/// Session-scoped flags: the human-verification bit and its inactivity clock.
#[derive(Debug, Clone)]
pub struct SessionFlags {
    store: LocalStore,
}

impl SessionFlags {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: LocalStore::new(path),
        }
    }

    pub fn mark_verified(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.store.set(VERIFIED_KEY, Value::Bool(true))?;
        self.store
            .set(LAST_ACTIVITY_KEY, Value::String(now.to_rfc3339()))
    }

    /// True while verified and the last activity is at most 15 minutes old.
    /// An expired flag is cleared as a side effect.
    pub fn is_verified(&mut self, now: DateTime<Utc>) -> bool {
        let verified = self
            .store
            .get(VERIFIED_KEY)
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if !verified {
            return false;
        }
        let fresh = self
            .last_activity()
            .map(|last| now - last <= Duration::minutes(VERIFICATION_IDLE_TIMEOUT_MINUTES))
            .unwrap_or(false);
        if !fresh {
            let _ = self.clear();
        }
        fresh
    }

    /// Records activity; only extends a flag that is still valid.
    pub fn touch(&mut self, now: DateTime<Utc>) -> anyhow::Result<bool> {
        if !self.is_verified(now) {
            return Ok(false);
        }
        self.store
            .set(LAST_ACTIVITY_KEY, Value::String(now.to_rfc3339()))?;
        Ok(true)
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.store.remove(VERIFIED_KEY)?;
        self.store.remove(LAST_ACTIVITY_KEY)
    }

    fn last_activity(&mut self) -> Option<DateTime<Utc>> {
        let raw = self.store.get_string(LAST_ACTIVITY_KEY)?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}
