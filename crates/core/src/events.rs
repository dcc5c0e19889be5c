//! Canonical deduplication keys for scanner-emitted notifications.
//!
//! A key identifies "this condition, for this entity, in this time bucket".
//! Uniqueness per recipient is enforced by the notification store on
//! `(recipient_id, event_key)`, so the recipient id never appears in the key
//! itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey(pub String);

impl EventKey {
    /// `event:entity_type:entity_id` plus any stable suffixes, joined by `:`.
    pub fn build(event: &str, entity_type: &str, entity_id: &str, suffixes: &[&str]) -> Self {
        let mut key = format!("{event}:{entity_type}:{entity_id}");
        for suffix in suffixes {
            key.push(':');
            key.push_str(suffix);
        }
        Self(key)
    }

    /// Day-bucketed key: re-emitting within the same UTC day is a no-op,
    /// the next day is not suppressed.
    pub fn daily(event: &str, entity_type: &str, entity_id: &str, now: DateTime<Utc>) -> Self {
        Self::build(event, entity_type, entity_id, &[&day_bucket(now)])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn day_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}
