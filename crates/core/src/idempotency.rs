//! Request idempotency cache.
//!
//! Guards mutating HTTP calls carrying a client-supplied key against
//! duplicate submission. The store is behind a trait so a horizontally
//! scaled deployment can substitute a shared backend without touching call
//! sites; the bundled implementation is process-local and volatile.
//!
//! Concurrency contract: the first request for a key inserts a `Processing`
//! placeholder atomically. A second identical request arriving before the
//! first completes observes the placeholder and is reported `InFlight` —
//! callers surface that as a conflict rather than blocking or polling.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::domain::AgencyId;

pub const DEFAULT_TTL_SECS: i64 = 300;

/// Tenant-scoped cache key: `agency_id:client_supplied_key`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn scoped(agency_id: &AgencyId, client_key: &str) -> Self {
        Self(format!("{}:{}", agency_id.0, client_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeginOutcome {
    /// No live entry existed; a `Processing` placeholder is now in place and
    /// the caller should execute the handler.
    Started,
    /// Another request with the same key is still executing.
    InFlight,
    /// A completed response is cached; replay it verbatim.
    Replay(CachedResponse),
}

pub trait IdempotencyStore: Send + Sync {
    fn begin(&self, key: &IdempotencyKey, now: DateTime<Utc>) -> BeginOutcome;

    /// Record the handler's outcome. Success statuses (2xx) are cached for
    /// replay; anything else clears the placeholder so a retry may execute.
    fn complete(&self, key: &IdempotencyKey, status: u16, body: String, now: DateTime<Utc>);

    /// Drop entries older than the TTL. Returns how many were removed.
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

#[derive(Clone, Debug)]
enum Entry {
    Processing { started_at: DateTime<Utc> },
    Cached { response: CachedResponse, stored_at: DateTime<Utc> },
}

impl Entry {
    fn touched_at(&self) -> DateTime<Utc> {
        match self {
            Self::Processing { started_at } => *started_at,
            Self::Cached { stored_at, .. } => *stored_at,
        }
    }
}

pub struct InMemoryIdempotencyStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryIdempotencyStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self { ttl: Duration::seconds(ttl_secs.max(1)), entries: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        entry.touched_at() + self.ttl <= now
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn begin(&self, key: &IdempotencyKey, now: DateTime<Utc>) -> BeginOutcome {
        let mut entries = self.lock();

        if let Some(entry) = entries.get(key.as_str()) {
            if self.is_expired(entry, now) {
                entries.remove(key.as_str());
            } else {
                return match entry {
                    Entry::Processing { .. } => BeginOutcome::InFlight,
                    Entry::Cached { response, .. } => BeginOutcome::Replay(response.clone()),
                };
            }
        }

        entries.insert(key.as_str().to_string(), Entry::Processing { started_at: now });
        BeginOutcome::Started
    }

    fn complete(&self, key: &IdempotencyKey, status: u16, body: String, now: DateTime<Utc>) {
        let mut entries = self.lock();
        if (200..300).contains(&status) {
            entries.insert(
                key.as_str().to_string(),
                Entry::Cached { response: CachedResponse { status, body }, stored_at: now },
            );
        } else {
            entries.remove(key.as_str());
        }
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }
}
