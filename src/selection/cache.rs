//! Token-addressed, single-consumption store for pending selections.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use moka::sync::Cache;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Opaque reference to a cache entry: a random UUID in unpadded URL-safe
/// base64 (22 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionToken(String);

impl SelectionToken {
    pub fn generate() -> Self {
        Self(URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
struct Stamped<V> {
    value: V,
    stored_at: Instant,
}

pub struct SelectionCache<V> {
    entries: Cache<String, Stamped<V>>,
    ttl: Duration,
}

impl<V> SelectionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            ttl,
        }
    }

    /// Stores `value` under a fresh token.
    pub fn put(&self, value: V) -> SelectionToken {
        loop {
            let token = SelectionToken::generate();
            let entry = self
                .entries
                .entry(token.as_str().to_string())
                .or_insert_with(|| Stamped {
                    value: value.clone(),
                    stored_at: Instant::now(),
                });
            if entry.is_fresh() {
                return token;
            }
            debug!("Selection token collision, generating another one");
        }
    }

    /// Removes and returns the entry for `token`. Only one caller can ever
    /// observe a given entry; expired entries are reported as absent.
    pub fn get_and_delete(&self, token: &str) -> Option<V> {
        let stamped = self.entries.remove(token)?;
        if stamped.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(stamped.value)
    }

    /// Approximate number of outstanding entries.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
