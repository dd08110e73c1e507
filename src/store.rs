use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeZone;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Millisecond timestamp of the most recent local midnight. "Today" queries
/// use the local clock at query time, not per-record timezones.
fn start_of_local_day_ms() -> u64 {
    let now = chrono::Local::now();
    let Some(midnight) = now.date_naive().and_hms_opt(0, 0, 0) else {
        return 0;
    };
    match chrono::Local.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.timestamp_millis().max(0) as u64
        }
        chrono::LocalResult::None => 0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: u64,
    pub key: String,
    pub created_at_unix_ms: u64,
    pub is_active: bool,
}

/// Immutable once created; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: u64,
    pub model: String,
    pub tokens_used: u64,
    pub unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Append/lookup map with an auto-incrementing id, ids start at 1.
/// `BTreeMap` iteration order doubles as insertion order because ids only
/// ever grow.
#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<u64, T>,
    next_id: u64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<T: Clone> Table<T> {
    fn insert_with(&mut self, build: impl FnOnce(u64) -> T) -> T {
        self.next_id += 1;
        let id = self.next_id;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn get(&self, id: u64) -> Option<&T> {
        self.rows.get(&id)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.rows.get_mut(&id)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.values_mut()
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: Table<User>,
    api_keys: Table<ApiKey>,
    usage: Table<UsageRecord>,
}

/// In-memory backing store for the server-side ledgers. Cloning is cheap;
/// all clones share the same tables. Constructed explicitly and passed to
/// request handlers, never a process-wide singleton.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    // users

    /// Usernames are unique; a duplicate signup is rejected.
    pub fn create_user(&self, username: &str, password: &str) -> Option<User> {
        let mut t = self.inner.write();
        if t.users.values().any(|u| u.username == username) {
            return None;
        }
        Some(t.users.insert_with(|id| User {
            id,
            username: username.to_string(),
            password: password.to_string(),
        }))
    }

    pub fn get_user(&self, id: u64) -> Option<User> {
        self.inner.read().users.get(id).cloned()
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.inner
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    // API-key ledger

    /// Last-write-wins activation: every existing key is deactivated before
    /// the new one is inserted active. Duplicate key strings are permitted.
    pub fn create_api_key(&self, key: &str) -> ApiKey {
        let mut t = self.inner.write();
        for row in t.api_keys.values_mut() {
            row.is_active = false;
        }
        t.api_keys.insert_with(|id| ApiKey {
            id,
            key: key.to_string(),
            created_at_unix_ms: unix_ms(),
            is_active: true,
        })
    }

    pub fn get_active_api_key(&self) -> Option<ApiKey> {
        self.inner
            .read()
            .api_keys
            .values()
            .find(|k| k.is_active)
            .cloned()
    }

    /// All keys, insertion order, for audit display.
    pub fn api_keys(&self) -> Vec<ApiKey> {
        self.inner.read().api_keys.values().cloned().collect()
    }

    /// Idempotent; unknown or already-inactive ids are a no-op.
    pub fn deactivate_api_key(&self, id: u64) {
        let mut t = self.inner.write();
        if let Some(row) = t.api_keys.get_mut(id) {
            row.is_active = false;
        }
    }

    // usage ledger

    /// `tokens_used` is taken as reported by the upstream completion
    /// response; it is not recomputed here.
    pub fn record_usage(&self, model: &str, tokens_used: u64, metadata: Option<Value>) -> UsageRecord {
        self.record_usage_at(model, tokens_used, metadata, unix_ms())
    }

    pub(crate) fn record_usage_at(
        &self,
        model: &str,
        tokens_used: u64,
        metadata: Option<Value>,
        unix_ms: u64,
    ) -> UsageRecord {
        let mut t = self.inner.write();
        t.usage.insert_with(|id| UsageRecord {
            id,
            model: model.to_string(),
            tokens_used,
            unix_ms,
            metadata,
        })
    }

    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.inner.read().usage.values().cloned().collect()
    }

    pub fn total_tokens_used(&self) -> u64 {
        self.inner.read().usage.values().map(|r| r.tokens_used).sum()
    }

    pub fn today_tokens_used(&self) -> u64 {
        let midnight = start_of_local_day_ms();
        self.inner
            .read()
            .usage
            .values()
            .filter(|r| r.unix_ms >= midnight)
            .map(|r| r.tokens_used)
            .sum()
    }

    pub fn usage_by_model(&self) -> BTreeMap<String, u64> {
        let mut out: BTreeMap<String, u64> = BTreeMap::new();
        for r in self.inner.read().usage.values() {
            *out.entry(r.model.clone()).or_insert(0) += r.tokens_used;
        }
        out
    }
}
