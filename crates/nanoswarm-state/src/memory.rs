use crate::store::StateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanoswarm_core::{SwarmError, SwarmResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Entries = HashMap<String, Entry>;

/// Process-local [`StateStore`] backed by a mutex-guarded map.
///
/// Expired keys are dropped lazily when touched, or eagerly through
/// [`InMemoryStore::purge_expired`]. The whole map can be written to and
/// restored from a JSON snapshot so state survives process restarts.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<Entries>,
}

fn wrong_type(key: &str, found: &Value, wanted: &str) -> SwarmError {
    SwarmError::State(format!(
        "key '{key}' holds a {} value, not a {wanted}",
        found.type_name()
    ))
}

/// Returns the live entry for `key`, dropping it first if it has expired.
fn live<'a>(map: &'a mut Entries, key: &str) -> Option<&'a mut Entry> {
    if map.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
        map.remove(key);
    }
    map.get_mut(key)
}

/// Resolves a Redis-style inclusive range against a list length.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.lock();
        let before = map.len();
        map.retain(|_, e| !e.is_expired(now));
        let removed = before - map.len();
        if removed > 0 {
            debug!(removed, "Purged expired keys");
        }
        removed
    }

    fn with_list<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut VecDeque<String>) -> R,
    ) -> SwarmResult<Option<R>> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                let out = f(list);
                if list.is_empty() {
                    map.remove(key);
                }
                Ok(Some(out))
            }
            Some(other) => Err(wrong_type(key, &other.value, "list")),
        }
    }

    fn with_set<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut BTreeSet<String>) -> R,
    ) -> SwarmResult<Option<R>> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => {
                let out = f(set);
                if set.is_empty() {
                    map.remove(key);
                }
                Ok(Some(out))
            }
            Some(other) => Err(wrong_type(key, &other.value, "set")),
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Writes every live key to `path` as JSON, keeping remaining TTLs.
    pub async fn save_snapshot(&self, path: &Path) -> SwarmResult<usize> {
        let snapshot = {
            let now = Instant::now();
            let wall = Utc::now();
            let map = self.entries.lock();
            map.iter()
                .filter(|(_, e)| !e.is_expired(now))
                .map(|(key, e)| SnapshotEntry::capture(key, e, now, wall))
                .collect::<Vec<_>>()
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), keys = snapshot.len(), "Saved state snapshot");
        Ok(snapshot.len())
    }

    /// Restores a store from a snapshot. A missing file yields an empty store;
    /// entries whose expiry has passed are skipped.
    pub async fn load_snapshot(path: &Path) -> SwarmResult<Self> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Vec<SnapshotEntry> = serde_json::from_str(&data)
            .map_err(|e| SwarmError::State(format!("Failed to parse snapshot: {e}")))?;

        let now = Instant::now();
        let wall = Utc::now();
        let map: Entries = snapshot
            .into_iter()
            .filter_map(|s| s.restore(now, wall))
            .collect();
        info!(path = %path.display(), keys = map.len(), "Loaded state snapshot");
        Ok(Self {
            entries: Mutex::new(map),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SnapshotValue {
    String { value: String },
    List { items: Vec<String> },
    Set { members: Vec<String> },
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    key: String,
    #[serde(flatten)]
    value: SnapshotValue,
    expires_at: Option<DateTime<Utc>>,
}

impl SnapshotEntry {
    fn capture(key: &str, entry: &Entry, now: Instant, wall: DateTime<Utc>) -> Self {
        let value = match &entry.value {
            Value::Str(s) => SnapshotValue::String { value: s.clone() },
            Value::List(l) => SnapshotValue::List {
                items: l.iter().cloned().collect(),
            },
            Value::Set(s) => SnapshotValue::Set {
                members: s.iter().cloned().collect(),
            },
        };
        let expires_at = entry.expires_at.and_then(|at| {
            chrono::Duration::from_std(at.saturating_duration_since(now))
                .ok()
                .map(|d| wall + d)
        });
        Self {
            key: key.to_string(),
            value,
            expires_at,
        }
    }

    fn restore(self, now: Instant, wall: DateTime<Utc>) -> Option<(String, Entry)> {
        let expires_at = match self.expires_at {
            Some(at) if at <= wall => return None,
            Some(at) => Some(now + (at - wall).to_std().ok()?),
            None => None,
        };
        let value = match self.value {
            SnapshotValue::String { value } => Value::Str(value),
            SnapshotValue::List { items } => Value::List(items.into()),
            SnapshotValue::Set { members } => Value::Set(members.into_iter().collect()),
        };
        Some((self.key, Entry { value, expires_at }))
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get(&self, key: &str) -> SwarmResult<Option<String>> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, &other.value, "string")),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SwarmResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string()), ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> SwarmResult<bool> {
        let mut map = self.entries.lock();
        if live(&mut map, key).is_some() {
            return Ok(false);
        }
        map.insert(key.to_string(), Entry::new(Value::Str(value.to_string()), ttl));
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> SwarmResult<bool> {
        let mut map = self.entries.lock();
        let (matches, old_expiry) = match live(&mut map, key) {
            None => (expected.is_none(), None),
            Some(Entry {
                value: Value::Str(current),
                expires_at,
            }) => (expected == Some(current.as_str()), *expires_at),
            Some(other) => return Err(wrong_type(key, &other.value, "string")),
        };
        if !matches {
            return Ok(false);
        }
        let expires_at = match ttl {
            Some(t) => Some(Instant::now() + t),
            None => old_expiry,
        };
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(new.to_string()),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> SwarmResult<bool> {
        let mut map = self.entries.lock();
        let matches = match live(&mut map, key) {
            None => false,
            Some(Entry {
                value: Value::Str(current),
                ..
            }) => current.as_str() == expected,
            Some(other) => return Err(wrong_type(key, &other.value, "string")),
        };
        if matches {
            map.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> SwarmResult<bool> {
        let mut map = self.entries.lock();
        let existed = live(&mut map, key).is_some();
        map.remove(key);
        Ok(existed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> SwarmResult<bool> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> SwarmResult<Option<Duration>> {
        let mut map = self.entries.lock();
        Ok(live(&mut map, key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> SwarmResult<i64> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            None => {
                map.insert(key.to_string(), Entry::new(Value::Str(delta.to_string()), None));
                Ok(delta)
            }
            Some(Entry {
                value: Value::Str(current),
                ..
            }) => {
                let n: i64 = current.parse().map_err(|_| {
                    SwarmError::State(format!("key '{key}' does not hold an integer"))
                })?;
                let next = n.checked_add(delta).ok_or_else(|| {
                    SwarmError::State(format!("increment of '{key}' would overflow"))
                })?;
                *current = next.to_string();
                Ok(next)
            }
            Some(other) => Err(wrong_type(key, &other.value, "string")),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> SwarmResult<usize> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            None => {
                let list = VecDeque::from([value.to_string()]);
                map.insert(key.to_string(), Entry::new(Value::List(list), None));
                Ok(1)
            }
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                list.push_front(value.to_string());
                Ok(list.len())
            }
            Some(other) => Err(wrong_type(key, &other.value, "list")),
        }
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> SwarmResult<Vec<String>> {
        let out = self.with_list(key, |list| match resolve_range(list.len(), start, stop) {
            Some((a, b)) => list.range(a..=b).cloned().collect(),
            None => Vec::new(),
        })?;
        Ok(out.unwrap_or_default())
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> SwarmResult<()> {
        self.with_list(key, |list| match resolve_range(list.len(), start, stop) {
            Some((a, b)) => {
                list.truncate(b + 1);
                list.drain(..a);
            }
            None => list.clear(),
        })?;
        Ok(())
    }

    async fn llen(&self, key: &str) -> SwarmResult<usize> {
        Ok(self.with_list(key, |list| list.len())?.unwrap_or(0))
    }

    async fn sadd(&self, key: &str, member: &str) -> SwarmResult<bool> {
        let mut map = self.entries.lock();
        match live(&mut map, key) {
            None => {
                let set = BTreeSet::from([member.to_string()]);
                map.insert(key.to_string(), Entry::new(Value::Set(set), None));
                Ok(true)
            }
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.insert(member.to_string())),
            Some(other) => Err(wrong_type(key, &other.value, "set")),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> SwarmResult<bool> {
        Ok(self.with_set(key, |set| set.remove(member))?.unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> SwarmResult<Vec<String>> {
        Ok(self
            .with_set(key, |set| set.iter().cloned().collect())?
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> SwarmResult<usize> {
        Ok(self.with_set(key, |set| set.len())?.unwrap_or(0))
    }
}
