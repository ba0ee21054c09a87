use async_trait::async_trait;
use nanoswarm_core::{SwarmError, SwarmResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// How many times [`update_json`] retries a contended compare-and-swap.
const MAX_CAS_ATTEMPTS: usize = 32;

/// A shared keyed store with TTL expiry, counters, lists and sets.
///
/// Every operation is atomic on its key. Strings, lists and sets are
/// distinct types; using a key as the wrong type is a [`SwarmError::State`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads a string value.
    async fn get(&self, key: &str) -> SwarmResult<Option<String>>;

    /// Writes a string value. `ttl = None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SwarmResult<()>;

    /// Writes only if the key does not exist. Returns whether it wrote.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> SwarmResult<bool>;

    /// Replaces the value only if it currently equals `expected`
    /// (`None` = key absent). `ttl = None` keeps the existing expiry.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> SwarmResult<bool>;

    /// Deletes the key only if its value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> SwarmResult<bool>;

    /// Deletes a key of any type. Returns whether it existed.
    async fn delete(&self, key: &str) -> SwarmResult<bool>;

    /// Sets a new expiry on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> SwarmResult<bool>;

    /// Remaining time to live, `None` for missing keys or keys without expiry.
    async fn ttl(&self, key: &str) -> SwarmResult<Option<Duration>>;

    /// Adds `delta` to an integer value (missing = 0) and returns the result.
    async fn incr_by(&self, key: &str, delta: i64) -> SwarmResult<i64>;

    /// Pushes onto the head of a list. Returns the new length.
    async fn lpush(&self, key: &str, value: &str) -> SwarmResult<usize>;

    /// Inclusive range with negative indices counting from the tail.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> SwarmResult<Vec<String>>;

    /// Keeps only the inclusive range `start..=stop`.
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> SwarmResult<()>;

    /// List length (0 for missing keys).
    async fn llen(&self, key: &str) -> SwarmResult<usize>;

    /// Adds a set member. Returns whether it was new.
    async fn sadd(&self, key: &str, member: &str) -> SwarmResult<bool>;

    /// Removes a set member. Returns whether it was present.
    async fn srem(&self, key: &str, member: &str) -> SwarmResult<bool>;

    /// All set members, sorted.
    async fn smembers(&self, key: &str) -> SwarmResult<Vec<String>>;

    /// Set cardinality (0 for missing keys).
    async fn scard(&self, key: &str) -> SwarmResult<usize>;
}

/// Key namespaces. Every record type lives under its own prefix.
pub mod keys {
    const PREFIX: &str = "nanoswarm";

    /// Ids of recently created sessions, newest first.
    pub const SESSIONS_RECENT: &str = "nanoswarm:sessions:recent";
    /// Ids of currently registered agents.
    pub const AGENTS_ACTIVE: &str = "nanoswarm:agents:active";
    /// Failed journal entries across all sessions, newest first.
    pub const FAILED_QUEUE: &str = "nanoswarm:journal:failed";

    /// One session record.
    pub fn session(session_id: &str) -> String {
        format!("{PREFIX}:session:{session_id}")
    }

    /// One agent registry record.
    pub fn agent(agent_id: &str) -> String {
        format!("{PREFIX}:agent:{agent_id}")
    }

    /// One journal entry.
    pub fn journal_entry(session_id: &str, task_id: &str) -> String {
        format!("{PREFIX}:journal:{session_id}:task:{task_id}")
    }

    /// Per-session journal index, newest first.
    pub fn journal_index(session_id: &str) -> String {
        format!("{PREFIX}:journal:{session_id}:index")
    }

    /// A named lock.
    pub fn lock(resource: &str) -> String {
        format!("{PREFIX}:lock:{resource}")
    }
}

/// Reads and decodes a JSON value.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> SwarmResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(decode(key, &raw)?)),
        None => Ok(None),
    }
}

/// Encodes and writes a JSON value.
pub async fn write_json<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> SwarmResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

/// Writes a JSON value only if the key is free.
pub async fn create_json<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> SwarmResult<bool> {
    let raw = serde_json::to_string(value)?;
    store.set_nx(key, &raw, ttl).await
}

/// Read-modify-write of a JSON record with optimistic concurrency.
///
/// `apply` returns whether it changed the value; unchanged values are not
/// written back. Returns `None` if the key does not exist, otherwise the
/// final value and whether it was written.
pub async fn update_json<T, F>(
    store: &dyn StateStore,
    key: &str,
    ttl: Option<Duration>,
    mut apply: F,
) -> SwarmResult<Option<(T, bool)>>
where
    T: Serialize + DeserializeOwned + Send,
    F: FnMut(&mut T) -> bool + Send,
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let Some(raw) = store.get(key).await? else {
            return Ok(None);
        };
        let mut value: T = decode(key, &raw)?;
        if !apply(&mut value) {
            return Ok(Some((value, false)));
        }
        let new = serde_json::to_string(&value)?;
        if store.compare_and_swap(key, Some(&raw), &new, ttl).await? {
            return Ok(Some((value, true)));
        }
    }
    Err(SwarmError::State(format!(
        "update of '{key}' gave up after {MAX_CAS_ATTEMPTS} contended attempts"
    )))
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> SwarmResult<T> {
    serde_json::from_str(raw).map_err(|e| SwarmError::State(format!("corrupt record '{key}': {e}")))
}
