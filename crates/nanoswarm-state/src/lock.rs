use crate::store::{keys, StateStore};
use nanoswarm_core::SwarmResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Proof of holding a lock. Only the holder's token can release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    resource: String,
    token: String,
}

impl LockToken {
    /// The locked resource name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The random token value.
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

/// Named, tokened, TTL-bounded mutual exclusion on top of a [`StateStore`].
///
/// Acquisition never blocks: a held lock yields `None` immediately. The TTL
/// frees locks whose holder died; release is compare-and-delete so a holder
/// whose lock already expired cannot free a later holder's lock.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn StateStore>,
    default_ttl: Duration,
}

impl LockManager {
    /// A manager using `default_ttl` for [`LockManager::acquire_default`].
    pub fn new(store: Arc<dyn StateStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Tries to take `resource` for `ttl`.
    pub async fn acquire(&self, resource: &str, ttl: Duration) -> SwarmResult<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_nx(&keys::lock(resource), &token, Some(ttl))
            .await?;
        if acquired {
            debug!(resource, "Lock acquired");
            Ok(Some(LockToken {
                resource: resource.to_string(),
                token,
            }))
        } else {
            debug!(resource, "Lock busy");
            Ok(None)
        }
    }

    /// [`LockManager::acquire`] with the default TTL.
    pub async fn acquire_default(&self, resource: &str) -> SwarmResult<Option<LockToken>> {
        self.acquire(resource, self.default_ttl).await
    }

    /// Releases a lock. Returns `false` if the lock expired or is now held
    /// by someone else.
    pub async fn release(&self, token: &LockToken) -> SwarmResult<bool> {
        let released = self
            .store
            .compare_and_delete(&keys::lock(&token.resource), &token.token)
            .await?;
        if !released {
            warn!(resource = %token.resource, "Lock was no longer held at release");
        }
        Ok(released)
    }

    /// Whether anyone currently holds `resource`.
    pub async fn is_locked(&self, resource: &str) -> SwarmResult<bool> {
        Ok(self.store.get(&keys::lock(resource)).await?.is_some())
    }
}
