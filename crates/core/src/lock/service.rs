//! Per-script mutual exclusion according to the script's concurrency level.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{InvocationError, InvocationResult};
use crate::lock::store::StateStore;
use crate::model::ConcurrencyLevel;

const LOCKED_VALUE: &str = "locked";

/// Bound on waiting for the local check-and-set mutex.
const GUARD_TIMEOUT: Duration = Duration::from_secs(2);

/// Grants [`ScriptLock`]s backed by a [`StateStore`].
pub struct LockService {
    store: Arc<dyn StateStore>,
    /// Serialises read-then-write against the store.
    guard: Mutex<()>,
}

impl LockService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Store key for `script` at `level`, or `None` when no lock is taken.
    ///
    /// A per-token lock without a token identity falls back to the
    /// script-wide key.
    pub fn lock_key(
        script: &str,
        level: ConcurrencyLevel,
        token_identity: Option<&str>,
    ) -> Option<String> {
        match (level, token_identity) {
            (ConcurrencyLevel::Full, _) => None,
            (ConcurrencyLevel::PerToken, Some(token)) if !token.is_empty() => {
                let digest = Sha256::digest(token.as_bytes());
                let short: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
                Some(format!("script-lock:{script}:{short}"))
            }
            _ => Some(format!("script-lock:{script}")),
        }
    }

    /// Take the lock for `script` or fail with [`InvocationError::Locked`].
    pub async fn acquire(
        &self,
        script: &str,
        level: ConcurrencyLevel,
        token_identity: Option<&str>,
    ) -> InvocationResult<ScriptLock> {
        let Some(key) = Self::lock_key(script, level, token_identity) else {
            return Ok(ScriptLock::unlocked(self.store.clone()));
        };

        let locked = || InvocationError::Locked {
            script: script.to_string(),
        };
        let _guard = tokio::time::timeout(GUARD_TIMEOUT, self.guard.lock())
            .await
            .map_err(|_| locked())?;

        if self.store.get(&key).await?.is_some() {
            tracing::debug!(script, "Script lock is held");
            return Err(locked());
        }
        self.store.set(&key, LOCKED_VALUE).await?;
        tracing::debug!(script, lock_key = %key, "Script lock acquired");

        Ok(ScriptLock {
            key: Some(key),
            store: self.store.clone(),
        })
    }
}

/// A held script lock.
///
/// Call [`ScriptLock::release`]; dropping an unreleased lock releases it in
/// the background.
pub struct ScriptLock {
    key: Option<String>,
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for ScriptLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLock").field("key", &self.key).finish()
    }
}

impl ScriptLock {
    fn unlocked(store: Arc<dyn StateStore>) -> Self {
        Self { key: None, store }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub async fn release(mut self) {
        if let Some(key) = self.key.take() {
            remove_key(self.store.as_ref(), &key).await;
        }
    }
}

impl Drop for ScriptLock {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        tracing::warn!(lock_key = %key, "Script lock dropped without release");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move { remove_key(store.as_ref(), &key).await });
            }
            Err(_) => tracing::error!(lock_key = %key, "No runtime to release script lock"),
        }
    }
}

async fn remove_key(store: &dyn StateStore, key: &str) {
    match store.remove(key).await {
        Ok(()) => tracing::debug!(lock_key = %key, "Script lock released"),
        Err(e) => tracing::error!(lock_key = %key, error = %e, "Failed to release script lock"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
