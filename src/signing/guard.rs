// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-transaction mutual exclusion.
//!
//! Every mutating operation on a transaction runs inside
//! [`ConcurrencyGuard::with_lock`]. Locks are created lazily per id, released
//! on every exit path when the guard drops, and can be reclaimed once a
//! transaction is terminal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::CoordinatorError;

/// Default time to wait for a per-transaction lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(20);

/// Registry of per-transaction locks with bounded acquisition time.
pub struct ConcurrencyGuard {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl ConcurrencyGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Run `operation` while holding the lock for `transaction_id`.
    ///
    /// Fails with `LockTimeout` if the lock is not granted within the
    /// configured timeout. The operation's own error is returned unchanged.
    pub async fn with_lock<T, F, Fut>(
        &self,
        transaction_id: &str,
        operation: F,
    ) -> Result<T, CoordinatorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoordinatorError>>,
    {
        let lock = self.lock_for(transaction_id);
        let _held = tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| CoordinatorError::LockTimeout {
                transaction_id: transaction_id.to_string(),
                waited: self.timeout,
            })?;

        operation().await
    }

    /// Drop the lock of a terminal transaction if nobody holds or awaits it.
    ///
    /// Returns whether the entry was removed.
    pub fn reclaim(&self, transaction_id: &str) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(transaction_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(transaction_id);
            debug!(transaction_id, "Reclaimed transaction lock");
        }
        idle
    }

    /// Number of transaction ids with a live lock entry.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock_for(&self, transaction_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(transaction_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}
