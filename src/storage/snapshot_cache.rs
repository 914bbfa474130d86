// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-through cache for transaction status lookups.
//!
//! Writers hold the per-transaction lock and [`SnapshotCache::upsert`] the
//! record they just committed. Readers take no lock, so a reader that missed
//! the cache must not publish what it read if a write landed in between:
//!
//! ```text
//! reader: ticket() ── store.get() ───────────────── fill(ticket, old)  ✗ epoch moved
//! writer:                         commit ── upsert(new)
//! ```
//!
//! Every write advances a cache-wide epoch; `fill` only succeeds when the
//! epoch still matches the ticket taken before the store read.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::models::MultiSigTransaction;

struct CacheEntry {
    record: MultiSigTransaction,
    inserted_at: Instant,
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    epoch: u64,
}

impl CacheState {
    fn insert(&mut self, record: MultiSigTransaction) {
        self.entries.put(
            record.transaction_id.clone(),
            CacheEntry {
                record,
                inserted_at: Instant::now(),
            },
        );
    }
}

/// Cache epoch observed before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// In-process LRU cache of transaction records keyed by transaction id.
pub struct SnapshotCache {
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                epoch: 0,
            }),
            ttl,
        }
    }

    /// Cached record, if present and younger than the TTL.
    pub fn get(&self, transaction_id: &str) -> Option<MultiSigTransaction> {
        let mut state = self.state.lock().ok()?;
        let fresh = state
            .entries
            .get(transaction_id)
            .map(|entry| (entry.inserted_at.elapsed() < self.ttl, entry.record.clone()));
        match fresh {
            Some((true, record)) => Some(record),
            Some((false, _)) => {
                state.entries.pop(transaction_id);
                None
            }
            None => None,
        }
    }

    /// Take before reading the store on a miss.
    pub fn ticket(&self) -> FillTicket {
        FillTicket(self.state.lock().map(|state| state.epoch).unwrap_or(u64::MAX))
    }

    /// Publish a record read by a lock-free reader. Dropped if any write
    /// reached the cache since `ticket` was taken.
    pub fn fill(&self, ticket: FillTicket, record: MultiSigTransaction) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.epoch != ticket.0 {
            return false;
        }
        state.insert(record);
        true
    }

    /// Publish a record just committed by a lock holder.
    pub fn upsert(&self, record: MultiSigTransaction) {
        if let Ok(mut state) = self.state.lock() {
            state.epoch = state.epoch.wrapping_add(1);
            state.insert(record);
        }
    }

    /// Forget a transaction whose stored state is unknown.
    pub fn invalidate(&self, transaction_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.epoch = state.epoch.wrapping_add(1);
            state.entries.pop(transaction_id);
        }
    }
}
