// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Broadcast Retry Poller
//!
//! Opt-in background task that resubmits fully signed transactions whose
//! broadcast failed before reaching the chain.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 30 s) the poller lists transactions whose
//! last failure has a known outcome (connection refused, explicit rejection,
//! 4xx) and that have been retried fewer than `max_retries` times, then
//! calls `SigningCoordinator::auto_retry_broadcast` for each. Timeouts,
//! dropped connections and 5xx responses may have reached the chain and are
//! left for an operator's `retry_broadcast`. Eligibility is checked again
//! under the per-transaction lock.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::blockchain::ChainBroadcaster;
use crate::error::CoordinatorError;
use crate::models::TransactionStatus;
use crate::signing::SigningCoordinator;

/// Default interval between polling sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Background poller retrying stranded broadcasts.
pub struct BroadcastPoller<B> {
    coordinator: Arc<SigningCoordinator<B>>,
    max_retries: u32,
    poll_interval: Duration,
}

impl<B: ChainBroadcaster> BroadcastPoller<B> {
    pub fn new(coordinator: Arc<SigningCoordinator<B>>, max_retries: u32) -> Self {
        Self {
            coordinator,
            max_retries,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            max_retries = self.max_retries,
            "Broadcast retry poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Broadcast retry poller shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Broadcast retry poller shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep. Returns how many transactions completed.
    pub async fn poll_step(&self) -> usize {
        let pending_ids = match self.coordinator.retry_candidates(self.max_retries) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Broadcast poller: failed to list retry candidates");
                return 0;
            }
        };

        if pending_ids.is_empty() {
            return 0;
        }

        info!(
            count = pending_ids.len(),
            "Broadcast poller: retrying pending broadcasts"
        );

        let mut completed = 0;
        for transaction_id in &pending_ids {
            match self
                .coordinator
                .auto_retry_broadcast(transaction_id, self.max_retries)
                .await
            {
                Ok(Some(status)) => {
                    if status == TransactionStatus::Completed {
                        completed += 1;
                    }
                    info!(
                        transaction_id = %transaction_id,
                        status = %status,
                        "Broadcast poller: transaction broadcast"
                    );
                }
                // Changed by a concurrent writer since the listing
                Ok(None) | Err(CoordinatorError::AlreadyFinalized { .. }) => {}
                Err(e) => {
                    warn!(
                        transaction_id = %transaction_id,
                        error_code = e.error_code(),
                        error = %e,
                        "Broadcast poller: retry failed"
                    );
                }
            }
        }
        completed
    }
}
