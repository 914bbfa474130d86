// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Storage Module
//!
//! Durable storage for multi-signature transactions, backed by an embedded
//! redb database under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   multisig.redb
//!     multisig_transactions   # transaction_id → record
//!     multisig_audit          # transaction_id|timestamp|event_id → audit event
//! ```
//!
//! ## Important Notes
//!
//! - `TransactionStore` owns the canonical copy of every record
//! - Only `SigningCoordinator` calls the mutators, always under the
//!   per-transaction lock
//! - Records are never deleted

pub mod audit;
pub mod snapshot_cache;
pub mod tx_database;

pub use audit::{AuditEvent, AuditEventType};
pub use snapshot_cache::{FillTicket, SnapshotCache};
pub use tx_database::{StoreError, StoreResult, TransactionStore};
