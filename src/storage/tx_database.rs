// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded multi-signature transaction store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `multisig_transactions`: transaction_id → serialized MultiSigTransaction
//! - `multisig_audit`: composite key (transaction_id|timestamp|event_id) → serialized AuditEvent
//!
//! Each mutator runs in a single write transaction, so a record is either
//! fully updated or untouched. Callers serialize mutators per transaction id
//! through the `ConcurrencyGuard`; readers never take that lock.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use super::audit::AuditEvent;
use crate::error::CoordinatorError;
use crate::models::{
    FailedBroadcast, MultiSigTransaction, SignatureRole, SignatureUpdate, TransactionStatus,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: transaction_id → serialized MultiSigTransaction (JSON bytes).
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("multisig_transactions");

/// Audit log: composite key → serialized AuditEvent (JSON bytes).
/// Key format: `transaction_id|timestamp_be|event_id` for chronological range scans.
const AUDIT_LOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("multisig_audit");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Audit Key Helpers
// =============================================================================

/// Build a composite key for the audit table.
fn make_audit_key(transaction_id: &str, timestamp_micros: i64, event_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(transaction_id.len() + 1 + 8 + 1 + event_id.len());
    key.extend_from_slice(transaction_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(timestamp_micros.max(0) as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Build the prefix and upper bound for scanning one transaction's audit events.
fn make_audit_range(transaction_id: &str) -> (Vec<u8>, Vec<u8>) {
    let mut prefix = Vec::with_capacity(transaction_id.len() + 1);
    prefix.extend_from_slice(transaction_id.as_bytes());
    prefix.push(b'|');

    let mut end = prefix.clone();
    end.extend_from_slice(&[0xFF; 20]);
    (prefix, end)
}

// =============================================================================
// TransactionStore
// =============================================================================

/// Durable keyed storage of multi-signature transactions.
pub struct TransactionStore {
    db: Database,
}

impl TransactionStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Transaction CRUD
    // =========================================================================

    /// Allocate a new id and persist a record with every role pending.
    ///
    /// redb serializes write transactions, so concurrent creates cannot
    /// allocate the same id.
    pub fn create(
        &self,
        content_hash: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> StoreResult<String> {
        let write_txn = self.db.begin_write()?;
        let transaction_id = {
            let mut table = write_txn.open_table(TRANSACTIONS)?;

            let mut transaction_id = Uuid::new_v4().to_string();
            while table.get(transaction_id.as_str())?.is_some() {
                transaction_id = Uuid::new_v4().to_string();
            }

            let record =
                MultiSigTransaction::new(transaction_id.clone(), content_hash.to_string(), metadata);
            let json = serde_json::to_vec(&record)?;
            table.insert(transaction_id.as_str(), json.as_slice())?;
            transaction_id
        };
        write_txn.commit()?;
        Ok(transaction_id)
    }

    /// Look up a transaction, if present.
    pub fn find(&self, transaction_id: &str) -> StoreResult<Option<MultiSigTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(transaction_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a transaction that must exist.
    pub fn get(&self, transaction_id: &str) -> Result<MultiSigTransaction, CoordinatorError> {
        self.find(transaction_id)?
            .ok_or_else(|| CoordinatorError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Move one role out of `Pending`. Finalized roles never change again.
    pub fn update_signature(
        &self,
        transaction_id: &str,
        role: SignatureRole,
        update: SignatureUpdate,
    ) -> Result<MultiSigTransaction, CoordinatorError> {
        self.modify(transaction_id, |record| {
            let current = record.role_status(role);
            if current.is_final() {
                return Err(CoordinatorError::RoleAlreadyFinalized {
                    transaction_id: record.transaction_id.clone(),
                    role,
                    status: current,
                });
            }

            record.signatures.insert(role, update.status());
            match update {
                SignatureUpdate::Signed(evidence) => {
                    record.signers.insert(role, evidence);
                }
                SignatureUpdate::Rejected { reason } => {
                    record.rejections.insert(role, reason);
                }
            }
            Ok(())
        })
    }

    /// Record the chain hash of a successful broadcast. Set exactly once.
    pub fn finalize_broadcast(
        &self,
        transaction_id: &str,
        chain_tx_hash: &str,
    ) -> Result<MultiSigTransaction, CoordinatorError> {
        self.modify(transaction_id, |record| {
            if let Some(existing) = &record.blockchain_tx_hash {
                return Err(CoordinatorError::AlreadyFinalized {
                    transaction_id: record.transaction_id.clone(),
                    chain_tx_hash: existing.clone(),
                });
            }
            if !record.is_fully_signed() {
                return Err(CoordinatorError::NotFullySigned {
                    transaction_id: record.transaction_id.clone(),
                    signed: record.signed_count(),
                });
            }
            record.blockchain_tx_hash = Some(chain_tx_hash.to_string());
            record.broadcast_attempts += 1;
            Ok(())
        })
    }

    /// Record a broadcast attempt that produced no chain hash.
    pub fn record_broadcast_failure(
        &self,
        transaction_id: &str,
        failure: FailedBroadcast,
    ) -> Result<MultiSigTransaction, CoordinatorError> {
        self.modify(transaction_id, |record| {
            if let Some(existing) = &record.blockchain_tx_hash {
                return Err(CoordinatorError::AlreadyFinalized {
                    transaction_id: record.transaction_id.clone(),
                    chain_tx_hash: existing.clone(),
                });
            }
            record.broadcast_attempts += 1;
            record.last_broadcast_failure = Some(failure);
            Ok(())
        })
    }

    /// All stored records, oldest first.
    pub fn list_active(&self) -> StoreResult<Vec<MultiSigTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice::<MultiSigTransaction>(value.value())?);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Fully signed records still waiting for a successful broadcast.
    pub fn list_awaiting_broadcast(&self) -> StoreResult<Vec<MultiSigTransaction>> {
        Ok(self
            .list_active()?
            .into_iter()
            .filter(|record| record.status() == TransactionStatus::PendingBroadcast)
            .collect())
    }

    // =========================================================================
    // Audit log
    // =========================================================================

    /// Append an audit event.
    pub fn append_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        let key = make_audit_key(
            &event.transaction_id,
            event.timestamp.timestamp_micros(),
            &event.event_id,
        );
        let json = serde_json::to_vec(event)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Audit events of one transaction in chronological order.
    pub fn audit_trail(&self, transaction_id: &str) -> StoreResult<Vec<AuditEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;
        let (start, end) = make_audit_range(transaction_id);

        let mut events = Vec::new();
        for entry in table.range(start.as_slice()..end.as_slice())? {
            let (_, value) = entry?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read-modify-write one record in a single write transaction. A failing
    /// `apply` leaves the stored record untouched.
    fn modify<F>(&self, transaction_id: &str, apply: F) -> Result<MultiSigTransaction, CoordinatorError>
    where
        F: FnOnce(&mut MultiSigTransaction) -> Result<(), CoordinatorError>,
    {
        self.try_modify(transaction_id, apply)?
    }

    fn try_modify<F>(
        &self,
        transaction_id: &str,
        apply: F,
    ) -> StoreResult<Result<MultiSigTransaction, CoordinatorError>>
    where
        F: FnOnce(&mut MultiSigTransaction) -> Result<(), CoordinatorError>,
    {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut table = write_txn.open_table(TRANSACTIONS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = match table.get(transaction_id)? {
                Some(existing) => existing.value().to_vec(),
                None => {
                    return Ok(Err(CoordinatorError::TransactionNotFound(
                        transaction_id.to_string(),
                    )))
                }
            };

            let mut record: MultiSigTransaction = serde_json::from_slice(&existing_bytes)?;
            if let Err(e) = apply(&mut record) {
                return Ok(Err(e));
            }
            record.updated_at = chrono::Utc::now();

            let json = serde_json::to_vec(&record)?;
            table.insert(transaction_id, json.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(Ok(record))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::models::{RoleSignature, SignatureStatus};
    use crate::storage::audit::AuditEventType;

    fn temp_store() -> (TransactionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TransactionStore::open(&dir.path().join("multisig.redb")).unwrap();
        (store, dir)
    }

    fn evidence() -> RoleSignature {
        serde_json::from_value(serde_json::json!({
            "pub_key": { "type": "tendermint/PubKeySecp256k1", "value": "A1" },
            "signature": "c2ln",
            "account_number": "1",
            "sequence": "0",
            "fee": { "amount": [], "gas": "200000" },
            "memo": "m",
            "msgs": [],
            "signed_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    fn sign_all(store: &TransactionStore, id: &str) {
        for role in SignatureRole::ALL {
            store
                .update_signature(id, role, SignatureUpdate::Signed(evidence()))
                .unwrap();
        }
    }

    #[test]
    fn create_and_get_transaction() {
        let (store, _dir) = temp_store();
        let mut metadata = serde_json::Map::new();
        metadata.insert("property".to_string(), serde_json::json!("unit-7"));

        let id = store.create("abc123", metadata).unwrap();
        let record = store.get(&id).unwrap();

        assert_eq!(record.transaction_id, id);
        assert_eq!(record.content_hash, "abc123");
        assert_eq!(record.metadata["property"], "unit-7");
        assert_eq!(record.status(), TransactionStatus::Active);
    }

    #[test]
    fn get_missing_transaction_fails() {
        let (store, _dir) = temp_store();
        assert!(matches!(
            store.get("nope"),
            Err(CoordinatorError::TransactionNotFound(_))
        ));
        assert!(matches!(
            store.update_signature(
                "nope",
                SignatureRole::Owner,
                SignatureUpdate::Rejected { reason: "x".into() }
            ),
            Err(CoordinatorError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn concurrent_creates_allocate_distinct_ids() {
        let (store, _dir) = temp_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.create("hash", serde_json::Map::new()).unwrap())
            })
            .collect();
        let ids: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(ids.len(), 8);
        assert_eq!(store.list_active().unwrap().len(), 8);
    }

    #[test]
    fn update_signature_records_evidence() {
        let (store, _dir) = temp_store();
        let id = store.create("abc", serde_json::Map::new()).unwrap();

        let record = store
            .update_signature(&id, SignatureRole::Owner, SignatureUpdate::Signed(evidence()))
            .unwrap();
        assert_eq!(record.role_status(SignatureRole::Owner), SignatureStatus::Signed);
        assert!(record.signers.contains_key(&SignatureRole::Owner));
        assert_eq!(record.status(), TransactionStatus::PendingSignatures);
    }

    #[test]
    fn finalized_role_cannot_change() {
        let (store, _dir) = temp_store();
        let id = store.create("abc", serde_json::Map::new()).unwrap();
        store
            .update_signature(
                &id,
                SignatureRole::Validator,
                SignatureUpdate::Rejected {
                    reason: "appraisal mismatch".into(),
                },
            )
            .unwrap();

        let err = store
            .update_signature(&id, SignatureRole::Validator, SignatureUpdate::Signed(evidence()))
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::RoleAlreadyFinalized {
                status: SignatureStatus::Rejected,
                ..
            }
        ));

        let record = store.get(&id).unwrap();
        assert_eq!(
            record.role_status(SignatureRole::Validator),
            SignatureStatus::Rejected
        );
        assert_eq!(
            record.rejections[&SignatureRole::Validator],
            "appraisal mismatch"
        );
        assert!(record.signers.is_empty());
    }

    #[test]
    fn finalize_requires_all_signatures() {
        let (store, _dir) = temp_store();
        let id = store.create("abc", serde_json::Map::new()).unwrap();
        store
            .update_signature(&id, SignatureRole::Owner, SignatureUpdate::Signed(evidence()))
            .unwrap();

        assert!(matches!(
            store.finalize_broadcast(&id, "HASH"),
            Err(CoordinatorError::NotFullySigned { signed: 1, .. })
        ));
        assert_eq!(store.get(&id).unwrap().blockchain_tx_hash, None);
    }

    #[test]
    fn finalize_sets_hash_exactly_once() {
        let (store, _dir) = temp_store();
        let id = store.create("abc", serde_json::Map::new()).unwrap();
        sign_all(&store, &id);
        assert_eq!(store.list_awaiting_broadcast().unwrap().len(), 1);

        let record = store.finalize_broadcast(&id, "HASH1").unwrap();
        assert_eq!(record.status(), TransactionStatus::Completed);

        let err = store.finalize_broadcast(&id, "HASH2").unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::AlreadyFinalized { ref chain_tx_hash, .. } if chain_tx_hash == "HASH1"
        ));
        assert_eq!(
            store.get(&id).unwrap().blockchain_tx_hash.as_deref(),
            Some("HASH1")
        );
        assert!(store.list_awaiting_broadcast().unwrap().is_empty());
    }

    #[test]
    fn broadcast_failures_are_counted_until_finalized() {
        let (store, _dir) = temp_store();
        let id = store.create("abc", serde_json::Map::new()).unwrap();
        sign_all(&store, &id);

        let failure = FailedBroadcast {
            kind: "timeout".to_string(),
            message: "broadcast timed out".to_string(),
            outcome_unknown: true,
            failed_at: chrono::Utc::now(),
        };
        let record = store.record_broadcast_failure(&id, failure.clone()).unwrap();
        assert_eq!(record.broadcast_attempts, 1);
        assert_eq!(record.last_broadcast_failure.as_ref(), Some(&failure));

        let record = store.finalize_broadcast(&id, "HASH1").unwrap();
        assert_eq!(record.broadcast_attempts, 2);

        assert!(matches!(
            store.record_broadcast_failure(&id, failure),
            Err(CoordinatorError::AlreadyFinalized { .. })
        ));
        assert_eq!(store.get(&id).unwrap().broadcast_attempts, 2);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("multisig.redb");
        let id = {
            let store = TransactionStore::open(&path).unwrap();
            store.create("abc", serde_json::Map::new()).unwrap()
        };

        let store = TransactionStore::open(&path).unwrap();
        assert_eq!(store.get(&id).unwrap().content_hash, "abc");
    }

    #[test]
    fn audit_trail_is_per_transaction_and_ordered() {
        let (store, _dir) = temp_store();
        let a = store.create("a", serde_json::Map::new()).unwrap();
        let b = store.create("b", serde_json::Map::new()).unwrap();

        let mut created = AuditEvent::new(&a, AuditEventType::TransactionCreated);
        let mut accepted = AuditEvent::new(&a, AuditEventType::SignatureAccepted);
        created.timestamp = chrono::Utc::now() - chrono::Duration::seconds(5);
        accepted.timestamp = chrono::Utc::now();

        store.append_audit(&accepted).unwrap();
        store.append_audit(&created).unwrap();
        store
            .append_audit(&AuditEvent::new(&b, AuditEventType::TransactionCreated))
            .unwrap();

        let trail = store.audit_trail(&a).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event_type, AuditEventType::TransactionCreated);
        assert_eq!(trail[1].event_type, AuditEventType::SignatureAccepted);
        assert_eq!(store.audit_trail(&b).unwrap().len(), 1);
    }

    #[test]
    fn audit_key_orders_by_time() {
        let early = make_audit_key("tx", 1_000, "e1");
        let late = make_audit_key("tx", 2_000, "e0");
        assert!(early < late);
    }
}
