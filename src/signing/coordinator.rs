// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Multi-signature signing coordinator.
//!
//! ## Lifecycle
//!
//! ```text
//! ACTIVE ──sign──▶ PENDING_SIGNATURES ──sign──▶ PENDING_BROADCAST ──broadcast──▶ COMPLETED
//!    │                    │                            ▲      │
//!    └──────reject────────┴──────▶ REJECTED            └retry─┘
//! ```
//!
//! Every mutation runs under the per-transaction lock. A submitted signature
//! is only recorded after its payload structure, chain id, memo binding and
//! messages have all been validated, so a refused submission never changes
//! stored state. Broadcast happens inside the same lock that recorded the
//! final signature, which is what keeps it at-most-once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::blockchain::{
    decode_memo, translate_messages, AssembledSignature, AssembledTransaction, ChainBroadcaster,
    DecodedMemo, SignedPayload,
};
use crate::error::CoordinatorError;
use crate::models::{
    FailedBroadcast, MultiSigTransaction, RoleSignature, SignatureRole, SignatureUpdate,
    TransactionSnapshot, TransactionStatus,
};
use crate::storage::{AuditEvent, AuditEventType, SnapshotCache, TransactionStore};

use super::guard::{ConcurrencyGuard, DEFAULT_LOCK_TIMEOUT};

/// Tunables of a [`SigningCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Chain id every signed document must declare
    pub chain_id: String,
    /// Base URL for explorer links
    pub explorer_url: String,
    pub lock_timeout: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl CoordinatorSettings {
    pub fn new(chain_id: impl Into<String>, explorer_url: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            explorer_url: explorer_url.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            cache_capacity: 256,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

/// Orchestrates signature collection, validation and broadcast.
pub struct SigningCoordinator<B> {
    store: Arc<TransactionStore>,
    guard: ConcurrencyGuard,
    cache: SnapshotCache,
    broadcaster: B,
    settings: CoordinatorSettings,
}

impl<B: ChainBroadcaster> SigningCoordinator<B> {
    pub fn new(store: Arc<TransactionStore>, broadcaster: B, settings: CoordinatorSettings) -> Self {
        Self {
            store,
            guard: ConcurrencyGuard::new(settings.lock_timeout),
            cache: SnapshotCache::new(settings.cache_capacity, settings.cache_ttl),
            broadcaster,
            settings,
        }
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Create a transaction anchored to `content_hash`.
    pub fn create(
        &self,
        content_hash: &str,
        metadata: serde_json::Map<String, Value>,
    ) -> Result<String, CoordinatorError> {
        validate_content_hash(content_hash)?;
        let transaction_id = self.store.create(content_hash, metadata)?;

        self.audit(AuditEvent::new(&transaction_id, AuditEventType::TransactionCreated)
            .with_details(json!({ "content_hash": content_hash })));
        info!(transaction_id = %transaction_id, content_hash, "Multi-sig transaction created");
        Ok(transaction_id)
    }

    /// Validate and record a wallet-signed payload for `role`. Broadcasts
    /// once the last role signs.
    pub async fn submit_signature(
        &self,
        transaction_id: &str,
        role: SignatureRole,
        signed_payload: &Value,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let result = self
            .guard
            .with_lock(transaction_id, || {
                self.apply_signature(transaction_id, role, signed_payload)
            })
            .await;
        self.finish(transaction_id, role, result)
    }

    /// Record that `role` refuses to sign. No broadcast ever follows.
    pub async fn reject_signature(
        &self,
        transaction_id: &str,
        role: SignatureRole,
        reason: &str,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let result = self
            .guard
            .with_lock(transaction_id, || async {
                let record = self.store.get(transaction_id)?;
                ensure_open(&record, role)?;

                let record = self.store.update_signature(
                    transaction_id,
                    role,
                    SignatureUpdate::Rejected {
                        reason: reason.to_string(),
                    },
                )?;
                self.cache.upsert(record.clone());
                self.audit(
                    AuditEvent::new(transaction_id, AuditEventType::SignatureRejected)
                        .with_role(role)
                        .with_details(json!({ "reason": reason })),
                );
                info!(transaction_id, role = %role, reason, "Signature rejected");
                Ok(record.status())
            })
            .await;
        self.finish(transaction_id, role, result)
    }

    /// Retry the broadcast of a fully signed transaction without collecting
    /// signatures again. The caller decides; any earlier failure kind is
    /// accepted, including ones whose outcome is unknown.
    pub async fn retry_broadcast(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let result = self
            .guard
            .with_lock(transaction_id, || async {
                let record = self.store.get(transaction_id)?;
                ensure_broadcastable(&record)?;
                self.broadcast_locked(&record).await
            })
            .await;

        if let Err(e) = &result {
            self.log_failure(transaction_id, None, e);
        }
        self.release_if_terminal(transaction_id, &result);
        result
    }

    /// Unattended retry. Resubmits only when the last attempt is known not
    /// to have reached the chain and fewer than `max_retries` retries were
    /// made; returns `None` when the transaction does not qualify.
    pub async fn auto_retry_broadcast(
        &self,
        transaction_id: &str,
        max_retries: u32,
    ) -> Result<Option<TransactionStatus>, CoordinatorError> {
        let result = self
            .guard
            .with_lock(transaction_id, || async {
                let record = self.store.get(transaction_id)?;
                if !record.auto_retry_allowed(max_retries) {
                    debug!(
                        transaction_id,
                        attempts = record.broadcast_attempts,
                        "Skipping automatic broadcast retry"
                    );
                    return Ok(None);
                }
                self.broadcast_locked(&record).await.map(Some)
            })
            .await;

        if let Err(e) = &result {
            self.log_failure(transaction_id, None, e);
        }
        if matches!(result, Ok(Some(status)) if status.is_terminal()) {
            self.guard.reclaim(transaction_id);
        }
        result
    }

    /// Snapshot of one transaction. Takes no lock.
    pub fn get_status(&self, transaction_id: &str) -> Result<TransactionSnapshot, CoordinatorError> {
        let record = match self.cache.get(transaction_id) {
            Some(record) => record,
            None => {
                let ticket = self.cache.ticket();
                let record = self.store.get(transaction_id)?;
                self.cache.fill(ticket, record.clone());
                record
            }
        };
        Ok(record.snapshot(&self.settings.explorer_url))
    }

    /// Snapshots of every stored transaction, oldest first.
    pub fn list_active(&self) -> Result<Vec<TransactionSnapshot>, CoordinatorError> {
        Ok(self
            .store
            .list_active()?
            .iter()
            .map(|record| record.snapshot(&self.settings.explorer_url))
            .collect())
    }

    /// Ids of transactions an unattended retry may resubmit.
    pub fn retry_candidates(&self, max_retries: u32) -> Result<Vec<String>, CoordinatorError> {
        Ok(self
            .store
            .list_awaiting_broadcast()?
            .into_iter()
            .filter(|record| record.auto_retry_allowed(max_retries))
            .map(|record| record.transaction_id)
            .collect())
    }

    /// Audit events of one transaction.
    pub fn audit_trail(&self, transaction_id: &str) -> Result<Vec<AuditEvent>, CoordinatorError> {
        Ok(self.store.audit_trail(transaction_id)?)
    }

    // =========================================================================
    // Locked steps
    // =========================================================================

    async fn apply_signature(
        &self,
        transaction_id: &str,
        role: SignatureRole,
        raw: &Value,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let record = self.store.get(transaction_id)?;
        ensure_open(&record, role)?;

        let payload = SignedPayload::parse(raw)?;
        if payload.signed.chain_id != self.settings.chain_id {
            return Err(CoordinatorError::ChainIdMismatch {
                expected: self.settings.chain_id.clone(),
                actual: payload.signed.chain_id,
            });
        }

        let memo = decode_memo(&payload.signed.memo)?;
        verify_binding(&memo, &record, role)?;

        let msgs = translate_messages(&payload.signed.msgs)?;

        let evidence = RoleSignature {
            pub_key: payload.signature.pub_key,
            signature: payload.signature.signature,
            account_number: payload.signed.account_number,
            sequence: payload.signed.sequence,
            fee: payload.signed.fee,
            memo: payload.signed.memo,
            msgs,
            signed_at: Utc::now(),
        };
        let record =
            self.store
                .update_signature(transaction_id, role, SignatureUpdate::Signed(evidence))?;
        self.cache.upsert(record.clone());

        self.audit(AuditEvent::new(transaction_id, AuditEventType::SignatureAccepted).with_role(role));
        info!(
            transaction_id,
            role = %role,
            signed = record.signed_count(),
            "Signature accepted"
        );

        if record.is_fully_signed() {
            return self.broadcast_locked(&record).await;
        }
        Ok(record.status())
    }

    /// Assemble and broadcast. Caller must hold the transaction lock.
    async fn broadcast_locked(
        &self,
        record: &MultiSigTransaction,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let tx = assemble(record, &self.settings.chain_id)?;
        let transaction_id = record.transaction_id.as_str();

        match self.broadcaster.broadcast(&tx).await {
            Ok(chain_tx_hash) => {
                let record = self.store.finalize_broadcast(transaction_id, &chain_tx_hash)?;
                self.cache.upsert(record.clone());
                self.audit(
                    AuditEvent::new(transaction_id, AuditEventType::BroadcastSucceeded)
                        .with_details(json!({ "chain_tx_hash": chain_tx_hash })),
                );
                info!(transaction_id, chain_tx_hash = %chain_tx_hash, "Multi-sig transaction broadcast");
                Ok(record.status())
            }
            Err(source) => {
                let failure = FailedBroadcast {
                    kind: source.kind().to_string(),
                    message: source.to_string(),
                    outcome_unknown: source.outcome_unknown(),
                    failed_at: Utc::now(),
                };
                match self.store.record_broadcast_failure(transaction_id, failure) {
                    Ok(record) => self.cache.upsert(record),
                    Err(e) => {
                        self.cache.invalidate(transaction_id);
                        error!(transaction_id, error = %e, "Failed to record broadcast failure");
                    }
                }
                self.audit(
                    AuditEvent::new(transaction_id, AuditEventType::BroadcastFailed)
                        .with_details(json!({
                            "cause": source.to_string(),
                            "kind": source.kind(),
                            "outcome_unknown": source.outcome_unknown(),
                        }))
                        .failed("broadcast_failure"),
                );
                Err(CoordinatorError::BroadcastFailure {
                    transaction_id: transaction_id.to_string(),
                    source,
                })
            }
        }
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    fn finish(
        &self,
        transaction_id: &str,
        role: SignatureRole,
        result: Result<TransactionStatus, CoordinatorError>,
    ) -> Result<TransactionStatus, CoordinatorError> {
        if let Err(e) = &result {
            self.log_failure(transaction_id, Some(role), e);
            if is_refusal(e) {
                self.audit(
                    AuditEvent::new(transaction_id, AuditEventType::SignatureRefused)
                        .with_role(role)
                        .with_details(json!({ "message": e.to_string() }))
                        .failed(e.error_code()),
                );
            }
        }
        self.release_if_terminal(transaction_id, &result);
        result
    }

    fn log_failure(&self, transaction_id: &str, role: Option<SignatureRole>, e: &CoordinatorError) {
        let role = role.map(|r| r.as_str()).unwrap_or("-");
        if e.is_systemic() {
            error!(transaction_id, role, error_code = e.error_code(), error = %e, "Coordinator operation failed");
        } else {
            warn!(transaction_id, role, error_code = e.error_code(), error = %e, "Coordinator operation refused");
        }
    }

    fn release_if_terminal(
        &self,
        transaction_id: &str,
        result: &Result<TransactionStatus, CoordinatorError>,
    ) {
        let terminal = match result {
            Ok(status) => status.is_terminal(),
            Err(CoordinatorError::AlreadyTerminal { .. })
            | Err(CoordinatorError::AlreadyFinalized { .. }) => true,
            Err(_) => false,
        };
        if terminal {
            self.guard.reclaim(transaction_id);
        }
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.append_audit(&event) {
            warn!(
                transaction_id = %event.transaction_id,
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

/// Content hashes travel inside memos, so they may not contain memo delimiters.
fn validate_content_hash(content_hash: &str) -> Result<(), CoordinatorError> {
    if content_hash.trim().is_empty() {
        return Err(CoordinatorError::InvalidContentHash(
            "content hash is empty".to_string(),
        ));
    }
    if content_hash.contains([':', '|']) || content_hash.chars().any(char::is_whitespace) {
        return Err(CoordinatorError::InvalidContentHash(format!(
            "`{content_hash}` contains a memo delimiter or whitespace"
        )));
    }
    Ok(())
}

/// A role that already signed or rejected reports that first; otherwise a
/// terminal transaction refuses further changes.
fn ensure_open(record: &MultiSigTransaction, role: SignatureRole) -> Result<(), CoordinatorError> {
    let current = record.role_status(role);
    if current.is_final() {
        return Err(CoordinatorError::RoleAlreadyFinalized {
            transaction_id: record.transaction_id.clone(),
            role,
            status: current,
        });
    }
    let status = record.status();
    if status.is_terminal() {
        return Err(CoordinatorError::AlreadyTerminal {
            transaction_id: record.transaction_id.clone(),
            status,
        });
    }
    Ok(())
}

/// Only fully signed, unrejected transactions without a chain hash broadcast.
fn ensure_broadcastable(record: &MultiSigTransaction) -> Result<(), CoordinatorError> {
    if let Some(hash) = &record.blockchain_tx_hash {
        return Err(CoordinatorError::AlreadyFinalized {
            transaction_id: record.transaction_id.clone(),
            chain_tx_hash: hash.clone(),
        });
    }
    if record.is_rejected() {
        return Err(CoordinatorError::AlreadyTerminal {
            transaction_id: record.transaction_id.clone(),
            status: TransactionStatus::Rejected,
        });
    }
    Ok(())
}

/// The memo must name this transaction, its content hash and the submitting role.
fn verify_binding(
    memo: &DecodedMemo,
    record: &MultiSigTransaction,
    role: SignatureRole,
) -> Result<(), CoordinatorError> {
    let checks = [
        ("tx", record.transaction_id.as_str(), memo.transaction_id.as_str()),
        ("hash", record.content_hash.as_str(), memo.content_hash.as_str()),
        ("role", role.as_str(), memo.role.as_str()),
    ];
    for (field, expected, actual) in checks {
        if expected != actual {
            return Err(CoordinatorError::MemoBindingMismatch {
                field,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}

/// Validation failures worth an audit entry (the submission reached a real transaction).
fn is_refusal(e: &CoordinatorError) -> bool {
    matches!(
        e,
        CoordinatorError::RoleAlreadyFinalized { .. }
            | CoordinatorError::AlreadyTerminal { .. }
            | CoordinatorError::InvalidSignaturePayload(_)
            | CoordinatorError::ChainIdMismatch { .. }
            | CoordinatorError::MemoFormat(_)
            | CoordinatorError::MemoBindingMismatch { .. }
            | CoordinatorError::NoValidMessages { .. }
    )
}

/// Build the broadcastable transaction from stored signature evidence.
///
/// Messages, fee and memo come from the document that completed the set;
/// signatures are listed in role order.
fn assemble(
    record: &MultiSigTransaction,
    chain_id: &str,
) -> Result<AssembledTransaction, CoordinatorError> {
    let not_fully_signed = || CoordinatorError::NotFullySigned {
        transaction_id: record.transaction_id.clone(),
        signed: record.signed_count(),
    };
    if !record.is_fully_signed() {
        return Err(not_fully_signed());
    }

    let mut signatures = Vec::with_capacity(SignatureRole::ALL.len());
    for role in SignatureRole::ALL {
        let evidence = record.signers.get(&role).ok_or_else(not_fully_signed)?;
        signatures.push(AssembledSignature {
            role,
            pub_key: evidence.pub_key.clone(),
            signature: evidence.signature.clone(),
            account_number: evidence.account_number.clone(),
            sequence: evidence.sequence.clone(),
        });
    }

    let completing = record
        .signers
        .iter()
        .max_by_key(|(role, evidence)| (evidence.signed_at, **role))
        .map(|(_, evidence)| evidence)
        .ok_or_else(not_fully_signed)?;

    Ok(AssembledTransaction {
        transaction_id: record.transaction_id.clone(),
        chain_id: chain_id.to_string(),
        msgs: completing.msgs.clone(),
        fee: completing.fee.clone(),
        memo: completing.memo.clone(),
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::blockchain::BroadcastError;
    use crate::models::SignatureStatus;
    use crate::signing::test_support::{
        coordinator, payload, payload_with_memo, MockBroadcaster, CHAIN_ID, EXPLORER,
    };

    const HASH: &str = "abc123";

    #[tokio::test]
    async fn three_signatures_complete_and_broadcast_once() {
        let (coordinator, broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();
        assert_eq!(
            coordinator.get_status(&id).unwrap().status,
            TransactionStatus::Active
        );

        for role in [SignatureRole::Owner, SignatureRole::Contributor] {
            let status = coordinator
                .submit_signature(&id, role, &payload(&id, HASH, role))
                .await
                .unwrap();
            assert_eq!(status, TransactionStatus::PendingSignatures);
        }
        assert_eq!(broadcaster.calls(), 0);

        let status = coordinator
            .submit_signature(
                &id,
                SignatureRole::Validator,
                &payload(&id, HASH, SignatureRole::Validator),
            )
            .await
            .unwrap();
        assert_eq!(status, TransactionStatus::Completed);
        assert_eq!(broadcaster.calls(), 1);

        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(snapshot.status, TransactionStatus::Completed);
        assert_eq!(snapshot.blockchain_tx_hash.as_deref(), Some("CHAINHASH1"));
        assert_eq!(
            snapshot.explorer_url.as_deref(),
            Some(format!("{EXPLORER}/CHAINHASH1").as_str())
        );
        assert!(snapshot
            .signatures
            .values()
            .all(|status| *status == SignatureStatus::Signed));

        let sent = broadcaster.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.chain_id, CHAIN_ID);
        assert_eq!(sent.msgs.len(), 1);
        assert_eq!(sent.msgs[0].value.to_address, "cosmos1escrow");
        let roles: Vec<_> = sent.signatures.iter().map(|s| s.role).collect();
        assert_eq!(roles, SignatureRole::ALL.to_vec());
    }

    #[tokio::test]
    async fn legacy_memo_is_accepted() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let memo = format!("tx:{id}|hash:{HASH}|role:contributor");
        let status = coordinator
            .submit_signature(&id, SignatureRole::Contributor, &payload_with_memo(&memo))
            .await
            .unwrap();
        assert_eq!(status, TransactionStatus::PendingSignatures);
    }

    #[tokio::test]
    async fn forged_memo_leaves_role_pending() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();
        let other = coordinator.create("def456", serde_json::Map::new()).unwrap();

        // Signed for another transaction
        let err = coordinator
            .submit_signature(
                &id,
                SignatureRole::Owner,
                &payload(&other, HASH, SignatureRole::Owner),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::MemoBindingMismatch { field: "tx", .. }
        ));

        // Signed as a different role
        let err = coordinator
            .submit_signature(
                &id,
                SignatureRole::Owner,
                &payload(&id, HASH, SignatureRole::Validator),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::MemoBindingMismatch { field: "role", .. }
        ));

        // Signed over different content
        let err = coordinator
            .submit_signature(
                &id,
                SignatureRole::Owner,
                &payload(&id, "def456", SignatureRole::Owner),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::MemoBindingMismatch { field: "hash", .. }
        ));

        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(
            snapshot.signatures[&SignatureRole::Owner],
            SignatureStatus::Pending
        );
        assert_eq!(snapshot.status, TransactionStatus::Active);
    }

    #[tokio::test]
    async fn malformed_memo_is_refused() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        for memo in ["", "just a note", "{\"tx\":\"x\"}"] {
            let err = coordinator
                .submit_signature(&id, SignatureRole::Owner, &payload_with_memo(memo))
                .await
                .unwrap_err();
            assert!(
                matches!(err, CoordinatorError::MemoFormat(_)),
                "memo {memo:?} gave {err:?}"
            );
        }
        assert_eq!(
            coordinator.get_status(&id).unwrap().status,
            TransactionStatus::Active
        );
    }

    #[tokio::test]
    async fn untranslatable_messages_are_refused() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let mut raw = payload(&id, HASH, SignatureRole::Owner);
        raw["signed"]["msgs"] = json!([
            { "type": "cosmos-sdk/MsgDelegate", "value": { "delegator_address": "cosmos1a" } },
            { "note": "not a message" }
        ]);

        let err = coordinator
            .submit_signature(&id, SignatureRole::Owner, &raw)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::NoValidMessages { submitted: 2 }
        ));
        assert_eq!(
            coordinator.get_status(&id).unwrap().signatures[&SignatureRole::Owner],
            SignatureStatus::Pending
        );
    }

    #[tokio::test]
    async fn wrong_chain_is_refused() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let mut raw = payload(&id, HASH, SignatureRole::Owner);
        raw["signed"]["chain_id"] = json!("osmosis-1");

        let err = coordinator
            .submit_signature(&id, SignatureRole::Owner, &raw)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::ChainIdMismatch { ref actual, .. } if actual == "osmosis-1"
        ));
    }

    #[tokio::test]
    async fn structurally_invalid_payload_is_refused() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let err = coordinator
            .submit_signature(&id, SignatureRole::Owner, &json!({ "signed": {} }))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidSignaturePayload(_)));
    }

    #[tokio::test]
    async fn refusals_are_audited() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let _ = coordinator
            .submit_signature(&id, SignatureRole::Owner, &payload_with_memo("nonsense"))
            .await;

        let trail = coordinator.audit_trail(&id).unwrap();
        let refused = trail
            .iter()
            .find(|event| event.event_type == AuditEventType::SignatureRefused)
            .unwrap();
        assert!(!refused.success);
        assert_eq!(refused.error_code.as_deref(), Some("memo_format"));
        assert_eq!(refused.role, Some(SignatureRole::Owner));
    }

    #[tokio::test]
    async fn rejection_is_final_and_idempotent() {
        let (coordinator, broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let status = coordinator
            .reject_signature(&id, SignatureRole::Validator, "appraisal too low")
            .await
            .unwrap();
        assert_eq!(status, TransactionStatus::Rejected);

        let err = coordinator
            .reject_signature(&id, SignatureRole::Validator, "again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::RoleAlreadyFinalized {
                status: SignatureStatus::Rejected,
                ..
            }
        ));

        let err = coordinator
            .submit_signature(
                &id,
                SignatureRole::Owner,
                &payload(&id, HASH, SignatureRole::Owner),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::AlreadyTerminal {
                status: TransactionStatus::Rejected,
                ..
            }
        ));

        let err = coordinator
            .submit_signature(
                &id,
                SignatureRole::Validator,
                &payload(&id, HASH, SignatureRole::Validator),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::RoleAlreadyFinalized {
                status: SignatureStatus::Rejected,
                ..
            }
        ));

        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(snapshot.status, TransactionStatus::Rejected);
        assert_eq!(
            snapshot.rejections[&SignatureRole::Validator],
            "appraisal too low"
        );
        assert_eq!(broadcaster.calls(), 0);
        assert_eq!(
            snapshot.signatures[&SignatureRole::Validator],
            SignatureStatus::Rejected
        );
        let stored = coordinator.store.get(&id).unwrap();
        assert!(stored.signers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_for_one_role_sign_once() {
        let (coordinator, broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();
        for role in [SignatureRole::Contributor, SignatureRole::Validator] {
            coordinator
                .submit_signature(&id, role, &payload(&id, HASH, role))
                .await
                .unwrap();
        }

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let id = id.clone();
                tokio::spawn(async move {
                    let raw = payload(&id, HASH, SignatureRole::Owner);
                    coordinator
                        .submit_signature(&id, SignatureRole::Owner, &raw)
                        .await
                })
            })
            .collect();

        let mut completed = 0;
        let mut already_final = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(TransactionStatus::Completed) => completed += 1,
                Err(CoordinatorError::RoleAlreadyFinalized { .. }) => already_final += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(already_final, 7);
        assert_eq!(broadcaster.calls(), 1);
    }

    #[tokio::test]
    async fn failed_broadcast_can_be_retried() {
        let (coordinator, broadcaster, _dir) = coordinator(MockBroadcaster::failing());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        for role in [SignatureRole::Owner, SignatureRole::Contributor] {
            coordinator
                .submit_signature(&id, role, &payload(&id, HASH, role))
                .await
                .unwrap();
        }
        let err = coordinator
            .submit_signature(
                &id,
                SignatureRole::Validator,
                &payload(&id, HASH, SignatureRole::Validator),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::BroadcastFailure {
                source: BroadcastError::Unreachable(_),
                ..
            }
        ));

        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(snapshot.status, TransactionStatus::PendingBroadcast);
        assert_eq!(snapshot.blockchain_tx_hash, None);
        assert_eq!(snapshot.broadcast_attempts, 1);
        let failure = snapshot.last_broadcast_failure.unwrap();
        assert_eq!(failure.kind, "unreachable");
        assert!(!failure.outcome_unknown);
        assert_eq!(coordinator.retry_candidates(1).unwrap(), vec![id.clone()]);
        assert!(coordinator.retry_candidates(0).unwrap().is_empty());

        broadcaster.set_failure(None);
        let status = coordinator.retry_broadcast(&id).await.unwrap();
        assert_eq!(status, TransactionStatus::Completed);
        assert_eq!(broadcaster.calls(), 2);
        assert!(coordinator.retry_candidates(5).unwrap().is_empty());

        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(snapshot.broadcast_attempts, 2);

        let events: Vec<_> = coordinator
            .audit_trail(&id)
            .unwrap()
            .into_iter()
            .map(|event| event.event_type)
            .collect();
        assert!(events.contains(&AuditEventType::BroadcastFailed));
        assert_eq!(events.last(), Some(&AuditEventType::BroadcastSucceeded));
    }

    #[tokio::test]
    async fn timed_out_broadcast_is_only_retried_by_hand() {
        let (coordinator, broadcaster, _dir) =
            coordinator(MockBroadcaster::failing_with(BroadcastError::Timeout));
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();
        for role in SignatureRole::ALL {
            let _ = coordinator
                .submit_signature(&id, role, &payload(&id, HASH, role))
                .await;
        }
        assert_eq!(broadcaster.calls(), 1);

        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(snapshot.status, TransactionStatus::PendingBroadcast);
        assert!(snapshot.last_broadcast_failure.unwrap().outcome_unknown);

        assert!(coordinator.retry_candidates(5).unwrap().is_empty());
        assert_eq!(coordinator.auto_retry_broadcast(&id, 5).await.unwrap(), None);
        assert_eq!(broadcaster.calls(), 1);

        broadcaster.set_failure(None);
        assert_eq!(
            coordinator.retry_broadcast(&id).await.unwrap(),
            TransactionStatus::Completed
        );
        assert_eq!(broadcaster.calls(), 2);
    }

    #[tokio::test]
    async fn automatic_retries_stop_at_the_limit() {
        let (coordinator, broadcaster, _dir) = coordinator(MockBroadcaster::failing());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();
        for role in SignatureRole::ALL {
            let _ = coordinator
                .submit_signature(&id, role, &payload(&id, HASH, role))
                .await;
        }

        for _ in 0..2 {
            let err = coordinator.auto_retry_broadcast(&id, 2).await.unwrap_err();
            assert!(matches!(err, CoordinatorError::BroadcastFailure { .. }));
        }
        assert_eq!(broadcaster.calls(), 3);
        assert_eq!(coordinator.auto_retry_broadcast(&id, 2).await.unwrap(), None);
        assert_eq!(broadcaster.calls(), 3);
        assert_eq!(coordinator.get_status(&id).unwrap().broadcast_attempts, 3);
    }

    #[tokio::test]
    async fn status_read_racing_a_signature_does_not_cache_stale_state() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        // Reader misses the cache and reads the store before the write lands
        let ticket = coordinator.cache.ticket();
        let before = coordinator.store.get(&id).unwrap();
        assert_eq!(
            before.role_status(SignatureRole::Owner),
            SignatureStatus::Pending
        );

        coordinator
            .submit_signature(
                &id,
                SignatureRole::Owner,
                &payload(&id, HASH, SignatureRole::Owner),
            )
            .await
            .unwrap();

        assert!(!coordinator.cache.fill(ticket, before));
        let snapshot = coordinator.get_status(&id).unwrap();
        assert_eq!(snapshot.status, TransactionStatus::PendingSignatures);
        assert_eq!(
            snapshot.signatures[&SignatureRole::Owner],
            SignatureStatus::Signed
        );
    }

    #[tokio::test]
    async fn retry_refuses_finalized_or_incomplete_transactions() {
        let (coordinator, broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let id = coordinator.create(HASH, serde_json::Map::new()).unwrap();

        let err = coordinator.retry_broadcast(&id).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::NotFullySigned { signed: 0, .. }
        ));

        for role in SignatureRole::ALL {
            coordinator
                .submit_signature(&id, role, &payload(&id, HASH, role))
                .await
                .unwrap();
        }
        let err = coordinator.retry_broadcast(&id).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::AlreadyFinalized { ref chain_tx_hash, .. } if chain_tx_hash == "CHAINHASH1"
        ));
        assert_eq!(broadcaster.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_transaction_and_bad_hash() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());

        assert!(matches!(
            coordinator.get_status("missing"),
            Err(CoordinatorError::TransactionNotFound(_))
        ));
        let err = coordinator
            .reject_signature("missing", SignatureRole::Owner, "no")
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::TransactionNotFound(_)));
        assert!(coordinator.audit_trail("missing").unwrap().is_empty());

        for bad in ["", "  ", "a:b", "a|b"] {
            assert!(matches!(
                coordinator.create(bad, serde_json::Map::new()),
                Err(CoordinatorError::InvalidContentHash(_))
            ));
        }
        assert!(coordinator.list_active().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_active_returns_snapshots() {
        let (coordinator, _broadcaster, _dir) = coordinator(MockBroadcaster::default());
        let mut metadata = serde_json::Map::new();
        metadata.insert("property".to_string(), json!("unit-7"));
        let id = coordinator.create(HASH, metadata).unwrap();
        coordinator.create("def456", serde_json::Map::new()).unwrap();

        let listed = coordinator.list_active().unwrap();
        assert_eq!(listed.len(), 2);
        let first = listed.iter().find(|s| s.transaction_id == id).unwrap();
        assert_eq!(first.metadata["property"], "unit-7");
        assert_eq!(first.explorer_url, None);
    }

    #[test]
    fn assembly_uses_latest_signer_document() {
        let mut record = MultiSigTransaction::new("tx-1".into(), HASH.into(), serde_json::Map::new());
        let base: RoleSignature = serde_json::from_value(json!({
            "pub_key": { "type": "tendermint/PubKeySecp256k1", "value": "A1" },
            "signature": "c2ln",
            "account_number": "1",
            "sequence": "0",
            "fee": { "amount": [], "gas": "200000" },
            "memo": "first",
            "msgs": [],
            "signed_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert!(matches!(
            assemble(&record, CHAIN_ID),
            Err(CoordinatorError::NotFullySigned { .. })
        ));

        for (offset, role) in [
            (2, SignatureRole::Owner),
            (0, SignatureRole::Contributor),
            (1, SignatureRole::Validator),
        ] {
            let mut evidence = base.clone();
            evidence.memo = format!("memo-{role}");
            evidence.signed_at += chrono::Duration::seconds(offset);
            record.signatures.insert(role, SignatureStatus::Signed);
            record.signers.insert(role, evidence);
        }

        let tx = assemble(&record, CHAIN_ID).unwrap();
        assert_eq!(tx.memo, "memo-owner");
        assert_eq!(tx.chain_id, CHAIN_ID);
        assert_eq!(tx.signatures.len(), 3);
        assert_eq!(tx.signatures[0].role, SignatureRole::Owner);
        assert_eq!(tx.signatures[2].role, SignatureRole::Validator);
    }
}
