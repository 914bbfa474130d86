// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Multi-signature transaction records.
//!
//! A [`MultiSigTransaction`] tracks exactly three stakeholder roles. Its
//! lifecycle status is always derived from the signature map and the chain
//! hash, never stored on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::blockchain::{CanonicalMessage, Fee, PubKey};

/// Stakeholder role whose signature a transaction requires.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SignatureRole {
    Owner,
    Contributor,
    Validator,
}

impl SignatureRole {
    /// Every role, in assembly order.
    pub const ALL: [SignatureRole; 3] = [
        SignatureRole::Owner,
        SignatureRole::Contributor,
        SignatureRole::Validator,
    ];

    /// Literal value carried in memos.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureRole::Owner => "owner",
            SignatureRole::Contributor => "contributor",
            SignatureRole::Validator => "validator",
        }
    }
}

impl std::fmt::Display for SignatureRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-role signature state. `Signed` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    #[default]
    Pending,
    Signed,
    Rejected,
}

impl SignatureStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, SignatureStatus::Pending)
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureStatus::Pending => write!(f, "pending"),
            SignatureStatus::Signed => write!(f, "signed"),
            SignatureStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Lifecycle status derived from a transaction's signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// No role has signed yet
    Active,
    /// One or two roles have signed
    PendingSignatures,
    /// All roles signed, broadcast has not succeeded yet
    PendingBroadcast,
    /// Broadcast succeeded and the chain hash is recorded
    Completed,
    /// At least one role rejected
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::PendingSignatures => "pending_signatures",
            TransactionStatus::PendingBroadcast => "pending_broadcast",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// Completed and rejected transactions accept no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Rejected
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence kept for an accepted signature, enough to re-assemble the
/// transaction for a broadcast retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSignature {
    pub pub_key: PubKey,
    pub signature: String,
    pub account_number: String,
    pub sequence: String,
    pub fee: Fee,
    pub memo: String,
    /// Messages after translation to the canonical shape
    pub msgs: Vec<CanonicalMessage>,
    pub signed_at: DateTime<Utc>,
}

/// Typed signature transition applied by the store.
#[derive(Debug, Clone)]
pub enum SignatureUpdate {
    Signed(RoleSignature),
    Rejected { reason: String },
}

impl SignatureUpdate {
    pub fn status(&self) -> SignatureStatus {
        match self {
            SignatureUpdate::Signed(_) => SignatureStatus::Signed,
            SignatureUpdate::Rejected { .. } => SignatureStatus::Rejected,
        }
    }
}

/// A broadcast attempt that produced no chain hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FailedBroadcast {
    /// Failure kind such as `timeout` or `unreachable`
    pub kind: String,
    pub message: String,
    /// The transaction may have reached the chain anyway
    pub outcome_unknown: bool,
    pub failed_at: DateTime<Utc>,
}

/// Canonical stored record of a multi-signature transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MultiSigTransaction {
    /// Unique identifier assigned at creation
    pub transaction_id: String,
    /// Hex digest of the anchored content
    pub content_hash: String,
    /// Caller-supplied metadata, immutable after creation
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Status of every role
    #[schema(value_type = Object)]
    pub signatures: BTreeMap<SignatureRole, SignatureStatus>,
    /// Evidence for every signed role
    #[serde(default)]
    #[schema(value_type = Object)]
    pub signers: BTreeMap<SignatureRole, RoleSignature>,
    /// Reasons given for rejected roles
    #[serde(default)]
    #[schema(value_type = Object)]
    pub rejections: BTreeMap<SignatureRole, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Chain hash, set once after a successful broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain_tx_hash: Option<String>,
    /// Broadcast calls made so far, successful or not
    #[serde(default)]
    pub broadcast_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_broadcast_failure: Option<FailedBroadcast>,
}

impl MultiSigTransaction {
    /// Create a fresh record with every role pending.
    pub fn new(
        transaction_id: String,
        content_hash: String,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            content_hash,
            metadata,
            signatures: SignatureRole::ALL
                .iter()
                .map(|role| (*role, SignatureStatus::Pending))
                .collect(),
            signers: BTreeMap::new(),
            rejections: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            blockchain_tx_hash: None,
            broadcast_attempts: 0,
            last_broadcast_failure: None,
        }
    }

    pub fn role_status(&self, role: SignatureRole) -> SignatureStatus {
        self.signatures.get(&role).copied().unwrap_or_default()
    }

    pub fn signed_count(&self) -> usize {
        SignatureRole::ALL
            .iter()
            .filter(|role| self.role_status(**role) == SignatureStatus::Signed)
            .count()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signed_count() == SignatureRole::ALL.len()
    }

    pub fn is_rejected(&self) -> bool {
        SignatureRole::ALL
            .iter()
            .any(|role| self.role_status(*role) == SignatureStatus::Rejected)
    }

    /// Derive the lifecycle status. Rejection wins over everything else.
    pub fn status(&self) -> TransactionStatus {
        if self.is_rejected() {
            return TransactionStatus::Rejected;
        }
        match self.signed_count() {
            0 => TransactionStatus::Active,
            1 | 2 => TransactionStatus::PendingSignatures,
            _ if self.blockchain_tx_hash.is_some() => TransactionStatus::Completed,
            _ => TransactionStatus::PendingBroadcast,
        }
    }

    /// Whether an unattended retry may resubmit this transaction.
    ///
    /// Requires a recorded failure whose outcome is known (nothing reached
    /// the chain) and fewer than `max_retries` retries after the first
    /// attempt. A fully signed record with no recorded failure never
    /// qualifies, since its first broadcast may still have been in flight.
    pub fn auto_retry_allowed(&self, max_retries: u32) -> bool {
        self.status() == TransactionStatus::PendingBroadcast
            && self.broadcast_attempts <= max_retries
            && self
                .last_broadcast_failure
                .as_ref()
                .is_some_and(|failure| !failure.outcome_unknown)
    }

    /// Explorer link for the broadcast transaction, if any.
    pub fn explorer_url(&self, explorer_base: &str) -> Option<String> {
        self.blockchain_tx_hash
            .as_ref()
            .map(|hash| format!("{}/{hash}", explorer_base.trim_end_matches('/')))
    }

    /// Read-only view for status display.
    pub fn snapshot(&self, explorer_base: &str) -> TransactionSnapshot {
        TransactionSnapshot {
            transaction_id: self.transaction_id.clone(),
            content_hash: self.content_hash.clone(),
            metadata: self.metadata.clone(),
            status: self.status(),
            signatures: self.signatures.clone(),
            rejections: self.rejections.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            blockchain_tx_hash: self.blockchain_tx_hash.clone(),
            explorer_url: self.explorer_url(explorer_base),
            broadcast_attempts: self.broadcast_attempts,
            last_broadcast_failure: self.last_broadcast_failure.clone(),
        }
    }
}

/// Snapshot returned to dashboard and audit consumers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionSnapshot {
    pub transaction_id: String,
    pub content_hash: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub status: TransactionStatus,
    #[schema(value_type = Object)]
    pub signatures: BTreeMap<SignatureRole, SignatureStatus>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    #[schema(value_type = Object)]
    pub rejections: BTreeMap<SignatureRole, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    pub broadcast_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_broadcast_failure: Option<FailedBroadcast>,
}

/// Lowercase hex SHA-256 of a document, used as a transaction's content hash.
pub fn hash_content(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
