// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Coordinator error taxonomy.
//!
//! Every failure carries a stable `error_code` so the HTTP layer can map it
//! to a status code without inspecting the message text.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::blockchain::{BroadcastError, MemoError};
use crate::models::{SignatureRole, SignatureStatus, TransactionStatus};
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("transaction {transaction_id} is already {status}")]
    AlreadyTerminal {
        transaction_id: String,
        status: TransactionStatus,
    },

    #[error("role {role} on transaction {transaction_id} is already {status}")]
    RoleAlreadyFinalized {
        transaction_id: String,
        role: SignatureRole,
        status: SignatureStatus,
    },

    #[error("invalid signature payload: {0}")]
    InvalidSignaturePayload(String),

    #[error("chain id mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: String, actual: String },

    #[error("malformed memo: {0}")]
    MemoFormat(#[from] MemoError),

    #[error("memo {field} does not match: expected {expected}, got {actual}")]
    MemoBindingMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("none of the {submitted} submitted messages could be translated")]
    NoValidMessages { submitted: usize },

    #[error("timed out after {waited:?} waiting for lock on transaction {transaction_id}")]
    LockTimeout {
        transaction_id: String,
        waited: Duration,
    },

    #[error("transaction {transaction_id} was already broadcast as {chain_tx_hash}")]
    AlreadyFinalized {
        transaction_id: String,
        chain_tx_hash: String,
    },

    #[error("transaction {transaction_id} has {signed} of 3 signatures")]
    NotFullySigned {
        transaction_id: String,
        signed: usize,
    },

    #[error("broadcast of transaction {transaction_id} failed: {source}")]
    BroadcastFailure {
        transaction_id: String,
        #[source]
        source: BroadcastError,
    },

    #[error("invalid content hash: {0}")]
    InvalidContentHash(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl CoordinatorError {
    /// Stable machine-readable code for this failure.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoordinatorError::TransactionNotFound(_) => "transaction_not_found",
            CoordinatorError::AlreadyTerminal { .. } => "already_terminal",
            CoordinatorError::RoleAlreadyFinalized { .. } => "role_already_finalized",
            CoordinatorError::InvalidSignaturePayload(_) => "invalid_signature_payload",
            CoordinatorError::ChainIdMismatch { .. } => "chain_id_mismatch",
            CoordinatorError::MemoFormat(_) => "memo_format",
            CoordinatorError::MemoBindingMismatch { .. } => "memo_binding_mismatch",
            CoordinatorError::NoValidMessages { .. } => "no_valid_messages",
            CoordinatorError::LockTimeout { .. } => "lock_timeout",
            CoordinatorError::AlreadyFinalized { .. } => "already_finalized",
            CoordinatorError::NotFullySigned { .. } => "not_fully_signed",
            CoordinatorError::BroadcastFailure { .. } => "broadcast_failure",
            CoordinatorError::InvalidContentHash(_) => "invalid_content_hash",
            CoordinatorError::Storage(_) => "storage_error",
        }
    }

    /// HTTP status the excluded HTTP layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordinatorError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::AlreadyTerminal { .. }
            | CoordinatorError::RoleAlreadyFinalized { .. }
            | CoordinatorError::AlreadyFinalized { .. }
            | CoordinatorError::NotFullySigned { .. } => StatusCode::CONFLICT,
            CoordinatorError::InvalidSignaturePayload(_)
            | CoordinatorError::ChainIdMismatch { .. }
            | CoordinatorError::MemoFormat(_)
            | CoordinatorError::InvalidContentHash(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::MemoBindingMismatch { .. }
            | CoordinatorError::NoValidMessages { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoordinatorError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoordinatorError::BroadcastFailure { .. } => StatusCode::BAD_GATEWAY,
            CoordinatorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failures pointing at contention, leaked locks or a broken store rather
    /// than at the submitted data.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            CoordinatorError::LockTimeout { .. } | CoordinatorError::Storage(_)
        )
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}
