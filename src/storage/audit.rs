// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for multi-signature transaction lifecycles.
//!
//! Every accepted, rejected or refused signature and every broadcast
//! attempt is appended to the `multisig_audit` table of the transaction
//! database. Records are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::SignatureRole;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TransactionCreated,
    SignatureAccepted,
    SignatureRejected,
    /// A submitted signature failed validation
    SignatureRefused,
    BroadcastSucceeded,
    BroadcastFailed,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// Transaction the event belongs to.
    pub transaction_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Role involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<SignatureRole>,
    /// Additional details as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Stable error code if the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(transaction_id: impl Into<String>, event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.into(),
            timestamp: Utc::now(),
            event_type,
            role: None,
            details: None,
            success: true,
            error_code: None,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: SignatureRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with a stable error code.
    pub fn failed(mut self, error_code: impl Into<String>) -> Self {
        self.success = false;
        self.error_code = Some(error_code.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let event = AuditEvent::new("tx-1", AuditEventType::SignatureRefused)
            .with_role(SignatureRole::Contributor)
            .with_details(serde_json::json!({ "message": "bad memo" }))
            .failed("memo_format");

        assert_eq!(event.transaction_id, "tx-1");
        assert_eq!(event.role, Some(SignatureRole::Contributor));
        assert!(!event.success);
        assert_eq!(event.error_code.as_deref(), Some("memo_format"));
    }

    #[test]
    fn serializes_event_type_snake_case() {
        let event = AuditEvent::new("tx-1", AuditEventType::BroadcastSucceeded);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "broadcast_succeeded");
        assert!(json.get("role").is_none());
    }
}
