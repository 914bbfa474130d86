// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Memo codec binding a transaction id, content hash and signer role.
//!
//! ## Wire Formats
//!
//! ```text
//! compact: <transaction_id>:<content_hash>:<role>
//! legacy:  tx:<transaction_id>|hash:<content_hash>|role:<role>
//! ```
//!
//! Encoding always produces the compact form. Decoding accepts both and
//! fails closed on anything else, including JSON-looking memos.

use std::collections::HashMap;

use crate::models::SignatureRole;

const COMPACT_SEPARATOR: char = ':';
const LEGACY_SEPARATOR: char = '|';

/// Reasons a memo cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoError {
    #[error("memo is empty")]
    Empty,

    #[error("structured memo encodings are not accepted")]
    StructuredEncoding,

    #[error("memo matches neither the compact nor the legacy format")]
    UnrecognizedFormat,

    #[error("legacy memo is missing the `{0}` key")]
    MissingKey(&'static str),

    #[error("memo field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("legacy memo repeats the `{0}` key")]
    DuplicateKey(String),
}

/// The triple carried by a memo. The role stays a raw literal so that an
/// unknown role surfaces as a binding mismatch, not a format error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMemo {
    pub transaction_id: String,
    pub content_hash: String,
    pub role: String,
}

/// Encode the compact memo for a signer.
pub fn encode_memo(transaction_id: &str, content_hash: &str, role: SignatureRole) -> String {
    format!("{transaction_id}{COMPACT_SEPARATOR}{content_hash}{COMPACT_SEPARATOR}{role}")
}

/// Decode a compact or legacy memo.
pub fn decode_memo(memo: &str) -> Result<DecodedMemo, MemoError> {
    let memo = memo.trim();
    if memo.is_empty() {
        return Err(MemoError::Empty);
    }
    if memo.starts_with('{') || memo.starts_with('[') {
        return Err(MemoError::StructuredEncoding);
    }

    if !memo.contains(LEGACY_SEPARATOR) {
        if let Some(decoded) = decode_compact(memo) {
            return decoded;
        }
        return Err(MemoError::UnrecognizedFormat);
    }

    decode_legacy(memo)
}

fn decode_compact(memo: &str) -> Option<Result<DecodedMemo, MemoError>> {
    let parts: Vec<&str> = memo.split(COMPACT_SEPARATOR).collect();
    let [transaction_id, content_hash, role] = parts.as_slice() else {
        return None;
    };
    Some(build(transaction_id, content_hash, role))
}

fn decode_legacy(memo: &str) -> Result<DecodedMemo, MemoError> {
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for (key, value) in memo
        .split(LEGACY_SEPARATOR)
        .filter_map(|segment| segment.split_once(COMPACT_SEPARATOR))
    {
        let key = key.trim();
        if fields.insert(key, value.trim()).is_some() {
            return Err(MemoError::DuplicateKey(key.to_string()));
        }
    }

    let field = |key: &'static str| fields.get(key).copied().ok_or(MemoError::MissingKey(key));
    build(field("tx")?, field("hash")?, field("role")?)
}

fn build(transaction_id: &str, content_hash: &str, role: &str) -> Result<DecodedMemo, MemoError> {
    for (name, value) in [("tx", transaction_id), ("hash", content_hash), ("role", role)] {
        if value.is_empty() {
            return Err(MemoError::EmptyField(name));
        }
    }
    Ok(DecodedMemo {
        transaction_id: transaction_id.to_string(),
        content_hash: content_hash.to_string(),
        role: role.to_string(),
    })
}
