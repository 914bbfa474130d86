// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet payload and assembled transaction types.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::messages::CanonicalMessage;
use crate::error::CoordinatorError;
use crate::models::SignatureRole;

/// A denomination and amount pair. Amounts stay decimal strings as on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

/// Transaction fee declared in the signed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    #[serde(default)]
    pub amount: Vec<Coin>,
    #[serde(deserialize_with = "string_or_number")]
    pub gas: String,
}

/// Public key of the signing wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

/// Signature section of a wallet payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: PubKey,
    pub signature: String,
}

/// Document the wallet signed. Messages are kept raw until translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignDoc {
    pub chain_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub account_number: String,
    #[serde(deserialize_with = "string_or_number")]
    pub sequence: String,
    pub fee: Fee,
    #[serde(default)]
    pub msgs: Vec<Value>,
    #[serde(default)]
    pub memo: String,
}

/// Payload returned by a wallet after signing.
///
/// ```text
/// { signed: { chain_id, account_number, sequence, fee, msgs, memo },
///   signature: { pub_key: { type, value }, signature } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPayload {
    pub signed: SignDoc,
    pub signature: StdSignature,
}

impl SignedPayload {
    /// Check the payload structure. Cryptographic validity is left to the chain.
    pub fn parse(raw: &Value) -> Result<Self, CoordinatorError> {
        let object = raw.as_object().ok_or_else(|| {
            CoordinatorError::InvalidSignaturePayload("payload is not an object".to_string())
        })?;
        for section in ["signed", "signature"] {
            if !object.get(section).is_some_and(Value::is_object) {
                return Err(CoordinatorError::InvalidSignaturePayload(format!(
                    "missing `{section}` section"
                )));
            }
        }

        let payload: SignedPayload = serde_json::from_value(raw.clone())
            .map_err(|e| CoordinatorError::InvalidSignaturePayload(e.to_string()))?;

        if payload.signature.pub_key.value.trim().is_empty() {
            return Err(CoordinatorError::InvalidSignaturePayload(
                "public key value is empty".to_string(),
            ));
        }
        if payload.signature.signature.trim().is_empty() {
            return Err(CoordinatorError::InvalidSignaturePayload(
                "signature value is empty".to_string(),
            ));
        }
        Ok(payload)
    }
}

/// One role's signature inside an assembled transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledSignature {
    pub role: SignatureRole,
    pub pub_key: PubKey,
    pub signature: String,
    pub account_number: String,
    pub sequence: String,
}

/// Fully signed transaction handed to a [`super::ChainBroadcaster`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledTransaction {
    pub transaction_id: String,
    pub chain_id: String,
    pub msgs: Vec<CanonicalMessage>,
    pub fee: Fee,
    pub memo: String,
    pub signatures: Vec<AssembledSignature>,
}

/// Wallets emit account numbers, sequences and gas as either strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}
