// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Translation of wallet-supplied value-transfer messages.
//!
//! Wallets hand back `MsgSend` instructions in several historical shapes.
//! Each one is classified into a [`WalletMessage`] variant, checked for the
//! exact field set, and converted to the canonical tagged form:
//!
//! ```text
//! canonical:      {"typeUrl": "/cosmos.bank.v1beta1.MsgSend",
//!                  "value": {"fromAddress", "toAddress", "amount": [{denom, amount}]}}
//! legacy nested:  {"type": "cosmos-sdk/MsgSend", "value": {"from_address", ...}}
//! legacy flat:    {"type": "cosmos-sdk/MsgSend", "from_address", ...}
//! untagged:       {"from_address", "to_address", "amount"}
//! ```
//!
//! Messages that cannot be translated are dropped. A batch where nothing
//! translates is an error; raw input is never forwarded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::types::Coin;
use crate::error::CoordinatorError;

/// Type URL of the canonical bank send message.
pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";

/// Legacy (amino) type tag of the bank send message.
pub const MSG_SEND_AMINO_TYPE: &str = "cosmos-sdk/MsgSend";

const CANONICAL_TAG: &str = "typeUrl";
const LEGACY_TAG: &str = "type";
const VALUE_KEY: &str = "value";

const SENDER_KEYS: [&str; 2] = ["fromAddress", "from_address"];
const RECIPIENT_KEYS: [&str; 2] = ["toAddress", "to_address"];
const AMOUNT_KEYS: [&str; 1] = ["amount"];

/// Body of a bank send instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgSend {
    pub from_address: String,
    pub to_address: String,
    pub amount: Vec<Coin>,
}

/// Canonical tagged message consumed by broadcasters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    #[serde(rename = "typeUrl")]
    pub type_url: String,
    pub value: MsgSend,
}

impl CanonicalMessage {
    pub fn msg_send(value: MsgSend) -> Self {
        Self {
            type_url: MSG_SEND_TYPE_URL.to_string(),
            value,
        }
    }
}

/// Legacy-tagged body with snake_case fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AminoMsgSend {
    pub from_address: String,
    pub to_address: String,
    pub amount: Vec<Coin>,
}

/// Legacy-tagged message, used for display and legacy REST encodings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AminoMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub value: AminoMsgSend,
}

impl From<&CanonicalMessage> for AminoMessage {
    fn from(msg: &CanonicalMessage) -> Self {
        Self {
            msg_type: MSG_SEND_AMINO_TYPE.to_string(),
            value: AminoMsgSend {
                from_address: msg.value.from_address.clone(),
                to_address: msg.value.to_address.clone(),
                amount: msg.value.amount.clone(),
            },
        }
    }
}

/// Why a single message was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("unsupported message type `{0}`")]
    UnsupportedType(String),

    #[error("message shape is not recognized")]
    Unrecognized,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unexpected field `{0}`")]
    UnexpectedField(String),

    #[error("field `{0}` is given under more than one name")]
    AmbiguousField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Recognized input shapes, in priority order. Each holds the body whose
/// fields must be exactly sender, recipient and amount list.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletMessage {
    CanonicalTagged(Map<String, Value>),
    LegacyTagged(Map<String, Value>),
    Untagged(Map<String, Value>),
}

impl WalletMessage {
    /// Classify a raw wallet message.
    pub fn classify(raw: &Value) -> Result<Self, MessageError> {
        let object = raw.as_object().ok_or(MessageError::NotAnObject)?;

        if let Some(tag) = object.get(CANONICAL_TAG) {
            expect_tag(tag, MSG_SEND_TYPE_URL)?;
            return nested_value(object, CANONICAL_TAG).map(WalletMessage::CanonicalTagged);
        }

        if let Some(tag) = object.get(LEGACY_TAG) {
            expect_tag(tag, MSG_SEND_AMINO_TYPE)?;
            if object.contains_key(VALUE_KEY) {
                return nested_value(object, LEGACY_TAG).map(WalletMessage::LegacyTagged);
            }
            let mut flattened = object.clone();
            flattened.remove(LEGACY_TAG);
            return Ok(WalletMessage::LegacyTagged(flattened));
        }

        let has_all = [&SENDER_KEYS[..], &RECIPIENT_KEYS[..], &AMOUNT_KEYS[..]]
            .iter()
            .all(|aliases| aliases.iter().any(|key| object.contains_key(*key)));
        if has_all {
            Ok(WalletMessage::Untagged(object.clone()))
        } else {
            Err(MessageError::Unrecognized)
        }
    }

    /// Convert to the canonical form, validating the field set.
    pub fn into_canonical(self) -> Result<CanonicalMessage, MessageError> {
        let body = match self {
            WalletMessage::CanonicalTagged(body)
            | WalletMessage::LegacyTagged(body)
            | WalletMessage::Untagged(body) => body,
        };

        if let Some(extra) = body.keys().find(|key| {
            !SENDER_KEYS.contains(&key.as_str())
                && !RECIPIENT_KEYS.contains(&key.as_str())
                && !AMOUNT_KEYS.contains(&key.as_str())
        }) {
            return Err(MessageError::UnexpectedField(extra.clone()));
        }

        let from_address = address_field(&body, &SENDER_KEYS, "sender")?;
        let to_address = address_field(&body, &RECIPIENT_KEYS, "recipient")?;
        let amount = amount_field(&body)?;

        Ok(CanonicalMessage::msg_send(MsgSend {
            from_address,
            to_address,
            amount,
        }))
    }
}

/// Translate a batch, preserving order and dropping untranslatable messages.
pub fn translate_messages(raw: &[Value]) -> Result<Vec<CanonicalMessage>, CoordinatorError> {
    let translated: Vec<CanonicalMessage> = raw
        .iter()
        .enumerate()
        .filter_map(|(index, msg)| {
            match WalletMessage::classify(msg).and_then(WalletMessage::into_canonical) {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    warn!(index, error = %e, "Dropping untranslatable message");
                    None
                }
            }
        })
        .collect();

    if translated.is_empty() {
        return Err(CoordinatorError::NoValidMessages {
            submitted: raw.len(),
        });
    }
    Ok(translated)
}

fn expect_tag(tag: &Value, expected: &str) -> Result<(), MessageError> {
    match tag.as_str() {
        Some(value) if value == expected => Ok(()),
        Some(value) => Err(MessageError::UnsupportedType(value.to_string())),
        None => Err(MessageError::UnsupportedType(tag.to_string())),
    }
}

fn nested_value(
    object: &Map<String, Value>,
    tag_key: &str,
) -> Result<Map<String, Value>, MessageError> {
    if let Some(extra) = object.keys().find(|key| *key != tag_key && *key != VALUE_KEY) {
        return Err(MessageError::UnexpectedField(extra.clone()));
    }
    match object.get(VALUE_KEY) {
        Some(Value::Object(value)) => Ok(value.clone()),
        Some(_) => Err(MessageError::InvalidField {
            field: "value",
            reason: "expected an object".to_string(),
        }),
        None => Err(MessageError::MissingField("value")),
    }
}

/// The value of a field given under exactly one of its aliases.
fn lookup<'a>(
    body: &'a Map<String, Value>,
    aliases: &[&str],
    field: &'static str,
) -> Result<&'a Value, MessageError> {
    let mut present = aliases.iter().filter_map(|key| body.get(*key));
    let value = present.next().ok_or(MessageError::MissingField(field))?;
    if present.next().is_some() {
        return Err(MessageError::AmbiguousField(field));
    }
    Ok(value)
}

fn address_field(
    body: &Map<String, Value>,
    aliases: &[&str],
    field: &'static str,
) -> Result<String, MessageError> {
    let value = lookup(body, aliases, field)?;
    match value.as_str().map(str::trim) {
        Some(address) if !address.is_empty() => Ok(address.to_string()),
        _ => Err(MessageError::InvalidField {
            field,
            reason: "expected a non-empty address string".to_string(),
        }),
    }
}

fn amount_field(body: &Map<String, Value>) -> Result<Vec<Coin>, MessageError> {
    let value = lookup(body, &AMOUNT_KEYS, "amount")?;
    let coins: Vec<Coin> =
        serde_json::from_value(value.clone()).map_err(|e| MessageError::InvalidField {
            field: "amount",
            reason: e.to_string(),
        })?;

    if coins.is_empty() {
        return Err(MessageError::InvalidField {
            field: "amount",
            reason: "no coins".to_string(),
        });
    }
    for coin in &coins {
        if coin.denom.trim().is_empty() {
            return Err(MessageError::InvalidField {
                field: "amount",
                reason: "empty denomination".to_string(),
            });
        }
        if coin.amount.parse::<u128>().is_err() {
            return Err(MessageError::InvalidField {
                field: "amount",
                reason: format!("`{}` is not an integer amount", coin.amount),
            });
        }
    }
    Ok(coins)
}
