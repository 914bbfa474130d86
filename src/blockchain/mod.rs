// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cosmos-SDK integration for the signing coordinator.
//!
//! This module provides functionality for:
//! - Encoding and decoding the memo binding a signature to a transaction
//! - Translating wallet message shapes into the canonical form
//! - Parsing wallet signed payloads
//! - Broadcasting assembled transactions

pub mod broadcaster;
pub mod memo;
pub mod messages;
pub mod types;

pub use broadcaster::{BroadcastError, BroadcastMode, ChainBroadcaster, RestBroadcaster};
pub use memo::{decode_memo, encode_memo, DecodedMemo, MemoError};
pub use messages::{
    translate_messages, AminoMessage, CanonicalMessage, MessageError, MsgSend, WalletMessage,
    MSG_SEND_AMINO_TYPE, MSG_SEND_TYPE_URL,
};
pub use types::*;
