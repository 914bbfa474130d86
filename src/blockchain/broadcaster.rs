// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain broadcaster boundary and its LCD REST implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::messages::AminoMessage;
use super::types::{AssembledTransaction, Fee, PubKey};

/// Failure reported by a broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    #[error("broadcast timed out")]
    Timeout,

    /// The endpoint could not be reached; nothing was submitted.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("chain rejected transaction with code {code}: {log}")]
    Rejected { code: u32, log: String },

    #[error("malformed broadcast response: {0}")]
    MalformedResponse(String),
}

impl BroadcastError {
    /// Stable name of the failure kind, stored with the failed attempt.
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastError::Timeout => "timeout",
            BroadcastError::Unreachable(_) => "unreachable",
            BroadcastError::Transport(_) => "transport",
            BroadcastError::Http { .. } => "http",
            BroadcastError::Rejected { .. } => "rejected",
            BroadcastError::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Whether the transaction may have reached the chain despite the
    /// error. Such attempts must never be resubmitted automatically.
    pub fn outcome_unknown(&self) -> bool {
        match self {
            BroadcastError::Unreachable(_) | BroadcastError::Rejected { .. } => false,
            BroadcastError::Http { status, .. } => *status >= 500,
            BroadcastError::Timeout
            | BroadcastError::Transport(_)
            | BroadcastError::MalformedResponse(_) => true,
        }
    }
}

/// Submits a fully signed transaction and returns its chain hash.
///
/// Retries, endpoint fail-over and wire encoding belong to implementations.
pub trait ChainBroadcaster: Send + Sync {
    fn broadcast(
        &self,
        tx: &AssembledTransaction,
    ) -> impl Future<Output = Result<String, BroadcastError>> + Send;
}

impl<T: ChainBroadcaster> ChainBroadcaster for Arc<T> {
    fn broadcast(
        &self,
        tx: &AssembledTransaction,
    ) -> impl Future<Output = Result<String, BroadcastError>> + Send {
        (**self).broadcast(tx)
    }
}

/// LCD broadcast mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    #[default]
    Sync,
    Async,
    Block,
}

impl BroadcastMode {
    pub fn parse(s: &str) -> Option<BroadcastMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Some(BroadcastMode::Sync),
            "async" => Some(BroadcastMode::Async),
            "block" => Some(BroadcastMode::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct LegacySignature<'a> {
    pub_key: &'a PubKey,
    signature: &'a str,
    account_number: &'a str,
    sequence: &'a str,
}

#[derive(Debug, Serialize)]
struct LegacyStdTx<'a> {
    msg: Vec<AminoMessage>,
    fee: &'a Fee,
    signatures: Vec<LegacySignature<'a>>,
    memo: &'a str,
}

#[derive(Debug, Serialize)]
struct LegacyBroadcastRequest<'a> {
    tx: LegacyStdTx<'a>,
    mode: BroadcastMode,
}

#[derive(Debug, Deserialize)]
struct LegacyBroadcastResponse {
    txhash: Option<String>,
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    raw_log: Option<String>,
}

fn legacy_request(tx: &AssembledTransaction, mode: BroadcastMode) -> LegacyBroadcastRequest<'_> {
    LegacyBroadcastRequest {
        tx: LegacyStdTx {
            msg: tx.msgs.iter().map(AminoMessage::from).collect(),
            fee: &tx.fee,
            signatures: tx
                .signatures
                .iter()
                .map(|sig| LegacySignature {
                    pub_key: &sig.pub_key,
                    signature: &sig.signature,
                    account_number: &sig.account_number,
                    sequence: &sig.sequence,
                })
                .collect(),
            memo: &tx.memo,
        },
        mode,
    }
}

fn interpret_response(body: &str) -> Result<String, BroadcastError> {
    let response: LegacyBroadcastResponse = serde_json::from_str(body)
        .map_err(|e| BroadcastError::MalformedResponse(e.to_string()))?;

    if let Some(code) = response.code.filter(|code| *code != 0) {
        return Err(BroadcastError::Rejected {
            code,
            log: response.raw_log.unwrap_or_default(),
        });
    }

    match response.txhash {
        Some(hash) if !hash.trim().is_empty() => Ok(hash),
        _ => Err(BroadcastError::MalformedResponse(
            "response has no txhash".to_string(),
        )),
    }
}

/// Broadcaster posting legacy StdTx JSON to an LCD `/txs` endpoint.
pub struct RestBroadcaster {
    client: reqwest::Client,
    endpoint: Url,
    mode: BroadcastMode,
}

impl RestBroadcaster {
    /// Create a broadcaster for the given LCD base URL.
    pub fn new(rest_url: &Url, mode: BroadcastMode, timeout: Duration) -> Result<Self, BroadcastError> {
        let endpoint = Url::parse(&format!("{}/txs", rest_url.as_str().trim_end_matches('/')))
            .map_err(|e| BroadcastError::Transport(format!("invalid endpoint: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BroadcastError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            mode,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ChainBroadcaster for RestBroadcaster {
    async fn broadcast(&self, tx: &AssembledTransaction) -> Result<String, BroadcastError> {
        let request = legacy_request(tx, self.mode);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BroadcastError::Timeout
                } else if e.is_connect() {
                    BroadcastError::Unreachable(e.to_string())
                } else {
                    BroadcastError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BroadcastError::Timeout
            } else {
                BroadcastError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(BroadcastError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let hash = interpret_response(&body)?;
        tracing::info!(
            transaction_id = %tx.transaction_id,
            chain_tx_hash = %hash,
            endpoint = %self.endpoint,
            "Transaction broadcast accepted"
        );
        Ok(hash)
    }
}
