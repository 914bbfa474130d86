// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Multi-Signature Transaction Coordinator
//!
//! Collects owner, contributor and validator signatures for a
//! content-anchored Cosmos-SDK transaction and broadcasts it exactly once
//! when the signature set completes.
//!
//! ## Modules
//!
//! - `blockchain` - memo binding, message translation, broadcast
//! - `signing` - per-transaction locking and the signing coordinator
//! - `storage` - durable records and audit trail (redb)
//! - `broadcast_poller` - background retry of failed broadcasts

pub mod blockchain;
pub mod broadcast_poller;
pub mod config;
pub mod error;
pub mod models;
pub mod signing;
pub mod storage;
