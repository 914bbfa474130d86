// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signature collection and broadcast orchestration.
//!
//! - `guard` - per-transaction mutual exclusion
//! - `coordinator` - validation, state transitions and broadcast

pub mod coordinator;
pub mod guard;

pub use coordinator::{CoordinatorSettings, SigningCoordinator};
pub use guard::{ConcurrencyGuard, DEFAULT_LOCK_TIMEOUT};
