// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state of the waitlist: the identity registry.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   waitlist.redb     # accounts, referral-code index, wallet-owner index
//! ```
//!
//! The registry is the source of truth for account state and the
//! concurrency boundary for every account mutation; the unique indexes are
//! what keep emails, referral codes and wallets from being claimed twice.

pub mod registry;

pub use registry::{
    Account, AccountRegistry, AccountState, NewAccount, RegistryError, RegistryResult,
    Verification,
};
