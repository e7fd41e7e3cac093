// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Waitlist Server - Registration, Verification & Wallet Linking
//!
//! Public waitlist backend: users register an email, confirm it through a
//! one-time link issued by an external auth provider, collect referral
//! credit and may link one wallet address to their verified account.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - External auth provider client and session guard
//! - `ratelimit` - Per-IP sliding-window admission guard
//! - `services` - Registration, verification and wallet-linking workflows
//! - `storage` - Identity registry (redb)
//! - `validation` - Email shape and mail-exchange checks

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod services;
pub mod state;
pub mod storage;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;
