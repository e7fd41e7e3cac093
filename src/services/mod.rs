// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account workflows. Handlers in `api` parse the request, call one of these
//! and shape the response.

pub mod registration;
pub mod verification;
pub mod wallet_link;

pub use registration::{callback_url, generate_referral_code, register, RegistrationOutcome};
pub use verification::{confirm, verify_session};
pub use wallet_link::{link_wallet, linked_wallet};
