// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet linking workflow.
//!
//! Binds a normalized wallet address to the session's own verified account.
//! The address is an opaque identifier here; nothing touches a chain.

use tracing::{info, warn};

use crate::auth::{IdentityClaim, Principal};
use crate::error::ApiError;
use crate::models::{LinkWalletRequest, WalletAddress};
use crate::state::AppState;

/// Link the wallet in `request` to the principal's account.
///
/// Order: identity guard, address shape, then the registry's uniqueness
/// and eligibility checks in one transaction. Returns the stored address.
pub fn link_wallet(
    state: &AppState,
    principal: &Principal,
    request: &LinkWalletRequest,
) -> Result<WalletAddress, ApiError> {
    let claim = IdentityClaim {
        email: request.email.as_deref(),
        user_id: request.user_id.as_deref(),
    };
    if let Err(e) = principal.ensure_matches(claim) {
        warn!(user_id = %principal.id, "Rejected wallet link for another identity");
        return Err(e.into());
    }
    let email = principal.canonical_email()?;

    let wallet = WalletAddress::parse(request.wallet_address.as_deref().unwrap_or_default())?;

    match state.registry.link_wallet(&email, &wallet) {
        Ok(_) => {
            info!(email = %email, wallet = %wallet, "Wallet linked");
            Ok(wallet)
        }
        Err(e) => {
            warn!(email = %email, wallet = %wallet, error = %e, "Wallet link refused");
            Err(e.into())
        }
    }
}

/// Wallet currently linked to the principal's own account.
pub fn linked_wallet(state: &AppState, principal: &Principal) -> Result<Option<String>, ApiError> {
    let email = principal.canonical_email()?;
    Ok(state.registry.wallet_of(&email)?)
}
