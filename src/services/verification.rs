// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification handler.
//!
//! Two ways into the verified state, both ending in the same idempotent
//! registry write ([`AccountRegistry::mark_verified`]):
//!
//! - the emailed one-time link (`confirm`), which always answers with a
//!   redirect to the site's success or failure page;
//! - an authenticated session asking to verify its own account
//!   (`verify_session`), after the identity-match guard.
//!
//! [`AccountRegistry::mark_verified`]: crate::storage::AccountRegistry::mark_verified

use chrono::Utc;
use tracing::{error, info, warn};
use url::Url;

use crate::auth::{EmailOtpType, IdentityClaim, Principal};
use crate::config::SiteConfig;
use crate::error::ApiError;
use crate::models::VerifyUserRequest;
use crate::state::AppState;
use crate::storage::{RegistryError, Verification};

const TOKEN_HASH_PARAM: &str = "token_hash";
const TYPE_PARAM: &str = "type";
const EMAIL_PARAM: &str = "email";

/// Redeem a one-time proof and pick the redirect target.
///
/// `params` is the full query string of the confirmation link. Anything
/// other than the proof parameters is carried onto the success URL.
pub async fn confirm(state: &AppState, params: &[(String, String)]) -> Url {
    let site = &state.config.site;

    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    };
    let (Some(token_hash), Some(raw_type)) = (param(TOKEN_HASH_PARAM), param(TYPE_PARAM)) else {
        debug_failure("missing proof parameters");
        return failure_url(site);
    };
    let Some(kind) = EmailOtpType::parse(raw_type) else {
        debug_failure("unknown proof type");
        return failure_url(site);
    };

    let principal = match state.auth.verify_one_time_proof(token_hash, kind).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, otp_type = kind.as_str(), "One-time proof not accepted");
            return failure_url(site);
        }
    };
    let Ok(email) = principal.canonical_email() else {
        warn!(user_id = %principal.id, "Verified principal carries no email");
        return failure_url(site);
    };

    match state.registry.mark_verified(&email, &principal.id, Utc::now()) {
        Ok(verification) => {
            info!(
                email = %email,
                user_id = %principal.id,
                first_time = matches!(verification, Verification::Applied(_)),
                "Account verified via one-time link"
            );
            success_url(site, params, &email)
        }
        Err(RegistryError::NotFound(_)) => {
            warn!(email = %email, "Verified principal has no waitlist account");
            failure_url(site)
        }
        Err(e) => {
            error!(email = %email, error = %e, "Failed to record verification");
            failure_url(site)
        }
    }
}

/// Verify the caller's own account from an authenticated session.
///
/// Both `email` and `userId` must be present and name the session's
/// identity.
pub fn verify_session(
    state: &AppState,
    principal: &Principal,
    request: &VerifyUserRequest,
) -> Result<Verification, ApiError> {
    let claim = IdentityClaim {
        email: request.email.as_deref(),
        user_id: request.user_id.as_deref(),
    };
    if let Err(e) = principal.ensure_matches_fully(claim) {
        warn!(
            user_id = %principal.id,
            claimed_email = ?claim.email,
            claimed_user_id = ?claim.user_id,
            "Rejected verification for another identity"
        );
        return Err(e.into());
    }

    let email = principal.canonical_email()?;
    let verification = state
        .registry
        .mark_verified(&email, &principal.id, Utc::now())?;
    info!(
        email = %email,
        user_id = %principal.id,
        first_time = matches!(verification, Verification::Applied(_)),
        "Account verified via session"
    );
    Ok(verification)
}

fn debug_failure(reason: &str) {
    tracing::debug!(reason, "Confirmation link rejected");
}

fn page(site: &SiteConfig, path: &str) -> Url {
    let mut url = site.base_url.clone();
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn failure_url(site: &SiteConfig) -> Url {
    page(site, &site.error_path)
}

fn success_url(site: &SiteConfig, params: &[(String, String)], email: &str) -> Url {
    let mut url = page(site, &site.verified_path);
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in params {
            if k != TOKEN_HASH_PARAM && k != TYPE_PARAM && k != EMAIL_PARAM {
                query.append_pair(k, v);
            }
        }
        query.append_pair(EMAIL_PARAM, email);
    }
    url
}
