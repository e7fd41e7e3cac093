// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registration workflow.
//!
//! Each submission lands in one of three branches, picked from the stored
//! state of the email:
//!
//! | Stored state | Action                                   | Result            |
//! |--------------|------------------------------------------|-------------------|
//! | absent       | create account, email a challenge        | `Created`         |
//! | unverified   | email a fresh challenge                  | `Resent`          |
//! | verified     | nothing                                  | 409 with refCode  |
//!
//! Input is sanitized, shape-checked and domain-checked before the registry
//! is consulted, so rejected input never leaves a row behind.

use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::error::ApiError;
use crate::models::RegisterRequest;
use crate::state::AppState;
use crate::storage::{Account, AccountState, NewAccount, RegistryError};
use crate::validation::{parse_email, sanitize_referrer, ValidEmail};

/// Prefix of every referral code.
pub const REFERRAL_CODE_PREFIX: &str = "BR";

/// Random bytes behind each code (8 hex characters).
const REFERRAL_CODE_BYTES: usize = 4;

/// Fresh codes tried before giving up on a unique-constraint collision.
const REFERRAL_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// New account; first challenge sent.
    Created(Account),
    /// Existing unverified account; challenge sent again.
    Resent(Account),
}

impl RegistrationOutcome {
    pub fn account(&self) -> &Account {
        match self {
            RegistrationOutcome::Created(a) | RegistrationOutcome::Resent(a) => a,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RegistrationOutcome::Created(_) => "Check your email for verification link!",
            RegistrationOutcome::Resent(_) => "Verification email resent!",
        }
    }
}

/// `BR` followed by 8 uppercase hex characters.
pub fn generate_referral_code(rng: &dyn SecureRandom) -> Result<String, ApiError> {
    let mut bytes = [0u8; REFERRAL_CODE_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| ApiError::Storage("system random source unavailable".to_string()))?;
    let suffix: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    Ok(format!("{REFERRAL_CODE_PREFIX}{suffix}"))
}

/// Where the emailed link should send the user once verified.
///
/// The request's `Origin` is used when it is an http(s) origin and, if an
/// allow-list is configured, on it; otherwise the configured site URL.
pub fn callback_url(site: &SiteConfig, origin: Option<&str>) -> Url {
    let mut url = origin
        .and_then(|raw| accepted_origin(site, raw))
        .unwrap_or_else(|| site.base_url.clone());
    url.set_path(&site.verified_path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn accepted_origin(site: &SiteConfig, raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    let origin = parsed.origin().ascii_serialization();
    if !site.allowed_origins.is_empty()
        && !site
            .allowed_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(&origin))
    {
        return None;
    }
    Url::parse(&origin).ok()
}

/// Run one registration submission to completion.
pub async fn register(
    state: &AppState,
    request: RegisterRequest,
    origin: Option<&str>,
) -> Result<RegistrationOutcome, ApiError> {
    let email = parse_email(request.email.as_deref().unwrap_or_default())?;
    let referred_by = sanitize_referrer(request.referred_by.as_deref());

    if !state.domains.can_receive_mail(email.domain()).await {
        info!(domain = email.domain(), "Registration rejected: domain has no mail exchangers");
        return Err(ApiError::DomainInvalid);
    }

    let callback = callback_url(&state.config.site, origin);

    let outcome = match state.registry.state(email.as_str())? {
        AccountState::Verified(account) => {
            return Err(ApiError::AlreadyVerified {
                ref_code: account.referral_code,
            })
        }
        AccountState::Unverified(account) => RegistrationOutcome::Resent(account),
        AccountState::Absent => {
            let rng = SystemRandom::new();
            create_account(state, &email, referred_by, || generate_referral_code(&rng))?
        }
    };

    state
        .auth
        .send_email_challenge(email.as_str(), &callback)
        .await
        .map_err(|e| {
            // The account stays; a later resend can still deliver the link.
            warn!(email = %email, error = %e, "Verification challenge could not be sent");
            ApiError::Upstream(e.to_string())
        })?;

    info!(
        email = %email,
        created = matches!(outcome, RegistrationOutcome::Created(_)),
        callback = %callback,
        "Verification challenge sent"
    );
    Ok(outcome)
}

/// Insert a new account, drawing a fresh code from `next_code` after each
/// referral-code collision.
///
/// Losing a race to another first registration for the same email falls
/// back to whatever branch the winner's row now implies.
fn create_account(
    state: &AppState,
    email: &ValidEmail,
    referred_by: Option<String>,
    mut next_code: impl FnMut() -> Result<String, ApiError>,
) -> Result<RegistrationOutcome, ApiError> {
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let new = NewAccount {
            email: email.as_str().to_string(),
            referral_code: next_code()?,
            referred_by: referred_by.clone(),
        };
        match state.registry.create(new, Utc::now()) {
            Ok(account) => return Ok(RegistrationOutcome::Created(account)),
            Err(RegistryError::DuplicateReferralCode(code)) => {
                warn!(code = %code, "Referral code collision, retrying");
            }
            Err(RegistryError::DuplicateEmail(_)) => {
                return match state.registry.state(email.as_str())? {
                    AccountState::Verified(account) => Err(ApiError::AlreadyVerified {
                        ref_code: account.referral_code,
                    }),
                    AccountState::Unverified(account) => Ok(RegistrationOutcome::Resent(account)),
                    AccountState::Absent => Err(ApiError::Storage(format!(
                        "account for {email} vanished after duplicate insert"
                    ))),
                };
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Storage(format!(
        "no unique referral code after {REFERRAL_CODE_ATTEMPTS} attempts"
    )))
}
