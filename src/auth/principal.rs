// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated principal and the identity-match guard.

use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::validation::canonical_email;

/// Identity resolved by the auth provider from a bearer session or a
/// one-time proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Provider's opaque user identifier.
    pub id: String,
    /// Email claim, when the provider supplies one.
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity a request body claims to act for.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityClaim<'a> {
    pub email: Option<&'a str>,
    pub user_id: Option<&'a str>,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
        }
    }

    /// Canonical email of the principal. Sessions without one are unusable.
    pub fn canonical_email(&self) -> Result<String, AuthError> {
        self.email
            .as_deref()
            .map(canonical_email)
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::InvalidSession)
    }

    /// Reject a claim naming anyone other than this principal.
    ///
    /// Each field the claim supplies must match: the email after
    /// canonicalization, the id exactly.
    pub fn ensure_matches(&self, claim: IdentityClaim<'_>) -> Result<(), AuthError> {
        if let Some(claimed_email) = claim.email {
            let own = self.canonical_email()?;
            // Case-insensitive on purpose: accounts are keyed by canonical
            // email, so a claim differing only in case or padding names the
            // same account the session owns.
            if canonical_email(claimed_email) != own {
                return Err(AuthError::IdentityMismatch);
            }
        }
        if let Some(claimed_id) = claim.user_id {
            if claimed_id != self.id {
                return Err(AuthError::IdentityMismatch);
            }
        }
        Ok(())
    }

    /// Like [`ensure_matches`](Self::ensure_matches) but both fields are
    /// mandatory; an absent field counts as a mismatch.
    pub fn ensure_matches_fully(&self, claim: IdentityClaim<'_>) -> Result<(), AuthError> {
        if claim.email.is_none() || claim.user_id.is_none() {
            return Err(AuthError::IdentityMismatch);
        }
        self.ensure_matches(claim)
    }
}
