// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local verification of provider-issued session tokens.
//!
//! When the provider's JWT signing secret is configured, bearer sessions are
//! checked here (HS256, audience `authenticated`) instead of round-tripping
//! to `GET /auth/v1/user`.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::{Principal, ProviderError};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Audience the provider stamps on end-user sessions.
const SESSION_AUDIENCE: &str = "authenticated";

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// HS256 verifier for session tokens.
#[derive(Clone)]
pub struct LocalSessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl LocalSessionVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_audience(&[SESSION_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify signature, expiry and audience, then extract the principal.
    pub fn verify(&self, token: &str) -> Result<Principal, ProviderError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidSignature => "invalid signature",
                ErrorKind::InvalidAudience => "invalid audience",
                ErrorKind::ImmatureSignature => "token not yet valid",
                _ => "malformed token",
            };
            ProviderError::Rejected(reason.to_string())
        })?;

        if data.claims.sub.is_empty() {
            return Err(ProviderError::Rejected("token has no subject".to_string()));
        }
        Ok(Principal {
            id: data.claims.sub,
            email: data.claims.email,
        })
    }
}
