// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for bearer sessions.
//!
//! Use the `Session` extractor in handlers that mutate or read an account on
//! behalf of its owner:
//!
//! ```rust,ignore
//! async fn my_handler(Session(principal): Session) -> impl IntoResponse {
//!     // principal is the provider-resolved identity
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, Principal, ProviderError};
use crate::state::AppState;

/// Extractor for the authenticated principal behind a bearer token.
///
/// Rejects with 401 when the header is absent or malformed, or when the
/// provider does not accept the token.
pub struct Session(pub Principal);

impl FromRequestParts<AppState> for Session {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let principal = state.auth.resolve_session(token).await.map_err(|e| match e {
            ProviderError::Rejected(reason) => {
                tracing::debug!(%reason, "Session rejected by auth provider");
                AuthError::InvalidSession
            }
            other => AuthError::ProviderUnavailable(other.to_string()),
        })?;

        Ok(Session(principal))
    }
}
