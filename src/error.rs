// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Handler-facing error type.
//!
//! Every failure leaves the service as `{"error": ..., "error_code": ...}`
//! with a stable code. Server-side failures (`Upstream`, `Storage`) are
//! logged with their detail here and rendered with a generic message.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    auth::AuthError,
    models::WalletAddressError,
    storage::RegistryError,
    validation::EmailError,
};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Email domain publishes no mail exchangers.
    #[error("Email domain cannot receive mail")]
    DomainInvalid,

    /// Admission guard rejected the request. `reset` is epoch milliseconds.
    #[error("Too many requests. Please wait 1 minute.")]
    RateLimited { limit: u32, remaining: u32, reset: u64 },

    /// Registration for an email that is already verified.
    #[error("This email is already verified!")]
    AlreadyVerified { ref_code: String },

    #[error("This wallet is already linked to another account")]
    WalletTaken,

    /// Session missing, invalid, or identity mismatch.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Mutation target absent or ineligible.
    #[error("{0}")]
    NotFound(String),

    /// Auth provider or other dependency failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Registry read/write failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(rename = "refCode", skip_serializing_if = "Option::is_none")]
    ref_code: Option<String>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::DomainInvalid => "invalid_email_domain",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::AlreadyVerified { .. } => "already_verified",
            ApiError::WalletTaken => "wallet_taken",
            ApiError::Auth(e) => e.error_code(),
            ApiError::NotFound(_) => "not_found",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::DomainInvalid => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::AlreadyVerified { .. } | ApiError::WalletTaken => StatusCode::CONFLICT,
            ApiError::Auth(e) => e.status_code(),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller.
    fn public_message(&self) -> String {
        match self {
            ApiError::Upstream(_) => "Service temporarily unavailable, please try again".to_string(),
            ApiError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::WalletTaken => ApiError::WalletTaken,
            RegistryError::NotEligible(_) => {
                ApiError::not_found("User not found or not verified in waitlist")
            }
            RegistryError::NotFound(_) => ApiError::not_found("User not found in waitlist"),
            other => ApiError::Storage(other.to_string()),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(e: EmailError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<WalletAddressError> for ApiError {
    fn from(e: WalletAddressError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Auth(auth) = self {
            return auth.into_response();
        }

        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_code = self.error_code(), error = %self, "Request failed");
        }

        let body = Json(ErrorBody {
            error: self.public_message(),
            error_code: self.error_code(),
            ref_code: match &self {
                ApiError::AlreadyVerified { ref_code } => Some(ref_code.clone()),
                _ => None,
            },
        });
        let mut response = (status, body).into_response();

        if let ApiError::RateLimited {
            limit,
            remaining,
            reset,
        } = self
        {
            let headers = response.headers_mut();
            for (name, value) in [
                (RATE_LIMIT_LIMIT_HEADER, u64::from(limit)),
                (RATE_LIMIT_REMAINING_HEADER, u64::from(remaining)),
                (RATE_LIMIT_RESET_HEADER, reset),
            ] {
                headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
            }
        }
        response
    }
}
