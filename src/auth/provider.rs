// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External auth provider.
//!
//! The service never issues or checks one-time tokens itself. It asks the
//! provider to email a challenge, to redeem a one-time proof, and to resolve
//! bearer sessions into a [`Principal`].
//!
//! [`GoTrueClient`] speaks the Supabase GoTrue REST API:
//!
//! | Operation                | Request                               |
//! |--------------------------|---------------------------------------|
//! | send email challenge     | `POST /auth/v1/otp?redirect_to=...`   |
//! | redeem one-time proof    | `POST /auth/v1/verify`                |
//! | resolve bearer session   | `GET /auth/v1/user`                   |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{LocalSessionVerifier, Principal};
use crate::config::AuthProviderConfig;

/// HTTP timeout for provider calls.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused the token, proof or request.
    #[error("rejected by auth provider: {0}")]
    Rejected(String),

    /// The provider could not be reached or failed on its side.
    #[error("auth provider request failed: {0}")]
    Transport(String),

    /// The provider answered with something we cannot use.
    #[error("auth provider response was invalid: {0}")]
    InvalidResponse(String),
}

/// Challenge types a one-time proof may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailOtpType {
    Signup,
    Invite,
    Magiclink,
    Recovery,
    EmailChange,
    Email,
}

impl EmailOtpType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "signup" => Some(Self::Signup),
            "invite" => Some(Self::Invite),
            "magiclink" => Some(Self::Magiclink),
            "recovery" => Some(Self::Recovery),
            "email_change" => Some(Self::EmailChange),
            "email" => Some(Self::Email),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Invite => "invite",
            Self::Magiclink => "magiclink",
            Self::Recovery => "recovery",
            Self::EmailChange => "email_change",
            Self::Email => "email",
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Email a one-time verification link that lands on `redirect_to`.
    async fn send_email_challenge(&self, email: &str, redirect_to: &Url)
        -> Result<(), ProviderError>;

    /// Redeem a one-time proof for the principal it was issued to.
    async fn verify_one_time_proof(
        &self,
        token_hash: &str,
        kind: EmailOtpType,
    ) -> Result<Principal, ProviderError>;

    /// Resolve a bearer session token into its principal.
    async fn resolve_session(&self, token: &str) -> Result<Principal, ProviderError>;
}

// =============================================================================
// GoTrue client
// =============================================================================

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    user: Option<Principal>,
}

/// Supabase GoTrue client authenticated with the service key.
#[derive(Clone)]
pub struct GoTrueClient {
    base_url: String,
    service_key: String,
    local_sessions: Option<LocalSessionVerifier>,
    http: Client,
}

impl GoTrueClient {
    pub fn new(config: &AuthProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            local_sessions: config.jwt_secret.as_deref().map(LocalSessionVerifier::new),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.endpoint(path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

/// Map a non-success provider status onto the error taxonomy.
fn status_error(operation: &str, status: StatusCode, body: &str) -> ProviderError {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Rejected(format!("{operation} returned {status}: {body}"))
    } else {
        ProviderError::Transport(format!("{operation} returned {status}: {body}"))
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn send_email_challenge(
        &self,
        email: &str,
        redirect_to: &Url,
    ) -> Result<(), ProviderError> {
        let response = self
            .post("otp")
            .query(&[("redirect_to", redirect_to.as_str())])
            .json(&json!({ "email": email, "create_user": true }))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("POST otp failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("POST otp", status, &body));
        }
        Ok(())
    }

    async fn verify_one_time_proof(
        &self,
        token_hash: &str,
        kind: EmailOtpType,
    ) -> Result<Principal, ProviderError> {
        let response = self
            .post("verify")
            .json(&json!({ "type": kind.as_str(), "token_hash": token_hash }))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("POST verify failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("POST verify", status, &body));
        }

        let verified: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("POST verify invalid JSON: {e}")))?;

        verified
            .user
            .ok_or_else(|| ProviderError::InvalidResponse("verify response has no user".into()))
    }

    async fn resolve_session(&self, token: &str) -> Result<Principal, ProviderError> {
        if let Some(verifier) = &self.local_sessions {
            return verifier.verify(token);
        }

        let response = self
            .http
            .get(self.endpoint("user"))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("GET user failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("GET user", status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("GET user invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> AuthProviderConfig {
        AuthProviderConfig {
            base_url: Url::parse(base).unwrap(),
            service_key: "service-key".to_string(),
            jwt_secret: None,
        }
    }

    #[test]
    fn otp_types_parse_known_values_only() {
        for kind in ["signup", "invite", "magiclink", "recovery", "email_change", "email"] {
            let parsed = EmailOtpType::parse(kind).unwrap();
            assert_eq!(parsed.as_str(), kind);
        }
        assert_eq!(EmailOtpType::parse("sms"), None);
        assert_eq!(EmailOtpType::parse(""), None);
    }

    #[test]
    fn endpoints_ignore_trailing_slash() {
        let client = GoTrueClient::new(&config("https://project.supabase.co/")).unwrap();
        assert_eq!(
            client.endpoint("otp"),
            "https://project.supabase.co/auth/v1/otp"
        );
    }

    #[test]
    fn client_errors_are_rejections() {
        assert!(matches!(
            status_error("GET user", StatusCode::UNAUTHORIZED, ""),
            ProviderError::Rejected(_)
        ));
        assert!(matches!(
            status_error("POST verify", StatusCode::FORBIDDEN, "expired"),
            ProviderError::Rejected(_)
        ));
    }

    #[test]
    fn server_errors_and_throttling_are_transport_failures() {
        assert!(matches!(
            status_error("POST otp", StatusCode::BAD_GATEWAY, ""),
            ProviderError::Transport(_)
        ));
        assert!(matches!(
            status_error("POST otp", StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::Transport(_)
        ));
    }

    #[test]
    fn verify_response_reads_nested_user() {
        let body = r#"{"access_token":"t","user":{"id":"u-1","email":"a@example.com","role":"authenticated"}}"#;
        let parsed: VerifyResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.user, Some(Principal::new("u-1", "a@example.com")));
    }
}
