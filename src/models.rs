// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. Field names follow the
//! JSON contract the front-end already speaks (`referredBy`, `refCode`,
//! `walletAddress`, `wallet_address`), so several structs carry explicit
//! serde renames.
//!
//! ## Wallet Address Type
//!
//! [`WalletAddress`] only exists in validated, lowercase form. Anything that
//! holds one has already passed the `0x` + 40 hex digits check.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Wallet Address Type
// =============================================================================

/// Length of an EVM address including the `0x` prefix.
const WALLET_ADDRESS_LEN: usize = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WalletAddressError {
    #[error("Wallet address is required")]
    Missing,
    #[error("Invalid wallet address format")]
    Malformed,
}

/// Normalized (lowercase) EVM wallet address.
///
/// Stored as an opaque identifier; nothing in this service talks to a chain.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[schema(value_type = String, example = "0xabcdef0123456789abcdef0123456789abcdef01")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Validate `0x` + 40 hex digits and normalize to lowercase.
    pub fn parse(raw: &str) -> Result<Self, WalletAddressError> {
        if raw.is_empty() {
            return Err(WalletAddressError::Missing);
        }
        let hex = raw
            .strip_prefix("0x")
            .ok_or(WalletAddressError::Malformed)?;
        if raw.len() != WALLET_ADDRESS_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletAddressError::Malformed);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Body of `POST /api/waitlist`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Email address to put on the waitlist.
    #[serde(default)]
    pub email: Option<String>,
    /// Referral code of the account that referred this signup.
    #[serde(default, rename = "referredBy", skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
}

/// Successful registration or resend.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    /// The account's referral code; unchanged across resends.
    #[serde(rename = "refCode")]
    pub ref_code: String,
}

// =============================================================================
// Session verification
// =============================================================================

/// Body of `POST /api/auth/verify-user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VerifyUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

/// Generic `{success, message}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

// =============================================================================
// Wallet linking
// =============================================================================

/// Body of `POST /api/update-wallet`.
///
/// `email` and `userId` are optional; when supplied they must name the
/// session's own identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LinkWalletRequest {
    #[serde(default, rename = "walletAddress")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LinkWalletResponse {
    pub success: bool,
    pub message: String,
    pub wallet_address: String,
}

/// Response of `GET /api/update-wallet`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WalletLookupResponse {
    pub success: bool,
    pub wallet_address: Option<String>,
}
