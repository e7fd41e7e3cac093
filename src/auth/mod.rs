// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Identity is owned by an external auth provider (Supabase GoTrue). This
//! module consumes its contract; it never mints or checks one-time tokens.
//!
//! ## Auth Flow
//!
//! 1. Registration asks the provider to email a one-time link
//! 2. The link lands on `/api/auth/confirm?token_hash=...&type=...`; the
//!    provider redeems the proof and yields a [`Principal`]
//! 3. Later self-service calls send `Authorization: Bearer <session>`; the
//!    [`Session`] extractor resolves it to a [`Principal`], remotely or, when
//!    the signing secret is configured, locally
//! 4. Handlers compare any identity claimed in the body against the
//!    principal before touching the registry
//!
//! ## Security
//!
//! - Missing, malformed or rejected sessions are 401
//! - A claimed identity other than the session's own is 403
//! - Clock skew tolerance for local verification is 60 seconds

pub mod error;
pub mod extractor;
pub mod jwt;
pub mod principal;
pub mod provider;

pub use error::AuthError;
pub use extractor::Session;
pub use jwt::LocalSessionVerifier;
pub use principal::{IdentityClaim, Principal};
pub use provider::{AuthProvider, EmailOtpType, GoTrueClient, ProviderError};
