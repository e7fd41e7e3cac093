// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Input validation run before any registry access.
//!
//! Order matters: [`email::sanitize`] strips markup, [`email::parse_email`]
//! checks the `local@domain.tld` shape and produces the canonical form, and
//! only then does [`domain::DomainValidator`] spend a DNS lookup.

pub mod domain;
pub mod email;

pub use domain::{DomainValidator, HickoryMxResolver, MxLookupError, MxResolver};
pub use email::{canonical_email, parse_email, sanitize, sanitize_referrer, EmailError, ValidEmail};
