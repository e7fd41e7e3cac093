// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email sanitization and shape checks.

/// RFC 5321 forward-path limit.
const MAX_EMAIL_LEN: usize = 254;

/// Referrer codes longer than this are dropped rather than stored.
const MAX_REFERRER_LEN: usize = 64;

/// Characters removed from user-supplied text before any other processing.
/// Apostrophes and quotes are legal in local parts and are left alone.
const MARKUP_CHARS: &[char] = &['<', '>', '`', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    #[error("Email is required")]
    Missing,
    #[error("Please enter a valid email address")]
    Malformed,
}

/// An email that passed sanitization and the shape check, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEmail {
    canonical: String,
    at: usize,
}

impl ValidEmail {
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn domain(&self) -> &str {
        &self.canonical[self.at + 1..]
    }

}

impl std::fmt::Display for ValidEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Strip markup characters and control characters, then trim.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !MARKUP_CHARS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Registry key form of an email: trimmed and lowercased.
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Sanitize, shape-check and canonicalize an email.
pub fn parse_email(raw: &str) -> Result<ValidEmail, EmailError> {
    let cleaned = sanitize(raw);
    if cleaned.is_empty() {
        return Err(EmailError::Missing);
    }
    let canonical = canonical_email(&cleaned);
    if canonical.len() > MAX_EMAIL_LEN || canonical.chars().any(char::is_whitespace) {
        return Err(EmailError::Malformed);
    }

    let (local, domain) = canonical.split_once('@').ok_or(EmailError::Malformed)?;
    if local.is_empty() || domain.contains('@') {
        return Err(EmailError::Malformed);
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(EmailError::Malformed);
    }

    let at = local.len();
    Ok(ValidEmail { canonical, at })
}

/// Best-effort referrer attribution: sanitized, never validated against
/// existing codes. Empty or oversized values are treated as absent.
pub fn sanitize_referrer(raw: Option<&str>) -> Option<String> {
    let cleaned = sanitize(raw?);
    if cleaned.is_empty() || cleaned.chars().count() > MAX_REFERRER_LEN {
        return None;
    }
    Some(cleaned)
}
