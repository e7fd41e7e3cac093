// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mail-exchange validation of email domains.
//!
//! A domain is accepted only if an MX lookup succeeds within the configured
//! timeout and returns at least one record. NXDOMAIN, empty answers,
//! resolver errors and timeouts all mean "invalid"; none of them are retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MxLookupError {
    #[error("no mail-exchange records")]
    NoRecords,
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("lookup timed out")]
    Timeout,
}

/// Source of MX records for a domain.
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Return the exchange host names published for `domain`.
    async fn mail_exchangers(&self, domain: &str) -> Result<Vec<String>, MxLookupError>;
}

/// MX resolver backed by hickory's tokio resolver.
///
/// Built once per process; the resolver keeps its own connection pool and
/// cache for the process lifetime.
pub struct HickoryMxResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryMxResolver {
    /// Use the system resolver configuration, falling back to the library
    /// defaults when it cannot be read (e.g. minimal containers).
    pub fn from_system_conf() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "System resolver configuration unavailable, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self { resolver }
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn mail_exchangers(&self, domain: &str) -> Result<Vec<String>, MxLookupError> {
        // Trailing dot keeps search domains from being appended.
        let fqdn = format!("{}.", domain.trim_end_matches('.'));
        let lookup = self
            .resolver
            .mx_lookup(fqdn.as_str())
            .await
            .map_err(|e| MxLookupError::Lookup(e.to_string()))?;

        let exchanges: Vec<String> = lookup.iter().map(|mx| mx.exchange().to_utf8()).collect();
        if exchanges.is_empty() {
            return Err(MxLookupError::NoRecords);
        }
        Ok(exchanges)
    }
}

/// Bounded-time domain check used by the registration workflow.
#[derive(Clone)]
pub struct DomainValidator {
    resolver: Arc<dyn MxResolver>,
    timeout: Duration,
}

impl DomainValidator {
    pub fn new(resolver: Arc<dyn MxResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Check that `domain` can receive mail.
    pub async fn check(&self, domain: &str) -> Result<(), MxLookupError> {
        let result = tokio::time::timeout(self.timeout, self.resolver.mail_exchangers(domain))
            .await
            .unwrap_or(Err(MxLookupError::Timeout));

        match result {
            Ok(exchanges) if !exchanges.is_empty() => {
                debug!(domain, records = exchanges.len(), "Domain has mail exchangers");
                Ok(())
            }
            Ok(_) => Err(MxLookupError::NoRecords),
            Err(e) => {
                debug!(domain, error = %e, "Domain failed mail-exchange check");
                Err(e)
            }
        }
    }

    /// `true` only if [`check`](Self::check) succeeds.
    pub async fn can_receive_mail(&self, domain: &str) -> bool {
        self.check(domain).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticMxResolver;

    struct HangingResolver;

    #[async_trait]
    impl MxResolver for HangingResolver {
        async fn mail_exchangers(&self, _domain: &str) -> Result<Vec<String>, MxLookupError> {
            std::future::pending().await
        }
    }

    struct EmptyResolver;

    #[async_trait]
    impl MxResolver for EmptyResolver {
        async fn mail_exchangers(&self, _domain: &str) -> Result<Vec<String>, MxLookupError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn domain_with_records_is_valid() {
        let validator = DomainValidator::new(
            Arc::new(StaticMxResolver::with_domains(&["example.com"])),
            Duration::from_secs(1),
        );
        assert!(validator.can_receive_mail("example.com").await);
        assert!(!validator.can_receive_mail("nomail.test").await);
    }

    #[tokio::test]
    async fn empty_answer_is_invalid() {
        let validator = DomainValidator::new(Arc::new(EmptyResolver), Duration::from_secs(1));
        assert_eq!(
            validator.check("example.com").await,
            Err(MxLookupError::NoRecords)
        );
    }

    #[tokio::test]
    async fn timeout_is_invalid() {
        let validator = DomainValidator::new(Arc::new(HangingResolver), Duration::from_millis(50));
        assert_eq!(validator.check("slow.example").await, Err(MxLookupError::Timeout));
    }
}
