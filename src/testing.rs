// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use url::Url;

use crate::auth::{AuthProvider, EmailOtpType, Principal, ProviderError};
use crate::config::{AppConfig, AUTH_SERVICE_KEY_ENV, AUTH_URL_ENV, DATA_DIR_ENV, SITE_URL_ENV};
use crate::ratelimit::{MemoryRateLimitStore, RateLimiter};
use crate::state::AppState;
use crate::storage::AccountRegistry;
use crate::validation::{DomainValidator, MxLookupError, MxResolver};

/// Registry in a fresh temporary directory. Keep the `TempDir` alive.
pub fn temp_registry() -> (AccountRegistry, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let registry =
        AccountRegistry::open(&dir.path().join("waitlist.redb")).expect("Failed to open registry");
    (registry, dir)
}

/// Resolver that knows a fixed set of mail domains.
pub struct StaticMxResolver {
    domains: HashSet<String>,
}

impl StaticMxResolver {
    pub fn with_domains(domains: &[&str]) -> Self {
        Self {
            domains: domains.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[async_trait]
impl MxResolver for StaticMxResolver {
    async fn mail_exchangers(&self, domain: &str) -> Result<Vec<String>, MxLookupError> {
        if self.domains.contains(domain) {
            Ok(vec![format!("mx.{domain}")])
        } else {
            Err(MxLookupError::Lookup(format!("NXDOMAIN {domain}")))
        }
    }
}

/// Scripted auth provider.
///
/// Proofs stay redeemable so repeated confirmation can be exercised.
#[derive(Default)]
pub struct FakeAuthProvider {
    sessions: Mutex<HashMap<String, Principal>>,
    proofs: Mutex<HashMap<String, Principal>>,
    challenges: Mutex<Vec<(String, Url)>>,
    transport_down: AtomicBool,
}

impl FakeAuthProvider {
    pub fn add_session(&self, token: &str, principal: Principal) {
        self.sessions.lock().unwrap().insert(token.to_string(), principal);
    }

    pub fn add_proof(&self, token_hash: &str, principal: Principal) {
        self.proofs.lock().unwrap().insert(token_hash.to_string(), principal);
    }

    /// Every challenge sent so far, as `(email, redirect_to)`.
    pub fn challenges(&self) -> Vec<(String, Url)> {
        self.challenges.lock().unwrap().clone()
    }

    pub fn fail_transport(&self, down: bool) {
        self.transport_down.store(down, Ordering::SeqCst);
    }

    fn check_transport(&self) -> Result<(), ProviderError> {
        if self.transport_down.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn send_email_challenge(
        &self,
        email: &str,
        redirect_to: &Url,
    ) -> Result<(), ProviderError> {
        self.check_transport()?;
        self.challenges
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.clone()));
        Ok(())
    }

    async fn verify_one_time_proof(
        &self,
        token_hash: &str,
        _kind: EmailOtpType,
    ) -> Result<Principal, ProviderError> {
        self.check_transport()?;
        self.proofs
            .lock()
            .unwrap()
            .get(token_hash)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("invalid or expired token".to_string()))
    }

    async fn resolve_session(&self, token: &str) -> Result<Principal, ProviderError> {
        self.check_transport()?;
        self.sessions
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("invalid JWT".to_string()))
    }
}

/// Fully wired state over fakes, with `example.com` as the only mail domain
/// and `https://site.example` as the site.
pub struct TestHarness {
    pub state: AppState,
    pub auth: Arc<FakeAuthProvider>,
    _dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = dir.path().to_string_lossy().to_string();

        let vars: HashMap<String, String> = [
            (AUTH_URL_ENV, "https://auth.example"),
            (AUTH_SERVICE_KEY_ENV, "service-key"),
            (SITE_URL_ENV, "https://site.example"),
            (DATA_DIR_ENV, data_dir.as_str()),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = AppConfig::from_lookup(|name| vars.get(name).cloned())
            .expect("Failed to build test config");

        let registry = AccountRegistry::open(&config.registry_path()).expect("Failed to open registry");
        let auth = Arc::new(FakeAuthProvider::default());
        let domains = DomainValidator::new(
            Arc::new(StaticMxResolver::with_domains(&["example.com"])),
            Duration::from_secs(1),
        );
        let limiter = RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), config.rate_limit);

        let state = AppState::new(registry, auth.clone(), domains, limiter, config);
        Self {
            state,
            auth,
            _dir: dir,
        }
    }
}
