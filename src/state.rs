// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::AppConfig;
use crate::ratelimit::RateLimiter;
use crate::storage::AccountRegistry;
use crate::validation::DomainValidator;

/// Process-wide handles shared by every request.
///
/// Each collaborator is built once in `main` and lives until shutdown;
/// cloning the state only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AccountRegistry>,
    pub auth: Arc<dyn AuthProvider>,
    pub domains: DomainValidator,
    pub limiter: RateLimiter,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        registry: AccountRegistry,
        auth: Arc<dyn AuthProvider>,
        domains: DomainValidator,
        limiter: RateLimiter,
        config: AppConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            auth,
            domains,
            limiter,
            config: Arc::new(config),
        }
    }
}
