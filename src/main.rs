// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use waitlist_rust_server::{
    api::router,
    auth::GoTrueClient,
    config::{AppConfig, LogFormat},
    ratelimit::{MemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore},
    state::AppState,
    storage::AccountRegistry,
    validation::{DomainValidator, HickoryMxResolver},
};

/// In-flight requests get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    init_logging(config.log_format);

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Process-wide collaborators, built once and shared through AppState
    let registry_path = config.registry_path();
    let registry = AccountRegistry::open(&registry_path).expect("Failed to open registry database");
    info!(path = %registry_path.display(), "Identity registry opened");

    let auth = GoTrueClient::new(&config.auth).expect("Failed to build auth provider client");
    let domains = DomainValidator::new(
        Arc::new(HickoryMxResolver::from_system_conf()),
        config.dns_timeout,
    );

    let shutdown = CancellationToken::new();
    let (counters, sweeper) = match config.redis_url.as_deref() {
        Some(url) => {
            let store = RedisRateLimitStore::connect(url)
                .await
                .expect("Failed to connect to rate-limit store");
            info!("Rate-limit counters shared through Redis");
            (Arc::new(store) as Arc<dyn RateLimitStore>, None)
        }
        None => {
            let store = Arc::new(MemoryRateLimitStore::new());
            let sweeper = store.spawn_sweeper(config.rate_limit.window, shutdown.clone());
            info!("Rate-limit counters held in process");
            (store as Arc<dyn RateLimitStore>, Some(sweeper))
        }
    };
    let limiter = RateLimiter::new(counters, config.rate_limit);

    let addr = config.bind_addr;
    let tls = config.tls.clone();
    info!(
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window.as_secs(),
        local_sessions = config.auth.jwt_secret.is_some(),
        "Configuration loaded"
    );

    let state = AppState::new(registry, Arc::new(auth), domains, limiter, config);
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    tokio::spawn(watch_signals(handle.clone(), shutdown.clone()));

    let served = match tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .expect("Failed to load TLS certificate and key");
            info!(%addr, "Waitlist server listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
        }
        None => {
            info!(%addr, "Waitlist server listening on http (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await
        }
    };

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    if let Err(e) = served {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    info!("Waitlist server stopped");
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init(),
    }
}

/// Wait for Ctrl-C or SIGTERM, then drain connections and stop background tasks.
async fn watch_signals(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
