// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rate-limit middleware for Axum.
//!
//! Attach with `route_layer` to the routes it protects only:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/waitlist", post(register))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), admission_guard))
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Address of the caller.
///
/// The first `X-Forwarded-For` hop is used only when the deployment sits
/// behind a trusted proxy; otherwise the socket peer. Without either the
/// loopback address stands in.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Reject callers over their per-IP budget before the handler runs.
pub async fn admission_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer, state.config.trust_forwarded_for);

    let decision = state.limiter.check(&format!("waitlist:{ip}")).await;
    if !decision.allowed {
        warn!(%ip, reset_ms = decision.reset_ms, "Registration rate limit exceeded");
        return ApiError::RateLimited {
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset_ms,
        }
        .into_response();
    }

    next.run(request).await
}
