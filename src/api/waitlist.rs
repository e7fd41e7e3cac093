// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Waitlist registration endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::ORIGIN, HeaderMap},
    Json,
};

use crate::{
    error::ApiError,
    models::{RegisterRequest, RegisterResponse},
    services::registration,
    state::AppState,
};

/// Join the waitlist, or resend the verification link.
///
/// Rate limited per client IP.
#[utoipa::path(
    post,
    path = "/api/waitlist",
    tag = "Waitlist",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Verification email sent or resent", body = RegisterResponse),
        (status = 400, description = "Invalid email or domain"),
        (status = 409, description = "Email already verified; body carries refCode"),
        (status = 429, description = "Too many requests from this IP"),
        (status = 500, description = "Verification email could not be sent")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::validation(e.body_text()))?;
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());

    let outcome = registration::register(&state, request, origin).await?;

    Ok(Json(RegisterResponse {
        success: true,
        message: outcome.message().to_string(),
        ref_code: outcome.account().referral_code.clone(),
    }))
}
