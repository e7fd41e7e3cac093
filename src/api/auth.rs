// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification endpoints.

use axum::{
    extract::{rejection::JsonRejection, RawQuery, State},
    response::Redirect,
    Json,
};

use crate::{
    auth::Session,
    error::ApiError,
    models::{SuccessResponse, VerifyUserRequest},
    services::verification,
    state::AppState,
};

/// Landing point of the emailed verification link.
///
/// Always redirects: to the site's verified page with `email` on success,
/// to its error page otherwise.
#[utoipa::path(
    get,
    path = "/api/auth/confirm",
    tag = "Verification",
    params(
        ("token_hash" = String, Query, description = "One-time proof from the emailed link"),
        ("type" = String, Query, description = "Proof type, e.g. `signup` or `magiclink`")
    ),
    responses(
        (status = 307, description = "Redirect to the verified or error page")
    )
)]
pub async fn confirm(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Redirect {
    let params: Vec<(String, String)> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .into_owned()
        .collect();
    let target = verification::confirm(&state, &params).await;
    Redirect::temporary(target.as_str())
}

/// Mark the caller's own account verified.
#[utoipa::path(
    post,
    path = "/api/auth/verify-user",
    tag = "Verification",
    security(("bearer" = [])),
    request_body = VerifyUserRequest,
    responses(
        (status = 200, description = "Account verified", body = SuccessResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Body names another identity"),
        (status = 404, description = "No waitlist account for this identity")
    )
)]
pub async fn verify_user(
    State(state): State<AppState>,
    Session(principal): Session,
    body: Result<Json<VerifyUserRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    verification::verify_session(&state, &principal, &request)?;

    Ok(Json(SuccessResponse {
        success: true,
        message: "Security check passed. User verified.".to_string(),
    }))
}
