// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet linking endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    auth::Session,
    error::ApiError,
    models::{LinkWalletRequest, LinkWalletResponse, WalletLookupResponse},
    services::wallet_link,
    state::AppState,
};

/// Link a wallet address to the caller's verified account.
#[utoipa::path(
    post,
    path = "/api/update-wallet",
    tag = "Wallet",
    security(("bearer" = [])),
    request_body = LinkWalletRequest,
    responses(
        (status = 200, description = "Wallet linked", body = LinkWalletResponse),
        (status = 400, description = "Missing or malformed address"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Body names another identity"),
        (status = 404, description = "Account missing or not verified"),
        (status = 409, description = "Wallet already linked to another account")
    )
)]
pub async fn link_wallet(
    State(state): State<AppState>,
    Session(principal): Session,
    body: Result<Json<LinkWalletRequest>, JsonRejection>,
) -> Result<Json<LinkWalletResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    let wallet = wallet_link::link_wallet(&state, &principal, &request)?;

    Ok(Json(LinkWalletResponse {
        success: true,
        message: "Wallet linked successfully".to_string(),
        wallet_address: wallet.into(),
    }))
}

/// Wallet linked to the caller's own account, if any.
#[utoipa::path(
    get,
    path = "/api/update-wallet",
    tag = "Wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current wallet or null", body = WalletLookupResponse),
        (status = 401, description = "Missing or invalid session")
    )
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Session(principal): Session,
) -> Result<Json<WalletLookupResponse>, ApiError> {
    let wallet_address = wallet_link::linked_wallet(&state, &principal)?;
    Ok(Json(WalletLookupResponse {
        success: true,
        wallet_address,
    }))
}
