// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::SiteConfig,
    models::{
        LinkWalletRequest, LinkWalletResponse, RegisterRequest, RegisterResponse,
        SuccessResponse, VerifyUserRequest, WalletLookupResponse,
    },
    ratelimit::admission_guard,
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod waitlist;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    // Only registration sits behind the admission guard.
    let rate_limited = Router::new()
        .route("/waitlist", post(waitlist::register))
        .route_layer(middleware::from_fn_with_state(state.clone(), admission_guard));

    let api_routes = Router::new()
        .merge(rate_limited)
        .route("/auth/confirm", get(auth::confirm))
        .route("/auth/verify-user", post(auth::verify_user))
        .route(
            "/update-wallet",
            get(wallet::get_wallet).post(wallet::link_wallet),
        );

    let cors = cors_layer(&state.config.site);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(
            // Path only: confirmation links carry one-time proofs in the query.
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Permissive without an allow-list, restricted to it otherwise.
fn cors_layer(site: &SiteConfig) -> CorsLayer {
    if site.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = site
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        waitlist::register,
        auth::confirm,
        auth::verify_user,
        wallet::link_wallet,
        wallet::get_wallet
    ),
    components(
        schemas(
            RegisterRequest,
            RegisterResponse,
            VerifyUserRequest,
            SuccessResponse,
            LinkWalletRequest,
            LinkWalletResponse,
            WalletLookupResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Waitlist", description = "Registration and verification email"),
        (name = "Verification", description = "One-time link and session verification"),
        (name = "Wallet", description = "Wallet linking")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::error::{RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER};
    use crate::testing::TestHarness;
    use axum::{
        body::{to_bytes, Body},
        http::{HeaderMap, StatusCode},
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const W1: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn registration_to_wallet_link_end_to_end() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());

        let (status, _, first) = send(
            &app,
            post_json(
                "/api/waitlist",
                json!({"email": "a@example.com", "referredBy": "BRXYZ1234"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        let ref_code = first["refCode"].as_str().unwrap().to_string();
        assert!(ref_code.starts_with("BR"));

        let (status, _, second) = send(
            &app,
            post_json("/api/waitlist", json!({"email": "a@example.com"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["message"], "Verification email resent!");
        assert_eq!(second["refCode"], ref_code.as_str());

        harness
            .auth
            .add_proof("hash-a", Principal::new("user-a", "a@example.com"));
        let (status, headers, _) = send(
            &app,
            get("/api/auth/confirm?token_hash=hash-a&type=signup", None),
        )
        .await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        let location = headers[header::LOCATION].to_str().unwrap();
        assert_eq!(location, "https://site.example/verified?email=a%40example.com");
        assert!(harness.state.registry.get("a@example.com").unwrap().unwrap().is_verified);

        // Second verified account, created directly.
        let (status, _, _) = send(
            &app,
            post_json("/api/waitlist", json!({"email": "b@example.com"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        harness
            .state
            .registry
            .mark_verified("b@example.com", "user-b", Utc::now())
            .unwrap();

        harness
            .auth
            .add_session("tok-a", Principal::new("user-a", "a@example.com"));
        harness
            .auth
            .add_session("tok-b", Principal::new("user-b", "b@example.com"));

        let (status, _, linked) = send(
            &app,
            post_json("/api/update-wallet", json!({"walletAddress": W1}), Some("tok-a")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(linked["wallet_address"], W1.to_lowercase());

        let (status, _, conflict) = send(
            &app,
            post_json(
                "/api/update-wallet",
                json!({"walletAddress": W1.to_lowercase()}),
                Some("tok-b"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(conflict["error_code"], "wallet_taken");

        let (status, _, lookup) = send(&app, get("/api/update-wallet", Some("tok-a"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(lookup["wallet_address"], W1.to_lowercase());

        let (_, _, other) = send(&app, get("/api/update-wallet", Some("tok-b"))).await;
        assert_eq!(other["wallet_address"], Value::Null);
    }

    #[tokio::test]
    async fn verified_email_registration_is_conflict_with_ref_code() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        let (_, _, created) = send(
            &app,
            post_json("/api/waitlist", json!({"email": "a@example.com"}), None),
        )
        .await;
        harness
            .state
            .registry
            .mark_verified("a@example.com", "user-a", Utc::now())
            .unwrap();

        let (status, _, body) = send(
            &app,
            post_json("/api/waitlist", json!({"email": "a@example.com"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "This email is already verified!");
        assert_eq!(body["refCode"], created["refCode"]);
    }

    #[tokio::test]
    async fn fourth_registration_from_same_ip_is_rate_limited() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());

        for i in 0..3 {
            let (status, _, _) = send(
                &app,
                post_json("/api/waitlist", json!({"email": format!("u{i}@example.com")}), None),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, headers, body) = send(
            &app,
            post_json("/api/waitlist", json!({"email": "u9@example.com"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Too many requests. Please wait 1 minute.");
        assert_eq!(headers[RATE_LIMIT_LIMIT_HEADER], "3");
        assert_eq!(headers[RATE_LIMIT_REMAINING_HEADER], "0");
        assert!(headers.contains_key(RATE_LIMIT_RESET_HEADER));
        assert!(harness.state.registry.get("u9@example.com").unwrap().is_none());

        // Other endpoints are not throttled.
        let (status, _, _) = send(&app, get("/health/live", None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(&app, get("/api/update-wallet", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejected_registrations_still_count_toward_limit() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        for _ in 0..3 {
            let (status, _, _) = send(
                &app,
                post_json("/api/waitlist", json!({"email": "not-an-email"}), None),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, _, _) = send(
            &app,
            post_json("/api/waitlist", json!({"email": "a@example.com"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn verify_user_guards_identity() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        send(
            &app,
            post_json("/api/waitlist", json!({"email": "a@example.com"}), None),
        )
        .await;
        harness
            .auth
            .add_session("tok-a", Principal::new("user-a", "a@example.com"));

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/auth/verify-user",
                json!({"email": "a@example.com", "userId": "user-a"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/auth/verify-user",
                json!({"email": "b@example.com", "userId": "user-a"}),
                Some("tok-a"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Spoofing detected! You can only verify your own account.");
        assert!(!harness.state.registry.get("a@example.com").unwrap().unwrap().is_verified);

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/auth/verify-user",
                json!({"email": "a@example.com", "userId": "user-a"}),
                Some("tok-a"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Security check passed. User verified.");
        assert!(harness.state.registry.get("a@example.com").unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn wallet_link_rejects_bad_sessions_and_unverified_accounts() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        send(
            &app,
            post_json("/api/waitlist", json!({"email": "c@example.com"}), None),
        )
        .await;
        harness
            .auth
            .add_session("tok-c", Principal::new("user-c", "c@example.com"));

        let (status, _, _) = send(
            &app,
            post_json("/api/update-wallet", json!({"walletAddress": W1}), Some("expired")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) = send(
            &app,
            post_json("/api/update-wallet", json!({"walletAddress": "0x123"}), Some("tok-c")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid wallet address format");

        let (status, _, body) = send(
            &app,
            post_json("/api/update-wallet", json!({"walletAddress": W1}), Some("tok-c")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found or not verified in waitlist");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        let (_, headers, _) = send(&app, get("/health", None)).await;
        assert!(headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let harness = TestHarness::new();
        let app = router(harness.state.clone());
        let (status, _, doc) = send(&app, get("/api-doc/openapi.json", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"].get("/api/waitlist").is_some());
        assert!(doc["components"]["securitySchemes"].get("bearer").is_some());
    }
}
