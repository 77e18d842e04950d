// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: token minting and a mock session backend.
//!
//! The backend speaks the same wire shapes as the real API: auth endpoints
//! mint tokens, `/movies` only accepts tokens it has issued, and the refresh
//! endpoint replays a scripted queue before falling back to minting.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::SessionConfig;
use crate::coordinator::ReauthCoordinator;
use crate::token::epoch_secs;

static CRYPTO_INIT: Once = Once::new();
static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

pub const USER_EMAIL: &str = "viewer@example.com";
pub const USER_PASSWORD: &str = "correct-horse";
pub const VALID_OTP: &str = "123456";

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build an unsigned JWT-shaped token with the given claims payload.
pub fn token_with_payload(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Mint a token for `sub` expiring `ttl_secs` from now (negative = already expired).
pub fn mint_token(sub: &str, ttl_secs: i64) -> String {
    let now = epoch_secs() as i64;
    let jti = TOKEN_SEQ.fetch_add(1, Ordering::Relaxed);
    token_with_payload(&json!({
        "sub": sub,
        "email": USER_EMAIL,
        "iat": now,
        "exp": now + ttl_secs,
        "jti": jti,
    }))
}

pub fn profile_json(sub: &str) -> Value {
    json!({ "id": sub, "email": USER_EMAIL, "name": "Casey Viewer" })
}

/// Scripted state shared with the mock backend's handlers.
#[derive(Default)]
pub struct MockState {
    pub refresh_calls: AtomicU32,
    pub protected_calls: AtomicU32,
    pub logout_calls: AtomicU32,
    /// Responses returned by the refresh endpoint before it falls back to minting.
    pub refresh_script: Mutex<VecDeque<(u16, Value)>>,
    pub refresh_delay: Mutex<Duration>,
    /// Tokens accepted by protected routes.
    pub valid_tokens: Mutex<HashSet<String>>,
    /// Bearer tokens seen by `/movies`, in arrival order.
    pub seen_bearers: Mutex<Vec<Option<String>>>,
    /// Region header values seen by `/movies`.
    pub seen_regions: Mutex<Vec<Option<String>>>,
    /// Last token minted by any auth route.
    pub last_issued: Mutex<Option<String>>,
}

impl MockState {
    /// Mint a token the protected routes will accept.
    pub fn issue(&self, ttl_secs: i64) -> String {
        let token = mint_token("user-1", ttl_secs);
        self.valid_tokens.lock().insert(token.clone());
        *self.last_issued.lock() = Some(token.clone());
        token
    }

    /// Accept an externally minted token on protected routes.
    pub fn accept(&self, token: &str) {
        self.valid_tokens.lock().insert(token.to_owned());
    }

    /// Stop accepting every token issued so far.
    pub fn revoke_all(&self) {
        self.valid_tokens.lock().clear();
    }

    pub fn script_refresh(&self, status: u16, body: Value) {
        self.refresh_script.lock().push_back((status, body));
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn protected_count(&self) -> u32 {
        self.protected_calls.load(Ordering::SeqCst)
    }

    fn grant(&self) -> Value {
        let token = self.issue(3600);
        json!({ "accessToken": token, "user": profile_json("user-1") })
    }
}

/// A mock session backend bound to an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        ensure_crypto_provider();
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/auth/refresh-token", post(refresh))
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/send-otp", post(send_otp))
            .route("/auth/verify-otp", post(verify_otp))
            .route("/auth/logout", post(logout))
            .route("/movies", get(movies))
            .route("/limited", get(limited))
            .route("/broken", get(broken))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new(self.base_url())
    }

    pub fn coordinator(&self) -> ReauthCoordinator {
        ReauthCoordinator::new(&self.config()).expect("coordinator")
    }
}

fn reply(status: u16, body: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(body))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

async fn refresh(State(state): State<Arc<MockState>>) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let scripted = state.refresh_script.lock().pop_front();
    match scripted {
        Some((status, body)) => reply(status, body),
        None => reply(200, state.grant()),
    }
}

async fn login(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["email"] == USER_EMAIL && body["password"] == USER_PASSWORD {
        reply(200, state.grant())
    } else {
        reply(401, json!({ "message": "Invalid email or password" }))
    }
}

async fn register(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["email"].as_str().is_some_and(|e| e.contains('@')) {
        reply(201, state.grant())
    } else {
        reply(400, json!({ "message": "A valid email is required" }))
    }
}

async fn send_otp(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"].is_string() {
        reply(200, json!({ "message": "OTP sent" }))
    } else {
        reply(400, json!({ "message": "email is required" }))
    }
}

async fn verify_otp(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["otp"] == VALID_OTP {
        reply(200, state.grant())
    } else {
        reply(401, json!({ "message": "Invalid OTP" }))
    }
}

async fn logout(State(state): State<Arc<MockState>>) -> (StatusCode, Json<Value>) {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    reply(200, json!({ "message": "Logged out" }))
}

async fn movies(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.protected_calls.fetch_add(1, Ordering::SeqCst);
    let token = bearer(&headers);
    let region = headers.get("x-client-region").and_then(|v| v.to_str().ok()).map(str::to_owned);
    state.seen_bearers.lock().push(token.clone());
    state.seen_regions.lock().push(region);

    let accepted = token.is_some_and(|t| state.valid_tokens.lock().contains(&t));
    if accepted {
        reply(200, json!({ "movies": [{ "id": 1, "title": "Metropolis" }] }))
    } else {
        reply(401, json!({ "message": "Unauthorized" }))
    }
}

async fn limited() -> (StatusCode, Json<Value>) {
    reply(429, json!({ "message": "Too many requests", "retryAfter": "30 seconds" }))
}

async fn broken() -> (StatusCode, Json<Value>) {
    reply(500, json!({ "message": "database unavailable" }))
}

/// Assert that an expression returns `Err` whose message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
