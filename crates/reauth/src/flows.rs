// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-establishing flows: sign-in, registration, OTP, sign-out, and the
//! cold-start refresh performed before any session status is reported.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::coordinator::ReauthCoordinator;
use crate::dispatch::{ApiRequest, ApiResponse};
use crate::error::RequestError;
use crate::refresh::{AuthGrant, RefreshTrigger};
use crate::sink::{Profile, SessionState};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const SEND_OTP_PATH: &str = "/auth/send-otp";
pub const VERIFY_OTP_PATH: &str = "/auth/verify-otp";
pub const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Additional sign-up fields forwarded verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReauthCoordinator {
    /// Cold start: attempt one refresh if no credential is held (the refresh
    /// cookie may have outlived the process), then report the session.
    pub async fn bootstrap(&self) -> SessionState {
        let seen = self.inner.store.generation();
        if self.inner.store.get().is_none() {
            self.refresh(RefreshTrigger::ColdStart, seen).await;
        }
        self.inner.sink.mark_hydrated();
        let state = self.session();
        info!(authenticated = state.is_authenticated, "session hydrated");
        state
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<Profile, RequestError> {
        let body = json!({ "email": credentials.email, "password": credentials.password });
        let response = self.execute(ApiRequest::post(LOGIN_PATH, body)).await?;
        self.establish(response, "login")
    }

    pub async fn register(&self, form: &RegisterRequest) -> Result<Profile, RequestError> {
        let body = serde_json::to_value(form).map_err(|e| RequestError::Decode(e.to_string()))?;
        let response = self.execute(ApiRequest::post(REGISTER_PATH, body)).await?;
        self.establish(response, "register")
    }

    /// Ask the backend to send a one-time code to `email`.
    pub async fn send_otp(&self, email: &str) -> Result<(), RequestError> {
        self.execute(ApiRequest::post(SEND_OTP_PATH, json!({ "email": email }))).await?;
        Ok(())
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<Profile, RequestError> {
        let body = json!({ "email": email, "otp": otp });
        let response = self.execute(ApiRequest::post(VERIFY_OTP_PATH, body)).await?;
        self.establish(response, "verify_otp")
    }

    /// End the session. Local state is cleared whatever the server says; the
    /// server's answer is still returned so callers can report it.
    pub async fn logout(&self) -> Result<(), RequestError> {
        let result = self.execute(ApiRequest::post_empty(LOGOUT_PATH)).await;
        if let Err(ref e) = result {
            warn!(err = %e, "logout call failed, clearing local session anyway");
        }
        self.inner.end_session();
        info!("logged out");
        result.map(|_| ())
    }

    fn establish(&self, response: ApiResponse, flow: &str) -> Result<Profile, RequestError> {
        let grant: AuthGrant = serde_json::from_value(response.body)
            .map_err(|e| RequestError::Decode(format!("{flow} response: {e}")))?;
        if grant.access_token.trim().is_empty() {
            return Err(RequestError::Decode(format!("{flow} response: empty accessToken")));
        }
        let profile = grant.user.clone();
        self.inner.install(grant);
        info!(flow, user = ?profile.id, "session established");
        Ok(profile)
    }
}

#[cfg(test)]
#[path = "flows_tests.rs"]
mod tests;
