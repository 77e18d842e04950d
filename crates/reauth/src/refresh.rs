// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-token refresh against the cookie-authenticated refresh endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sink::Profile;

/// Body returned by refresh, login, registration and OTP verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub access_token: String,
    pub user: Profile,
}

/// How a refresh attempt settled. Shared by every caller of one flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new credential is installed.
    Refreshed,
    /// The refresh credential was rejected; the session has been ended.
    Rejected,
    /// The endpoint could not be reached; the session was left as it was.
    Unavailable,
}

/// What started a refresh, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The credential is about to expire.
    Proactive,
    /// A protected request came back 401.
    Reactive,
    /// Startup, before any session status is reported.
    ColdStart,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proactive => f.write_str("proactive"),
            Self::Reactive => f.write_str("reactive"),
            Self::ColdStart => f.write_str("cold_start"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// 4xx: the refresh credential is missing, invalid or expired.
    Rejected { status: u16, message: String },
    /// 2xx whose body is not an [`AuthGrant`].
    Malformed(String),
    /// Transport failure, timeout, or 5xx.
    Unavailable(String),
}

impl RefreshError {
    /// Whether the failure says nothing about the refresh credential itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, message } => {
                write!(f, "refresh rejected ({status}): {message}")
            }
            Self::Malformed(msg) => write!(f, "malformed refresh response: {msg}"),
            Self::Unavailable(msg) => write!(f, "refresh endpoint unavailable: {msg}"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Perform a single refresh request.
///
/// No bearer header is sent; the refresh credential rides in the client's
/// cookie jar.
pub async fn do_refresh(client: &reqwest::Client, url: &str) -> Result<AuthGrant, RefreshError> {
    let resp =
        client.post(url).send().await.map_err(|e| RefreshError::Unavailable(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = text.trim().chars().take(200).collect();
        if status.is_server_error() {
            return Err(RefreshError::Unavailable(format!("{status}: {message}")));
        }
        return Err(RefreshError::Rejected { status: status.as_u16(), message });
    }

    let bytes = resp.bytes().await.map_err(|e| RefreshError::Unavailable(e.to_string()))?;
    let grant: AuthGrant =
        serde_json::from_slice(&bytes).map_err(|e| RefreshError::Malformed(e.to_string()))?;
    if grant.access_token.trim().is_empty() {
        return Err(RefreshError::Malformed("empty accessToken".to_owned()));
    }
    Ok(grant)
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
