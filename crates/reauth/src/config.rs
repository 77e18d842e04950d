// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// What to do when the refresh endpoint cannot be reached (transport error,
/// timeout, or 5xx).
///
/// - `Retain`: keep the session and warn; the next request tries again.
/// - `Logout`: treat it like a rejected refresh credential.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnavailablePolicy {
    #[default]
    Retain,
    Logout,
}

impl std::fmt::Display for UnavailablePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Logout => f.write_str("logout"),
        }
    }
}

impl std::str::FromStr for UnavailablePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "logout" => Ok(Self::Logout),
            other => anyhow::bail!("invalid refresh-unavailable policy: {other}"),
        }
    }
}

/// Session pipeline settings.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the backend API.
    #[arg(long, default_value = "http://127.0.0.1:5000/api", env = "REAUTH_BASE_URL")]
    pub base_url: String,

    /// Path of the refresh endpoint, relative to the base URL.
    #[arg(long, default_value = "/auth/refresh-token", env = "REAUTH_REFRESH_PATH")]
    pub refresh_path: String,

    /// Refresh proactively when the credential expires within this many seconds.
    #[arg(long, default_value_t = 60, env = "REAUTH_REFRESH_BUFFER_SECS")]
    pub refresh_buffer_secs: u64,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "REAUTH_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Client region/locale tag attached to every call.
    #[arg(long, env = "REAUTH_REGION")]
    pub region: Option<String>,

    /// Header name used for the region tag.
    #[arg(long, default_value = "x-client-region", env = "REAUTH_REGION_HEADER")]
    pub region_header: String,

    /// How long advisories stay active, in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "REAUTH_ADVISORY_TTL_MS")]
    pub advisory_ttl_ms: u64,

    /// Behavior when the refresh endpoint is unreachable (retain, logout).
    #[arg(long, default_value = "retain", env = "REAUTH_ON_REFRESH_UNAVAILABLE")]
    pub on_refresh_unavailable: UnavailablePolicy,
}

impl SessionConfig {
    /// Defaults for the given base URL, for embedding without clap.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: "/auth/refresh-token".to_owned(),
            refresh_buffer_secs: 60,
            timeout_ms: 10_000,
            region: None,
            region_header: "x-client-region".to_owned(),
            advisory_ttl_ms: 5_000,
            on_refresh_unavailable: UnavailablePolicy::Retain,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!("--base-url must start with http:// or https://");
        }
        if !self.refresh_path.starts_with('/') {
            anyhow::bail!("--refresh-path must start with '/'");
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("--timeout-ms must be greater than zero");
        }
        if self.region_header.trim().is_empty() {
            anyhow::bail!("--region-header must not be empty");
        }
        Ok(())
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn advisory_ttl(&self) -> Duration {
        Duration::from_millis(self.advisory_ttl_ms)
    }

    /// Join the base URL and a path with exactly one slash between them.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        format!("{}/{}", base, path.trim().trim_start_matches('/'))
    }
}

/// Command-line client for a session-authenticated API.
#[derive(Debug, Parser)]
#[command(name = "reauth", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub session: SessionConfig,

    /// Email to sign in with before running the command.
    #[arg(long, env = "REAUTH_EMAIL")]
    pub email: Option<String>,

    /// Password to sign in with before running the command.
    #[arg(long, env = "REAUTH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log level filter.
    #[arg(long, default_value = "info", env = "REAUTH_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json).
    #[arg(long, default_value = "text", env = "REAUTH_LOG_FORMAT")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// GET a protected path and print the JSON body.
    Get { path: String },
    /// POST a JSON body to a protected path and print the JSON body.
    Post {
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
    /// Sign in and print the profile.
    Login,
    /// Sign out of the current session.
    Logout,
    /// Print the session state after the cold-start refresh.
    Status,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;

        if self.email.is_some() != self.password.is_some() {
            anyhow::bail!("--email and --password must be given together");
        }
        if matches!(self.command, Command::Login) && self.email.is_none() {
            anyhow::bail!("login requires --email and --password");
        }
        if let Command::Post { body: Some(ref body), .. } = self.command {
            serde_json::from_str::<serde_json::Value>(body)
                .map_err(|e| anyhow::anyhow!("--body is not valid JSON: {e}"))?;
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
