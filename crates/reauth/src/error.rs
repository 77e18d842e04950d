// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dispatch::ApiResponse;

/// Machine-readable error codes surfaced to callers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    RateLimited,
    Http,
    Transport,
    Decode,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Http => "HTTP",
            Self::Transport => "TRANSPORT",
            Self::Decode => "DECODE",
        }
    }

    /// Whether the same call may succeed later without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transport)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a request issued through the coordinator.
///
/// Refresh failures never appear here: they are absorbed into session state
/// and the caller only sees whatever the underlying call returned.
#[derive(Debug, Clone)]
pub enum RequestError {
    /// 401 that survived the single reactive refresh (or hit an auth endpoint).
    Unauthorized(ApiResponse),
    /// 429; an advisory has already been pushed.
    RateLimited { response: ApiResponse, retry_after: Option<String> },
    /// Any other non-2xx status, returned verbatim.
    Http(ApiResponse),
    /// The request never produced a response.
    Transport(String),
    /// A 2xx body did not have the expected shape.
    Decode(String),
}

impl RequestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Http(_) => ErrorCode::Http,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Decode(_) => ErrorCode::Decode,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Self::Unauthorized(r) | Self::Http(r) => Some(r),
            Self::RateLimited { response, .. } => Some(response),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized(r) | Self::Http(r) => {
                write!(f, "{} ({}): {}", self.code(), r.status, r.message())
            }
            Self::RateLimited { retry_after: Some(after), .. } => {
                write!(f, "{}: retry after {after}", self.code())
            }
            Self::RateLimited { retry_after: None, .. } => write!(f, "{}", self.code()),
            Self::Transport(msg) | Self::Decode(msg) => write!(f, "{}: {msg}", self.code()),
        }
    }
}

impl std::error::Error for RequestError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
