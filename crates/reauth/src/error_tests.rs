// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn response(status: u16) -> ApiResponse {
    ApiResponse { status, body: json!({ "message": "nope" }) }
}

fn unauthorized_error() -> RequestError {
    RequestError::Unauthorized(response(401))
}

fn rate_limited_error(retry_after: Option<&str>) -> RequestError {
    RequestError::RateLimited { response: response(429), retry_after: retry_after.map(Into::into) }
}

#[yare::parameterized(
    unauthorized = { unauthorized_error(), ErrorCode::Unauthorized, Some(401) },
    rate_limited = { rate_limited_error(None), ErrorCode::RateLimited, Some(429) },
    http = { RequestError::Http(response(404)), ErrorCode::Http, Some(404) },
    transport = { RequestError::Transport("refused".into()), ErrorCode::Transport, None },
    decode = { RequestError::Decode("missing accessToken".into()), ErrorCode::Decode, None },
)]
fn code_and_status(err: RequestError, code: ErrorCode, status: Option<u16>) {
    assert_eq!(err.code(), code);
    assert_eq!(err.status(), status);
}

#[test]
fn display_includes_status_and_server_message() {
    let err = RequestError::Http(response(404));
    assert_eq!(err.to_string(), "HTTP (404): nope");
}

#[test]
fn display_rate_limited_with_retry_after() {
    let err = rate_limited_error(Some("30s"));
    assert_eq!(err.to_string(), "RATE_LIMITED: retry after 30s");
}

#[test]
fn retryable_codes() {
    assert!(ErrorCode::RateLimited.is_retryable());
    assert!(ErrorCode::Transport.is_retryable());
    assert!(!ErrorCode::Unauthorized.is_retryable());
    assert!(!ErrorCode::Http.is_retryable());
}
