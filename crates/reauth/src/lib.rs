// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reauth: client-side session authentication for a cookie-refreshed API.
//!
//! Every outbound call goes through [`ReauthCoordinator::execute`], which
//! attaches the in-memory access token, refreshes it shortly before expiry,
//! recovers from a 401 with a single refresh and a single retry, and reports
//! session transitions through [`SessionStateSink`].

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod flows;
pub mod refresh;
pub mod sink;
pub mod singleflight;
pub mod token;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::config::{SessionConfig, UnavailablePolicy};
pub use crate::coordinator::ReauthCoordinator;
pub use crate::dispatch::{ApiRequest, ApiResponse};
pub use crate::error::{ErrorCode, RequestError};
pub use crate::flows::{LoginRequest, RegisterRequest};
pub use crate::sink::{Advisory, Profile, SessionEvent, SessionState, SessionStateSink, Severity};
pub use crate::token::{Claims, Credential, TokenStore};
