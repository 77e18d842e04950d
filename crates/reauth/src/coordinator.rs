// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request path: proactive and reactive refresh around every call, with
//! at most one refresh in flight.
//!
//! The coordinator is a two-state machine over its refresh slot. `IDLE` means
//! the slot is empty; `REFRESHING` means a refresh flight is installed and
//! every caller that needs a refresh awaits it instead of starting its own.
//! The flight applies its outcome to the token store and session sink before
//! the slot is vacated, so a waiter never resumes with a credential older
//! than the refresh that unblocked it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, UnavailablePolicy};
use crate::dispatch::{build_client, ApiRequest, ApiResponse, Dispatched, RequestDispatcher};
use crate::error::RequestError;
use crate::refresh::{do_refresh, AuthGrant, RefreshError, RefreshOutcome, RefreshTrigger};
use crate::sink::{Advisory, SessionState, SessionStateSink, Severity};
use crate::singleflight::SingleFlight;
use crate::token::{Credential, TokenStore};

/// Path fragments of endpoints that run without a session and must never
/// trigger refresh or retry.
pub const AUTH_ENDPOINTS: &[&str] =
    &["/auth/login", "/auth/register", "/auth/send-otp", "/auth/verify-otp"];

/// Whether `path` is an auth endpoint (login, registration, OTP). A fragment
/// only matches as whole path segments: it must end the path or be followed
/// by `/`, `?` or `#`.
pub fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.iter().any(|fragment| {
        path.match_indices(fragment).any(|(at, _)| {
            let rest = path.get(at + fragment.len()..).unwrap_or("");
            matches!(rest.chars().next(), None | Some('/' | '?' | '#'))
        })
    })
}

/// Entry point for every outbound call. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReauthCoordinator {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) store: Arc<TokenStore>,
    pub(crate) dispatcher: RequestDispatcher,
    pub(crate) sink: SessionStateSink,
    /// Serializes session transitions (store and sink together).
    transition: Mutex<()>,
    refresh: SingleFlight<RefreshOutcome>,
    client: Client,
    refresh_url: String,
    refresh_buffer: Duration,
    advisory_ttl: Duration,
    on_unavailable: UnavailablePolicy,
}

impl ReauthCoordinator {
    pub fn new(config: &SessionConfig) -> anyhow::Result<Self> {
        let client = build_client(config)?;
        Ok(Self::with_client(config, client))
    }

    /// Build around an existing client (its cookie jar holds the refresh
    /// credential).
    pub fn with_client(config: &SessionConfig, client: Client) -> Self {
        let store = Arc::new(TokenStore::new());
        let dispatcher =
            RequestDispatcher::new(client.clone(), config.clone(), Arc::clone(&store));
        Self {
            inner: Arc::new(Inner {
                store,
                dispatcher,
                sink: SessionStateSink::new(),
                transition: Mutex::new(()),
                refresh: SingleFlight::new(),
                client,
                refresh_url: config.url(&config.refresh_path),
                refresh_buffer: config.refresh_buffer(),
                advisory_ttl: config.advisory_ttl(),
                on_unavailable: config.on_refresh_unavailable,
            }),
        }
    }

    /// Read side of the session state.
    pub fn sink(&self) -> &SessionStateSink {
        &self.inner.sink
    }

    pub fn session(&self) -> SessionState {
        self.inner.sink.snapshot()
    }

    /// Whether a refresh is currently in flight (`REFRESHING`).
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.in_flight()
    }

    /// Set the ambient region tag attached to every call.
    pub fn set_region(&self, region: Option<String>) {
        self.inner.dispatcher.set_region(region);
    }

    /// Issue `request`, refreshing the credential around it as needed.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let protected = !is_auth_endpoint(&request.path);
        let store = &self.inner.store;

        let seen = store.generation();
        if protected && store.get().is_some() && store.is_expiring_within(self.inner.refresh_buffer)
        {
            debug!(path = %request.path, "credential expiring, refreshing before dispatch");
            self.refresh(RefreshTrigger::Proactive, seen).await;
        }

        let generation = store.generation();
        match self.inner.dispatcher.dispatch(&request).await {
            Dispatched::AuthRejected(_) if protected => {
                let outcome = self.refresh(RefreshTrigger::Reactive, generation).await;
                debug!(path = %request.path, ?outcome, "retrying after refresh");
                let retried = self.inner.dispatcher.dispatch(&request).await;
                self.settle(&request, retried)
            }
            other => self.settle(&request, other),
        }
    }

    /// Run a refresh, or join the one already in flight.
    ///
    /// `seen` is the store generation the caller acted on. If the credential
    /// changed since then, the flight settles on the current store instead of
    /// calling the endpoint again.
    pub(crate) async fn refresh(&self, trigger: RefreshTrigger, seen: u64) -> RefreshOutcome {
        let inner = Arc::clone(&self.inner);
        let joined = self
            .inner
            .refresh
            .run(move || async move { inner.perform_refresh(trigger, seen).await })
            .await;
        if !joined.leader {
            debug!(%trigger, "joined in-flight refresh");
        }
        joined.outcome.unwrap_or(RefreshOutcome::Unavailable)
    }

    fn settle(
        &self,
        request: &ApiRequest,
        dispatched: Dispatched,
    ) -> Result<ApiResponse, RequestError> {
        match dispatched {
            Dispatched::Success(response) => Ok(response),
            Dispatched::AuthRejected(response) => Err(RequestError::Unauthorized(response)),
            Dispatched::RateLimited { response, retry_after } => {
                warn!(path = %request.path, retry_after = ?retry_after, "rate limited");
                let advisory =
                    Advisory::rate_limited(retry_after.as_deref(), self.inner.advisory_ttl);
                self.inner.sink.push_advisory(advisory);
                Err(RequestError::RateLimited { response, retry_after })
            }
            Dispatched::Failed(response) => Err(RequestError::Http(response)),
            Dispatched::Unreachable(message) => Err(RequestError::Transport(message)),
        }
    }
}

impl Inner {
    async fn perform_refresh(&self, trigger: RefreshTrigger, seen: u64) -> RefreshOutcome {
        if self.store.generation() != seen {
            debug!(%trigger, "credential changed since it was read, skipping refresh");
            return self.current_outcome();
        }
        debug!(%trigger, "refreshing access token");
        let result = do_refresh(&self.client, &self.refresh_url).await;
        self.apply_refresh(trigger, seen, result)
    }

    /// Apply a refresh result unless the credential moved on while the call
    /// was out. A login, logout or other install in that window wins.
    fn apply_refresh(
        &self,
        trigger: RefreshTrigger,
        seen: u64,
        result: Result<AuthGrant, RefreshError>,
    ) -> RefreshOutcome {
        let _transition = self.transition.lock();
        if self.store.generation() != seen {
            debug!(%trigger, "credential changed during refresh, discarding result");
            return self.current_outcome();
        }
        match result {
            Ok(grant) => {
                self.install_locked(grant);
                info!(%trigger, "access token refreshed");
                RefreshOutcome::Refreshed
            }
            Err(e) if e.is_transient() && self.on_unavailable == UnavailablePolicy::Retain => {
                warn!(%trigger, err = %e, "refresh unavailable, keeping session");
                if self.sink.is_authenticated() {
                    self.sink.push_advisory(Advisory::new(
                        "Could not reach the server to renew your session. Retrying shortly.",
                        Severity::Warning,
                        self.advisory_ttl,
                    ));
                }
                RefreshOutcome::Unavailable
            }
            Err(e) => {
                warn!(%trigger, err = %e, "refresh failed, ending session");
                self.end_session_locked();
                RefreshOutcome::Rejected
            }
        }
    }

    fn current_outcome(&self) -> RefreshOutcome {
        match self.store.get() {
            Some(_) => RefreshOutcome::Refreshed,
            None => RefreshOutcome::Rejected,
        }
    }

    /// Install a freshly granted credential and profile.
    pub(crate) fn install(&self, grant: AuthGrant) {
        let _transition = self.transition.lock();
        self.install_locked(grant);
    }

    pub(crate) fn end_session(&self) {
        let _transition = self.transition.lock();
        self.end_session_locked();
    }

    fn install_locked(&self, grant: AuthGrant) {
        self.store.set(Credential::new(grant.access_token));
        self.sink.mark_authenticated(grant.user);
    }

    fn end_session_locked(&self) {
        self.store.clear();
        self.sink.mark_logged_out();
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
