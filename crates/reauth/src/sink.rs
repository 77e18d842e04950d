// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable session truth and the advisory side-channel.
//!
//! UI-facing code reads from here (snapshot, `watch` subscription, or the
//! event/advisory broadcasts). Only the coordinator writes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Signed-in user profile as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, alias = "_id", deserialize_with = "crate::token::lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_authenticated: bool,
    pub profile: Option<Profile>,
    /// False until the cold-start refresh attempt has settled.
    pub hydrated: bool,
}

/// Session transitions, for collaborators that react to edges rather than
/// levels (e.g. redirect to sign-in on `LoggedOut`).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Authenticated { profile: Option<Profile> },
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A transient user-facing notice. Not part of session correctness.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub message: String,
    pub severity: Severity,
    pub ttl: Duration,
}

impl Advisory {
    pub fn new(message: impl Into<String>, severity: Severity, ttl: Duration) -> Self {
        Self { message: message.into(), severity, ttl }
    }

    pub fn rate_limited(retry_after: Option<&str>, ttl: Duration) -> Self {
        let message = match retry_after {
            Some(after) => format!("Too many requests. Please try again after {after}."),
            None => "Too many requests. Please try again later.".to_owned(),
        };
        Self::new(message, Severity::Warning, ttl)
    }
}

/// Holds [`SessionState`] and fans out changes.
#[derive(Clone)]
pub struct SessionStateSink {
    state: Arc<watch::Sender<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    advisories: broadcast::Sender<Advisory>,
    active: Arc<Mutex<VecDeque<(Instant, Advisory)>>>,
}

impl Default for SessionStateSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateSink {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(64);
        let (advisories, _) = broadcast::channel(64);
        Self {
            state: Arc::new(state),
            events,
            advisories,
            active: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn advisories(&self) -> broadcast::Receiver<Advisory> {
        self.advisories.subscribe()
    }

    /// Advisories whose TTL has not elapsed, oldest first.
    pub fn active_advisories(&self) -> Vec<Advisory> {
        let mut active = self.active.lock();
        prune(&mut active, Instant::now());
        active.iter().map(|(_, a)| a.clone()).collect()
    }

    /// Install `profile` and flip the flag in one state change, so no
    /// observer sees a profile without authentication. Returns true if the
    /// session was not already authenticated.
    pub(crate) fn mark_authenticated(&self, profile: Profile) -> bool {
        let event_profile = profile.clone();
        let mut became = false;
        self.state.send_modify(|s| {
            became = !s.is_authenticated;
            s.is_authenticated = true;
            s.profile = Some(profile);
        });
        if became {
            let _ = self.events.send(SessionEvent::Authenticated { profile: Some(event_profile) });
        }
        became
    }

    /// Clear the profile and flip the flag. A no-op when already logged out;
    /// returns whether anything changed.
    pub(crate) fn mark_logged_out(&self) -> bool {
        let changed = self.state.send_if_modified(|s| {
            if !s.is_authenticated && s.profile.is_none() {
                return false;
            }
            s.is_authenticated = false;
            s.profile = None;
            true
        });
        if changed {
            info!("session ended");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
        changed
    }

    pub(crate) fn mark_hydrated(&self) {
        self.state.send_if_modified(|s| {
            let changed = !s.hydrated;
            s.hydrated = true;
            changed
        });
    }

    pub(crate) fn push_advisory(&self, advisory: Advisory) {
        let now = Instant::now();
        {
            let mut active = self.active.lock();
            prune(&mut active, now);
            active.push_back((now, advisory.clone()));
        }
        let _ = self.advisories.send(advisory);
    }
}

fn prune(active: &mut VecDeque<(Instant, Advisory)>, now: Instant) {
    active.retain(|(pushed_at, a)| now.duration_since(*pushed_at) < a.ttl);
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
