// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory access credential storage.
//!
//! The bearer token lives only in process memory and never survives a
//! restart; the longer-lived refresh credential stays in the HTTP client's
//! cookie jar. Claims are decoded without signature verification because the
//! server is the only party that trusts or rejects the token.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Claims decoded from the payload segment of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub subject_id: Option<String>,
    pub email: Option<String>,
    /// Issued-at, epoch seconds.
    pub issued_at: Option<u64>,
    /// Expiry, epoch seconds. `None` means freshness cannot be determined.
    pub expires_at: Option<u64>,
}

/// Raw JWT payload. Subject ids show up under several names depending on the
/// issuer, and some issuers encode numeric timestamps as floats.
#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "userId")]
    user_id: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iat: Option<Value>,
    #[serde(default)]
    exp: Option<Value>,
}

/// A bearer token together with its decoded claims.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    claims: Option<Claims>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let claims = decode(&token);
        Self { token, claims }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.claims.as_ref().and_then(|c| c.expires_at)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Decode the claim segment of a JWT-shaped token.
///
/// Returns `None` for anything that is not `header.payload[.signature]` with a
/// base64url JSON object in the payload.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let _header = segments.next().filter(|s| !s.is_empty())?;
    let payload = segments.next()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let raw: RawClaims = serde_json::from_slice(&bytes).ok()?;

    let subject_id = [raw.sub, raw.id, raw.user_id].into_iter().flatten().find_map(value_to_id);
    Some(Claims {
        subject_id,
        email: raw.email,
        issued_at: raw.iat.as_ref().and_then(value_to_secs),
        expires_at: raw.exp.as_ref().and_then(value_to_secs),
    })
}

fn value_to_id(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_secs(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Accepts string or numeric identifiers (e.g. `"42"` or `42`).
pub(crate) fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(value_to_id))
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Holds the current access credential.
///
/// Every replacement bumps a generation counter so callers can tell whether
/// the credential changed while a request was in flight.
#[derive(Default)]
pub struct TokenStore {
    slot: RwLock<Option<Credential>>,
    generation: AtomicU64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credential: Credential) {
        let mut slot = self.slot.write();
        *slot = Some(credential);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn get(&self) -> Option<Credential> {
        self.slot.read().clone()
    }

    pub fn clear(&self) {
        let mut slot = self.slot.write();
        *slot = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True when the held credential must be refreshed before use.
    ///
    /// Missing credentials and undecodable claims count as expiring.
    pub fn is_expiring_within(&self, buffer: Duration) -> bool {
        self.is_expiring_within_at(buffer, epoch_secs())
    }

    /// [`Self::is_expiring_within`] against an explicit clock (epoch seconds).
    pub fn is_expiring_within_at(&self, buffer: Duration, now: u64) -> bool {
        let slot = self.slot.read();
        match slot.as_ref().and_then(Credential::expires_at) {
            Some(expires_at) => now.saturating_add(buffer.as_secs()) >= expires_at,
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
