// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Session state and the in-process session registry.
//!
//! A session is either anonymous or authenticated. An authenticated session
//! carries the user, the connection fingerprint it was issued to, and the
//! time of sign-in. These travel together in [`Authenticated`] so that
//! invalidation always clears all three at once.
//!
//! Any session, anonymous or not, may also hold a single-use anti-CSRF
//! token that guards the registration form.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Random bytes behind each anti-CSRF token.
const ANTI_CSRF_TOKEN_BYTES: usize = 32;

/// Opaque session identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is calling, as seen by the request layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub address: IpAddr,
    pub user_agent: String,
}

impl CallerIdentity {
    pub fn new(address: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            address,
            user_agent: user_agent.into(),
        }
    }

    /// Hash binding a session to this address and user agent.
    pub fn fingerprint(&self) -> String {
        blake3::hash(format!("{} {}", self.address, self.user_agent).as_bytes())
            .to_hex()
            .to_string()
    }
}

/// Weak reference to the signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
}

/// The fields of a signed-in session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user: UserRef,
    pub fingerprint: String,
    pub last_login: i64,
}

/// Why an authenticated session was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Request came from a different address or user agent
    FingerprintMismatch,
    /// Maximum login time elapsed
    TimedOut,
    /// Explicit logout
    LoggedOut,
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FingerprintMismatch => write!(f, "connection fingerprint mismatch"),
            Self::TimedOut => write!(f, "session timed out"),
            Self::LoggedOut => write!(f, "logged out"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Authenticated),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Reason this session must be dropped for the given caller, if any.
    pub fn check(&self, fingerprint: &str, now: i64, max_login_time: i64) -> Option<Invalidation> {
        let Self::Authenticated(auth) = self else {
            return None;
        };
        if !constant_time_eq(&auth.fingerprint, fingerprint) {
            return Some(Invalidation::FingerprintMismatch);
        }
        if now > auth.last_login.saturating_add(max_login_time) {
            return Some(Invalidation::TimedOut);
        }
        None
    }

    /// Return to anonymous, handing back whatever was cleared.
    pub fn invalidate(&mut self) -> Option<Authenticated> {
        match std::mem::take(self) {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(auth),
        }
    }
}

/// Authenticated session as exposed to request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub user: UserRef,
    pub last_login: i64,
    pub expires_at: i64,
}

#[derive(Debug)]
struct SessionEntry {
    state: SessionState,
    last_seen: i64,
    anti_csrf: Option<String>,
}

impl SessionEntry {
    fn new(state: SessionState, now: i64) -> Self {
        Self {
            state,
            last_seen: now,
            anti_csrf: None,
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn generate_anti_csrf_token() -> String {
    let mut bytes = [0u8; ANTI_CSRF_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn log_invalidation(cleared: &Authenticated, reason: Invalidation) {
    match reason {
        Invalidation::FingerprintMismatch => warn!(
            user = %cleared.user.username,
            "Possible session hijack, session invalidated"
        ),
        _ => info!(user = %cleared.user.username, %reason, "Session invalidated"),
    }
}

/// Owned map of live sessions.
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionId, SessionEntry>>,
    max_login_time: i64,
}

impl SessionRegistry {
    pub fn new(max_login_time: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_login_time,
        }
    }

    pub fn max_login_time(&self) -> i64 {
        self.max_login_time
    }

    fn view(&self, id: &SessionId, auth: &Authenticated) -> Session {
        Session {
            id: id.clone(),
            user: auth.user.clone(),
            last_login: auth.last_login,
            expires_at: auth.last_login.saturating_add(self.max_login_time),
        }
    }

    /// Start an authenticated session under a fresh identifier.
    ///
    /// Any session the caller already held is discarded.
    pub fn establish(&self, previous: Option<&SessionId>, auth: Authenticated, now: i64) -> Session {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = previous {
            entries.remove(previous);
        }

        let id = SessionId::generate();
        let session = self.view(&id, &auth);
        entries.insert(id, SessionEntry::new(SessionState::Authenticated(auth), now));
        session
    }

    /// Validate the session for this caller and return it if still good.
    ///
    /// A fingerprint mismatch or timeout drops the session back to anonymous
    /// without surfacing an error.
    pub fn guard(&self, id: &SessionId, fingerprint: &str, now: i64) -> Option<Session> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get_mut(id)?;
        entry.last_seen = now;

        if let Some(reason) = entry.state.check(fingerprint, now, self.max_login_time) {
            if let Some(cleared) = entry.state.invalidate() {
                log_invalidation(&cleared, reason);
            }
            return None;
        }

        match &entry.state {
            SessionState::Authenticated(auth) => Some(self.view(id, auth)),
            SessionState::Anonymous => None,
        }
    }

    /// Drop the authenticated part of a session. Returns what was cleared.
    pub fn invalidate(&self, id: &SessionId, reason: Invalidation) -> Option<Authenticated> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let cleared = entries.get_mut(id).and_then(|entry| entry.state.invalidate());
        if let Some(cleared) = &cleared {
            log_invalidation(cleared, reason);
        }
        cleared
    }

    /// Issue a fresh anti-CSRF token, replacing any earlier one.
    ///
    /// A caller without a live session gets a new anonymous one; the
    /// returned id is the session the token belongs to.
    pub fn issue_anti_csrf(&self, id: Option<&SessionId>, now: i64) -> (SessionId, String) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let token = generate_anti_csrf_token();

        if let Some(id) = id {
            if let Some(entry) = entries.get_mut(id) {
                entry.last_seen = now;
                entry.anti_csrf = Some(token.clone());
                return (id.clone(), token);
            }
        }

        let id = SessionId::generate();
        let mut entry = SessionEntry::new(SessionState::Anonymous, now);
        entry.anti_csrf = Some(token.clone());
        entries.insert(id.clone(), entry);
        debug!("Opened anonymous session for anti-CSRF token");
        (id, token)
    }

    /// Spend the session's anti-CSRF token and report whether `presented`
    /// matched it. The token is gone afterwards either way.
    pub fn redeem_anti_csrf(&self, id: Option<&SessionId>, presented: &str) -> bool {
        let Some(id) = id else {
            return false;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .get_mut(id)
            .and_then(|entry| entry.anti_csrf.take())
            .is_some_and(|expected| constant_time_eq(&expected, presented))
    }

    /// Current state for a session id, without validation.
    pub fn state(&self, id: &SessionId) -> Option<SessionState> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).map(|entry| entry.state.clone())
    }

    /// Remove timed-out sessions and anonymous sessions idle longer than
    /// the maximum login time.
    pub fn sweep(&self, now: i64) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        let max_login_time = self.max_login_time;

        entries.retain(|_, entry| match &entry.state {
            SessionState::Authenticated(auth) => now <= auth.last_login.saturating_add(max_login_time),
            SessionState::Anonymous => now <= entry.last_seen.saturating_add(max_login_time),
        });

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
