// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sign-in, sign-out and registration.
//!
//! Every sign-in attempt is throttled per caller address before credentials
//! are looked at. Unknown users and wrong passwords fail identically so the
//! response never reveals whether an account exists, neither in its
//! message nor in how long it takes.
//!
//! Registration is throttled the same way and additionally requires the
//! single-use anti-CSRF token issued to the caller's session.

use crate::clock::Clock;
use crate::config::{Config, ThrottleConfig};
use crate::error::{AuthError, Result};
use crate::limiter::RateLimiter;
use crate::password::PasswordHasher;
use crate::session::{
    Authenticated, CallerIdentity, Invalidation, Session, SessionId, SessionRegistry,
};
use crate::users::{
    is_valid_email, is_valid_profile_url, is_valid_username, sanitize_text, UserDirectory,
    UserRecord,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Throttle resource name for sign-in attempts.
pub const SIGN_IN_RESOURCE: &str = "Sign in";
/// Throttle resource name for registrations.
pub const REGISTER_RESOURCE: &str = "Register";

/// Fields submitted on the registration form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub url: Option<String>,
    pub password: String,
    pub confirm_password: String,
    /// Token previously issued by [`AuthenticationService::anti_csrf_token`]
    pub anti_csrf: String,
}

/// Authentication front door for request handlers.
pub struct AuthenticationService {
    limiter: Arc<RateLimiter>,
    users: Arc<dyn UserDirectory>,
    sessions: SessionRegistry,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
    throttle: ThrottleConfig,
}

impl AuthenticationService {
    pub fn new(
        config: &Config,
        limiter: Arc<RateLimiter>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            limiter,
            users,
            sessions: SessionRegistry::new(config.session.max_login_time_secs),
            hasher: PasswordHasher::new(&config.password)?,
            clock,
            throttle: config.throttle.clone(),
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Sign a user in by username or e-mail.
    ///
    /// On success the caller's previous session (if any) is discarded and a
    /// new one is issued under a fresh identifier.
    pub async fn sign_in(
        &self,
        caller: &CallerIdentity,
        current: Option<&SessionId>,
        identifier: &str,
        password: &str,
    ) -> Result<Session> {
        let login_time = self.clock.now();
        let address = caller.address.to_string();

        self.limiter
            .consume(&[SIGN_IN_RESOURCE, &address], self.throttle.sign_in)?;

        if identifier.trim().is_empty() {
            return Err(AuthError::MissingParameters("Username or e-mail required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::MissingParameters("Password required".into()));
        }

        let Some(user) = self.users.find_by_identifier(identifier.trim())? else {
            self.hasher.verify_decoy(password.to_string()).await?;
            debug!(%address, "Sign-in for unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify(password.to_string(), user.password_hash.clone())
            .await?
        {
            debug!(%address, user = %user.username, "Sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if self.hasher.needs_rehash(&user.password_hash) {
            self.upgrade_password_hash(&user, password).await;
        }

        self.users.record_last_login(user.id, login_time)?;

        let session = self.sessions.establish(
            current,
            Authenticated {
                user: user.user_ref(),
                fingerprint: caller.fingerprint(),
                last_login: login_time,
            },
            login_time,
        );

        info!(user = %user.username, %address, "User signed in");
        Ok(session)
    }

    /// Best effort: a failed upgrade leaves the old, still valid hash in place.
    async fn upgrade_password_hash(&self, user: &UserRecord, password: &str) {
        match self.hasher.hash(password.to_string()).await {
            Ok(upgraded) => match self.users.update_password_hash(user.id, &upgraded) {
                Ok(()) => debug!(user = %user.username, "Password hash upgraded"),
                Err(e) => warn!(user = %user.username, error = %e, "Could not store upgraded password hash"),
            },
            Err(e) => warn!(user = %user.username, error = %e, "Could not upgrade password hash"),
        }
    }

    /// The caller's session, if it is still valid for this caller.
    pub fn current_session(&self, caller: &CallerIdentity, id: Option<&SessionId>) -> Option<Session> {
        let id = id?;
        self.sessions.guard(id, &caller.fingerprint(), self.clock.now())
    }

    pub fn is_authenticated(&self, caller: &CallerIdentity, id: Option<&SessionId>) -> bool {
        self.current_session(caller, id).is_some()
    }

    pub fn log_out(&self, caller: &CallerIdentity, id: Option<&SessionId>) {
        let Some(id) = id else {
            return;
        };
        if self.sessions.invalidate(id, Invalidation::LoggedOut).is_some() {
            debug!(address = %caller.address, "Sign-out completed");
        }
    }

    /// Issue the anti-CSRF token for the registration form.
    ///
    /// Returns the session the token is bound to, which is a new anonymous
    /// session when `current` is absent or unknown.
    pub fn anti_csrf_token(&self, current: Option<&SessionId>) -> (SessionId, String) {
        self.sessions.issue_anti_csrf(current, self.clock.now())
    }

    /// Register a new account.
    ///
    /// The anti-CSRF token held by `current` is spent by every attempt that
    /// gets as far as checking it.
    pub async fn register(
        &self,
        caller: &CallerIdentity,
        current: Option<&SessionId>,
        form: Registration,
    ) -> Result<UserRecord> {
        let address = caller.address.to_string();
        self.limiter
            .consume(&[REGISTER_RESOURCE, &address], self.throttle.register)?;

        let username = form.username.trim();
        let full_name = form.full_name.trim();
        let email = form.email.trim();
        let url = form
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        if username.is_empty() {
            return Err(AuthError::MissingParameters("Username required".into()));
        }
        if full_name.is_empty() {
            return Err(AuthError::MissingParameters("Full name required".into()));
        }
        if email.is_empty() {
            return Err(AuthError::MissingParameters("E-mail required".into()));
        }
        if form.password.trim().is_empty() {
            return Err(AuthError::MissingParameters("Password required".into()));
        }
        if form.confirm_password.trim().is_empty() {
            return Err(AuthError::MissingParameters("Password confirmation required".into()));
        }
        if form.password.trim() != form.confirm_password.trim() {
            return Err(AuthError::Validation("Passwords do not match".into()));
        }

        if form.anti_csrf.trim().is_empty() {
            return Err(AuthError::MissingParameters("Anti-CSRF token required".into()));
        }
        if !self.sessions.redeem_anti_csrf(current, form.anti_csrf.trim()) {
            warn!(%address, "Registration with mismatched anti-CSRF token");
            return Err(AuthError::TokenMismatch);
        }

        if !is_valid_username(username) {
            return Err(AuthError::Validation(
                "Username must only consist of lowercase letters, numbers, - and _, between 4 and 32 characters long".into(),
            ));
        }
        if !is_valid_email(email) {
            return Err(AuthError::Validation("Invalid e-mail address".into()));
        }
        if let Some(url) = url {
            if !is_valid_profile_url(url) {
                return Err(AuthError::Validation("Invalid URL".into()));
            }
        }

        if self.users.find_by_identifier(username)?.is_some()
            || self.users.find_by_identifier(email)?.is_some()
        {
            return Err(AuthError::Registration("User already exists".into()));
        }

        let password_hash = self.hasher.hash(form.password).await?;
        let record = UserRecord::new(
            username,
            email,
            sanitize_text(full_name),
            password_hash,
            self.clock.now(),
        )
        .with_url(url.map(str::to_string));

        let user = self.users.insert(record)?;
        info!(user = %user.username, %address, "User registered");
        Ok(user)
    }

    /// Drop expired and idle sessions.
    pub fn sweep_sessions(&self) -> usize {
        self.sessions.sweep(self.clock.now())
    }
}
