// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! User records and the directory they are looked up in.

use crate::session::UserRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Longest accepted username.
pub const USERNAME_MAX_LEN: usize = 32;
/// Shortest accepted username.
pub const USERNAME_MIN_LEN: usize = 4;

/// Roles a user can hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum UserRole {
    #[default]
    User = 0,
    Pro = 10,
    Curator = 20,
    Admin = 9999,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub role: UserRole,
    /// Unix time of registration
    pub joined: i64,
    /// Unix time of the last successful sign-in
    pub last_login: Option<i64>,
}

impl UserRecord {
    /// Build a record that has not been stored yet (`id` is assigned on insert).
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
        password_hash: impl Into<String>,
        joined: i64,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            full_name: full_name.into(),
            url: None,
            password_hash: password_hash.into(),
            role: UserRole::User,
            joined,
            last_login: None,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("User already exists")]
    Duplicate,

    #[error("User {0} not found")]
    NotFound(u64),

    #[error("User directory unavailable: {0}")]
    Backend(String),
}

/// Lookup and update of user records.
pub trait UserDirectory: Send + Sync {
    /// Find a user by username or e-mail address.
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// Store a new user and return it with its assigned id.
    fn insert(&self, user: UserRecord) -> Result<UserRecord, DirectoryError>;

    fn update_password_hash(&self, id: u64, password_hash: &str) -> Result<(), DirectoryError>;

    fn record_last_login(&self, id: u64, at: i64) -> Result<(), DirectoryError>;
}

/// In-memory user directory.
#[derive(Debug)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<u64, UserRecord>>,
    next_id: AtomicU64,
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self, id: u64) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users
            .values()
            .find(|u| u.username == identifier || u.email.eq_ignore_ascii_case(identifier))
            .cloned())
    }

    fn insert(&self, mut user: UserRecord) -> Result<UserRecord, DirectoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users
            .values()
            .any(|u| u.username == user.username || u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(DirectoryError::Duplicate);
        }

        user.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update_password_hash(&self, id: u64, password_hash: &str) -> Result<(), DirectoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    fn record_last_login(&self, id: u64, at: i64) -> Result<(), DirectoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        user.last_login = Some(at);
        Ok(())
    }
}

/// Usernames are 4-32 characters of lowercase letters, digits, `-` and `_`.
pub fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Loose structural e-mail check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

/// Profile links must be absolute http(s) URLs.
pub fn is_valid_profile_url(value: &str) -> bool {
    matches!(url::Url::parse(value), Ok(u) if matches!(u.scheme(), "http" | "https"))
}

/// Strip markup from free text and escape what is left for HTML.
pub fn sanitize_text(input: &str) -> String {
    let mut stripped = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    let mut escaped = String::with_capacity(stripped.len());
    for c in stripped.trim().chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
