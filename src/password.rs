// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings. A stored hash whose algorithm, version
//! or cost parameters differ from the configured ones is considered
//! outdated and gets re-hashed on the next successful sign-in.
//!
//! Sign-in for an unknown user verifies against a throwaway hash built with
//! the same parameters, so both failure paths cost one full verification.

use crate::config::PasswordConfig;
use crate::error::{AuthError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Password hasher with fixed Argon2id cost parameters.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Verified against when there is no real hash to check
    decoy_hash: Arc<str>,
    verifications: Arc<AtomicU64>,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> Result<Self> {
        let params = Params::new(config.memory_cost, config.time_cost, config.parallelism, None)
            .map_err(|e| AuthError::Hashing(format!("invalid Argon2 parameters: {e}")))?;

        let salt = SaltString::generate(&mut OsRng);
        let decoy_hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
            .hash_password(b"sketchspace decoy password", &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        Ok(Self {
            params,
            decoy_hash: decoy_hash.into(),
            verifications: Arc::new(AtomicU64::new(0)),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Number of password verifications run so far.
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    /// Hash a password on the blocking pool.
    pub async fn hash(&self, password: String) -> Result<String> {
        let argon2 = self.argon2();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
        })
        .await
        .map_err(|e| {
            error!("Password hash task panicked: {}", e);
            AuthError::Hashing(e.to_string())
        })?
        .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a password against a stored hash on the blocking pool.
    ///
    /// A stored hash that cannot be parsed never verifies.
    pub async fn verify(&self, password: String, stored: String) -> Result<bool> {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        tokio::task::spawn_blocking(move || {
            let parsed = match PasswordHash::new(&stored) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Stored password hash is unreadable: {}", e);
                    return false;
                }
            };
            // Parameters are taken from the hash itself.
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| {
            error!("Password verify task panicked: {}", e);
            AuthError::Hashing(e.to_string())
        })
    }

    /// Spend the time of a real verification without checking anything.
    pub async fn verify_decoy(&self, password: String) -> Result<()> {
        self.verify(password, self.decoy_hash.to_string()).await?;
        Ok(())
    }

    /// Whether `stored` was produced with anything other than the current
    /// algorithm, version and cost parameters.
    pub fn needs_rehash(&self, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(params) => {
                params.m_cost() != self.params.m_cost()
                    || params.t_cost() != self.params.t_cost()
                    || params.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
