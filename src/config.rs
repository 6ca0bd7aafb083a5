// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the authentication service.
//!
//! Throttle defaults match the limits the site has always run with:
//! 500 sign-in attempts per address per day with a 75x burst, and one
//! registration per address per hour with the same burst.

use crate::limiter::Quota;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the authentication service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Throttle bucket file (default: cache/.throttle.json)
    #[serde(default = "default_throttle_store_path")]
    pub throttle_store_path: PathBuf,

    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Throttle quotas
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Password hashing cost
    #[serde(default)]
    pub password: PasswordConfig,
}

/// Session lifetime and cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds after sign-in before the session expires (default: 3600)
    #[serde(default = "default_max_login_time")]
    pub max_login_time_secs: i64,

    /// Session cookie name (default: SS_SESSION)
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Seconds between session sweeps (default: 60)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Quotas for throttled actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Sign-in attempts per caller address (default: 500/day, burst 75)
    #[serde(default = "default_sign_in_quota")]
    pub sign_in: Quota,

    /// Registrations per caller address (default: 1/hour, burst 75)
    #[serde(default = "default_register_quota")]
    pub register: Quota,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456)
    #[serde(default = "default_memory_cost")]
    pub memory_cost: u32,

    /// Iterations (default: 2)
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    /// Lanes (default: 1)
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_throttle_store_path() -> PathBuf {
    PathBuf::from("cache/.throttle.json")
}

fn default_max_login_time() -> i64 {
    60 * 60
}

fn default_cookie_name() -> String {
    "SS_SESSION".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sign_in_quota() -> Quota {
    Quota::new(500, 60 * 60 * 24).with_burst(75)
}

fn default_register_quota() -> Quota {
    Quota::new(1, 60 * 60).with_burst(75)
}

fn default_memory_cost() -> u32 {
    19_456 // OWASP minimum for Argon2id
}

fn default_time_cost() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            throttle_store_path: default_throttle_store_path(),
            session: SessionConfig::default(),
            throttle: ThrottleConfig::default(),
            password: PasswordConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_login_time_secs: default_max_login_time(),
            cookie_name: default_cookie_name(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            sign_in: default_sign_in_quota(),
            register: default_register_quota(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
        }
    }
}

impl SessionConfig {
    /// Get the session sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// - `BIND_ADDR`
    /// - `THROTTLE_STORE_PATH`
    /// - `MAX_LOGIN_TIME` (seconds)
    /// - `SESSION_COOKIE`
    /// - `SIGN_IN_RATE`, `SIGN_IN_INTERVAL`, `SIGN_IN_BURST`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let sign_in = defaults.throttle.sign_in;

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            throttle_store_path: std::env::var("THROTTLE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.throttle_store_path),
            session: SessionConfig {
                max_login_time_secs: env_parse("MAX_LOGIN_TIME")
                    .unwrap_or(defaults.session.max_login_time_secs),
                cookie_name: std::env::var("SESSION_COOKIE")
                    .unwrap_or(defaults.session.cookie_name),
                ..defaults.session
            },
            throttle: ThrottleConfig {
                sign_in: Quota {
                    rate: env_parse("SIGN_IN_RATE").unwrap_or(sign_in.rate),
                    interval_secs: env_parse("SIGN_IN_INTERVAL").unwrap_or(sign_in.interval_secs),
                    burst_factor: env_parse("SIGN_IN_BURST").unwrap_or(sign_in.burst_factor),
                },
                ..defaults.throttle
            },
            password: defaults.password,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
