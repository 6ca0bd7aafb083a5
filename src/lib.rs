// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sketchspace Authentication
//!
//! Request throttling and session authentication for the Sketchspace
//! image board:
//!
//! - Token bucket throttling with a file-backed bucket store
//! - Sign-in throttled per caller address (500/day, burst 75x)
//! - Sessions bound to a connection fingerprint (address + user agent)
//! - Absolute session timeout
//! - Transparent password hash upgrades
//! - Registration with per-address throttling and single-use anti-CSRF tokens

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod password;
pub mod session;
pub mod store;
pub mod users;

pub use auth::{AuthenticationService, Registration};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{AuthError, Result};
pub use limiter::{Quota, RateLimiter, ThrottleError};
pub use session::{CallerIdentity, Session, SessionId, SessionRegistry, SessionState};
pub use store::{Bucket, BucketMap, BucketStore, FileBucketStore, MemoryBucketStore, StoreError};
pub use users::{MemoryUserDirectory, UserDirectory, UserRecord, UserRole};
