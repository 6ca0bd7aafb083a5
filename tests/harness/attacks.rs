// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Attack simulation patterns for security testing.

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of sign-in attempts
    pub total_requests: usize,
    /// Number of unique source addresses
    pub unique_ips: usize,
    /// Simulated seconds between attempts
    pub seconds_between: i64,
    /// Target an existing account (otherwise unknown usernames)
    pub target_existing: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            seconds_between: 0,
            target_existing: true,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Password guessing against one account from one address.
    pub fn brute_force() -> Self {
        Self {
            total_requests: 60,
            ..Default::default()
        }
    }

    /// Guessing spread across many addresses.
    pub fn distributed_brute_force() -> Self {
        Self {
            total_requests: 120,
            unique_ips: 40,
            ..Default::default()
        }
    }

    /// Probing for account existence with unknown usernames.
    pub fn account_enumeration() -> Self {
        Self {
            total_requests: 40,
            target_existing: false,
            ..Default::default()
        }
    }

    /// Guessing slowly enough to stay under the refill rate.
    pub fn slow_drip() -> Self {
        Self {
            total_requests: 30,
            seconds_between: 60,
            ..Default::default()
        }
    }
}
