// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Metrics collection for attack simulation results.

use std::collections::{HashMap, HashSet};

/// Collects metrics during attack simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    /// Count of requests by outcome
    outcomes: HashMap<Outcome, usize>,
    /// Count of requests by IP
    requests_per_ip: HashMap<String, usize>,
    /// Distinct error messages returned to the attacker
    messages: HashSet<String>,
    /// Largest retry hint seen
    max_retry_after: u64,
}

/// Possible outcomes for a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    SignedIn,
    InvalidCredentials,
    Throttled,
    MissingParams,
    Other,
}

impl AttackMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt outcome.
    pub fn record(&mut self, outcome: Outcome, ip: &str, message: Option<String>) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self.requests_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        if let Some(m) = message {
            self.messages.insert(m);
        }
    }

    /// Record a retry hint.
    pub fn record_retry(&mut self, retry_after: u64) {
        self.max_retry_after = self.max_retry_after.max(retry_after);
    }

    /// Get total request count.
    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    /// Get count for a specific outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Get block rate (throttled attempts over total).
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.count(Outcome::Throttled) as f64 / total as f64
    }

    /// Distinct messages the attacker saw for rejected credentials.
    pub fn distinct_messages(&self) -> usize {
        self.messages.len()
    }

    pub fn max_retry_after(&self) -> u64 {
        self.max_retry_after
    }

    /// Get number of unique IPs that made requests.
    pub fn unique_ips(&self) -> usize {
        self.requests_per_ip.len()
    }
}

impl std::fmt::Display for AttackMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Attack Metrics Report ===")?;
        writeln!(f, "Total Attempts:    {}", self.total_requests())?;
        writeln!(f, "Signed In:         {}", self.count(Outcome::SignedIn))?;
        writeln!(f, "Rejected:          {}", self.count(Outcome::InvalidCredentials))?;
        writeln!(f, "Throttled:         {}", self.count(Outcome::Throttled))?;
        writeln!(f, "Missing Params:    {}", self.count(Outcome::MissingParams))?;
        writeln!(f, "Block Rate:        {:.1}%", self.block_rate() * 100.0)?;
        writeln!(f, "Max Retry-After:   {} s", self.max_retry_after)?;
        writeln!(f, "Unique IPs:        {}", self.unique_ips())?;
        Ok(())
    }
}
