// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate a pool of password guesses, none of which is correct.
pub fn generate_guesses(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("guess-{i:04}")).collect()
}

/// Generate usernames that do not exist.
pub fn generate_unknown_users(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("ghost-{i}")).collect()
}

/// User agents an attacker might replay a stolen cookie with.
pub fn generate_user_agents() -> Vec<&'static str> {
    vec![
        "curl/8.4.0",
        "python-requests/2.31.0",
        "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/119.0",
        "",
    ]
}

/// Identifier/password pairs that must be rejected before any lookup.
pub fn generate_empty_credentials() -> Vec<(&'static str, &'static str)> {
    vec![("", ""), ("", "password"), ("alice", ""), ("   ", "password")]
}
