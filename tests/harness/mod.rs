// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for sign-in attack simulation.
//!
//! This module provides utilities for simulating credential attacks and
//! session hijack attempts against the authentication service.

#![allow(dead_code)]

pub mod attacks;
pub mod generators;
pub mod metrics;
