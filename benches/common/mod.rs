// ABOUTME: Common benchmark utilities and fixtures for performance testing
// ABOUTME: Provides shared issuer keys, registries and policy documents for Criterion benchmarks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Common benchmark utilities and fixtures.

pub mod fixtures;
