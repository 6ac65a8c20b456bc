// ABOUTME: Configuration module for issuers, resource servers and the CLI
// ABOUTME: Environment-only settings with validated defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Configuration
//!
//! Everything is read from `QTOKEN_*` environment variables; there is no config file.
//! Unset variables take the protocol defaults, and malformed values fail with
//! `config-invalid` instead of being silently replaced.

/// Environment configuration
pub mod environment;

pub use environment::{PolicyConfig, ProofConfig, ProtocolConfig, RevocationConfig, TokenConfig};
