// ABOUTME: Core types and constants for the QToken protocol
// ABOUTME: Foundation crate with the error taxonomy and wire constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

#![deny(unsafe_code)]

//! # QToken Core
//!
//! Foundation crate shared by the token protocol implementation and its tools. It
//! changes rarely, which keeps incremental compilation of the main crate cheap.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode` and the validation error taxonomy
//! - **constants**: wire-format sizes, proof constants and protocol defaults

/// Unified error handling with stable error codes
pub mod errors;

/// Protocol constants organized by domain
pub mod constants;
