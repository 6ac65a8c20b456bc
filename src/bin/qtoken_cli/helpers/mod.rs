// ABOUTME: Helper modules for qtoken-cli
// ABOUTME: Argument parsing, key file output and display formatting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

pub mod args;
pub mod display;
pub mod files;
