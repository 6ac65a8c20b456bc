// ABOUTME: Command implementations for qtoken-cli
// ABOUTME: Key file, token and policy subcommands
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

pub mod keys;
pub mod policy;
pub mod token;
