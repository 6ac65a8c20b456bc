// ABOUTME: Parsing of repeated key=value and hex hash arguments
// ABOUTME: Values that parse as JSON keep their type, anything else is a string
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use qtoken::crypto::Hash32;
use qtoken::errors::{AppError, AppResult};
use serde_json::Value;

/// Split `key=value`, parsing the value as JSON when possible
pub fn key_value(raw: &str) -> AppResult<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| AppError::config_invalid(format!("expected key=value, got '{raw}'")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::config_invalid(format!("empty key in '{raw}'")));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

/// Parse a 32-byte hash from hex
pub fn hash32(raw: &str, name: &str) -> AppResult<Hash32> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| AppError::config_invalid(format!("{name} is not hex: {e}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| AppError::config_invalid(format!("{name} must be 32 bytes")))
}
