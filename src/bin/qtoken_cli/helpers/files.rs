// ABOUTME: Key file output for qtoken-cli
// ABOUTME: Refuses to overwrite without --force and restricts secret file permissions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use qtoken::errors::{AppError, AppResult};
use serde::Serialize;
use std::path::Path;
use zeroize::Zeroizing;

/// Write `value` as pretty JSON
pub fn write_json<T: Serialize>(path: &Path, value: &T, force: bool, secret: bool) -> AppResult<()> {
    if path.exists() && !force {
        return Err(AppError::config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let json = Zeroizing::new(serde_json::to_string_pretty(value)?);
    std::fs::write(path, json.as_bytes())
        .map_err(|e| AppError::internal(format!("cannot write {}: {e}", path.display())))?;

    #[cfg(unix)]
    if secret {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
            AppError::internal(format!("cannot restrict {}: {e}", path.display()))
        })?;
    }
    #[cfg(not(unix))]
    let _ = secret;

    Ok(())
}
