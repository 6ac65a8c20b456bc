// ABOUTME: Key management commands for qtoken-cli
// ABOUTME: Generates issuer key files and exports verification material
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use crate::helpers::display::display_key_set;
use crate::helpers::files::write_json;
use qtoken::crypto::IssuerKeys;
use qtoken::errors::AppResult;
use std::path::Path;
use tracing::info;

/// Generate a new issuer key set
pub fn keygen(out: &Path, public_out: Option<&Path>, force: bool) -> AppResult<()> {
    let keys = IssuerKeys::generate();
    write_json(out, &keys.to_key_file(), force, true)?;
    if let Some(public_out) = public_out {
        write_json(public_out, &keys.verification_keys().to_key_file(), force, false)?;
    }
    info!(key_id = %keys.key_id_hex(), "Issuer key file written");
    display_key_set(&keys, out, public_out);
    Ok(())
}

/// Write the verification file for an existing issuer key file
pub fn export_public(keys: &Path, out: &Path, force: bool) -> AppResult<()> {
    let keys = IssuerKeys::load(keys)?;
    write_json(out, &keys.verification_keys().to_key_file(), force, false)?;
    println!(
        "Verification keys for {} written to {}",
        keys.key_id_hex(),
        out.display()
    );
    Ok(())
}
