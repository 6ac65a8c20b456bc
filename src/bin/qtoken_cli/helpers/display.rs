// ABOUTME: Output formatting helpers for qtoken-cli
// ABOUTME: Consistent display of key sets, issued tokens and token contents
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use chrono::{DateTime, Utc};
use qtoken::crypto::hash::{is_bound, Hash32};
use qtoken::crypto::IssuerKeys;
use qtoken::token::{IssuedToken, QToken};
use std::path::Path;

fn binding_hex(hash: &Hash32) -> String {
    if is_bound(hash) {
        hex::encode(hash)
    } else {
        "unbound".to_owned()
    }
}

fn timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map_or_else(|| secs.to_string(), |t| t.to_rfc3339())
}

/// Summary of a generated key set
pub fn display_key_set(keys: &IssuerKeys, path: &Path, public_path: Option<&Path>) {
    println!("Issuer keys generated");
    println!("{}", "=".repeat(80));
    println!("   Key ID:      {}", keys.key_id_hex());
    println!("   Created:     {}", keys.created_at().to_rfc3339());
    println!("   Secret file: {}", path.display());
    if let Some(public_path) = public_path {
        println!("   Public file: {}", public_path.display());
    }
    println!("{}", "=".repeat(80));
    println!("Keep the secret file on the issuing server only.");
    println!("Resource servers need the public file (qtoken-cli export-public).");
}

/// Issued token and its identifiers
pub fn display_issued_token(issued: &IssuedToken) {
    println!("Token ID:      {}", issued.payload.jti);
    println!("Revocation ID: {}", issued.payload.rid);
    println!("Expires:       {}", timestamp(issued.payload.exp));
    println!();
    println!("{}", issued.token);
}

/// Header and binding of a parsed token
pub fn display_token_structure(token: &QToken, encoded_len: usize) {
    let header = &token.header;
    println!("Header");
    println!("   Version:     {}", header.version);
    println!("   Type:        {}", header.token_type);
    println!("   Key ID:      {}", hex::encode(header.key_id));
    println!("   Created:     {}", timestamp(header.created_at_ms / 1000));
    println!("Binding");
    println!("   Device key:  {}", binding_hex(&token.binding.device_key_hash));
    println!("   Client key:  {}", binding_hex(&token.binding.client_key_hash));
    println!("   Client IP:   {}", binding_hex(&token.binding.ip_hash));
    println!("Sizes");
    println!("   Encoded:     {encoded_len} chars");
    println!("   Payload:     {} bytes (encrypted)", token.encrypted_payload.len());
    println!("   Signature:   {} bytes", token.signature.len());
}
