// ABOUTME: QToken CLI - key management, token issuance and offline inspection
// ABOUTME: Generates key files, issues and validates tokens, evaluates policy documents
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors
//!
//! Usage:
//! ```bash
//! # Generate issuer keys and the public file for resource servers
//! qtoken-cli keygen --out issuer.json
//! qtoken-cli export-public --keys issuer.json --out verify.json
//!
//! # Issue a token bound to a client key
//! qtoken-cli issue --keys issuer.json --subject alice \
//!     --issuer https://issuer.example --audience https://api.example \
//!     --policy urn:qtoken:policy:projects --client-key-hash <hex>
//!
//! # Look inside a token, then validate it like a resource server would
//! qtoken-cli inspect <token> --keys verify.json
//! qtoken-cli validate <token> --keys verify.json \
//!     --issuer https://issuer.example --audience https://api.example
//!
//! # Evaluate a policy document against a request context
//! qtoken-cli evaluate --policy policy.json --subject alice \
//!     --resource projects/apollo --action read --subject-attr role=admin
//! ```

mod commands;
mod helpers;

use clap::{Parser, Subcommand};
use qtoken::errors::AppResult;
use qtoken::logging::LoggingConfig;
use qtoken::token::TokenType;
use std::net::IpAddr;
use std::path::PathBuf;

type Result<T> = AppResult<T>;

#[derive(Parser)]
#[command(
    name = "qtoken-cli",
    about = "QToken key and token management CLI",
    long_about = "Command-line tool for generating issuer keys, issuing and inspecting QTokens, and evaluating policy documents."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum Command {
    /// Generate a new issuer key file
    Keygen {
        /// Output path for the secret issuer key file
        #[arg(long)]
        out: PathBuf,

        /// Also write the public verification file here
        #[arg(long)]
        public_out: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Write the verification key file for resource servers
    ExportPublic {
        /// Issuer key file
        #[arg(long)]
        keys: PathBuf,

        /// Output path
        #[arg(long)]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Issue a token
    Issue {
        /// Issuer key file
        #[arg(long, env = "QTOKEN_KEY_FILE")]
        keys: PathBuf,

        /// Token subject
        #[arg(long)]
        subject: String,

        /// Issuer URL
        #[arg(long, env = "QTOKEN_ISSUER")]
        issuer: String,

        /// Audience (repeatable)
        #[arg(long = "audience", required = true)]
        audiences: Vec<String>,

        /// Policy reference, `id` or `id@version`
        #[arg(long)]
        policy: String,

        /// Validity in seconds
        #[arg(long, env = "QTOKEN_TOKEN_VALIDITY_SECS")]
        validity: Option<u64>,

        /// Token type
        #[arg(long = "type", default_value = "access")]
        token_type: TokenType,

        /// Client key hash (hex) from the client's proof signer
        #[arg(long)]
        client_key_hash: Option<String>,

        /// Device key hash (hex)
        #[arg(long)]
        device_key_hash: Option<String>,

        /// Bind the token to this client IP
        #[arg(long)]
        client_ip: Option<IpAddr>,

        /// Seconds until the token becomes valid
        #[arg(long, default_value = "0")]
        not_before: u64,

        /// Custom claim `key=value` (repeatable; JSON values are parsed)
        #[arg(long = "claim")]
        claims: Vec<String>,
    },

    /// Decode a token's header and binding, and its claims when keys are given
    Inspect {
        /// Encoded token
        token: String,

        /// Verification key file for decrypting the claims
        #[arg(long)]
        keys: Option<PathBuf>,
    },

    /// Validate a token the way a resource server does
    Validate {
        /// Encoded token
        token: String,

        /// Verification key file
        #[arg(long, env = "QTOKEN_KEY_FILE")]
        keys: PathBuf,

        /// Expected issuer
        #[arg(long, env = "QTOKEN_ISSUER")]
        issuer: String,

        /// Expected audience
        #[arg(long, env = "QTOKEN_AUDIENCE")]
        audience: String,

        /// Treat this revocation id as revoked (repeatable)
        #[arg(long = "revoked")]
        revoked: Vec<String>,
    },

    /// Evaluate a policy document against a request context
    Evaluate {
        /// Policy document (JSON)
        #[arg(long)]
        policy: PathBuf,

        /// Subject id
        #[arg(long)]
        subject: String,

        /// Resource path
        #[arg(long)]
        resource: String,

        /// Action
        #[arg(long)]
        action: String,

        /// Subject attribute `key=value` (repeatable)
        #[arg(long = "subject-attr")]
        subject_attrs: Vec<String>,

        /// Context attribute `key=value` (repeatable)
        #[arg(long = "attr")]
        attrs: Vec<String>,

        /// Client IP
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Evaluation time, RFC 3339 (default now)
        #[arg(long)]
        at: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::for_cli();
    if cli.verbose {
        logging.level = "debug".to_owned();
    }
    // A second subscriber cannot be installed; logging stays best-effort here
    let _ = logging.init();

    match cli.command {
        Command::Keygen {
            out,
            public_out,
            force,
        } => commands::keys::keygen(&out, public_out.as_deref(), force),
        Command::ExportPublic { keys, out, force } => {
            commands::keys::export_public(&keys, &out, force)
        }
        Command::Issue {
            keys,
            subject,
            issuer,
            audiences,
            policy,
            validity,
            token_type,
            client_key_hash,
            device_key_hash,
            client_ip,
            not_before,
            claims,
        } => commands::token::issue(
            &keys,
            commands::token::IssueArgs {
                subject,
                issuer,
                audiences,
                policy,
                validity,
                token_type,
                client_key_hash,
                device_key_hash,
                client_ip,
                not_before,
                claims,
            },
        ),
        Command::Inspect { token, keys } => commands::token::inspect(&token, keys.as_deref()),
        Command::Validate {
            token,
            keys,
            issuer,
            audience,
            revoked,
        } => commands::token::validate(&token, &keys, issuer, audience, &revoked).await,
        Command::Evaluate {
            policy,
            subject,
            resource,
            action,
            subject_attrs,
            attrs,
            ip,
            at,
        } => {
            commands::policy::evaluate(commands::policy::EvaluateArgs {
                policy,
                subject,
                resource,
                action,
                subject_attrs,
                attrs,
                ip,
                at,
            })
            .await
        }
    }
}
