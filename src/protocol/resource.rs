// ABOUTME: Resource-server side of the protocol: token, proof and policy checks per request
// ABOUTME: Produces exactly one of authorized, rejected or denied for each request
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::{parse_authorization, AuthorizedRequest, ProtocolOutcome};
use crate::config::ProtocolConfig;
use crate::crypto::hash::{constant_time_eq, sha256};
use crate::crypto::VerificationKeys;
use crate::policy::{
    Decision, DeviceContext, EvaluationContext, MfaContext, PolicyEngine, SubjectContext,
};
use crate::proof::{NonceCache, ProofOfPossession, ProofRequest, ProofVerifier};
use crate::revocation::RevocationRegistry;
use crate::tasks::BackgroundTask;
use crate::token::{unix_now_ms, TokenValidator, ValidatedToken};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use qtoken_core::errors::{AppError, AppResult, ErrorCode};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::field::Empty;

/// One inbound request as the resource server sees it
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Request URI as signed by the client
    pub uri: &'a str,
    /// Request body
    pub body: Option<&'a [u8]>,
    /// Peer address
    pub client_ip: Option<IpAddr>,
    /// `Authorization` header value
    pub authorization: Option<&'a str>,
    /// Proof header value
    pub proof: Option<&'a str>,
    /// Device public key header value (base64url)
    pub device_key: Option<&'a str>,
    /// Resource being accessed
    pub resource: &'a str,
    /// Action requested
    pub action: &'a str,
    /// Context attributes for policy conditions
    pub attributes: Map<String, Value>,
    /// Device facts
    pub device: Option<DeviceContext>,
    /// MFA facts
    pub mfa: Option<MfaContext>,
}

impl<'a> AuthorizationRequest<'a> {
    /// Request for `action` on `resource` via `method uri`
    #[must_use]
    pub fn new(method: &'a str, uri: &'a str, resource: &'a str, action: &'a str) -> Self {
        Self {
            method,
            uri,
            resource,
            action,
            ..Self::default()
        }
    }

    /// Set the `Authorization` header value
    #[must_use]
    pub const fn with_authorization(mut self, value: &'a str) -> Self {
        self.authorization = Some(value);
        self
    }

    /// Set the proof header value
    #[must_use]
    pub const fn with_proof(mut self, value: &'a str) -> Self {
        self.proof = Some(value);
        self
    }

    /// Set the request body
    #[must_use]
    pub const fn with_body(mut self, body: &'a [u8]) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the peer address
    #[must_use]
    pub const fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Set the device key header value
    #[must_use]
    pub const fn with_device_key(mut self, value: &'a str) -> Self {
        self.device_key = Some(value);
        self
    }

    /// Add a context attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set device facts
    #[must_use]
    pub fn with_device(mut self, device: DeviceContext) -> Self {
        self.device = Some(device);
        self
    }

    /// Set MFA facts
    #[must_use]
    pub fn with_mfa(mut self, mfa: MfaContext) -> Self {
        self.mfa = Some(mfa);
        self
    }

    fn proof_request(&self) -> ProofRequest<'a> {
        ProofRequest {
            method: self.method,
            uri: self.uri,
            body: self.body,
            client_ip: self.client_ip,
        }
    }
}

/// Periodic maintenance a configured resource server relies on
///
/// Keep this alive as long as the server. Dropping it stops both tasks.
#[derive(Debug)]
pub struct ResourceTasks {
    /// Removes expired proof nonces
    pub nonce_purge: BackgroundTask,
    /// Rebuilds the revocation snapshot from the store
    pub revocation_refresh: BackgroundTask,
}

impl ResourceTasks {
    /// Stop both tasks and wait for them to exit
    pub async fn shutdown(self) {
        self.nonce_purge.shutdown().await;
        self.revocation_refresh.shutdown().await;
    }
}

/// Resource server
#[derive(Clone)]
pub struct ResourceServer {
    validator: TokenValidator,
    proofs: ProofVerifier,
    engine: Arc<PolicyEngine>,
    require_proof: bool,
}

impl ResourceServer {
    /// Resource server requiring a proof on every request
    #[must_use]
    pub const fn new(
        validator: TokenValidator,
        proofs: ProofVerifier,
        engine: Arc<PolicyEngine>,
    ) -> Self {
        Self {
            validator,
            proofs,
            engine,
            require_proof: true,
        }
    }

    /// Build a resource server from configuration and start its maintenance tasks
    ///
    /// The revocation registry is populated before this returns. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `config-error` if the issuer or audience is unset, or the registry's
    /// error if the first revocation snapshot cannot be loaded
    pub async fn from_config(
        config: &ProtocolConfig,
        keys: VerificationKeys,
    ) -> AppResult<(Self, ResourceTasks)> {
        let validator_config = config.token.validator_config()?;
        let registry = Arc::new(
            RevocationRegistry::initialize(config.revocation.store(), config.revocation.settings())
                .await?,
        );
        let nonces = Arc::new(NonceCache::new());
        let engine = Arc::new(PolicyEngine::with_cache_capacity(
            Arc::new(config.policy.store()),
            config.policy.decision_cache_size,
        ));

        let tasks = ResourceTasks {
            nonce_purge: nonces.spawn_purge_task(config.proof.purge_interval()),
            revocation_refresh: registry.spawn_refresh_task(),
        };
        let server = Self::new(
            TokenValidator::new(validator_config, keys, registry),
            ProofVerifier::new(config.proof.window_secs, nonces),
            engine,
        )
        .with_require_proof(config.proof.require_proof);
        Ok((server, tasks))
    }

    /// Whether a missing proof header rejects the request
    #[must_use]
    pub const fn with_require_proof(mut self, require_proof: bool) -> Self {
        self.require_proof = require_proof;
        self
    }

    /// Token validator
    #[must_use]
    pub const fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Proof verifier
    #[must_use]
    pub const fn proof_verifier(&self) -> &ProofVerifier {
        &self.proofs
    }

    /// Policy engine
    #[must_use]
    pub const fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Validate the token carried in an `Authorization` header value
    ///
    /// # Errors
    ///
    /// Returns `missing-token` or the validator's rejection code
    pub async fn validate_token(
        &self,
        authorization: Option<&str>,
        now_ms: u64,
    ) -> AppResult<ValidatedToken> {
        let token = parse_authorization(authorization)?;
        self.validator.validate_at(token, now_ms).await
    }

    /// Check the proof of possession and any device binding
    ///
    /// # Errors
    ///
    /// Returns `proof-missing` when required and absent, or a proof error code
    pub fn verify_proof(
        &self,
        token: &ValidatedToken,
        request: &AuthorizationRequest<'_>,
        now_ms: u64,
    ) -> AppResult<()> {
        match request.proof {
            Some(encoded) => {
                let proof = ProofOfPossession::decode(encoded)?;
                self.proofs
                    .verify_at(&proof, &request.proof_request(), token, now_ms)?;
            }
            None if self.require_proof => {
                return Err(AppError::from_code(ErrorCode::ProofMissing));
            }
            None => {}
        }
        verify_device_key(token, request.device_key)
    }

    /// Evaluate the token's policy for the request
    pub async fn evaluate(
        &self,
        token: &ValidatedToken,
        request: &AuthorizationRequest<'_>,
        now_ms: u64,
    ) -> Decision {
        let context = evaluation_context(token, request, now_ms);
        self.engine.evaluate(&token.payload.pol, &context).await
    }

    /// Run the full chain at the current time
    pub async fn authorize(&self, request: &AuthorizationRequest<'_>) -> ProtocolOutcome {
        self.authorize_at(request, unix_now_ms()).await
    }

    /// Run the full chain as of `now_ms`
    #[tracing::instrument(
        skip_all,
        fields(
            resource = %request.resource,
            action = %request.action,
            subject = Empty,
            outcome = Empty,
        )
    )]
    pub async fn authorize_at(
        &self,
        request: &AuthorizationRequest<'_>,
        now_ms: u64,
    ) -> ProtocolOutcome {
        let span = tracing::Span::current();

        let token = match self.validate_token(request.authorization, now_ms).await {
            Ok(token) => token,
            Err(error) => {
                span.record("outcome", error.code.as_str());
                return ProtocolOutcome::Rejected(error);
            }
        };
        span.record("subject", token.payload.sub.as_str());

        if let Err(error) = self.verify_proof(&token, request, now_ms) {
            span.record("outcome", error.code.as_str());
            return ProtocolOutcome::Rejected(error);
        }

        let decision = self.evaluate(&token, request, now_ms).await;
        if decision.is_allowed() {
            span.record("outcome", "authorized");
            ProtocolOutcome::Authorized(Box::new(AuthorizedRequest { token, decision }))
        } else {
            span.record("outcome", "denied");
            ProtocolOutcome::Denied(decision)
        }
    }
}

impl std::fmt::Debug for ResourceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceServer")
            .field("expected_issuer", &self.validator.config().expected_issuer)
            .field("expected_audience", &self.validator.config().expected_audience)
            .field("require_proof", &self.require_proof)
            .finish_non_exhaustive()
    }
}

fn verify_device_key(token: &ValidatedToken, device_key: Option<&str>) -> AppResult<()> {
    if !token.binding.has_device_key() {
        return Ok(());
    }
    let mismatch = || AppError::new(ErrorCode::ProofBindingMismatch, "device key does not match token");
    let public_key = device_key
        .and_then(|value| URL_SAFE_NO_PAD.decode(value.trim()).ok())
        .ok_or_else(mismatch)?;
    if constant_time_eq(&sha256(&public_key), &token.binding.device_key_hash) {
        Ok(())
    } else {
        Err(mismatch())
    }
}

fn evaluation_context(
    token: &ValidatedToken,
    request: &AuthorizationRequest<'_>,
    now_ms: u64,
) -> EvaluationContext {
    let time = i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let mut context = EvaluationContext {
        subject: SubjectContext {
            id: token.payload.sub.clone(),
            attributes: token.payload.custom_claims_json(),
        },
        resource: request.resource.to_owned(),
        action: request.action.to_owned(),
        attributes: request.attributes.clone(),
        ..EvaluationContext::default()
    }
    .at(time);
    context.environment.ip = request.client_ip;
    context.environment.device.clone_from(&request.device);
    context.environment.mfa.clone_from(&request.mfa);
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::IssuerKeys;
    use crate::policy::{Effect, PolicyDocument, PolicyStore};
    use crate::proof::{NonceCache, ProofSigner};
    use crate::revocation::{InMemoryRevocationStore, RevocationRegistry, RevocationSettings};
    use crate::token::{TokenBuilder, TokenRequest, ValidatorConfig};
    use serde_json::json;
    use std::sync::OnceLock;

    const ISSUER: &str = "https://issuer.example";
    const AUDIENCE: &str = "https://api.example";
    const POLICY: &str = "urn:qtoken:policy:projects";

    fn keys() -> Arc<IssuerKeys> {
        static KEYS: OnceLock<Arc<IssuerKeys>> = OnceLock::new();
        KEYS.get_or_init(|| Arc::new(IssuerKeys::generate())).clone()
    }

    async fn server() -> ResourceServer {
        let registry = RevocationRegistry::initialize(
            Arc::new(InMemoryRevocationStore::new()),
            RevocationSettings::default(),
        )
        .await
        .unwrap();
        let validator = TokenValidator::new(
            ValidatorConfig::new(ISSUER, AUDIENCE),
            keys().verification_keys(),
            Arc::new(registry),
        );
        let store = Arc::new(PolicyStore::new());
        let document: PolicyDocument = serde_json::from_value(json!({
            "id": POLICY, "version": 1, "issuer": ISSUER,
            "rules": [
                {"id": "read-projects", "effect": "allow", "resources": ["projects/*"], "actions": ["read"]},
                {"id": "admins-write", "effect": "allow", "resources": ["projects/*"], "actions": ["update"],
                 "conditions": [{"type": "attribute", "source": "subject", "key": "role", "op": "eq", "value": "admin"}]}
            ]
        }))
        .unwrap();
        store.load_policy(document).await.unwrap();
        ResourceServer::new(
            validator,
            ProofVerifier::new(60, Arc::new(NonceCache::new())),
            Arc::new(PolicyEngine::new(store)),
        )
    }

    fn issue(client: &ProofSigner, role: &str) -> String {
        let request = TokenRequest::new("alice", ISSUER, vec![AUDIENCE.to_owned()], POLICY)
            .with_client_key_hash(client.client_key_hash())
            .with_claim("role", role);
        TokenBuilder::new(keys()).build(&request).unwrap().token
    }

    #[tokio::test]
    async fn test_full_chain_outcomes() {
        let server = server().await;
        let client = ProofSigner::generate();
        let token = issue(&client, "viewer");
        let authorization = format!("QToken {token}");
        let now = unix_now_ms();

        let proof = client
            .sign_request_at("GET", "/projects/apollo", None, &token, now)
            .unwrap()
            .encode()
            .unwrap();
        let request = AuthorizationRequest::new("GET", "/projects/apollo", "projects/apollo", "read")
            .with_authorization(&authorization)
            .with_proof(&proof);
        let outcome = server.authorize_at(&request, now).await;
        assert!(outcome.is_authorized(), "{outcome:?}");

        let proof = client
            .sign_request_at("PUT", "/projects/apollo", None, &token, now)
            .unwrap()
            .encode()
            .unwrap();
        let request = AuthorizationRequest::new("PUT", "/projects/apollo", "projects/apollo", "update")
            .with_authorization(&authorization)
            .with_proof(&proof);
        match server.authorize_at(&request, now).await {
            ProtocolOutcome::Denied(decision) => assert_eq!(decision.effect, Effect::Deny),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_configured_server_purges_expired_nonces() {
        let mut config = ProtocolConfig::default();
        config.token.issuer = Some(ISSUER.into());
        config.token.audience = Some(AUDIENCE.into());
        config.proof.nonce_purge_interval_secs = 1;
        let (server, tasks) = ResourceServer::from_config(&config, keys().verification_keys())
            .await
            .unwrap();

        let nonces = server.proof_verifier().nonce_cache();
        let expired = unix_now_ms().saturating_sub(1_000);
        assert!(nonces.record("old-a", expired, expired));
        assert!(nonces.record("old-b", expired, expired));
        assert!(nonces.record("live", u64::MAX, expired));
        assert_eq!(nonces.len(), 3);

        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert_eq!(nonces.len(), 1);
        assert!(nonces.contains("live", unix_now_ms()));
        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_from_config_requires_issuer_and_audience() {
        let config = ProtocolConfig::default();
        let error = ResourceServer::from_config(&config, keys().verification_keys())
            .await
            .err()
            .unwrap();
        assert_eq!(error.code, ErrorCode::ConfigError);
    }

    #[tokio::test]
    async fn test_missing_proof_is_distinct_from_token_rejection() {
        let server = server().await;
        let client = ProofSigner::generate();
        let token = issue(&client, "viewer");
        let authorization = format!("QToken {token}");

        let request = AuthorizationRequest::new("GET", "/projects/a", "projects/a", "read")
            .with_authorization(&authorization);
        let outcome = server.authorize(&request).await;
        assert_eq!(outcome.rejection_code(), Some(ErrorCode::ProofMissing));

        let request = AuthorizationRequest::new("GET", "/projects/a", "projects/a", "read");
        let outcome = server.authorize(&request).await;
        assert_eq!(outcome.rejection_code(), Some(ErrorCode::MissingToken));
    }

    #[tokio::test]
    async fn test_device_binding_requires_matching_key() {
        let server = server().await;
        let client = ProofSigner::generate();
        let device_public = [9u8; 32];
        let request = TokenRequest::new("alice", ISSUER, vec![AUDIENCE.to_owned()], POLICY)
            .with_client_key_hash(client.client_key_hash())
            .with_device_key_hash(sha256(&device_public));
        let token = TokenBuilder::new(keys()).build(&request).unwrap().token;
        let validated = server
            .validate_token(Some(&format!("QToken {token}")), unix_now_ms())
            .await
            .unwrap();

        let good = URL_SAFE_NO_PAD.encode(device_public);
        assert!(verify_device_key(&validated, Some(&good)).is_ok());
        let wrong = URL_SAFE_NO_PAD.encode([1u8; 32]);
        assert_eq!(
            verify_device_key(&validated, Some(&wrong)).unwrap_err().code,
            ErrorCode::ProofBindingMismatch
        );
        assert!(verify_device_key(&validated, None).is_err());
    }
}
