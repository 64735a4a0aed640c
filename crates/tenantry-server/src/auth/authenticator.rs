//! Connect-request verification
//!
//! A request passes when, in order:
//! 1. The user token decodes and its signature matches its issuer
//! 2. The user's account resolves under the current trusted keys
//! 3. The user token's issuer belongs to that account and is not revoked
//! 4. The nonce signature verifies against the user's public key

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::SignatureVerifier;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::accounts::{AccountRegistry, ClientHandle};
use crate::auth::challenge::{ConnectRequest, NonceChallenge, RejectReason};
use crate::auth::session::ClientSession;
use crate::error::TrustChainError;
use crate::trust::ChainValidator;

/// Result of one authentication attempt
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(ClientSession),
    Rejected(RejectReason),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated(_))
    }

    pub fn session(self) -> Option<ClientSession> {
        match self {
            AuthOutcome::Authenticated(session) => Some(session),
            AuthOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectReason> {
        match self {
            AuthOutcome::Authenticated(_) => None,
            AuthOutcome::Rejected(reason) => Some(reason),
        }
    }
}

/// Verifies connect requests and registers the resulting sessions
pub struct Authenticator {
    registry: Arc<AccountRegistry>,
    validator: ChainValidator,
    verifier: Arc<dyn SignatureVerifier>,
    next_client_id: AtomicU64,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("next_client_id", &self.next_client_id)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(
        registry: Arc<AccountRegistry>,
        validator: ChainValidator,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            registry,
            validator,
            verifier,
            next_client_id: AtomicU64::new(1),
        }
    }

    fn reject(&self, challenge: &mut NonceChallenge, reason: RejectReason) -> AuthOutcome {
        warn!(
            kind = reason.kind(),
            reason = %reason,
            "Authentication rejected"
        );
        challenge.reject(reason.clone());
        AuthOutcome::Rejected(reason)
    }

    /// Verify `request` against the nonce issued by `challenge`
    pub async fn authenticate(
        &self,
        challenge: &mut NonceChallenge,
        request: &ConnectRequest,
    ) -> AuthOutcome {
        let state = challenge.state();
        let nonce = match challenge.receive() {
            Ok(nonce) => nonce,
            Err(_) => return self.reject(challenge, RejectReason::InvalidState(state)),
        };

        if request.jwt.is_empty() || request.sig.is_empty() {
            return self.reject(challenge, RejectReason::MissingCredentials);
        }

        let claims = match self.validator.decode_user(&request.jwt) {
            Ok(claims) => claims,
            Err(e) => return self.reject(challenge, e.into()),
        };

        let account = match self.registry.lookup_account(claims.account()).await {
            Ok(account) => account,
            Err(e) => return self.reject(challenge, e.into()),
        };

        if let Err(e) = self.validator.authorize_user(&claims, &account) {
            return self.reject(challenge, e.into());
        }

        let verified = request
            .signature()
            .is_some_and(|sig| self.verifier.verify(&claims.sub, nonce.as_bytes(), &sig));
        if !verified {
            return self.reject(challenge, TrustChainError::BadSignature.into());
        }

        // Register before re-checking the registry so an eviction racing
        // with this attempt either drains us or is observed here.
        let (tx, rx) = oneshot::channel();
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        account.register_client(ClientHandle {
            id,
            user: claims.sub.clone(),
            disconnect: tx,
        });
        let session = ClientSession::new(id, claims.sub.clone(), account.clone(), rx);
        if !self.registry.is_current(&account) {
            drop(session);
            return self.reject(challenge, RejectReason::AccountEvicted);
        }

        if challenge.accept(&claims.sub).is_err() {
            return AuthOutcome::Rejected(RejectReason::InvalidState(challenge.state()));
        }
        info!(
            client = id,
            user = %claims.sub,
            account = %account.public_key(),
            "Client authenticated"
        );
        AuthOutcome::Authenticated(session)
    }

    /// Wait for the client's connect request, then authenticate it
    ///
    /// The whole exchange must finish within `timeout`. A `None` from
    /// `response` means the client went away before answering.
    pub async fn authenticate_with_timeout<F>(
        &self,
        challenge: &mut NonceChallenge,
        timeout: Duration,
        response: F,
    ) -> AuthOutcome
    where
        F: Future<Output = Option<ConnectRequest>>,
    {
        let attempt = tokio::time::timeout(timeout, async {
            let request = response.await?;
            Some(self.authenticate(challenge, &request).await)
        })
        .await;

        let reason = match attempt {
            Ok(Some(outcome)) => return outcome,
            Ok(None) => RejectReason::Cancelled,
            Err(_) => RejectReason::Timeout,
        };
        warn!(kind = reason.kind(), "Authentication abandoned");
        challenge.abandon(reason.clone());
        AuthOutcome::Rejected(reason)
    }
}
