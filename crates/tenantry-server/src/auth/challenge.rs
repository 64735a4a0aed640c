//! Nonce challenge state machine
//!
//! ```text
//! AwaitingConnect --issue--> NonceSent --receive--> AwaitingSignature
//!                                                    |-- accept --> Authenticated
//!                                                    `-- reject --> Rejected
//! ```
//!
//! `abandon` moves any non-terminal state to `Rejected`; it is used when
//! the client disconnects, times out, or the attempt is cancelled.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tenantry_core::{NonceSigner, TokenError};
use thiserror::Error;

use crate::error::{ServerError, TrustChainError};

/// Random bytes per nonce
pub const NONCE_LEN: usize = 16;

/// Fresh nonce: `NONCE_LEN` bytes from the OS RNG, base64url without padding
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Challenge lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    AwaitingConnect,
    NonceSent,
    AwaitingSignature,
    Authenticated,
    Rejected,
}

impl ChallengeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChallengeState::Authenticated | ChallengeState::Rejected)
    }
}

/// Why an attempt ended in `Rejected`
///
/// Only logged server-side; peers always see [`RejectReason::client_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingCredentials,
    AccountNotFound(String),
    TrustChain(TrustChainError),
    ResolverUnavailable(String),
    OperatorModeDisabled,
    AccountEvicted,
    InvalidState(ChallengeState),
    Timeout,
    Cancelled,
}

impl RejectReason {
    /// Stable kind name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::MissingCredentials => "missing_credentials",
            RejectReason::AccountNotFound(_) => "account_not_found",
            RejectReason::TrustChain(err) => err.kind(),
            RejectReason::ResolverUnavailable(_) => "resolver_unavailable",
            RejectReason::OperatorModeDisabled => "operator_mode_disabled",
            RejectReason::AccountEvicted => "account_evicted",
            RejectReason::InvalidState(_) => "invalid_state",
            RejectReason::Timeout => "timeout",
            RejectReason::Cancelled => "cancelled",
        }
    }

    /// What the peer is told
    pub fn client_message(&self) -> &'static str {
        match self {
            RejectReason::Timeout => "Authentication Timeout",
            _ => "Authorization Violation",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AccountNotFound(key) => write!(f, "account {} not found", key),
            RejectReason::TrustChain(err) => write!(f, "{}", err),
            RejectReason::ResolverUnavailable(msg) => write!(f, "resolver unavailable: {}", msg),
            RejectReason::InvalidState(state) => write!(f, "connect received in state {:?}", state),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<TrustChainError> for RejectReason {
    fn from(err: TrustChainError) -> Self {
        RejectReason::TrustChain(err)
    }
}

impl From<ServerError> for RejectReason {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::TrustChain(err) => RejectReason::TrustChain(err),
            ServerError::AccountNotFound(key) => RejectReason::AccountNotFound(key),
            ServerError::OperatorModeDisabled => RejectReason::OperatorModeDisabled,
            other => RejectReason::ResolverUnavailable(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("Invalid challenge transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ChallengeState,
        to: ChallengeState,
    },
}

// =============================================================================
// Wire Messages
// =============================================================================

/// Sent by the server when the connection opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerChallenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    pub nonce: String,

    pub auth_required: bool,
}

/// Client answer: user token plus the nonce signed with the user's key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub jwt: String,

    /// base64url signature over the nonce bytes
    #[serde(default)]
    pub sig: String,
}

impl ConnectRequest {
    /// Sign `nonce` with the user's key
    pub fn signed(
        jwt: impl Into<String>,
        nonce: &str,
        signer: &dyn NonceSigner,
    ) -> Result<Self, TokenError> {
        let sig = signer.sign_nonce(nonce.as_bytes())?;
        Ok(Self {
            jwt: jwt.into(),
            sig: URL_SAFE_NO_PAD.encode(sig),
        })
    }

    /// Raw signature bytes; padded and standard alphabets are accepted too
    pub fn signature(&self) -> Option<Vec<u8>> {
        let trimmed = self.sig.trim_end_matches('=');
        URL_SAFE_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD.decode(&self.sig))
            .ok()
    }
}

// =============================================================================
// Challenge
// =============================================================================

/// One connection's authentication attempt
#[derive(Debug)]
pub struct NonceChallenge {
    state: ChallengeState,
    nonce: Option<String>,
    rejection: Option<RejectReason>,
    user: Option<String>,
}

impl Default for NonceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceChallenge {
    pub fn new() -> Self {
        Self {
            state: ChallengeState::AwaitingConnect,
            nonce: None,
            rejection: None,
            user: None,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn rejection(&self) -> Option<&RejectReason> {
        self.rejection.as_ref()
    }

    /// Authenticated user key
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn transition(&mut self, to: ChallengeState) -> Result<(), ChallengeError> {
        let allowed = matches!(
            (self.state, to),
            (ChallengeState::AwaitingConnect, ChallengeState::NonceSent)
                | (ChallengeState::NonceSent, ChallengeState::AwaitingSignature)
                | (ChallengeState::AwaitingSignature, ChallengeState::Authenticated)
                | (ChallengeState::AwaitingSignature, ChallengeState::Rejected)
        );
        if !allowed {
            return Err(ChallengeError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Generate the nonce and produce the opening message
    pub fn issue(&mut self, server_name: Option<String>) -> Result<ServerChallenge, ChallengeError> {
        self.transition(ChallengeState::NonceSent)?;
        let nonce = generate_nonce();
        self.nonce = Some(nonce.clone());
        Ok(ServerChallenge {
            server_name,
            nonce,
            auth_required: true,
        })
    }

    /// Record that the connect request arrived; returns the nonce to verify
    pub(crate) fn receive(&mut self) -> Result<String, ChallengeError> {
        self.transition(ChallengeState::AwaitingSignature)?;
        self.nonce.clone().ok_or(ChallengeError::InvalidTransition {
            from: ChallengeState::AwaitingConnect,
            to: ChallengeState::AwaitingSignature,
        })
    }

    pub(crate) fn accept(&mut self, user: &str) -> Result<(), ChallengeError> {
        self.transition(ChallengeState::Authenticated)?;
        self.user = Some(user.to_string());
        Ok(())
    }

    pub(crate) fn reject(&mut self, reason: RejectReason) {
        if self.transition(ChallengeState::Rejected).is_err() {
            self.abandon(reason);
            return;
        }
        self.rejection = Some(reason);
    }

    /// End a non-terminal attempt
    ///
    /// Returns `false` when the attempt had already finished.
    pub fn abandon(&mut self, reason: RejectReason) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = ChallengeState::Rejected;
        self.rejection = Some(reason);
        true
    }
}
