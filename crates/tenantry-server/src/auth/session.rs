//! Authenticated client sessions

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use crate::accounts::Account;

/// Why the server terminated a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The account no longer passes trust validation
    AuthorizationViolation,
    ServerShutdown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::AuthorizationViolation => f.write_str("Authorization Violation"),
            DisconnectReason::ServerShutdown => f.write_str("Server Shutdown"),
        }
    }
}

/// A client bound to an account
///
/// Dropping the session deregisters it from the account.
#[derive(Debug)]
pub struct ClientSession {
    id: u64,
    user: String,
    account: Arc<Account>,
    disconnect: oneshot::Receiver<DisconnectReason>,
}

impl ClientSession {
    pub(crate) fn new(
        id: u64,
        user: String,
        account: Arc<Account>,
        disconnect: oneshot::Receiver<DisconnectReason>,
    ) -> Self {
        Self {
            id,
            user,
            account,
            disconnect,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// User public key
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    /// Wait until the server terminates this session
    pub async fn closed(&mut self) -> DisconnectReason {
        // A dropped sender means the account went away without notifying.
        (&mut self.disconnect)
            .await
            .unwrap_or(DisconnectReason::ServerShutdown)
    }

    /// Termination reason, if the server has already terminated the session
    pub fn try_closed(&mut self) -> Option<DisconnectReason> {
        match self.disconnect.try_recv() {
            Ok(reason) => Some(reason),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(DisconnectReason::ServerShutdown),
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.account.deregister_client(self.id).is_some() {
            debug!(client = self.id, account = %self.account.public_key(), "Client session closed");
        }
    }
}
