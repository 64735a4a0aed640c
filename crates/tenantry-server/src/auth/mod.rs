//! Client authentication
//!
//! - `challenge`: the per-connection nonce state machine and wire messages
//! - `authenticator`: checks a signed connect request against the trust chain
//! - `session`: the handle an authenticated client keeps until it leaves

pub mod authenticator;
pub mod challenge;
pub mod session;

pub use authenticator::{AuthOutcome, Authenticator};
pub use challenge::{
    generate_nonce, ChallengeError, ChallengeState, ConnectRequest, NonceChallenge, RejectReason,
    ServerChallenge,
};
pub use session::{ClientSession, DisconnectReason};
