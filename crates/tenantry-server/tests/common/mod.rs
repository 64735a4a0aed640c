//! Shared fixtures for server integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use tenantry_core::{AccountClaims, KeyPair, KeyRole, OperatorClaims, UserClaims};
use tenantry_resolver::ResolverConfig;
use tenantry_server::{AuthOutcome, ConnectRequest, NonceChallenge, Server, ServerOptions};

/// Operator identity, its signing keys and its self-signed token
pub struct Operator {
    pub identity: KeyPair,
    pub signing_keys: Vec<KeyPair>,
    pub token: String,
}

impl Operator {
    pub fn new(signing_keys: usize) -> Self {
        let identity = KeyPair::generate(KeyRole::Operator);
        let signing_keys: Vec<KeyPair> = (0..signing_keys)
            .map(|_| KeyPair::generate(KeyRole::Operator))
            .collect();
        let mut claims = OperatorClaims::new(identity.public_key()).with_name("test-operator");
        for key in &signing_keys {
            claims = claims.with_signing_key(key.public_key());
        }
        let token = claims.encode(&identity).unwrap();
        Self {
            identity,
            signing_keys,
            token,
        }
    }

    /// Operator whose token expires at `exp`
    pub fn expiring(signing_keys: usize, exp: i64) -> Self {
        let mut op = Self::new(signing_keys);
        let mut claims = OperatorClaims::new(op.identity.public_key()).with_expiry(exp);
        for key in &op.signing_keys {
            claims = claims.with_signing_key(key.public_key());
        }
        op.token = claims.encode(&op.identity).unwrap();
        op
    }

    /// Self-signed token that also declares a system account
    pub fn with_system_account(signing_keys: usize, system_account: &str) -> Self {
        let mut op = Self::new(signing_keys);
        let mut claims = OperatorClaims::new(op.identity.public_key());
        claims.nats.system_account = Some(system_account.to_string());
        for key in &op.signing_keys {
            claims = claims.with_signing_key(key.public_key());
        }
        op.token = claims.encode(&op.identity).unwrap();
        op
    }
}

/// Account key pair and its token signed by `signer`
pub fn account(signer: &KeyPair) -> (KeyPair, String) {
    let akp = KeyPair::generate(KeyRole::Account);
    let token = AccountClaims::new(akp.public_key()).encode(signer).unwrap();
    (akp, token)
}

/// Account with one signing key
pub fn account_with_signing_key(signer: &KeyPair) -> (KeyPair, KeyPair, String) {
    let akp = KeyPair::generate(KeyRole::Account);
    let skp = KeyPair::generate(KeyRole::Account);
    let token = AccountClaims::new(akp.public_key())
        .with_signing_key(skp.public_key())
        .encode(signer)
        .unwrap();
    (akp, skp, token)
}

/// User key pair and its token signed by the account identity key
pub fn user(account: &KeyPair) -> (KeyPair, String) {
    let ukp = KeyPair::generate(KeyRole::User);
    let token = UserClaims::new(ukp.public_key()).encode(account).unwrap();
    (ukp, token)
}

/// Options trusting `operators` with a memory resolver
pub fn options(operators: &[&Operator]) -> ServerOptions {
    ServerOptions {
        server_name: Some("test-server".into()),
        trusted_operators: operators.iter().map(|op| op.token.clone()).collect(),
        resolver: Some(ResolverConfig::Memory),
        ..ServerOptions::default()
    }
}

pub fn preload(accounts: &[(&KeyPair, &str)]) -> HashMap<String, String> {
    accounts
        .iter()
        .map(|(akp, token)| (akp.public_key().to_string(), token.to_string()))
        .collect()
}

/// Full nonce exchange for one client
pub async fn connect(server: &Server, ukp: &KeyPair, jwt: &str) -> AuthOutcome {
    let mut challenge = NonceChallenge::new();
    let hello = server.issue_challenge(&mut challenge).unwrap();
    let request = ConnectRequest::signed(jwt, &hello.nonce, ukp).unwrap();
    server.authenticate(&mut challenge, &request).await
}
