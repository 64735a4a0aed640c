//! Reload integration tests
//!
//! Atomic trust swaps, account re-validation and disconnect delivery.

mod common;

use common::{account, connect, options, preload, user, Operator};
use std::sync::Arc;
use std::time::Duration;
use tenantry_resolver::AccountResolver;
use tenantry_server::{
    ClusterOptions, ConfigError, DisconnectReason, Server, ServerError, StaticOptionsSource,
    StaticUser, TrustChainError,
};

#[tokio::test]
async fn test_nonce_still_required_after_reload() {
    let op = Operator::new(0);
    let server = Server::new(options(&[&op])).unwrap();
    assert!(server.nonce_required());

    server.reload_with(options(&[&op])).await.unwrap();
    assert!(server.nonce_required());
}

#[tokio::test]
async fn test_reload_preserves_accounts() {
    let op = Operator::new(0);
    let (akp, token) = account(&op.identity);
    let mut opts = options(&[&op]);
    opts.resolver_preload = preload(&[(&akp, &token)]);
    opts.cluster = Some(ClusterOptions {
        name: Some("c1".into()),
        listen: None,
        routes: Vec::new(),
        auth_timeout_ms: 2000,
    });
    let server = Server::new(opts.clone()).unwrap();

    let before = server.lookup_account(akp.public_key()).await.unwrap();
    let (ukp, ujwt) = user(&akp);
    let mut session = connect(&server, &ukp, &ujwt).await.session().unwrap();

    let mut next = opts;
    if let Some(cluster) = next.cluster.as_mut() {
        cluster.auth_timeout_ms = 500;
    }
    let report = server.reload_with(next).await.unwrap();

    assert_eq!(report.retained, vec![akp.public_key().to_string()]);
    assert!(report.evicted.is_empty());
    assert_eq!(report.disconnected, 0);
    let after = server.lookup_account(akp.public_key()).await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.client_count(), 1);
    assert_eq!(session.try_closed(), None);
}

#[tokio::test]
async fn test_reload_with_bound_options() {
    let op = Operator::new(2);
    let server = Server::new(options(&[&op])).unwrap();

    let report = server.reload_with(server.options()).await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(server.trusted_keys().len(), 3);
}

#[tokio::test]
async fn test_reload_disconnects_removed_account() {
    let op = Operator::new(0);
    let (old_kp, old_token) = account(&op.identity);
    let (new_kp, new_token) = account(&op.identity);

    let mut opts = options(&[&op]);
    opts.resolver_preload = preload(&[(&old_kp, &old_token)]);
    let server = Server::new(opts).unwrap();

    let (ukp, ujwt) = user(&old_kp);
    let mut session = connect(&server, &ukp, &ujwt).await.session().unwrap();

    let mut next = options(&[&op]);
    next.resolver_preload = preload(&[(&new_kp, &new_token)]);
    let report = server.reload_with(next).await.unwrap();
    assert_eq!(report.evicted, vec![old_kp.public_key().to_string()]);
    assert_eq!(report.disconnected, 1);

    let reason = tokio::time::timeout(Duration::from_secs(2), session.closed())
        .await
        .expect("client should be disconnected within 2s");
    assert_eq!(reason, DisconnectReason::AuthorizationViolation);
    assert_eq!(reason.to_string(), "Authorization Violation");

    assert!(matches!(
        server.lookup_account(old_kp.public_key()).await,
        Err(ServerError::AccountNotFound(_))
    ));
    assert!(server.lookup_account(new_kp.public_key()).await.is_ok());
}

#[tokio::test]
async fn test_reload_refreshes_changed_token() {
    let op = Operator::new(1);
    let (akp, token) = account(&op.identity);
    let mut opts = options(&[&op]);
    opts.resolver_preload = preload(&[(&akp, &token)]);
    let server = Server::new(opts).unwrap();
    let cached = server.lookup_account(akp.public_key()).await.unwrap();

    // Re-issued by the operator's signing key.
    let reissued = tenantry_core::AccountClaims::new(akp.public_key())
        .with_name("renamed")
        .encode(&op.signing_keys[0])
        .unwrap();
    let mut next = options(&[&op]);
    next.resolver_preload = preload(&[(&akp, &reissued)]);
    let report = server.reload_with(next).await.unwrap();

    assert_eq!(report.refreshed, vec![akp.public_key().to_string()]);
    assert_eq!(cached.name(), "renamed");
    assert_eq!(cached.issuer(), op.signing_keys[0].public_key());
}

#[tokio::test]
async fn test_reload_removing_operator_evicts_its_accounts() {
    let kept = Operator::new(0);
    let dropped = Operator::new(0);
    let (kept_kp, kept_token) = account(&kept.identity);
    let (dropped_kp, dropped_token) = account(&dropped.identity);

    let accounts = preload(&[(&kept_kp, &kept_token), (&dropped_kp, &dropped_token)]);
    let mut opts = options(&[&kept, &dropped]);
    opts.resolver_preload = accounts.clone();
    let server = Server::new(opts).unwrap();
    server.lookup_account(kept_kp.public_key()).await.unwrap();
    server.lookup_account(dropped_kp.public_key()).await.unwrap();

    let (ukp, ujwt) = user(&dropped_kp);
    let mut session = connect(&server, &ukp, &ujwt).await.session().unwrap();

    let mut next = options(&[&kept]);
    next.resolver_preload = accounts;
    let report = server.reload_with(next).await.unwrap();

    assert_eq!(report.retained, vec![kept_kp.public_key().to_string()]);
    assert_eq!(report.evicted, vec![dropped_kp.public_key().to_string()]);
    assert_eq!(session.closed().await, DisconnectReason::AuthorizationViolation);
    assert!(matches!(
        server.lookup_account(dropped_kp.public_key()).await,
        Err(ServerError::TrustChain(TrustChainError::UnknownIssuer(_)))
    ));
}

#[tokio::test]
async fn test_invalid_reload_changes_nothing() {
    let op = Operator::new(0);
    let (akp, token) = account(&op.identity);
    let mut opts = options(&[&op]);
    opts.resolver_preload = preload(&[(&akp, &token)]);
    let server = Server::new(opts.clone()).unwrap();
    server.lookup_account(akp.public_key()).await.unwrap();

    let mut bad = opts;
    bad.users.push(StaticUser {
        username: "derek".into(),
        password: None,
        account: None,
    });
    assert_eq!(
        server.reload_with(bad).await.unwrap_err(),
        ServerError::Config(ConfigError::StaticUsers)
    );

    assert_eq!(server.info().generation, 0);
    assert!(server.nonce_required());
    assert!(server.options().users.is_empty());
    assert_eq!(server.accounts().len(), 1);
}

#[tokio::test]
async fn test_reload_drops_system_account_when_evicted() {
    let op = Operator::new(0);
    let (akp, token) = account(&op.identity);
    let mut opts = options(&[&op]);
    opts.resolver_preload = preload(&[(&akp, &token)]);
    let server = Server::new(opts).unwrap();
    server.set_system_account(akp.public_key()).await.unwrap();

    let report = server.reload_with(options(&[&op])).await.unwrap();
    assert_eq!(report.evicted, vec![akp.public_key().to_string()]);
    assert!(report.system_account.is_none());
    assert!(server.system_account().is_none());
}

#[tokio::test]
async fn test_reload_memory_resolver_drops_runtime_stores() {
    let op = Operator::new(0);
    let server = Server::new(options(&[&op])).unwrap();
    let (akp, token) = account(&op.identity);
    server
        .account_resolver()
        .unwrap()
        .store(akp.public_key(), &token)
        .await
        .unwrap();

    server.reload_with(options(&[&op])).await.unwrap();
    assert!(server
        .account_resolver()
        .unwrap()
        .fetch(akp.public_key())
        .await
        .is_err());
}

#[tokio::test]
async fn test_reload_reads_options_source() {
    let op = Operator::new(0);
    let (akp, token) = account(&op.identity);
    let source = Arc::new(StaticOptionsSource::new(options(&[&op])));
    let server = Server::builder(options(&[&op]))
        .options_source(source.clone())
        .build()
        .unwrap();
    assert!(server.lookup_account(akp.public_key()).await.is_err());

    let mut next = options(&[&op]);
    next.resolver_preload = preload(&[(&akp, &token)]);
    source.replace(next);
    server.reload().await.unwrap();

    assert!(server.lookup_account(akp.public_key()).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_reloads_serialize() {
    let op = Operator::new(0);
    let server = Arc::new(Server::new(options(&[&op])).unwrap());

    let first = {
        let server = server.clone();
        let opts = options(&[&op]);
        tokio::spawn(async move { server.reload_with(opts).await })
    };
    let second = {
        let server = server.clone();
        let opts = options(&[&op]);
        tokio::spawn(async move { server.reload_with(opts).await })
    };

    let mut generations = vec![
        first.await.unwrap().unwrap().generation,
        second.await.unwrap().unwrap().generation,
    ];
    generations.sort();
    assert_eq!(generations, vec![1, 2]);
    assert_eq!(server.info().generation, 2);
}
