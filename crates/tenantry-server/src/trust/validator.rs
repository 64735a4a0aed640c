//! Chain validation for account and user tokens
//!
//! Enforces the operator → account → user delegation chain:
//! - An account token must carry a valid signature by a trusted key
//! - A user token must be signed by its account's identity or signing key
//! - Neither may be expired, not yet valid, or (for users) revoked

use std::sync::Arc;
use tenantry_core::{unix_now, AccountClaims, ClaimsCodec, JwtCodec, UserClaims};
use tracing::warn;

use crate::accounts::Account;
use crate::error::TrustChainError;
use crate::trust::store::TrustedKeySet;

/// Validates tokens against the trust hierarchy
#[derive(Clone)]
pub struct ChainValidator {
    codec: Arc<dyn ClaimsCodec>,
}

impl std::fmt::Debug for ChainValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainValidator").finish_non_exhaustive()
    }
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::new(Arc::new(JwtCodec))
    }
}

impl ChainValidator {
    pub fn new(codec: Arc<dyn ClaimsCodec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &dyn ClaimsCodec {
        self.codec.as_ref()
    }

    /// Validate an account token
    ///
    /// When `expected` is given, the token's subject must equal it; a
    /// resolver answering with another account's token is malformed.
    pub fn validate_account(
        &self,
        token: &str,
        trusted: &TrustedKeySet,
        expected: Option<&str>,
    ) -> Result<AccountClaims, TrustChainError> {
        let claims = self.codec.decode_account(token).map_err(|e| {
            let err = TrustChainError::from(e);
            warn!(account = ?expected, kind = err.kind(), error = %err, "Account token rejected");
            err
        })?;

        if let Some(expected) = expected {
            if claims.sub != expected {
                warn!(
                    expected = %expected,
                    subject = %claims.sub,
                    "Account token subject mismatch"
                );
                return Err(TrustChainError::Malformed(format!(
                    "token subject {} does not match account {}",
                    claims.sub, expected
                )));
            }
        }

        if !trusted.contains(&claims.iss) {
            warn!(
                account = %claims.sub,
                issuer = %claims.iss,
                "SECURITY: Account token issued by untrusted operator"
            );
            return Err(TrustChainError::UnknownIssuer(claims.iss));
        }

        let now = unix_now();
        if let Some(exp) = trusted.expired_operator(&claims.iss, now) {
            warn!(
                account = %claims.sub,
                issuer = %claims.iss,
                expired_at = exp,
                "Account token issued by expired operator"
            );
            return Err(TrustChainError::Expired(exp));
        }

        claims.validate_temporal(now).map_err(|e| {
            let err = TrustChainError::from(e);
            warn!(account = %claims.sub, kind = err.kind(), "Account token outside validity window");
            err
        })?;

        Ok(claims)
    }

    /// Decode a user token and verify its signature against its issuer
    pub fn decode_user(&self, token: &str) -> Result<UserClaims, TrustChainError> {
        self.codec
            .decode_user(token)
            .map_err(TrustChainError::from)
    }

    /// Check a decoded user against the account it claims to belong to
    pub fn authorize_user(
        &self,
        claims: &UserClaims,
        account: &Account,
    ) -> Result<(), TrustChainError> {
        if claims.account() != account.public_key() {
            return Err(TrustChainError::Malformed(format!(
                "user {} belongs to {}, not {}",
                claims.sub,
                claims.account(),
                account.public_key()
            )));
        }

        let now = unix_now();
        account.validate_temporal(now)?;

        // A token naming an issuer account must come from one of its
        // signing keys, never from an unrelated account identity.
        let issuer_ok = match &claims.nats.issuer_account {
            Some(_) => account.has_signing_key(&claims.iss),
            None => claims.iss == account.public_key() || account.has_signing_key(&claims.iss),
        };
        if !issuer_ok {
            return Err(TrustChainError::UnknownIssuer(claims.iss.clone()));
        }

        claims.validate_temporal(now)?;

        if account.is_revoked(&claims.sub, claims.iat) {
            return Err(TrustChainError::Revoked(claims.sub.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::{KeyPair, KeyRole, OperatorClaims};

    fn trusted(okp: &KeyPair) -> TrustedKeySet {
        TrustedKeySet::load(&[OperatorClaims::new(okp.public_key())]).unwrap()
    }

    fn account_with(okp: &KeyPair, claims: AccountClaims) -> Account {
        let token = claims.encode(okp).unwrap();
        let claims = ChainValidator::default()
            .validate_account(&token, &trusted(okp), None)
            .unwrap();
        Account::new(token, claims)
    }

    #[test]
    fn test_account_signed_by_trusted_operator() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let token = AccountClaims::new(akp.public_key()).encode(&okp).unwrap();

        let claims = ChainValidator::default()
            .validate_account(&token, &trusted(&okp), Some(akp.public_key()))
            .unwrap();
        assert_eq!(claims.sub, akp.public_key());
    }

    #[test]
    fn test_account_from_foreign_operator() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let foreign = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let token = AccountClaims::new(akp.public_key()).encode(&foreign).unwrap();

        let err = ChainValidator::default()
            .validate_account(&token, &trusted(&okp), None)
            .unwrap_err();
        assert_eq!(err, TrustChainError::UnknownIssuer(foreign.public_key().to_string()));
    }

    #[test]
    fn test_account_subject_mismatch() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let token = AccountClaims::new(akp.public_key()).encode(&okp).unwrap();
        let other = KeyPair::generate(KeyRole::Account);

        let err = ChainValidator::default()
            .validate_account(&token, &trusted(&okp), Some(other.public_key()))
            .unwrap_err();
        assert!(matches!(err, TrustChainError::Malformed(_)));
    }

    #[test]
    fn test_expired_account() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let token = AccountClaims::new(akp.public_key())
            .with_expiry(unix_now() - 10)
            .encode(&okp)
            .unwrap();

        let err = ChainValidator::default()
            .validate_account(&token, &trusted(&okp), None)
            .unwrap_err();
        assert!(matches!(err, TrustChainError::Expired(_)));
    }

    #[test]
    fn test_account_from_expired_operator() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let skp = KeyPair::generate(KeyRole::Operator);
        let expired_at = unix_now() - 10;
        let trusted = TrustedKeySet::load(&[OperatorClaims::new(okp.public_key())
            .with_signing_key(skp.public_key())
            .with_expiry(expired_at)])
        .unwrap();

        let akp = KeyPair::generate(KeyRole::Account);
        let token = AccountClaims::new(akp.public_key()).encode(&skp).unwrap();
        let err = ChainValidator::default()
            .validate_account(&token, &trusted, Some(akp.public_key()))
            .unwrap_err();
        assert_eq!(err, TrustChainError::Expired(expired_at));
    }

    #[test]
    fn test_user_of_expired_account() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let expired_at = unix_now() - 10;
        let token = AccountClaims::new(akp.public_key())
            .with_expiry(expired_at)
            .encode(&okp)
            .unwrap();
        let account = Account::new(token.clone(), JwtCodec.decode_account(&token).unwrap());

        let ukp = KeyPair::generate(KeyRole::User);
        let utoken = UserClaims::new(ukp.public_key()).encode(&akp).unwrap();
        let validator = ChainValidator::default();
        let claims = validator.decode_user(&utoken).unwrap();
        assert_eq!(
            validator.authorize_user(&claims, &account),
            Err(TrustChainError::Expired(expired_at))
        );
    }

    #[test]
    fn test_user_signed_by_account_signing_key() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let skp = KeyPair::generate(KeyRole::Account);
        let account = account_with(
            &okp,
            AccountClaims::new(akp.public_key()).with_signing_key(skp.public_key()),
        );

        let ukp = KeyPair::generate(KeyRole::User);
        let token = UserClaims::new(ukp.public_key())
            .with_issuer_account(akp.public_key())
            .encode(&skp)
            .unwrap();

        let validator = ChainValidator::default();
        let claims = validator.decode_user(&token).unwrap();
        assert!(validator.authorize_user(&claims, &account).is_ok());
    }

    #[test]
    fn test_user_from_unrelated_account_key() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let account = account_with(&okp, AccountClaims::new(akp.public_key()));

        let rogue = KeyPair::generate(KeyRole::Account);
        let ukp = KeyPair::generate(KeyRole::User);
        let token = UserClaims::new(ukp.public_key())
            .with_issuer_account(akp.public_key())
            .encode(&rogue)
            .unwrap();

        let validator = ChainValidator::default();
        let claims = validator.decode_user(&token).unwrap();
        assert_eq!(
            validator.authorize_user(&claims, &account),
            Err(TrustChainError::UnknownIssuer(rogue.public_key().to_string()))
        );
    }

    #[test]
    fn test_revoked_user() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let akp = KeyPair::generate(KeyRole::Account);
        let ukp = KeyPair::generate(KeyRole::User);
        let account = account_with(
            &okp,
            AccountClaims::new(akp.public_key()).revoke_user(ukp.public_key(), unix_now() + 60),
        );

        let token = UserClaims::new(ukp.public_key()).encode(&akp).unwrap();
        let validator = ChainValidator::default();
        let claims = validator.decode_user(&token).unwrap();
        assert_eq!(
            validator.authorize_user(&claims, &account),
            Err(TrustChainError::Revoked(ukp.public_key().to_string()))
        );
    }
}
