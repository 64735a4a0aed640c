//! Compact JWT encoding and verification
//!
//! Tokens are EdDSA-signed JWTs produced with `jsonwebtoken`. Verification is
//! two-step: the payload is first read without checking the signature to
//! learn the issuer, then verified against the key embedded in `iss`.
//! Temporal checks are left to callers so they can report the exact kind of
//! failure.

use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};

use crate::claims::{AccountClaims, ClaimBody, Claims, OperatorClaims, UserClaims};
use crate::error::{Result, TokenError};
use crate::keys::{KeyPair, PublicKey};

/// Decode/verify capability over the three claim types
///
/// Implementations verify the signature against the issuer named inside the
/// token and check the claim type. They do not check expiry.
pub trait ClaimsCodec: Send + Sync {
    /// Decode and verify an operator token
    fn decode_operator(&self, token: &str) -> Result<OperatorClaims>;

    /// Decode and verify an account token
    fn decode_account(&self, token: &str) -> Result<AccountClaims>;

    /// Decode and verify a user token
    fn decode_user(&self, token: &str) -> Result<UserClaims>;
}

/// EdDSA JWT codec backed by `jsonwebtoken`
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtCodec;

impl ClaimsCodec for JwtCodec {
    fn decode_operator(&self, token: &str) -> Result<OperatorClaims> {
        decode(token)
    }

    fn decode_account(&self, token: &str) -> Result<AccountClaims> {
        decode(token)
    }

    fn decode_user(&self, token: &str) -> Result<UserClaims> {
        decode(token)
    }
}

fn base_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation
}

/// Sign claims with `signer`
pub(crate) fn encode<T: ClaimBody>(claims: &Claims<T>, signer: &KeyPair) -> Result<String> {
    let header = Header::new(Algorithm::EdDSA);
    let key = signer.encoding_key()?;
    Ok(jsonwebtoken::encode(&header, claims, &key)?)
}

/// Read claims without verifying the signature
///
/// Only for routing decisions (finding the issuer); never trust the result.
pub fn decode_unverified<T: ClaimBody>(token: &str) -> Result<Claims<T>> {
    let mut validation = base_validation();
    validation.insecure_disable_signature_validation();

    let data = jsonwebtoken::decode::<Claims<T>>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    Ok(data.claims)
}

/// Decode claims and verify the signature against the embedded issuer
pub fn decode<T: ClaimBody>(token: &str) -> Result<Claims<T>> {
    let unverified = decode_unverified::<T>(token)?;
    if unverified.claim_type != T::CLAIM_TYPE {
        return Err(TokenError::UnexpectedType {
            expected: T::CLAIM_TYPE.to_string(),
            actual: unverified.claim_type.to_string(),
        });
    }

    let issuer = PublicKey::parse_with_role(&unverified.iss, T::ISSUER_ROLE)?;
    let data = jsonwebtoken::decode::<Claims<T>>(token, &issuer.decoding_key()?, &base_validation())?;
    Ok(data.claims)
}
