//! Ed25519 key pairs with trust roles
//!
//! Every key in the trust hierarchy has a role that is visible in its
//! encoded form:
//! - `O...` operator keys (identity and delegated signing keys)
//! - `A...` account keys (identity and account signing keys)
//! - `U...` user keys
//!
//! Seeds are encoded as `S` + role prefix + base64url(seed).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenError};

const SEED_PREFIX: char = 'S';

/// Role of a key in the operator → account → user hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Operator,
    Account,
    User,
}

impl KeyRole {
    /// Prefix character used in encoded keys
    pub fn prefix(self) -> char {
        match self {
            KeyRole::Operator => 'O',
            KeyRole::Account => 'A',
            KeyRole::User => 'U',
        }
    }

    /// Look up a role by its prefix character
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'O' => Some(KeyRole::Operator),
            'A' => Some(KeyRole::Account),
            'U' => Some(KeyRole::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRole::Operator => write!(f, "operator"),
            KeyRole::Account => write!(f, "account"),
            KeyRole::User => write!(f, "user"),
        }
    }
}

fn decode_key_bytes(encoded: &str) -> Option<[u8; 32]> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    bytes.try_into().ok()
}

/// Ed25519 key pair bound to a role
#[derive(Clone)]
pub struct KeyPair {
    role: KeyRole,
    signing_key: SigningKey,
    public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("role", &self.role)
            .field("public_key", &self.public.as_str())
            .field("seed", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(role: KeyRole) -> Self {
        Self::from_signing_key(role, SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from raw seed bytes
    pub fn from_bytes(role: KeyRole, seed: &[u8; 32]) -> Self {
        Self::from_signing_key(role, SigningKey::from_bytes(seed))
    }

    /// Create a key pair from an encoded seed (`SO...`, `SA...`, `SU...`)
    pub fn from_seed(seed: &str) -> Result<Self> {
        let mut chars = seed.chars();
        if chars.next() != Some(SEED_PREFIX) {
            return Err(TokenError::InvalidSeed("missing seed prefix".into()));
        }
        let role = chars
            .next()
            .and_then(KeyRole::from_prefix)
            .ok_or_else(|| TokenError::InvalidSeed("unknown role prefix".into()))?;
        let bytes = decode_key_bytes(chars.as_str())
            .ok_or_else(|| TokenError::InvalidSeed("seed must be 32 base64url bytes".into()))?;
        Ok(Self::from_bytes(role, &bytes))
    }

    fn from_signing_key(role: KeyRole, signing_key: SigningKey) -> Self {
        let public = PublicKey::from_verifying_key(role, signing_key.verifying_key());
        Self {
            role,
            signing_key,
            public,
        }
    }

    /// Role of this key pair
    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Encoded public key
    pub fn public_key(&self) -> &str {
        self.public.as_str()
    }

    /// Parsed public key
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Encoded seed. Treat the result as secret material.
    pub fn seed(&self) -> String {
        format!(
            "{}{}{}",
            SEED_PREFIX,
            self.role.prefix(),
            URL_SAFE_NO_PAD.encode(self.signing_key.to_bytes())
        )
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// PKCS#8 encoding key for EdDSA JWT signing
    pub(crate) fn encoding_key(&self) -> Result<EncodingKey> {
        let der = self
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| TokenError::Crypto(format!("encode Ed25519 key: {}", e)))?;
        Ok(EncodingKey::from_ed_der(der.as_bytes()))
    }
}

/// Encoded Ed25519 public key with its role
#[derive(Clone)]
pub struct PublicKey {
    role: KeyRole,
    encoded: String,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.encoded).finish()
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for PublicKey {}

impl PublicKey {
    fn from_verifying_key(role: KeyRole, verifying_key: VerifyingKey) -> Self {
        let encoded = format!(
            "{}{}",
            role.prefix(),
            URL_SAFE_NO_PAD.encode(verifying_key.to_bytes())
        );
        Self {
            role,
            encoded,
            verifying_key,
        }
    }

    /// Parse an encoded public key of any role
    pub fn parse(encoded: &str) -> Result<Self> {
        let mut chars = encoded.chars();
        let role = chars
            .next()
            .and_then(KeyRole::from_prefix)
            .ok_or_else(|| TokenError::InvalidKey(format!("unknown role prefix in '{}'", encoded)))?;
        let bytes = decode_key_bytes(chars.as_str())
            .ok_or_else(|| TokenError::InvalidKey(format!("bad key encoding in '{}'", encoded)))?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)?;
        Ok(Self {
            role,
            encoded: encoded.to_string(),
            verifying_key,
        })
    }

    /// Parse an encoded public key and require a specific role
    pub fn parse_with_role(encoded: &str, role: KeyRole) -> Result<Self> {
        let key = Self::parse(encoded)?;
        if key.role != role {
            return Err(TokenError::RoleMismatch {
                expected: role,
                actual: key.role,
            });
        }
        Ok(key)
    }

    /// Role of this key
    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Encoded form
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a detached signature over `message`
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        self.verifying_key
            .verify(message, &Signature::from_bytes(&bytes))
            .is_ok()
    }

    /// EdDSA decoding key for JWT verification
    pub(crate) fn decoding_key(&self) -> Result<DecodingKey> {
        // The encoded form after the role prefix is exactly the JWK `x` value.
        Ok(DecodingKey::from_ed_components(&self.encoded[1..])?)
    }
}

/// Signing side of the nonce challenge
pub trait NonceSigner: Send + Sync {
    /// Encoded public key matching the signatures produced
    fn public_key(&self) -> String;

    /// Sign a server-issued nonce
    fn sign_nonce(&self, nonce: &[u8]) -> Result<Vec<u8>>;
}

impl NonceSigner for KeyPair {
    fn public_key(&self) -> String {
        self.public.as_str().to_string()
    }

    fn sign_nonce(&self, nonce: &[u8]) -> Result<Vec<u8>> {
        Ok(self.sign(nonce))
    }
}

/// Verification side of the signing primitive
///
/// Kept as a trait so tests can substitute a deterministic verifier.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true when `signature` over `message` verifies against `public_key`
    fn verify(&self, public_key: &str, message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 signature verifier over encoded public keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &str, message: &[u8], signature: &[u8]) -> bool {
        match PublicKey::parse(public_key) {
            Ok(key) => key.verify(message, signature),
            Err(_) => false,
        }
    }
}
