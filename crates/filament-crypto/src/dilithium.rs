use filament_core::types::Address;
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::b64;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed secret key material")]
    MalformedSecretKey,
    #[error("invalid signature")]
    InvalidSignature,
}

/// Sign `message` with a Base64-encoded Dilithium2 secret key.
/// Returns the detached signature as Base64 text.
pub fn sign(message: &[u8], secret_key_b64: &str) -> Result<String, SignatureError> {
    let sk_bytes = Zeroizing::new(
        b64::decode(secret_key_b64).map_err(|_| SignatureError::MalformedSecretKey)?,
    );
    let sk = dilithium2::SecretKey::from_bytes(&sk_bytes)
        .map_err(|_| SignatureError::MalformedSecretKey)?;
    let sig = dilithium2::detached_sign(message, &sk);
    Ok(b64::encode(sig.as_bytes()))
}

/// Verify a Base64 Dilithium2 signature over `message` under the sender's
/// Base64 public key. Every decode or algorithmic failure reduces to `false`.
pub fn verify(message: &[u8], signature_b64: &str, public_key_b64: &str) -> bool {
    let Ok(pk_bytes) = b64::decode(public_key_b64) else {
        return false;
    };
    let Ok(sig_bytes) = b64::decode(signature_b64) else {
        return false;
    };
    let Ok(pk) = dilithium2::PublicKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Ok(sig) = dilithium2::DetachedSignature::from_bytes(&sig_bytes) else {
        return false;
    };
    dilithium2::verify_detached_signature(&sig, message, &pk).is_ok()
}

/// A Dilithium2 keypair for parties that actually sign transactions — the
/// genesis wallet above all. The secret key is wiped on drop.
#[derive(Clone)]
pub struct SigningKeyPair {
    pub public_key: String,
    secret_key: Zeroizing<Vec<u8>>,
}

impl SigningKeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        Self {
            public_key: b64::encode(pk.as_bytes()),
            secret_key: Zeroizing::new(sk.as_bytes().to_vec()),
        }
    }

    /// Restore a keypair from the Base64 forms (e.g. loaded from env vars).
    pub fn from_base64(public_key: String, secret_key_b64: &str) -> Result<Self, SignatureError> {
        let sk_bytes = Zeroizing::new(
            b64::decode(secret_key_b64).map_err(|_| SignatureError::MalformedSecretKey)?,
        );
        dilithium2::SecretKey::from_bytes(&sk_bytes)
            .map_err(|_| SignatureError::MalformedSecretKey)?;
        Ok(Self {
            public_key,
            secret_key: sk_bytes,
        })
    }

    /// The account address this keypair controls: its Base64 public key.
    pub fn address(&self) -> Address {
        Address(self.public_key.clone())
    }

    pub fn sign(&self, message: &[u8]) -> String {
        let sk = dilithium2::SecretKey::from_bytes(&self.secret_key)
            .expect("secret key validated at construction");
        let sig = dilithium2::detached_sign(message, &sk);
        b64::encode(sig.as_bytes())
    }

    /// The secret key in its Base64 wire form.
    pub fn secret_key_b64(&self) -> String {
        b64::encode(&self.secret_key)
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({}…)", &self.public_key[..12])
    }
}
