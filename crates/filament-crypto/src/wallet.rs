use pqcrypto_kyber::kyber512;
use pqcrypto_traits::kem::{PublicKey, SecretKey};
use serde::Serialize;

use crate::b64;

/// Freshly generated wallet key material, Base64 on the wire. The public key
/// string doubles as the account address.
#[derive(Serialize)]
pub struct Wallet {
    pub public_key: String,
    pub private_key: String,
}

/// Generate a new post-quantum wallet from a Kyber-512 KEM keypair.
///
/// Kyber secret keys are not Dilithium2 signing keys, so a wallet produced
/// here cannot sign transactions until it is paired with signing material —
/// the same asymmetry the wire protocol has always had (see DESIGN.md).
pub fn generate_wallet() -> Wallet {
    let (pk, sk) = kyber512::keypair();
    Wallet {
        public_key: b64::encode(pk.as_bytes()),
        private_key: b64::encode(sk.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_kyber512_sized_material() {
        let wallet = generate_wallet();
        let pk = b64::decode(&wallet.public_key).unwrap();
        let sk = b64::decode(&wallet.private_key).unwrap();
        assert_eq!(pk.len(), kyber512::public_key_bytes());
        assert_eq!(sk.len(), kyber512::secret_key_bytes());
    }

    #[test]
    fn wallets_are_distinct() {
        let a = generate_wallet();
        let b = generate_wallet();
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn kyber_material_cannot_sign() {
        let wallet = generate_wallet();
        assert!(crate::dilithium::sign(b"msg", &wallet.private_key).is_err());
    }
}
