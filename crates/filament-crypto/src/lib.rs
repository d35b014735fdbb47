pub mod b64;
pub mod dilithium;
pub mod wallet;

pub use b64::{decode, encode};
pub use dilithium::{sign, verify, SignatureError, SigningKeyPair};
pub use wallet::{generate_wallet, Wallet};
