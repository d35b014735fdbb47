pub mod constants;
pub mod error;
pub mod transaction;
pub mod types;

pub use error::FilamentError;
pub use transaction::{CallRecord, OperationType, Payload, Transaction, TransactionCreate, TxKind};
pub use types::{Address, Amount, ContractAddress, Nonce, Timestamp, TxId};
