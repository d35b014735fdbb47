use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilamentError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("unknown contract: {0}")]
    UnknownContract(String),

    #[error("function {0} not found in contract")]
    UnknownFunction(String),

    #[error("call transaction carries no contract address")]
    MissingContractAddress,

    // ── Runtime ──────────────────────────────────────────────────────────────
    #[error("contract compile error: {0}")]
    Compile(String),

    #[error("contract runtime error: {0}")]
    ContractRuntime(String),

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: f64, have: f64 },

    // ── Storage / serialization ──────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── General ──────────────────────────────────────────────────────────────
    #[error("{0}")]
    Internal(String),
}

impl FilamentError {
    /// Whether this error is the submitter's fault (maps to HTTP 400) rather
    /// than a node-side failure (HTTP 500).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FilamentError::InvalidSignature
                | FilamentError::InvalidNonce { .. }
                | FilamentError::NonPositiveAmount
                | FilamentError::UnknownContract(_)
                | FilamentError::UnknownFunction(_)
                | FilamentError::MissingContractAddress
                | FilamentError::Compile(_)
        )
    }
}
