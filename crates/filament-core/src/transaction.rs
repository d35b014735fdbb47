use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Address, Amount, ContractAddress, Nonce, Timestamp, TxId};

// ── OperationType ────────────────────────────────────────────────────────────

/// What a contract transaction does: install new bytecode, or invoke a
/// function on bytecode already deployed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationType {
    #[serde(rename = "DEPLOY")]
    Deploy,
    #[serde(rename = "CALL")]
    Call,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Deploy => write!(f, "DEPLOY"),
            OperationType::Call => write!(f, "CALL"),
        }
    }
}

// ── Payload ──────────────────────────────────────────────────────────────────

/// A structured contract invocation carried in a transaction payload.
///
/// `kwargs` is a `BTreeMap` so the canonical text form (and therefore the
/// signing preimage) is independent of client-side key order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    pub function_signature: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

/// The polymorphic payload of a contract transaction: a Base64 byte blob for
/// deploys, or a call record for invocations. Untagged on the wire — a JSON
/// string is a blob, an object is a call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    Blob(String),
    Call(CallRecord),
}

impl Payload {
    /// Empty blob payload, used by ghost and genesis transactions.
    pub fn empty() -> Self {
        Payload::Blob(String::new())
    }

    /// The canonical text form that enters signing preimages and ids: the raw
    /// Base64 string for blobs, the JSON dump for call records.
    pub fn canonical_text(&self) -> String {
        match self {
            Payload::Blob(s) => s.clone(),
            Payload::Call(call) => {
                serde_json::to_string(call).expect("call record serialization is infallible")
            }
        }
    }
}

// ── TxKind ───────────────────────────────────────────────────────────────────

/// The two transaction shapes the ledger accepts. Serialized untagged and
/// flattened into the transaction record, so the wire form is exactly the
/// field set of the matching variant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TxKind {
    /// Move `amount` from the sender to `recipient`.
    Transfer { recipient: Address, amount: Amount },

    /// Deploy or invoke a contract. `contract_address` names the target for
    /// calls; for deploys the engine fills it in once the address is derived.
    Contract {
        payload: Payload,
        operation_type: OperationType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contract_address: Option<ContractAddress>,
    },
}

impl TxKind {
    /// The canonical signing preimage for this kind under `sender`.
    ///
    /// Transfers sign `sender || amount || recipient` with the amount in its
    /// default numeric textualization; contract transactions sign
    /// `sender || payload || operation_type`. Neither covers the timestamp or
    /// the nonce.
    pub fn preimage(&self, sender: &Address) -> Vec<u8> {
        match self {
            TxKind::Transfer { recipient, amount } => {
                format!("{}{}{}", sender, amount, recipient).into_bytes()
            }
            TxKind::Contract {
                payload,
                operation_type,
                ..
            } => format!("{}{}{}", sender, payload.canonical_text(), operation_type).into_bytes(),
        }
    }

    /// The transaction id for this kind.
    ///
    /// Transfer ids hash `sender || amount || recipient` only — the timestamp
    /// is deliberately excluded, so identical triples collide by id. Contract
    /// ids additionally hash the creation timestamp.
    pub fn compute_id(&self, sender: &Address, created: &Timestamp) -> TxId {
        let mut hasher = Sha256::new();
        match self {
            TxKind::Transfer { .. } => hasher.update(self.preimage(sender)),
            TxKind::Contract { .. } => {
                hasher.update(self.preimage(sender));
                hasher.update(created.to_rfc3339());
            }
        }
        TxId::from_bytes(hasher.finalize().into())
    }
}

// ── TransactionCreate ────────────────────────────────────────────────────────

/// The client-submitted transaction record: the signed fields plus the
/// signature itself. The engine upgrades this into a full [`Transaction`] by
/// stamping nonce, parents and id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionCreate {
    pub sender: Address,
    #[serde(flatten)]
    pub kind: TxKind,
    pub signature: String,
    #[serde(default = "Utc::now")]
    pub created: Timestamp,
    /// Optional client-declared nonce. When present the engine checks it
    /// against the registry instead of stamping its own, so a stale replay is
    /// rejected rather than silently renumbered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
}

impl TransactionCreate {
    pub fn preimage(&self) -> Vec<u8> {
        self.kind.preimage(&self.sender)
    }

    /// Upgrade into a full transaction with the engine-assigned nonce.
    /// Parents stay empty until tip selection runs; the id is already fixed
    /// because no id formula covers the parent list.
    pub fn into_transaction(self, nonce: Nonce) -> Transaction {
        let id = self.kind.compute_id(&self.sender, &self.created);
        Transaction {
            sender: self.sender,
            kind: self.kind,
            signature: self.signature,
            created: self.created,
            nonce,
            parents: Vec::new(),
            id,
            processed: None,
        }
    }
}

// ── Transaction ──────────────────────────────────────────────────────────────

/// A fully-woven DAG vertex payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    #[serde(flatten)]
    pub kind: TxKind,
    pub signature: String,
    pub created: Timestamp,
    pub nonce: Nonce,
    #[serde(default)]
    pub parents: Vec<TxId>,
    pub id: TxId,
    /// When the effect was applied; `None` until the vertex crosses the
    /// confirmation threshold. Never cleared once set.
    #[serde(default)]
    pub processed: Option<Timestamp>,
}

impl Transaction {
    pub fn preimage(&self) -> Vec<u8> {
        self.kind.preimage(&self.sender)
    }

    pub fn is_from(&self, address: &Address) -> bool {
        self.sender == *address
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
