use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{info, warn};

use filament_core::constants::{
    CONFIRMATION_THRESHOLD, DAG_FILE, GHOST_INTERVAL_SECS, SHARED_DIR, TIP_CAP,
};
use filament_core::transaction::{
    OperationType, Payload, Transaction, TransactionCreate, TxKind,
};
use filament_core::types::{Address, Amount, ContractAddress, TxId};
use filament_core::FilamentError;
use filament_crypto::SigningKeyPair;
use filament_vm::ContractVm;

use crate::checkpoint::{self, DagSnapshot};
use crate::graph::DagGraph;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Engine parameters. The confirmation threshold and tip cap are protocol
/// parameters with fixed defaults; the data dir locates the checkpoint.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub confirmation_threshold: usize,
    pub tip_cap: usize,
    pub ghost_interval: Duration,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            confirmation_threshold: CONFIRMATION_THRESHOLD,
            tip_cap: TIP_CAP,
            ghost_interval: Duration::from_secs(GHOST_INTERVAL_SECS),
        }
    }
}

/// A contract as exposed through read APIs: encoded bytecode plus state.
#[derive(Clone, Debug, Serialize)]
pub struct ContractView {
    pub bytecode: String,
    pub state: BTreeMap<String, Value>,
}

// ── Engine ────────────────────────────────────────────────────────────────────

struct EngineInner {
    graph: DagGraph,
    /// sender → last accepted nonce; advanced once per applied transaction.
    nonce_registry: HashMap<Address, u64>,
    balances: HashMap<Address, Amount>,
    vm: ContractVm,
}

/// The DAG ledger engine.
///
/// All world state — the graph, nonce registry, balances and contract store —
/// sits behind one engine-wide lock: every mutation (submit, ghost tick,
/// effect application) takes the exclusive side, read APIs the shared side.
pub struct DagEngine {
    inner: RwLock<EngineInner>,
    genesis: SigningKeyPair,
    config: EngineConfig,
    checkpoint_path: PathBuf,
}

impl DagEngine {
    /// Open the engine: restore and replay the checkpoint if one exists,
    /// otherwise mint the genesis vertex (sender = recipient = genesis,
    /// amount 0) as the sole root.
    pub fn open(config: EngineConfig, genesis: SigningKeyPair) -> Result<Arc<Self>, FilamentError> {
        let checkpoint_path = config.data_dir.join(SHARED_DIR).join(DAG_FILE);
        let genesis_addr = genesis.address();

        let mut inner = EngineInner {
            graph: DagGraph::new(),
            nonce_registry: HashMap::new(),
            balances: HashMap::new(),
            vm: ContractVm::new(),
        };

        if checkpoint_path.is_file() {
            let snapshot = checkpoint::load(&checkpoint_path)?;
            inner.graph = snapshot.restore();
            Self::replay(&mut inner, &genesis_addr);
            info!(vertices = inner.graph.len(), "DAG restored from checkpoint");
        } else {
            let kind = TxKind::Transfer {
                recipient: genesis_addr.clone(),
                amount: 0.0,
            };
            let signature = genesis.sign(&kind.preimage(&genesis_addr));
            let tx = TransactionCreate {
                sender: genesis_addr,
                kind,
                signature,
                created: Utc::now(),
                nonce: None,
            }
            .into_transaction(1);
            info!(id = %tx.id, "minting genesis vertex");
            inner.graph.insert(tx);
        }

        Ok(Arc::new(Self {
            inner: RwLock::new(inner),
            genesis,
            config,
            checkpoint_path,
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineInner> {
        self.inner.read().expect("engine lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineInner> {
        self.inner.write().expect("engine lock poisoned")
    }

    pub fn genesis_address(&self) -> Address {
        self.genesis.address()
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Accept a client-signed transaction and weave it into the DAG.
    ///
    /// Validation failures return an error without touching the graph; the
    /// boundary layer reports them as a rejection rather than a crash.
    pub fn submit(&self, create: TransactionCreate) -> Result<TxId, FilamentError> {
        let genesis_addr = self.genesis.address();
        let mut inner = self.write();

        if let Err(e) = Self::check_amount(&create, &genesis_addr) {
            warn!(sender = %create.sender, error = %e, "rejected transaction");
            return Err(e);
        }

        // Tentative nonce: the registry's next value, unless the client
        // declared one — a declared stale nonce must fail the check below
        // instead of being silently renumbered.
        let expected = inner.nonce_registry.get(&create.sender).copied().unwrap_or(0) + 1;
        let nonce = create.nonce.unwrap_or(expected);
        let tx = create.into_transaction(nonce);

        if let Err(e) = Self::validate(&inner, &tx, &genesis_addr) {
            warn!(id = %tx.id, error = %e, "rejected transaction");
            return Err(e);
        }

        let parents = Self::select_parents(&inner.graph, &tx.id, self.config.tip_cap);
        let id = tx.id.clone();
        let mut tx = tx;
        tx.parents = parents.clone();
        inner.graph.insert(tx);

        for parent_id in &parents {
            self.endorse(&mut inner, &id, parent_id, &genesis_addr);
        }

        Ok(id)
    }

    /// Amount rules for transfers: never negative or non-finite, and strictly
    /// positive unless genesis is the sender or the recipient.
    fn check_amount(create: &TransactionCreate, genesis: &Address) -> Result<(), FilamentError> {
        if let TxKind::Transfer { recipient, amount } = &create.kind {
            if !amount.is_finite() || *amount < 0.0 {
                return Err(FilamentError::NonPositiveAmount);
            }
            if create.sender != *genesis && recipient != genesis && *amount <= 0.0 {
                return Err(FilamentError::NonPositiveAmount);
            }
        }
        Ok(())
    }

    /// Signature and nonce checks. Genesis is exempt from nonce enforcement —
    /// ghost transactions all share the genesis sender.
    fn validate(
        inner: &EngineInner,
        tx: &Transaction,
        genesis: &Address,
    ) -> Result<(), FilamentError> {
        if !filament_crypto::verify(&tx.preimage(), &tx.signature, tx.sender.as_str()) {
            return Err(FilamentError::InvalidSignature);
        }
        if tx.sender != *genesis {
            let expected = inner.nonce_registry.get(&tx.sender).copied().unwrap_or(0) + 1;
            if tx.nonce != expected {
                return Err(FilamentError::InvalidNonce {
                    expected,
                    got: tx.nonce,
                });
            }
        }
        Ok(())
    }

    /// Tip selection: every vertex whose endorser count is below the tip cap
    /// is a candidate; candidates are ordered by ascending `created` (ties by
    /// id) and the most recent `tip_cap` of them become the parents.
    fn select_parents(graph: &DagGraph, self_id: &TxId, tip_cap: usize) -> Vec<TxId> {
        let candidates: Vec<TxId> = graph
            .transactions_sorted()
            .into_iter()
            .filter(|t| t.id != *self_id && graph.in_degree(&t.id) < tip_cap)
            .map(|t| t.id.clone())
            .collect();
        candidates[candidates.len().saturating_sub(tip_cap)..].to_vec()
    }

    /// Endorse one selected parent: re-stamp its tentative nonce, re-run the
    /// validation checks, add the edge, and fire its effect once it crosses
    /// the confirmation threshold.
    fn endorse(
        &self,
        inner: &mut EngineInner,
        child_id: &TxId,
        parent_id: &TxId,
        genesis: &Address,
    ) {
        let Some(sender) = inner.graph.get(parent_id).map(|e| e.tx.sender.clone()) else {
            return;
        };

        // Tentative re-stamp, mirroring submission. An unprocessed parent
        // therefore passes the nonce check by construction and the signature
        // is the real gate here.
        let expected = inner.nonce_registry.get(&sender).copied().unwrap_or(0) + 1;
        let parent = {
            let entry = inner.graph.get_mut(parent_id).expect("presence checked above");
            entry.tx.nonce = expected;
            entry.tx.clone()
        };

        match Self::validate(inner, &parent, genesis) {
            Ok(()) => {
                inner.graph.add_edge(child_id, parent_id);

                let confirmed = inner.graph.in_degree(parent_id)
                    >= self.config.confirmation_threshold
                    && inner
                        .graph
                        .get(parent_id)
                        .map(|e| e.tx.processed.is_none())
                        .unwrap_or(false);
                if confirmed {
                    match Self::process_vertex(inner, parent_id, genesis) {
                        Ok(()) => info!(id = %parent_id, "transaction confirmed and applied"),
                        Err(e) => {
                            warn!(id = %parent_id, error = %e, "effect failed; removing vertex");
                            inner.graph.remove(parent_id);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(id = %parent_id, error = %e, "parent failed endorse-time validation");
                if inner.graph.out_degree(parent_id) == 0 {
                    inner.graph.remove(parent_id);
                }
            }
        }
    }

    // ── Effect application ───────────────────────────────────────────────────

    /// Apply a confirmed vertex's effect, stamp `processed`, and advance the
    /// sender's registry entry — the single place the registry moves, so one
    /// confirmation advances it exactly once.
    fn process_vertex(
        inner: &mut EngineInner,
        id: &TxId,
        genesis: &Address,
    ) -> Result<(), FilamentError> {
        let tx = inner
            .graph
            .get(id)
            .map(|e| e.tx.clone())
            .ok_or_else(|| FilamentError::Internal(format!("vertex {id} disappeared")))?;

        let deployed = Self::apply_effect(inner, &tx, genesis)?;

        let entry = inner
            .graph
            .get_mut(id)
            .ok_or_else(|| FilamentError::Internal(format!("vertex {id} disappeared")))?;
        if let (Some(address), TxKind::Contract {
            contract_address, ..
        }) = (deployed, &mut entry.tx.kind)
        {
            *contract_address = Some(address);
        }
        entry.tx.processed = Some(Utc::now());
        *inner.nonce_registry.entry(tx.sender).or_insert(0) += 1;
        Ok(())
    }

    /// The state mutation for one transaction. Returns the derived address
    /// for deploys so the caller can write it back onto the vertex.
    fn apply_effect(
        inner: &mut EngineInner,
        tx: &Transaction,
        genesis: &Address,
    ) -> Result<Option<ContractAddress>, FilamentError> {
        match &tx.kind {
            TxKind::Transfer { recipient, amount } => {
                // Genesis is the mint: it credits without being debited.
                if tx.sender != *genesis {
                    let have = inner.balances.get(&tx.sender).copied().unwrap_or(0.0);
                    if have < *amount {
                        return Err(FilamentError::InsufficientBalance {
                            need: *amount,
                            have,
                        });
                    }
                    *inner.balances.entry(tx.sender.clone()).or_insert(0.0) -= *amount;
                }
                *inner.balances.entry(recipient.clone()).or_insert(0.0) += *amount;
                Ok(None)
            }

            // Ghosts: genesis-sent contract transactions carry no effect.
            TxKind::Contract { .. } if tx.sender == *genesis => Ok(None),

            TxKind::Contract {
                payload,
                operation_type,
                contract_address,
            } => match operation_type {
                OperationType::Call => {
                    let address = contract_address
                        .clone()
                        .ok_or(FilamentError::MissingContractAddress)?;
                    let Payload::Call(call) = payload else {
                        return Err(FilamentError::ContractRuntime(
                            "call payload is not a call record".into(),
                        ));
                    };
                    inner
                        .vm
                        .execute(&address, &call.function_signature, &call.args, &call.kwargs)?;
                    Ok(None)
                }
                OperationType::Deploy => {
                    let Payload::Blob(source) = payload else {
                        return Err(FilamentError::Compile(
                            "deploy payload is not a byte blob".into(),
                        ));
                    };
                    let address = inner.vm.deploy(source, &tx.created)?;
                    Ok(Some(address))
                }
            },
        }
    }

    /// Rebuild world state from a restored graph: re-apply, in canonical
    /// order, exactly the vertices that were already processed at save time.
    /// Pending vertices stay pending and confirm through future endorsements.
    fn replay(inner: &mut EngineInner, genesis: &Address) {
        let order: Vec<TxId> = inner
            .graph
            .transactions_sorted()
            .into_iter()
            .filter(|t| t.processed.is_some())
            .map(|t| t.id.clone())
            .collect();

        for id in order {
            let Some(tx) = inner.graph.get(&id).map(|e| e.tx.clone()) else {
                continue;
            };
            match Self::apply_effect(inner, &tx, genesis) {
                Ok(deployed) => {
                    if let Some(address) = deployed {
                        if let Some(entry) = inner.graph.get_mut(&id) {
                            if let TxKind::Contract {
                                contract_address, ..
                            } = &mut entry.tx.kind
                            {
                                *contract_address = Some(address);
                            }
                        }
                    }
                    *inner.nonce_registry.entry(tx.sender).or_insert(0) += 1;
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "replayed effect failed; keeping checkpointed record")
                }
            }
        }
    }

    // ── Ghosts and checkpointing ─────────────────────────────────────────────

    /// Build a genesis-signed no-op: an empty-payload contract call. Its id
    /// covers `created`, so back-to-back ghosts never collide.
    pub fn build_ghost(&self) -> TransactionCreate {
        let sender = self.genesis.address();
        let kind = TxKind::Contract {
            payload: Payload::empty(),
            operation_type: OperationType::Call,
            contract_address: None,
        };
        let signature = self.genesis.sign(&kind.preimage(&sender));
        TransactionCreate {
            sender,
            kind,
            signature,
            created: Utc::now(),
            nonce: None,
        }
    }

    /// Write the current DAG to `shared/dag.json` under the data root.
    pub fn checkpoint(&self) -> Result<(), FilamentError> {
        let snapshot = DagSnapshot::capture(&self.read().graph);
        checkpoint::save(&self.checkpoint_path, &snapshot)
    }

    // ── Read APIs ────────────────────────────────────────────────────────────

    pub fn balances(&self) -> BTreeMap<Address, Amount> {
        self.read()
            .balances
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn contract_views(&self) -> BTreeMap<ContractAddress, ContractView> {
        self.read()
            .vm
            .contracts()
            .iter()
            .map(|(addr, c)| {
                (
                    addr.clone(),
                    ContractView {
                        bytecode: c.encoded_bytecode(),
                        state: c.state.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn contract_view(&self, address: &ContractAddress) -> Option<ContractView> {
        self.read().vm.contract(address).map(|c| ContractView {
            bytecode: c.encoded_bytecode(),
            state: c.state.clone(),
        })
    }

    pub fn is_acyclic(&self) -> bool {
        self.read().graph.is_acyclic()
    }

    pub fn vertex(&self, id: &TxId) -> Option<Transaction> {
        self.read().graph.get(id).map(|e| e.tx.clone())
    }

    pub fn in_degree(&self, id: &TxId) -> usize {
        self.read().graph.in_degree(id)
    }

    pub fn vertex_count(&self) -> usize {
        self.read().graph.len()
    }

    /// All transactions in canonical order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.read()
            .graph
            .transactions_sorted()
            .into_iter()
            .cloned()
            .collect()
    }

    /// The last accepted nonce for `address` (0 if it never sent).
    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.read()
            .nonce_registry
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use filament_core::transaction::CallRecord;
    use serde_json::json;

    fn temp_config(name: &str) -> EngineConfig {
        let dir = std::env::temp_dir().join(format!("filament_engine_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        EngineConfig::new(dir)
    }

    fn transfer(
        from: &SigningKeyPair,
        to: &Address,
        amount: f64,
        nonce: Option<u64>,
    ) -> TransactionCreate {
        let sender = from.address();
        let kind = TxKind::Transfer {
            recipient: to.clone(),
            amount,
        };
        let signature = from.sign(&kind.preimage(&sender));
        TransactionCreate {
            sender,
            kind,
            signature,
            created: Utc::now(),
            nonce,
        }
    }

    fn contract_tx(
        from: &SigningKeyPair,
        payload: Payload,
        operation_type: OperationType,
        contract_address: Option<ContractAddress>,
    ) -> TransactionCreate {
        let sender = from.address();
        let kind = TxKind::Contract {
            payload,
            operation_type,
            contract_address,
        };
        let signature = from.sign(&kind.preimage(&sender));
        TransactionCreate {
            sender,
            kind,
            signature,
            created: Utc::now(),
            nonce: None,
        }
    }

    /// Submit `n` ghost transactions, checking acyclicity after each.
    fn drive_ghosts(engine: &DagEngine, n: usize) {
        for _ in 0..n {
            engine.submit(engine.build_ghost()).unwrap();
            assert!(engine.is_acyclic());
        }
    }

    const SET_GET: &str = "\
fn f:
  push \"x\"
  arg 0
  sstore
  halt
";

    // ── Scenario 1: genesis mint ─────────────────────────────────────────────

    #[test]
    fn fresh_node_mints_a_single_genesis_root() {
        let genesis = SigningKeyPair::generate();
        let genesis_addr = genesis.address();
        let engine = DagEngine::open(temp_config("genesis_mint"), genesis).unwrap();

        assert_eq!(engine.vertex_count(), 1);
        assert!(engine.is_acyclic());
        assert!(engine.balances().is_empty());

        let root = &engine.transactions()[0];
        assert_eq!(root.sender, genesis_addr);
        assert!(matches!(
            &root.kind,
            TxKind::Transfer { recipient, amount } if *recipient == genesis_addr && *amount == 0.0
        ));
        assert!(root.processed.is_none());
        assert!(root.parents.is_empty());
    }

    // ── Scenarios 2 + 3: transfer pending, then confirmed by ghosts ─────────

    #[test]
    fn transfer_confirms_after_threshold_ghosts() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("transfer_confirm"), genesis.clone()).unwrap();

        let t1 = engine
            .submit(transfer(&genesis, &alice.address(), 100.0, None))
            .unwrap();
        assert!(engine.vertex(&t1).is_some());
        assert!(engine.vertex(&t1).unwrap().processed.is_none());
        assert!(engine.balances().is_empty());

        // Three endorsers are not enough.
        drive_ghosts(&engine, 3);
        assert_eq!(engine.in_degree(&t1), 3);
        assert!(engine.vertex(&t1).unwrap().processed.is_none());

        // The fourth crosses the threshold and fires the mint.
        drive_ghosts(&engine, 1);
        assert!(engine.vertex(&t1).unwrap().processed.is_some());
        assert_eq!(engine.balances().get(&alice.address()), Some(&100.0));
    }

    // ── P5: effects never double ─────────────────────────────────────────────

    #[test]
    fn confirmed_transfer_is_applied_exactly_once() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("single_apply"), genesis.clone()).unwrap();

        engine
            .submit(transfer(&genesis, &alice.address(), 100.0, None))
            .unwrap();
        drive_ghosts(&engine, 8);

        assert_eq!(engine.balances().get(&alice.address()), Some(&100.0));
    }

    // ── Scenario 4: bad signature ────────────────────────────────────────────

    #[test]
    fn invalid_signature_is_rejected_without_insertion() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let bob = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("bad_sig"), genesis).unwrap();

        let mut create = transfer(&alice, &bob.address(), 10.0, None);
        create.signature = "Z2FyYmFnZQ==".into();

        assert!(matches!(
            engine.submit(create),
            Err(FilamentError::InvalidSignature)
        ));
        assert_eq!(engine.vertex_count(), 1);
        assert!(engine.is_acyclic());
    }

    // ── Scenario 5: nonce replay ─────────────────────────────────────────────

    #[test]
    fn stale_client_nonce_is_rejected() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let bob = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("nonce_replay"), genesis.clone()).unwrap();

        engine
            .submit(transfer(&genesis, &alice.address(), 100.0, None))
            .unwrap();
        drive_ghosts(&engine, 4);
        assert_eq!(engine.balances().get(&alice.address()), Some(&100.0));

        engine
            .submit(transfer(&alice, &bob.address(), 10.0, Some(1)))
            .unwrap();
        drive_ghosts(&engine, 4);
        assert_eq!(engine.nonce_of(&alice.address()), 1);
        assert_eq!(engine.balances().get(&bob.address()), Some(&10.0));

        // Replaying nonce 1 after the registry reached 1 must fail.
        let err = engine
            .submit(transfer(&alice, &bob.address(), 10.5, Some(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            FilamentError::InvalidNonce { expected: 2, got: 1 }
        ));
    }

    // ── Non-positive amounts ─────────────────────────────────────────────────

    #[test]
    fn zero_amount_between_user_wallets_is_rejected() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let bob = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("zero_amount"), genesis).unwrap();

        let err = engine
            .submit(transfer(&alice, &bob.address(), 0.0, None))
            .unwrap_err();
        assert!(matches!(err, FilamentError::NonPositiveAmount));

        let err = engine
            .submit(transfer(&alice, &bob.address(), -5.0, None))
            .unwrap_err();
        assert!(matches!(err, FilamentError::NonPositiveAmount));
    }

    // ── Insufficient balance unwinds the vertex ──────────────────────────────

    #[test]
    fn overdraft_vertex_is_removed_at_confirmation() {
        let genesis = SigningKeyPair::generate();
        let bob = SigningKeyPair::generate();
        let carol = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("overdraft"), genesis).unwrap();

        let id = engine
            .submit(transfer(&bob, &carol.address(), 50.0, None))
            .unwrap();
        assert!(engine.vertex(&id).is_some());

        drive_ghosts(&engine, 4);

        assert!(engine.vertex(&id).is_none(), "overdraft vertex must unwind");
        assert!(engine.balances().get(&carol.address()).is_none());
        assert!(engine.is_acyclic());
    }

    // ── Scenario 6: contract deploy and call ─────────────────────────────────

    #[test]
    fn contract_deploys_and_executes_through_confirmation() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("contract_flow"), genesis).unwrap();

        let source_b64 = filament_crypto::b64::encode(SET_GET.as_bytes());
        let deploy_id = engine
            .submit(contract_tx(
                &alice,
                Payload::Blob(source_b64),
                OperationType::Deploy,
                None,
            ))
            .unwrap();
        drive_ghosts(&engine, 4);

        let deployed = engine.vertex(&deploy_id).unwrap();
        assert!(deployed.processed.is_some());
        let TxKind::Contract {
            contract_address: Some(address),
            ..
        } = deployed.kind
        else {
            panic!("deploy vertex should carry the derived contract address");
        };

        let call = CallRecord {
            function_signature: "f".into(),
            args: vec![json!(7)],
            kwargs: BTreeMap::new(),
        };
        engine
            .submit(contract_tx(
                &alice,
                Payload::Call(call),
                OperationType::Call,
                Some(address.clone()),
            ))
            .unwrap();
        drive_ghosts(&engine, 4);

        let view = engine.contract_view(&address).unwrap();
        assert_eq!(view.state.get("x"), Some(&json!(7)));

        // Calling a function the contract never defined fails at confirmation
        // and unwinds the vertex.
        let bad_call = CallRecord {
            function_signature: "g".into(),
            args: vec![],
            kwargs: BTreeMap::new(),
        };
        let bad_id = engine
            .submit(contract_tx(
                &alice,
                Payload::Call(bad_call),
                OperationType::Call,
                Some(address.clone()),
            ))
            .unwrap();
        drive_ghosts(&engine, 4);

        assert!(engine.vertex(&bad_id).is_none());
        let view = engine.contract_view(&address).unwrap();
        assert_eq!(view.state.get("x"), Some(&json!(7)));
    }

    // ── Scenario 7 + P7: checkpoint round-trip ───────────────────────────────

    #[test]
    fn restart_replays_processed_vertices_only() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let bob = SigningKeyPair::generate();
        let carol = SigningKeyPair::generate();
        let config = temp_config("round_trip");

        let (balances_before, count_before, t1) = {
            let engine = DagEngine::open(config.clone(), genesis.clone()).unwrap();
            let t1 = engine
                .submit(transfer(&genesis, &alice.address(), 100.0, None))
                .unwrap();
            drive_ghosts(&engine, 4);
            engine
                .submit(transfer(&alice, &bob.address(), 10.0, None))
                .unwrap();
            drive_ghosts(&engine, 4);

            // A transfer that never confirms must stay pending across restart.
            engine
                .submit(transfer(&genesis, &carol.address(), 7.0, None))
                .unwrap();

            engine.checkpoint().unwrap();
            (engine.balances(), engine.vertex_count(), t1)
        };

        let engine = DagEngine::open(config, genesis).unwrap();

        assert_eq!(engine.vertex_count(), count_before);
        assert_eq!(engine.balances(), balances_before);
        assert_eq!(engine.balances().get(&alice.address()), Some(&90.0));
        assert_eq!(engine.balances().get(&bob.address()), Some(&10.0));
        assert_eq!(engine.nonce_of(&alice.address()), 1);
        assert!(engine.balances().get(&carol.address()).is_none());
        assert!(engine.vertex(&t1).unwrap().processed.is_some());
        assert!(engine.is_acyclic());
    }

    #[test]
    fn contract_state_rebuilds_by_replay() {
        let genesis = SigningKeyPair::generate();
        let alice = SigningKeyPair::generate();
        let config = temp_config("contract_replay");

        let address = {
            let engine = DagEngine::open(config.clone(), genesis.clone()).unwrap();
            let source_b64 = filament_crypto::b64::encode(SET_GET.as_bytes());
            let deploy_id = engine
                .submit(contract_tx(
                    &alice,
                    Payload::Blob(source_b64),
                    OperationType::Deploy,
                    None,
                ))
                .unwrap();
            drive_ghosts(&engine, 4);
            let TxKind::Contract {
                contract_address: Some(address),
                ..
            } = engine.vertex(&deploy_id).unwrap().kind
            else {
                panic!("deploy should have an address");
            };

            let call = CallRecord {
                function_signature: "f".into(),
                args: vec![json!(41)],
                kwargs: BTreeMap::new(),
            };
            engine
                .submit(contract_tx(
                    &alice,
                    Payload::Call(call),
                    OperationType::Call,
                    Some(address.clone()),
                ))
                .unwrap();
            drive_ghosts(&engine, 4);
            engine.checkpoint().unwrap();
            address
        };

        let engine = DagEngine::open(config, genesis).unwrap();
        let view = engine.contract_view(&address).unwrap();
        assert_eq!(view.state.get("x"), Some(&json!(41)));
    }

    // ── Tip selection stays within the cap ───────────────────────────────────

    #[test]
    fn parents_never_exceed_the_tip_cap() {
        let genesis = SigningKeyPair::generate();
        let engine = DagEngine::open(temp_config("tip_cap"), genesis).unwrap();

        drive_ghosts(&engine, 15);

        for tx in engine.transactions() {
            assert!(tx.parents.len() <= TIP_CAP);
        }
        assert!(engine.is_acyclic());
    }
}
