use filament_core::types::{ContractAddress, Timestamp};
use filament_core::FilamentError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

use crate::asm::{self, Program};
use crate::vm;

/// A deployed contract: compiled bytecode plus its persistent state mapping.
/// State lives in memory for the lifetime of the process; the DAG checkpoint
/// does not serialize it, and a restart rebuilds it by replaying confirmed
/// deploys and calls.
#[derive(Clone, Debug)]
pub struct SmartContract {
    pub program: Program,
    pub state: BTreeMap<String, Value>,
}

impl SmartContract {
    /// The bytecode in its canonical wire form: Base64 of the bincode bytes.
    pub fn encoded_bytecode(&self) -> String {
        let bytes = bincode::serialize(&self.program).expect("program serialization is infallible");
        filament_crypto::b64::encode(&bytes)
    }
}

/// The contract store and execution entry points.
#[derive(Default)]
pub struct ContractVm {
    contracts: BTreeMap<ContractAddress, SmartContract>,
}

impl ContractVm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `source_b64` (Base64 contract assembly) and store it under a
    /// content-derived address: SHA-256 of the canonical bytecode bytes
    /// concatenated with the deploy timestamp's text form. The same source
    /// deployed at the same instant always lands on the same address.
    pub fn deploy(
        &mut self,
        source_b64: &str,
        created: &Timestamp,
    ) -> Result<ContractAddress, FilamentError> {
        let source_bytes = filament_crypto::b64::decode(source_b64)
            .map_err(|e| FilamentError::Compile(format!("payload is not Base64: {e}")))?;
        let source = String::from_utf8(source_bytes)
            .map_err(|e| FilamentError::Compile(format!("payload is not UTF-8: {e}")))?;
        let program = asm::compile(&source)?;

        let bytecode =
            bincode::serialize(&program).map_err(|e| FilamentError::Serialization(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytecode);
        hasher.update(created.to_rfc3339());
        let address = ContractAddress(hex::encode(hasher.finalize()));

        debug!(address = %address, functions = program.functions.len(), "contract deployed");
        self.contracts.insert(
            address.clone(),
            SmartContract {
                program,
                state: BTreeMap::new(),
            },
        );
        Ok(address)
    }

    /// Invoke `function_signature` on a deployed contract. The execution
    /// environment holds the contract's own state plus the call arguments and
    /// nothing else.
    pub fn execute(
        &mut self,
        address: &ContractAddress,
        function_signature: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value, FilamentError> {
        let contract = self
            .contracts
            .get_mut(address)
            .ok_or_else(|| FilamentError::UnknownContract(address.to_string()))?;
        let ops = contract
            .program
            .functions
            .get(function_signature)
            .ok_or_else(|| FilamentError::UnknownFunction(function_signature.to_string()))?;

        let result = vm::execute(ops, args, kwargs, &mut contract.state)?;
        debug!(address = %address, function = function_signature, "contract call executed");
        Ok(result)
    }

    pub fn contracts(&self) -> &BTreeMap<ContractAddress, SmartContract> {
        &self.contracts
    }

    pub fn contract(&self, address: &ContractAddress) -> Option<&SmartContract> {
        self.contracts.get(address)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const SET_GET: &str = "\
fn f:
  push \"x\"
  arg 0
  sstore
  halt

fn get:
  push \"x\"
  sload
  ret
";

    fn b64(source: &str) -> String {
        filament_crypto::b64::encode(source.as_bytes())
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn deploy_address_is_a_pure_function_of_inputs() {
        let mut vm_a = ContractVm::new();
        let mut vm_b = ContractVm::new();
        let t = at(1_700_000_000);

        let addr_a = vm_a.deploy(&b64(SET_GET), &t).unwrap();
        let addr_b = vm_b.deploy(&b64(SET_GET), &t).unwrap();
        assert_eq!(addr_a, addr_b);

        let later = vm_a.deploy(&b64(SET_GET), &at(1_700_000_001)).unwrap();
        assert_ne!(addr_a, later);

        let other_source = vm_a.deploy(&b64("fn g:\n  halt\n"), &t).unwrap();
        assert_ne!(addr_a, other_source);
    }

    #[test]
    fn call_mutates_state_that_persists_across_calls() {
        let mut vm = ContractVm::new();
        let addr = vm.deploy(&b64(SET_GET), &at(1_700_000_000)).unwrap();

        vm.execute(&addr, "f", &[json!(7)], &BTreeMap::new()).unwrap();
        assert_eq!(
            vm.contract(&addr).unwrap().state.get("x"),
            Some(&json!(7))
        );

        let out = vm.execute(&addr, "get", &[], &BTreeMap::new()).unwrap();
        assert_eq!(out, json!(7));
    }

    #[test]
    fn unknown_contract_and_function_are_distinct_errors() {
        let mut vm = ContractVm::new();
        let addr = vm.deploy(&b64(SET_GET), &at(1_700_000_000)).unwrap();

        let missing = ContractAddress("00".repeat(32));
        assert!(matches!(
            vm.execute(&missing, "f", &[], &BTreeMap::new()),
            Err(FilamentError::UnknownContract(_))
        ));
        assert!(matches!(
            vm.execute(&addr, "g", &[], &BTreeMap::new()),
            Err(FilamentError::UnknownFunction(_))
        ));
    }

    #[test]
    fn malformed_source_fails_to_deploy() {
        let mut vm = ContractVm::new();
        assert!(matches!(
            vm.deploy(&b64("fn broken:\n  jmp nowhere\n"), &at(0)),
            Err(FilamentError::Compile(_))
        ));
        assert!(matches!(
            vm.deploy("not-base64!!", &at(0)),
            Err(FilamentError::Compile(_))
        ));
    }

    #[test]
    fn contracts_are_isolated_from_each_other() {
        let mut vm = ContractVm::new();
        let a = vm.deploy(&b64(SET_GET), &at(1)).unwrap();
        let b = vm.deploy(&b64(SET_GET), &at(2)).unwrap();

        vm.execute(&a, "f", &[json!(1)], &BTreeMap::new()).unwrap();
        assert_eq!(vm.contract(&a).unwrap().state.get("x"), Some(&json!(1)));
        assert!(vm.contract(&b).unwrap().state.is_empty());
    }
}
