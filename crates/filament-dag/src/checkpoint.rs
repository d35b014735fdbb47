//! Checkpoint codec: the whole DAG as a single `dag.json` with a `nodes`
//! array (serialized transactions, RFC 3339 timestamps) and an `edges` array
//! of `[child_id, parent_id]` pairs. Written after every ghost tick, read
//! once at engine construction. The in-memory graph stays authoritative; a
//! failed write is retried on the next tick.

use filament_core::transaction::Transaction;
use filament_core::types::TxId;
use filament_core::FilamentError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::graph::DagGraph;

#[derive(Debug, Serialize, Deserialize)]
pub struct DagSnapshot {
    pub nodes: Vec<Transaction>,
    pub edges: Vec<(TxId, TxId)>,
}

impl DagSnapshot {
    /// Capture the current graph in canonical order.
    pub fn capture(graph: &DagGraph) -> Self {
        Self {
            nodes: graph.transactions_sorted().into_iter().cloned().collect(),
            edges: graph.edges(),
        }
    }

    /// Rebuild a graph from this snapshot. Edges whose endpoints are missing
    /// (a vertex removed after its child persisted a stale parent id) are
    /// dropped silently.
    pub fn restore(self) -> DagGraph {
        let mut graph = DagGraph::new();
        for tx in self.nodes {
            graph.insert(tx);
        }
        for (child, parent) in &self.edges {
            if graph.contains(child) && graph.contains(parent) {
                graph.add_edge(child, parent);
            }
        }
        graph
    }
}

/// Write the snapshot to `path`, going through a sibling temp file so a crash
/// mid-write never truncates the previous checkpoint.
pub fn save(path: &Path, snapshot: &DagSnapshot) -> Result<(), FilamentError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| FilamentError::Storage(e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| FilamentError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| FilamentError::Storage(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| FilamentError::Storage(e.to_string()))?;
    Ok(())
}

/// Read a snapshot back from `path`.
pub fn load(path: &Path) -> Result<DagSnapshot, FilamentError> {
    let json = fs::read_to_string(path).map_err(|e| FilamentError::Storage(e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| FilamentError::Serialization(e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use filament_core::transaction::{TransactionCreate, TxKind};
    use filament_core::types::Address;

    fn tx(sender: &str, amount: f64) -> Transaction {
        TransactionCreate {
            sender: Address::from(sender),
            kind: TxKind::Transfer {
                recipient: Address::from("cmVjaXBpZW50"),
                amount,
            },
            signature: "c2ln".into(),
            created: chrono::Utc::now(),
            nonce: None,
        }
        .into_transaction(1)
    }

    #[test]
    fn snapshot_round_trips_nodes_and_edges() {
        let dir = std::env::temp_dir().join("filament_checkpoint_roundtrip");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("dag.json");

        let mut graph = DagGraph::new();
        let parent = tx("YQ==", 1.0);
        let child = tx("Yg==", 2.0);
        let (pid, cid) = (parent.id.clone(), child.id.clone());
        graph.insert(parent);
        graph.insert(child);
        graph.add_edge(&cid, &pid);

        save(&path, &DagSnapshot::capture(&graph)).unwrap();
        let restored = load(&path).unwrap().restore();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.in_degree(&pid), 1);
        assert_eq!(restored.out_degree(&cid), 1);
        assert_eq!(
            restored.get(&cid).unwrap().tx.created,
            graph.get(&cid).unwrap().tx.created
        );
    }

    #[test]
    fn checkpoint_json_is_self_describing() {
        let mut graph = DagGraph::new();
        graph.insert(tx("YQ==", 1.0));
        let json = serde_json::to_value(DagSnapshot::capture(&graph)).unwrap();
        assert!(json["nodes"].is_array());
        assert!(json["edges"].is_array());
        assert!(json["nodes"][0]["created"].is_string());
    }

    #[test]
    fn load_missing_file_is_a_storage_error() {
        let err = load(Path::new("/nonexistent/filament/dag.json")).unwrap_err();
        assert!(matches!(err, FilamentError::Storage(_)));
    }
}
