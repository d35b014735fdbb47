use filament_core::transaction::Transaction;
use filament_core::types::TxId;
use std::collections::{HashMap, HashSet};

/// A vertex in the DAG: one transaction plus its edge bookkeeping.
///
/// Edges point from endorsing child to endorsed parent. `endorsers` holds the
/// in-edges (children that endorse this vertex); `linked_parents` holds the
/// out-edges that were actually added, which can be fewer than `tx.parents`
/// when a selected parent failed endorse-time validation.
#[derive(Clone, Debug)]
pub struct VertexEntry {
    pub tx: Transaction,
    pub endorsers: Vec<TxId>,
    pub linked_parents: Vec<TxId>,
}

/// The in-memory transaction DAG.
#[derive(Default)]
pub struct DagGraph {
    vertices: HashMap<TxId, VertexEntry>,
}

impl DagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction vertex. If the id already exists the stored
    /// transaction is replaced while existing edges are kept — transfer ids
    /// exclude the timestamp, so identical (sender, amount, recipient)
    /// triples collide by id and the newer record wins.
    pub fn insert(&mut self, tx: Transaction) {
        let id = tx.id.clone();
        match self.vertices.get_mut(&id) {
            Some(entry) => entry.tx = tx,
            None => {
                self.vertices.insert(
                    id,
                    VertexEntry {
                        tx,
                        endorsers: Vec::new(),
                        linked_parents: Vec::new(),
                    },
                );
            }
        }
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn get(&self, id: &TxId) -> Option<&VertexEntry> {
        self.vertices.get(id)
    }

    pub fn get_mut(&mut self, id: &TxId) -> Option<&mut VertexEntry> {
        self.vertices.get_mut(id)
    }

    /// Add the endorsement edge `child → parent`. Duplicate edges collapse.
    pub fn add_edge(&mut self, child: &TxId, parent: &TxId) {
        let Some(parent_entry) = self.vertices.get_mut(parent) else {
            return;
        };
        if !parent_entry.endorsers.contains(child) {
            parent_entry.endorsers.push(child.clone());
        }
        if let Some(child_entry) = self.vertices.get_mut(child) {
            if !child_entry.linked_parents.contains(parent) {
                child_entry.linked_parents.push(parent.clone());
            }
        }
    }

    /// Number of endorsers of `id` (in-degree).
    pub fn in_degree(&self, id: &TxId) -> usize {
        self.vertices.get(id).map(|e| e.endorsers.len()).unwrap_or(0)
    }

    /// Number of parents `id` actually endorses (out-degree).
    pub fn out_degree(&self, id: &TxId) -> usize {
        self.vertices
            .get(id)
            .map(|e| e.linked_parents.len())
            .unwrap_or(0)
    }

    /// Remove a vertex and every edge touching it.
    pub fn remove(&mut self, id: &TxId) {
        let Some(entry) = self.vertices.remove(id) else {
            return;
        };
        for child in &entry.endorsers {
            if let Some(c) = self.vertices.get_mut(child) {
                c.linked_parents.retain(|p| p != id);
            }
        }
        for parent in &entry.linked_parents {
            if let Some(p) = self.vertices.get_mut(parent) {
                p.endorsers.retain(|c| c != id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VertexEntry> {
        self.vertices.values()
    }

    /// All transactions in canonical order: ascending `created`, ties broken
    /// by id. This is also the tip-selection and replay order.
    pub fn transactions_sorted(&self) -> Vec<&Transaction> {
        let mut txs: Vec<&Transaction> = self.vertices.values().map(|e| &e.tx).collect();
        txs.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        txs
    }

    /// All edges as `(child, parent)` pairs in a stable order.
    pub fn edges(&self) -> Vec<(TxId, TxId)> {
        let mut edges: Vec<(TxId, TxId)> = self
            .vertices
            .values()
            .flat_map(|e| {
                e.linked_parents
                    .iter()
                    .map(|p| (e.tx.id.clone(), p.clone()))
            })
            .collect();
        edges.sort();
        edges
    }

    /// Cycle check over the endorsement edges (Kahn's algorithm). Insertion
    /// only ever links a new child to existing parents, so this should hold
    /// at all times; it is exposed as a verification hook.
    pub fn is_acyclic(&self) -> bool {
        let mut out_remaining: HashMap<&TxId, usize> = self
            .vertices
            .values()
            .map(|e| (&e.tx.id, e.linked_parents.len()))
            .collect();

        // Start from vertices with no outgoing edges (roots of the endorsement
        // order) and peel inward.
        let mut queue: Vec<&TxId> = out_remaining
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = HashSet::new();

        while let Some(id) = queue.pop() {
            visited.insert(id.clone());
            if let Some(entry) = self.vertices.get(id) {
                for child in &entry.endorsers {
                    if let Some(deg) = out_remaining.get_mut(child) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push(child);
                        }
                    }
                }
            }
        }

        visited.len() == self.vertices.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use filament_core::transaction::{TransactionCreate, TxKind};
    use filament_core::types::Address;

    fn tx(sender: &str, amount: f64) -> Transaction {
        let create = TransactionCreate {
            sender: Address::from(sender),
            kind: TxKind::Transfer {
                recipient: Address::from("cmVjaXBpZW50"),
                amount,
            },
            signature: "c2ln".into(),
            created: chrono::Utc::now(),
            nonce: None,
        };
        create.into_transaction(1)
    }

    #[test]
    fn edges_update_degrees() {
        let mut g = DagGraph::new();
        let parent = tx("YQ==", 1.0);
        let child = tx("Yg==", 2.0);
        let (pid, cid) = (parent.id.clone(), child.id.clone());
        g.insert(parent);
        g.insert(child);
        g.add_edge(&cid, &pid);

        assert_eq!(g.in_degree(&pid), 1);
        assert_eq!(g.out_degree(&cid), 1);
        assert_eq!(g.edges(), vec![(cid, pid)]);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut g = DagGraph::new();
        let parent = tx("YQ==", 1.0);
        let child = tx("Yg==", 2.0);
        let (pid, cid) = (parent.id.clone(), child.id.clone());
        g.insert(parent);
        g.insert(child);
        g.add_edge(&cid, &pid);
        g.add_edge(&cid, &pid);
        assert_eq!(g.in_degree(&pid), 1);
    }

    #[test]
    fn colliding_id_replaces_transaction_but_keeps_edges() {
        let mut g = DagGraph::new();
        let first = tx("YQ==", 1.0);
        let endorser = tx("Yg==", 2.0);
        let (fid, eid) = (first.id.clone(), endorser.id.clone());
        g.insert(first.clone());
        g.insert(endorser);
        g.add_edge(&eid, &fid);

        // Same (sender, amount, recipient) triple → same id.
        let second = tx("YQ==", 1.0);
        assert_eq!(second.id, fid);
        g.insert(second);

        assert_eq!(g.len(), 2);
        assert_eq!(g.in_degree(&fid), 1);
    }

    #[test]
    fn removal_cleans_both_edge_directions() {
        let mut g = DagGraph::new();
        let a = tx("YQ==", 1.0);
        let b = tx("Yg==", 2.0);
        let c = tx("Yw==", 3.0);
        let (aid, bid, cid) = (a.id.clone(), b.id.clone(), c.id.clone());
        g.insert(a);
        g.insert(b);
        g.insert(c);
        g.add_edge(&bid, &aid);
        g.add_edge(&cid, &bid);

        g.remove(&bid);
        assert_eq!(g.in_degree(&aid), 0);
        assert_eq!(g.out_degree(&cid), 0);
        assert!(g.is_acyclic());
    }

    #[test]
    fn acyclic_holds_for_diamond() {
        let mut g = DagGraph::new();
        let root = tx("YQ==", 1.0);
        let left = tx("Yg==", 2.0);
        let right = tx("Yw==", 3.0);
        let top = tx("ZA==", 4.0);
        let (r, l, rt, t) = (
            root.id.clone(),
            left.id.clone(),
            right.id.clone(),
            top.id.clone(),
        );
        g.insert(root);
        g.insert(left);
        g.insert(right);
        g.insert(top);
        g.add_edge(&l, &r);
        g.add_edge(&rt, &r);
        g.add_edge(&t, &l);
        g.add_edge(&t, &rt);
        assert!(g.is_acyclic());
    }
}
