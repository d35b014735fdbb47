//! ─── Filament protocol constants ────────────────────────────────────────────
//!
//! A single-node DAG ledger: transactions endorse earlier transactions, and a
//! vertex's effect fires once enough endorsers reference it.

// ── DAG / confirmation ───────────────────────────────────────────────────────

/// Distinct endorsers a vertex needs before its effect is applied.
pub const CONFIRMATION_THRESHOLD: usize = 4;

/// Maximum endorsers per vertex, and maximum parents per transaction.
/// A vertex below this cap is still a tip and may be endorsed further.
pub const TIP_CAP: usize = 10;

// ── Ghost driver ─────────────────────────────────────────────────────────────

/// Seconds between ghost transactions. Each tick also checkpoints the DAG.
pub const GHOST_INTERVAL_SECS: u64 = 60;

// ── Persistence ──────────────────────────────────────────────────────────────

/// Directory under the data root that holds the checkpoint.
pub const SHARED_DIR: &str = "shared";

/// Checkpoint file name: the full DAG as `{nodes, edges}` JSON.
pub const DAG_FILE: &str = "dag.json";
