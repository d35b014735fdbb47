pub mod checkpoint;
pub mod engine;
pub mod ghost;
pub mod graph;

pub use checkpoint::DagSnapshot;
pub use engine::{ContractView, DagEngine, EngineConfig};
pub use ghost::GhostDriver;
pub use graph::DagGraph;
