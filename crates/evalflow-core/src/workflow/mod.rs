//! Evaluation workflow engine: node contracts, the transition function and
//! the suspend/resume orchestrator.
//!
//! - `error` -- workflow error taxonomy
//! - `checkpoint` -- `CheckpointStore` port and the in-memory store
//! - `schema` -- `SchemaFetcher` port consumed by the schema load step
//! - `graph` -- static and conditional edges between nodes
//! - `nodes` -- the ten processing steps
//! - `orchestrator` -- drives a thread through the graph, persisting after every node

pub mod checkpoint;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod orchestrator;
pub mod schema;

pub use checkpoint::{CheckpointError, CheckpointStore, InMemoryCheckpointStore};
pub use error::{ContractViolation, WorkflowError};
pub use orchestrator::Orchestrator;
pub use schema::{BoxSchemaFetcher, SchemaFetchError, SchemaFetcher};
