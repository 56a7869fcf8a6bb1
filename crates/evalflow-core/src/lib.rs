//! Business logic and collaborator trait definitions for evalflow.
//!
//! This crate defines the evaluation workflow engine (nodes, transition
//! function, orchestrator), the scoring engine and the "ports" that the
//! infrastructure layer implements: [`llm::LlmProvider`],
//! [`workflow::checkpoint::CheckpointStore`] and
//! [`workflow::schema::SchemaFetcher`]. It depends only on `evalflow-types`
//! -- never on `evalflow-infra` or any database/IO crate.

pub mod llm;
pub mod scoring;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
