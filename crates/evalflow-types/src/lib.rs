//! Shared domain types for evalflow.
//!
//! This crate contains the data shapes threaded through the evaluation
//! workflow: rubrics, evaluations, reports, the workflow state record and
//! its partial updates, run/checkpoint bookkeeping, and the provider-neutral
//! LLM request types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror
//! and semver.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod llm;
pub mod run;
pub mod state;
