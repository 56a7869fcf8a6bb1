//! Infrastructure layer for evalflow.
//!
//! Contains implementations of the ports defined in `evalflow-core`: the
//! SQLite checkpoint store, LLM provider clients, the HTTP schema fetcher
//! and the `config.toml` loader.

pub mod config;
pub mod llm;
pub mod schema;
pub mod sqlite;
