//! Schema sources for the schema load step.

pub mod http;

pub use http::HttpSchemaFetcher;
