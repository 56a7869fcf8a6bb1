//! LLM provider abstraction and the structured invoker built on top of it.

pub mod box_provider;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod structured;

pub use box_provider::BoxLlmProvider;
pub use provider::LlmProvider;
pub use registry::ProviderRegistry;
pub use retry::DeploymentRetryPolicy;
pub use structured::StructuredInvoker;
