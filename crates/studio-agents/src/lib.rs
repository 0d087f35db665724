//! Model-backed collaborators and configuration for the listing pipeline.
//!
//! - [`config`]: environment and TOML configuration for the CLI
//! - [`llm`]: chat-completions client implementing the debate role contract

pub mod config;
pub mod llm;

pub use config::{LlmEndpoint, StudioConfig};
pub use llm::{ChatRoleInvoker, LlmError};
