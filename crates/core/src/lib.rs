//! # linvoice core
//!
//! Domain types, traits, and error definitions shared by every linvoice crate.
//! Tools, the registry, the executor, and the provider and speech seams are
//! defined here; concrete implementations live in their own crates.

pub mod error;
pub mod executor;
pub mod provider;
pub mod speech;
pub mod tool;

pub use error::{Error, Result};
pub use executor::{ToolExecutor, format_result_for_llm};
pub use provider::{GenerationOptions, GenerationRequest, Provider};
pub use speech::{Speaker, Transcriber};
pub use tool::{
    Arguments, ParamType, Tool, ToolCall, ToolParameter, ToolRegistry, ToolResult, ToolSchema,
};
