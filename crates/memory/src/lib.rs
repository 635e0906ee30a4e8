//! Memory for linvoice.
//!
//! - [`ConversationMemory`]: bounded, in-process log of recent exchanges,
//!   used for prompt context and pronoun resolution ("close it").
//! - [`UserContext`]: personalization store persisted to one JSON file and
//!   written through on every mutation.

pub mod conversation;
pub mod user_context;

pub use conversation::{ConversationMemory, Exchange, ExchangeMetadata};
pub use user_context::{Fact, SharedUserContext, UserContext};
