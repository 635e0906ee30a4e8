//! Turn routing for linvoice.
//!
//! Each utterance goes through one [`Router::handle_turn`]:
//!
//! 1. **Classify** the text (greeting, "open X", "close it", or needs the LLM)
//! 2. **Rule path**: one tool call, no model involved
//! 3. **LLM path**: prompt with tools, user context and history, parse the
//!    free-text calls, execute them in order, then ask for a spoken summary
//! 4. **Fallback**: keyword rules or a fixed apology when the model is down
//! 5. **Record** the exchange so later turns can say "it"
//!
//! [`activation`] feeds turns from a hotkey or wake word into the router.

pub mod activation;
pub mod classifier;
pub mod parser;
pub mod prompt;
pub mod router;

#[cfg(test)]
mod test_helpers;

pub use activation::{Activation, ActivationQueue, is_noise, run_turn_loop};
pub use classifier::{Classification, Intent, classify, infer_intent};
pub use parser::{ToolCallParser, strip_reasoning};
pub use prompt::PromptBuilder;
pub use router::{FALLBACK_APOLOGY, LlmSettings, Route, Router, TurnOutcome, summarize_results};
