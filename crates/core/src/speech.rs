//! Speech seams. Audio capture, wake-word detection and synthesis stay outside
//! this workspace; the turn loop only sees these two traits.

use async_trait::async_trait;

use crate::error::SpeechError;

/// Produces one finalized utterance per activation.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    /// Block until the user has finished speaking. `Ok(None)` means nothing
    /// usable was heard.
    async fn transcribe(&self) -> Result<Option<String>, SpeechError>;
}

/// Terminal sink for the assistant's reply.
#[async_trait]
pub trait Speaker: Send + Sync {
    fn name(&self) -> &str;

    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}
