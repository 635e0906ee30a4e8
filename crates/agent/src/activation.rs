//! Activation queue and the voice turn loop.
//!
//! Hotkeys, wake words and the like only ever call
//! [`ActivationQueue::trigger`]. The queue holds at most one pending
//! activation; triggers that arrive while one is already waiting are dropped.

use chrono::{DateTime, Utc};
use linvoice_core::error::SpeechError;
use linvoice_core::speech::{Speaker, Transcriber};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::router::Router;

/// Shortest transcription worth a turn.
const MIN_UTTERANCE_CHARS: usize = 2;

/// Digit-only transcriptions shorter than this are treated as noise.
const MIN_NUMERIC_CHARS: usize = 5;

/// A request to start one turn.
#[derive(Debug, Clone)]
pub struct Activation {
    pub source: String,
    pub at: DateTime<Utc>,
}

/// Sending half, cheap to clone into every activation source.
#[derive(Debug, Clone)]
pub struct ActivationQueue {
    tx: mpsc::Sender<Activation>,
}

impl ActivationQueue {
    pub fn new() -> (Self, mpsc::Receiver<Activation>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Queue an activation. Returns false if it was dropped.
    pub fn trigger(&self, source: &str) -> bool {
        let activation = Activation {
            source: source.to_string(),
            at: Utc::now(),
        };
        match self.tx.try_send(activation) {
            Ok(()) => {
                debug!(source, "Activation queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                info!(source, "Turn already pending, activation dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(source, "Turn loop has stopped, activation dropped");
                false
            }
        }
    }
}

/// Transcriptions that are not worth routing: stray punctuation, single
/// letters, short digit runs.
pub fn is_noise(text: &str) -> bool {
    let cleaned: String = text.chars().filter(|c| *c != '.' && *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().count() < MIN_UTTERANCE_CHARS {
        return true;
    }
    cleaned.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) && cleaned.chars().count() < MIN_NUMERIC_CHARS
}

/// Serve activations until the queue closes or the transcriber reports its
/// input closed. Returns the number of turns handled.
pub async fn run_turn_loop(
    router: &mut Router,
    mut activations: mpsc::Receiver<Activation>,
    transcriber: &dyn Transcriber,
    speaker: &dyn Speaker,
) -> usize {
    let mut turns = 0;
    info!(transcriber = transcriber.name(), speaker = speaker.name(), "Turn loop started");

    while let Some(activation) = activations.recv().await {
        debug!(source = %activation.source, "Activation received");

        let text = match transcriber.transcribe().await {
            Ok(Some(text)) if !is_noise(&text) => text,
            Ok(Some(text)) => {
                debug!(text = %text, "Ignoring noise transcription");
                continue;
            }
            Ok(None) => {
                debug!("Nothing heard");
                continue;
            }
            Err(SpeechError::InputClosed) => {
                info!("Speech input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                continue;
            }
        };

        info!(text = %text, "Heard");
        let outcome = router.handle_turn(&text).await;
        turns += 1;
        if let Err(e) = speaker.speak(&outcome.reply).await {
            warn!(error = %e, "Could not speak reply");
        }
    }

    info!(turns, "Turn loop stopped");
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CollectingSpeaker, QueuedTranscriber, RecordingTool};
    use linvoice_core::executor::ToolExecutor;
    use linvoice_core::tool::ToolRegistry;
    use linvoice_memory::UserContext;

    #[test]
    fn only_one_activation_waits() {
        let (queue, _rx) = ActivationQueue::new();
        assert!(queue.trigger("hotkey"));
        assert!(!queue.trigger("hotkey"));
        assert!(!queue.clone().trigger("wake-word"));
    }

    #[test]
    fn closed_queue_drops() {
        let (queue, rx) = ActivationQueue::new();
        drop(rx);
        assert!(!queue.trigger("hotkey"));
    }

    #[test]
    fn noise_filter() {
        for text in ["", ".", "a", " , ", "42", "1 2"] {
            assert!(is_noise(text), "{text:?}");
        }
        for text in ["hi", "open firefox", "12345"] {
            assert!(!is_noise(text), "{text:?}");
        }
    }

    #[tokio::test]
    async fn loop_runs_one_turn_per_activation() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RecordingTool::new("open_app", "app_name", "Opened {}")));
        let mut router = Router::new(ToolExecutor::new(registry), UserContext::in_memory().shared());

        let transcriber = QueuedTranscriber::new(&[Some("open firefox"), Some("."), None, Some("thanks")]);
        let speaker = CollectingSpeaker::default();

        let (queue, rx) = ActivationQueue::new();
        let feeder = tokio::spawn(async move {
            for _ in 0..5 {
                while !queue.trigger("test") {
                    tokio::task::yield_now().await;
                }
            }
        });

        let turns = run_turn_loop(&mut router, rx, &transcriber, &speaker).await;
        feeder.abort();

        assert_eq!(turns, 2);
        let spoken = speaker.spoken.lock().unwrap().clone();
        assert_eq!(spoken.len(), 2);
        assert_eq!(spoken[0], "Opened firefox.");
        assert!(spoken[1].starts_with("You're welcome"));
        assert_eq!(router.memory().len(), 2);
    }
}
