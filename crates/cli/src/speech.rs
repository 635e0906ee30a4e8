//! Speech backends that shell out to external programs.
//!
//! Recording and synthesis stay outside linvoice: `stt_command` must print
//! one transcription on stdout, `tts_command` reads the reply on stdin
//! (for example `spd-say -e` or `piper ... | aplay`).

use async_trait::async_trait;
use linvoice_core::error::SpeechError;
use linvoice_core::speech::{Speaker, Transcriber};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const STT_TIMEOUT: Duration = Duration::from_secs(60);
const TTS_TIMEOUT: Duration = Duration::from_secs(120);

fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).kill_on_drop(true);
    cmd
}

pub struct CommandTranscriber {
    command: String,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        "command"
    }

    async fn transcribe(&self) -> Result<Option<String>, SpeechError> {
        let mut cmd = shell(&self.command);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = tokio::time::timeout(STT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| SpeechError::CommandFailed(format!("stt command gave no result within {}s", STT_TIMEOUT.as_secs())))?
            .map_err(|e| SpeechError::CommandFailed(format!("could not run stt command: {e}")))?;

        if !output.status.success() {
            return Err(SpeechError::CommandFailed(format!(
                "stt command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(chars = text.len(), "Transcription received");
        Ok((!text.is_empty()).then_some(text))
    }
}

pub struct CommandSpeaker {
    command: String,
}

impl CommandSpeaker {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    fn name(&self) -> &str {
        "command"
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        println!("  > {text}");

        let mut child = shell(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SpeechError::CommandFailed(format!("could not run tts command: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SpeechError::CommandFailed(e.to_string()))?;
        }

        let status = tokio::time::timeout(TTS_TIMEOUT, child.wait())
            .await
            .map_err(|_| SpeechError::CommandFailed("tts command timed out".into()))?
            .map_err(|e| SpeechError::CommandFailed(e.to_string()))?;
        if !status.success() {
            return Err(SpeechError::CommandFailed(format!("tts command exited with {status}")));
        }
        Ok(())
    }
}

/// Prints replies when no speech synthesizer is configured.
pub struct ConsoleSpeaker;

#[async_trait]
impl Speaker for ConsoleSpeaker {
    fn name(&self) -> &str {
        "console"
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        println!("  > {text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transcriber_reads_stdout() {
        let heard = CommandTranscriber::new("echo '  open firefox '").transcribe().await.unwrap();
        assert_eq!(heard.as_deref(), Some("open firefox"));
    }

    #[tokio::test]
    async fn silence_is_none() {
        assert!(CommandTranscriber::new("true").transcribe().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_transcriber_is_error() {
        let err = CommandTranscriber::new("echo mic busy >&2; exit 3").transcribe().await.unwrap_err();
        assert!(err.to_string().contains("mic busy"));
    }

    #[tokio::test]
    async fn speaker_pipes_text_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("spoken.txt");
        let speaker = CommandSpeaker::new(format!("cat > '{}'", out.display()));
        speaker.speak("Opened firefox.").await.unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "Opened firefox.");
    }
}
