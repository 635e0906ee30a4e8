//! Shared test helpers for router and turn-loop tests.

use async_trait::async_trait;
use linvoice_core::error::{ProviderError, SpeechError, ToolError};
use linvoice_core::provider::{GenerationRequest, Provider};
use linvoice_core::speech::{Speaker, Transcriber};
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A provider that returns a sequence of scripted replies.
///
/// Each call to `generate` pops the next entry. Panics if more calls are made
/// than entries provided. Every request is kept for inspection.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        match replies.pop_front() {
            Some(reply) => reply,
            None => panic!("ScriptedProvider: no more replies (call #{})", self.call_count()),
        }
    }
}

/// A provider that never answers.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging_mock"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::EmptyResponse)
    }
}

/// A tool that records its arguments and replies with a fixed message.
pub struct RecordingTool {
    name: String,
    param: String,
    reply: String,
    calls: Arc<Mutex<Vec<Arguments>>>,
}

impl RecordingTool {
    /// `reply` may contain `{}`, replaced by the value of `param`.
    pub fn new(name: &str, param: &str, reply: &str) -> Self {
        Self {
            name: name.into(),
            param: param.into(),
            reply: reply.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Arguments>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records every call"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(&self.param, ParamType::String, "Target")]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let value = arguments
            .get(&self.param)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.calls.lock().unwrap().push(arguments);
        Ok(ToolResult::message(self.reply.replace("{}", &value)).with(&self.param, value))
    }
}

/// Fixed system stats, so replies are predictable.
pub struct FakeSystemInfo;

#[async_trait]
impl Tool for FakeSystemInfo {
    fn name(&self) -> &str {
        "get_system_info"
    }

    fn description(&self) -> &str {
        "System stats"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::optional("info_type", ParamType::String, "cpu, memory, disk or all").with_default("all")]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(Arguments::new())
            .with("info_type", arguments.get("info_type").cloned().unwrap_or_default())
            .with("cpu_percent", 23.5))
    }
}

/// Hands out queued utterances, then reports the input as closed.
pub struct QueuedTranscriber {
    utterances: Mutex<VecDeque<Option<String>>>,
}

impl QueuedTranscriber {
    pub fn new(utterances: &[Option<&str>]) -> Self {
        Self {
            utterances: Mutex::new(utterances.iter().map(|u| u.map(String::from)).collect()),
        }
    }
}

#[async_trait]
impl Transcriber for QueuedTranscriber {
    fn name(&self) -> &str {
        "queued_mock"
    }

    async fn transcribe(&self) -> Result<Option<String>, SpeechError> {
        self.utterances
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(SpeechError::InputClosed)
    }
}

/// Collects everything it is asked to say.
#[derive(Default)]
pub struct CollectingSpeaker {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl Speaker for CollectingSpeaker {
    fn name(&self) -> &str {
        "collecting_mock"
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
