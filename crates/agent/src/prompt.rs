//! Prompt assembly for the LLM path.
//!
//! Two prompts per turn at most: the tool-selection prompt (persona, tool
//! reference, user context, recent history, the utterance) and the follow-up
//! prompt that turns tool results into one spoken sentence.

use linvoice_core::executor::format_result_for_llm;
use linvoice_core::tool::{ToolCall, ToolRegistry, ToolResult};

pub struct PromptBuilder {
    assistant_name: String,
}

impl PromptBuilder {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
        }
    }

    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    /// Persona, rules, and the tool reference.
    pub fn system(&self, registry: &ToolRegistry) -> String {
        format!(
            "You are {name}, a voice assistant running on the user's Linux desktop.\n\
             Your replies are spoken aloud, so keep them to one or two short sentences.\n\
             \n\
             AVAILABLE TOOLS:\n\
             {tools}\n\
             \n\
             RULES:\n\
             - For actions, respond with: TOOL: name(param=\"value\")\n\
             - Output only the TOOL line for actions, nothing else.\n\
             - Several actions may be requested with one TOOL line each.\n\
             - Use exact tool names and parameter names from the list above.\n\
             - For questions or conversation, answer directly without a TOOL line.\n\
             - Ask before logging out, shutting down or rebooting; pass confirmed=true only after the user agrees.\n\
             - Never describe which tool you would use; call it.",
            name = self.assistant_name,
            tools = registry.render_reference(),
        )
    }

    /// The per-turn prompt. Empty sections are left out.
    pub fn request(&self, utterance: &str, user_summary: &str, history: &str) -> String {
        let mut sections = Vec::new();
        if !user_summary.is_empty() {
            sections.push(format!("ABOUT THE USER:\n{user_summary}"));
        }
        if !history.is_empty() {
            sections.push(format!("RECENT CONVERSATION:\n{history}"));
        }
        sections.push(format!("User: {utterance}\nAssistant:"));
        sections.join("\n\n")
    }

    /// Ask for a spoken confirmation of what the tools did.
    pub fn follow_up(&self, utterance: &str, results: &[(ToolCall, ToolResult)]) -> String {
        let rendered = results
            .iter()
            .map(|(call, result)| format!("{}:\n{}", call, format_result_for_llm(result)))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Based on the tool results below, provide a brief spoken confirmation for the user. \
             Mention concrete numbers when the results contain them. If something failed, say so plainly. \
             Do not call any tools.\n\n\
             USER REQUEST: {utterance}\n\n\
             TOOL RESULTS:\n{rendered}\n\n\
             Respond with a brief, natural confirmation of what was accomplished:"
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("JARVIS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use linvoice_core::error::ToolError;
    use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter};

    struct OpenApp;

    #[async_trait]
    impl Tool for OpenApp {
        fn name(&self) -> &str {
            "open_app"
        }
        fn description(&self) -> &str {
            "Launch an application"
        }
        fn parameters(&self) -> Vec<ToolParameter> {
            vec![ToolParameter::required("app_name", ParamType::String, "App to open")]
        }
        async fn execute(&self, _arguments: Arguments) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::message("ok"))
        }
    }

    #[test]
    fn system_prompt_lists_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(OpenApp));
        let system = PromptBuilder::new("Friday").system(&registry);
        assert!(system.starts_with("You are Friday"));
        assert!(system.contains("- open_app(app_name: string) - Launch an application"));
        assert!(system.contains("TOOL: name(param=\"value\")"));
    }

    #[test]
    fn request_skips_empty_sections() {
        let prompts = PromptBuilder::default();
        let bare = prompts.request("hi", "", "");
        assert_eq!(bare, "User: hi\nAssistant:");

        let full = prompts.request("close it", "User Info: name: Sam", "User: open vlc\nAssistant: Opened vlc");
        assert!(full.starts_with("ABOUT THE USER:\nUser Info: name: Sam"));
        assert!(full.contains("RECENT CONVERSATION:\nUser: open vlc"));
        assert!(full.ends_with("User: close it\nAssistant:"));
    }

    #[test]
    fn follow_up_includes_failures() {
        let call = ToolCall::new("open_app", Arguments::new()).with_arg("app_name", "gimp");
        let prompt = PromptBuilder::default().follow_up(
            "open gimp",
            &[(call, ToolResult::failed("gimp is not installed"))],
        );
        assert!(prompt.contains("USER REQUEST: open gimp"));
        assert!(prompt.contains("open_app(app_name=\"gimp\"):\nError: gimp is not installed"));
    }
}
