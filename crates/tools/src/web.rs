//! Web tools: instant-answer search, page fetch, and opening sites in the
//! desktop browser.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, int_arg, str_arg};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::process::{run_bounded, truncate};

const DDG_URL: &str = "https://api.duckduckgo.com/";

fn network_error(tool_name: &str, e: reqwest::Error, timeout: Duration) -> ToolError {
    if e.is_timeout() {
        ToolError::Timeout {
            tool_name: tool_name.into(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "FirstURL")]
    first_url: Option<String>,
}

fn collect_results(answer: &InstantAnswer, max_results: usize) -> Vec<serde_json::Value> {
    let mut results = Vec::new();
    if !answer.answer.is_empty() {
        results.push(json!({"title": "Answer", "snippet": answer.answer, "url": ""}));
    }
    if !answer.abstract_text.is_empty() {
        let title = if answer.heading.is_empty() { "Summary" } else { answer.heading.as_str() };
        results.push(json!({"title": title, "snippet": answer.abstract_text, "url": answer.abstract_url}));
    }
    for topic in &answer.related_topics {
        if results.len() >= max_results {
            break;
        }
        if let Some(text) = &topic.text {
            let title = text.split(" - ").next().unwrap_or(text);
            results.push(json!({
                "title": title,
                "snippet": text,
                "url": topic.first_url.clone().unwrap_or_default(),
            }));
        }
    }
    results.truncate(max_results);
    results
}

pub struct SearchWebTool {
    client: reqwest::Client,
    timeout: Duration,
}

impl SearchWebTool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Look something up on the web and return short answers with sources"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("query", ParamType::String, "What to search for"),
            ToolParameter::optional("max_results", ParamType::Int, "Maximum results").with_default(5),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let query = str_arg(&arguments, "query")?;
        let max_results = int_arg(&arguments, "max_results").unwrap_or(5).clamp(1, 20) as usize;

        debug!(query = %query, "Searching the web");
        let response = self
            .client
            .get(DDG_URL)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| network_error("search_web", e, self.timeout))?;

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| network_error("search_web", e, self.timeout))?;
        let results = collect_results(&answer, max_results);

        if results.is_empty() {
            return Ok(ToolResult::message(format!("No instant answer found for '{query}'")).with("count", 0));
        }
        Ok(ToolResult::ok(Arguments::new())
            .with("query", query)
            .with("count", results.len())
            .with("results", results))
    }
}

pub struct FetchUrlTool {
    client: reqwest::Client,
    timeout: Duration,
}

impl FetchUrlTool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Download a web page and return the start of its text"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("url", ParamType::String, "http or https URL"),
            ToolParameter::optional("max_length", ParamType::Int, "Characters to return").with_default(2000),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let url = str_arg(&arguments, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!("not an http(s) URL: {url}")));
        }
        let max_length = int_arg(&arguments, "max_length").unwrap_or(2000).clamp(100, 20_000) as usize;

        let response = self
            .client
            .get(url)
            .header("User-Agent", concat!("linvoice/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| network_error("fetch_url", e, self.timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("fetch_url", e, self.timeout))?;
        let (content, truncated) = truncate(&body, max_length);

        let result = if (200..300).contains(&status) {
            ToolResult::ok(Arguments::new())
        } else {
            ToolResult::failed(format!("HTTP {status} from {url}"))
        };
        Ok(result
            .with("url", url)
            .with("status_code", status)
            .with("content", content)
            .with("truncated", truncated))
    }
}

const WEBSITES: &[(&str, &str)] = &[
    ("google", "https://www.google.com"),
    ("gmail", "https://mail.google.com"),
    ("email", "https://mail.google.com"),
    ("youtube", "https://www.youtube.com"),
    ("github", "https://github.com"),
    ("reddit", "https://www.reddit.com"),
    ("wikipedia", "https://www.wikipedia.org"),
    ("stackoverflow", "https://stackoverflow.com"),
    ("stack overflow", "https://stackoverflow.com"),
    ("maps", "https://maps.google.com"),
    ("calendar", "https://calendar.google.com"),
    ("drive", "https://drive.google.com"),
    ("news", "https://news.google.com"),
    ("netflix", "https://www.netflix.com"),
];

const ACTIONS: &[(&str, &str)] = &[
    ("check email", "gmail"),
    ("check my email", "gmail"),
    ("watch videos", "youtube"),
    ("watch youtube", "youtube"),
    ("check calendar", "calendar"),
];

/// Whether `name` is one of the sites `open_website` knows by name.
pub fn is_known_website(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    WEBSITES.iter().any(|(site, _)| *site == name) || ACTIONS.iter().any(|(phrase, _)| *phrase == name)
}

/// Turn a spoken site name or action phrase into a URL.
pub fn resolve_website(website: &str) -> String {
    let name = website.trim().to_lowercase();
    let name = ACTIONS
        .iter()
        .find(|(phrase, _)| *phrase == name)
        .map(|(_, site)| site.to_string())
        .unwrap_or(name);

    if let Some((_, url)) = WEBSITES.iter().find(|(site, _)| *site == name) {
        return url.to_string();
    }
    if name.starts_with("http://") || name.starts_with("https://") {
        return name;
    }
    if name.contains('.') && !name.contains(' ') {
        return format!("https://{name}");
    }
    format!("https://duckduckgo.com/?q={}", name.replace(' ', "+"))
}

pub struct OpenWebsiteTool {
    timeout: Duration,
}

impl OpenWebsiteTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for OpenWebsiteTool {
    fn name(&self) -> &str {
        "open_website"
    }

    fn description(&self) -> &str {
        "Open a website in the browser by name ('youtube', 'gmail'), domain, or phrase ('check email')"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required("website", ParamType::String, "Site name, domain or URL")]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let website = str_arg(&arguments, "website")?;
        let url = resolve_website(website);
        let out = run_bounded("open_website", "xdg-open", &[url.as_str()], None, self.timeout).await?;
        if !out.success() {
            return Ok(ToolResult::failed(format!("Could not open {url}: {}", out.stderr)));
        }
        info!(url = %url, "Opened website");
        Ok(ToolResult::message(format!("Opened {website}")).with("url", url))
    }
}
