//! Directory listing, file search and text file reading.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, bool_arg, int_arg, opt_str_arg, str_arg};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Most entries `list_files` returns.
const MAX_ENTRIES: usize = 50;

/// Directory entries `search_files` looks at before giving up.
const MAX_VISITED: usize = 20_000;

/// Paths that are never read, relative to `$HOME` when they start with `~/`.
const FORBIDDEN: &[&str] = &["~/.ssh", "~/.gnupg", "~/.aws", "/etc/shadow", "/etc/gshadow", "/root"];

fn home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
}

/// Expand a leading `~` and make the path absolute.
pub fn expand_path(raw: &str) -> PathBuf {
    let path = match raw.strip_prefix("~") {
        Some(rest) => home().join(rest.trim_start_matches('/')),
        None => PathBuf::from(raw),
    };
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().map(|cwd| cwd.join(&path)).unwrap_or(path)
    }
}

fn is_forbidden(path: &Path) -> bool {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    FORBIDDEN.iter().any(|f| resolved.starts_with(expand_path(f)))
}

/// Shell-style match supporting `*` and `?`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

fn failed(tool_name: &str, reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason,
    }
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory, optionally filtered by a pattern such as *.py"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::optional("path", ParamType::String, "Directory to list").with_default("."),
            ToolParameter::optional("pattern", ParamType::String, "File name pattern").with_default("*"),
            ToolParameter::optional("recursive", ParamType::Bool, "Descend into subdirectories").with_default(false),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let raw = opt_str_arg(&arguments, "path").unwrap_or(".");
        let pattern = opt_str_arg(&arguments, "pattern").unwrap_or("*");
        let recursive = bool_arg(&arguments, "recursive").unwrap_or(false);
        let root = expand_path(raw);

        if !root.is_dir() {
            return Ok(ToolResult::failed(format!("Not a directory: {raw}")));
        }
        if is_forbidden(&root) {
            return Err(ToolError::PermissionDenied {
                tool_name: "list_files".into(),
                reason: format!("{raw} is a protected location"),
            });
        }

        let mut pending = vec![root.clone()];
        let mut files = Vec::new();
        let mut total = 0usize;
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| failed("list_files", format!("{}: {e}", dir.display())))?;
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                if recursive && meta.is_dir() {
                    pending.push(entry.path());
                }
                if !glob_match(pattern, &name) {
                    continue;
                }
                total += 1;
                if files.len() < MAX_ENTRIES {
                    let kind = if meta.is_dir() { "directory" } else { "file" };
                    let size = meta.is_file().then(|| meta.len());
                    files.push(json!({
                        "name": name,
                        "path": entry.path().display().to_string(),
                        "type": kind,
                        "size": size,
                    }));
                }
            }
        }

        Ok(ToolResult::ok(Arguments::new())
            .with("path", root.display().to_string())
            .with("count", total)
            .with("files", files))
    }
}

pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search a directory tree for files whose name matches a pattern such as *.pdf or notes.txt"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("filename_pattern", ParamType::String, "Name pattern, * and ? allowed"),
            ToolParameter::optional("search_path", ParamType::String, "Directory to search").with_default("~"),
            ToolParameter::optional("max_results", ParamType::Int, "Matches to return").with_default(20),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let pattern = str_arg(&arguments, "filename_pattern")?;
        let raw = opt_str_arg(&arguments, "search_path").unwrap_or("~");
        let max_results = int_arg(&arguments, "max_results").unwrap_or(20).clamp(1, MAX_ENTRIES as i64) as usize;
        let root = expand_path(raw);

        if !root.is_dir() {
            return Ok(ToolResult::failed(format!("Search path does not exist: {raw}")));
        }
        if is_forbidden(&root) {
            return Err(ToolError::PermissionDenied {
                tool_name: "search_files".into(),
                reason: format!("{raw} is a protected location"),
            });
        }

        let mut pending = vec![root.clone()];
        let mut matches = Vec::new();
        let mut visited = 0usize;
        'walk: while let Some(dir) = pending.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                visited += 1;
                if visited > MAX_VISITED {
                    debug!(root = %root.display(), "Search stopped at visit limit");
                    break 'walk;
                }
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_dir() && !is_forbidden(&path) {
                    pending.push(path.clone());
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if glob_match(pattern, &name) {
                    let kind = if file_type.is_dir() { "directory" } else { "file" };
                    matches.push(json!({
                        "name": name,
                        "path": path.display().to_string(),
                        "type": kind,
                    }));
                    if matches.len() >= max_results {
                        break 'walk;
                    }
                }
            }
        }

        Ok(ToolResult::ok(Arguments::new())
            .with("search_path", root.display().to_string())
            .with("pattern", pattern)
            .with("count", matches.len())
            .with("matches", matches))
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the first lines of a text file"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("file_path", ParamType::String, "File to read"),
            ToolParameter::optional("max_lines", ParamType::Int, "Lines to return").with_default(100),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let raw = str_arg(&arguments, "file_path")?;
        let max_lines = int_arg(&arguments, "max_lines").unwrap_or(100).max(1) as usize;
        let path = expand_path(raw);

        if !path.is_file() {
            return Ok(ToolResult::failed(format!("File does not exist: {raw}")));
        }
        if is_forbidden(&path) {
            return Err(ToolError::PermissionDenied {
                tool_name: "read_file".into(),
                reason: format!("{raw} is a protected location"),
            });
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| failed("read_file", format!("{raw}: {e}")))?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().take(max_lines + 1).collect();
        let truncated = lines.len() > max_lines;
        let content = lines[..lines.len().min(max_lines)].join("\n");

        Ok(ToolResult::ok(Arguments::new())
            .with("file_path", path.display().to_string())
            .with("lines_read", lines.len().min(max_lines))
            .with("content", content)
            .with("truncated", truncated))
    }
}
