//! System statistics read straight from `/proc` and `df`.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, int_arg, opt_str_arg};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::process::run_bounded;

/// Gap between the two `/proc/stat` samples used for CPU usage.
const CPU_SAMPLE: Duration = Duration::from_millis(250);

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Aggregate CPU counters from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

pub fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: values.iter().sum(),
    })
}

/// Busy percentage between two samples.
pub fn cpu_percent(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let idle = after.idle.saturating_sub(before.idle);
    round1(100.0 * (total - idle.min(total)) as f64 / total as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

pub fn parse_meminfo(content: &str) -> Option<MemInfo> {
    let field = |name: &str| {
        content
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse::<u64>().ok())
    };
    let total_kb = field("MemTotal:")?;
    let available_kb = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    Some(MemInfo {
        total_kb,
        available_kb,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskInfo {
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
}

/// Parse `df -Pk` output (POSIX format, 1K blocks).
pub fn parse_df(output: &str) -> Option<DiskInfo> {
    let line = output.lines().nth(1)?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    Some(DiskInfo {
        total_kb: cols.get(1)?.parse().ok()?,
        used_kb: cols.get(2)?.parse().ok()?,
        free_kb: cols.get(3)?.parse().ok()?,
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn kb_to_gb(kb: u64) -> f64 {
    (kb as f64 * 1024.0 / GIB * 100.0).round() / 100.0
}

fn io_error(e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "get_system_info".into(),
        reason: e.to_string(),
    }
}

pub struct GetSystemInfoTool {
    timeout: Duration,
}

impl GetSystemInfoTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn cpu(&self) -> Result<f64, ToolError> {
        let first = tokio::fs::read_to_string("/proc/stat").await.map_err(io_error)?;
        tokio::time::sleep(CPU_SAMPLE).await;
        let second = tokio::fs::read_to_string("/proc/stat").await.map_err(io_error)?;
        match (parse_proc_stat(&first), parse_proc_stat(&second)) {
            (Some(a), Some(b)) => Ok(cpu_percent(a, b)),
            _ => Err(ToolError::ExecutionFailed {
                tool_name: "get_system_info".into(),
                reason: "unrecognized /proc/stat format".into(),
            }),
        }
    }

    async fn memory(&self) -> Result<MemInfo, ToolError> {
        let content = tokio::fs::read_to_string("/proc/meminfo").await.map_err(io_error)?;
        parse_meminfo(&content).ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: "get_system_info".into(),
            reason: "unrecognized /proc/meminfo format".into(),
        })
    }

    async fn disk(&self) -> Result<DiskInfo, ToolError> {
        let out = run_bounded("get_system_info", "df", &["-Pk", "/"], None, self.timeout).await?;
        parse_df(&out.stdout).ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: "get_system_info".into(),
            reason: "unrecognized df output".into(),
        })
    }
}

#[async_trait]
impl Tool for GetSystemInfoTool {
    fn name(&self) -> &str {
        "get_system_info"
    }

    fn description(&self) -> &str {
        "Get CPU usage, memory usage and free disk space"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::optional("info_type", ParamType::String, "One of 'cpu', 'memory', 'disk', 'all'")
                .with_default("all"),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let info_type = opt_str_arg(&arguments, "info_type").unwrap_or("all").to_lowercase();
        let info_type = match info_type.as_str() {
            "ram" => "memory",
            "storage" => "disk",
            "cpu" | "memory" | "disk" | "all" => info_type.as_str(),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "info_type must be cpu, memory, disk or all, got '{other}'"
                )));
            }
        };
        let wants = |kind: &str| info_type == kind || info_type == "all";

        let mut result = ToolResult::ok(Arguments::new()).with("info_type", info_type);
        if wants("cpu") {
            let percent = self.cpu().await?;
            let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            result = result.with("cpu_percent", percent).with("cpu_count", cores);
        }
        if wants("memory") {
            let mem = self.memory().await?;
            let used = mem.total_kb.saturating_sub(mem.available_kb);
            let percent = if mem.total_kb == 0 { 0.0 } else { round1(100.0 * used as f64 / mem.total_kb as f64) };
            result = result
                .with("memory_percent", percent)
                .with("memory_used_gb", kb_to_gb(used))
                .with("memory_total_gb", kb_to_gb(mem.total_kb));
        }
        if wants("disk") {
            let disk = self.disk().await?;
            let percent = if disk.total_kb == 0 { 0.0 } else { round1(100.0 * disk.used_kb as f64 / disk.total_kb as f64) };
            result = result
                .with("disk_percent", percent)
                .with("disk_free_gb", kb_to_gb(disk.free_kb))
                .with("disk_total_gb", kb_to_gb(disk.total_kb));
        }

        debug!(info_type = %info_type, "Collected system info");
        Ok(result)
    }
}

pub struct GetProcessesTool;

/// Resident memory in kB from a `/proc/<pid>/status` file.
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

#[async_trait]
impl Tool for GetProcessesTool {
    fn name(&self) -> &str {
        "get_processes"
    }

    fn description(&self) -> &str {
        "List running processes with their memory use, optionally filtered by name"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::optional("name_filter", ParamType::String, "Case-insensitive substring of the process name"),
            ToolParameter::optional("max_results", ParamType::Int, "Maximum processes to return").with_default(10),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let filter = opt_str_arg(&arguments, "name_filter").map(str::to_lowercase);
        let max = int_arg(&arguments, "max_results").unwrap_or(10).clamp(1, 100) as usize;

        let mut entries = tokio::fs::read_dir("/proc").await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_processes".into(),
            reason: e.to_string(),
        })?;

        let mut processes = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            // Processes can exit between listing and reading.
            let Ok(comm) = tokio::fs::read_to_string(entry.path().join("comm")).await else {
                continue;
            };
            let name = comm.trim().to_string();
            if filter.as_ref().is_some_and(|f| !name.to_lowercase().contains(f)) {
                continue;
            }
            let rss_kb = tokio::fs::read_to_string(entry.path().join("status"))
                .await
                .ok()
                .and_then(|s| parse_vm_rss(&s))
                .unwrap_or(0);
            processes.push((pid, name, rss_kb));
        }

        processes.sort_by(|a, b| b.2.cmp(&a.2));
        processes.truncate(max);

        let list: Vec<serde_json::Value> = processes
            .iter()
            .map(|(pid, name, rss)| json!({"pid": pid, "name": name, "memory_mb": rss / 1024}))
            .collect();
        Ok(ToolResult::ok(Arguments::new())
            .with("count", list.len())
            .with("processes", list))
    }
}
