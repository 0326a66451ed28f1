//! Render pipeline seam.
//!
//! The worker treats rendering as an external capability. The default
//! implementation shells out to a render command that prints a JSON result
//! on stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use clipstudio_models::{ClipPayload, JobId};

use crate::error::{WorkerError, WorkerResult};

/// What a render produced. `result` is reported to the coordinator verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    pub result: Option<Value>,
}

impl RenderOutput {
    pub fn new(result: Value) -> Self {
        Self {
            result: Some(result),
        }
    }
}

/// Renders one clip.
#[async_trait]
pub trait RenderPipeline: Send + Sync {
    async fn render(&self, job_id: &JobId, payload: &ClipPayload) -> WorkerResult<RenderOutput>;
}

/// Runs an external render command:
/// `<program> [args..] --video-id ID --start S --end E --layout L --platforms P --output-dir DIR`.
#[derive(Debug, Clone)]
pub struct CommandRenderPipeline {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CommandRenderPipeline {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            timeout,
        }
    }

    /// Parse a whitespace separated command line, program first.
    pub fn from_command_line(
        command_line: &str,
        work_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> WorkerResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| WorkerError::config_error("render command is empty"))?;
        Ok(Self::new(program, work_dir, timeout).with_args(parts))
    }

    /// Leading arguments placed before the clip arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Fail fast if the render program is not on `PATH`.
    pub fn check_available(&self) -> WorkerResult<PathBuf> {
        which::which(&self.program).map_err(|_| {
            WorkerError::config_error(format!("render command '{}' not found", self.program))
        })
    }

    fn clip_args(payload: &ClipPayload, output_dir: &std::path::Path) -> Vec<String> {
        let platforms = payload
            .platforms
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",");

        vec![
            "--video-id".to_string(),
            payload.source.youtube_video_id.clone(),
            "--start".to_string(),
            payload.start.to_string(),
            "--end".to_string(),
            payload.end.to_string(),
            "--layout".to_string(),
            payload.layout_mode.as_str().to_string(),
            "--platforms".to_string(),
            platforms,
            "--output-dir".to_string(),
            output_dir.display().to_string(),
        ]
    }
}

#[async_trait]
impl RenderPipeline for CommandRenderPipeline {
    async fn render(&self, job_id: &JobId, payload: &ClipPayload) -> WorkerResult<RenderOutput> {
        self.check_available()?;

        let output_dir = self.work_dir.join(job_id.as_str());
        tokio::fs::create_dir_all(&output_dir).await?;

        let clip_args = Self::clip_args(payload, &output_dir);
        debug!("Running render: {} {} {}", self.program, self.args.join(" "), clip_args.join(" "));

        let child = Command::new(&self.program)
            .args(&self.args)
            .args(&clip_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(job_id = %job_id, "Render timed out after {:?}, killing process", self.timeout);
                return Err(WorkerError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::render_failed(format!(
                "render exited with {}: {}",
                output.status,
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(RenderOutput::default());
        }

        let value: Value = serde_json::from_str(stdout)
            .map_err(|e| WorkerError::render_failed(format!("render printed invalid JSON: {}", e)))?;

        Ok(RenderOutput {
            result: (!value.is_null()).then_some(value),
        })
    }
}

/// Characters of render stderr kept in the reported error.
const STDERR_TAIL_CHARS: usize = 500;

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    match s.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
