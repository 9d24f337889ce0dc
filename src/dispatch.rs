//! Runs the pipeline tool against the active project and captures its output.

use crate::actions::Action;
use crate::error::PanelError;
use std::fs::{self, File};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

pub const OUTPUT_FILE: &str = "output.txt";

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub tool: String,
    pub action: Action,
    pub options: Vec<String>,
    pub config_file: PathBuf,
}

/// Result of running the tool. Returned whatever the exit status.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub command: Vec<String>,
    pub lines: Vec<String>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ActionOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl ActionRequest {
    /// Validate `options` against `action` and drop repeats, keeping the
    /// first occurrence of each.
    pub fn new(
        tool: impl Into<String>,
        action: Action,
        options: impl IntoIterator<Item = String>,
        config_file: impl Into<PathBuf>,
    ) -> Result<Self, PanelError> {
        let mut unique: Vec<String> = Vec::new();
        for option in options {
            if !action.accepts(&option) {
                return Err(PanelError::UnknownOption {
                    action: action.to_string(),
                    option,
                });
            }
            if !unique.contains(&option) {
                unique.push(option);
            }
        }
        Ok(Self {
            tool: tool.into(),
            action,
            options: unique,
            config_file: config_file.into(),
        })
    }

    /// Argument vector: tool, action, options, config path.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.options.len() + 3);
        argv.push(self.tool.clone());
        argv.push(self.action.as_str().to_string());
        argv.extend(self.options.iter().cloned());
        argv.push(self.config_file.to_string_lossy().into_owned());
        argv
    }
}

/// Run the tool to completion. Blocks the calling thread.
pub fn execute(request: &ActionRequest) -> Result<ActionOutput, PanelError> {
    let argv = request.argv();
    info!(command = ?argv, "running pipeline tool");

    let workdir = tempfile::Builder::new()
        .prefix("caravel-")
        .tempdir()
        .map_err(|e| PanelError::Internal(format!("temp dir: {}", e)))?;
    info!(dir = %workdir.path().display(), "created temporary directory");

    let result = run_captured(request, &argv, workdir.path());

    let dir = workdir.path().to_path_buf();
    if let Err(e) = workdir.close() {
        warn!(dir = %dir.display(), error = %e, "failed to remove temporary directory");
    }
    result
}

fn run_captured(
    request: &ActionRequest,
    argv: &[String],
    workdir: &Path,
) -> Result<ActionOutput, PanelError> {
    let output_path = workdir.join(OUTPUT_FILE);
    let stdout = File::create(&output_path)
        .map_err(|e| PanelError::Internal(format!("create {}: {}", output_path.display(), e)))?;

    let status = Command::new(&request.tool)
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .status()
        .map_err(|source| PanelError::ExternalTool {
            tool: request.tool.clone(),
            source,
        })?;
    info!(status = ?status, "pipeline tool exited");

    let captured = fs::read(&output_path)
        .map_err(|e| PanelError::Internal(format!("read {}: {}", output_path.display(), e)))?;
    let lines = String::from_utf8_lossy(&captured)
        .lines()
        .map(str::to_string)
        .collect();

    Ok(ActionOutput {
        command: argv.to_vec(),
        lines,
        exit_code: status.code(),
        signal: status.signal(),
    })
}
