//! Typed subprocess builder.
//!
//! Every external tool goes through [`ToolCommand`]. Flags are `'static`
//! literals from a fixed template; values are typed (paths, numbers, a
//! validated URL) and each one lands in exactly one argv slot. Nothing is
//! ever handed to a shell.

use crate::{
    error::{MaestroError, Result},
    policy::ValidatedRequest,
    types::DIAGNOSTIC_LIMIT,
};
use std::{
    ffi::{OsStr, OsString},
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::debug;

#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: &'static str,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(tool: &'static str, program: impl AsRef<OsStr>) -> Self {
        Self {
            tool,
            program: PathBuf::from(program.as_ref()),
            args: Vec::new(),
        }
    }

    /// Fixed template argument.
    pub fn arg(mut self, flag: &'static str) -> Self {
        self.args.push(flag.into());
        self
    }

    pub fn path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_owned());
        self
    }

    /// Seconds with millisecond precision.
    pub fn seconds(mut self, secs: f64) -> Self {
        self.args.push(format!("{secs:.3}").into());
        self
    }

    pub fn uint(mut self, value: u64) -> Self {
        self.args.push(value.to_string().into());
        self
    }

    /// A value assembled by this crate from already-validated numbers.
    pub(crate) fn generated(mut self, value: String) -> Self {
        self.args.push(value.into());
        self
    }

    /// Ends option parsing and appends the validated source URL.
    pub fn url(mut self, req: &ValidatedRequest) -> Self {
        self.args.push("--".into());
        self.args.push(req.url().into());
        self
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub fn run(&self) -> Result<ToolOutput> {
        debug!(tool = self.tool, args = ?self.args, "spawning");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MaestroError::ExternalToolError {
                tool: self.tool.to_string(),
                diagnostic: if e.kind() == ErrorKind::NotFound {
                    format!("{} not found on PATH. Install it first.", self.program.display())
                } else {
                    format!("failed to start {}: {e}", self.program.display())
                },
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let raw = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(MaestroError::ExternalToolError {
                tool: self.tool.to_string(),
                diagnostic: truncate_diagnostic(raw.trim(), DIAGNOSTIC_LIMIT),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Cut `text` to at most `limit` bytes without splitting a character.
pub fn truncate_diagnostic(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
