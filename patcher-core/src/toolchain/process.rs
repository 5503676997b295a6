//! Subprocess helpers.
//!
//! - [`exec`] runs a program to completion and captures its output.
//! - [`spawn_logged`] streams a long-running build's output, line by line,
//!   into the output buffer.
//! - [`sudo_exec`] re-runs a shell command with elevated privileges.

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::output;
use crate::plog;

/// Name shown when asking for elevated privileges.
pub const ELEVATION_LABEL: &str = "Librespot Patcher";

// ============================================================================
// Captured Execution
// ============================================================================

/// Result of a captured command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs `program` with `args` and captures stdout/stderr.
pub async fn exec<S: AsRef<OsStr>>(program: impl AsRef<OsStr>, args: &[S]) -> Result<ExecOutput> {
    let program = program.as_ref();
    debug!("exec {:?}", program);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program.to_string_lossy()))?;

    Ok(ExecOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Looks an executable up on `PATH`.
pub fn which(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) if path.exists() => {
            debug!("Found {} at {}", name, path.display());
            Some(path)
        }
        _ => {
            debug!("{} not found on PATH", name);
            None
        }
    }
}

// ============================================================================
// Streamed Execution
// ============================================================================

#[derive(Debug, Clone)]
enum Invocation {
    Program { program: OsString, args: Vec<OsString> },
    Shell(String),
}

/// A command to spawn with its output mirrored into the output buffer.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    invocation: Invocation,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    /// Runs `program` directly.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            invocation: Invocation::Program {
                program: program.as_ref().to_os_string(),
                args: Vec::new(),
            },
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Runs `script` through `sh -c` (or `cmd /C` on Windows).
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::Shell(script.into()),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Appends an argument. Ignored for shell scripts.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        if let Invocation::Program { args, .. } = &mut self.invocation {
            args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        match &self.invocation {
            Invocation::Shell(script) => script.clone(),
            Invocation::Program { program, args } => {
                let mut parts = vec![program.to_string_lossy().to_string()];
                parts.extend(args.iter().map(|a| a.to_string_lossy().to_string()));
                parts.join(" ")
            }
        }
    }

    fn build(&self) -> Command {
        let mut cmd = match &self.invocation {
            Invocation::Program { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Invocation::Shell(script) => {
                let (shell, shell_arg) = if cfg!(windows) {
                    ("cmd", "/C")
                } else {
                    ("sh", "-c")
                };
                let mut cmd = Command::new(shell);
                cmd.arg(shell_arg).arg(script);
                cmd
            }
        };

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        // Headless output for the log pane
        cmd.env("TERM", "dumb");
        cmd.env("NO_COLOR", "1");
        cmd.env("CLICOLOR", "0");

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

/// Spawns a command and forwards its stdout and stderr to the output buffer.
///
/// Returns the exit status; callers decide whether a non-zero exit is fatal.
pub async fn spawn_logged(spec: &CommandSpec) -> Result<ExitStatus> {
    if let Some(dir) = &spec.cwd {
        if !dir.is_dir() {
            anyhow::bail!("Working directory does not exist: {}", dir.display());
        }
    }

    info!(command = %spec.display(), cwd = ?spec.cwd, "Spawning command");

    let mut child = spec
        .build()
        .spawn()
        .with_context(|| format!("Failed to spawn: {}", spec.display()))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::join!(forward_lines(stdout), forward_lines(stderr));

    let status = child
        .wait()
        .await
        .with_context(|| format!("Failed to wait for: {}", spec.display()))?;

    debug!(command = %spec.display(), ?status, "Command finished");
    Ok(status)
}

/// Like [`spawn_logged`] but treats a non-zero exit as an error.
pub async fn spawn_checked(spec: &CommandSpec) -> Result<()> {
    let status = spawn_logged(spec).await?;
    if !status.success() {
        anyhow::bail!(
            "Command failed ({}): {}",
            describe_status(&status),
            spec.display()
        );
    }
    Ok(())
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>) {
    if let Some(reader) = reader {
        read_lossy_lines(reader, output::log_line).await;
    }
}

/// Reads `reader` to EOF and hands each non-blank line to `sink`.
///
/// Invalid UTF-8 is replaced instead of ending the read: the pipe must stay
/// drained until the child exits, or its next write fails with `SIGPIPE`.
async fn read_lossy_lines<R, F>(reader: R, mut sink: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if !line.trim().is_empty() {
                    sink(line);
                }
            }
            Err(e) => {
                debug!("Stopped reading command output: {}", e);
                break;
            }
        }
    }
}

fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

// ============================================================================
// Elevated Execution
// ============================================================================

/// Runs a shell command with elevated privileges.
///
/// - Linux: `pkexec sh -c <command>` (graphical polkit prompt)
/// - Windows: `Start-Process -Verb RunAs` through PowerShell (UAC prompt)
pub async fn sudo_exec(command: &str) -> Result<ExecOutput> {
    plog!(ELEVATION_LABEL, "is requesting elevated privileges to run:", command);

    let output = if cfg!(windows) {
        let script = elevation_script(command);
        exec("powershell", &["-NoProfile", "-NonInteractive", "-Command", script.as_str()]).await?
    } else {
        let pkexec = which("pkexec")
            .ok_or_else(|| anyhow::anyhow!("pkexec is required for elevated file replacement"))?;
        exec(pkexec, &["sh", "-c", command]).await?
    };

    if !output.success() {
        anyhow::bail!(
            "Elevated command failed ({}): {}",
            describe_status(&output.status),
            output.stderr.trim()
        );
    }

    Ok(output)
}

/// PowerShell script running `command` through an elevated `cmd`.
///
/// `Start-Process` only reports the child's exit code with `-PassThru`; the
/// script re-exits with it so a failed elevated command is not mistaken for
/// success.
fn elevation_script(command: &str) -> String {
    format!(
        "$p = Start-Process -FilePath cmd -ArgumentList '/C', '{}' -Verb RunAs -Wait -PassThru -WindowStyle Hidden; exit $p.ExitCode",
        command.replace('\'', "''")
    )
}

/// Quotes a path for inclusion in a shell command.
pub fn quote_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        format!("\"{}\"", s.replace('"', ""))
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
