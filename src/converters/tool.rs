//! External program invocation shared by the out-of-process adapters.
//!
//! Every call gets its own child process with stdin closed, both output
//! streams captured, and a hard timeout. The child is killed if the future
//! is dropped, so a cancelled job cannot leave an office process behind.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, error};

use crate::error::ConverterError;

/// Longest stderr excerpt kept in a [`ConverterError::ProcessFailed`].
const STDERR_LIMIT: usize = 2000;

/// Locate `command` the way a shell would.
///
/// Commands containing a path separator are checked as given; bare names
/// are searched for in each `PATH` entry.
pub fn find_on_path(command: &str) -> Option<PathBuf> {
    let as_path = Path::new(command);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(command);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Run `command` with `args`, returning its output if it exits with status 0.
pub async fn run_tool<I, S>(
    command: &str,
    args: I,
    timeout: Duration,
) -> Result<Output, ConverterError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let start = Instant::now();
    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command, "Spawning external tool: {:?}", cmd.as_std());

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConverterError::ToolMissing(command.to_string()));
        }
        Ok(Err(e)) => return Err(ConverterError::Io(e)),
        Err(_) => {
            error!(command, secs = timeout.as_secs(), "External tool timed out");
            return Err(ConverterError::Timeout {
                command: command.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    debug!(
        command,
        status = ?output.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "External tool finished"
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConverterError::ProcessFailed {
            command: command.to_string(),
            code: output.status.code(),
            stderr: stderr.chars().take(STDERR_LIMIT).collect(),
        });
    }

    Ok(output)
}
