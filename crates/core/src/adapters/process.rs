//! Running external command-line tools.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT_CHARS: usize = 500;

/// Run `program` to completion and return its stdout.
///
/// Errors are plain messages: spawn failure, timeout (the child is killed),
/// or non-zero exit with the tail of stderr.
pub(crate) async fn run_tool<I, S>(program: &Path, args: I, timeout_secs: u64) -> Result<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!(program = %name, "Running external tool");

    let output = match timeout(Duration::from_secs(timeout_secs), command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to run {}: {}", name, e)),
        Err(_) => return Err(format!("{} timed out after {}s", name, timeout_secs)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} exited with code {:?}: {}",
            name,
            output.status.code(),
            stderr_excerpt(&stderr)
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The last `STDERR_EXCERPT_CHARS` characters of stderr, trimmed.
fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect()
    }
}
