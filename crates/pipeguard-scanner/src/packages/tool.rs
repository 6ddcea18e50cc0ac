use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Run an ecosystem tree tool, returning its stdout on success.
///
/// Tool absence, a non-zero exit, or a timeout all degrade to `None`:
/// the caller falls back to direct-dependency-only mode. The child is
/// killed on timeout rather than left to hang.
pub async fn run_tree_tool(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Option<String> {
    let mut command = Command::new(program);
    command.args(args).current_dir(cwd).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(tool = program, error = %e, "tree tool unavailable; using direct dependencies only");
            return None;
        }
        Err(_) => {
            warn!(tool = program, timeout_secs = timeout.as_secs(), "tree tool timed out");
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            tool = program,
            status = ?output.status.code(),
            "tree tool exited non-zero; using direct dependencies only"
        );
        return None;
    }

    debug!(tool = program, bytes = output.stdout.len(), "tree tool output captured");
    String::from_utf8(output.stdout).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tool_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_tree_tool(
            "definitely-not-a-real-tool-9f3a",
            &["--version"],
            dir.path(),
            Duration::from_secs(5),
        )
        .await;
        assert!(out.is_none());
    }
}
