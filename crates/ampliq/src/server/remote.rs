//! Remote shell and copy channels to the cluster head node.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Output;
use std::time::Duration;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

use crate::server::dispatch::DispatchResult;

/// Capability handle for talking to the cluster head node.
///
/// Both operations are fire-and-report: there is no internal retry and no
/// partial side-effect guarantee. A failed copy may leave an incomplete
/// directory tree on the remote side; content verification is the guard
/// against trusting such state.
pub trait RemoteSession {
    /// Recursively copy a local directory into a parent directory on the
    /// head node, preserving file contents exactly.
    fn copy_to_remote(
        &self,
        local_dir: &Path,
        remote_parent: &str,
    ) -> Pin<Box<dyn Future<Output = DispatchResult<()>>>>;

    /// Run a single fully-formed command line on the head node and return
    /// its captured standard output.
    fn execute(&self, command: &str) -> Pin<Box<dyn Future<Output = DispatchResult<String>>>>;
}

/// `RemoteSession` backed by the OpenSSH client tools.
///
/// Host aliases, keys and connection multiplexing are left to the user's ssh
/// configuration.
pub struct SshSession {
    host: String,
    ssh_path: PathBuf,
    scp_path: PathBuf,
    timeout: Duration,
}

impl SshSession {
    pub fn new(host: String, timeout: Duration) -> anyhow::Result<SshSession> {
        let ssh_path = which::which("ssh").context("Cannot find the ssh binary")?;
        let scp_path = which::which("scp").context("Cannot find the scp binary")?;
        Ok(SshSession {
            host,
            ssh_path,
            scp_path,
            timeout,
        })
    }
}

impl RemoteSession for SshSession {
    fn copy_to_remote(
        &self,
        local_dir: &Path,
        remote_parent: &str,
    ) -> Pin<Box<dyn Future<Output = DispatchResult<()>>>> {
        let program = self.scp_path.clone();
        let source = local_dir.to_path_buf();
        let target = format!("{}:{}", self.host, remote_parent);
        let timeout = self.timeout;

        Box::pin(async move {
            log::debug!("Running `scp -r {} {}`", source.display(), target);
            let mut command = Command::new(&program);
            command.arg("-r").arg("-q").arg(&source).arg(&target);
            let output = run_with_timeout(command, timeout)
                .await
                .context("scp start failed")?;
            check_command_output(output).context("scp execution failed")?;
            Ok(())
        })
    }

    fn execute(&self, command_line: &str) -> Pin<Box<dyn Future<Output = DispatchResult<String>>>> {
        let program = self.ssh_path.clone();
        let host = self.host.clone();
        let command_line = command_line.to_string();
        let timeout = self.timeout;

        Box::pin(async move {
            log::debug!("Running `ssh {host} {command_line}`");
            let mut command = Command::new(&program);
            command.arg(&host).arg(&command_line);
            let output = run_with_timeout(command, timeout)
                .await
                .context("ssh start failed")?;
            let output = check_command_output(output).context("ssh execution failed")?;
            let stdout = output
                .stdout
                .to_str()
                .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in ssh output: {e:?}"))?;
            Ok(stdout.trim().to_string())
        })
    }
}

async fn run_with_timeout(mut command: Command, limit: Duration) -> DispatchResult<Output> {
    let output = tokio::time::timeout(limit, command.output())
        .await
        .map_err(|_| anyhow::anyhow!("Remote operation timed out after {}s", limit.as_secs()))??;
    Ok(output)
}

pub fn check_command_output(output: Output) -> DispatchResult<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    use crate::server::remote::check_command_output;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn zero_exit_is_success() {
        assert!(check_command_output(output(0, "")).is_ok());
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let error = check_command_output(output(1, "lost connection")).unwrap_err();
        let message = format!("{error:?}");
        assert!(message.contains("Exit code: 1"));
        assert!(message.contains("lost connection"));
    }
}
