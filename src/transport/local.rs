//! AW-011: Local subprocess runner for the engine CLI.

use super::{CommandResult, CommandRunner, OutputSink};
use crate::core::commands;
use crate::core::error::{Result, WorkspaceError};
use crate::core::types::EnvVars;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Engine binary used when none is configured.
pub const DEFAULT_ENGINE: &str = "pulumi";

const NON_INTERACTIVE: &str = "--non-interactive";

/// Runs the engine as a child process.
///
/// Every invocation gets `--non-interactive` so the engine never blocks on a
/// prompt. The flag goes ahead of any `--` in the caller's args.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    binary: PathBuf,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE)
    }
}

impl LocalRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(
        &self,
        args: &[String],
        cwd: &Path,
        env: &EnvVars,
        on_output: Option<OutputSink>,
    ) -> Result<CommandResult> {
        let argv = commands::with_flags(args.to_vec(), [NON_INTERACTIVE.to_string()]);
        let mut child = Command::new(&self.binary)
            .args(&argv)
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkspaceError::CommandLaunch {
                binary: self.binary.clone(),
                source,
            })?;
        debug!(binary = %self.binary.display(), argc = argv.len(), "spawned engine");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Raw bytes, decoded lossily: engine output is not guaranteed UTF-8
        let stdout_task = tokio::spawn(async move {
            let mut captured = Vec::new();
            let Some(stdout) = stdout else {
                return Ok(captured);
            };
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                if let Some(sink) = &on_output {
                    sink(String::from_utf8_lossy(&line).trim_end_matches(['\n', '\r']));
                }
                captured.extend_from_slice(&line);
            }
            Ok::<_, std::io::Error>(captured)
        });
        let stderr_task = tokio::spawn(async move {
            let mut captured = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut captured).await?;
            }
            Ok::<_, std::io::Error>(captured)
        });

        let status = child
            .wait()
            .await
            .map_err(|e| WorkspaceError::io("wait for", &self.binary, e))?;
        let stdout = join_capture(stdout_task, &self.binary).await?;
        let stderr = join_capture(stderr_task, &self.binary).await?;

        // Killed by signal: no exit code
        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!(exit_code, binary = %self.binary.display(), "engine command failed");
            return Err(WorkspaceError::CommandExecution {
                args: args.to_vec(),
                exit_code,
                stdout,
                stderr,
            });
        }

        debug!(stdout_bytes = stdout.len(), "engine command finished");
        Ok(CommandResult {
            stdout,
            stderr,
            exit_code,
        })
    }
}

async fn join_capture(
    handle: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    binary: &Path,
) -> Result<String> {
    match handle.await {
        Ok(captured) => captured
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| WorkspaceError::io("read output of", binary, e)),
        Err(e) => Err(WorkspaceError::io(
            "read output of",
            binary,
            std::io::Error::other(e),
        )),
    }
}
