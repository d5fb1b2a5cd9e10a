//! AW-010: Command runner abstraction, how the engine is invoked.
//!
//! The workspace never spawns processes itself; it hands an argument vector,
//! working directory and env overlay to a [`CommandRunner`]. [`local::LocalRunner`]
//! is the subprocess implementation.

pub mod local;

use crate::core::error::Result;
use crate::core::types::EnvVars;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Receives each line of engine stdout as it is produced.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Output from a completed engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes the engine.
///
/// Implementations return `Ok` only for a zero exit; a non-zero exit is
/// `WorkspaceError::CommandExecution` and a failure to start is
/// `WorkspaceError::CommandLaunch`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        args: &[String],
        cwd: &Path,
        env: &EnvVars,
        on_output: Option<OutputSink>,
    ) -> Result<CommandResult>;
}
