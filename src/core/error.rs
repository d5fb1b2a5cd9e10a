//! AW-004: Workspace error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Every failure the workspace surfaces. Nothing is recovered locally.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No candidate settings file exists for the identity.
    #[error("failed to find {identity} settings file in workdir: {}", .work_dir.display())]
    SettingsNotFound { identity: String, work_dir: PathBuf },

    /// A settings file exists but is malformed.
    #[error("invalid settings file {}: {message}", .path.display())]
    SettingsParse { path: PathBuf, message: String },

    #[error("cannot encode settings: {0}")]
    SettingsEncode(String),

    /// Filesystem failure, surfaced verbatim.
    #[error("cannot {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine binary could not be started.
    #[error("engine `{}` could not be started: {source}", .binary.display())]
    CommandLaunch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and exited non-zero.
    #[error("engine exited with code {exit_code}: {}", .stderr.trim())]
    CommandExecution {
        args: Vec<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The engine succeeded but its output did not have the expected shape.
    #[error("unexpected output from `{command}`: {message}")]
    OutputParse { command: String, message: String },

    #[error("workspace is not ready: await LocalWorkspace::ready() before use")]
    NotReady,

    #[error("workspace initialization failed: {0}")]
    InitFailed(String),
}

impl WorkspaceError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Exit code reported by the engine, if this is an execution failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandExecution { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aw004_not_found_message() {
        let e = WorkspaceError::SettingsNotFound {
            identity: "project".into(),
            work_dir: PathBuf::from("/work"),
        };
        assert_eq!(
            e.to_string(),
            "failed to find project settings file in workdir: /work"
        );
    }

    #[test]
    fn test_aw004_execution_message_trims_stderr() {
        let e = WorkspaceError::CommandExecution {
            args: vec!["stack".into(), "init".into(), "dev".into()],
            exit_code: 255,
            stdout: String::new(),
            stderr: "error: stack 'dev' already exists\n".into(),
        };
        assert_eq!(
            e.to_string(),
            "engine exited with code 255: error: stack 'dev' already exists"
        );
        assert_eq!(e.exit_code(), Some(255));
    }

    #[test]
    fn test_aw004_io_keeps_source() {
        use std::error::Error as _;
        let e = WorkspaceError::io(
            "write",
            "/work/Pulumi.yaml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(e.to_string().starts_with("cannot write /work/Pulumi.yaml"));
        assert!(e.source().is_some());
        assert_eq!(e.exit_code(), None);
    }
}
