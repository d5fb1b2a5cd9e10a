//! Automation workspace: local settings resolution and engine delegation
//! for infrastructure-as-code projects.
//!
//! Settings files (`Pulumi.yaml`, `Pulumi.<stack>.yaml`, or their `.yml` /
//! `.json` forms) are read and written in place; stack lifecycle and config
//! operations are delegated to the engine CLI.

pub mod cli;
pub mod core;
pub mod logging;
pub mod transport;

pub use crate::core::error::{Result, WorkspaceError};
pub use crate::core::workspace::{CommandHooks, LocalWorkspace, Workspace, WorkspaceOptions};
