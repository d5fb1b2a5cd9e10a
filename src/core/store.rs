//! AW-003: Settings store: locate, load, and save settings files.
//!
//! Project settings live in `Pulumi<ext>`, stack settings in
//! `Pulumi.<stack><ext>`, both under the workspace directory. The extension is
//! chosen by probing a fixed precedence list: reads take the first file that
//! exists, writes overwrite the first file that exists or create the first
//! format in the list.

use super::codec::{self, SettingsFormat, SETTINGS_PRECEDENCE};
use super::error::{Result, WorkspaceError};
use super::types::{ProjectSettings, StackSettings};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

const BASE_NAME: &str = "Pulumi";

/// Which settings document a file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsIdentity<'a> {
    Project,
    Stack(&'a str),
}

impl SettingsIdentity<'_> {
    /// File name without extension.
    pub fn base_name(&self) -> String {
        match self {
            Self::Project => BASE_NAME.to_string(),
            Self::Stack(name) => format!("{}.{}", BASE_NAME, normalize_stack_name(name)),
        }
    }
}

impl fmt::Display for SettingsIdentity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Stack(name) => write!(f, "stack '{}'", name),
        }
    }
}

/// On-disk discriminator for a stack: the segment after the last `/`.
/// `org/proj/dev` and `dev` share `Pulumi.dev.*`.
pub fn normalize_stack_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Settings files rooted at one directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    work_dir: PathBuf,
    precedence: &'static [SettingsFormat],
}

impl SettingsStore {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_precedence(work_dir, SETTINGS_PRECEDENCE)
    }

    /// Store with a custom format order. The first entry is the default for new files.
    pub fn with_precedence(work_dir: impl Into<PathBuf>, precedence: &'static [SettingsFormat]) -> Self {
        Self {
            work_dir: work_dir.into(),
            precedence,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Path of the candidate file for an identity in a given format.
    pub fn candidate_path(&self, identity: SettingsIdentity<'_>, format: SettingsFormat) -> PathBuf {
        self.work_dir
            .join(format!("{}{}", identity.base_name(), format.extension()))
    }

    /// First existing file for the identity, in precedence order.
    pub fn find_existing(&self, identity: SettingsIdentity<'_>) -> Option<(SettingsFormat, PathBuf)> {
        self.precedence.iter().find_map(|&format| {
            let path = self.candidate_path(identity, format);
            path.is_file().then_some((format, path))
        })
    }

    /// Load and parse the settings document for an identity.
    pub fn load<T: DeserializeOwned>(&self, identity: SettingsIdentity<'_>) -> Result<T> {
        let (format, path) =
            self.find_existing(identity)
                .ok_or_else(|| WorkspaceError::SettingsNotFound {
                    identity: identity.to_string(),
                    work_dir: self.work_dir.clone(),
                })?;
        debug!(path = %path.display(), %format, "loading settings");
        let contents =
            std::fs::read_to_string(&path).map_err(|e| WorkspaceError::io("read", &path, e))?;
        codec::decode(format, &contents, &path)
    }

    /// Save a settings document, keeping the format of an existing file.
    /// Returns the path written.
    pub fn save<T: Serialize>(&self, identity: SettingsIdentity<'_>, doc: &T) -> Result<PathBuf> {
        let (format, path) = self.find_existing(identity).unwrap_or_else(|| {
            let format = self.precedence.first().copied().unwrap_or(SettingsFormat::Yaml);
            (format, self.candidate_path(identity, format))
        });
        let contents = codec::encode(format, doc)?;

        // Atomic write: temp file + rename
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = path.with_file_name(format!("{}.tmp", file_name));
        std::fs::write(&tmp_path, contents).map_err(|e| WorkspaceError::io("write", &tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| WorkspaceError::io("rename", &path, e))?;
        debug!(path = %path.display(), %format, "saved settings");
        Ok(path)
    }

    pub fn load_project(&self) -> Result<ProjectSettings> {
        self.load(SettingsIdentity::Project)
    }

    pub fn save_project(&self, settings: &ProjectSettings) -> Result<PathBuf> {
        self.save(SettingsIdentity::Project, settings)
    }

    pub fn load_stack(&self, stack_name: &str) -> Result<StackSettings> {
        self.load(SettingsIdentity::Stack(stack_name))
    }

    pub fn save_stack(&self, settings: &StackSettings, stack_name: &str) -> Result<PathBuf> {
        self.save(SettingsIdentity::Stack(stack_name), settings)
    }
}
