//! AW-001: Settings document types.
//!
//! Defines the project (`Pulumi.yaml`) and stack (`Pulumi.<stack>.yaml`) schemas
//! plus the config and stack-listing shapes reported by the engine. All types
//! derive Serialize/Deserialize so the same document round-trips through YAML
//! and JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment-variable overlay applied to engine invocations.
pub type EnvVars = IndexMap<String, String>;

/// Config entries keyed by fully-qualified config key (`project:key`).
pub type ConfigMap = IndexMap<String, ConfigValue>;

// ============================================================================
// Project settings (Pulumi.yaml)
// ============================================================================

/// Project-wide settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project name
    pub name: String,

    /// Language runtime (`nodejs`, `python`, `go`, ...)
    pub runtime: ProjectRuntime,

    /// Program entry point, relative to the project directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Directory holding stack config files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ProjectTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<ProjectBackend>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProjectOptions>,

    /// Engine-specific fields this crate does not model, kept verbatim
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl ProjectSettings {
    /// Minimal settings: a name and a bare runtime.
    pub fn new(name: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime: ProjectRuntime::Name(runtime.into()),
            main: None,
            description: None,
            author: None,
            website: None,
            license: None,
            config: None,
            template: None,
            backend: None,
            options: None,
            extra: IndexMap::new(),
        }
    }
}

/// Runtime: bare name or name with runtime options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectRuntime {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        options: IndexMap<String, serde_json::Value>,
    },
}

impl ProjectRuntime {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed { name, .. } => name,
        }
    }
}

impl fmt::Display for ProjectRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Template metadata used by `new` flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quickstart: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, TemplateConfigValue>,
}

/// A config prompt declared by a project template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfigValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secret: bool,
}

/// State backend location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectBackend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Project-level engine options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectOptions {
    /// `always` to refresh before every update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

// ============================================================================
// Stack settings (Pulumi.<stack>.yaml)
// ============================================================================

/// Per-stack settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSettings {
    #[serde(
        rename = "secretsprovider",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secrets_provider: Option<String>,

    #[serde(
        rename = "encryptedkey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_key: Option<String>,

    #[serde(
        rename = "encryptionsalt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encryption_salt: Option<String>,

    /// Config entries (order-preserving)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, StackConfigValue>,
}

/// A stack config entry as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StackConfigValue {
    /// Encrypted value: `{secure: <ciphertext>}`
    Secure(SecureValue),
    /// Any plain scalar or structured value
    Plain(serde_json::Value),
}

/// Ciphertext envelope for secret config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecureValue {
    pub secure: String,
}

impl StackConfigValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain(serde_json::Value::String(value.into()))
    }

    pub fn secure(ciphertext: impl Into<String>) -> Self {
        Self::Secure(SecureValue {
            secure: ciphertext.into(),
        })
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure(_))
    }
}

// ============================================================================
// Engine-reported shapes
// ============================================================================

/// A config value as reported by (and sent to) the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl ConfigValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: true,
        }
    }
}

/// One row of `stack ls --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub name: String,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(default)]
    pub update_in_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
