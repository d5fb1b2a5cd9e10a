//! AW-002: Settings codec, YAML and JSON encodings of settings documents.
//!
//! Pure functions, no I/O. The path argument on decode is only carried into
//! the error so callers can tell which file was malformed.

use super::error::{Result, WorkspaceError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Recognized settings file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsFormat {
    Yaml,
    Yml,
    Json,
}

/// Probe order for reads and for locating an existing file on writes.
/// New files are created in the first format.
pub const SETTINGS_PRECEDENCE: &[SettingsFormat] =
    &[SettingsFormat::Yaml, SettingsFormat::Yml, SettingsFormat::Json];

impl SettingsFormat {
    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Yaml => ".yaml",
            Self::Yml => ".yml",
            Self::Json => ".json",
        }
    }

    pub fn is_json(self) -> bool {
        self == Self::Json
    }
}

impl fmt::Display for SettingsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Decode a settings document from text in the given format.
pub fn decode<T: DeserializeOwned>(format: SettingsFormat, contents: &str, path: &Path) -> Result<T> {
    let parsed = if format.is_json() {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    } else {
        serde_yaml_ng::from_str(contents).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| WorkspaceError::SettingsParse {
        path: path.to_path_buf(),
        message,
    })
}

/// Encode a settings document. JSON is pretty-printed with a 4-space indent.
pub fn encode<T: Serialize>(format: SettingsFormat, doc: &T) -> Result<String> {
    if format.is_json() {
        to_json_4(doc)
    } else {
        serde_yaml_ng::to_string(doc).map_err(|e| WorkspaceError::SettingsEncode(e.to_string()))
    }
}

fn to_json_4<T: Serialize>(doc: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)
        .map_err(|e| WorkspaceError::SettingsEncode(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| WorkspaceError::SettingsEncode(e.to_string()))
}
