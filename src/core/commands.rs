//! AW-021: Engine command vocabulary.
//!
//! Argument vectors for every operation the workspace delegates, and parsers
//! for the JSON the engine prints back. Kept free of I/O so the exact argv can
//! be asserted without an engine installed.

use super::error::{Result, WorkspaceError};
use super::types::{ConfigMap, ConfigValue, StackSummary};
use serde::de::DeserializeOwned;

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Insert `flags` ahead of the first `--`, or at the end when there is none.
/// Everything after `--` is positional to the engine.
pub fn with_flags(mut args: Vec<String>, flags: impl IntoIterator<Item = String>) -> Vec<String> {
    let at = args.iter().position(|a| a == "--").unwrap_or(args.len());
    let positional = args.split_off(at);
    args.extend(flags);
    args.extend(positional);
    args
}

// -- Stack lifecycle --

pub fn stack_init(stack: &str, secrets_provider: Option<&str>) -> Vec<String> {
    let mut args = argv(&["stack", "init", stack]);
    if let Some(provider) = secrets_provider {
        args.extend(argv(&["--secrets-provider", provider]));
    }
    args
}

pub fn stack_select(stack: &str) -> Vec<String> {
    argv(&["stack", "select", stack])
}

pub fn stack_rm(stack: &str) -> Vec<String> {
    argv(&["stack", "rm", "--yes", stack])
}

pub fn stack_ls() -> Vec<String> {
    argv(&["stack", "ls", "--json"])
}

pub fn whoami() -> Vec<String> {
    argv(&["whoami"])
}

// -- Config --

pub fn config_get(stack: &str, key: &str) -> Vec<String> {
    argv(&["config", "get", key, "--json", "--stack", stack])
}

pub fn config_get_all(stack: &str) -> Vec<String> {
    argv(&["config", "--show-secrets", "--json", "--stack", stack])
}

fn secret_flag(value: &ConfigValue) -> &'static str {
    if value.secret {
        "--secret"
    } else {
        "--plaintext"
    }
}

/// The value goes after `--` so values starting with `-` are not read as flags.
pub fn config_set(stack: &str, key: &str, value: &ConfigValue) -> Vec<String> {
    argv(&[
        "config",
        "set",
        key,
        "--stack",
        stack,
        secret_flag(value),
        "--",
        value.value.as_str(),
    ])
}

/// `None` when there is nothing to set.
pub fn config_set_all(stack: &str, config: &ConfigMap) -> Option<Vec<String>> {
    if config.is_empty() {
        return None;
    }
    let mut args = argv(&["config", "set-all", "--stack", stack]);
    for (key, value) in config {
        args.push(secret_flag(value).to_string());
        args.push(format!("{}={}", key, value.value));
    }
    Some(args)
}

pub fn config_rm(stack: &str, key: &str) -> Vec<String> {
    argv(&["config", "rm", key, "--stack", stack])
}

/// `None` when there is nothing to remove.
pub fn config_rm_all(stack: &str, keys: &[String]) -> Option<Vec<String>> {
    if keys.is_empty() {
        return None;
    }
    let mut args = argv(&["config", "rm-all", "--stack", stack]);
    args.extend(keys.iter().cloned());
    Some(args)
}

pub fn config_refresh(stack: &str) -> Vec<String> {
    argv(&["config", "refresh", "--force", "--stack", stack])
}

// -- Output parsing --

fn parse_json<T: DeserializeOwned>(args: &[String], stdout: &str) -> Result<T> {
    serde_json::from_str(stdout).map_err(|e| WorkspaceError::OutputParse {
        command: args.join(" "),
        message: e.to_string(),
    })
}

pub fn parse_config_value(args: &[String], stdout: &str) -> Result<ConfigValue> {
    parse_json(args, stdout)
}

pub fn parse_config_map(args: &[String], stdout: &str) -> Result<ConfigMap> {
    // An unconfigured stack prints nothing
    if stdout.trim().is_empty() {
        return Ok(ConfigMap::new());
    }
    parse_json(args, stdout)
}

pub fn parse_stack_list(args: &[String], stdout: &str) -> Result<Vec<StackSummary>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    parse_json(args, stdout)
}

pub fn parse_whoami(args: &[String], stdout: &str) -> Result<String> {
    let user = stdout.trim();
    if user.is_empty() {
        return Err(WorkspaceError::OutputParse {
            command: args.join(" "),
            message: "empty identity".to_string(),
        });
    }
    Ok(user.to_string())
}
