//! AW-030: CLI subcommands: project, stack, config, whoami.

use crate::core::error::Result;
use crate::core::types::{ConfigMap, ConfigValue, EnvVars, StackConfigValue};
use crate::core::workspace::{LocalWorkspace, Workspace, WorkspaceOptions};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project directory holding Pulumi.yaml
    #[arg(long, global = true, env = "AUTOMATION_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Engine home/state directory
    #[arg(long, global = true, env = "PULUMI_HOME")]
    pub pulumi_home: Option<PathBuf>,

    /// Secrets provider forwarded on `stack init`
    #[arg(long, global = true, env = "AUTOMATION_SECRETS_PROVIDER")]
    pub secrets_provider: Option<String>,

    /// Engine binary
    #[arg(long, global = true, env = "AUTOMATION_ENGINE")]
    pub engine: Option<PathBuf>,

    /// Extra environment for the engine (repeatable)
    #[arg(long = "env", global = true, value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Stream engine output while commands run
    #[arg(long, global = true)]
    pub stream: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show project settings
    Project,

    /// Manage stacks
    #[command(subcommand)]
    Stack(StackCommand),

    /// Manage stack config
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show the engine's logged-in identity
    Whoami,
}

#[derive(Subcommand, Debug)]
pub enum StackCommand {
    /// Create a new stack
    Init { name: String },
    /// Select the current stack
    Select { name: String },
    /// Remove a stack
    Rm { name: String },
    /// List stacks
    Ls,
    /// Print the current stack
    Current,
    /// Show a stack's settings file
    Settings { name: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Get one config value
    Get {
        #[arg(short, long)]
        stack: String,
        key: String,
    },
    /// Set one config value
    Set {
        #[arg(short, long)]
        stack: String,
        /// Encrypt the value
        #[arg(long)]
        secret: bool,
        key: String,
        value: String,
    },
    /// Remove config keys
    Rm {
        #[arg(short, long)]
        stack: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List all config for a stack
    Ls {
        #[arg(short, long)]
        stack: String,
    },
    /// Re-derive config from the engine's view
    Refresh {
        #[arg(short, long)]
        stack: String,
    },
}

/// Parse `KEY=VALUE`.
pub fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Build workspace options from the global flags.
pub fn workspace_options(global: &GlobalArgs) -> WorkspaceOptions {
    let env_vars: EnvVars = global.env.iter().cloned().collect();
    WorkspaceOptions {
        work_dir: Some(global.work_dir.clone()),
        pulumi_home: global.pulumi_home.clone(),
        env_vars,
        secrets_provider: global.secrets_provider.clone(),
        engine_binary: global.engine.clone(),
        ..Default::default()
    }
}

/// Dispatch a CLI command.
pub async fn dispatch(global: GlobalArgs, cmd: Commands) -> Result<()> {
    let mut ws = LocalWorkspace::open(workspace_options(&global)).await?;
    if global.stream {
        ws.set_output_sink(Some(Arc::new(|line: &str| eprintln!("{}", line))));
    }

    match cmd {
        Commands::Project => cmd_project(&ws).await,
        Commands::Stack(stack) => cmd_stack(&ws, stack).await,
        Commands::Config(config) => cmd_config(&ws, config).await,
        Commands::Whoami => {
            println!("{}", ws.who_am_i().await?);
            Ok(())
        }
    }
}

async fn cmd_project(ws: &LocalWorkspace) -> Result<()> {
    let p = ws.project_settings().await?;
    println!("{} ({})", p.name, p.runtime);
    if let Some(description) = &p.description {
        println!("  {}", description);
    }
    if let Some(main) = &p.main {
        println!("  main: {}", main);
    }
    if let Some(url) = p.backend.as_ref().and_then(|b| b.url.as_deref()) {
        println!("  backend: {}", url);
    }
    Ok(())
}

async fn cmd_stack(ws: &LocalWorkspace, cmd: StackCommand) -> Result<()> {
    match cmd {
        StackCommand::Init { name } => {
            ws.create_stack(&name).await?;
            println!("Created stack {}", name);
        }
        StackCommand::Select { name } => {
            ws.select_stack(&name).await?;
            println!("Selected stack {}", name);
        }
        StackCommand::Rm { name } => {
            ws.remove_stack(&name).await?;
            println!("Removed stack {}", name);
        }
        StackCommand::Ls => {
            for s in ws.list_stacks().await? {
                let marker = if s.current { "*" } else { " " };
                let resources = s
                    .resource_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let updated = s.last_update.as_deref().unwrap_or("never");
                println!("{} {:<24} {:>6} {}", marker, s.name, resources, updated);
            }
        }
        StackCommand::Current => match ws.stack().await? {
            Some(name) => println!("{}", name),
            None => eprintln!("No stack is currently selected"),
        },
        StackCommand::Settings { name } => {
            let s = ws.stack_settings(&name).await?;
            if let Some(provider) = &s.secrets_provider {
                println!("secretsprovider: {}", provider);
            }
            for (key, value) in &s.config {
                match value {
                    StackConfigValue::Secure(_) => println!("{} = [secret]", key),
                    StackConfigValue::Plain(v) => println!("{} = {}", key, v),
                }
            }
        }
    }
    Ok(())
}

async fn cmd_config(ws: &LocalWorkspace, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Get { stack, key } => {
            println!("{}", ws.get_config(&stack, &key).await?.value);
        }
        ConfigCommand::Set {
            stack,
            secret,
            key,
            value,
        } => {
            let value = if secret {
                ConfigValue::secret(value)
            } else {
                ConfigValue::plain(value)
            };
            ws.set_config(&stack, &key, &value).await?;
        }
        ConfigCommand::Rm { stack, keys } => match keys.as_slice() {
            [key] => ws.remove_config(&stack, key).await?,
            _ => ws.remove_all_config(&stack, &keys).await?,
        },
        ConfigCommand::Ls { stack } => print_config(&ws.get_all_config(&stack).await?),
        ConfigCommand::Refresh { stack } => print_config(&ws.refresh_config(&stack).await?),
    }
    Ok(())
}

fn print_config(config: &ConfigMap) {
    for (key, value) in config {
        let shown = if value.secret { "[secret]" } else { value.value.as_str() };
        println!("{} = {}", key, shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        global: GlobalArgs,
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_aw030_parse_env_pair() {
        assert_eq!(parse_env_pair("A=1").unwrap(), ("A".into(), "1".into()));
        assert_eq!(parse_env_pair("A=b=c").unwrap(), ("A".into(), "b=c".into()));
        assert_eq!(parse_env_pair("EMPTY=").unwrap(), ("EMPTY".into(), "".into()));
        assert!(parse_env_pair("=1").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }

    #[test]
    fn test_aw030_global_flags_build_options() {
        let cli = TestCli::try_parse_from([
            "autows",
            "--work-dir",
            "/proj",
            "--secrets-provider",
            "passphrase",
            "--env",
            "AWS_REGION=us-east-1",
            "stack",
            "init",
            "dev",
        ])
        .unwrap();
        let opts = workspace_options(&cli.global);
        assert_eq!(opts.work_dir, Some(PathBuf::from("/proj")));
        assert_eq!(opts.secrets_provider.as_deref(), Some("passphrase"));
        assert_eq!(opts.env_vars["AWS_REGION"], "us-east-1");
        assert!(opts.project_settings.is_none());
        assert!(matches!(cli.command, Commands::Stack(StackCommand::Init { ref name }) if name == "dev"));
    }

    #[test]
    fn test_aw030_config_rm_requires_key() {
        let r = TestCli::try_parse_from(["autows", "config", "rm", "--stack", "dev"]);
        assert!(r.is_err());
    }

    #[test]
    fn test_aw030_config_set_secret_flag() {
        let cli = TestCli::try_parse_from([
            "autows", "config", "set", "--stack", "dev", "--secret", "app:pw", "hunter2",
        ])
        .unwrap();
        match cli.command {
            Commands::Config(ConfigCommand::Set { secret, key, value, .. }) => {
                assert!(secret);
                assert_eq!(key, "app:pw");
                assert_eq!(value, "hunter2");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
