//! AW-020: Workspace: settings resolution and engine delegation.
//!
//! [`Workspace`] is the contract; [`LocalWorkspace`] backs it with settings
//! files in a working directory and an engine subprocess.
//!
//! Lifecycle: `LocalWorkspace::new` only sets up state and queues the
//! initial settings writes. Nothing that reads settings or runs the engine is
//! accepted until `ready()` has completed them (`open` does both).

use super::commands;
use super::error::{Result, WorkspaceError};
use super::store::SettingsStore;
use super::types::{ConfigMap, ConfigValue, EnvVars, ProjectSettings, StackSettings, StackSummary};
use crate::transport::local::LocalRunner;
use crate::transport::{CommandResult, CommandRunner, OutputSink};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// In-process program the engine may call back into. Opaque to the workspace.
pub type Program = Arc<dyn Fn() + Send + Sync>;

/// Env var the engine reads its home/state directory from.
pub const PULUMI_HOME_ENV: &str = "PULUMI_HOME";

const TEMP_DIR_PREFIX: &str = "automation-";

/// Per-command extension points around every delegated engine command.
///
/// Both are no-ops by default; workspaces that proxy the engine elsewhere
/// override them.
pub trait CommandHooks: Send + Sync {
    /// Extra arguments for the engine command of `op`, placed ahead of any `--`.
    fn serialize_args_for_op(&self, _op: &str) -> Vec<String> {
        Vec::new()
    }

    /// Called after the engine command for `op` completes, whatever its outcome.
    fn post_command_callback(&self, _op: &str) {}
}

/// Operations every workspace provides.
#[async_trait]
pub trait Workspace: CommandHooks {
    async fn project_settings(&self) -> Result<ProjectSettings>;
    async fn save_project_settings(&self, settings: &ProjectSettings) -> Result<()>;
    async fn stack_settings(&self, stack_name: &str) -> Result<StackSettings>;
    async fn save_stack_settings(&self, settings: &StackSettings, stack_name: &str) -> Result<()>;

    async fn create_stack(&self, stack_name: &str) -> Result<()>;
    async fn select_stack(&self, stack_name: &str) -> Result<()>;
    async fn remove_stack(&self, stack_name: &str) -> Result<()>;

    async fn get_config(&self, stack_name: &str, key: &str) -> Result<ConfigValue>;
    async fn get_all_config(&self, stack_name: &str) -> Result<ConfigMap>;
    async fn set_config(&self, stack_name: &str, key: &str, value: &ConfigValue) -> Result<()>;
    async fn set_all_config(&self, stack_name: &str, config: &ConfigMap) -> Result<()>;
    async fn remove_config(&self, stack_name: &str, key: &str) -> Result<()>;
    async fn remove_all_config(&self, stack_name: &str, keys: &[String]) -> Result<()>;
    /// Re-derive local config from the engine's view and return it.
    async fn refresh_config(&self, stack_name: &str) -> Result<ConfigMap>;

    async fn who_am_i(&self) -> Result<String>;
    /// Currently selected stack, if any.
    async fn stack(&self) -> Result<Option<String>>;
    async fn list_stacks(&self) -> Result<Vec<StackSummary>>;

    fn env_vars(&self) -> &EnvVars;
    /// Merge `env_vars` over the current overlay.
    fn set_env_vars(&mut self, env_vars: EnvVars);
    fn set_env_var(&mut self, key: &str, value: &str);
    fn unset_env_var(&mut self, key: &str);

    fn work_dir(&self) -> &Path;
    fn pulumi_home(&self) -> Option<&Path>;
    fn program(&self) -> Option<Program>;
    fn set_program(&mut self, program: Program);
}

/// Options for constructing a [`LocalWorkspace`].
#[derive(Clone, Default)]
pub struct WorkspaceOptions {
    /// Use this directory instead of a fresh temp directory.
    pub work_dir: Option<PathBuf>,
    /// Engine home/state directory, exported as `PULUMI_HOME`.
    pub pulumi_home: Option<PathBuf>,
    pub program: Option<Program>,
    pub env_vars: EnvVars,
    /// Forwarded verbatim on stack creation.
    pub secrets_provider: Option<String>,
    /// Written during initialization.
    pub project_settings: Option<ProjectSettings>,
    /// Written during initialization, keyed by stack name.
    pub stack_settings: IndexMap<String, StackSettings>,
    /// Engine binary; defaults to `pulumi` on `PATH`.
    pub engine_binary: Option<PathBuf>,
}

impl fmt::Debug for WorkspaceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceOptions")
            .field("work_dir", &self.work_dir)
            .field("pulumi_home", &self.pulumi_home)
            .field("program", &self.program.is_some())
            .field("env_vars", &self.env_vars.keys().collect::<Vec<_>>())
            .field("secrets_provider", &self.secrets_provider)
            .field("project_settings", &self.project_settings)
            .field("stack_settings", &self.stack_settings.keys().collect::<Vec<_>>())
            .field("engine_binary", &self.engine_binary)
            .finish()
    }
}

/// One queued initialization side effect.
#[derive(Debug, Clone)]
enum InitTask {
    Project(ProjectSettings),
    Stack(String, StackSettings),
}

#[derive(Debug)]
enum Readiness {
    Pending(Vec<InitTask>),
    Ready,
    Failed(String),
}

/// Workspace backed by the local filesystem and an engine subprocess.
pub struct LocalWorkspace {
    work_dir: PathBuf,
    pulumi_home: Option<PathBuf>,
    program: Option<Program>,
    env_vars: EnvVars,
    secrets_provider: Option<String>,
    store: SettingsStore,
    runner: Arc<dyn CommandRunner>,
    output_sink: Option<OutputSink>,
    readiness: Readiness,
    // Delegated commands never overlap
    command_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for LocalWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWorkspace")
            .field("work_dir", &self.work_dir)
            .field("pulumi_home", &self.pulumi_home)
            .field("secrets_provider", &self.secrets_provider)
            .field("readiness", &self.readiness)
            .finish_non_exhaustive()
    }
}

impl LocalWorkspace {
    /// Set up workspace state and queue initial settings writes.
    ///
    /// A relative `work_dir` is resolved against the current directory. Fails
    /// only if that resolution fails or a temp directory could not be created.
    pub fn new(opts: WorkspaceOptions) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = match &opts.engine_binary {
            Some(binary) => Arc::new(LocalRunner::new(binary)),
            None => Arc::new(LocalRunner::default()),
        };
        Self::with_runner(opts, runner)
    }

    /// Like [`new`](Self::new) with a caller-supplied runner.
    pub fn with_runner(opts: WorkspaceOptions, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let work_dir = match opts.work_dir {
            Some(dir) => {
                std::path::absolute(&dir).map_err(|e| WorkspaceError::io("resolve", &dir, e))?
            }
            None => allocate_temp_dir()?,
        };

        let mut tasks = Vec::new();
        if let Some(project) = opts.project_settings {
            tasks.push(InitTask::Project(project));
        }
        for (name, settings) in opts.stack_settings {
            tasks.push(InitTask::Stack(name, settings));
        }
        debug!(work_dir = %work_dir.display(), pending = tasks.len(), "workspace created");

        Ok(Self {
            store: SettingsStore::new(&work_dir),
            work_dir,
            pulumi_home: opts.pulumi_home,
            program: opts.program,
            env_vars: opts.env_vars,
            secrets_provider: opts.secrets_provider,
            runner,
            output_sink: None,
            readiness: Readiness::Pending(tasks),
            command_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Construct and wait for readiness.
    pub async fn open(opts: WorkspaceOptions) -> Result<Self> {
        let mut ws = Self::new(opts)?;
        ws.ready().await?;
        Ok(ws)
    }

    /// Run the queued initialization writes. Idempotent once ready.
    ///
    /// The first failure is returned and the workspace stays unusable:
    /// every gated operation then fails with `InitFailed`.
    pub async fn ready(&mut self) -> Result<()> {
        let tasks = match std::mem::replace(&mut self.readiness, Readiness::Ready) {
            Readiness::Pending(tasks) => tasks,
            Readiness::Ready => return Ok(()),
            Readiness::Failed(reason) => {
                self.readiness = Readiness::Failed(reason.clone());
                return Err(WorkspaceError::InitFailed(reason));
            }
        };

        let count = tasks.len();
        for task in tasks {
            let written = match &task {
                InitTask::Project(settings) => self.store.save_project(settings),
                InitTask::Stack(name, settings) => self.store.save_stack(settings, name),
            };
            if let Err(e) = written {
                self.readiness = Readiness::Failed(e.to_string());
                return Err(e);
            }
        }
        info!(work_dir = %self.work_dir.display(), written = count, "workspace ready");
        Ok(())
    }

    /// Number of initialization writes still queued.
    pub fn pending_init(&self) -> usize {
        match &self.readiness {
            Readiness::Pending(tasks) => tasks.len(),
            Readiness::Ready | Readiness::Failed(_) => 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.readiness, Readiness::Ready)
    }

    pub fn secrets_provider(&self) -> Option<&str> {
        self.secrets_provider.as_deref()
    }

    /// Stream stdout lines of subsequent engine commands to `sink`.
    pub fn set_output_sink(&mut self, sink: Option<OutputSink>) {
        self.output_sink = sink;
    }

    fn ensure_ready(&self) -> Result<()> {
        match &self.readiness {
            Readiness::Ready => Ok(()),
            Readiness::Pending(_) => Err(WorkspaceError::NotReady),
            Readiness::Failed(reason) => Err(WorkspaceError::InitFailed(reason.clone())),
        }
    }

    /// Ambient env is inherited by the child; this is only the overlay.
    fn command_env(&self) -> EnvVars {
        let mut env = self.env_vars.clone();
        if let Some(home) = &self.pulumi_home {
            env.insert(PULUMI_HOME_ENV.to_string(), home.display().to_string());
        }
        env
    }

    async fn run_engine(&self, op: &str, args: Vec<String>) -> Result<CommandResult> {
        self.run_engine_with(self, op, args).await
    }

    /// Run one delegated command, wrapped by `hooks`.
    pub(crate) async fn run_engine_with<H: CommandHooks + ?Sized>(
        &self,
        hooks: &H,
        op: &str,
        args: Vec<String>,
    ) -> Result<CommandResult> {
        self.ensure_ready()?;
        let args = commands::with_flags(args, hooks.serialize_args_for_op(op));
        let env = self.command_env();

        let _gate = self.command_gate.lock().await;
        debug!(op, argc = args.len(), "delegating to engine");
        let result = self
            .runner
            .run(&args, &self.work_dir, &env, self.output_sink.clone())
            .await;
        hooks.post_command_callback(op);
        result
    }
}

fn allocate_temp_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(TEMP_DIR_PREFIX)
        .tempdir()
        .map_err(|e| WorkspaceError::io("create temp dir in", std::env::temp_dir(), e))?;
    // The workspace owns this directory from now on and never removes it
    Ok(dir.keep())
}

impl CommandHooks for LocalWorkspace {}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn project_settings(&self) -> Result<ProjectSettings> {
        self.ensure_ready()?;
        self.store.load_project()
    }

    async fn save_project_settings(&self, settings: &ProjectSettings) -> Result<()> {
        self.ensure_ready()?;
        self.store.save_project(settings).map(|_| ())
    }

    async fn stack_settings(&self, stack_name: &str) -> Result<StackSettings> {
        self.ensure_ready()?;
        self.store.load_stack(stack_name)
    }

    async fn save_stack_settings(&self, settings: &StackSettings, stack_name: &str) -> Result<()> {
        self.ensure_ready()?;
        self.store.save_stack(settings, stack_name).map(|_| ())
    }

    async fn create_stack(&self, stack_name: &str) -> Result<()> {
        let args = commands::stack_init(stack_name, self.secrets_provider.as_deref());
        self.run_engine("create_stack", args).await.map(|_| ())
    }

    async fn select_stack(&self, stack_name: &str) -> Result<()> {
        self.run_engine("select_stack", commands::stack_select(stack_name))
            .await
            .map(|_| ())
    }

    async fn remove_stack(&self, stack_name: &str) -> Result<()> {
        self.run_engine("remove_stack", commands::stack_rm(stack_name))
            .await
            .map(|_| ())
    }

    async fn get_config(&self, stack_name: &str, key: &str) -> Result<ConfigValue> {
        let args = commands::config_get(stack_name, key);
        let out = self.run_engine("get_config", args.clone()).await?;
        commands::parse_config_value(&args, &out.stdout)
    }

    async fn get_all_config(&self, stack_name: &str) -> Result<ConfigMap> {
        let args = commands::config_get_all(stack_name);
        let out = self.run_engine("get_all_config", args.clone()).await?;
        commands::parse_config_map(&args, &out.stdout)
    }

    async fn set_config(&self, stack_name: &str, key: &str, value: &ConfigValue) -> Result<()> {
        let args = commands::config_set(stack_name, key, value);
        self.run_engine("set_config", args).await.map(|_| ())
    }

    async fn set_all_config(&self, stack_name: &str, config: &ConfigMap) -> Result<()> {
        self.ensure_ready()?;
        match commands::config_set_all(stack_name, config) {
            Some(args) => self.run_engine("set_all_config", args).await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn remove_config(&self, stack_name: &str, key: &str) -> Result<()> {
        self.run_engine("remove_config", commands::config_rm(stack_name, key))
            .await
            .map(|_| ())
    }

    async fn remove_all_config(&self, stack_name: &str, keys: &[String]) -> Result<()> {
        self.ensure_ready()?;
        match commands::config_rm_all(stack_name, keys) {
            Some(args) => self.run_engine("remove_all_config", args).await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn refresh_config(&self, stack_name: &str) -> Result<ConfigMap> {
        self.run_engine("refresh_config", commands::config_refresh(stack_name))
            .await?;
        self.get_all_config(stack_name).await
    }

    async fn who_am_i(&self) -> Result<String> {
        let args = commands::whoami();
        let out = self.run_engine("who_am_i", args.clone()).await?;
        commands::parse_whoami(&args, &out.stdout)
    }

    async fn stack(&self) -> Result<Option<String>> {
        let current = self
            .list_stacks()
            .await?
            .into_iter()
            .find(|s| s.current)
            .map(|s| s.name);
        Ok(current)
    }

    async fn list_stacks(&self) -> Result<Vec<StackSummary>> {
        let args = commands::stack_ls();
        let out = self.run_engine("list_stacks", args.clone()).await?;
        commands::parse_stack_list(&args, &out.stdout)
    }

    fn env_vars(&self) -> &EnvVars {
        &self.env_vars
    }

    fn set_env_vars(&mut self, env_vars: EnvVars) {
        self.env_vars.extend(env_vars);
    }

    fn set_env_var(&mut self, key: &str, value: &str) {
        self.env_vars.insert(key.to_string(), value.to_string());
    }

    fn unset_env_var(&mut self, key: &str) {
        self.env_vars.shift_remove(key);
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn pulumi_home(&self) -> Option<&Path> {
        self.pulumi_home.as_deref()
    }

    fn program(&self) -> Option<Program> {
        self.program.clone()
    }

    fn set_program(&mut self, program: Program) {
        self.program = Some(program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StackConfigValue;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Call {
        args: Vec<String>,
        cwd: PathBuf,
        env: EnvVars,
    }

    enum Reply {
        Stdout(&'static str),
        Exit(i32, &'static str),
    }

    /// Records invocations and answers from a script of replies (default: empty success).
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<Call>>,
        replies: Mutex<VecDeque<Reply>>,
    }

    impl FakeRunner {
        fn replying(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn argv(&self) -> Vec<Vec<String>> {
            self.calls().into_iter().map(|c| c.args).collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            args: &[String],
            cwd: &Path,
            env: &EnvVars,
            _on_output: Option<OutputSink>,
        ) -> Result<CommandResult> {
            self.calls.lock().unwrap().push(Call {
                args: args.to_vec(),
                cwd: cwd.to_path_buf(),
                env: env.clone(),
            });
            match self.replies.lock().unwrap().pop_front() {
                None => Ok(CommandResult { stdout: String::new(), stderr: String::new(), exit_code: 0 }),
                Some(Reply::Stdout(stdout)) => Ok(CommandResult {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    exit_code: 0,
                }),
                Some(Reply::Exit(exit_code, stderr)) => Err(WorkspaceError::CommandExecution {
                    args: args.to_vec(),
                    exit_code,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                }),
            }
        }
    }

    fn opts_in(dir: &Path) -> WorkspaceOptions {
        WorkspaceOptions {
            work_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    async fn open_with(opts: WorkspaceOptions, runner: Arc<FakeRunner>) -> LocalWorkspace {
        let mut ws = LocalWorkspace::with_runner(opts, runner).unwrap();
        ws.ready().await.unwrap();
        ws
    }

    fn sv(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_aw020_empty_readiness_completes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = LocalWorkspace::with_runner(opts_in(dir.path()), Arc::new(FakeRunner::default())).unwrap();
        assert_eq!(ws.pending_init(), 0);
        assert!(!ws.is_ready());
        ws.ready().await.unwrap();
        assert!(ws.is_ready());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_aw020_temp_work_dir_allocated() {
        let ws = LocalWorkspace::open(WorkspaceOptions::default()).await.unwrap();
        let dir = ws.work_dir().to_path_buf();
        assert!(dir.is_dir());
        assert!(dir.is_absolute());
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("automation-"));
        drop(ws);
        // Not removed with the workspace
        assert!(dir.is_dir());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_aw020_initial_settings_written_on_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = StackSettings::default();
        dev.config.insert("web:replicas".into(), StackConfigValue::plain("2"));
        let mut opts = opts_in(dir.path());
        opts.project_settings = Some(ProjectSettings::new("web", "nodejs"));
        opts.stack_settings.insert("acme/dev".into(), dev.clone());
        opts.stack_settings.insert("prod".into(), StackSettings::default());

        let mut ws = LocalWorkspace::with_runner(opts, Arc::new(FakeRunner::default())).unwrap();
        assert_eq!(ws.pending_init(), 3);
        assert!(!dir.path().join("Pulumi.yaml").exists());

        ws.ready().await.unwrap();
        assert_eq!(ws.pending_init(), 0);
        assert!(dir.path().join("Pulumi.yaml").exists());
        assert!(dir.path().join("Pulumi.dev.yaml").exists());
        assert!(dir.path().join("Pulumi.prod.yaml").exists());
        assert_eq!(ws.project_settings().await.unwrap(), ProjectSettings::new("web", "nodejs"));
        assert_eq!(ws.stack_settings("dev").await.unwrap(), dev);
    }

    #[tokio::test]
    async fn test_aw020_operations_rejected_before_ready() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![]);
        let mut opts = opts_in(dir.path());
        opts.project_settings = Some(ProjectSettings::new("web", "go"));
        let ws = LocalWorkspace::with_runner(opts, runner.clone()).unwrap();

        assert!(matches!(ws.project_settings().await, Err(WorkspaceError::NotReady)));
        assert!(matches!(ws.select_stack("dev").await, Err(WorkspaceError::NotReady)));
        assert!(matches!(
            ws.set_all_config("dev", &ConfigMap::new()).await,
            Err(WorkspaceError::NotReady)
        ));
        assert!(runner.calls().is_empty());
        // Accessors are not gated
        assert_eq!(ws.work_dir(), dir.path());
    }

    #[tokio::test]
    async fn test_aw020_failed_init_poisons_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = opts_in(&dir.path().join("missing"));
        opts.project_settings = Some(ProjectSettings::new("web", "go"));
        let mut ws = LocalWorkspace::with_runner(opts, Arc::new(FakeRunner::default())).unwrap();

        let err = ws.ready().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Io { .. }));
        assert!(matches!(ws.ready().await, Err(WorkspaceError::InitFailed(_))));
        assert!(matches!(ws.who_am_i().await, Err(WorkspaceError::InitFailed(_))));
    }

    #[tokio::test]
    async fn test_aw020_settings_roundtrip_through_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Pulumi.json"), r#"{"name": "old", "runtime": "go"}"#).unwrap();
        let ws = open_with(opts_in(dir.path()), Arc::new(FakeRunner::default())).await;

        let mut p = ws.project_settings().await.unwrap();
        assert_eq!(p.name, "old");
        p.description = Some("updated".into());
        ws.save_project_settings(&p).await.unwrap();
        assert!(!dir.path().join("Pulumi.yaml").exists());
        assert_eq!(ws.project_settings().await.unwrap(), p);

        let s = StackSettings { secrets_provider: Some("passphrase".into()), ..Default::default() };
        ws.save_stack_settings(&s, "teams/dev").await.unwrap();
        assert!(dir.path().join("Pulumi.dev.yaml").exists());
        assert_eq!(ws.stack_settings("dev").await.unwrap(), s);
    }

    #[tokio::test]
    async fn test_aw020_missing_project_settings() {
        let dir = tempfile::tempdir().unwrap();
        let ws = open_with(opts_in(dir.path()), Arc::new(FakeRunner::default())).await;
        assert!(matches!(
            ws.project_settings().await,
            Err(WorkspaceError::SettingsNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_aw020_stack_lifecycle_argv() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![]);
        let ws = open_with(opts_in(dir.path()), runner.clone()).await;

        ws.create_stack("dev").await.unwrap();
        ws.select_stack("dev").await.unwrap();
        ws.remove_stack("dev").await.unwrap();

        assert_eq!(
            runner.argv(),
            vec![
                sv(&["stack", "init", "dev"]),
                sv(&["stack", "select", "dev"]),
                sv(&["stack", "rm", "--yes", "dev"]),
            ]
        );
        assert!(runner.calls().iter().all(|c| c.cwd == dir.path()));
    }

    #[tokio::test]
    async fn test_aw020_create_stack_forwards_secrets_provider() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![]);
        let mut opts = opts_in(dir.path());
        opts.secrets_provider = Some("awskms://alias/app".into());
        let ws = open_with(opts, runner.clone()).await;

        ws.create_stack("org/prod").await.unwrap();
        ws.select_stack("org/prod").await.unwrap();
        assert_eq!(
            runner.argv(),
            vec![
                sv(&["stack", "init", "org/prod", "--secrets-provider", "awskms://alias/app"]),
                sv(&["stack", "select", "org/prod"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_aw020_engine_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![Reply::Exit(255, "error: stack 'dev' already exists")]);
        let ws = open_with(opts_in(dir.path()), runner).await;

        let err = ws.create_stack("dev").await.unwrap_err();
        assert_eq!(err.exit_code(), Some(255));
        assert!(err.to_string().contains("already exists"));
        // No local record of the stack
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_aw020_env_overlay_in_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![]);
        let mut opts = opts_in(dir.path());
        opts.env_vars.insert("A".into(), "1".into());
        opts.project_settings = Some(ProjectSettings::new("web", "go"));
        let mut ws = open_with(opts, runner.clone()).await;

        ws.set_env_var("B", "2");
        let mut more = EnvVars::new();
        more.insert("A".into(), "override".into());
        more.insert("C".into(), "3".into());
        ws.set_env_vars(more);
        ws.unset_env_var("B");
        ws.unset_env_var("NEVER_SET");

        let keys: Vec<_> = ws.env_vars().iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(keys, vec![("A", "override"), ("C", "3")]);

        ws.select_stack("dev").await.unwrap();
        assert_eq!(runner.calls()[0].env, ws.env_vars().clone());

        let raw = std::fs::read_to_string(dir.path().join("Pulumi.yaml")).unwrap();
        assert!(!raw.contains("override"));
    }

    #[tokio::test]
    async fn test_aw020_pulumi_home_exported() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![]);
        let mut opts = opts_in(dir.path());
        opts.pulumi_home = Some(PathBuf::from("/opt/engine-home"));
        opts.env_vars.insert(PULUMI_HOME_ENV.into(), "/ignored".into());
        let ws = open_with(opts, runner.clone()).await;

        assert_eq!(ws.pulumi_home(), Some(Path::new("/opt/engine-home")));
        ws.select_stack("dev").await.unwrap();
        assert_eq!(runner.calls()[0].env[PULUMI_HOME_ENV], "/opt/engine-home");
        // Overlay itself is untouched
        assert_eq!(ws.env_vars()[PULUMI_HOME_ENV], "/ignored");
    }

    #[tokio::test]
    async fn test_aw020_config_operations_argv() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![
            Reply::Stdout(r#"{"value": "us-west-2", "secret": false}"#),
            Reply::Stdout(""),
            Reply::Stdout(""),
            Reply::Stdout(""),
        ]);
        let ws = open_with(opts_in(dir.path()), runner.clone()).await;

        let v = ws.get_config("dev", "aws:region").await.unwrap();
        assert_eq!(v, ConfigValue::plain("us-west-2"));
        ws.set_config("dev", "app:token", &ConfigValue::secret("s3cr3t")).await.unwrap();
        ws.remove_config("dev", "app:old").await.unwrap();
        ws.remove_all_config("dev", &sv(&["app:a", "app:b"])).await.unwrap();
        ws.set_all_config("dev", &ConfigMap::new()).await.unwrap();
        ws.remove_all_config("dev", &[]).await.unwrap();

        assert_eq!(
            runner.argv(),
            vec![
                sv(&["config", "get", "aws:region", "--json", "--stack", "dev"]),
                sv(&["config", "set", "app:token", "--stack", "dev", "--secret", "--", "s3cr3t"]),
                sv(&["config", "rm", "app:old", "--stack", "dev"]),
                sv(&["config", "rm-all", "--stack", "dev", "app:a", "app:b"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_aw020_refresh_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![
            Reply::Stdout(""),
            Reply::Stdout(r#"{"app:name": {"value": "demo", "secret": false}}"#),
        ]);
        let ws = open_with(opts_in(dir.path()), runner.clone()).await;

        let m = ws.refresh_config("dev").await.unwrap();
        assert_eq!(m["app:name"], ConfigValue::plain("demo"));
        assert_eq!(
            runner.argv(),
            vec![
                sv(&["config", "refresh", "--force", "--stack", "dev"]),
                sv(&["config", "--show-secrets", "--json", "--stack", "dev"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_aw020_identity_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let listing = r#"[{"name":"dev","current":false},{"name":"prod","current":true}]"#;
        let runner = FakeRunner::replying(vec![
            Reply::Stdout("alice\n"),
            Reply::Stdout(listing),
            Reply::Stdout(listing),
            Reply::Stdout("[]"),
        ]);
        let ws = open_with(opts_in(dir.path()), runner.clone()).await;

        assert_eq!(ws.who_am_i().await.unwrap(), "alice");
        let names: Vec<_> = ws.list_stacks().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["dev", "prod"]);
        assert_eq!(ws.stack().await.unwrap().as_deref(), Some("prod"));
        assert_eq!(ws.stack().await.unwrap(), None);
        assert_eq!(runner.argv()[1], sv(&["stack", "ls", "--json"]));
    }

    #[tokio::test]
    async fn test_aw020_program_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = open_with(opts_in(dir.path()), Arc::new(FakeRunner::default())).await;
        assert!(ws.program().is_none());

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        ws.set_program(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let program = ws.program().unwrap();
        program();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Hooks that add a flag and record every callback.
    #[derive(Default)]
    struct RecordingHooks {
        completed: Mutex<Vec<String>>,
    }

    impl CommandHooks for RecordingHooks {
        fn serialize_args_for_op(&self, op: &str) -> Vec<String> {
            vec![format!("--op={}", op)]
        }

        fn post_command_callback(&self, op: &str) {
            self.completed.lock().unwrap().push(op.to_string());
        }
    }

    #[tokio::test]
    async fn test_aw020_hooks_wrap_every_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![Reply::Stdout(""), Reply::Exit(1, "denied")]);
        let ws = open_with(opts_in(dir.path()), runner.clone()).await;
        let hooks = RecordingHooks::default();

        let set = commands::config_set("dev", "app:port", &ConfigValue::plain("8080"));
        ws.run_engine_with(&hooks, "set_config", set).await.unwrap();
        let err = ws
            .run_engine_with(&hooks, "select_stack", commands::stack_select("dev"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));

        assert_eq!(
            runner.argv(),
            vec![
                sv(&["config", "set", "app:port", "--stack", "dev", "--plaintext", "--op=set_config", "--", "8080"]),
                sv(&["stack", "select", "dev", "--op=select_stack"]),
            ]
        );
        // Called after failures too
        assert_eq!(*hooks.completed.lock().unwrap(), vec!["set_config", "select_stack"]);
    }

    #[tokio::test]
    async fn test_aw020_relative_work_dir_made_absolute() {
        let ws = LocalWorkspace::with_runner(
            WorkspaceOptions {
                work_dir: Some(PathBuf::from(".")),
                ..Default::default()
            },
            Arc::new(FakeRunner::default()),
        )
        .unwrap();
        assert!(ws.work_dir().is_absolute());
        let expected = std::env::current_dir().unwrap().canonicalize().unwrap();
        assert_eq!(ws.work_dir().canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_aw020_local_hooks_are_noops() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::replying(vec![]);
        let ws = open_with(opts_in(dir.path()), runner.clone()).await;
        assert!(ws.serialize_args_for_op("create_stack").is_empty());
        ws.post_command_callback("create_stack");
        ws.remove_stack("dev").await.unwrap();
        assert_eq!(runner.argv()[0], sv(&["stack", "rm", "--yes", "dev"]));
    }
}
