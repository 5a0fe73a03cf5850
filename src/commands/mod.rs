use std::path::{Path, PathBuf};

use clap::Args;

use rollout::config::{
    ConfigSource, DeploymentConfig, DotenvSource, EnvSource, JsonFileSource, LayeredSource,
    MacroSpec,
};
use rollout::ssh::ControlRegistry;
use rollout::task::{catalog, TaskRegistry};

pub type CmdResult<T> = rollout::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Shared with the interrupt handler.
    pub(crate) registry: ControlRegistry,
}

/// Default `.env` file, read when present and no `--env-file` is given.
const DEFAULT_ENV_FILE: &str = ".env";

/// Where configuration comes from. The process environment always wins,
/// then the `.env` file, then the JSON config file.
#[derive(Args, Debug, Default, Clone)]
pub struct SourceArgs {
    /// JSON config file (`{"deploy": {...}, "macros": {...}}`)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Dotenv file [default: ./.env if it exists]
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,
}

impl SourceArgs {
    pub fn load(&self) -> rollout::Result<LayeredSource> {
        let mut source = LayeredSource::new().push(EnvSource);

        match &self.env_file {
            Some(path) => source = source.push(DotenvSource::load(path)?),
            None => {
                let default = Path::new(DEFAULT_ENV_FILE);
                if default.is_file() {
                    source = source.push(DotenvSource::load(default)?);
                }
            }
        }

        if let Some(path) = &self.config {
            source = source.push(JsonFileSource::load(path)?);
        }

        rollout::log_status!("config", "Reading configuration from {}", source.describe());
        Ok(source)
    }
}

/// Resolved configuration plus the task registry, including user macros.
pub(crate) fn load(args: &SourceArgs) -> rollout::Result<(DeploymentConfig, TaskRegistry)> {
    let source = args.load()?;
    let resolved = rollout::config::resolve(&source)?;
    let registry = load_registry(&source.macros())?;
    Ok((resolved, registry))
}

pub(crate) fn load_registry(macros: &[MacroSpec]) -> rollout::Result<TaskRegistry> {
    catalog::registry(macros)
}

pub mod config;
pub mod plan;
pub mod releases;
pub mod run;
pub mod tasks;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        rollout::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (rollout::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Plan(args) => dispatch!(args, global, plan),
        crate::Commands::Tasks(args) => dispatch!(args, global, tasks),
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Releases(args) => dispatch!(args, global, releases),
    }
}
