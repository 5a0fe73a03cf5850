use clap::Args;
use serde::Serialize;

use rollout::config::{ConfigSource, DeploymentConfig};

use super::{CmdResult, GlobalArgs, SourceArgs};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOutput {
    pub command: String,
    /// Sources in precedence order, highest first.
    pub sources: String,
    pub config: DeploymentConfig,
    pub current_dir: String,
}

/// Resolve and validate configuration without touching any host.
pub fn run(args: ConfigArgs, _global: &GlobalArgs) -> CmdResult<ConfigOutput> {
    let source = args.source.load()?;
    let config = rollout::config::resolve(&source)?;

    Ok((
        ConfigOutput {
            command: "config".to_string(),
            sources: source.describe(),
            current_dir: config.current_dir(),
            config,
        },
        0,
    ))
}
