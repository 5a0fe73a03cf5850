use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use rollout::config::DeploymentConfig;
use rollout::console::StdoutSink;
use rollout::engine::{Engine, ExecutionContext, PlannedTask, ShellExecutor};
use rollout::release::Release;
use rollout::ssh::SshConnector;
use rollout::task::catalog;

use super::{CmdResult, GlobalArgs, SourceArgs};

#[derive(Args)]
pub struct PlanArgs {
    /// Macro to plan
    #[arg(default_value = catalog::DEPLOY)]
    pub macro_name: String,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    pub command: String,
    #[serde(rename = "macro")]
    pub macro_name: String,
    pub config: DeploymentConfig,
    pub release: Release,
    pub tasks: Vec<PlannedTask>,
}

/// Render the macro's scripts against the current configuration. Never connects.
pub fn run(args: PlanArgs, global: &GlobalArgs) -> CmdResult<PlanOutput> {
    let (config, registry) = super::load(&args.source)?;
    let tasks = registry.expand(&args.macro_name)?;

    let ctx = ExecutionContext::from_process(config)?;
    let engine = Engine::new(
        Arc::new(SshConnector::new(ctx.run_id, global.registry.clone())),
        Arc::new(ShellExecutor),
        Arc::new(StdoutSink::new(ctx.hosts().len())),
    );
    let planned = engine.plan(&tasks, &ctx)?;

    Ok((
        PlanOutput {
            command: "plan".to_string(),
            macro_name: args.macro_name,
            config: ctx.config,
            release: ctx.release,
            tasks: planned,
        },
        0,
    ))
}
