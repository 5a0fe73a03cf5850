use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use rollout::console::StdoutSink;
use rollout::engine::{Engine, ExecutionContext, PipelineResult, ShellExecutor};
use rollout::ssh::SshConnector;
use rollout::task::catalog;

use super::{CmdResult, GlobalArgs, SourceArgs};

#[derive(Args)]
pub struct RunArgs {
    /// Macro to run (deploy, deploy-code, ship, or one from --config)
    #[arg(default_value = catalog::DEPLOY)]
    pub macro_name: String,

    /// Log every task and print its script without connecting or running anything
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub command: String,
    #[serde(rename = "macro")]
    pub macro_name: String,
    #[serde(flatten)]
    pub pipeline: PipelineResult,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let (config, registry) = super::load(&args.source)?;
    let tasks = registry.expand(&args.macro_name)?;

    let ctx = ExecutionContext::from_process(config)?.with_dry_run(args.dry_run);
    let sink = Arc::new(StdoutSink::new(ctx.hosts().len()));
    let connector = Arc::new(SshConnector::new(ctx.run_id, global.registry.clone()));
    let engine = Engine::new(connector, Arc::new(ShellExecutor), sink);

    rollout::log_status!(
        "run",
        "Release {} ({} tasks, run {})",
        ctx.release.name,
        tasks.len(),
        ctx.run_id
    );

    let pipeline = engine.run(&tasks, &ctx)?.into_result()?;

    Ok((
        RunOutput {
            command: "run".to_string(),
            macro_name: args.macro_name,
            pipeline,
        },
        0,
    ))
}
