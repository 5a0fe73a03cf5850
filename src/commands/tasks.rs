use clap::Args;
use serde::Serialize;

use rollout::config::ConfigSource;
use rollout::task::{Macro, Statement, Target};

use super::{CmdResult, GlobalArgs, SourceArgs};

#[derive(Args)]
pub struct TasksArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEntry {
    pub name: String,
    pub target: Target,
    pub log_line: String,
    pub statements: Vec<Statement>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksOutput {
    pub command: String,
    pub tasks: Vec<TaskEntry>,
    pub macros: Vec<Macro>,
}

/// List the task catalog and every macro. Deployment values are not required.
pub fn run(args: TasksArgs, _global: &GlobalArgs) -> CmdResult<TasksOutput> {
    let source = args.source.load()?;
    let registry = super::load_registry(&source.macros())?;

    let tasks = registry
        .tasks()
        .iter()
        .map(|task| TaskEntry {
            name: task.name.clone(),
            target: task.target,
            log_line: task.log_line.clone(),
            statements: task.statements.clone(),
        })
        .collect();

    Ok((
        TasksOutput {
            command: "tasks".to_string(),
            tasks,
            macros: registry.macros().to_vec(),
        },
        0,
    ))
}
