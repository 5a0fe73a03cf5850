//! Sequential, fail-fast task pipeline.
//!
//! Tasks run strictly one after another. Within a remote task every host in
//! the group runs concurrently and the task completes only when all of them
//! have reported. The first failing task ends the run; nothing is rolled back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use super::context::ExecutionContext;
use super::executor::LocalExecutor;
use crate::console::OutputSink;
use crate::error::{Error, Result, TaskExecutionDetails};
use crate::release::Release;
use crate::ssh::{Connector, Session};
use crate::task::{Host, Target, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Rendering,
    Dispatching,
    Running,
    Succeeded,
    Failed,
    /// Logged but not dispatched (dry run).
    Skipped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Rendering => "rendering",
            TaskState::Dispatching => "dispatching",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// A task with its script rendered and its hosts resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    pub name: String,
    pub target: Target,
    pub log_line: String,
    /// `user@address` per host; empty for local tasks.
    pub hosts: Vec<String>,
    pub script: String,
}

/// One task on one host. Consumed by the abort decision, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub task_name: String,
    pub host: Option<String>,
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub name: String,
    pub target: Target,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tasks never started because an earlier task failed.
    pub not_run: usize,
    pub connections_opened: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub run_id: Uuid,
    pub release: Release,
    pub dry_run: bool,
    pub tasks: Vec<TaskOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub summary: PipelineSummary,
    #[serde(skip)]
    pub error: Option<Error>,
}

impl PipelineResult {
    /// `Ok` on success, otherwise the error that stopped the run.
    pub fn into_result(self) -> Result<Self> {
        match (self.success, self.error.clone()) {
            (false, Some(err)) => Err(err),
            (false, None) => Err(Error::internal_unexpected(
                "pipeline failed without an error",
            )),
            (true, _) => Ok(self),
        }
    }
}

/// Sessions opened lazily, one per host, and reused for the whole run.
/// Dropping the pool closes every session, on success, failure or panic.
struct SessionPool {
    connector: Arc<dyn Connector>,
    sessions: HashMap<String, Box<dyn Session>>,
    opened: usize,
}

impl SessionPool {
    fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: HashMap::new(),
            opened: 0,
        }
    }

    fn ensure(&mut self, host: &Host) -> Result<()> {
        let label = host.label();
        if !self.sessions.contains_key(&label) {
            let session = self.connector.open(host)?;
            self.opened += 1;
            self.sessions.insert(label, session);
        }
        Ok(())
    }

    fn get(&self, host: &Host) -> Option<&dyn Session> {
        self.sessions.get(&host.label()).map(|s| s.as_ref())
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close();
        }
    }
}

/// The first failure of a task, in host order.
struct Failure {
    host: Option<String>,
    exit_code: Option<i32>,
    output: String,
    error: Error,
}

pub struct Engine {
    connector: Arc<dyn Connector>,
    local: Arc<dyn LocalExecutor>,
    sink: Arc<dyn OutputSink>,
}

impl Engine {
    pub fn new(
        connector: Arc<dyn Connector>,
        local: Arc<dyn LocalExecutor>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            connector,
            local,
            sink,
        }
    }

    /// Render every task against `ctx` without running anything.
    ///
    /// Fails on the first unresolved placeholder, before any connection exists.
    pub fn plan(&self, tasks: &[Task], ctx: &ExecutionContext) -> Result<Vec<PlannedTask>> {
        let vars = ctx.vars();
        let hosts: Vec<String> = ctx.hosts().iter().map(Host::label).collect();

        tasks
            .iter()
            .map(|task| {
                let script = task.render(&vars)?;
                Ok(PlannedTask {
                    name: task.name.clone(),
                    target: task.target,
                    log_line: task.log_line.clone(),
                    hosts: match task.target {
                        Target::Local => Vec::new(),
                        Target::Remote => hosts.clone(),
                    },
                    script,
                })
            })
            .collect()
    }

    pub fn run(&self, tasks: &[Task], ctx: &ExecutionContext) -> Result<PipelineResult> {
        let planned = self.plan(tasks, ctx)?;
        let mut states = vec![TaskState::Pending; tasks.len()];

        let hosts = ctx.hosts();
        let mut pool = SessionPool::new(Arc::clone(&self.connector));
        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut failure: Option<(String, Failure)> = None;

        for (index, (task, plan)) in tasks.iter().zip(&planned).enumerate() {
            let state = &mut states[index];
            let started = Instant::now();
            self.sink.task_started(task);
            transition(task, state, TaskState::Rendering);

            if ctx.dry_run {
                self.preview(task, plan, &hosts);
                transition(task, state, TaskState::Skipped);
            } else if plan.script.is_empty() {
                transition(task, state, TaskState::Succeeded);
            } else {
                let result = match task.target {
                    Target::Local => self.run_local(task, plan, ctx, state),
                    Target::Remote => self.run_remote(task, plan, &hosts, &mut pool, state),
                };
                match result {
                    Ok(()) => transition(task, state, TaskState::Succeeded),
                    Err(err) => {
                        transition(task, state, TaskState::Failed);
                        self.sink.failure(&err.error);
                        failure = Some((task.name.clone(), err));
                    }
                }
            }

            outcomes.push(TaskOutcome {
                name: task.name.clone(),
                target: task.target,
                state: *state,
                hosts: plan.hosts.clone(),
                duration_ms: started.elapsed().as_millis(),
            });

            if failure.is_some() {
                break;
            }
        }

        for (task, state) in tasks.iter().zip(&states).skip(outcomes.len()) {
            outcomes.push(TaskOutcome {
                name: task.name.clone(),
                target: task.target,
                state: *state,
                hosts: Vec::new(),
                duration_ms: 0,
            });
        }

        let summary = summarize(&outcomes, pool.opened);
        let mut result = PipelineResult {
            success: failure.is_none(),
            run_id: ctx.run_id,
            release: ctx.release.clone(),
            dry_run: ctx.dry_run,
            tasks: outcomes,
            failed_task: None,
            host: None,
            exit_code: None,
            output: None,
            summary,
            error: None,
        };

        if let Some((name, failed)) = failure {
            result.failed_task = Some(name);
            result.host = failed.host;
            result.exit_code = failed.exit_code;
            result.output = Some(failed.output);
            result.error = Some(failed.error);
        }

        Ok(result)
    }

    fn preview(&self, task: &Task, plan: &PlannedTask, hosts: &[Host]) {
        if plan.script.is_empty() {
            return;
        }
        match task.target {
            Target::Local => self.sink.script(task, None, &plan.script),
            Target::Remote => {
                for host in hosts {
                    self.sink.script(task, Some(host), &plan.script);
                }
            }
        }
    }

    fn run_local(
        &self,
        task: &Task,
        plan: &PlannedTask,
        ctx: &ExecutionContext,
        state: &mut TaskState,
    ) -> std::result::Result<(), Failure> {
        transition(task, state, TaskState::Dispatching);
        transition(task, state, TaskState::Running);

        let output = self
            .local
            .execute(&plan.script, ctx, self.sink.as_ref())
            .map_err(|error| Failure {
                host: None,
                exit_code: None,
                output: String::new(),
                error,
            })?;

        let result = ExecutionResult {
            task_name: task.name.clone(),
            host: None,
            exit_code: output.exit_code,
            output: output.output,
        };
        check(result)
    }

    fn run_remote(
        &self,
        task: &Task,
        plan: &PlannedTask,
        hosts: &[Host],
        pool: &mut SessionPool,
        state: &mut TaskState,
    ) -> std::result::Result<(), Failure> {
        transition(task, state, TaskState::Dispatching);
        for host in hosts {
            pool.ensure(host).map_err(|error| Failure {
                host: Some(host.label()),
                exit_code: None,
                output: String::new(),
                error,
            })?;
        }

        transition(task, state, TaskState::Running);
        let sink = self.sink.as_ref();
        let pool: &SessionPool = pool;

        let results: Vec<std::result::Result<ExecutionResult, Failure>> = thread::scope(|scope| {
            let workers: Vec<_> = hosts
                .iter()
                .map(|host| {
                    scope.spawn(move || -> std::result::Result<ExecutionResult, Failure> {
                        let session = pool.get(host).ok_or_else(|| Failure {
                            host: Some(host.label()),
                            exit_code: None,
                            output: String::new(),
                            error: Error::internal_unexpected(format!(
                                "no session for {}",
                                host.label()
                            )),
                        })?;
                        let output = session.execute(&plan.script, sink).map_err(|error| Failure {
                            host: Some(host.label()),
                            exit_code: None,
                            output: String::new(),
                            error,
                        })?;
                        Ok(ExecutionResult {
                            task_name: task.name.clone(),
                            host: Some(host.label()),
                            exit_code: output.exit_code,
                            output: output.output,
                        })
                    })
                })
                .collect();

            workers
                .into_iter()
                .zip(hosts)
                .map(|(worker, host)| {
                    worker.join().unwrap_or_else(|_| {
                        Err(Failure {
                            host: Some(host.label()),
                            exit_code: None,
                            output: String::new(),
                            error: Error::internal_unexpected(format!(
                                "worker for {} panicked",
                                host.label()
                            )),
                        })
                    })
                })
                .collect()
        });

        // Every host has reported; the first failure in host order wins.
        for result in results {
            check(result?)?;
        }
        Ok(())
    }
}

fn check(result: ExecutionResult) -> std::result::Result<(), Failure> {
    if result.exit_code == 0 {
        return Ok(());
    }
    Err(Failure {
        host: result.host.clone(),
        exit_code: Some(result.exit_code),
        output: result.output.clone(),
        error: Error::task_execution_failed(TaskExecutionDetails {
            task: result.task_name,
            host: result.host,
            exit_code: result.exit_code,
            output: result.output,
        }),
    })
}

fn transition(task: &Task, state: &mut TaskState, next: TaskState) {
    log_status!("engine", "{}: {} -> {}", task.name, state, next);
    *state = next;
}

fn summarize(outcomes: &[TaskOutcome], connections_opened: usize) -> PipelineSummary {
    let count = |wanted: TaskState| outcomes.iter().filter(|o| o.state == wanted).count();
    PipelineSummary {
        total: outcomes.len(),
        succeeded: count(TaskState::Succeeded),
        failed: count(TaskState::Failed),
        skipped: count(TaskState::Skipped),
        not_run: count(TaskState::Pending),
        connections_opened,
    }
}
