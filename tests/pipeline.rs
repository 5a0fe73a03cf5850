use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::TimeZone;

use rollout::config::{resolve, ConfigKey, MapSource};
use rollout::console::OutputSink;
use rollout::engine::{Engine, ExecutionContext, LocalExecutor, TaskState};
use rollout::error::{Error, ErrorCode, Result};
use rollout::process::CommandOutput;
use rollout::release::Release;
use rollout::ssh::{Connector, Session};
use rollout::task::{catalog, Host, RegistryBuilder, Task};

type ExitRule = fn(&Host, &str) -> i32;

#[derive(Default)]
struct Recorder {
    opened: Mutex<Vec<String>>,
    closed: AtomicUsize,
    /// (origin, script) per dispatch, in dispatch order.
    scripts: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    fn scripts(&self) -> Vec<(String, String)> {
        self.scripts.lock().unwrap().clone()
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

struct MockConnector {
    log: Arc<Recorder>,
    exit_for: ExitRule,
    refuse: bool,
}

impl Connector for MockConnector {
    fn open(&self, host: &Host) -> Result<Box<dyn Session>> {
        if self.refuse {
            return Err(Error::ssh_connect_failed(
                &host.address,
                &host.user,
                host.port,
                "Connection refused",
            ));
        }
        self.log.opened.lock().unwrap().push(host.label());
        Ok(Box::new(MockSession {
            host: host.clone(),
            log: Arc::clone(&self.log),
            exit_for: self.exit_for,
        }))
    }
}

struct MockSession {
    host: Host,
    log: Arc<Recorder>,
    exit_for: ExitRule,
}

impl Session for MockSession {
    fn execute(&self, script: &str, sink: &dyn OutputSink) -> Result<CommandOutput> {
        self.log
            .scripts
            .lock()
            .unwrap()
            .push((self.host.label(), script.to_string()));
        let code = (self.exit_for)(&self.host, script);
        sink.output(Some(&self.host), "remote output");
        Ok(CommandOutput::from_exit(code, "remote output\n"))
    }

    fn close(&mut self) {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockLocal {
    log: Arc<Recorder>,
}

impl LocalExecutor for MockLocal {
    fn execute(
        &self,
        script: &str,
        _ctx: &ExecutionContext,
        _sink: &dyn OutputSink,
    ) -> Result<CommandOutput> {
        self.log
            .scripts
            .lock()
            .unwrap()
            .push(("local".to_string(), script.to_string()));
        Ok(CommandOutput::from_exit(0, ""))
    }
}

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl OutputSink for RecordingSink {
    fn task_started(&self, task: &Task) {
        self.lines.lock().unwrap().push(task.log_line.clone());
    }

    fn output(&self, _origin: Option<&Host>, _line: &str) {}

    fn script(&self, task: &Task, _host: Option<&Host>, _script: &str) {
        self.lines.lock().unwrap().push(format!("script {}", task.name));
    }

    fn failure(&self, error: &Error) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("FAILED {}", error.code.as_str()));
    }
}

struct Harness {
    log: Arc<Recorder>,
    sink: Arc<RecordingSink>,
    engine: Engine,
}

fn harness(exit_for: ExitRule, refuse: bool) -> Harness {
    let log = Arc::new(Recorder::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::new(
        Arc::new(MockConnector {
            log: Arc::clone(&log),
            exit_for,
            refuse,
        }),
        Arc::new(MockLocal {
            log: Arc::clone(&log),
        }),
        sink.clone(),
    );
    Harness { log, sink, engine }
}

fn always_ok(_host: &Host, _script: &str) -> i32 {
    0
}

fn context(hosts: &str) -> ExecutionContext {
    let config = resolve(
        &MapSource::new()
            .with(ConfigKey::BaseDir, "/srv/app")
            .with(ConfigKey::Repository, "git@x:y.git")
            .with(ConfigKey::User, "deploy")
            .with(ConfigKey::Host, hosts)
            .with(ConfigKey::ReleasesDir, "/srv/app/releases")
            .with(ConfigKey::KeepReleases, "3"),
    )
    .unwrap();
    let when = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let release = Release::at(&config, &when);
    ExecutionContext::new(config, release, "alice", "/home/alice/app")
}

fn expand(name: &str) -> Vec<Task> {
    catalog::registry(&[]).unwrap().expand(name).unwrap()
}

#[test]
fn deploy_aborts_at_failed_migration() {
    let h = harness(
        |_, script| if script.contains("artisan migrate") { 1 } else { 0 },
        false,
    );
    let result = h.engine.run(&expand(catalog::DEPLOY), &context("h")).unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_task.as_deref(), Some("migrateDatabase"));
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.host.as_deref(), Some("deploy@h"));

    // cloneRepository through migrateDatabase ran; bless and cleanup never did.
    let scripts = h.log.scripts();
    assert_eq!(scripts.len(), 8);
    assert!(scripts.iter().all(|(_, s)| !s.contains("mv -Tf")));
    assert_eq!(result.summary.not_run, 2);
    assert_eq!(result.tasks[8].name, "blessNewRelease");
    assert_eq!(result.tasks[8].state, TaskState::Pending);

    let lines = h.sink.lines();
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[7], "🙈  Migrating database...");
    assert_eq!(lines[8], "FAILED remote.command_failed");

    let err = result.into_result().unwrap_err();
    assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
    assert_eq!(err.details["task"], "migrateDatabase");
    assert_eq!(err.details["exitCode"], 1);
}

#[test]
fn successful_deploy_runs_every_task_in_order_over_one_connection() {
    let h = harness(always_ok, false);
    let result = h.engine.run(&expand(catalog::DEPLOY), &context("h")).unwrap();

    assert!(result.success);
    assert!(result.failed_task.is_none());
    assert_eq!(result.summary.succeeded, 10);
    assert_eq!(result.summary.connections_opened, 1);
    assert_eq!(h.log.opened(), vec!["deploy@h".to_string()]);
    assert_eq!(h.log.closed.load(Ordering::SeqCst), 1);

    let scripts = h.log.scripts();
    assert_eq!(scripts.len(), 10);
    assert!(scripts[0].1.contains("git clone --depth 1 -b master git@x:y.git /srv/app/releases/20240501-120000"));
    assert!(scripts[8].1.contains("ln -nfs /srv/app/releases/20240501-120000 /srv/app/current.next"));
    assert!(scripts[9].1.contains("tail -n +4"));

    let names: Vec<&str> = result.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, catalog::DEPLOY_SEQUENCE.to_vec());
}

#[test]
fn deploy_code_pulls_branch_and_leaves_symlink_alone() {
    let h = harness(always_ok, false);
    let result = h
        .engine
        .run(&expand(catalog::DEPLOY_CODE), &context("h"))
        .unwrap();

    assert!(result.success);
    let scripts = h.log.scripts();
    assert_eq!(scripts.len(), 1);
    let script = &scripts[0].1;
    assert!(script.starts_with("set -e\ncd /srv/app/current\n"));
    assert!(script.contains("git pull origin master"));
    assert!(!script.contains("ln -nfs"));
}

#[test]
fn unknown_macro_runs_nothing() {
    let h = harness(always_ok, false);
    let err = catalog::registry(&[]).unwrap().expand("deploy-all").unwrap_err();
    assert_eq!(err.code, ErrorCode::SetupUnknownMacro);
    assert!(h.log.opened().is_empty());
    assert!(h.log.scripts().is_empty());
}

#[test]
fn connection_failure_aborts_before_any_dispatch() {
    let h = harness(always_ok, true);
    let result = h.engine.run(&expand(catalog::DEPLOY), &context("h")).unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_task.as_deref(), Some("cloneRepository"));
    assert!(result.exit_code.is_none());
    assert!(h.log.scripts().is_empty());
    assert_eq!(
        result.error.as_ref().map(|e| e.code),
        Some(ErrorCode::SshConnectFailed)
    );
}

#[test]
fn host_group_waits_for_all_hosts_and_reports_the_failing_one() {
    let h = harness(
        |host, script| {
            if host.address == "web2" && script.contains("composer install") {
                2
            } else {
                0
            }
        },
        false,
    );
    let result = h
        .engine
        .run(&expand(catalog::DEPLOY), &context("web1,web2"))
        .unwrap();

    assert_eq!(result.failed_task.as_deref(), Some("runComposer"));
    assert_eq!(result.host.as_deref(), Some("deploy@web2"));
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.summary.connections_opened, 2);

    // Both hosts ran both tasks; nothing after runComposer was dispatched.
    let scripts = h.log.scripts();
    assert_eq!(scripts.len(), 4);
    assert_eq!(h.log.closed.load(Ordering::SeqCst), 2);
}

#[test]
fn dry_run_logs_every_task_without_connecting() {
    let h = harness(always_ok, false);
    let ctx = context("h").with_dry_run(true);
    let result = h.engine.run(&expand(catalog::SHIP), &ctx).unwrap();

    assert!(result.success);
    assert!(result.dry_run);
    assert_eq!(result.summary.skipped, 12);
    assert!(h.log.opened().is_empty());
    assert!(h.log.scripts().is_empty());

    let lines = h.sink.lines();
    assert_eq!(lines[0], "🏃  Starting deployment...");
    assert_eq!(lines[1], "script startDeployment");
    assert_eq!(lines.last().map(String::as_str), Some("🚀  Application deployed!"));
}

#[test]
fn ship_runs_local_steps_locally() {
    let h = harness(always_ok, false);
    let result = h.engine.run(&expand(catalog::SHIP), &context("h")).unwrap();

    assert!(result.success);
    let scripts = h.log.scripts();
    // finishDeploy has no statements and is never dispatched.
    assert_eq!(scripts.len(), 11);
    assert_eq!(scripts[0].0, "local");
    assert!(scripts[0].1.contains("git checkout master"));
    assert!(scripts[1..].iter().all(|(origin, _)| origin == "deploy@h"));
    assert_eq!(result.tasks[11].state, TaskState::Succeeded);
}

#[test]
fn unresolved_placeholder_fails_before_connecting() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(Task::remote("clone", "Cloning...").run("git", &["pull"]))
        .unwrap();
    builder
        .register(
            Task::remote("runYarn", "Running Yarn...").run("nvm", &["use", "{{nodeVersion}}"]),
        )
        .unwrap();
    builder
        .define_macro("assets", vec!["clone".to_string(), "runYarn".to_string()])
        .unwrap();
    let tasks = builder.build().expand("assets").unwrap();

    let h = harness(always_ok, false);
    let err = h.engine.run(&tasks, &context("h")).unwrap_err();

    assert_eq!(err.code, ErrorCode::SetupTemplate);
    assert!(h.log.opened().is_empty());
    assert!(h.sink.lines().is_empty());
}

#[test]
fn hostile_config_values_stay_quoted() {
    let mut ctx = context("h");
    ctx.config.branch = "main; rm -rf /".to_string();
    let h = harness(always_ok, false);
    let result = h.engine.run(&expand(catalog::DEPLOY_CODE), &ctx).unwrap();

    assert!(result.success);
    assert!(h.log.scripts()[0].1.contains("git pull origin 'main; rm -rf /'"));
}
