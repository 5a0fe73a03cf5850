use clap::Args;
use serde::Serialize;

use rollout::console::QuietSink;
use rollout::engine::ExecutionContext;
use rollout::release::{is_release_name, stale_releases};
use rollout::ssh::{Connector, SshConnector};
use rollout::task::Task;

use super::{CmdResult, GlobalArgs, SourceArgs};

#[derive(Args)]
pub struct ReleasesArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReleases {
    pub host: String,
    /// Oldest first.
    pub releases: Vec<String>,
    /// Release the current symlink points at, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// Releases the next cleanup would remove.
    pub stale: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasesOutput {
    pub command: String,
    pub releases_dir: String,
    pub keep_releases: usize,
    pub hosts: Vec<HostReleases>,
}

/// Inspect release directories on every host. Read-only.
pub fn run(args: ReleasesArgs, global: &GlobalArgs) -> CmdResult<ReleasesOutput> {
    let (config, _registry) = super::load(&args.source)?;
    let ctx = ExecutionContext::from_process(config)?;
    let vars = ctx.vars();

    let listing = Task::remote("listReleases", "")
        .run("ls", &["-1", "{{releasesDir}}"])
        .render(&vars)?;
    let current = Task::remote("readCurrent", "")
        .run("readlink", &["{{currentDir}}"])
        .render(&vars)?;

    let connector = SshConnector::new(ctx.run_id, global.registry.clone());
    let mut hosts = Vec::new();

    for host in ctx.hosts() {
        let mut session = connector.open(&host)?;
        let listed = session.execute(&listing, &QuietSink)?;
        let linked = session.execute(&current, &QuietSink)?;
        session.close();

        // A missing releases directory means no releases yet.
        let mut names: Vec<String> = if listed.success {
            listed
                .output
                .lines()
                .map(str::trim)
                .filter(|name| is_release_name(name))
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        names.sort();

        let current = linked
            .success
            .then(|| linked.output.trim().rsplit('/').next().unwrap_or_default().to_string())
            .filter(|name| !name.is_empty());

        hosts.push(HostReleases {
            host: host.label(),
            stale: stale_releases(&names, ctx.config.keep_releases),
            releases: names,
            current,
        });
    }

    Ok((
        ReleasesOutput {
            command: "releases".to_string(),
            releases_dir: ctx.config.releases_dir.clone(),
            keep_releases: ctx.config.keep_releases,
            hosts,
        },
        0,
    ))
}
