//! The built-in task catalog and macros.

use super::{RegistryBuilder, Task, TaskRegistry};
use crate::config::MacroSpec;
use crate::error::Result;
use crate::release::RELEASE_MARKER;

pub const DEPLOY: &str = "deploy";
pub const DEPLOY_CODE: &str = "deploy-code";
pub const SHIP: &str = "ship";

/// Remote steps of a full release, in execution order.
pub const DEPLOY_SEQUENCE: [&str; 10] = [
    "cloneRepository",
    "runComposer",
    "runYarn",
    "generateAssets",
    "updateSymlinks",
    "optimizeInstallation",
    "backupDatabase",
    "migrateDatabase",
    "blessNewRelease",
    "cleanOldReleases",
];

const SPARSE_CHECKOUT: &str = ".git/info/sparse-checkout";
const RELOAD_PHP_FPM: &str = "~/scripts/reload_php-fpm.sh";

pub fn builtin_tasks() -> Vec<Task> {
    vec![
        Task::local("startDeployment", "🏃  Starting deployment...")
            .run("git", &["checkout", "{{branch}}"])
            .run("git", &["pull", "origin", "{{branch}}"]),
        Task::remote("cloneRepository", "🌀  Cloning repository...")
            .ensure_dir("{{releasesDir}}")
            .ensure_dir("{{persistentDir}}")
            .ensure_dir("{{persistentDir}}/media")
            .ensure_dir("{{persistentDir}}/storage")
            .run(
                "git",
                &[
                    "clone",
                    "--depth",
                    "1",
                    "-b",
                    "{{branch}}",
                    "{{repository}}",
                    "{{releaseDir}}",
                ],
            )
            .cd("{{releaseDir}}")
            .run("git", &["config", "core.sparsecheckout", "true"])
            .write_file(SPARSE_CHECKOUT, "*")
            .append_file(SPARSE_CHECKOUT, "!storage")
            .append_file(SPARSE_CHECKOUT, "!public/build")
            .run("git", &["read-tree", "-mu", "HEAD"])
            .write_file(RELEASE_MARKER, "{{releaseName}}"),
        Task::remote("runComposer", "🚚  Running Composer...")
            .cd("{{releaseDir}}")
            .run(
                "composer",
                &["install", "--prefer-dist", "--no-scripts", "--no-dev", "-q", "-o"],
            ),
        Task::remote("runYarn", "📦  Running Yarn...")
            .cd("{{releaseDir}}")
            .run("yarn", &["config", "set", "ignore-engines", "true"])
            .run("yarn", &[]),
        Task::remote("generateAssets", "🌅  Generating assets...")
            .cd("{{releaseDir}}")
            .run("yarn", &["run", "production", "--", "--progress", "false"]),
        Task::remote("updateSymlinks", "🔗  Updating symlinks to persistent data...")
            .remove_all("{{releaseDir}}/storage")
            .symlink("{{persistentDir}}/storage", "{{releaseDir}}/storage")
            .remove_all("{{releaseDir}}/public/media")
            .symlink("{{persistentDir}}/media", "{{releaseDir}}/public/media")
            .symlink("{{baseDir}}/.env", "{{releaseDir}}/.env"),
        Task::remote("optimizeInstallation", "✨  Optimizing installation...")
            .cd("{{releaseDir}}")
            .run("php", &["artisan", "clear-compiled"]),
        Task::remote("backupDatabase", "📀  Backing up database...")
            .cd("{{releaseDir}}")
            .run("php", &["artisan", "backup:run"]),
        Task::remote("migrateDatabase", "🙈  Migrating database...")
            .cd("{{releaseDir}}")
            .run("php", &["artisan", "migrate", "--force"]),
        Task::remote("blessNewRelease", "🙏  Blessing new release...")
            .swap_symlink("{{releaseDir}}", "{{currentDir}}")
            .cd("{{releaseDir}}")
            .run("php", &["artisan", "horizon:terminate"])
            .run("php", &["artisan", "config:clear"])
            .run("php", &["artisan", "cache:clear"])
            .run("php", &["artisan", "config:cache"])
            .run(RELOAD_PHP_FPM, &[])
            .run("php", &["artisan", "queue:restart"]),
        Task::remote("cleanOldReleases", "🚾  Cleaning up old releases...")
            .prune_releases("{{releasesDir}}"),
        Task::local("finishDeploy", "🚀  Application deployed!"),
        Task::remote("deployOnlyCode", "💻  Deploying code changes...")
            .cd("{{currentDir}}")
            .run("git", &["pull", "origin", "{{branch}}"])
            .run("php", &["artisan", "config:clear"])
            .run("php", &["artisan", "cache:clear"])
            .run("php", &["artisan", "config:cache"])
            .run(RELOAD_PHP_FPM, &[]),
    ]
}

fn builtin_macros() -> Vec<(&'static str, Vec<String>)> {
    let deploy: Vec<String> = DEPLOY_SEQUENCE.iter().map(|t| t.to_string()).collect();

    let mut ship = vec!["startDeployment".to_string()];
    ship.extend(deploy.iter().cloned());
    ship.push("finishDeploy".to_string());

    vec![
        (DEPLOY, deploy),
        (DEPLOY_CODE, vec!["deployOnlyCode".to_string()]),
        (SHIP, ship),
    ]
}

/// Built-in tasks and macros, followed by `extra` user macros.
///
/// User macros may only reference catalog tasks and may not reuse a
/// built-in macro name.
pub fn registry(extra: &[MacroSpec]) -> Result<TaskRegistry> {
    let mut builder = RegistryBuilder::new();
    for task in builtin_tasks() {
        builder.register(task)?;
    }
    for (name, tasks) in builtin_macros() {
        builder.define_macro(name, tasks)?;
    }
    for spec in extra {
        builder.define_macro(spec.name.clone(), spec.tasks.clone())?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::task::Target;

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn deploy_expands_to_fixed_sequence() {
        let registry = registry(&[]).unwrap();
        let tasks = registry.expand(DEPLOY).unwrap();
        assert_eq!(names(&tasks), DEPLOY_SEQUENCE.to_vec());
        assert!(tasks.iter().all(|t| t.target == Target::Remote));
    }

    #[test]
    fn deploy_code_is_one_task() {
        let registry = registry(&[]).unwrap();
        assert_eq!(names(&registry.expand(DEPLOY_CODE).unwrap()), vec!["deployOnlyCode"]);
    }

    #[test]
    fn ship_wraps_deploy_with_local_steps() {
        let registry = registry(&[]).unwrap();
        let tasks = registry.expand(SHIP).unwrap();
        assert_eq!(tasks.len(), 12);
        assert_eq!(tasks[0].name, "startDeployment");
        assert_eq!(tasks[0].target, Target::Local);
        assert_eq!(tasks[11].name, "finishDeploy");
    }

    #[test]
    fn user_macros_extend_the_catalog() {
        let extra = vec![MacroSpec {
            name: "assets".to_string(),
            tasks: vec!["runYarn".to_string(), "generateAssets".to_string()],
        }];
        let registry = registry(&extra).unwrap();
        assert_eq!(
            names(&registry.expand("assets").unwrap()),
            vec!["runYarn", "generateAssets"]
        );
    }

    #[test]
    fn user_macro_cannot_shadow_builtin() {
        let extra = vec![MacroSpec {
            name: DEPLOY.to_string(),
            tasks: vec!["runYarn".to_string()],
        }];
        let err = registry(&extra).unwrap_err();
        assert_eq!(err.code, ErrorCode::SetupDuplicateMacro);
    }

    #[test]
    fn only_bless_touches_current_symlink() {
        let touching: Vec<String> = builtin_tasks()
            .into_iter()
            .filter(|t| {
                t.statements.iter().any(|s| {
                    matches!(s, crate::task::Statement::SwapSymlink { link, .. } if link == "{{currentDir}}")
                })
            })
            .map(|t| t.name)
            .collect();
        assert_eq!(touching, vec!["blessNewRelease".to_string()]);
    }
}
