//! Local task execution.

use std::process::Command;

use super::context::ExecutionContext;
use crate::console::OutputSink;
use crate::error::{Error, Result};
use crate::process::{self, CommandOutput};

pub trait LocalExecutor: Send + Sync {
    fn execute(
        &self,
        script: &str,
        ctx: &ExecutionContext,
        sink: &dyn OutputSink,
    ) -> Result<CommandOutput>;
}

/// Runs scripts with `sh -c` in the run's working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl LocalExecutor for ShellExecutor {
    fn execute(
        &self,
        script: &str,
        ctx: &ExecutionContext,
        sink: &dyn OutputSink,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]).current_dir(&ctx.working_dir);

        process::stream(cmd, None, None, sink).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("run local command in {}", ctx.working_dir.display())),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ConfigKey, MapSource};
    use crate::console::QuietSink;
    use crate::release::Release;

    fn context(dir: &std::path::Path) -> ExecutionContext {
        let config = resolve(
            &MapSource::new()
                .with(ConfigKey::BaseDir, "/srv/app")
                .with(ConfigKey::Repository, "git@x:y.git")
                .with(ConfigKey::User, "deploy")
                .with(ConfigKey::Host, "h"),
        )
        .unwrap();
        let release = Release::now(&config);
        ExecutionContext::new(config, release, "alice", dir)
    }

    #[test]
    fn runs_in_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let out = ShellExecutor
            .execute("ls", &context(dir.path()), &QuietSink)
            .unwrap();
        assert!(out.success);
        assert!(out.output.contains("marker.txt"));
    }

    #[test]
    fn reports_non_zero_exit_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellExecutor
            .execute("set -e\nfalse\necho never", &context(dir.path()), &QuietSink)
            .unwrap();
        assert_eq!(out.exit_code, 1);
        assert!(!out.output.contains("never"));
    }
}
