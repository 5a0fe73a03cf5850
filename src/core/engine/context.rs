use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::config::DeploymentConfig;
use crate::error::{Error, Result};
use crate::release::Release;
use crate::task::Host;
use crate::utils::template::TemplateVars;

/// Everything a run needs from its surroundings, captured once up front.
///
/// Nothing below this layer reads the process environment or the working
/// directory on its own.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub config: DeploymentConfig,
    pub release: Release,
    pub local_user: String,
    pub working_dir: PathBuf,
    pub run_id: Uuid,
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(
        config: DeploymentConfig,
        release: Release,
        local_user: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            release,
            local_user: local_user.into(),
            working_dir: working_dir.into(),
            run_id: Uuid::new_v4(),
            dry_run: false,
        }
    }

    /// Capture the current user, working directory and clock.
    pub fn from_process(config: DeploymentConfig) -> Result<Self> {
        let working_dir = std::env::current_dir()
            .map_err(|e| Error::internal_io(e.to_string(), Some("read working directory".to_string())))?;
        let local_user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let release = Release::now(&config);
        Ok(Self::new(config, release, local_user, working_dir))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.config.remote_hosts()
    }

    /// Placeholder values available to every task template.
    pub fn vars(&self) -> HashMap<String, String> {
        let config = &self.config;
        [
            (TemplateVars::BASE_DIR, config.base_dir.clone()),
            (TemplateVars::REPOSITORY, config.repository.clone()),
            (TemplateVars::DEPLOY_USER, config.deploy_user.clone()),
            (TemplateVars::DEPLOY_HOST, config.deploy_host.clone()),
            (TemplateVars::SSH_PORT, config.ssh_port.to_string()),
            (TemplateVars::BRANCH, config.branch.clone()),
            (TemplateVars::RELEASES_DIR, config.releases_dir.clone()),
            (TemplateVars::PERSISTENT_DIR, config.persistent_dir.clone()),
            (TemplateVars::CURRENT_ALIAS, config.current_alias.clone()),
            (TemplateVars::CURRENT_DIR, config.current_dir()),
            (TemplateVars::KEEP_RELEASES, config.keep_releases.to_string()),
            (TemplateVars::RELEASE_NAME, self.release.name.clone()),
            (TemplateVars::RELEASE_DIR, self.release.dir.clone()),
            (TemplateVars::LOCAL_USER, self.local_user.clone()),
            (
                TemplateVars::WORKING_DIR,
                self.working_dir.display().to_string(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
