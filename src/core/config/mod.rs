//! Deployment configuration resolution.
//!
//! `resolve` is a pure function over a [`ConfigSource`]: it never touches the
//! filesystem or network, and reports every missing required key at once.

pub mod keys;
pub mod source;

use serde::Serialize;

pub use keys::ConfigKey;
pub use source::{
    ConfigSource, DotenvSource, EnvSource, JsonFileSource, LayeredSource, MacroSpec, MapSource,
};

use crate::error::{Error, Result};
use crate::task::Host;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_PERSISTENT_DIR: &str = "persistent";
pub const DEFAULT_CURRENT_ALIAS: &str = "current";
pub const DEFAULT_KEEP_RELEASES: usize = 3;
pub const DEFAULT_RELEASES_DIR: &str = "releases";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub base_dir: String,
    pub repository: String,
    pub deploy_user: String,
    /// One host, or a comma-separated host group.
    pub deploy_host: String,
    pub ssh_port: u16,
    pub branch: String,
    /// Absolute; relative input is resolved under `base_dir`.
    pub releases_dir: String,
    /// Absolute; relative input is resolved under `base_dir`.
    pub persistent_dir: String,
    pub current_alias: String,
    pub keep_releases: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_identity: Option<String>,
}

impl DeploymentConfig {
    /// `{baseDir}/{currentAlias}`, the symlink that points at the live release.
    pub fn current_dir(&self) -> String {
        join_path(&self.base_dir, &self.current_alias)
    }

    /// The remote host group. Every host shares user, port and identity.
    pub fn remote_hosts(&self) -> Vec<Host> {
        split_hosts(&self.deploy_host)
            .into_iter()
            .map(|address| Host {
                address,
                user: self.deploy_user.clone(),
                port: self.ssh_port,
                identity_file: self.ssh_identity.clone(),
            })
            .collect()
    }
}

pub fn resolve(source: &dyn ConfigSource) -> Result<DeploymentConfig> {
    let missing: Vec<String> = ConfigKey::REQUIRED
        .iter()
        .filter(|key| {
            let value = source.get(**key).unwrap_or_default();
            match key {
                ConfigKey::Host => split_hosts(&value).is_empty(),
                _ => value.trim().is_empty(),
            }
        })
        .map(|key| key.env_name().to_string())
        .collect();

    if !missing.is_empty() {
        return Err(Error::config_missing_keys(missing));
    }

    let required = |key: ConfigKey| source.get(key).unwrap_or_default().trim().to_string();

    let base_dir = trim_trailing_slash(&required(ConfigKey::BaseDir));
    if !base_dir.starts_with('/') {
        return Err(Error::config_invalid_path(
            ConfigKey::BaseDir.env_name(),
            base_dir,
        ));
    }

    let releases_dir = optional_string(source, ConfigKey::ReleasesDir)?
        .map(|dir| resolve_under(&base_dir, &dir))
        .unwrap_or_else(|| join_path(&base_dir, DEFAULT_RELEASES_DIR));

    let persistent_dir = resolve_under(
        &base_dir,
        &optional_string(source, ConfigKey::PersistentDir)?
            .unwrap_or_else(|| DEFAULT_PERSISTENT_DIR.to_string()),
    );

    let current_alias = optional_string(source, ConfigKey::Current)?
        .unwrap_or_else(|| DEFAULT_CURRENT_ALIAS.to_string());

    let branch =
        optional_string(source, ConfigKey::Branch)?.unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    let ssh_port = match optional_string(source, ConfigKey::SshPort)? {
        Some(raw) => parse_port(&raw)?,
        None => DEFAULT_SSH_PORT,
    };

    let keep_releases = match optional_string(source, ConfigKey::KeepReleases)? {
        Some(raw) => parse_keep(&raw)?,
        None => DEFAULT_KEEP_RELEASES,
    };

    let ssh_identity = optional_string(source, ConfigKey::SshIdentity)?;

    Ok(DeploymentConfig {
        base_dir,
        repository: required(ConfigKey::Repository),
        deploy_user: required(ConfigKey::User),
        deploy_host: split_hosts(&required(ConfigKey::Host)).join(","),
        ssh_port,
        branch,
        releases_dir,
        persistent_dir,
        current_alias,
        keep_releases,
        ssh_identity,
    })
}

/// Absent keys yield `None` so the caller can apply its default.
/// Present-but-empty keys are an error: defaults never replace an explicit empty value.
fn optional_string(source: &dyn ConfigSource, key: ConfigKey) -> Result<Option<String>> {
    match source.get(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(Error::config_invalid_value(
            key.env_name(),
            Some(value),
            "value is set but empty; remove it to use the default",
        )),
        Some(value) => Ok(Some(value.trim().to_string())),
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::config_invalid_value(
            ConfigKey::SshPort.env_name(),
            Some(raw.to_string()),
            "expected a port number between 1 and 65535",
        )),
    }
}

fn parse_keep(raw: &str) -> Result<usize> {
    match raw.parse::<usize>() {
        Ok(keep) if keep >= 1 => Ok(keep),
        _ => Err(Error::config_invalid_value(
            ConfigKey::KeepReleases.env_name(),
            Some(raw.to_string()),
            "expected a whole number of at least 1",
        )),
    }
}

fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_under(base_dir: &str, dir: &str) -> String {
    if dir.starts_with('/') {
        trim_trailing_slash(dir)
    } else {
        join_path(base_dir, dir)
    }
}

fn join_path(base: &str, child: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        child.trim_start_matches('/').trim_end_matches('/')
    )
}

fn trim_trailing_slash(path: &str) -> String {
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}
