//! Release naming and retention.
//!
//! Release directories are named with a sortable local timestamp, so lexical
//! order of names is chronological order. Retention relies on that coupling and
//! never looks at filesystem modification times.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;

use crate::config::DeploymentConfig;

/// `YYYYMMDD-HHMMSS`
pub const RELEASE_NAME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Marker written into each release, relative to the release directory.
pub const RELEASE_MARKER: &str = "public/release-name.txt";

/// The release prepared by one pipeline run. Computed once per run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub name: String,
    pub dir: String,
}

impl Release {
    pub fn at<Tz: TimeZone>(config: &DeploymentConfig, when: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let name = when.format(RELEASE_NAME_FORMAT).to_string();
        let dir = format!("{}/{}", config.releases_dir, name);
        Self { name, dir }
    }

    pub fn now(config: &DeploymentConfig) -> Self {
        Self::at(config, &Local::now())
    }
}

/// True when `name` has the shape of a release directory name.
pub fn is_release_name(name: &str) -> bool {
    NaiveDateTime::parse_from_str(name, RELEASE_NAME_FORMAT).is_ok()
}

/// Release names that cleanup removes: everything but the `keep` most recent.
///
/// Entries that are not release names are ignored and never returned.
/// The result is ordered oldest first.
pub fn stale_releases(names: &[String], keep: usize) -> Vec<String> {
    let mut releases: Vec<&String> = names.iter().filter(|n| is_release_name(n)).collect();
    releases.sort();
    releases.dedup();

    let cut = releases.len().saturating_sub(keep);
    releases[..cut].iter().map(|n| n.to_string()).collect()
}
