/// Every configuration key the resolver reads.
///
/// Each key has an environment name (`DEPLOY_*`) and a config-store name used
/// under the `deploy` object of a JSON config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    BaseDir,
    Repository,
    User,
    Host,
    ReleasesDir,
    PersistentDir,
    Current,
    SshPort,
    Branch,
    KeepReleases,
    SshIdentity,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 11] = [
        ConfigKey::BaseDir,
        ConfigKey::Repository,
        ConfigKey::User,
        ConfigKey::Host,
        ConfigKey::ReleasesDir,
        ConfigKey::PersistentDir,
        ConfigKey::Current,
        ConfigKey::SshPort,
        ConfigKey::Branch,
        ConfigKey::KeepReleases,
        ConfigKey::SshIdentity,
    ];

    /// Keys with no default; absent or empty values are reported together.
    pub const REQUIRED: [ConfigKey; 4] = [
        ConfigKey::BaseDir,
        ConfigKey::Repository,
        ConfigKey::User,
        ConfigKey::Host,
    ];

    pub fn env_name(&self) -> &'static str {
        match self {
            ConfigKey::BaseDir => "DEPLOY_DIR_BASE",
            ConfigKey::Repository => "DEPLOY_REPOSITORY",
            ConfigKey::User => "DEPLOY_USER",
            ConfigKey::Host => "DEPLOY_HOST",
            ConfigKey::ReleasesDir => "DEPLOY_DIR_RELEASES",
            ConfigKey::PersistentDir => "DEPLOY_DIR_PERSISTENT",
            ConfigKey::Current => "DEPLOY_CURRENT",
            ConfigKey::SshPort => "DEPLOY_SSH_PORT",
            ConfigKey::Branch => "DEPLOY_BRANCH",
            ConfigKey::KeepReleases => "DEPLOY_KEEP_RELEASES",
            ConfigKey::SshIdentity => "DEPLOY_SSH_IDENTITY",
        }
    }

    pub fn store_name(&self) -> &'static str {
        match self {
            ConfigKey::BaseDir => "dir_base",
            ConfigKey::Repository => "repository",
            ConfigKey::User => "user",
            ConfigKey::Host => "host",
            ConfigKey::ReleasesDir => "dir_releases",
            ConfigKey::PersistentDir => "dir_persistent",
            ConfigKey::Current => "current",
            ConfigKey::SshPort => "ssh_port",
            ConfigKey::Branch => "branch",
            ConfigKey::KeepReleases => "keep_releases",
            ConfigKey::SshIdentity => "ssh_identity",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_names_are_unique() {
        let mut names: Vec<&str> = ConfigKey::ALL.iter().map(|k| k.env_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ConfigKey::ALL.len());
    }

    #[test]
    fn required_keys_are_the_four_without_defaults() {
        let required: Vec<&str> = ConfigKey::ALL
            .iter()
            .filter(|k| k.is_required())
            .map(|k| k.env_name())
            .collect();
        assert_eq!(
            required,
            vec!["DEPLOY_DIR_BASE", "DEPLOY_REPOSITORY", "DEPLOY_USER", "DEPLOY_HOST"]
        );
    }
}
