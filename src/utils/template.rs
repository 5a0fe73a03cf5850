//! String template rendering utilities.
//!
//! Placeholders use the `{{name}}` syntax. Rendering is strict: a placeholder
//! with no value is reported back to the caller instead of being left in place.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

pub struct TemplateVars;

impl TemplateVars {
    pub const BASE_DIR: &'static str = "baseDir";
    pub const REPOSITORY: &'static str = "repository";
    pub const DEPLOY_USER: &'static str = "deployUser";
    pub const DEPLOY_HOST: &'static str = "deployHost";
    pub const SSH_PORT: &'static str = "sshPort";
    pub const BRANCH: &'static str = "branch";
    pub const RELEASES_DIR: &'static str = "releasesDir";
    pub const PERSISTENT_DIR: &'static str = "persistentDir";
    pub const CURRENT_ALIAS: &'static str = "currentAlias";
    pub const CURRENT_DIR: &'static str = "currentDir";
    pub const KEEP_RELEASES: &'static str = "keepReleases";
    pub const RELEASE_NAME: &'static str = "releaseName";
    pub const RELEASE_DIR: &'static str = "releaseDir";
    pub const LOCAL_USER: &'static str = "localUser";
    pub const WORKING_DIR: &'static str = "workingDir";
}

// Matches `{{name}}` with optional inner whitespace
static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Render `template`, returning the first unresolved placeholder name on failure.
pub fn render_strict(
    template: &str,
    variables: &HashMap<String, String>,
) -> std::result::Result<String, String> {
    if let Some(missing) = PLACEHOLDER_PATTERN
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .find(|name| !variables.contains_key(name))
    {
        return Err(missing);
    }

    Ok(PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_default()
        })
        .into_owned())
}

/// Names of every placeholder referenced by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_known_placeholders() {
        let rendered = render_strict(
            "{{releasesDir}}/{{releaseName}}",
            &vars(&[("releasesDir", "/srv/app/releases"), ("releaseName", "20240101-120000")]),
        )
        .unwrap();
        assert_eq!(rendered, "/srv/app/releases/20240101-120000");
    }

    #[test]
    fn tolerates_inner_whitespace() {
        let rendered = render_strict("{{ branch }}", &vars(&[("branch", "master")])).unwrap();
        assert_eq!(rendered, "master");
    }

    #[test]
    fn reports_unresolved_placeholder() {
        let err = render_strict("{{baseDir}}/{{nodeVersion}}", &vars(&[("baseDir", "/srv")]))
            .unwrap_err();
        assert_eq!(err, "nodeVersion");
    }

    #[test]
    fn values_are_not_re_expanded() {
        let rendered =
            render_strict("{{a}}", &vars(&[("a", "{{b}}"), ("b", "nope")])).unwrap();
        assert_eq!(rendered, "{{b}}");
    }

    #[test]
    fn lists_placeholders_in_order() {
        assert_eq!(
            placeholders("ln -nfs {{releaseDir}} {{currentDir}}"),
            vec!["releaseDir".to_string(), "currentDir".to_string()]
        );
    }
}
