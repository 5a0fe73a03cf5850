//! Text parsing primitives for configuration input.

/// Parse `KEY=VALUE` lines as found in `.env` files.
///
/// Blank lines and `#` comments are skipped, a leading `export ` is dropped,
/// and one pair of matching single or double quotes around the value is removed.
/// Lines without `=` are ignored. Later duplicates win.
pub fn parse_env_lines(content: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = unquote(value.trim());
        pairs.retain(|(existing, _)| existing != key);
        pairs.push((key.to_string(), value));
    }

    pairs
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }

    // Unquoted values may carry a trailing comment
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_pairs() {
        let pairs = parse_env_lines("DEPLOY_HOST=example.com\nDEPLOY_USER=deploy\n");
        assert_eq!(
            pairs,
            vec![
                ("DEPLOY_HOST".to_string(), "example.com".to_string()),
                ("DEPLOY_USER".to_string(), "deploy".to_string()),
            ]
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let pairs = parse_env_lines("# deploy\n\nAPP_ENV=production\n   # indented\n");
        assert_eq!(pairs, vec![("APP_ENV".to_string(), "production".to_string())]);
    }

    #[test]
    fn strips_export_and_quotes() {
        let pairs = parse_env_lines("export DEPLOY_DIR_BASE=\"/srv/my app\"\nDEPLOY_BRANCH='main'");
        assert_eq!(pairs[0], ("DEPLOY_DIR_BASE".to_string(), "/srv/my app".to_string()));
        assert_eq!(pairs[1], ("DEPLOY_BRANCH".to_string(), "main".to_string()));
    }

    #[test]
    fn keeps_empty_values() {
        let pairs = parse_env_lines("DEPLOY_BRANCH=");
        assert_eq!(pairs, vec![("DEPLOY_BRANCH".to_string(), String::new())]);
    }

    #[test]
    fn drops_trailing_comment_on_unquoted_value() {
        let pairs = parse_env_lines("DEPLOY_SSH_PORT=2222 # bastion");
        assert_eq!(pairs[0].1, "2222");
    }

    #[test]
    fn later_duplicates_win() {
        let pairs = parse_env_lines("DEPLOY_HOST=a\nDEPLOY_HOST=b");
        assert_eq!(pairs, vec![("DEPLOY_HOST".to_string(), "b".to_string())]);
    }
}
