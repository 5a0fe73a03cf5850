//! Typed shell statements.
//!
//! A task's command is a list of discrete operations rather than free-form
//! shell text. Every templated argument is rendered on its own and quoted as a
//! single shell word, so configuration values can never inject shell syntax.
//! Program names come from the task catalog and are emitted verbatim.

use std::collections::HashMap;

use serde::Serialize;

use crate::utils::shell::quote_arg;
use crate::utils::template::{self, TemplateVars};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    /// `cd DIR`
    Cd { dir: String },
    /// `[ -d DIR ] || mkdir -p DIR`
    EnsureDir { dir: String },
    /// `PROGRAM ARG...`
    Run { program: String, args: Vec<String> },
    /// Overwrite `path` with one line of `content`.
    WriteFile { path: String, content: String },
    /// Append one line of `content` to `path`.
    AppendFile { path: String, content: String },
    /// `rm -rf PATH`
    RemoveAll { path: String },
    /// `ln -nfs TARGET LINK`
    Symlink { target: String, link: String },
    /// Repoint `link` at `target` by renaming a fresh symlink over it, so the
    /// old target stays live until the rename succeeds.
    SwapSymlink { target: String, link: String },
    /// Delete all but the `keepReleases` most recent release directories in `dir`.
    PruneReleases { dir: String },
}

/// Shell pattern matching `YYYYMMDD-HHMMSS` directory names.
const RELEASE_NAME_PATTERN: &str = "^[0-9]{8}-[0-9]{6}$";

impl Statement {
    /// Render to one shell line. `Err` carries the first unresolved placeholder.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String, String> {
        let word = |raw: &str| template::render_strict(raw, vars).map(|s| quote_arg(&s));

        let line = match self {
            Statement::Cd { dir } => format!("cd {}", word(dir)?),
            Statement::EnsureDir { dir } => {
                let dir = word(dir)?;
                format!("[ -d {dir} ] || mkdir -p {dir}")
            }
            Statement::Run { program, args } => {
                let mut parts = vec![program.clone()];
                for arg in args {
                    parts.push(word(arg)?);
                }
                parts.join(" ")
            }
            Statement::WriteFile { path, content } => {
                format!("printf '%s\\n' {} > {}", word(content)?, word(path)?)
            }
            Statement::AppendFile { path, content } => {
                format!("printf '%s\\n' {} >> {}", word(content)?, word(path)?)
            }
            Statement::RemoveAll { path } => format!("rm -rf {}", word(path)?),
            Statement::Symlink { target, link } => {
                format!("ln -nfs {} {}", word(target)?, word(link)?)
            }
            Statement::SwapSymlink { target, link } => {
                let staged = word(&format!("{}.next", link))?;
                format!(
                    "ln -nfs {} {staged} && mv -Tf {staged} {}",
                    word(target)?,
                    word(link)?
                )
            }
            Statement::PruneReleases { dir } => {
                let keep = vars
                    .get(TemplateVars::KEEP_RELEASES)
                    .ok_or_else(|| TemplateVars::KEEP_RELEASES.to_string())?;
                let keep: usize = keep
                    .parse()
                    .map_err(|_| TemplateVars::KEEP_RELEASES.to_string())?;
                let dir = word(dir)?;
                // Names sort chronologically, so newest-first is a reverse lexical sort
                format!(
                    "ls -1 {dir} | grep -E '{RELEASE_NAME_PATTERN}' | sort -r | tail -n +{} | while IFS= read -r name; do rm -rf {dir}/\"$name\"; done",
                    keep + 1
                )
            }
        };

        Ok(line)
    }

    /// The raw, unrendered text of every templated field.
    pub fn templates(&self) -> Vec<&str> {
        match self {
            Statement::Cd { dir } | Statement::EnsureDir { dir } => vec![dir.as_str()],
            Statement::Run { args, .. } => args.iter().map(String::as_str).collect(),
            Statement::WriteFile { path, content } | Statement::AppendFile { path, content } => {
                vec![path.as_str(), content.as_str()]
            }
            Statement::RemoveAll { path } => vec![path.as_str()],
            Statement::Symlink { target, link } | Statement::SwapSymlink { target, link } => {
                vec![target.as_str(), link.as_str()]
            }
            Statement::PruneReleases { dir } => vec![dir.as_str()],
        }
    }
}
