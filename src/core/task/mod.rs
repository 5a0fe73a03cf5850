//! Task model: where a task runs, and the typed statements it runs.

pub mod catalog;
pub mod registry;
pub mod statement;

use std::collections::HashMap;

use serde::Serialize;

pub use registry::{Macro, RegistryBuilder, TaskRegistry};
pub use statement::Statement;

use crate::error::{Error, Result};
use crate::utils::template;

/// Every rendered script starts with this line so the first failing
/// statement ends the task.
pub const SCRIPT_PRELUDE: &str = "set -e";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The operator's own machine.
    Local,
    /// Every host in the configured host group.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub address: String,
    pub user: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl Host {
    /// `user@address`
    pub fn label(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    pub target: Target,
    pub log_line: String,
    pub statements: Vec<Statement>,
}

impl Task {
    pub fn local(name: impl Into<String>, log_line: impl Into<String>) -> Self {
        Self::new(name, Target::Local, log_line)
    }

    pub fn remote(name: impl Into<String>, log_line: impl Into<String>) -> Self {
        Self::new(name, Target::Remote, log_line)
    }

    fn new(name: impl Into<String>, target: Target, log_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target,
            log_line: log_line.into(),
            statements: Vec::new(),
        }
    }

    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn cd(self, dir: &str) -> Self {
        self.statement(Statement::Cd {
            dir: dir.to_string(),
        })
    }

    pub fn ensure_dir(self, dir: &str) -> Self {
        self.statement(Statement::EnsureDir {
            dir: dir.to_string(),
        })
    }

    pub fn run(self, program: &str, args: &[&str]) -> Self {
        self.statement(Statement::Run {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }

    pub fn write_file(self, path: &str, content: &str) -> Self {
        self.statement(Statement::WriteFile {
            path: path.to_string(),
            content: content.to_string(),
        })
    }

    pub fn append_file(self, path: &str, content: &str) -> Self {
        self.statement(Statement::AppendFile {
            path: path.to_string(),
            content: content.to_string(),
        })
    }

    pub fn remove_all(self, path: &str) -> Self {
        self.statement(Statement::RemoveAll {
            path: path.to_string(),
        })
    }

    pub fn symlink(self, target: &str, link: &str) -> Self {
        self.statement(Statement::Symlink {
            target: target.to_string(),
            link: link.to_string(),
        })
    }

    pub fn swap_symlink(self, target: &str, link: &str) -> Self {
        self.statement(Statement::SwapSymlink {
            target: target.to_string(),
            link: link.to_string(),
        })
    }

    pub fn prune_releases(self, dir: &str) -> Self {
        self.statement(Statement::PruneReleases {
            dir: dir.to_string(),
        })
    }

    /// Render the task into one shell script.
    ///
    /// A task with no statements renders to an empty script and is never
    /// dispatched; its log line alone is the whole task.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        if self.statements.is_empty() {
            return Ok(String::new());
        }

        let mut lines = vec![SCRIPT_PRELUDE.to_string()];
        for statement in &self.statements {
            let line = statement
                .render(vars)
                .map_err(|placeholder| self.unresolved(statement, &placeholder))?;
            lines.push(line);
        }

        Ok(lines.join("\n") + "\n")
    }

    fn unresolved(&self, statement: &Statement, placeholder: &str) -> Error {
        let source = statement
            .templates()
            .into_iter()
            .find(|t| template::placeholders(t).iter().any(|p| p == placeholder))
            .unwrap_or_default()
            .to_string();
        Error::template_unresolved(&self.name, placeholder, source)
    }
}
