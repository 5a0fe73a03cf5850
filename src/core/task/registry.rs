use std::collections::HashMap;

use serde::Serialize;

use super::Task;
use crate::error::{Error, Result};

/// A named, ordered list of task references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    pub name: String,
    pub tasks: Vec<String>,
}

/// Mutable during setup only. Every macro is checked against the tasks
/// registered so far, so register tasks before defining macros over them.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    macros: Vec<Macro>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Task) -> Result<()> {
        if task.name.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "task",
                "task name must not be empty",
            ));
        }
        if self.index.contains_key(&task.name) {
            return Err(Error::setup_duplicate_task(&task.name));
        }
        self.index.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    pub fn define_macro(&mut self, name: impl Into<String>, tasks: Vec<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "macro",
                "macro name must not be empty",
            ));
        }
        if self.macros.iter().any(|m| m.name == name) {
            return Err(Error::setup_duplicate_macro(name));
        }
        if tasks.is_empty() {
            return Err(Error::validation_invalid_argument(
                format!("macros.{}", name),
                "macro must list at least one task",
            ));
        }
        if let Some(missing) = tasks.iter().find(|t| !self.index.contains_key(*t)) {
            return Err(Error::setup_unknown_task(name, missing));
        }

        self.macros.push(Macro { name, tasks });
        Ok(())
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            tasks: self.tasks,
            index: self.index,
            macros: self.macros,
        }
    }
}

/// The task catalog for one run. Read-only once built.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    macros: Vec<Macro>,
}

impl TaskRegistry {
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Macros in definition order.
    pub fn macros(&self) -> &[Macro] {
        &self.macros
    }

    pub fn macro_names(&self) -> Vec<String> {
        self.macros.iter().map(|m| m.name.clone()).collect()
    }

    /// The macro's tasks, in order.
    pub fn expand(&self, name: &str) -> Result<Vec<Task>> {
        let found = self
            .macros
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| Error::setup_unknown_macro(name, self.macro_names()))?;

        found
            .tasks
            .iter()
            .map(|task| {
                self.get(task)
                    .cloned()
                    .ok_or_else(|| Error::setup_unknown_task(&found.name, task))
            })
            .collect()
    }
}
