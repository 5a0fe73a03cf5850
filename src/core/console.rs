//! Operator-facing output.
//!
//! Log lines and streamed command output go to stdout as they happen. The
//! JSON envelope printed at the end of a command is separate and comes last.

use std::io::{self, IsTerminal, Write};

use crate::error::Error;
use crate::task::{Host, Task};
use crate::utils::shell::{green, red};

pub trait OutputSink: Send + Sync {
    /// A task is about to run (or be skipped in a dry run).
    fn task_started(&self, task: &Task);

    /// One line of command output. `origin` is `None` for local commands.
    fn output(&self, origin: Option<&Host>, line: &str);

    /// The script a dry run would have dispatched.
    fn script(&self, task: &Task, host: Option<&Host>, script: &str);

    /// The failure marker, printed once after the failing task's output.
    fn failure(&self, error: &Error);
}

#[derive(Debug, Clone)]
pub struct StdoutSink {
    color: bool,
    prefix_hosts: bool,
}

impl StdoutSink {
    /// Host prefixes are only added when output from several hosts can interleave.
    pub fn new(host_count: usize) -> Self {
        Self {
            color: io::stdout().is_terminal(),
            prefix_hosts: host_count > 1,
        }
    }

    fn write_line(&self, line: &str) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        // A closed stdout must not abort a deployment mid-flight.
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }

    fn prefixed(&self, origin: Option<&Host>, line: &str) -> String {
        match origin {
            Some(host) if self.prefix_hosts => format!("[{}] {}", host.label(), line),
            _ => line.to_string(),
        }
    }
}

impl OutputSink for StdoutSink {
    fn task_started(&self, task: &Task) {
        if self.color {
            self.write_line(&green(&task.log_line));
        } else {
            self.write_line(&task.log_line);
        }
    }

    fn output(&self, origin: Option<&Host>, line: &str) {
        self.write_line(&self.prefixed(origin, line));
    }

    fn script(&self, task: &Task, host: Option<&Host>, script: &str) {
        let target = host.map(Host::label).unwrap_or_else(|| "local".to_string());
        self.write_line(&format!("# {} on {}", task.name, target));
        for line in script.lines() {
            self.write_line(line);
        }
    }

    fn failure(&self, error: &Error) {
        let marker = format!("✗ {}", error.message);
        if self.color {
            self.write_line(&red(&marker));
        } else {
            self.write_line(&marker);
        }
    }
}

/// Discards everything; for callers that only want captured output.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietSink;

impl OutputSink for QuietSink {
    fn task_started(&self, _task: &Task) {}
    fn output(&self, _origin: Option<&Host>, _line: &str) {}
    fn script(&self, _task: &Task, _host: Option<&Host>, _script: &str) {}
    fn failure(&self, _error: &Error) {}
}
