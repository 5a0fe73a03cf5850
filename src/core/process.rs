//! Child-process execution with live output.
//!
//! Both local tasks and SSH dispatch go through [`stream`]: stdout and stderr
//! are read on their own threads, each complete line is forwarded to the
//! operator immediately and also kept for the task's combined output.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

use serde::Serialize;

use crate::console::OutputSink;
use crate::task::Host;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    /// Interleaved stdout and stderr, in arrival order.
    pub output: String,
    pub exit_code: i32,
    pub success: bool,
}

impl CommandOutput {
    pub fn from_exit(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code,
            success: exit_code == 0,
        }
    }
}

/// Run `cmd` to completion, optionally feeding `stdin`, forwarding each line
/// of output to `sink` as it arrives.
///
/// A process killed by a signal reports exit code -1.
pub fn stream(
    mut cmd: Command,
    stdin: Option<&str>,
    origin: Option<&Host>,
    sink: &dyn OutputSink,
) -> io::Result<CommandOutput> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn()?;
    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();
    let collected = Mutex::new(String::new());

    let fed = thread::scope(|scope| {
        let writer = scope.spawn(move || -> io::Result<()> {
            if let (Some(mut pipe), Some(input)) = (child_stdin, stdin) {
                match pipe.write_all(input.as_bytes()) {
                    // Child exited before reading all input; its exit code is reported instead.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                    other => other?,
                }
            }
            Ok(())
        });
        if let Some(out) = child_stdout {
            let collected = &collected;
            scope.spawn(move || forward(out, origin, sink, collected));
        }
        if let Some(err) = child_stderr {
            let collected = &collected;
            scope.spawn(move || forward(err, origin, sink, collected));
        }
        writer.join().unwrap_or(Ok(()))
    });

    let status = child.wait()?;
    fed?;

    let output = collected.into_inner().unwrap_or_else(|e| e.into_inner());
    Ok(CommandOutput::from_exit(status.code().unwrap_or(-1), output))
}

fn forward<R: Read>(reader: R, origin: Option<&Host>, sink: &dyn OutputSink, collected: &Mutex<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(&['\n', '\r'][..]);
                sink.output(origin, line);
                if let Ok(mut all) = collected.lock() {
                    all.push_str(line);
                    all.push('\n');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::task::Task;

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl OutputSink for Lines {
        fn task_started(&self, _task: &Task) {}
        fn output(&self, _origin: Option<&Host>, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
        fn script(&self, _task: &Task, _host: Option<&Host>, _script: &str) {}
        fn failure(&self, _error: &Error) {}
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn streams_each_line_and_collects_output() {
        let sink = Lines::default();
        let out = stream(sh("echo one; echo two"), None, None, &sink).unwrap();
        assert!(out.success);
        assert_eq!(out.output, "one\ntwo\n");
        assert_eq!(*sink.0.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn captures_stderr_and_exit_code() {
        let sink = Lines::default();
        let out = stream(sh("echo oops >&2; exit 3"), None, None, &sink).unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.output, "oops\n");
    }

    #[test]
    fn feeds_stdin_to_the_child() {
        let sink = Lines::default();
        let mut cmd = Command::new("sh");
        cmd.arg("-s");
        let out = stream(cmd, Some("set -e\necho fed\nfalse\necho never\n"), None, &sink).unwrap();
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.output, "fed\n");
    }
}
