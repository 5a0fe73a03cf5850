use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::{Connector, Session};
use crate::console::OutputSink;
use crate::error::{Error, Result};
use crate::process::{self, CommandOutput};
use crate::task::Host;

/// Remote shell that reads the rendered script from stdin.
const REMOTE_SHELL: &str = "bash -se";

/// ssh exits 255 when the connection fails, but so can the remote script.
const SSH_CONNECTION_EXIT: i32 = 255;

/// A master that outlives the process is torn down by ssh after this long.
const CONTROL_PERSIST: &str = "ControlPersist=10m";

#[derive(Debug, Clone)]
struct ControlSocket {
    program: String,
    path: PathBuf,
    destination: String,
    port: u16,
}

/// Every control socket opened during a run, so an interrupt can close them all.
#[derive(Debug, Clone, Default)]
pub struct ControlRegistry {
    sockets: Arc<Mutex<Vec<ControlSocket>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, socket: ControlSocket) {
        if let Ok(mut sockets) = self.sockets.lock() {
            sockets.push(socket);
        }
    }

    fn release(&self, path: &Path) {
        let socket = match self.sockets.lock() {
            Ok(mut sockets) => sockets
                .iter()
                .position(|s| s.path == path)
                .map(|i| sockets.remove(i)),
            Err(_) => None,
        };
        if let Some(socket) = socket {
            stop_master(&socket);
        }
    }

    /// Close every open master connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let sockets: Vec<ControlSocket> = match self.sockets.lock() {
            Ok(mut sockets) => sockets.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for socket in &sockets {
            stop_master(socket);
        }
        sockets.len()
    }
}

fn stop_master(socket: &ControlSocket) {
    log_status!("ssh", "Closing connection to {}", socket.destination);
    let _ = control_command(&socket.program, "exit", &socket.path, socket.port, &socket.destination)
        .status();
    let _ = std::fs::remove_file(&socket.path);
}

/// `ssh -O <op>` against the master behind `path`, with all stdio closed.
fn control_command(program: &str, op: &str, path: &Path, port: u16, destination: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.args([
        "-O".to_string(),
        op.to_string(),
        "-o".to_string(),
        format!("ControlPath={}", path.display()),
        "-p".to_string(),
        port.to_string(),
        destination.to_string(),
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null());
    cmd
}

/// Opens OpenSSH ControlMaster connections: one authenticated master per
/// host, with each task dispatched as a multiplexed session over it.
pub struct SshConnector {
    program: String,
    registry: ControlRegistry,
    socket_prefix: String,
    counter: AtomicUsize,
}

impl SshConnector {
    pub fn new(run_id: Uuid, registry: ControlRegistry) -> Self {
        let id = run_id.simple().to_string();
        Self {
            program: "ssh".to_string(),
            registry,
            socket_prefix: format!("rollout-{}", &id[..8]),
            counter: AtomicUsize::new(0),
        }
    }

    /// Use another ssh-compatible client binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn control_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("{}-{}.sock", self.socket_prefix, n))
    }
}

impl Connector for SshConnector {
    fn open(&self, host: &Host) -> Result<Box<dyn Session>> {
        let identity_file = resolve_identity(host)?;
        let control_path = self.control_path();

        log_status!("ssh", "Connecting to {}:{}", host.label(), host.port);

        let mut args = vec![
            "-o".to_string(),
            "ControlMaster=yes".to_string(),
            "-o".to_string(),
            CONTROL_PERSIST.to_string(),
        ];
        args.extend(build_ssh_args(host, identity_file.as_deref(), &control_path));
        args.push("true".to_string());

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::ssh_connect_failed(&host.address, &host.user, host.port, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let _ = std::fs::remove_file(&control_path);
            return Err(Error::ssh_connect_failed(
                &host.address,
                &host.user,
                host.port,
                stderr,
            ));
        }

        self.registry.track(ControlSocket {
            program: self.program.clone(),
            path: control_path.clone(),
            destination: host.label(),
            port: host.port,
        });

        Ok(Box::new(SshSession {
            program: self.program.clone(),
            host: host.clone(),
            identity_file,
            control_path,
            registry: self.registry.clone(),
            closed: false,
        }))
    }
}

pub struct SshSession {
    program: String,
    host: Host,
    identity_file: Option<String>,
    control_path: PathBuf,
    registry: ControlRegistry,
    closed: bool,
}

impl SshSession {
    /// True while the control master still answers `-O check`.
    fn master_alive(&self) -> bool {
        control_command(
            &self.program,
            "check",
            &self.control_path,
            self.host.port,
            &self.host.label(),
        )
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
    }
}

impl Session for SshSession {
    fn execute(&self, script: &str, sink: &dyn OutputSink) -> Result<CommandOutput> {
        let mut args = build_ssh_args(&self.host, self.identity_file.as_deref(), &self.control_path);
        args.push(REMOTE_SHELL.to_string());

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);

        let host = &self.host;
        let output = process::stream(cmd, Some(script), Some(host), sink).map_err(|e| {
            Error::ssh_connect_failed(&host.address, &host.user, host.port, e.to_string())
        })?;

        // A live master means the script itself exited 255.
        if output.exit_code == SSH_CONNECTION_EXIT && !self.master_alive() {
            return Err(Error::ssh_connect_failed(
                &host.address,
                &host.user,
                host.port,
                output.output.trim().to_string(),
            ));
        }

        Ok(output)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.registry.release(&self.control_path);
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Options shared by the master and every multiplexed session.
///
/// Agent forwarding is on so the remote `git clone` can use the operator's keys.
fn build_ssh_args(host: &Host, identity_file: Option<&str>, control_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-A".to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
    ];

    if let Some(identity_file) = identity_file {
        args.push("-i".to_string());
        args.push(identity_file.to_string());
    }

    args.extend([
        "-p".to_string(),
        host.port.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ConnectTimeout=10".to_string(),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-o".to_string(),
        "ServerAliveCountMax=3".to_string(),
        "-l".to_string(),
        host.user.clone(),
        host.address.clone(),
    ]);

    args
}

fn resolve_identity(host: &Host) -> Result<Option<String>> {
    match &host.identity_file {
        Some(path) if !path.is_empty() => {
            let expanded = shellexpand::tilde(path).to_string();
            if !Path::new(&expanded).exists() {
                return Err(Error::ssh_identity_file_not_found(&host.address, expanded));
            }
            Ok(Some(expanded))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::QuietSink;

    fn host(identity_file: Option<&str>) -> Host {
        Host {
            address: "web1".to_string(),
            user: "deploy".to_string(),
            port: 2222,
            identity_file: identity_file.map(str::to_string),
        }
    }

    #[test]
    fn args_forward_agent_and_target_host() {
        let args = build_ssh_args(&host(None), None, Path::new("/tmp/rollout-x-0.sock"));
        assert_eq!(args[0], "-A");
        assert!(args.contains(&"ControlPath=/tmp/rollout-x-0.sock".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));
        assert!(args.windows(2).any(|w| w[0] == "-l" && w[1] == "deploy"));
        assert_eq!(args.last().map(String::as_str), Some("web1"));
    }

    #[test]
    fn missing_identity_file_is_reported() {
        let err = resolve_identity(&host(Some("/nonexistent/rollout/id_ed25519"))).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn existing_identity_file_is_passed_through() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        assert_eq!(resolve_identity(&host(Some(&path))).unwrap(), Some(path));
    }

    #[test]
    fn control_paths_are_unique_per_open() {
        let connector = SshConnector::new(Uuid::new_v4(), ControlRegistry::new());
        assert_ne!(connector.control_path(), connector.control_path());
    }

    /// An ssh stand-in: `-O check` exits `check_exit`, the master command
    /// `true` succeeds and `bash -se` runs the script locally.
    #[cfg(unix)]
    fn fake_ssh(dir: &Path, check_exit: i32) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ssh");
        let script = format!(
            "#!/bin/sh\n\
             for last; do :; done\n\
             case \"$*\" in\n\
             *\"-O check\"*) exit {check_exit} ;;\n\
             *\"-O exit\"*) exit 0 ;;\n\
             esac\n\
             case \"$last\" in\n\
             true) exit 0 ;;\n\
             \"bash -se\") exec sh -s ;;\n\
             esac\n\
             exit 255\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn script_exit_255_on_live_master_is_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SshConnector::new(Uuid::new_v4(), ControlRegistry::new())
            .with_program(fake_ssh(dir.path(), 0));

        let session = connector.open(&host(None)).unwrap();
        let out = session
            .execute("set -e\necho 'PHP Fatal error'\nexit 255\n", &QuietSink)
            .unwrap();
        assert_eq!(out.exit_code, 255);
        assert!(!out.success);
        assert!(out.output.contains("PHP Fatal error"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_255_with_master_gone_is_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SshConnector::new(Uuid::new_v4(), ControlRegistry::new())
            .with_program(fake_ssh(dir.path(), 255));

        let session = connector.open(&host(None)).unwrap();
        let err = session.execute("exit 255\n", &QuietSink).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::SshConnectFailed);
    }

    #[test]
    fn master_persistence_is_bounded() {
        assert_eq!(CONTROL_PERSIST, "ControlPersist=10m");
    }

    #[test]
    fn close_all_on_empty_registry_is_noop() {
        let registry = ControlRegistry::new();
        assert_eq!(registry.close_all(), 0);
    }
}
