//! Remote command channel.
//!
//! A [`Connector`] opens one [`Session`] per host per run; every remote task
//! for that host is dispatched over the same session.

mod client;

pub use client::{ControlRegistry, SshConnector, SshSession};

use crate::console::OutputSink;
use crate::error::Result;
use crate::process::CommandOutput;
use crate::task::Host;

pub trait Session: Send + Sync {
    /// Run `script` on the host, streaming its output to `sink`.
    ///
    /// `Ok` carries the script's own exit status, zero or not. `Err` means the
    /// channel itself failed and the script's outcome is unknown.
    fn execute(&self, script: &str, sink: &dyn OutputSink) -> Result<CommandOutput>;

    /// Release the session. Called at most once.
    fn close(&mut self);
}

pub trait Connector: Send + Sync {
    fn open(&self, host: &Host) -> Result<Box<dyn Session>>;
}
