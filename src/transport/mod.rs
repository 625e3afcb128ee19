//! Transport boundary: a spawned interactive process reached over a pty.
//!
//! The wire protocol is the external program's problem (`ssh` by default);
//! this layer only moves lines in and output chunks out. The traits exist
//! so the session automaton and the batch orchestrator can be driven by
//! scripted in-memory transports in tests.

mod pty;

pub use pty::{PtyConnector, PtyTransport};

use std::future::Future;

use bytes::Bytes;

use crate::error::TransportError;

/// An open interactive channel to one device.
pub trait Transport: Send {
    /// Send one line, terminated by a newline.
    fn send_line(&mut self, line: &str)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next output chunk. `Ok(None)` means the remote side
    /// ended the session (EOF).
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;

    /// Hand the controlling terminal to the operator until the remote
    /// side closes the session.
    fn interact(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tear the transport down. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Produces a fresh [`Transport`] per device.
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Open a transport to `device`, as `username` when one is given.
    fn connect(
        &self,
        device: &str,
        username: Option<&str>,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
