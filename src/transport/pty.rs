//! Spawned-process transport on a pseudo-terminal.
//!
//! The transport command (default `ssh`) runs as a session leader with the
//! pty slave as its controlling terminal, so programs that insist on a tty
//! for password prompts behave as they would under an interactive shell.
//! The master fd is dup'd into separate read and write handles wrapped as
//! tokio files.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::process::Stdio;

use bytes::Bytes;
use log::{debug, warn};
use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::termios::{self, SetArg};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use super::{Connector, Transport};
use crate::error::TransportError;

/// Spawns the external transport command for each device.
#[derive(Debug, Clone)]
pub struct PtyConnector {
    command: String,
    rows: u16,
    cols: u16,
}

impl PtyConnector {
    /// Create a connector running `command` (e.g. `"ssh"`), split on
    /// whitespace; the connection target is appended as the last argument.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            rows: 24,
            // wide terminal so long command echoes do not wrap into the
            // prompt search window
            cols: 511,
        }
    }

    pub fn with_terminal_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }
}

impl Connector for PtyConnector {
    type Transport = PtyTransport;

    async fn connect(
        &self,
        device: &str,
        username: Option<&str>,
    ) -> Result<PtyTransport, TransportError> {
        let target = match username {
            Some(user) => format!("{user}@{device}"),
            None => device.to_string(),
        };
        PtyTransport::spawn(&self.command, &target, self.rows, self.cols)
    }
}

/// A spawned interactive process on a pty.
pub struct PtyTransport {
    child: Child,
    reader: tokio::fs::File,
    writer: tokio::fs::File,
    closed: bool,
}

impl PtyTransport {
    /// Spawn `command` (split on whitespace) with `target` appended, on a
    /// fresh pty of the given size.
    pub fn spawn(
        command: &str,
        target: &str,
        rows: u16,
        cols: u16,
    ) -> Result<Self, TransportError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| TransportError::SpawnFailed {
            command: command.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty transport command"),
        })?;

        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let OpenptyResult { master, slave } = openpty(&winsize, None)
            .map_err(|e| TransportError::Pty(io::Error::from_raw_os_error(e as i32)))?;

        let slave_fd = slave.as_raw_fd();
        let mut cmd = Command::new(program);
        cmd.args(parts)
            .arg(target)
            .env("TERM", "xterm")
            .kill_on_drop(true)
            // stdio is wired to the pty slave in pre_exec
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // SAFETY: only async-signal-safe syscalls between fork and exec.
        unsafe {
            cmd.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(slave_fd, libc::TIOCSCTTY, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                libc::dup2(slave_fd, 0);
                libc::dup2(slave_fd, 1);
                libc::dup2(slave_fd, 2);
                if slave_fd > 2 {
                    libc::close(slave_fd);
                }
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|source| TransportError::SpawnFailed {
            command: format!("{command} {target}"),
            source,
        })?;
        drop(slave);

        // The dup'd handles keep the pty open; the original master fd can
        // be dropped once both exist.
        let reader = dup_as_file(master.as_raw_fd())?;
        let writer = dup_as_file(master.as_raw_fd())?;
        drop(master);

        debug!("spawned '{command} {target}' on a {cols}x{rows} pty");

        Ok(Self {
            child,
            reader,
            writer,
            closed: false,
        })
    }
}

/// Dup a raw fd and wrap it as an async file handle.
fn dup_as_file(fd: RawFd) -> Result<tokio::fs::File, TransportError> {
    let duped = unsafe { libc::dup(fd) };
    if duped < 0 {
        return Err(TransportError::Pty(io::Error::last_os_error()));
    }
    // SAFETY: duped is a freshly dup'd fd we own
    Ok(tokio::fs::File::from_std(unsafe {
        std::fs::File::from_raw_fd(duped)
    }))
}

impl Transport for PtyTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut buf = [0u8; 4096];
        match self.reader.read(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(Bytes::copy_from_slice(&buf[..n]))),
            // Linux reports EIO on the master once the child side is gone
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn interact(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        // Put the local terminal into raw mode so keystrokes (including
        // control characters) pass straight through to the device. When
        // stdin is not a tty, pump without changing modes.
        let _raw = RawModeGuard::enable();

        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut device_buf = [0u8; 4096];
        let mut operator_buf = [0u8; 1024];

        loop {
            tokio::select! {
                read = self.reader.read(&mut device_buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => {
                            stdout.write_all(&device_buf[..n]).await?;
                            stdout.flush().await?;
                        }
                        Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                        Err(e) => return Err(e.into()),
                    }
                }
                read = stdin.read(&mut operator_buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => {
                            self.writer.write_all(&operator_buf[..n]).await?;
                            self.writer.flush().await?;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The child usually exited on its own after the exit commands;
        // kill covers sessions torn down mid-sequence.
        let _ = self.child.start_kill();
        if let Err(e) = self.child.wait().await {
            warn!("failed to reap transport child: {e}");
        }
        Ok(())
    }
}

/// Restores the operator terminal's attributes when dropped.
struct RawModeGuard {
    saved: Option<termios::Termios>,
}

impl RawModeGuard {
    fn enable() -> Self {
        let stdin = std::io::stdin();
        let saved = match termios::tcgetattr(&stdin) {
            Ok(saved) => {
                let mut raw = saved.clone();
                termios::cfmakeraw(&mut raw);
                if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw) {
                    warn!("failed to set raw terminal mode: {e}");
                    return Self { saved: None };
                }
                Some(saved)
            }
            // stdin is not a tty
            Err(_) => None,
        };
        Self { saved }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            let stdin = std::io::stdin();
            if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &saved) {
                warn!("failed to restore terminal mode: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn spawn_failure_for_unknown_program() {
        let err = PtyTransport::spawn("definitely-not-a-real-program", "host", 24, 80)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, TransportError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let mut transport = PtyTransport::spawn("cat", "-", 24, 80).unwrap();
        transport.send_line("hello pty").await.unwrap();

        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !seen
            .windows(b"hello pty".len())
            .any(|w| w == b"hello pty")
        {
            let chunk = tokio::time::timeout_at(deadline, transport.recv())
                .await
                .expect("timed out waiting for echo")
                .unwrap()
                .expect("unexpected EOF");
            seen.extend_from_slice(&chunk);
        }

        transport.close().await.unwrap();
        // close is idempotent
        transport.close().await.unwrap();
    }
}
