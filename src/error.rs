//! Error types for netexec.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::session::Phase;

/// Main error type for netexec operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (spawning, pty I/O)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session automaton errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Device profile errors
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Input file errors
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Invalid batch run configuration
    #[error("Invalid run configuration: {message}")]
    InvalidRun { message: String },
}

/// Transport layer errors (process spawning, pty operations).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to spawn the transport command
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// PTY allocation or setup failed
    #[error("PTY setup failed: {0}")]
    Pty(io::Error),

    /// Transport was already closed
    #[error("Transport closed")]
    Closed,

    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session automaton errors (prompt waits, authentication).
///
/// Every variant is attributable to one device and one phase; the batch
/// orchestrator recovers from all of them by advancing to the next device.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No recognized prompt appeared while establishing the session
    #[error("No recognized prompt within {timeout:?} while connecting")]
    ConnectTimeout { timeout: Duration },

    /// No expected prompt appeared after sending a line
    #[error("No expected prompt within {timeout:?} (phase {phase})")]
    StepTimeout { phase: Phase, timeout: Duration },

    /// The transport ended before an expected prompt
    #[error("Transport disconnected before an expected prompt (phase {phase})")]
    Disconnected { phase: Phase },

    /// The device re-prompted for a credential that was already sent
    #[error("Authentication failed for {device}")]
    AuthenticationFailed { device: String },

    /// An operation was attempted before connect() or after close()
    #[error("Session not connected")]
    NotConnected,

    /// connect() was called twice
    #[error("Session already connected")]
    AlreadyConnected,
}

/// Device profile errors (validation, catalog lookup).
#[derive(Error, Debug)]
pub enum ProfileError {
    /// A prompt or auth regex failed to compile
    #[error("Invalid pattern for '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// Two phases share an identical prompt regex
    #[error("Phases '{first}' and '{second}' share an identical prompt pattern")]
    DuplicatePrompt { first: String, second: String },

    /// The prompt set is empty
    #[error("Profile '{name}' defines no prompts")]
    NoPrompts { name: String },

    /// The selected mode requires a profile field that is absent
    #[error("Profile '{name}' cannot run in {mode} mode: missing {missing}")]
    Incompatible {
        name: String,
        mode: String,
        missing: String,
    },

    /// No profile registered under the requested key
    #[error("Unknown device type '{name}'")]
    UnknownType { name: String },

    /// A profile with this key already exists in the catalog
    #[error("Device type '{name}' is already registered")]
    AlreadyRegistered { name: String },
}

/// Input file errors.
#[derive(Error, Debug)]
pub enum InputError {
    /// A required device-list or command file does not exist
    #[error("Input file not found: {path}")]
    MissingFile { path: PathBuf },

    /// Failed to read an input file
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using netexec's Error.
pub type Result<T> = std::result::Result<T, Error>;
