//! # netexec
//!
//! Scripted command execution on network devices over a spawned
//! interactive transport (`ssh` by default).
//!
//! netexec detects device shell prompts with regular expressions, sends
//! command lines one at a time, and handles per-device-family entry/exit
//! sequences for configuration versus execution mode. Device behavior is
//! data: a single session automaton is parameterized by an immutable
//! [`DeviceProfile`](profile::DeviceProfile) selected from a registry.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use netexec::batch::{BatchOrchestrator, RunSpec};
//! use netexec::profile::{self, Mode};
//! use netexec::session::{Credentials, SessionOptions};
//! use netexec::transport::PtyConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netexec::Error> {
//!     let spec = RunSpec {
//!         devices: vec!["router1.example.net".to_string()],
//!         profile: profile::registry::lookup("junos")?,
//!         credentials: Credentials::default(),
//!         mode: Mode::Config,
//!         commands: vec!["set system host-name router1".to_string()],
//!         commit: true,
//!         auto_close: false,
//!         options: SessionOptions::default(),
//!         parallelism: 1,
//!     };
//!
//!     let orchestrator = BatchOrchestrator::new(PtyConnector::new("ssh"));
//!     for report in orchestrator.run(spec).await? {
//!         println!("{}: {}", report.device, report.outcome);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod error;
pub mod input;
pub mod profile;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use batch::{BatchOrchestrator, DeviceOutcome, DeviceReport, RunSpec};
pub use error::Error;
pub use profile::{DeviceProfile, Mode};
pub use session::{Credentials, Phase, SessionAutomaton, SessionOptions};
pub use transport::{Connector, PtyConnector, Transport};
