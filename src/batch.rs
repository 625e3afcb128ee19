//! Batch orchestration: one session automaton per device, in list order.
//!
//! A device's failure never aborts the batch: timeouts, disconnects and
//! incompatibilities are recorded per device and the orchestrator moves
//! on. Sequential processing is the default, because interactive handoff
//! gives the controlling terminal to a human. An opt-in concurrent mode
//! drives devices with a bounded worker pool when the run can never go
//! interactive, buffering each device's transcript and emitting it
//! labeled, still in input order.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use futures_util::stream;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, SessionError};
use crate::profile::{CompiledProfile, DeviceProfile, Mode};
use crate::session::{
    Control, Credentials, HandoffReason, Phase, SessionAutomaton, SessionOptions,
};
use crate::transport::{Connector, Transport};

/// Everything one batch run needs, passed explicitly; there is no
/// ambient run state.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Devices to visit, in order.
    pub devices: Vec<String>,

    /// Shared profile for every device in the run.
    pub profile: DeviceProfile,

    pub credentials: Credentials,

    pub mode: Mode,

    /// Lines to send once the target phase is reached; empty means "just
    /// authenticate and go interactive".
    pub commands: Vec<String>,

    /// Config mode: commit and exit instead of handing off.
    pub commit: bool,

    /// Exec mode: run the exit sequence instead of handing off.
    pub auto_close: bool,

    pub options: SessionOptions,

    /// Worker-pool size; 1 = sequential.
    pub parallelism: usize,
}

impl RunSpec {
    /// Whether any device in this run can end up in interactive
    /// passthrough.
    pub fn can_reach_handoff(&self) -> bool {
        match self.mode {
            Mode::Exec => !self.auto_close,
            Mode::Config => !self.commit,
        }
    }
}

/// Terminal outcome for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    Completed,
    TimedOut,
    Disconnected,
    InteractiveHandoff,
    Cancelled,
    /// The profile cannot run the requested mode; no connection was made.
    Incompatible,
    /// Spawn or I/O failure outside the timeout/EOF taxonomy.
    Failed,
}

impl fmt::Display for DeviceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceOutcome::Completed => "completed",
            DeviceOutcome::TimedOut => "timed out",
            DeviceOutcome::Disconnected => "disconnected",
            DeviceOutcome::InteractiveHandoff => "interactive",
            DeviceOutcome::Cancelled => "cancelled",
            DeviceOutcome::Incompatible => "incompatible",
            DeviceOutcome::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One device's result within a batch run.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub device: String,
    pub outcome: DeviceOutcome,
    /// Phase the automaton was in when it finished or failed.
    pub phase: Phase,
    pub detail: Option<String>,
}

/// Relays an operator interrupt to whichever device turn is active.
#[derive(Clone, Default)]
pub struct InterruptHub {
    current: Arc<Mutex<CancellationToken>>,
}

impl InterruptHub {
    /// Install and return a fresh token for the next device turn.
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().expect("interrupt hub poisoned") = token.clone();
        token
    }

    /// Cancel the currently armed token.
    pub fn trigger(&self) {
        self.current.lock().expect("interrupt hub poisoned").cancel();
    }
}

type SinkFactory = Box<dyn Fn(&str) -> Box<dyn Write + Send> + Send + Sync>;

/// Runs a [`RunSpec`] against every device, one automaton per device.
pub struct BatchOrchestrator<C: Connector> {
    connector: C,
    interrupts: InterruptHub,
    sink_factory: SinkFactory,
}

impl<C: Connector> BatchOrchestrator<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            interrupts: InterruptHub::default(),
            sink_factory: Box::new(|_| Box::new(io::stdout())),
        }
    }

    /// Route transcripts somewhere other than stdout (tests, capture).
    pub fn with_transcript_sink<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        self.sink_factory = Box::new(factory);
        self
    }

    /// Handle for wiring an interrupt signal (Ctrl-C) into the run.
    pub fn interrupts(&self) -> InterruptHub {
        self.interrupts.clone()
    }

    /// Visit every device in order and return one report per device.
    pub async fn run(&self, spec: RunSpec) -> Result<Vec<DeviceReport>> {
        if spec.parallelism > 1 && spec.can_reach_handoff() {
            return Err(Error::InvalidRun {
                message: "concurrent mode requires a run that cannot go interactive \
                          (config mode with commit, or exec mode with auto-close)"
                    .to_string(),
            });
        }

        let profile = Arc::new(spec.profile.clone().compile()?);

        let reports = if spec.parallelism > 1 {
            self.run_concurrent(&spec, &profile).await
        } else {
            self.run_sequential(&spec, &profile).await
        };

        for report in &reports {
            match report.outcome {
                DeviceOutcome::Completed | DeviceOutcome::InteractiveHandoff => {
                    info!("{}: {}", report.device, report.outcome);
                }
                _ => warn!(
                    "{}: {} in phase {}{}",
                    report.device,
                    report.outcome,
                    report.phase,
                    report
                        .detail
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default()
                ),
            }
        }
        Ok(reports)
    }

    async fn run_sequential(
        &self,
        spec: &RunSpec,
        profile: &Arc<CompiledProfile>,
    ) -> Vec<DeviceReport> {
        let mut reports = Vec::with_capacity(spec.devices.len());
        for device in &spec.devices {
            let token = self.interrupts.arm();
            let sink = (self.sink_factory)(device);
            reports.push(self.run_one(device, profile, spec, token, sink, true).await);
        }
        reports
    }

    async fn run_concurrent(
        &self,
        spec: &RunSpec,
        profile: &Arc<CompiledProfile>,
    ) -> Vec<DeviceReport> {
        // One token for the whole pool: an interrupt cancels every
        // in-flight device, since none of them can go interactive.
        let token = self.interrupts.arm();

        let mut results = stream::iter(spec.devices.iter())
            .map(|device| {
                let token = token.child_token();
                let profile = Arc::clone(profile);
                async move {
                    let buf = SharedBuf::default();
                    let report = self
                        .run_one(device, &profile, spec, token, Box::new(buf.clone()), false)
                        .await;
                    (report, buf)
                }
            })
            .buffered(spec.parallelism);

        // buffered() yields in input order, so transcripts print in the
        // order devices were listed, each under its own label.
        let mut reports = Vec::with_capacity(spec.devices.len());
        while let Some((report, buf)) = results.next().await {
            let mut sink = (self.sink_factory)(&report.device);
            let transcript = buf.take();
            let _ = writeln!(sink, "==== {} ====", report.device);
            let _ = sink.write_all(&transcript);
            let _ = writeln!(sink, "==== {}: {} ====", report.device, report.outcome);
            let _ = sink.flush();
            reports.push(report);
        }
        reports
    }

    /// Drive one device through connect → paging → mode work, mapping
    /// every exit path to a report. Never propagates an error: the batch
    /// always continues.
    async fn run_one(
        &self,
        device: &str,
        profile: &Arc<CompiledProfile>,
        spec: &RunSpec,
        cancel: CancellationToken,
        transcript: Box<dyn Write + Send>,
        interactive: bool,
    ) -> DeviceReport {
        if let Err(e) = profile.definition().ensure_supports(spec.mode) {
            return DeviceReport {
                device: device.to_string(),
                outcome: DeviceOutcome::Incompatible,
                phase: Phase::Disconnected,
                detail: Some(e.to_string()),
            };
        }

        let transport = match self
            .connector
            .connect(device, spec.credentials.username.as_deref())
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                return DeviceReport {
                    device: device.to_string(),
                    outcome: DeviceOutcome::Failed,
                    phase: Phase::Disconnected,
                    detail: Some(e.to_string()),
                };
            }
        };

        let mut automaton = SessionAutomaton::new(
            device,
            Arc::clone(profile),
            spec.credentials.clone(),
            spec.options.clone(),
            transport,
            transcript,
            cancel,
        );

        let driven = drive(&mut automaton, spec).await;
        // captured before close() resets the automaton to Disconnected
        let phase_at_exit = automaton.phase();
        let (outcome, detail) = match driven {
            Ok(None) => {
                let _ = automaton.close().await;
                (DeviceOutcome::Completed, None)
            }
            Ok(Some(reason)) => {
                if interactive {
                    if reason == HandoffReason::Interrupted {
                        automaton.surface_note("\n==== Interrupt ====");
                    }
                    automaton
                        .surface_note("\n==== Interactive mode ====\nPress enter for a prompt.\n");
                    if let Err(e) = automaton.interact().await {
                        warn!("{device}: interactive session error: {e}");
                    }
                } else {
                    let _ = automaton.close().await;
                }
                match reason {
                    HandoffReason::Requested => (DeviceOutcome::InteractiveHandoff, None),
                    HandoffReason::Interrupted => (DeviceOutcome::Cancelled, None),
                }
            }
            Err(e) => {
                let outcome = classify_error(&e);
                match outcome {
                    DeviceOutcome::TimedOut => {
                        automaton.surface_note("\n==== Timeout: moving on ====\n");
                    }
                    DeviceOutcome::Disconnected => {
                        automaton.surface_note("\n==== EOF: disconnected ====\n");
                    }
                    _ => {}
                }
                let _ = automaton.close().await;
                (outcome, Some(e.to_string()))
            }
        };

        DeviceReport {
            device: device.to_string(),
            outcome,
            phase: phase_at_exit,
            detail,
        }
    }
}

/// Run the scripted sequence; `Ok(Some(reason))` means the automaton is
/// in interactive passthrough.
async fn drive<T: Transport>(
    automaton: &mut SessionAutomaton<T>,
    spec: &RunSpec,
) -> Result<Option<HandoffReason>> {
    if let Control::Handoff(reason) = automaton.connect().await? {
        return Ok(Some(reason));
    }
    if let Control::Handoff(reason) = automaton.disable_paging().await? {
        return Ok(Some(reason));
    }
    let control = match spec.mode {
        Mode::Exec => automaton.run_exec(&spec.commands, spec.auto_close).await?,
        Mode::Config => automaton.run_config(&spec.commands, spec.commit).await?,
    };
    match control {
        Control::Handoff(reason) => Ok(Some(reason)),
        Control::Continue => Ok(None),
    }
}

fn classify_error(error: &Error) -> DeviceOutcome {
    match error {
        Error::Session(SessionError::ConnectTimeout { .. })
        | Error::Session(SessionError::StepTimeout { .. }) => DeviceOutcome::TimedOut,
        Error::Session(SessionError::Disconnected { .. }) => DeviceOutcome::Disconnected,
        Error::Profile(_) => DeviceOutcome::Incompatible,
        _ => DeviceOutcome::Failed,
    }
}

/// Clonable in-memory transcript buffer for concurrent mode.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.lock().expect("transcript buffer poisoned"))
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("transcript buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(mode: Mode, commit: bool, auto_close: bool) -> RunSpec {
        RunSpec {
            devices: vec![],
            profile: crate::profile::vendors::junos::profile(),
            credentials: Credentials::default(),
            mode,
            commands: vec![],
            commit,
            auto_close,
            options: SessionOptions::default(),
            parallelism: 1,
        }
    }

    #[test]
    fn handoff_reachability() {
        assert!(spec(Mode::Exec, false, false).can_reach_handoff());
        assert!(!spec(Mode::Exec, false, true).can_reach_handoff());
        assert!(spec(Mode::Config, false, false).can_reach_handoff());
        assert!(!spec(Mode::Config, true, false).can_reach_handoff());
    }

    #[test]
    fn shared_buf_collects_writes() {
        let buf = SharedBuf::default();
        let mut writer = buf.clone();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(buf.take(), b"hello world");
        assert!(buf.take().is_empty());
    }

    #[test]
    fn interrupt_hub_cancels_armed_token() {
        let hub = InterruptHub::default();
        let first = hub.arm();
        hub.trigger();
        assert!(first.is_cancelled());

        // re-arming installs a fresh, uncancelled token
        let second = hub.arm();
        assert!(!second.is_cancelled());
    }
}
