//! The session automaton: one scripted interaction with one device.
//!
//! The automaton owns a [`Transport`] and drives it phase by phase:
//! connect, authenticate, reach a baseline prompt, disable paging, then
//! run exec- or config-mode work and finish by committing/exiting or by
//! handing the live session to the operator.
//!
//! Every blocking wait is a bounded suspension point returning a tagged
//! [`WaitOutcome`] (matched, timed out, EOF, or cancelled) instead of
//! unwinding. Waits use the narrowest prompt that applies: the `config`
//! prompt while inside configuration mode, the full prompt set during
//! connect, paging, exec and closing steps. A device that silently falls
//! back to the exec prompt mid-configuration therefore times out instead
//! of being treated as a successful step.

mod buffer;

pub use buffer::OutputBuffer;

use std::fmt;
use std::io::Write;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::profile::CompiledProfile;
use crate::transport::Transport;

/// Lifecycle phase of a session automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    PagingDisabled,
    Exec,
    ConfigEntering,
    ConfigActive,
    Committing,
    Exiting,
    InteractivePassthrough,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Disconnected => "disconnected",
            Phase::Connecting => "connecting",
            Phase::Authenticating => "authenticating",
            Phase::Connected => "connected",
            Phase::PagingDisabled => "paging-disabled",
            Phase::Exec => "exec",
            Phase::ConfigEntering => "config-entering",
            Phase::ConfigActive => "config-active",
            Phase::Committing => "committing",
            Phase::Exiting => "exiting",
            Phase::InteractivePassthrough => "interactive",
        };
        write!(f, "{name}")
    }
}

/// Result of one prompt wait.
#[derive(Debug)]
pub enum WaitOutcome {
    /// A prompt matched; `phase` names the classified prompt phase.
    Matched {
        phase: Option<String>,
        text: String,
    },
    TimedOut,
    Eof,
    Cancelled,
}

/// Why control is leaving the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffReason {
    /// The run was configured to end in an interactive session.
    Requested,
    /// The operator interrupted a scripted step.
    Interrupted,
}

/// What the caller should do after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Handoff(HandoffReason),
}

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Applied to every prompt wait.
    pub timeout: Duration,

    /// Pause after each matched prompt; slow device CLIs drop input when
    /// lines arrive back to back.
    pub command_interval: Duration,

    /// How long to watch for the transport's host-key question, which can
    /// arrive well after the process spawns.
    pub host_key_grace: Duration,

    /// Answer the host-key question automatically.
    pub host_key_auto_accept: bool,

    /// Prompt search window, in bytes from the end of the output buffer.
    pub search_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            command_interval: Duration::from_millis(800),
            host_key_grace: Duration::from_secs(5),
            host_key_auto_accept: false,
            search_depth: 1000,
        }
    }
}

/// Login credentials for one device.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    /// Held only in memory; never logged or written to the transcript.
    pub password: Option<SecretString>,
}

/// Outcome of a single scripted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    /// EOF where ending the session is acceptable (closing steps).
    Ended,
    Cancelled,
}

/// Which prompt(s) a wait accepts.
#[derive(Debug, Clone, Copy)]
enum Expect<'a> {
    /// Any prompt in the profile's set.
    Any,
    /// Exactly the named phase's prompt.
    Phase(&'a str),
}

/// What fired during the authentication wait.
enum AuthEvent {
    UsernamePrompt,
    PasswordPrompt,
    /// The device asked for the password again after it was sent.
    PasswordRejected,
    Prompt(Option<String>),
    TimedOut,
    Eof,
    Cancelled,
}

enum AuthKind {
    Username,
    Password,
    Prompt,
}

const HOST_KEY_QUESTION: &[u8] = b"Are you sure you want to continue connecting";

/// Drives one device session over an owned transport.
///
/// Constructed per device and never reused; the transport is closed (or
/// left attached to an interactive handoff) before the automaton is
/// dropped.
pub struct SessionAutomaton<T: Transport> {
    device: String,
    profile: Arc<CompiledProfile>,
    credentials: Credentials,
    options: SessionOptions,
    phase: Phase,
    transport: T,
    buffer: OutputBuffer,
    transcript: Box<dyn Write + Send>,
    cancel: CancellationToken,
}

impl<T: Transport> SessionAutomaton<T> {
    pub fn new(
        device: impl Into<String>,
        profile: Arc<CompiledProfile>,
        credentials: Credentials,
        options: SessionOptions,
        transport: T,
        transcript: Box<dyn Write + Send>,
        cancel: CancellationToken,
    ) -> Self {
        let buffer = OutputBuffer::new(options.search_depth);
        Self {
            device: device.into(),
            profile,
            credentials,
            options,
            phase: Phase::Disconnected,
            transport,
            buffer,
            transcript,
            cancel,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Establish the session: optional host-key acceptance, then the
    /// username/password exchange, then any baseline prompt.
    pub async fn connect(&mut self) -> Result<Control> {
        if self.phase != Phase::Disconnected {
            return Err(SessionError::AlreadyConnected.into());
        }
        self.phase = Phase::Connecting;
        debug!("{}: connecting", self.device);

        if self.options.host_key_auto_accept
            && self.answer_host_key().await? == Step::Cancelled
        {
            return Ok(self.hand_off(HandoffReason::Interrupted));
        }

        self.phase = Phase::Authenticating;
        let mut username_sent = false;
        let mut password_sent = false;
        loop {
            match self.wait_auth(username_sent, password_sent).await? {
                AuthEvent::UsernamePrompt => {
                    let username = self
                        .credentials
                        .username
                        .clone()
                        .ok_or(SessionError::NotConnected)?;
                    self.transport.send_line(&username).await?;
                    username_sent = true;
                }
                AuthEvent::PasswordPrompt => {
                    let password = self
                        .credentials
                        .password
                        .clone()
                        .ok_or(SessionError::NotConnected)?;
                    self.transport.send_line(password.expose_secret()).await?;
                    password_sent = true;
                }
                AuthEvent::PasswordRejected => {
                    return Err(SessionError::AuthenticationFailed {
                        device: self.device.clone(),
                    }
                    .into());
                }
                AuthEvent::Prompt(phase) => {
                    debug!("{}: baseline prompt ({phase:?})", self.device);
                    break;
                }
                AuthEvent::TimedOut => {
                    return Err(SessionError::ConnectTimeout {
                        timeout: self.options.timeout,
                    }
                    .into());
                }
                AuthEvent::Eof => {
                    return Err(SessionError::Disconnected { phase: self.phase }.into());
                }
                AuthEvent::Cancelled => {
                    return Ok(self.hand_off(HandoffReason::Interrupted));
                }
            }
        }
        self.phase = Phase::Connected;
        self.pace().await;
        Ok(Control::Continue)
    }

    /// Send the profile's paging-disable commands; no-op on an empty list.
    pub async fn disable_paging(&mut self) -> Result<Control> {
        if self.phase != Phase::Connected {
            return Err(SessionError::NotConnected.into());
        }
        let commands = self.profile.definition().paging_disable_commands.clone();
        for line in &commands {
            match self.send_and_wait(line, Expect::Any, false).await? {
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done | Step::Ended => {}
            }
        }
        self.phase = Phase::PagingDisabled;
        Ok(Control::Continue)
    }

    /// Send each command at the baseline prompt, in order, then hand the
    /// session to the operator, or run the exit sequence when
    /// `auto_close` is set.
    pub async fn run_exec(&mut self, commands: &[String], auto_close: bool) -> Result<Control> {
        if self.phase != Phase::PagingDisabled {
            return Err(SessionError::NotConnected.into());
        }
        self.phase = Phase::Exec;
        for line in commands {
            match self.send_and_wait(line, Expect::Any, false).await? {
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done | Step::Ended => {}
            }
        }

        if auto_close {
            match self.run_session_exit().await? {
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done | Step::Ended => {}
            }
            self.close().await?;
            Ok(Control::Continue)
        } else {
            Ok(self.hand_off(HandoffReason::Requested))
        }
    }

    /// Enter configuration mode, send the pre/user/post lines, then either
    /// commit-and-exit or hand off with the draft staged.
    ///
    /// Entry and every configuration line wait for the `config` prompt
    /// specifically; the closing steps accept any prompt, since commit may
    /// land in exec or shell mode or end the session outright.
    pub async fn run_config(&mut self, commands: &[String], commit: bool) -> Result<Control> {
        if self.phase != Phase::PagingDisabled {
            return Err(SessionError::NotConnected.into());
        }
        // fail before sending anything if the profile has no config prompt
        self.profile.config_prompt().map_err(crate::error::Error::Profile)?;
        let def = self.profile.definition();
        let entry = def.config_entry_command.clone();
        let pre = def.pre_config_commands.clone();
        let post = def.post_config_commands.clone();
        let commit_command = def.commit_command.clone();
        let config_exit = def.config_exit_command.clone();

        self.phase = Phase::ConfigEntering;
        if let Some(entry) = entry {
            match self.send_and_wait(&entry, Expect::Phase("config"), false).await? {
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done | Step::Ended => {}
            }
        }

        self.phase = Phase::ConfigActive;
        for line in pre.iter().chain(commands).chain(post.iter()) {
            match self.send_and_wait(line, Expect::Phase("config"), false).await? {
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done | Step::Ended => {}
            }
        }

        if !commit {
            // leave the draft staged and uncommitted
            return Ok(self.hand_off(HandoffReason::Requested));
        }

        self.phase = Phase::Committing;
        if let Some(line) = commit_command {
            match self.send_and_wait(&line, Expect::Any, true).await? {
                Step::Ended => {
                    self.close().await?;
                    return Ok(Control::Continue);
                }
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done => {}
            }
        }
        if let Some(line) = config_exit {
            match self.send_and_wait(&line, Expect::Any, true).await? {
                Step::Ended => {
                    self.close().await?;
                    return Ok(Control::Continue);
                }
                Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
                Step::Done => {}
            }
        }
        match self.run_session_exit().await? {
            Step::Cancelled => return Ok(self.hand_off(HandoffReason::Interrupted)),
            Step::Done | Step::Ended => {}
        }
        self.close().await?;
        Ok(Control::Continue)
    }

    /// Hand the live session to the operator, then tear down when the
    /// operator's session ends.
    pub async fn interact(&mut self) -> Result<()> {
        self.transport.interact().await?;
        self.close().await
    }

    /// Tear down the transport. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await?;
        self.phase = Phase::Disconnected;
        Ok(())
    }

    /// Write an operator-facing note into the transcript.
    pub fn surface_note(&mut self, note: &str) {
        self.surface(note.as_bytes());
    }

    /// Send the session exit commands; EOF part-way through means the
    /// device closed the session, which is the goal.
    async fn run_session_exit(&mut self) -> Result<Step> {
        self.phase = Phase::Exiting;
        let commands = self.profile.definition().session_exit_commands.clone();
        for line in &commands {
            match self.send_and_wait(line, Expect::Any, true).await? {
                Step::Done => {}
                ended_or_cancelled => return Ok(ended_or_cancelled),
            }
        }
        Ok(Step::Done)
    }

    async fn send_and_wait(&mut self, line: &str, expect: Expect<'_>, eof_ok: bool) -> Result<Step> {
        trace!("{}: sending '{line}'", self.device);
        self.transport.send_line(line).await?;
        match self.wait_for(expect).await? {
            WaitOutcome::Matched { phase, .. } => {
                trace!("{}: prompt matched ({phase:?})", self.device);
                self.pace().await;
                Ok(Step::Done)
            }
            WaitOutcome::TimedOut => Err(SessionError::StepTimeout {
                phase: self.phase,
                timeout: self.options.timeout,
            }
            .into()),
            WaitOutcome::Eof if eof_ok => {
                self.phase = Phase::Disconnected;
                Ok(Step::Ended)
            }
            WaitOutcome::Eof => Err(SessionError::Disconnected { phase: self.phase }.into()),
            WaitOutcome::Cancelled => Ok(Step::Cancelled),
        }
    }

    /// Wait until `expect` matches the buffer tail. Text preceding the
    /// match (or everything buffered, on timeout/EOF) goes to the
    /// transcript.
    async fn wait_for(&mut self, expect: Expect<'_>) -> Result<WaitOutcome> {
        let profile = self.profile.clone();
        let pattern = match expect {
            Expect::Any => profile.any_prompt(),
            Expect::Phase(phase) => profile.prompt(phase).ok_or_else(|| {
                crate::error::Error::Profile(crate::error::ProfileError::Incompatible {
                    name: profile.name().to_string(),
                    mode: phase.to_string(),
                    missing: format!("a '{phase}' prompt"),
                })
            })?,
        };

        let deadline = Instant::now() + self.options.timeout;
        loop {
            if let Some(range) = self.buffer.search_tail(pattern) {
                let (before, matched) = self.buffer.split_match(range);
                self.surface(&before);
                let phase = profile.classify(&matched).map(str::to_string);
                return Ok(WaitOutcome::Matched {
                    phase,
                    text: String::from_utf8_lossy(&matched).into_owned(),
                });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    let partial = self.buffer.take();
                    self.surface(&partial);
                    return Ok(WaitOutcome::TimedOut);
                }
                chunk = self.transport.recv() => match chunk? {
                    Some(data) => self.buffer.extend(&data),
                    None => {
                        let partial = self.buffer.take();
                        self.surface(&partial);
                        return Ok(WaitOutcome::Eof);
                    }
                },
            }
        }
    }

    /// Authentication wait: earliest match among the username prompt, the
    /// password prompt, and the baseline prompt set.
    async fn wait_auth(&mut self, username_sent: bool, password_sent: bool) -> Result<AuthEvent> {
        let profile = self.profile.clone();
        let deadline = Instant::now() + self.options.timeout;
        loop {
            let mut candidates: Vec<(&regex::bytes::Regex, AuthKind)> =
                vec![(profile.any_prompt(), AuthKind::Prompt)];
            if self.credentials.username.is_some() && !username_sent {
                candidates.push((profile.username_prompt(), AuthKind::Username));
            }
            if self.credentials.password.is_some() {
                candidates.push((profile.password_prompt(), AuthKind::Password));
            }

            let mut best: Option<(Range<usize>, AuthKind)> = None;
            for (pattern, kind) in candidates {
                if let Some(range) = self.buffer.search_tail(pattern) {
                    if best.as_ref().is_none_or(|(b, _)| range.start < b.start) {
                        best = Some((range, kind));
                    }
                }
            }

            if let Some((range, kind)) = best {
                let (before, matched) = self.buffer.split_match(range);
                self.surface(&before);
                return Ok(match kind {
                    AuthKind::Username => AuthEvent::UsernamePrompt,
                    AuthKind::Password if password_sent => AuthEvent::PasswordRejected,
                    AuthKind::Password => AuthEvent::PasswordPrompt,
                    AuthKind::Prompt => AuthEvent::Prompt(
                        profile.classify(&matched).map(str::to_string),
                    ),
                });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(AuthEvent::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    let partial = self.buffer.take();
                    self.surface(&partial);
                    return Ok(AuthEvent::TimedOut);
                }
                chunk = self.transport.recv() => match chunk? {
                    Some(data) => self.buffer.extend(&data),
                    None => {
                        let partial = self.buffer.take();
                        self.surface(&partial);
                        return Ok(AuthEvent::Eof);
                    }
                },
            }
        }
    }

    /// Watch for the transport's host-key confirmation question during the
    /// grace window and answer it.
    async fn answer_host_key(&mut self) -> Result<Step> {
        let deadline = Instant::now() + self.options.host_key_grace;
        loop {
            if self.buffer.contains(HOST_KEY_QUESTION) {
                debug!("{}: accepting host key", self.device);
                self.transport.send_line("yes").await?;
                return Ok(Step::Done);
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Step::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(Step::Done),
                chunk = self.transport.recv() => match chunk? {
                    Some(data) => self.buffer.extend(&data),
                    // the connect wait will observe the EOF
                    None => return Ok(Step::Done),
                },
            }
        }
    }

    fn hand_off(&mut self, reason: HandoffReason) -> Control {
        self.phase = Phase::InteractivePassthrough;
        Control::Handoff(reason)
    }

    async fn pace(&self) {
        if !self.options.command_interval.is_zero() {
            tokio::time::sleep(self.options.command_interval).await;
        }
    }

    fn surface(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(e) = self
            .transcript
            .write_all(bytes)
            .and_then(|_| self.transcript.flush())
        {
            warn!("{}: transcript write failed: {e}", self.device);
        }
    }
}
