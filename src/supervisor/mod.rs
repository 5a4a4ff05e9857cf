//! Launches the tunnel client against one profile at a time, decides
//! readiness from its output, and fails over to the next enabled
//! profile when startup, readiness, or health checks go wrong.

mod classify;
mod health;
mod preflight;

use std::{
    io,
    path::PathBuf,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{AppConfig, Profile},
    resolve::{self, ResolveError},
    state::{Health, RunHandle, Status, StatusSnapshot, SupervisorState},
};

use classify::{Verdict, classify_line};
use preflight::PreflightError;

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(8);

/// Why one profile attempt ended. Attempt errors never cross the
/// supervisor boundary; they become rotation continuations or a
/// terminal error status.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to spawn client '{}': {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("start timeout")]
    StartTimeout,
    #[error("{0}")]
    StartupFailure(String),
    #[error("{0}")]
    EarlyExit(String),
    #[error("{0}")]
    StartupVerification(String),
    #[error("status check timeout")]
    StartupVerificationTimeout,
    #[error("attempt cancelled")]
    Cancelled,
}

/// Identity of one supervision run, shared by every task the run
/// spawns.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    id: u64,
    cancel: CancellationToken,
}

pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SupervisorState::new(config)),
                run_ids: AtomicU64::new(1),
            }),
        }
    }

    /// Idempotent: a supervisor that is already starting or running is
    /// left alone. Otherwise the rotation (auto-switch) or the
    /// single-profile path is spawned without blocking the caller.
    pub fn start(&self) {
        let auto = {
            let mut state = self.inner.state.lock();
            if matches!(state.status, Status::Starting | Status::Running) {
                return;
            }
            state.status = Status::Starting;
            state.last_error = None;
            state.auto_switch
        };
        let run = self.inner.begin_run();
        if auto {
            tokio::spawn(run_rotation(self.inner.clone(), run, None));
        } else {
            tokio::spawn(run_single(self.inner.clone(), run));
        }
    }

    /// Resets the visible state synchronously; the process kill behind
    /// the cancelled run completes in the background. Safe to call
    /// repeatedly.
    pub fn stop(&self) {
        let handle = self.inner.state.lock().reset_stopped();
        if let Some(run) = handle {
            run.cancel.cancel();
        }
    }

    /// Manual skip: abandon the current run and rotate, starting just
    /// after the last attempted profile.
    pub fn advance_to_next(&self) {
        let next = {
            let state = self.inner.state.lock();
            state.last_index.map_or(0, |index| index + 1)
        };
        let run = self.inner.begin_run();
        tokio::spawn(run_rotation(self.inner.clone(), run, Some(next)));
    }

    /// Atomic replacement of the profile set and auto-switch flag;
    /// takes effect on the next start.
    pub fn set_config(&self, config: AppConfig) {
        let mut state = self.inner.state.lock();
        state.auto_switch = config.auto_switch;
        state.config = config;
    }

    /// Never blocks on process or network I/O, only on the state lock.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// One on-demand probe against the active profile, outside the
    /// periodic schedule. Updates the health fields either way.
    pub async fn check_health_now(&self) -> Result<()> {
        let (active, config) = {
            let state = self.inner.state.lock();
            (state.profile.clone(), state.config.clone())
        };
        let Some(name) = active else {
            bail!("no running profile");
        };
        let Some(profile) = config.profiles.iter().find(|p| p.name == name) else {
            bail!("active profile '{name}' not found in configuration");
        };
        match probe_profile(profile).await {
            Ok(()) => {
                self.inner.set_health(Health::Ok, None);
                Ok(())
            }
            Err(err) => {
                self.inner.set_health(Health::Fail, Some(err.to_string()));
                Err(err)
            }
        }
    }
}

/// One standalone health probe against a profile, independent of any
/// supervision run.
pub async fn probe_profile(profile: &Profile) -> Result<()> {
    let config_path = resolve::profile_config(profile)?;
    let binary = resolve::client_binary(profile.binary.as_deref())?;
    let limit = profile
        .health_timeout
        .unwrap_or(health::DEFAULT_PROBE_TIMEOUT);
    health::probe_once(&binary, &config_path, limit).await?;
    Ok(())
}

pub(crate) struct Inner {
    state: Mutex<SupervisorState>,
    run_ids: AtomicU64,
}

fn is_current(state: &SupervisorState, run: &RunContext) -> bool {
    state.run.as_ref().is_some_and(|handle| handle.id == run.id)
}

impl Inner {
    fn append_log(&self, line: impl Into<String>) {
        self.state.lock().log.push(line);
    }

    fn set_health(&self, health: Health, error: Option<String>) {
        let mut state = self.state.lock();
        state.health = health;
        state.health_error = error;
    }

    /// Health update that a superseded run must not apply.
    fn set_health_for(&self, run: &RunContext, health: Health, error: Option<String>) {
        let mut state = self.state.lock();
        if !is_current(&state, run) {
            return;
        }
        state.health = health;
        state.health_error = error;
    }

    fn record_attempt_for(&self, run: &RunContext, profile: &str, index: usize) {
        let mut state = self.state.lock();
        if !is_current(&state, run) {
            return;
        }
        state.status = Status::Starting;
        state.profile = Some(profile.to_string());
        state.last_index = Some(index);
    }

    fn set_running_for(&self, run: &RunContext, profile: &str) {
        let mut state = self.state.lock();
        if !is_current(&state, run) {
            return;
        }
        state.status = Status::Running;
        state.profile = Some(profile.to_string());
        state.last_error = None;
    }

    fn terminal_error_for(&self, run: &RunContext, message: &str) {
        let mut state = self.state.lock();
        if !is_current(&state, run) {
            return;
        }
        state.status = Status::Error;
        state.last_error = Some(message.to_string());
        state.run = None;
    }

    fn config_snapshot(&self) -> AppConfig {
        self.state.lock().config.clone()
    }

    fn next_run_context(&self) -> RunContext {
        RunContext {
            id: self.run_ids.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
        }
    }

    /// Installs a fresh run as the current one, cancelling whatever ran
    /// before it.
    fn begin_run(&self) -> RunContext {
        let ctx = self.next_run_context();
        let previous = {
            let mut state = self.state.lock();
            state.run.replace(RunHandle {
                id: ctx.id,
                cancel: ctx.cancel.clone(),
            })
        };
        if let Some(run) = previous {
            run.cancel.cancel();
        }
        ctx
    }

    /// Terminal failure of an installed run: record the error, cancel
    /// the run (killing its process), and rotate to the next profile
    /// when auto-switch is on. A run that was already superseded or
    /// stopped is ignored.
    fn fail_over(self: &Arc<Self>, run: &RunContext, message: &str, mark_health: bool) {
        let next = {
            let mut state = self.state.lock();
            if !is_current(&state, run) {
                return;
            }
            state.status = Status::Error;
            state.last_error = Some(message.to_string());
            if mark_health {
                state.health = Health::Fail;
                state.health_error = Some(message.to_string());
            }
            if state.auto_switch {
                let index = state.last_index.map_or(0, |i| i + 1);
                let ctx = self.next_run_context();
                state.run = Some(RunHandle {
                    id: ctx.id,
                    cancel: ctx.cancel.clone(),
                });
                Some((ctx, index))
            } else {
                state.run = None;
                None
            }
        };
        run.cancel.cancel();
        if let Some((ctx, index)) = next {
            tokio::spawn(run_rotation(Arc::clone(self), ctx, Some(index)));
        }
    }
}

fn enabled_profiles(profiles: &[Profile]) -> Vec<Profile> {
    profiles.iter().filter(|p| p.enabled).cloned().collect()
}

fn initial_index(config: &AppConfig, profiles: &[Profile]) -> usize {
    config
        .active_profile
        .as_deref()
        .and_then(|name| profiles.iter().position(|p| p.name == name))
        .unwrap_or(0)
}

/// Visits each index exactly once, wrapping around from `start`.
fn rotation_order(start: usize, count: usize) -> impl Iterator<Item = usize> {
    (0..count).map(move |offset| (start + offset) % count)
}

/// Tries each enabled profile exactly once per pass, wrapping around
/// from the starting index, until one attempt fully succeeds.
async fn run_rotation(inner: Arc<Inner>, run: RunContext, start_index: Option<usize>) {
    let config = inner.config_snapshot();
    let profiles = enabled_profiles(&config.profiles);
    if profiles.is_empty() {
        inner.append_log("no enabled profiles");
        inner.terminal_error_for(&run, "no enabled profiles");
        return;
    }

    let start = start_index.unwrap_or_else(|| initial_index(&config, &profiles));

    for index in rotation_order(start, profiles.len()) {
        if run.cancel.is_cancelled() {
            return;
        }
        let profile = &profiles[index];
        match attempt_profile(&inner, &run, profile, index).await {
            Ok(()) => return,
            Err(AttemptError::Cancelled) => return,
            Err(err) => {
                tracing::warn!(profile = %profile.name, error = %err, "profile attempt failed");
                inner.append_log(format!("profile '{}' failed: {err}", profile.name));
            }
        }
    }

    inner.terminal_error_for(&run, "all profiles failed");
}

/// Non-automatic mode: one attempt against the selected profile, and a
/// terminal error when it fails.
async fn run_single(inner: Arc<Inner>, run: RunContext) {
    let config = inner.config_snapshot();
    let profiles = enabled_profiles(&config.profiles);
    if profiles.is_empty() {
        inner.append_log("no enabled profiles");
        inner.terminal_error_for(&run, "no enabled profiles");
        return;
    }

    let index = initial_index(&config, &profiles);
    let profile = &profiles[index];
    match attempt_profile(&inner, &run, profile, index).await {
        Ok(()) | Err(AttemptError::Cancelled) => {}
        Err(err) => {
            tracing::warn!(profile = %profile.name, error = %err, "profile attempt failed");
            inner.append_log(format!("profile '{}' failed: {err}", profile.name));
            inner.terminal_error_for(&run, &err.to_string());
        }
    }
}

/// One full attempt: preflight, resolve, spawn, the readiness race,
/// optional startup verification, then watcher installation. Failures
/// are local to the attempt; retry happens only at the rotation level.
async fn attempt_profile(
    inner: &Arc<Inner>,
    run: &RunContext,
    profile: &Profile,
    index: usize,
) -> Result<(), AttemptError> {
    preflight::check(profile).await?;

    let config_path = resolve::profile_config(profile)?;
    let binary = resolve::client_binary(profile.binary.as_deref())?;

    let mut command = Command::new(&binary);
    command
        .arg("-c")
        .arg(&config_path)
        .args(&profile.extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| AttemptError::Spawn {
        binary: binary.clone(),
        source,
    })?;

    inner.record_attempt_for(run, &profile.name, index);
    tracing::info!(profile = %profile.name, binary = %binary.display(), "client started");

    let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);
    let (fail_tx, mut fail_rx) = mpsc::channel::<String>(1);

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(scan_stream(
            inner.clone(),
            stdout,
            ready_tx.clone(),
            fail_tx.clone(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(scan_stream(inner.clone(), stderr, ready_tx, fail_tx));
    }

    let start_timeout = profile.start_timeout.unwrap_or(DEFAULT_START_TIMEOUT);

    // The readiness race. Both signals come from the same serial
    // streams, so a simultaneous dual-match cannot happen; the biased
    // order just makes failure consumption deterministic.
    tokio::select! {
        biased;
        _ = run.cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(AttemptError::Cancelled);
        }
        Some(message) = fail_rx.recv() => {
            inner.append_log(format!("startup failed: {message}"));
            let _ = child.kill().await;
            return Err(AttemptError::StartupFailure(message));
        }
        Some(()) = ready_rx.recv() => {}
        _ = sleep(start_timeout) => {
            inner.append_log("start timeout");
            let _ = child.kill().await;
            return Err(AttemptError::StartTimeout);
        }
        status = child.wait() => {
            return Err(AttemptError::EarlyExit(exit_description(&status)));
        }
    }

    inner.set_running_for(run, &profile.name);

    if profile.require_status {
        inner.set_health_for(run, Health::Checking, None);
        if let Err(err) = health::verify_startup(inner, run, &binary, &config_path, profile).await {
            if !matches!(err, AttemptError::Cancelled) {
                inner.append_log(format!("status check failed: {err}"));
                inner.set_health_for(run, Health::Fail, Some(err.to_string()));
            }
            let _ = child.kill().await;
            return Err(err);
        }
    } else {
        inner.set_health_for(run, Health::Disabled, None);
    }

    tokio::spawn(exit_watch(inner.clone(), run.clone(), child));
    if profile.require_status {
        tokio::spawn(health::monitor(
            inner.clone(),
            run.clone(),
            binary,
            config_path,
            profile.clone(),
        ));
    }

    Ok(())
}

/// Feeds one output stream into the log ring and the classifier. Runs
/// until the stream closes, which happens when the process exits.
async fn scan_stream<R>(
    inner: Arc<Inner>,
    reader: R,
    ready: mpsc::Sender<()>,
    fail: mpsc::Sender<String>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        inner.append_log(line.clone());
        match classify_line(&line) {
            Verdict::Ready => {
                let _ = ready.try_send(());
            }
            Verdict::Failure(message) => {
                let _ = fail.try_send(message);
            }
            Verdict::Inconclusive => {}
        }
    }
}

/// Owns the child after a successful attempt: kills it when the run is
/// cancelled, and reports an unexpected death otherwise.
async fn exit_watch(inner: Arc<Inner>, run: RunContext, mut child: Child) {
    tokio::select! {
        _ = run.cancel.cancelled() => {
            let _ = child.kill().await;
        }
        status = child.wait() => {
            if run.cancel.is_cancelled() {
                return;
            }
            let message = exit_message(&status);
            tracing::warn!(error = %message, "client exited");
            inner.fail_over(&run, &message, false);
        }
    }
}

fn exit_description(result: &io::Result<std::process::ExitStatus>) -> String {
    match result {
        Ok(status) if status.success() => "process exited".to_string(),
        Ok(status) => format!("process exited early: {status}"),
        Err(err) => format!("process exited early: {err}"),
    }
}

fn exit_message(result: &io::Result<std::process::ExitStatus>) -> String {
    match result {
        Ok(status) if status.success() => "process exited".to_string(),
        Ok(status) => format!("process exited: {status}"),
        Err(err) => format!("process exited: {err}"),
    }
}
