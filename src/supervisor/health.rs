//! Health probing through the client's `status` subcommand.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tokio::{
    process::Command,
    time::{Instant, sleep, timeout},
};

use super::{AttemptError, Inner, RunContext};
use crate::{config::Profile, state::Health};

pub(super) const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub(super) const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);
pub(super) const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

const VERIFY_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Consecutive steady-state failures that are fatal for the attempt.
const MONITOR_FATAL_FAILURES: u32 = 3;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("{0}")]
    Probe(String),
    #[error("status probe timed out")]
    Timeout,
    #[error("failed to run status probe: {0}")]
    Exec(std::io::Error),
}

/// One `<exe> status -c <config>` invocation. Success is exit 0; the
/// failure message is the trimmed combined output, falling back to the
/// exit description when the client printed nothing.
pub(crate) async fn probe_once(
    binary: &Path,
    config: &Path,
    limit: Duration,
) -> Result<(), HealthError> {
    let mut command = Command::new(binary);
    command
        .arg("status")
        .arg("-c")
        .arg(config)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(HealthError::Exec(err)),
        Err(_) => return Err(HealthError::Timeout),
    };

    if output.status.success() {
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let message = combined.trim().to_string();
    if message.is_empty() {
        Err(HealthError::Probe(output.status.to_string()))
    } else {
        Err(HealthError::Probe(message))
    }
}

/// Post-readiness verification: probe every 500 ms until the tunnel
/// answers or the profile's verification window closes. Each failure is
/// reflected in the health fields immediately.
pub(super) async fn verify_startup(
    inner: &Arc<Inner>,
    run: &RunContext,
    binary: &Path,
    config: &Path,
    profile: &Profile,
) -> Result<(), AttemptError> {
    let overall = profile.status_timeout.unwrap_or(DEFAULT_VERIFY_TIMEOUT);
    let probe_limit = profile.health_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT);
    let deadline = Instant::now() + overall;
    let mut last_error: Option<HealthError> = None;

    while Instant::now() < deadline {
        if run.cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }
        match probe_once(binary, config, probe_limit).await {
            Ok(()) => {
                inner.append_log("status check ok");
                inner.set_health_for(run, Health::Ok, None);
                return Ok(());
            }
            Err(err) => {
                inner.set_health_for(run, Health::Fail, Some(err.to_string()));
                last_error = Some(err);
            }
        }
        tokio::select! {
            _ = run.cancel.cancelled() => return Err(AttemptError::Cancelled),
            _ = sleep(VERIFY_POLL_INTERVAL) => {}
        }
    }

    match last_error {
        Some(err) => Err(AttemptError::StartupVerification(err.to_string())),
        None => Err(AttemptError::StartupVerificationTimeout),
    }
}

/// Steady-state monitor installed after a fully successful attempt.
/// Exits silently when the run is cancelled; three consecutive probe
/// failures are fatal and hand control back to the supervisor.
pub(super) async fn monitor(
    inner: Arc<Inner>,
    run: RunContext,
    binary: PathBuf,
    config: PathBuf,
    profile: Profile,
) {
    let interval = profile.status_interval.unwrap_or(DEFAULT_MONITOR_INTERVAL);
    let probe_limit = profile.health_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = run.cancel.cancelled() => return,
            _ = sleep(interval) => {}
        }

        match probe_once(&binary, &config, probe_limit).await {
            Ok(()) => {
                failures = 0;
                inner.set_health_for(&run, Health::Ok, None);
            }
            Err(err) => {
                failures += 1;
                let message = err.to_string();
                inner.set_health_for(&run, Health::Fail, Some(message.clone()));
                if failures >= MONITOR_FATAL_FAILURES {
                    if run.cancel.is_cancelled() {
                        return;
                    }
                    inner.append_log(format!("health monitor failed: {message}"));
                    tracing::warn!(profile = %profile.name, error = %message, "health monitor giving up");
                    inner.fail_over(&run, "health monitor failed", true);
                    return;
                }
            }
        }
    }
}
