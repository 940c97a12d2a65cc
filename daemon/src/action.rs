//! Runs the configured reconfiguration command once a hotplug burst has settled.
//!
//! Every failure here is logged and swallowed: a broken command must never
//! take the monitor down, the next hotplug simply gets another attempt.
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::debounce::HotplugHandler;
use crate::desktop::{self, DetectedDesktop, ExclusionPolicy};
use crate::readiness::{Readiness, ReadinessProber};

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type DesktopDetector = Box<dyn Fn() -> Option<DetectedDesktop> + Send + Sync>;

/// What happened to a single `execute()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The running desktop manages its own outputs; nothing was run.
    Excluded,
    Succeeded,
    /// Non-zero exit. `code` is `None` when the shell was killed by a signal.
    Failed { code: Option<i32> },
    /// Killed after exceeding the execution timeout.
    TimedOut,
    /// The shell could not be spawned or waited on.
    SpawnFailed,
}

pub struct ActionTrigger {
    command: String,
    timeout: Duration,
    policy: ExclusionPolicy,
    detect: DesktopDetector,
}

impl ActionTrigger {
    pub fn new(command: impl Into<String>, policy: ExclusionPolicy) -> Self {
        Self {
            command: command.into(),
            timeout: COMMAND_TIMEOUT,
            policy,
            detect: Box::new(desktop::detect_desktop),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces environment-based desktop detection.
    #[cfg(test)]
    pub fn with_detector<F>(mut self, detect: F) -> Self
    where
        F: Fn() -> Option<DetectedDesktop> + Send + Sync + 'static,
    {
        self.detect = Box::new(detect);
        self
    }

    /// Re-reads the desktop environment and applies the exclusion policy.
    pub fn is_excluded(&self) -> bool {
        self.policy.excludes((self.detect)().as_ref())
    }

    pub async fn execute(&self) -> ActionOutcome {
        if self.is_excluded() {
            tracing::info!("Not running command under an excluded desktop environment");
            return ActionOutcome::Excluded;
        }

        tracing::info!("Executing command: {}", self.command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Error executing command: {e}");
                return ActionOutcome::SpawnFailed;
            }
        };

        // On timeout the child is dropped with the future and killed.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!("Error executing command: {e}");
                return ActionOutcome::SpawnFailed;
            }
            Err(_) => {
                tracing::error!("Command execution timed out after {:?}", self.timeout);
                return ActionOutcome::TimedOut;
            }
        };

        if output.status.success() {
            tracing::info!("Command executed successfully");
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                tracing::debug!("Output: {}", stdout.trim_end());
            }
            ActionOutcome::Succeeded
        } else {
            let code = output.status.code();
            match code {
                Some(code) => tracing::warn!("Command failed with return code {code}"),
                None => tracing::warn!("Command terminated by signal ({})", output.status),
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                tracing::warn!("Error: {}", stderr.trim_end());
            }
            ActionOutcome::Failed { code }
        }
    }
}

/// The work done when the debounce timer fires: settle-wait, then run the command.
pub struct Reconfigure {
    prober: ReadinessProber,
    trigger: ActionTrigger,
}

impl Reconfigure {
    pub fn new(prober: ReadinessProber, trigger: ActionTrigger) -> Self {
        Self { prober, trigger }
    }

    pub async fn run(&self) -> ActionOutcome {
        // Checked up front so an excluded session never pays for the settle-wait.
        if self.trigger.is_excluded() {
            return ActionOutcome::Excluded;
        }
        match self.prober.wait_until_ready().await {
            Readiness::Connected { count, waited } => {
                tracing::debug!("{count} display(s) ready after {waited:.1?}")
            }
            Readiness::TimedOut { waited } => {
                tracing::debug!("No display connected after {waited:.1?}")
            }
        }
        self.trigger.execute().await
    }
}

impl HotplugHandler for Reconfigure {
    async fn handle(&self) {
        let outcome = self.run().await;
        tracing::debug!("Hotplug handling finished: {outcome:?}");
    }
}
