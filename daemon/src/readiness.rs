//! Settle-wait between a hotplug notification and reconfiguring outputs.
//!
//! The kernel reports a hotplug before the display server has finished
//! bringing the output up, so running the command straight away tends to see
//! stale state. After a fixed settle delay the connector status in sysfs is
//! polled until at least one display reports `connected` or the time budget
//! runs out. Running out is not an error: unplugging the last display is a
//! perfectly valid reason for nothing to be connected.
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SETTLE_DELAY: Duration = Duration::from_millis(1000);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const MAX_WAIT: Duration = Duration::from_millis(5000);

/// Counts display connectors currently reporting a connected status.
pub trait ConnectorProbe: Send + Sync + 'static {
    fn connected_count(&self) -> usize;
}

/// Reads connector status through libudev's view of `/sys/class/drm`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdevConnectorProbe;

impl ConnectorProbe for UdevConnectorProbe {
    fn connected_count(&self) -> usize {
        count_connected().unwrap_or_else(|e| {
            tracing::debug!("Failed to enumerate drm devices: {e}");
            0
        })
    }
}

fn count_connected() -> std::io::Result<usize> {
    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem("drm")?;
    let count = enumerator
        .scan_devices()?
        .filter(is_connected_connector)
        .count();
    Ok(count)
}

/// Connectors without a `status` attribute, or whose attribute cannot be
/// read, simply do not count.
fn is_connected_connector(device: &udev::Device) -> bool {
    device.sysname().to_string_lossy().contains("card")
        && device
            .attribute_value("status")
            .is_some_and(|status| status.to_string_lossy().trim() == "connected")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Unconditional sleep before the first probe. Counts toward `max_wait`.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
            poll_interval: POLL_INTERVAL,
            max_wait: MAX_WAIT,
        }
    }
}

/// Result of a settle-wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Connected { count: usize, waited: Duration },
    TimedOut { waited: Duration },
}

pub struct ReadinessProber {
    probe: Arc<dyn ConnectorProbe>,
    policy: ReadinessPolicy,
}

impl ReadinessProber {
    pub fn new(probe: Arc<dyn ConnectorProbe>, policy: ReadinessPolicy) -> Self {
        Self { probe, policy }
    }

    /// Samples the connector count once, off the async worker threads.
    pub async fn probe(&self) -> usize {
        let probe = Arc::clone(&self.probe);
        match tokio::task::spawn_blocking(move || probe.connected_count()).await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!("Connector probe task failed: {e}");
                0
            }
        }
    }

    /// Waits for the display stack to settle. Always returns within `max_wait`.
    pub async fn wait_until_ready(&self) -> Readiness {
        let ReadinessPolicy {
            settle_delay,
            poll_interval,
            max_wait,
        } = self.policy;
        let start = Instant::now();
        let deadline = start + max_wait;

        tracing::debug!("Waiting for displays to be ready...");
        tokio::time::sleep(settle_delay.min(max_wait)).await;

        while Instant::now() < deadline {
            let count = self.probe().await;
            if count > 0 {
                let waited = start.elapsed();
                tracing::debug!("Detected {count} connected display(s) after {waited:.1?}");
                return Readiness::Connected { count, waited };
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }

        let waited = start.elapsed();
        tracing::debug!("No connected display after {waited:.1?}, continuing anyway");
        Readiness::TimedOut { waited }
    }
}
