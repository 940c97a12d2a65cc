use anyhow::{Context, Result};
use std::io;
use std::os::fd::AsRawFd;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

use crate::event::{DeviceEvent, LoopMessage};

/// Listens on the udev netlink socket for drm subsystem uevents.
///
/// The subsystem filter is installed on the socket itself, so the kernel never
/// wakes us for unrelated hardware. `MonitorSocket` is not `Send`, which is
/// why the monitor is created and driven on its own OS thread.
pub struct UdevMonitor {
    socket: udev::MonitorSocket,
}

impl UdevMonitor {
    pub fn new() -> io::Result<Self> {
        let socket = udev::MonitorBuilder::new()?
            .match_subsystem("drm")?
            .listen()?;

        Ok(Self { socket })
    }

    /// Blocks on the socket and hands every event to `callback`.
    ///
    /// Returns `Ok(())` once the callback asks to stop, or the poll error that
    /// made the socket unusable.
    pub fn run<F>(self, mut callback: F) -> io::Result<()>
    where
        F: FnMut(DeviceEvent) -> bool, // Returns true to continue, false to stop
    {
        tracing::info!("Monitoring drm subsystem for display hotplug events");

        let fd = self.socket.as_raw_fd();

        loop {
            let mut poll_fd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };

            // Negative timeout: wait until readable.
            let poll_result = unsafe { libc::poll(&mut poll_fd, 1, -1) };

            if poll_result < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            for event in self.socket.iter() {
                let event = DeviceEvent::from_udev(&event);
                tracing::debug!(
                    "udev event: action={}, sysname={}, devtype={:?}",
                    event.action,
                    event.sysname,
                    event.devtype
                );
                if !callback(event) {
                    return Ok(());
                }
            }
        }
    }
}

/// Opens the udev monitor on a dedicated thread and forwards its events into `tx`.
///
/// Returns only after the socket has been opened, so a failure to open it
/// (typically missing privileges or no udev) surfaces here as an error rather
/// than inside the event loop.
pub fn spawn(tx: mpsc::Sender<LoopMessage>) -> Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = std_mpsc::sync_channel::<io::Result<()>>(1);

    let handle = std::thread::Builder::new()
        .name("udev-monitor".into())
        .spawn(move || {
            let monitor = match UdevMonitor::new() {
                Ok(monitor) => {
                    let _ = ready_tx.send(Ok(()));
                    monitor
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // A closed channel means the loop is gone; stop quietly.
            let result = monitor.run(|event| tx.blocking_send(LoopMessage::Device(event)).is_ok());

            if let Err(e) = result {
                tracing::error!("udev monitor stopped: {e}");
                let _ = tx.blocking_send(LoopMessage::SourceFailed(e.to_string()));
            }
        })
        .context("Failed to spawn udev monitor thread")?;

    ready_rx
        .recv()
        .context("udev monitor thread exited during startup")?
        .context("Failed to open udev monitor for the drm subsystem")?;

    Ok(handle)
}
