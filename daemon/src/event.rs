//! Messages flowing from the udev listener thread (and the signal task) into
//! the monitor loop.
use std::fmt;

/// The kernel action attached to a uevent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Add,
    Change,
    Remove,
    /// bind, unbind, offline, ... Never acted upon.
    Other,
}

impl From<udev::EventType> for DeviceAction {
    fn from(kind: udev::EventType) -> Self {
        match kind {
            udev::EventType::Add => DeviceAction::Add,
            udev::EventType::Change => DeviceAction::Change,
            udev::EventType::Remove => DeviceAction::Remove,
            _ => DeviceAction::Other,
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceAction::Add => "add",
            DeviceAction::Change => "change",
            DeviceAction::Remove => "remove",
            DeviceAction::Other => "other",
        };
        f.write_str(name)
    }
}

/// A single DRM uevent, detached from the (non-`Send`) udev socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub action: DeviceAction,
    /// Kernel name of the device, e.g. `card0` or `card1-HDMI-A-1`.
    pub sysname: String,
    /// udev devtype, e.g. `drm_minor`. Connectors usually carry none.
    pub devtype: Option<String>,
}

impl DeviceEvent {
    pub fn from_udev(event: &udev::Event) -> Self {
        Self {
            action: event.event_type().into(),
            sysname: event.sysname().to_string_lossy().into_owned(),
            devtype: event.devtype().map(|d| d.to_string_lossy().into_owned()),
        }
    }

    /// True for add/change/remove on a display card, a connector, or a DRM
    /// minor node. Everything else in the drm subsystem is noise.
    pub fn is_display_hotplug(&self) -> bool {
        let relevant_action = matches!(
            self.action,
            DeviceAction::Add | DeviceAction::Change | DeviceAction::Remove
        );
        let display_device =
            self.sysname.contains("card") || self.devtype.as_deref() == Some("drm_minor");
        relevant_action && display_device
    }
}

pub enum LoopMessage {
    /// A uevent from the drm subsystem.
    Device(DeviceEvent),
    /// SIGINT or SIGTERM received; cancel pending work and exit cleanly.
    Shutdown,
    /// The listener thread could no longer read from the udev socket.
    SourceFailed(String),
}
