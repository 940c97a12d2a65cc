//! Desktop-environment detection and the exclusion policy built on top of it.
//!
//! Full desktops (GNOME, KDE, COSMIC, ...) run their own output-management
//! daemon; invoking the reconfiguration command there would fight with it.

/// Environment variables consulted in order. First non-empty value wins.
pub const DESKTOP_VARS: [&str; 3] = ["XDG_CURRENT_DESKTOP", "XDG_SESSION_DESKTOP", "DESKTOP_SESSION"];

/// A desktop name together with the variable it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedDesktop {
    pub source: &'static str,
    pub name: String,
}

/// Detects the running desktop using `lookup` to read environment variables.
pub fn detect_desktop_with<F>(lookup: F) -> Option<DetectedDesktop>
where
    F: Fn(&str) -> Option<String>,
{
    DESKTOP_VARS.iter().find_map(|&var| {
        let value = lookup(var)?;
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| DetectedDesktop {
            source: var,
            name: trimmed.to_string(),
        })
    })
}

/// Detects the running desktop from the process environment.
pub fn detect_desktop() -> Option<DetectedDesktop> {
    detect_desktop_with(|var| std::env::var(var).ok())
}

/// Case-insensitive, bidirectional substring match against configured fragments.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    fragments: Vec<String>,
}

impl ExclusionPolicy {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fragments = fragments
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        Self { fragments }
    }

    /// Returns the fragment that excludes `desktop`, if any.
    ///
    /// `"gnome"` excludes `"GNOME-Classic"`, and `"gnome-shell"` is excluded
    /// by a desktop reported as plain `"GNOME"`.
    pub fn matching_fragment(&self, desktop: &str) -> Option<&str> {
        let desktop = desktop.to_lowercase();
        self.fragments
            .iter()
            .find(|f| desktop.contains(f.as_str()) || f.contains(desktop.as_str()))
            .map(String::as_str)
    }

    /// Evaluates the policy against the live environment, logging the decision.
    pub fn excludes_current_desktop(&self) -> bool {
        self.excludes(detect_desktop().as_ref())
    }

    pub fn excludes(&self, desktop: Option<&DetectedDesktop>) -> bool {
        let Some(desktop) = desktop else {
            tracing::debug!("No desktop environment detected");
            return false;
        };
        tracing::debug!(
            "Detected desktop environment from {}: {}",
            desktop.source,
            desktop.name
        );
        match self.matching_fragment(&desktop.name) {
            Some(fragment) => {
                tracing::info!(
                    "Desktop environment '{}' is excluded (matches '{}')",
                    desktop.name,
                    fragment
                );
                true
            }
            None => false,
        }
    }
}
