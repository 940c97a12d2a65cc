use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_COMMAND: &str = "autorandr -c";
/// Desktops that ship their own output-management daemon.
pub const DEFAULT_EXCLUDED_DESKTOPS: &str = "COSMIC,GNOME,KDE,Plasma,XFCE,X-Cinnamon";
pub const DEFAULT_DEBOUNCE_DELAY_SECS: f64 = 2.0;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
/// Section name used by INI-style config files; its keys apply at top level.
const DEFAULT_SECTION: &str = "DEFAULT";

/// Daemon configuration. Deserialized from a flat TOML file (or one whose keys
/// all live under a single `[DEFAULT]` table); immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Shell command run after a settled hotplug burst.
    #[serde(default = "default_command")]
    pub command: String,
    /// Lower-cased desktop name fragments for which the daemon stays passive.
    /// Accepts either `"GNOME,KDE"` or `["GNOME", "KDE"]`.
    #[serde(
        default = "default_excluded_desktops",
        deserialize_with = "deserialize_desktop_list"
    )]
    pub excluded_desktops: Vec<String>,
    /// Quiet period in seconds before a burst of events is acted upon.
    #[serde(default = "default_debounce_delay")]
    pub debounce_delay: f64,
    /// Python-style level name: DEBUG, INFO, WARNING, ERROR, CRITICAL.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: default_command(),
            excluded_desktops: default_excluded_desktops(),
            debounce_delay: DEFAULT_DEBOUNCE_DELAY_SECS,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Falls back to the default delay for values `validate` would reject.
    pub fn debounce_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.debounce_delay)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_DEBOUNCE_DELAY_SECS))
    }

    /// Maps `log_level` onto a tracing filter. `None` for unrecognised names.
    pub fn level_filter(&self) -> Option<LevelFilter> {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Some(LevelFilter::TRACE),
            "DEBUG" => Some(LevelFilter::DEBUG),
            "INFO" => Some(LevelFilter::INFO),
            "WARNING" | "WARN" => Some(LevelFilter::WARN),
            "ERROR" | "CRITICAL" => Some(LevelFilter::ERROR),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if let Err(e) = Duration::try_from_secs_f64(self.debounce_delay) {
            bail!(
                "debounce_delay must be a non-negative number of seconds, got {} ({e})",
                self.debounce_delay
            );
        }
        Ok(())
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read, parsed or validated.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

/// Parses config text. Keys may sit at top level or, as in INI-style files,
/// all under a `[DEFAULT]` table. Unknown keys are an error.
pub fn parse(content: &str) -> Result<Config> {
    let mut table: toml::Table = toml::from_str(content)?;
    let table = match table.remove(DEFAULT_SECTION) {
        None => table,
        Some(toml::Value::Table(section)) if table.is_empty() => section,
        Some(toml::Value::Table(_)) => {
            bail!("keys must either all be at top level or all under [{DEFAULT_SECTION}]")
        }
        Some(_) => bail!("[{DEFAULT_SECTION}] must be a table"),
    };
    Ok(toml::Value::Table(table).try_into()?)
}

/// Splits a comma-separated list, trims and lower-cases each entry, drops empties.
pub fn parse_desktop_list(raw: &str) -> Vec<String> {
    normalize_desktops(raw.split(','))
}

fn normalize_desktops<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DesktopList {
    Csv(String),
    List(Vec<String>),
}

fn deserialize_desktop_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match DesktopList::deserialize(deserializer)? {
        DesktopList::Csv(raw) => parse_desktop_list(&raw),
        DesktopList::List(items) => normalize_desktops(items.iter().map(String::as_str)),
    })
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_excluded_desktops() -> Vec<String> {
    parse_desktop_list(DEFAULT_EXCLUDED_DESKTOPS)
}

fn default_debounce_delay() -> f64 {
    DEFAULT_DEBOUNCE_DELAY_SECS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
