use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;

/// Default landing page. Authentication is completed manually, so this only
/// needs to be somewhere the operator can log in from.
fn default_start_url() -> String {
    "https://www.chase.com".to_string()
}

/// Default downloads directory, relative to the working directory.
fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

/// Default reporting-period label in the activity dialog.
fn default_period_label() -> String {
    "Since last statement".to_string()
}

fn default_before_click() -> Duration {
    Duration::from_millis(500)
}

fn default_after_click() -> Duration {
    Duration::from_secs(1)
}

fn default_after_page_change() -> Duration {
    Duration::from_secs(2)
}

fn default_after_entry_click() -> Duration {
    Duration::from_secs(3)
}

fn default_keyboard() -> Duration {
    Duration::from_millis(500)
}

fn default_probe() -> Duration {
    Duration::from_secs(3)
}

fn default_option_probe() -> Duration {
    Duration::from_secs(2)
}

fn default_indicator() -> Duration {
    Duration::from_secs(1)
}

fn default_ready() -> Duration {
    Duration::from_secs(2)
}

fn default_download() -> Duration {
    Duration::from_secs(20)
}

/// Settle pauses between UI actions.
///
/// The site re-renders after most interactions; these pauses give it room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Pause right before clicking a download control.
    #[serde(deserialize_with = "deserialize_duration")]
    pub before_click: Duration,

    /// Pause after opening a dropdown or committing a selection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub after_click: Duration,

    /// Pause after actions that update the whole page.
    #[serde(deserialize_with = "deserialize_duration")]
    pub after_page_change: Duration,

    /// Pause after the "download account activity" entry button.
    #[serde(deserialize_with = "deserialize_duration")]
    pub after_entry_click: Duration,

    /// Pause between keyboard-navigation key presses.
    #[serde(deserialize_with = "deserialize_duration")]
    pub keyboard: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            before_click: default_before_click(),
            after_click: default_after_click(),
            after_page_change: default_after_page_change(),
            after_entry_click: default_after_entry_click(),
            keyboard: default_keyboard(),
        }
    }
}

/// Bounded waits. Every wait in the flow uses one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Visibility timeout per ladder candidate.
    #[serde(deserialize_with = "deserialize_duration")]
    pub probe: Duration,

    /// Per-candidate timeout when probing dropdown option elements.
    #[serde(deserialize_with = "deserialize_duration")]
    pub option_probe: Duration,

    /// Timeout for purely informational indicator probes.
    #[serde(deserialize_with = "deserialize_duration")]
    pub indicator: Duration,

    /// Timeout for the ready-for-next-account indicator scan.
    #[serde(deserialize_with = "deserialize_duration")]
    pub ready: Duration,

    /// Bound on waiting for the download to materialize after the click.
    #[serde(deserialize_with = "deserialize_duration")]
    pub download: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe: default_probe(),
            option_probe: default_option_probe(),
            indicator: default_indicator(),
            ready: default_ready(),
            download: default_download(),
        }
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit Chrome/Chromium executable. When unset, well-known locations
    /// and `PATH` are searched.
    pub executable: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL opened before the manual-authentication pause.
    #[serde(default = "default_start_url")]
    pub start_url: String,

    /// Where persisted downloads land. Relative paths are resolved from the
    /// working directory; the directory is created on demand.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Reporting-period option to select for every account.
    #[serde(default = "default_period_label")]
    pub period_label: String,

    /// Settle pauses.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Bounded waits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Browser launch settings.
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_url: default_start_url(),
            downloads_dir: default_downloads_dir(),
            period_label: default_period_label(),
            pacing: PacingConfig::default(),
            timeouts: TimeoutConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./ledgerpull.toml` if it exists in the current directory
/// 2. `~/.local/share/ledgerpull/ledgerpull.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("ledgerpull.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("ledgerpull").join("ledgerpull.toml");
    }

    local_config
}
