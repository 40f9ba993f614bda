use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use session_core::SessionSettings;

pub const DEFAULT_SETTINGS_FILE: &str = "desktop.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub profiles_path: PathBuf,
    pub log_filter: String,
    pub fast_poll_ms: u64,
    pub idle_poll_ms: u64,
    pub default_poll_ms: u64,
    pub event_capacity: usize,
    pub simulated_extruders: u32,
    pub simulated_ports: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            profiles_path: default_profiles_path(),
            log_filter: "info".into(),
            fast_poll_ms: session.fast_poll.as_millis() as u64,
            idle_poll_ms: session.idle_poll.as_millis() as u64,
            default_poll_ms: session.default_poll.as_millis() as u64,
            event_capacity: session.notification_capacity,
            simulated_extruders: 1,
            simulated_ports: vec!["/dev/ttyUSB0".into(), "/dev/ttyACM0".into()],
        }
    }
}

impl Settings {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            fast_poll: Duration::from_millis(self.fast_poll_ms.max(1)),
            idle_poll: Duration::from_millis(self.idle_poll_ms.max(1)),
            default_poll: Duration::from_millis(self.default_poll_ms.max(1)),
            notification_capacity: self.event_capacity.max(1),
        }
    }
}

/// Keys accepted in `desktop.toml`. Anything left out keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    profiles_path: Option<PathBuf>,
    log_filter: Option<String>,
    fast_poll_ms: Option<u64>,
    idle_poll_ms: Option<u64>,
    default_poll_ms: Option<u64>,
    event_capacity: Option<usize>,
    simulated_extruders: Option<u32>,
    simulated_ports: Option<Vec<String>>,
}

fn default_profiles_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("printer_desk").join("profiles.toml"))
        .unwrap_or_else(|| PathBuf::from("profiles.toml"))
}

/// Defaults, then the settings file if present, then `APP__*` variables.
///
/// Settings are read before logging is up, so anything skipped comes back
/// as a warning for the caller to log once the subscriber exists.
pub fn load_settings(path: &Path) -> (Settings, Vec<String>) {
    let mut settings = Settings::default();
    let mut warnings = Vec::new();
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw, path, &mut warnings);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok(), &mut warnings);
    (settings, warnings)
}

fn apply_file(settings: &mut Settings, raw: &str, path: &Path, warnings: &mut Vec<String>) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warnings.push(format!(
                "ignoring malformed settings file {}: {err}",
                path.display()
            ));
            return;
        }
    };

    if let Some(v) = file_cfg.profiles_path {
        settings.profiles_path = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.fast_poll_ms {
        settings.fast_poll_ms = v;
    }
    if let Some(v) = file_cfg.idle_poll_ms {
        settings.idle_poll_ms = v;
    }
    if let Some(v) = file_cfg.default_poll_ms {
        settings.default_poll_ms = v;
    }
    if let Some(v) = file_cfg.event_capacity {
        settings.event_capacity = v;
    }
    if let Some(v) = file_cfg.simulated_extruders {
        settings.simulated_extruders = v;
    }
    if let Some(v) = file_cfg.simulated_ports {
        settings.simulated_ports = v;
    }
}

fn apply_env(
    settings: &mut Settings,
    var: impl Fn(&str) -> Option<String>,
    warnings: &mut Vec<String>,
) {
    if let Some(v) = var("APP__PROFILES_PATH") {
        settings.profiles_path = PathBuf::from(v);
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = parsed(&var, "APP__FAST_POLL_MS", warnings) {
        settings.fast_poll_ms = v;
    }
    if let Some(v) = parsed(&var, "APP__IDLE_POLL_MS", warnings) {
        settings.idle_poll_ms = v;
    }
    if let Some(v) = parsed(&var, "APP__DEFAULT_POLL_MS", warnings) {
        settings.default_poll_ms = v;
    }
    if let Some(v) = parsed(&var, "APP__EVENT_CAPACITY", warnings) {
        settings.event_capacity = v;
    }
    if let Some(v) = parsed(&var, "APP__SIMULATED_EXTRUDERS", warnings) {
        settings.simulated_extruders = v;
    }
    if let Some(v) = var("APP__SIMULATED_PORTS") {
        settings.simulated_ports = v
            .split(',')
            .map(str::trim)
            .filter(|port| !port.is_empty())
            .map(str::to_string)
            .collect();
    }
}

fn parsed<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warnings.push(format!("ignoring unparsable environment override {key}={raw}"));
            None
        }
    }
}
