use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_WATERMARK_TEXT: &str = "©PnC";
const SETTINGS_FILE: &str = "gateway.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Compiled/environment default; a persisted value overrides it at startup.
    pub api_base_url: String,
    pub poll_interval: Duration,
    /// Whether the background poller also refreshes the session status.
    pub poll_session: bool,
    /// Overrides the default location of the persisted settings file.
    pub settings_path: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_session: true,
            settings_path: None,
        }
    }
}

pub fn load_settings() -> ClientSettings {
    let file_cfg = fs::read_to_string(SETTINGS_FILE)
        .ok()
        .and_then(|raw| match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(file = SETTINGS_FILE, error = %err, "ignoring unparsable settings file");
                None
            }
        })
        .unwrap_or_default();

    let env: HashMap<String, String> = std::env::vars().collect();
    settings_from_sources(&file_cfg, &env)
}

/// Layers defaults, file values, then environment values. Invalid values are
/// skipped and the lower layer kept.
pub fn settings_from_sources(
    file_cfg: &HashMap<String, toml::Value>,
    env: &HashMap<String, String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("poll_interval_secs")
        .and_then(toml::Value::as_integer)
    {
        if v > 0 {
            settings.poll_interval = Duration::from_secs(v as u64);
        }
    }
    if let Some(v) = file_cfg.get("poll_session").and_then(toml::Value::as_bool) {
        settings.poll_session = v;
    }
    if let Some(v) = file_cfg.get("settings_path").and_then(toml::Value::as_str) {
        settings.settings_path = Some(PathBuf::from(v));
    }

    let non_empty = |name: &str| env.get(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("API_BASE_URL") {
        settings.api_base_url = v.trim().to_string();
    }
    if let Some(v) = non_empty("GATEWAY_API_BASE_URL") {
        settings.api_base_url = v.trim().to_string();
    }
    if let Some(v) = non_empty("GATEWAY_POLL_INTERVAL_SECS") {
        match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => settings.poll_interval = Duration::from_secs(secs),
            _ => warn!(value = %v, "ignoring invalid GATEWAY_POLL_INTERVAL_SECS"),
        }
    }
    if let Some(v) = non_empty("GATEWAY_POLL_SESSION") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => settings.poll_session = true,
            "0" | "false" | "no" => settings.poll_session = false,
            _ => warn!(value = %v, "ignoring invalid GATEWAY_POLL_SESSION"),
        }
    }
    if let Some(v) = non_empty("GATEWAY_SETTINGS_PATH") {
        settings.settings_path = Some(PathBuf::from(v.trim()));
    }

    settings
}
