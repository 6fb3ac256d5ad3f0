use std::{path::PathBuf, time::Duration};

/// Files older than this are removed by the retention sweep.
pub const RETENTION: Duration = Duration::from_secs(10 * 24 * 60 * 60);
/// Delay between two sweep passes.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
const DEFAULT_STATS_PATH: &str = "data/stats.json";
const DEFAULT_YT_DLP: &str = "yt-dlp";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub downloads_dir: PathBuf,
    pub stats_path: PathBuf,
    pub yt_dlp_path: PathBuf,
    pub trust_proxy_headers: bool,
    pub retention: Duration,
    pub sweep_period: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: resolve_bind_addr(),
            downloads_dir: read_path_env("DOWNLOADS_DIR", DEFAULT_DOWNLOADS_DIR),
            stats_path: read_path_env("STATS_PATH", DEFAULT_STATS_PATH),
            yt_dlp_path: read_path_env("YT_DLP_PATH", DEFAULT_YT_DLP),
            trust_proxy_headers: read_bool_env("TRUST_PROXY_HEADERS").unwrap_or(false),
            retention: RETENTION,
            sweep_period: SWEEP_PERIOD,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            stats_path: PathBuf::from(DEFAULT_STATS_PATH),
            yt_dlp_path: PathBuf::from(DEFAULT_YT_DLP),
            trust_proxy_headers: false,
            retention: RETENTION,
            sweep_period: SWEEP_PERIOD,
        }
    }
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_ADDR.to_string()
}

fn read_path_env(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .ok()
        .and_then(|value| non_empty(&value).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

fn read_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_bool(&value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn default_config_uses_fixed_retention_window() {
        let config = Config::default();
        assert_eq!(config.retention, Duration::from_secs(864_000));
        assert_eq!(config.sweep_period, Duration::from_secs(86_400));
        assert_eq!(config.bind_addr, "127.0.0.1:5000");
    }
}
