// src/config.rs
use crate::batch::orchestrator::DEFAULT_DELAY_MS;
use crate::loader::client::DEFAULT_TIMEOUT_MS;
use crate::loader::LoadOptions;
use crate::utils::AppError;
use std::path::PathBuf;

pub const DEFAULT_PROXY_URL: &str = "http://localhost:3000/api/proxy";
pub const DEFAULT_RELAY_URL: &str = "https://api.allorigins.win/get";
pub const DEFAULT_STORE_DIR: &str = "./.selector_scraper";

/// Runtime settings. Defaults, then `SCRAPER_*` environment variables, then CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    pub proxy_url: String,
    pub relay_url: String,
    pub remote_url: Option<String>,
    pub timeout_ms: u64,
    pub javascript: bool,
    pub delay_ms: u64,
    pub store_dir: PathBuf,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            remote_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            javascript: true,
            delay_ms: DEFAULT_DELAY_MS,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

impl ScraperConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("SCRAPER_PROXY_URL") {
            config.proxy_url = v;
        }
        if let Some(v) = get("SCRAPER_RELAY_URL") {
            config.relay_url = v;
        }
        config.remote_url = get("SCRAPER_REMOTE_URL");
        if let Some(v) = get("SCRAPER_TIMEOUT_MS") {
            config.timeout_ms = parse_number("SCRAPER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("SCRAPER_DELAY_MS") {
            config.delay_ms = parse_number("SCRAPER_DELAY_MS", &v)?;
        }
        if let Some(v) = get("SCRAPER_JAVASCRIPT") {
            config.javascript = !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(v) = get("SCRAPER_STORE_DIR") {
            config.store_dir = PathBuf::from(v);
        }
        tracing::debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            javascript_enabled: self.javascript,
            timeout_ms: self.timeout_ms,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ScraperConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ScraperConfig::default());
        assert_eq!(config.load_options(), LoadOptions::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ScraperConfig::from_lookup(lookup(&[
            ("SCRAPER_PROXY_URL", "http://proxy.local/api"),
            ("SCRAPER_REMOTE_URL", " http://remote.local/scrape "),
            ("SCRAPER_TIMEOUT_MS", "5000"),
            ("SCRAPER_JAVASCRIPT", "off"),
            ("SCRAPER_DELAY_MS", ""),
        ]))
        .unwrap();
        assert_eq!(config.proxy_url, "http://proxy.local/api");
        assert_eq!(config.remote_url.as_deref(), Some("http://remote.local/scrape"));
        assert_eq!(config.timeout_ms, 5000);
        assert!(!config.javascript);
        assert_eq!(config.delay_ms, DEFAULT_DELAY_MS);
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = ScraperConfig::from_lookup(lookup(&[("SCRAPER_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
