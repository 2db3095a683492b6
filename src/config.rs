use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::gemini::{DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL};
use crate::github::DEFAULT_GITHUB_API_BASE;
use crate::imaging::PreprocessOptions;
use crate::models::StyleOption;

/// Process configuration, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` means demo mode.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub gemini_timeout: Duration,
    pub github_api_base: String,
    pub styles: Vec<StyleOption>,
    pub preprocess: PreprocessOptions,
    pub max_upload_bytes: usize,
    /// Sessions untouched for this long are dropped, cached credentials included.
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_timeout: Duration::from_secs(120),
            github_api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            styles: StyleOption::defaults(),
            preprocess: PreprocessOptions::default(),
            max_upload_bytes: 50 * 1024 * 1024,
            session_idle_ttl: Duration::from_secs(60 * 60),
            session_sweep_interval: Duration::from_secs(60),
            port: 8080,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        let styles = lookup("LUMINA_STYLES")
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(StyleOption::new).collect::<Vec<_>>())
            .filter(|styles| !styles.is_empty())
            .unwrap_or(defaults.styles);

        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            gemini_api_base: text("GEMINI_API_BASE", defaults.gemini_api_base),
            gemini_model: text("GEMINI_MODEL", defaults.gemini_model),
            gemini_timeout: Duration::from_secs(parsed(&lookup, "GEMINI_TIMEOUT_SECS", 120u64)?),
            github_api_base: text("GITHUB_API_BASE", defaults.github_api_base),
            styles,
            preprocess: defaults.preprocess,
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            session_idle_ttl: Duration::from_secs(parsed(&lookup, "SESSION_IDLE_TTL_SECS", defaults.session_idle_ttl.as_secs())?),
            session_sweep_interval: Duration::from_secs(parsed(&lookup, "SESSION_SWEEP_SECS", defaults.session_sweep_interval.as_secs())?.max(1)),
            port: parsed(&lookup, "PORT", defaults.port)?,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        _ => Ok(default),
    }
}
