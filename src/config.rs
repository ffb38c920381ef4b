//! Server configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

/// Which browser engine to launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(Self::Chromium),
            "firefox" => Some(Self::Firefox),
            "webkit" => Some(Self::Webkit),
            _ => None,
        }
    }
}

/// Runtime configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory searched for build manifests (stats.json / manifest.json)
    pub project_root: PathBuf,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Maximum concurrent page sessions
    pub max_sessions: usize,
    /// How long acquisition may wait for a pool slot
    pub queue_timeout: Duration,
    pub navigation_timeout: Duration,
    /// Quiet period after `load` during which collectors accumulate events
    pub settle: Duration,
    pub tool_timeout: Duration,
    /// Serialized output character budget per tool call
    pub output_cap: usize,
    /// Per-response body capture cap in bytes
    pub body_cap: usize,
    /// Header names (lowercase) redacted before storage
    pub redact_headers: Vec<String>,
    /// Explicit bundler override when both manifests exist
    pub bundler_override: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            browser: BrowserKind::Chromium,
            headless: true,
            max_sessions: 4,
            queue_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(3),
            tool_timeout: Duration::from_secs(30),
            output_cap: 25_000,
            body_cap: 256 * 1024,
            redact_headers: default_redact_list(),
            bundler_override: None,
        }
    }
}

fn default_redact_list() -> Vec<String> {
    [
        "authorization",
        "cookie",
        "set-cookie",
        "proxy-authorization",
        "x-api-key",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Read configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let browser = std::env::var("BROWSER")
            .ok()
            .and_then(|v| {
                let parsed = BrowserKind::parse(&v);
                if parsed.is_none() {
                    tracing::warn!(value = %v, "Unrecognized BROWSER value, using chromium");
                }
                parsed
            })
            .unwrap_or(BrowserKind::Chromium);

        let headless = std::env::var("HEADLESS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        let redact_headers = std::env::var("PAGESCOPE_REDACT_HEADERS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(default_redact_list);

        Self {
            project_root: std::env::var("PROJECT_ROOT")
                .map_or(defaults.project_root, PathBuf::from),
            browser,
            headless,
            max_sessions: env_usize("PAGESCOPE_MAX_SESSIONS", defaults.max_sessions),
            queue_timeout: env_duration_ms("PAGESCOPE_QUEUE_TIMEOUT_MS", defaults.queue_timeout),
            navigation_timeout: env_duration_ms(
                "PAGESCOPE_NAV_TIMEOUT_MS",
                defaults.navigation_timeout,
            ),
            settle: env_duration_ms("PAGESCOPE_SETTLE_MS", defaults.settle),
            tool_timeout: env_duration_ms("PAGESCOPE_TOOL_TIMEOUT_MS", defaults.tool_timeout),
            output_cap: env_usize("PAGESCOPE_OUTPUT_CAP", defaults.output_cap),
            body_cap: env_usize("PAGESCOPE_BODY_CAP", defaults.body_cap),
            redact_headers,
            bundler_override: std::env::var("BUNDLER").ok().map(|v| v.to_ascii_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = Config::default();
        assert_eq!(c.max_sessions, 4);
        assert_eq!(c.navigation_timeout, Duration::from_secs(30));
        assert_eq!(c.output_cap, 25_000);
        assert_eq!(c.body_cap, 256 * 1024);
        assert!(c.redact_headers.contains(&"authorization".to_string()));
    }

    #[test]
    fn browser_kind_parses_aliases() {
        assert_eq!(BrowserKind::parse("Chrome"), Some(BrowserKind::Chromium));
        assert_eq!(BrowserKind::parse("FIREFOX"), Some(BrowserKind::Firefox));
        assert_eq!(BrowserKind::parse("safari"), None);
    }
}
