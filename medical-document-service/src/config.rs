use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Settings read once from the environment at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Directory for the file-backed store; in-memory when unset
    pub data_dir: Option<PathBuf>,
    pub step_delay: Duration,
    /// Finished assistant sessions kept readable
    pub max_finished_sessions: usize,
    pub session_idle_timeout: Duration,
    /// YAML script replacing the built-in architecture assistant
    pub script_path: Option<PathBuf>,
    pub remote_source_url: Option<String>,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: None,
            step_delay: review_flow::executor::DEFAULT_STEP_DELAY,
            max_finished_sessions: review_flow::DEFAULT_MAX_FINISHED_SESSIONS,
            session_idle_timeout: review_flow::DEFAULT_IDLE_TIMEOUT,
            script_path: None,
            remote_source_url: None,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?,
            None => defaults.port,
        };

        let step_delay = match get("ASSISTANT_STEP_DELAY_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse::<u64>()
                    .with_context(|| format!("ASSISTANT_STEP_DELAY_MS must be an integer, got '{}'", ms))?,
            ),
            None => defaults.step_delay,
        };

        let max_finished_sessions = match get("ASSISTANT_MAX_FINISHED_SESSIONS") {
            Some(n) => n.parse::<usize>().with_context(|| {
                format!("ASSISTANT_MAX_FINISHED_SESSIONS must be an integer, got '{}'", n)
            })?,
            None => defaults.max_finished_sessions,
        };

        let session_idle_timeout = match get("ASSISTANT_IDLE_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.parse::<u64>().with_context(|| {
                format!("ASSISTANT_IDLE_TIMEOUT_SECS must be an integer, got '{}'", secs)
            })?),
            None => defaults.session_idle_timeout,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => bail!("LOG_FORMAT must be 'json' or 'pretty', got '{}'", other),
        };

        Ok(Self {
            port,
            data_dir: get("DATA_DIR").map(PathBuf::from),
            step_delay,
            max_finished_sessions,
            session_idle_timeout,
            script_path: get("ASSISTANT_SCRIPT").map(PathBuf::from),
            remote_source_url: get("REMOTE_SOURCE_URL"),
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.step_delay, Duration::from_millis(700));
        assert!(config.data_dir.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_finished_sessions, 100);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DATA_DIR", "/var/lib/medical"),
            ("ASSISTANT_STEP_DELAY_MS", "0"),
            ("LOG_FORMAT", "pretty"),
            ("ASSISTANT_MAX_FINISHED_SESSIONS", "10"),
            ("ASSISTANT_IDLE_TIMEOUT_SECS", "60"),
            ("REMOTE_SOURCE_URL", "http://localhost:9000/documents"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/medical")));
        assert!(config.step_delay.is_zero());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.max_finished_sessions, 10);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(60));
        assert_eq!(
            config.remote_source_url.as_deref(),
            Some("http://localhost:9000/documents")
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("ASSISTANT_STEP_DELAY_MS", "-5")]).is_err());
        assert!(config_from(&[("LOG_FORMAT", "xml")]).is_err());
        assert!(config_from(&[("ASSISTANT_IDLE_TIMEOUT_SECS", "soon")]).is_err());
    }
}
