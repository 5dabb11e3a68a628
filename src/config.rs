use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "TENMON-ARK";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Special database path that selects the in-memory stores.
pub const IN_MEMORY_DB: &str = ":memory:";

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_RATE_LIMIT: u32 = 60;
const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
const DEFAULT_STATE_TTL_SECS: u64 = 3_600;
const DEFAULT_STATE_CAPACITY: usize = 10_000;

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "tenmon_ark_lib=info,tenmon_ark=info,tower_http=warn"
}

/// Get the application data directory
/// ~/TenmonArk/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("TenmonArk")
}

/// Directory holding the `*_law_candidates.jsonl` and `*_text.jsonl` corpora.
pub fn default_corpus_dir() -> PathBuf {
    app_data_dir().join("corpus")
}

/// Default SQLite file for session memory, conversation log and audit log.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("tenmon.db")
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Credentials and endpoint for the external LLM collaborator.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub corpus_dir: PathBuf,
    /// `None` selects the in-memory session store.
    pub db_path: Option<PathBuf>,
    /// `None` disables LLM chat; general chat falls back to templates.
    pub llm: Option<LlmConfig>,
    pub llm_timeout: Duration,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub state_ttl: Duration,
    pub state_capacity: usize,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            corpus_dir: default_corpus_dir(),
            db_path: None,
            llm: None,
            llm_timeout: Duration::from_millis(DEFAULT_LLM_TIMEOUT_MS),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            state_ttl: Duration::from_secs(DEFAULT_STATE_TTL_SECS),
            state_capacity: DEFAULT_STATE_CAPACITY,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("TENMON_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            var: "TENMON_BIND",
            value: bind_raw.clone(),
        })?;

        let corpus_dir = get("TENMON_CORPUS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_corpus_dir);

        let db_path = match get("TENMON_DB_PATH") {
            Some(p) if p == IN_MEMORY_DB => None,
            Some(p) => Some(PathBuf::from(p)),
            None => Some(default_db_path()),
        };

        let llm_timeout = Duration::from_millis(parse_or(
            &get,
            "TENMON_LLM_TIMEOUT_MS",
            DEFAULT_LLM_TIMEOUT_MS,
        )?);

        let llm = get("TENMON_LLM_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .map(|api_key| LlmConfig {
                api_key,
                base_url: get("TENMON_LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: get("TENMON_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                timeout: llm_timeout,
            });

        let cors_origins = get("TENMON_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind,
            corpus_dir,
            db_path,
            llm,
            llm_timeout,
            rate_limit: parse_or(&get, "TENMON_RATE_LIMIT", DEFAULT_RATE_LIMIT)?,
            rate_window: Duration::from_secs(parse_or(
                &get,
                "TENMON_RATE_WINDOW_SECS",
                DEFAULT_RATE_WINDOW_SECS,
            )?),
            state_ttl: Duration::from_secs(parse_or(
                &get,
                "TENMON_STATE_TTL_SECS",
                DEFAULT_STATE_TTL_SECS,
            )?),
            state_capacity: parse_or(&get, "TENMON_STATE_CAPACITY", DEFAULT_STATE_CAPACITY)?,
            cors_origins,
        })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_folder() {
        assert!(app_data_dir().ends_with("TenmonArk"));
        assert!(default_corpus_dir().starts_with(app_data_dir()));
    }

    #[test]
    fn app_name_is_tenmon_ark() {
        assert_eq!(APP_NAME, "TENMON-ARK");
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind.to_string(), "127.0.0.1:3000");
        assert!(config.llm.is_none());
        assert_eq!(config.rate_limit, 60);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.db_path, Some(default_db_path()));
    }

    #[test]
    fn memory_db_path_selects_in_memory_store() {
        let config =
            ServerConfig::from_lookup(lookup_from(&[("TENMON_DB_PATH", ":memory:")])).unwrap();
        assert!(config.db_path.is_none());
    }

    #[test]
    fn llm_enabled_by_api_key() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("TENMON_LLM_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();
        let llm = config.llm.unwrap();
        assert_eq!(llm.api_key, "sk-test");
        assert_eq!(llm.base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(llm.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = ServerConfig::from_lookup(lookup_from(&[("TENMON_RATE_LIMIT", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "TENMON_RATE_LIMIT",
                value: "lots".into()
            }
        );
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = ServerConfig::from_lookup(lookup_from(&[(
            "TENMON_CORS_ORIGINS",
            "https://a.example, https://b.example,",
        )]))
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
