//! Process configuration, read once from the environment at startup.
//!
//! Every variable is optional. Numeric variables that are present but do not
//! parse are a startup error rather than a silent default.

use std::collections::HashMap;

use feedlens_ai::DEFAULT_CLASSIFIER_URL;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_STORE_NAMESPACE: &str = "feedback_pipeline";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    InvalidNumber {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{var} must be one of {allowed}, got {value:?}")]
    InvalidChoice {
        var: &'static str,
        allowed: &'static str,
        value: String,
    },

    #[error("STORE_NAMESPACE must be a plain identifier, got {0:?}")]
    InvalidNamespace(String),

    #[error("BROKER_MODE=redis requires the `redis` feature")]
    RedisFeatureDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerConfig {
    /// No broker; status lookups always read the store.
    Disabled,
    /// In-process queue (dev/test).
    Memory,
    Redis {
        host: String,
        port: u16,
        password: Option<String>,
    },
}

impl BrokerConfig {
    pub fn mode(&self) -> &'static str {
        match self {
            BrokerConfig::Disabled => "disabled",
            BrokerConfig::Memory => "memory",
            BrokerConfig::Redis { .. } => "redis",
        }
    }

    /// `redis://[:password@]host:port`
    pub fn redis_url(&self) -> Option<String> {
        match self {
            BrokerConfig::Redis { host, port, password } => Some(match password {
                Some(pw) => format!("redis://:{pw}@{host}:{port}"),
                None => format!("redis://{host}:{port}"),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Postgres { url: String, namespace: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// `None` disables the external classifier; every submission uses the
    /// local fallback.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub classifier: ClassifierConfig,
    pub max_retries: u32,
    pub enqueue_submissions: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broker: BrokerConfig::Disabled,
            store: StoreConfig::Memory,
            classifier: ClassifierConfig {
                endpoint: Some(DEFAULT_CLASSIFIER_URL.to_string()),
                api_key: None,
            },
            max_retries: DEFAULT_MAX_RETRIES,
            enqueue_submissions: false,
        }
    }
}

impl AppConfig {
    /// Load from the process environment. Loads `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        Self::from_vars(std::env::vars().collect())
    }

    /// Load from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse_number(&get, "PORT", "port number", DEFAULT_PORT)?;

        let default_mode = if cfg!(feature = "redis") { "redis" } else { "disabled" };
        let mode = get("BROKER_MODE").unwrap_or_else(|| default_mode.to_string());
        let broker = match mode.to_ascii_lowercase().as_str() {
            "disabled" | "none" => BrokerConfig::Disabled,
            "memory" => BrokerConfig::Memory,
            "redis" => {
                if !cfg!(feature = "redis") {
                    return Err(ConfigError::RedisFeatureDisabled);
                }
                BrokerConfig::Redis {
                    host: get("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
                    port: parse_number(&get, "REDIS_PORT", "port number", DEFAULT_REDIS_PORT)?,
                    password: get("REDIS_PASSWORD"),
                }
            }
            _ => {
                return Err(ConfigError::InvalidChoice {
                    var: "BROKER_MODE",
                    allowed: "redis, memory, disabled",
                    value: mode,
                });
            }
        };

        let store = match get("STORE_URL") {
            None => StoreConfig::Memory,
            Some(url) => {
                let namespace =
                    get("STORE_NAMESPACE").unwrap_or_else(|| DEFAULT_STORE_NAMESPACE.to_string());
                if !is_identifier(&namespace) {
                    return Err(ConfigError::InvalidNamespace(namespace));
                }
                StoreConfig::Postgres { url, namespace }
            }
        };

        // An explicitly empty AI_API_URL disables the external classifier.
        let endpoint = match vars.get("AI_API_URL") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_CLASSIFIER_URL.to_string()),
        };

        let enqueue_submissions = match get("ENQUEUE_SUBMISSIONS") {
            None => false,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidChoice {
                        var: "ENQUEUE_SUBMISSIONS",
                        allowed: "true, false",
                        value: v,
                    });
                }
            },
        };

        Ok(Self {
            port,
            broker,
            store,
            classifier: ClassifierConfig {
                endpoint,
                api_key: get("AI_API_KEY"),
            },
            max_retries: parse_number(&get, "MAX_RETRIES", "non-negative integer", DEFAULT_MAX_RETRIES)?,
            enqueue_submissions,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, expected, value }),
    }
}

/// Schema names are interpolated into DDL, so only `[A-Za-z_][A-Za-z0-9_]*`.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
