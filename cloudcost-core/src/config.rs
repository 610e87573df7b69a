use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::engine::shapes::ResponseShape;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudCostConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub rating: RatingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Keystone v3 credentials, named after the `OS_*` variables they mirror.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub auth_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_domain")]
    pub user_domain: String,

    #[serde(default = "default_domain")]
    pub project_domain: String,

    #[serde(default)]
    pub project_name: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub region_name: Option<String>,

    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_true")]
    pub verify_tls: bool,

    #[serde(default = "default_true")]
    pub verify_project: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Rating service base URL. Overrides the service catalog.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Pre-issued token. Together with `endpoint` it replaces identity auth.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_resolver_timeout")]
    pub resolver_timeout_secs: u64,

    /// Response shape ids in the order they are tried.
    #[serde(default = "default_shapes")]
    pub shapes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_permissive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

fn default_domain() -> String {
    "Default".to_string()
}

fn default_interface() -> String {
    "public".to_string()
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Upper limit for either timeout setting.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

fn default_attempt_timeout() -> u64 {
    20
}

fn default_resolver_timeout() -> u64 {
    15
}

fn default_shapes() -> Vec<String> {
    ResponseShape::PRIORITY
        .iter()
        .map(|s| s.id().to_string())
        .collect()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            auth_url: None,
            username: None,
            password: None,
            user_domain: default_domain(),
            project_domain: default_domain(),
            project_name: None,
            project_id: None,
            region_name: None,
            interface: default_interface(),
            verify_tls: true,
            verify_project: true,
        }
    }
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            default_currency: default_currency(),
            attempt_timeout_secs: default_attempt_timeout(),
            resolver_timeout_secs: default_resolver_timeout(),
            shapes: default_shapes(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "***")
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("user_domain", &self.user_domain)
            .field("project_domain", &self.project_domain)
            .field("project_name", &self.project_name)
            .field("project_id", &self.project_id)
            .field("region_name", &self.region_name)
            .field("interface", &self.interface)
            .field("verify_tls", &self.verify_tls)
            .field("verify_project", &self.verify_project)
            .finish()
    }
}

impl fmt::Debug for RatingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatingConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &redact(&self.token))
            .field("default_currency", &self.default_currency)
            .field("attempt_timeout_secs", &self.attempt_timeout_secs)
            .field("resolver_timeout_secs", &self.resolver_timeout_secs)
            .field("shapes", &self.shapes)
            .finish()
    }
}

impl RatingConfig {
    /// True when a fixed endpoint and token replace identity authentication.
    pub fn uses_static_token(&self) -> bool {
        is_set(&self.endpoint) && is_set(&self.token)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver_timeout_secs)
    }

    /// The configured shape order, parsed.
    pub fn response_shapes(&self) -> Result<Vec<ResponseShape>, ConfigLoadError> {
        if self.shapes.is_empty() {
            return Err(ConfigLoadError::InvalidValue {
                key: "rating.shapes".to_string(),
                message: "At least one response shape is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        self.shapes
            .iter()
            .map(|id| {
                let shape = id
                    .parse::<ResponseShape>()
                    .map_err(|e| ConfigLoadError::InvalidValue {
                        key: "rating.shapes".to_string(),
                        message: e.to_string(),
                    })?;
                if !seen.insert(shape) {
                    return Err(ConfigLoadError::InvalidValue {
                        key: "rating.shapes".to_string(),
                        message: format!("Shape '{}' is listed more than once", shape),
                    });
                }
                Ok(shape)
            })
            .collect()
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl CloudCostConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        let config = Self::load_unvalidated(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads every layer without validating, for display and diagnostics.
    pub fn load_unvalidated(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CLOUDCOST")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("rating.shapes")
                .try_parsing(true),
        );

        let mut config: CloudCostConfig = builder.build()?.try_deserialize()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Applies the conventional OpenStack and CloudKitty variables on top of
    /// file and prefixed-environment settings. Empty values count as unset.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let identity = &mut self.identity;
        if let Some(v) = get("OS_AUTH_URL") {
            identity.auth_url = Some(v);
        }
        if let Some(v) = get("OS_USERNAME") {
            identity.username = Some(v);
        }
        if let Some(v) = get("OS_PASSWORD") {
            identity.password = Some(v);
        }
        if let Some(v) = get("OS_USER_DOMAIN_NAME") {
            identity.user_domain = v;
        }
        if let Some(v) = get("OS_PROJECT_DOMAIN_NAME") {
            identity.project_domain = v;
        }
        if let Some(v) = get("OS_PROJECT_NAME") {
            identity.project_name = Some(v);
        }
        if let Some(v) = get("OS_PROJECT_ID") {
            identity.project_id = Some(v);
        }
        if let Some(v) = get("OS_REGION_NAME") {
            identity.region_name = Some(v);
        }
        if let Some(v) = get("OS_INTERFACE") {
            identity.interface = v;
        }
        if let Some(v) = get("OS_VERIFY") {
            identity.verify_tls = !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no");
        }

        if let Some(v) = get("CLOUDKITTY_ENDPOINT") {
            self.rating.endpoint = Some(v);
        }
        if let Some(v) = get("CLOUDKITTY_TOKEN") {
            self.rating.token = Some(v);
        }
        if let Some(v) = get("CLOUDKITTY_CURRENCY") {
            self.rating.default_currency = v;
        }

        if let Some(v) = get("PORT") {
            self.server.port = v.trim().parse().map_err(|_| ConfigLoadError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("'{}' is not a valid port", v),
            })?;
        }

        if let Some(level) = get("CLOUDCOST_LOG_LEVEL").or_else(|| get("RUST_LOG")) {
            self.logging.level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.rating.default_currency.trim().is_empty() {
            return Err(ConfigLoadError::MissingRequired(
                "rating.default_currency".to_string(),
            ));
        }

        if !(1..=MAX_TIMEOUT_SECS).contains(&self.rating.attempt_timeout_secs) {
            return Err(ConfigLoadError::InvalidValue {
                key: "rating.attempt_timeout_secs".to_string(),
                message: format!("Must be between 1 and {}", MAX_TIMEOUT_SECS),
            });
        }

        if !(1..=MAX_TIMEOUT_SECS).contains(&self.rating.resolver_timeout_secs) {
            return Err(ConfigLoadError::InvalidValue {
                key: "rating.resolver_timeout_secs".to_string(),
                message: format!("Must be between 1 and {}", MAX_TIMEOUT_SECS),
            });
        }

        if self.server.port == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "server.port".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        self.rating.response_shapes()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        if !self.rating.uses_static_token() && !is_set(&self.identity.auth_url) {
            return Err(ConfigLoadError::MissingRequired(
                "identity.auth_url (OS_AUTH_URL), or rating.endpoint and rating.token".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.identity.password.is_some() {
            copy.identity.password = Some("***".to_string());
        }
        if copy.rating.token.is_some() {
            copy.rating.token = Some("***".to_string());
        }
        copy
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("cloudcost.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("cloudcost").join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let env_paths = get_dotenv_paths();

    for path in env_paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

fn get_dotenv_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("cloudcost").join(".env"));
    }

    paths
}

/// Files consulted by [`CloudCostConfig::load`], in increasing precedence.
pub fn config_search_paths() -> Vec<PathBuf> {
    get_config_paths()
}
