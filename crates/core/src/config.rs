use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LEAD_WEBHOOK_URL: &str =
    "https://n8n.aibotclip.app/webhook/Contact_Us_Aibotclip";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub lead_webhook: LeadWebhookConfig,
    pub auth: AuthConfig,
    pub site: SiteConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LeadWebhookConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Sent as `x-agentmart-webhook-secret` when present.
    pub secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub session_ttl_hours: u32,
    pub cookie_secure: bool,
}

#[derive(Clone, Debug)]
pub struct SiteConfig {
    pub brand_name: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub lead_webhook_url: Option<String>,
    pub lead_webhook_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://agentmart.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            lead_webhook: LeadWebhookConfig {
                url: DEFAULT_LEAD_WEBHOOK_URL.to_string(),
                timeout_secs: 10,
                secret: None,
            },
            auth: AuthConfig { session_ttl_hours: 24, cookie_secure: false },
            site: SiteConfig { brand_name: "Aibotclip".to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("agentmart.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Effective configuration as JSON with secrets replaced by a marker.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "database": {
                "url": self.database.url,
                "max_connections": self.database.max_connections,
                "timeout_secs": self.database.timeout_secs,
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "health_check_port": self.server.health_check_port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "lead_webhook": {
                "url": self.lead_webhook.url,
                "timeout_secs": self.lead_webhook.timeout_secs,
                "secret": self.lead_webhook.secret.as_ref().map(|_| "[redacted]"),
            },
            "auth": {
                "session_ttl_hours": self.auth.session_ttl_hours,
                "cookie_secure": self.auth.cookie_secure,
            },
            "site": { "brand_name": self.site.brand_name },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(lead_webhook) = patch.lead_webhook {
            if let Some(url) = lead_webhook.url {
                self.lead_webhook.url = url;
            }
            if let Some(timeout_secs) = lead_webhook.timeout_secs {
                self.lead_webhook.timeout_secs = timeout_secs;
            }
            if let Some(secret) = lead_webhook.secret {
                self.lead_webhook.secret = Some(secret.into());
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(session_ttl_hours) = auth.session_ttl_hours {
                self.auth.session_ttl_hours = session_ttl_hours;
            }
            if let Some(cookie_secure) = auth.cookie_secure {
                self.auth.cookie_secure = cookie_secure;
            }
        }

        if let Some(site) = patch.site {
            if let Some(brand_name) = site.brand_name {
                self.site.brand_name = brand_name;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AGENTMART_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AGENTMART_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("AGENTMART_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AGENTMART_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTMART_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AGENTMART_SERVER_PORT") {
            self.server.port = parse_u16("AGENTMART_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("AGENTMART_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AGENTMART_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTMART_LEAD_WEBHOOK_URL") {
            self.lead_webhook.url = value;
        }
        if let Some(value) = read_env("AGENTMART_LEAD_WEBHOOK_TIMEOUT_SECS") {
            self.lead_webhook.timeout_secs =
                parse_u64("AGENTMART_LEAD_WEBHOOK_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_LEAD_WEBHOOK_SECRET") {
            self.lead_webhook.secret = Some(value.into());
        }

        if let Some(value) = read_env("AGENTMART_AUTH_SESSION_TTL_HOURS") {
            self.auth.session_ttl_hours = parse_u32("AGENTMART_AUTH_SESSION_TTL_HOURS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_AUTH_COOKIE_SECURE") {
            self.auth.cookie_secure = parse_bool("AGENTMART_AUTH_COOKIE_SECURE", &value)?;
        }

        if let Some(value) = read_env("AGENTMART_SITE_BRAND_NAME") {
            self.site.brand_name = value;
        }

        let log_level =
            read_env("AGENTMART_LOGGING_LEVEL").or_else(|| read_env("AGENTMART_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGENTMART_LOGGING_FORMAT").or_else(|| read_env("AGENTMART_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(url) = overrides.lead_webhook_url {
            self.lead_webhook.url = url;
        }
        if let Some(secret) = overrides.lead_webhook_secret {
            self.lead_webhook.secret = Some(secret.into());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_lead_webhook(&self.lead_webhook)?;
        validate_auth(&self.auth)?;
        validate_site(&self.site)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("agentmart.toml"), PathBuf::from("config/agentmart.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(format!(
            "server.port and server.health_check_port must differ (both are {})",
            server.port
        )));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_lead_webhook(lead_webhook: &LeadWebhookConfig) -> Result<(), ConfigError> {
    let url = lead_webhook.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "lead_webhook.url must start with http:// or https://".to_string(),
        ));
    }

    if lead_webhook.timeout_secs == 0 || lead_webhook.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "lead_webhook.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    let blank_secret = lead_webhook
        .secret
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if blank_secret {
        return Err(ConfigError::Validation(
            "lead_webhook.secret must not be blank when set; remove it to disable signing"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    if auth.session_ttl_hours == 0 || auth.session_ttl_hours > 24 * 30 {
        return Err(ConfigError::Validation(
            "auth.session_ttl_hours must be in range 1..=720".to_string(),
        ));
    }
    Ok(())
}

fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.brand_name.trim().is_empty() {
        return Err(ConfigError::Validation("site.brand_name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    lead_webhook: Option<LeadWebhookPatch>,
    auth: Option<AuthPatch>,
    site: Option<SitePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LeadWebhookPatch {
    url: Option<String>,
    timeout_secs: Option<u64>,
    secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    session_ttl_hours: Option<u32>,
    cookie_secure: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SitePatch {
    brand_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
