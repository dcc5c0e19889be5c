use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub automation: AutomationConfig,
    pub idempotency: IdempotencyConfig,
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
    pub graceful_shutdown_secs: u64,
}

/// Default windows for the rule scanners. Each scanner also accepts a
/// per-invocation override.
#[derive(Clone, Copy, Debug)]
pub struct AutomationConfig {
    pub quote_followup_days: i64,
    pub task_reminder_days: i64,
    pub feedback_days: i64,
    pub commission_days: i64,
    pub payment_deadline_hours: i64,
    pub travel_readiness_hours: i64,
    pub deadline_task_lead_days: i64,
}

#[derive(Clone, Copy, Debug)]
pub struct IdempotencyConfig {
    pub ttl_secs: i64,
    pub sweep_interval_secs: u64,
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
                url: "sqlite://tripflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            automation: AutomationConfig {
                quote_followup_days: 3,
                task_reminder_days: 7,
                feedback_days: 7,
                commission_days: 30,
                payment_deadline_hours: 48,
                travel_readiness_hours: 48,
                deadline_task_lead_days: 14,
            },
            idempotency: IdempotencyConfig { ttl_secs: 300, sweep_interval_secs: 60 },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tripflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
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
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(automation) = patch.automation {
            if let Some(days) = automation.quote_followup_days {
                self.automation.quote_followup_days = days;
            }
            if let Some(days) = automation.task_reminder_days {
                self.automation.task_reminder_days = days;
            }
            if let Some(days) = automation.feedback_days {
                self.automation.feedback_days = days;
            }
            if let Some(days) = automation.commission_days {
                self.automation.commission_days = days;
            }
            if let Some(hours) = automation.payment_deadline_hours {
                self.automation.payment_deadline_hours = hours;
            }
            if let Some(hours) = automation.travel_readiness_hours {
                self.automation.travel_readiness_hours = hours;
            }
            if let Some(days) = automation.deadline_task_lead_days {
                self.automation.deadline_task_lead_days = days;
            }
        }

        if let Some(idempotency) = patch.idempotency {
            if let Some(ttl_secs) = idempotency.ttl_secs {
                self.idempotency.ttl_secs = ttl_secs;
            }
            if let Some(sweep_interval_secs) = idempotency.sweep_interval_secs {
                self.idempotency.sweep_interval_secs = sweep_interval_secs;
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
        if let Some(value) = read_env("TRIPFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRIPFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TRIPFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TRIPFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIPFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRIPFLOW_SERVER_PORT") {
            self.server.port = parse_u16("TRIPFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TRIPFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_QUOTE_FOLLOWUP_DAYS") {
            self.automation.quote_followup_days =
                parse_i64("TRIPFLOW_AUTOMATION_QUOTE_FOLLOWUP_DAYS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_TASK_REMINDER_DAYS") {
            self.automation.task_reminder_days =
                parse_i64("TRIPFLOW_AUTOMATION_TASK_REMINDER_DAYS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_FEEDBACK_DAYS") {
            self.automation.feedback_days = parse_i64("TRIPFLOW_AUTOMATION_FEEDBACK_DAYS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_COMMISSION_DAYS") {
            self.automation.commission_days =
                parse_i64("TRIPFLOW_AUTOMATION_COMMISSION_DAYS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_PAYMENT_DEADLINE_HOURS") {
            self.automation.payment_deadline_hours =
                parse_i64("TRIPFLOW_AUTOMATION_PAYMENT_DEADLINE_HOURS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_TRAVEL_READINESS_HOURS") {
            self.automation.travel_readiness_hours =
                parse_i64("TRIPFLOW_AUTOMATION_TRAVEL_READINESS_HOURS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_AUTOMATION_DEADLINE_TASK_LEAD_DAYS") {
            self.automation.deadline_task_lead_days =
                parse_i64("TRIPFLOW_AUTOMATION_DEADLINE_TASK_LEAD_DAYS", &value)?;
        }

        if let Some(value) = read_env("TRIPFLOW_IDEMPOTENCY_TTL_SECS") {
            self.idempotency.ttl_secs = parse_i64("TRIPFLOW_IDEMPOTENCY_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIPFLOW_IDEMPOTENCY_SWEEP_INTERVAL_SECS") {
            self.idempotency.sweep_interval_secs =
                parse_u64("TRIPFLOW_IDEMPOTENCY_SWEEP_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("TRIPFLOW_LOGGING_LEVEL").or_else(|| read_env("TRIPFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRIPFLOW_LOGGING_FORMAT").or_else(|| read_env("TRIPFLOW_LOG_FORMAT"));
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
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_automation(&self.automation)?;
        validate_idempotency(&self.idempotency)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tripflow.toml"), PathBuf::from("config/tripflow.toml")]
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
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_automation(automation: &AutomationConfig) -> Result<(), ConfigError> {
    let day_windows = [
        ("automation.quote_followup_days", automation.quote_followup_days),
        ("automation.task_reminder_days", automation.task_reminder_days),
        ("automation.feedback_days", automation.feedback_days),
        ("automation.commission_days", automation.commission_days),
        ("automation.deadline_task_lead_days", automation.deadline_task_lead_days),
    ];
    for (key, value) in day_windows {
        if !(1..=365).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range 1..=365")));
        }
    }

    let hour_windows = [
        ("automation.payment_deadline_hours", automation.payment_deadline_hours),
        ("automation.travel_readiness_hours", automation.travel_readiness_hours),
    ];
    for (key, value) in hour_windows {
        if !(1..=24 * 30).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range 1..=720")));
        }
    }

    Ok(())
}

fn validate_idempotency(idempotency: &IdempotencyConfig) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&idempotency.ttl_secs) {
        return Err(ConfigError::Validation(
            "idempotency.ttl_secs must be in range 1..=3600".to_string(),
        ));
    }
    if idempotency.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "idempotency.sweep_interval_secs must be greater than zero".to_string(),
        ));
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

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    automation: Option<AutomationPatch>,
    idempotency: Option<IdempotencyPatch>,
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
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AutomationPatch {
    quote_followup_days: Option<i64>,
    task_reminder_days: Option<i64>,
    feedback_days: Option<i64>,
    commission_days: Option<i64>,
    payment_deadline_hours: Option<i64>,
    travel_readiness_hours: Option<i64>,
    deadline_task_lead_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct IdempotencyPatch {
    ttl_secs: Option<i64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
