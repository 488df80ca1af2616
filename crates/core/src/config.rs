use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hierarchy::mutator::{MoveRules, DEFAULT_MAX_DEPTH};
use crate::nps::{NpsSettings, MAX_SCORE};
use crate::workflow::{ApprovalLevels, WorkflowRules, DEFAULT_MIN_COMMENT_CHARS};

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub hierarchy: HierarchyConfig,
    pub workflow: WorkflowConfig,
    pub nps: NpsConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, Serialize)]
pub struct HierarchyConfig {
    pub max_depth: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub key: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkflowConfig {
    pub levels: Vec<LevelConfig>,
    pub min_comment_chars: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct NpsConfig {
    pub auto_trigger_enabled: bool,
    pub default_delay_minutes: u32,
    pub detractor_alert_enabled: bool,
    pub detractor_threshold: u8,
    pub survey_expiration_days: u32,
    /// Seconds between background trigger sweeps in the server; zero disables it.
    pub poll_interval_secs: u64,
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
    pub log_format: Option<LogFormat>,
    pub server_port: Option<u16>,
    pub nps_poll_interval_secs: Option<u64>,
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
        let nps = NpsSettings::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://orgflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            hierarchy: HierarchyConfig { max_depth: DEFAULT_MAX_DEPTH },
            workflow: WorkflowConfig {
                levels: ApprovalLevels::default()
                    .iter()
                    .map(|level| LevelConfig { key: level.key.clone(), label: level.label.clone() })
                    .collect(),
                min_comment_chars: DEFAULT_MIN_COMMENT_CHARS,
            },
            nps: NpsConfig {
                auto_trigger_enabled: nps.auto_trigger_enabled,
                default_delay_minutes: nps.default_delay_minutes,
                detractor_alert_enabled: nps.detractor_alert_enabled,
                detractor_threshold: nps.detractor_threshold,
                survey_expiration_days: nps.survey_expiration_days,
                poll_interval_secs: 0,
            },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("orgflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn approval_levels(&self) -> Result<ApprovalLevels, ConfigError> {
        ApprovalLevels::new(
            self.workflow.levels.iter().map(|level| (level.key.clone(), level.label.clone())),
        )
        .map_err(|error| ConfigError::Validation(format!("workflow.levels: {error}")))
    }

    pub fn workflow_rules(&self) -> WorkflowRules {
        WorkflowRules { min_comment_chars: self.workflow.min_comment_chars }
    }

    pub fn move_rules(&self) -> MoveRules {
        MoveRules { max_depth: self.hierarchy.max_depth }
    }

    pub fn nps_settings(&self) -> NpsSettings {
        NpsSettings {
            auto_trigger_enabled: self.nps.auto_trigger_enabled,
            default_delay_minutes: self.nps.default_delay_minutes,
            detractor_alert_enabled: self.nps.detractor_alert_enabled,
            detractor_threshold: self.nps.detractor_threshold,
            survey_expiration_days: self.nps.survey_expiration_days,
        }
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(max_depth) = patch.hierarchy.and_then(|hierarchy| hierarchy.max_depth) {
            self.hierarchy.max_depth = max_depth;
        }

        if let Some(workflow) = patch.workflow {
            if let Some(levels) = workflow.levels {
                self.workflow.levels = levels;
            }
            if let Some(min_comment_chars) = workflow.min_comment_chars {
                self.workflow.min_comment_chars = min_comment_chars;
            }
        }

        if let Some(nps) = patch.nps {
            if let Some(enabled) = nps.auto_trigger_enabled {
                self.nps.auto_trigger_enabled = enabled;
            }
            if let Some(minutes) = nps.default_delay_minutes {
                self.nps.default_delay_minutes = minutes;
            }
            if let Some(enabled) = nps.detractor_alert_enabled {
                self.nps.detractor_alert_enabled = enabled;
            }
            if let Some(threshold) = nps.detractor_threshold {
                self.nps.detractor_threshold = threshold;
            }
            if let Some(days) = nps.survey_expiration_days {
                self.nps.survey_expiration_days = days;
            }
            if let Some(secs) = nps.poll_interval_secs {
                self.nps.poll_interval_secs = secs;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ORGFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ORGFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("ORGFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("ORGFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ORGFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ORGFLOW_SERVER_PORT") {
            self.server.port = parse_env("ORGFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("ORGFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("ORGFLOW_LOGGING_LEVEL").or_else(|| read_env("ORGFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ORGFLOW_LOGGING_FORMAT").or_else(|| read_env("ORGFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("ORGFLOW_HIERARCHY_MAX_DEPTH") {
            self.hierarchy.max_depth = parse_env("ORGFLOW_HIERARCHY_MAX_DEPTH", &value)?;
        }

        if let Some(value) = read_env("ORGFLOW_WORKFLOW_LEVELS") {
            self.workflow.levels = parse_levels(&value);
        }
        if let Some(value) = read_env("ORGFLOW_WORKFLOW_MIN_COMMENT_CHARS") {
            self.workflow.min_comment_chars =
                parse_env("ORGFLOW_WORKFLOW_MIN_COMMENT_CHARS", &value)?;
        }

        if let Some(value) = read_env("ORGFLOW_NPS_AUTO_TRIGGER_ENABLED") {
            self.nps.auto_trigger_enabled = parse_env("ORGFLOW_NPS_AUTO_TRIGGER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_NPS_DEFAULT_DELAY_MINUTES") {
            self.nps.default_delay_minutes =
                parse_env("ORGFLOW_NPS_DEFAULT_DELAY_MINUTES", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_NPS_DETRACTOR_ALERT_ENABLED") {
            self.nps.detractor_alert_enabled =
                parse_env("ORGFLOW_NPS_DETRACTOR_ALERT_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_NPS_DETRACTOR_THRESHOLD") {
            self.nps.detractor_threshold = parse_env("ORGFLOW_NPS_DETRACTOR_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_NPS_SURVEY_EXPIRATION_DAYS") {
            self.nps.survey_expiration_days =
                parse_env("ORGFLOW_NPS_SURVEY_EXPIRATION_DAYS", &value)?;
        }
        if let Some(value) = read_env("ORGFLOW_NPS_POLL_INTERVAL_SECS") {
            self.nps.poll_interval_secs = parse_env("ORGFLOW_NPS_POLL_INTERVAL_SECS", &value)?;
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
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(secs) = overrides.nps_poll_interval_secs {
            self.nps.poll_interval_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_hierarchy(&self.hierarchy)?;
        self.approval_levels()?;
        validate_nps(&self.nps)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("orgflow.toml"), PathBuf::from("config/orgflow.toml")]
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

/// `key[:Label],key[:Label],...`
fn parse_levels(value: &str) -> Vec<LevelConfig> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((key, label)) => {
                LevelConfig { key: key.trim().to_string(), label: label.trim().to_string() }
            }
            None => LevelConfig { key: entry.to_string(), label: String::new() },
        })
        .collect()
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_hierarchy(hierarchy: &HierarchyConfig) -> Result<(), ConfigError> {
    if hierarchy.max_depth == 0 {
        return Err(ConfigError::Validation(
            "hierarchy.max_depth must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_nps(nps: &NpsConfig) -> Result<(), ConfigError> {
    if nps.detractor_threshold > MAX_SCORE {
        return Err(ConfigError::Validation(format!(
            "nps.detractor_threshold must be in range 0..={MAX_SCORE}"
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    hierarchy: Option<HierarchyPatch>,
    workflow: Option<WorkflowPatch>,
    nps: Option<NpsPatch>,
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
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct HierarchyPatch {
    max_depth: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    levels: Option<Vec<LevelConfig>>,
    min_comment_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct NpsPatch {
    auto_trigger_enabled: Option<bool>,
    default_delay_minutes: Option<u32>,
    detractor_alert_enabled: Option<bool>,
    detractor_threshold: Option<u8>,
    survey_expiration_days: Option<u32>,
    poll_interval_secs: Option<u64>,
}
