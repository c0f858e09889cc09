use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::middleware_helpers::retry::RetryConfig;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_RESPONSE_WINDOW_MINUTES: i64 = 100;
const DEFAULT_WARNING_LEAD_MINUTES: i64 = 5;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_WEEKLY_CYCLE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Response-deadline scheduler settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Minutes a technician has to accept or decline an assignment
    #[serde(default = "default_response_window_minutes")]
    #[validate(range(min = 1, max = 10080))]
    pub response_window_minutes: i64,

    /// Minutes before the deadline at which the technician is warned
    #[serde(default = "default_warning_lead_minutes")]
    #[validate(range(min = 0, max = 1440))]
    pub warning_lead_minutes: i64,

    /// Interval between reconcile sweeps, 0 disables the loop
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Attempts made by the expiry callback before flagging for reconcile
    #[serde(default = "default_expiry_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub expiry_retry_attempts: u32,

    #[serde(default = "default_expiry_retry_initial_delay_ms")]
    pub expiry_retry_initial_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            response_window_minutes: DEFAULT_RESPONSE_WINDOW_MINUTES,
            warning_lead_minutes: DEFAULT_WARNING_LEAD_MINUTES,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            expiry_retry_attempts: default_expiry_retry_attempts(),
            expiry_retry_initial_delay_ms: default_expiry_retry_initial_delay_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn expiry_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.expiry_retry_attempts,
            initial_delay: Duration::from_millis(self.expiry_retry_initial_delay_ms),
            ..RetryConfig::default()
        }
    }
}

/// Commission and payout settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CompensationConfig {
    /// Used for freelancers when no system setting exists
    #[serde(default = "default_fallback_commission_rate")]
    #[validate(custom = "validate_rate")]
    pub fallback_commission_rate: Decimal,

    /// Used for internal technicians when no system setting exists
    #[serde(default = "default_fallback_bonus_rate")]
    #[validate(custom = "validate_rate")]
    pub fallback_bonus_rate: Decimal,

    /// Run the weekly payout cycle as a background loop
    #[serde(default)]
    pub weekly_cycle_enabled: bool,

    #[serde(default = "default_weekly_cycle_interval_secs")]
    pub weekly_cycle_interval_secs: u64,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            fallback_commission_rate: default_fallback_commission_rate(),
            fallback_bonus_rate: default_fallback_bonus_rate(),
            weekly_cycle_enabled: false,
            weekly_cycle_interval_secs: DEFAULT_WEEKLY_CYCLE_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Capacity of the in-process notification queue
    #[serde(default = "default_notification_channel_capacity")]
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_NOTIFICATION_CHANNEL_CAPACITY,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Per-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    #[validate]
    pub compensation: CompensationConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationsConfig,
}

impl AppConfig {
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            dispatch: DispatchConfig::default(),
            compensation: CompensationConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationError> {
        if self.dispatch.warning_lead_minutes >= self.dispatch.response_window_minutes {
            let mut err = ValidationError::new("warning_lead_minutes");
            err.message =
                Some("warning_lead_minutes must be shorter than response_window_minutes".into());
            return Err(err);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Configuration constraint violated: {0}")]
    Constraint(ValidationError),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true_bool() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_response_window_minutes() -> i64 {
    DEFAULT_RESPONSE_WINDOW_MINUTES
}
fn default_warning_lead_minutes() -> i64 {
    DEFAULT_WARNING_LEAD_MINUTES
}
fn default_reconcile_interval_secs() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}
fn default_expiry_retry_attempts() -> u32 {
    3
}
fn default_expiry_retry_initial_delay_ms() -> u64 {
    200
}
fn default_fallback_commission_rate() -> Decimal {
    dec!(0.10)
}
fn default_fallback_bonus_rate() -> Decimal {
    dec!(0.05)
}
fn default_weekly_cycle_interval_secs() -> u64 {
    DEFAULT_WEEKLY_CYCLE_INTERVAL_SECS
}
fn default_notification_channel_capacity() -> usize {
    DEFAULT_NOTIFICATION_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("rate");
        err.message = Some("rate must be between 0 and 1".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fieldops_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://fieldops.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint failed: {:?}", e);
        AppConfigError::Constraint(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
