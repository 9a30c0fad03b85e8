//! 应用运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 部署环境。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
    Staging,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
            Environment::Staging => "staging",
        }
    }
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_pool_size: u32,
    pub gt06_port: u16,
    pub teltonika_port: u16,
    pub api_port: u16,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub keep_alive_timeout: Duration,
    pub max_connections_per_port: usize,
    pub secret_key: String,
    pub data_forward_url: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub redis_db: u8,
    pub environment: Environment,
    pub log_level: String,
    pub sync_interval: Duration,
    pub gt06_checksum_fallback: bool,
    pub teltonika_strict_crc: bool,
    pub auth_fallback_lenient: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("PRIMARY_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("PRIMARY_DATABASE_URL".to_string()))?;
        let secret_key =
            env::var("SECRET_KEY").map_err(|_| ConfigError::Missing("SECRET_KEY".to_string()))?;
        let data_forward_url = env::var("DATA_FORWARD_URL")
            .map_err(|_| ConfigError::Missing("DATA_FORWARD_URL".to_string()))?;

        let db_pool_size = read_u32_with_default("DB_POOL_SIZE", 50)?;
        let gt06_port = read_u16_with_default("GT06_PORT", 5023)?;
        let teltonika_port = read_u16_with_default("TELTONIKA_PORT", 5024)?;
        let api_port = read_u16_with_default("API_PORT", 5055)?;

        let connect_timeout = Duration::from_millis(read_u64_with_default("CON_TIME_OUT", 5_000)?);
        let socket_timeout =
            Duration::from_millis(read_u64_with_default("SOCKET_TIMEOUT", 300_000)?);
        let keep_alive_timeout =
            Duration::from_millis(read_u64_with_default("KEEP_ALIVE_TIMEOUT", 120_000)?);
        let max_connections_per_port =
            read_u64_with_default("MAX_CONNECTIONS_PER_PORT", 50_000)? as usize;

        let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
        let redis_port = read_u16_with_default("REDIS_PORT", 6379)?;
        let redis_password = read_optional("REDIS_PASSWORD");
        let redis_db = read_u8_with_default("REDIS_DB", 0)?;

        let environment = read_environment("NODE_ENV")?;
        let log_level = read_log_level("LOG_LEVEL")?;
        let sync_interval =
            Duration::from_secs(read_u64_with_default("SYNC_INTERVAL_SECONDS", 300)?);

        let gt06_checksum_fallback = read_bool_with_default("GT06_CHECKSUM_FALLBACK", true);
        let teltonika_strict_crc = read_bool_with_default("TELTONIKA_STRICT_CRC", false);
        let auth_fallback_lenient = read_bool_with_default("AUTH_FALLBACK_LENIENT", false);

        Ok(Self {
            database_url,
            db_pool_size,
            gt06_port,
            teltonika_port,
            api_port,
            connect_timeout,
            socket_timeout,
            keep_alive_timeout,
            max_connections_per_port,
            secret_key,
            data_forward_url,
            redis_host,
            redis_port,
            redis_password,
            redis_db,
            environment,
            log_level,
            sync_interval,
            gt06_checksum_fallback,
            teltonika_strict_crc,
            auth_fallback_lenient,
        })
    }

    /// 拼接 Redis 连接串。
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis_host, self.redis_port, self.redis_db
            ),
            _ => format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
        }
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

fn read_environment(key: &str) -> Result<Environment, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(Environment::Development),
    };
    match value.as_str() {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        "test" => Ok(Environment::Test),
        "staging" => Ok(Environment::Staging),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_log_level(key: &str) -> Result<String, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok("info".to_string()),
    };
    match value.as_str() {
        "error" | "warn" | "info" | "debug" => Ok(value),
        // tracing 无 verbose 级别，映射到 trace
        "verbose" => Ok("trace".to_string()),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}
