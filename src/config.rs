use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::Level;

use crate::backend::pool::PoolConfig;
use crate::codec::DEFAULT_MAX_VALUE_SIZE;
use crate::server::SessionConfig;

/// Memcache compatible proxy storing its data in Redis.
///
/// Every option can also be given through the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "memdis", version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "MEMDIS_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "MEMDIS_PORT", default_value_t = 11211)]
    pub port: u16,

    /// Redis host
    #[arg(long, env = "MEMDIS_REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    /// Redis port
    #[arg(long, env = "MEMDIS_REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    /// Redis ACL user, requires a password
    #[arg(long, env = "MEMDIS_REDIS_USERNAME", requires = "redis_password")]
    pub redis_username: Option<String>,

    #[arg(long, env = "MEMDIS_REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Redis logical database
    #[arg(long, env = "MEMDIS_REDIS_DB", default_value_t = 0)]
    pub redis_db: u32,

    /// Idle Redis connections kept open
    #[arg(long, env = "MEMDIS_MAX_IDLE", default_value_t = 8)]
    pub max_idle: usize,

    /// Maximum number of open Redis connections
    #[arg(long, env = "MEMDIS_MAX_CONNECTIONS", default_value_t = 64)]
    pub max_connections: usize,

    /// Seconds to wait for Redis: connecting, waiting for a free connection and every request
    #[arg(long, env = "MEMDIS_TIMEOUT", default_value_t = 5)]
    pub timeout: u64,

    /// Seconds after which silent clients are disconnected, 0 to never disconnect them
    #[arg(long, env = "MEMDIS_IDLE_TIMEOUT", default_value_t = 0)]
    pub idle_timeout: u64,

    /// Largest value accepted from clients, in bytes
    #[arg(long, env = "MEMDIS_MAX_VALUE_SIZE", default_value_t = DEFAULT_MAX_VALUE_SIZE)]
    pub max_value_size: usize,

    #[arg(long, env = "MEMDIS_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,

    /// Append logs to this file instead of writing them to stderr
    #[arg(long, env = "MEMDIS_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ConfigError {
    #[error("max connections must be at least 1")]
    NoConnections,
    #[error("max idle connections ({max_idle}) exceeds max connections ({max_connections})")]
    TooManyIdle {
        max_idle: usize,
        max_connections: usize,
    },
    #[error("timeout must be at least 1 second")]
    NoTimeout,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }
        if self.max_idle > self.max_connections {
            return Err(ConfigError::TooManyIdle {
                max_idle: self.max_idle,
                max_connections: self.max_connections,
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::NoTimeout);
        }

        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            address: format!("{}:{}", self.redis_host, self.redis_port),
            username: self.redis_username.clone(),
            password: self.redis_password.clone(),
            database: self.redis_db,
            max_idle: self.max_idle,
            max_connections: self.max_connections,
            timeout: Duration::from_secs(self.timeout),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            max_value_size: self.max_value_size,
            idle_timeout: (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout)),
        }
    }
}
