//! Command line and environment configuration

use std::time::Duration;

use clap::Parser;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9081;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PONG_TIMEOUT_SECS: u64 = 10;

/// Lobby and WebRTC signaling server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// WebSocket port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL_SECS, env = "PING_INTERVAL_SECS")]
    pub ping_interval_secs: u64,

    /// Seconds a peer has to answer a ping before it is dropped
    #[arg(long, default_value_t = DEFAULT_PONG_TIMEOUT_SECS, env = "PONG_TIMEOUT_SECS")]
    pub pong_timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            pong_timeout_secs: DEFAULT_PONG_TIMEOUT_SECS,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }
}
