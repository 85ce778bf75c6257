use clap::{Parser, ValueEnum};
use kykwifi::config;
use kykwifi::SessionConfig;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// What to do once logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Interactive menu.
    #[default]
    Menu,
    /// Print the remaining quota, then log out.
    Quota,
    /// Keep the session alive at the normal interval until interrupted.
    KeepAlive,
    /// Keep the session alive at the fast interval until interrupted.
    Fast,
    /// Log out the session recorded by a previous run and exit.
    Logout,
}

/// Login and keep-alive client for the KYK/GSB Wi-Fi captive portal.
#[derive(Debug, Parser)]
#[command(name = "kykwifi", version, about)]
pub struct Args {
    /// What to do after logging in
    #[arg(short, long, value_enum, default_value_t = Mode::Menu)]
    pub mode: Mode,

    /// Keep-alive interval in normal mode, in seconds
    #[arg(long, value_name = "SECS", default_value_t = config::DEFAULT_KEEP_ALIVE_INTERVAL.as_secs())]
    pub interval: u64,

    /// Keep-alive interval in fast mode, in seconds
    #[arg(long, value_name = "SECS", default_value_t = config::DEFAULT_FAST_KEEP_ALIVE_INTERVAL.as_secs())]
    pub fast_interval: u64,

    /// Delay between login attempts after a network failure, in seconds
    #[arg(long, value_name = "SECS", default_value_t = config::DEFAULT_RETRY_DELAY.as_secs())]
    pub retry_delay: u64,

    /// Consecutive network failures tolerated before giving up
    #[arg(long, default_value_t = config::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Consecutive credential rejections tolerated before giving up
    #[arg(long, default_value_t = config::DEFAULT_MAX_ATTEMPTS)]
    pub max_credential_attempts: u32,

    /// Directory holding .env, the session marker and the log file
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    pub level: LogLevel,

    /// Do not append to kyk_login.log
    #[arg(long)]
    pub no_log_file: bool,
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            retry_delay: Duration::from_secs(self.retry_delay),
            keep_alive_interval: Duration::from_secs(self.interval.max(1)),
            fast_keep_alive_interval: Duration::from_secs(self.fast_interval.max(1)),
            max_transient_attempts: self.max_attempts,
            max_credential_attempts: self.max_credential_attempts,
            ..SessionConfig::default()
        }
    }
}
