use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server settings; every flag falls back to a `STOCKROOM_*` variable
/// (a `.env` file is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(name = "stockroom")]
#[command(about = "Role-gated inventory, product and user administration API", long_about = None)]
pub struct Config {
    #[arg(long, env = "STOCKROOM_BIND", default_value = "0.0.0.0:11111")]
    pub bind: SocketAddr,

    #[arg(long, env = "STOCKROOM_DATA_DIR", default_value = "stockroom_data")]
    pub data_dir: String,

    #[arg(long, env = "STOCKROOM_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "STOCKROOM_TOKEN_TTL_SECS", default_value_t = 3600)]
    pub token_ttl_secs: u64,

    #[arg(long, env = "STOCKROOM_BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Program and leading arguments; the caller's token is appended.
    #[arg(
        long,
        env = "STOCKROOM_SCANNER_COMMAND",
        default_value = "python3 python/main.py"
    )]
    pub scanner_command: String,

    #[arg(long, env = "STOCKROOM_BOOTSTRAP_EMAIL", requires = "bootstrap_password")]
    pub bootstrap_email: Option<String>,

    #[arg(long, env = "STOCKROOM_BOOTSTRAP_PASSWORD", hide_env_values = true)]
    pub bootstrap_password: Option<String>,

    #[arg(long, env = "STOCKROOM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write daily-rotated log files here.
    #[arg(long, env = "STOCKROOM_LOG_DIR")]
    pub log_dir: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn scanner_argv(&self) -> Vec<String> {
        self.scanner_command
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}
