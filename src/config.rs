use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser};

use crate::auth::{ApiKey, parse_api_key};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "statehub",
    about = "Shared-state HTTP service with a persistent audit log",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "APP_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:8080"
    )]
    pub bind: SocketAddr,

    /// SQLite database holding the audit log of state updates.
    #[arg(
        long = "db-path",
        global = true,
        env = "APP_DB_PATH",
        value_name = "PATH",
        default_value = "./logs.db"
    )]
    pub db_path: PathBuf,

    /// Static API key required by POST /update. Empty disables authentication.
    #[arg(
        long = "api-key",
        global = true,
        env = "APP_API_KEY",
        value_name = "KEY",
        default_value = ""
    )]
    pub api_key: String,
}

impl Config {
    pub fn api_key(&self) -> Option<ApiKey> {
        parse_api_key(&self.api_key)
    }
}
