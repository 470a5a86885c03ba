use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::Result;
use crate::login::CredentialStore;

/// Police station dashboard server.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// Spreadsheet holding the incident rows (.xlsx or .csv)
    #[arg(long, env = "DASHBOARD_DATASET", default_value = "dataset.xlsx")]
    pub dataset: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// JSON users file with Argon2 hashes; built-in accounts are used when absent
    #[arg(long, env = "DASHBOARD_USERS")]
    pub users: Option<PathBuf>,

    /// Directory served under /static for the dashboard frontend
    #[arg(long, env = "DASHBOARD_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Print an Argon2 hash of the given password for the users file and exit
    #[arg(long, value_name = "PASSWORD")]
    pub hash_password: Option<String>,
}

impl Config {
    /// Credential table selected by `--users`.
    pub fn credentials(&self) -> Result<CredentialStore> {
        match &self.users {
            Some(path) => CredentialStore::from_file(path),
            None => {
                log::warn!("No users file given, using the built-in station accounts");
                CredentialStore::with_defaults()
            }
        }
    }
}
