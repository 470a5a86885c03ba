#![cfg(not(tarpaulin_include))]

use clap::Parser;
use station_dashboard::app;
use station_dashboard::config::Config;
use station_dashboard::login::hash_password;

/// Main entry point for the dashboard server
///
/// Parses the configuration, sets up logging (`RUST_LOG`, default `info`)
/// and serves the dashboard until the process is stopped. With
/// `--hash-password` it prints a users-file hash instead and exits.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    if let Some(password) = &config.hash_password {
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    app::run(config).await
}
