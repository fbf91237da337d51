//! Container healthcheck: exits 0 when `/liveness` on the local server
//! answers 200 or 204, 1 otherwise.
//!
//! Usage: `tether-healthcheck [port]`. The port defaults to `TETHER_PORT`.

use std::process::ExitCode;
use std::time::Duration;

use reqwest::StatusCode;

use tether_server::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let port = match std::env::args().nth(1) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("invalid port: {raw}");
                return ExitCode::FAILURE;
            }
        },
        None => match Config::from_env() {
            Ok(config) => config.port,
            Err(e) => {
                eprintln!("{e:#}");
                return ExitCode::FAILURE;
            }
        },
    };

    let client = match reqwest::Client::builder().timeout(Duration::from_secs(3)).build() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match client.get(format!("http://localhost:{port}/liveness")).send().await {
        Ok(resp) if resp.status() == StatusCode::OK || resp.status() == StatusCode::NO_CONTENT => {
            ExitCode::SUCCESS
        }
        Ok(resp) => {
            eprintln!("Healthcheck request not OK: {}", resp.status());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
