use dotenvy::dotenv;
use log::{error, info};

use leadpilot::core::config::AppConfig;
use leadpilot::main_module::{create_app_state, run_migrate, run_server, spawn_auth_event_logger};

const USAGE: &str = "Usage: leadpilot [serve|migrate]

Commands:
  serve     Start the HTTP server (default)
  migrate   Apply pending database migrations and exit

Configuration is read from leadpilot.toml (or $LEADPILOT_CONFIG) and
LEADPILOT_* environment variables, e.g. LEADPILOT_SERVER__PORT=9000.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    match command.as_str() {
        "--help" | "-h" | "help" => {
            println!("{USAGE}");
            return Ok(());
        }
        "serve" | "migrate" => {}
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    let config = AppConfig::load()?;

    if command == "migrate" {
        return run_migrate(&config);
    }

    info!("Starting LeadPilot {}", env!("CARGO_PKG_VERSION"));
    let state = create_app_state(config).await?;
    let logger = spawn_auth_event_logger(&state.auth);

    if let Err(e) = run_server(state).await {
        error!("Server error: {e}");
        return Err(e.into());
    }
    logger.abort();
    info!("LeadPilot stopped");
    Ok(())
}
