use clap::Parser;
use nogasm_ws::cli::{Cli, Commands};
use nogasm_ws::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    let _telemetry = nogasm_ws::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Watch(args) => {
            tracing::info!("Starting watch mode");
            args.execute(&config).await?;
        }
        Commands::Backoff(args) => {
            args.execute(&config)?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Origin: {}", config.connection.origin);
            match config.ws_config() {
                Ok(ws) => println!("  Socket: {}", ws.endpoint),
                Err(e) => println!("  Socket: invalid ({})", e),
            }
            println!("  Auto reconnect: {}", config.connection.auto_reconnect);
            println!(
                "  Backoff: {} ms doubling up to {} ms",
                config.reconnect.base_delay_ms, config.reconnect.max_delay_ms
            );
            match config.keepalive.interval() {
                Some(interval) => println!("  Keepalive: every {}s", interval.as_secs()),
                None => println!("  Keepalive: disabled"),
            }
            println!(
                "  Logging: {} ({:?})",
                config.telemetry.log_level, config.telemetry.log_format
            );
        }
    }

    Ok(())
}
