// Abacus conversational assistant
// Main entry point for the abacus binary

use clap::Parser;
use abacus_engine::cli::{Cli, Command};
use abacus_engine::config::Config;
use abacus_engine::handlers::{
    handle_ask, handle_chat, handle_doctor, handle_exec, handle_ingest, handle_serve, handle_vet,
    OutputFormat,
};
use abacus_engine::telemetry::init_telemetry_with_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = Config::load(cli.config.as_deref())?;

    // RUST_LOG wins over --log, which wins over the config file
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    let _log_guard = init_telemetry_with_config(
        log_level,
        config.core.log_dir.as_deref(),
        config.core.log_max_files,
    );

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Abacus v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Serve => {
            tracing::info!("Starting HTTP interface...");
            handle_serve(&config).await
        }

        Command::Ask { query, session } => {
            tracing::info!("Answering query in session '{}'", session);
            handle_ask(query, session, &config, format).await
        }

        Command::Chat { session } => handle_chat(session, &config).await,

        Command::Ingest { files } => {
            tracing::info!("Ingesting {} file(s)", files.len());
            handle_ingest(files, &config, format).await
        }

        Command::Vet { file } => {
            if !handle_vet(&file, format)? {
                std::process::exit(1);
            }
            Ok(())
        }

        Command::Exec { file } => {
            if !handle_exec(&file, &config, format).await? {
                std::process::exit(1);
            }
            Ok(())
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
