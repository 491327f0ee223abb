//! chatstream - Streaming chat completions with bounded conversation memory
//!
#![doc = "Main entry point for the chatstream CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatstream::cli::{Cli, Commands};
use chatstream::commands;
use chatstream::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            chat_id,
            user,
            message,
        } => {
            tracing::info!("Starting chat completion");
            if let Some(id) = &chat_id {
                tracing::debug!("Continuing session: {}", id);
            }
            commands::chat::run_chat(config, chat_id, user, message).await?;
            Ok(())
        }
        Commands::Sessions { command } => {
            tracing::debug!("Starting session command: {:?}", command);
            commands::sessions::handle_sessions(&config, command).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they never interleave with the streamed reply.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "chatstream=debug"
    } else {
        "chatstream=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
