/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`     - Send one user turn and stream the reply
- `sessions` - List, inspect, end and delete stored sessions
*/

use crate::config::Config;
use crate::error::Result;
use crate::storage::SqliteSessionStore;

// Session management commands
pub mod sessions;

/// Opens the session database named by the configuration
///
/// Falls back to the platform data directory when no path is configured.
pub fn open_store(config: &Config) -> Result<SqliteSessionStore> {
    match &config.storage.path {
        Some(path) => SqliteSessionStore::new_with_path(path),
        None => SqliteSessionStore::new(),
    }
}

// Chat command handler
pub mod chat {
    //! One-shot chat handler.
    //!
    //! Builds the orchestrator from the configuration, prints the reply as
    //! it streams and cancels the exchange on Ctrl-C.

    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use colored::Colorize;
    use tokio_util::sync::CancellationToken;

    use crate::completion::{output_channel, ChatCompletionStream, CompletionInput};
    use crate::providers::create_provider;
    use crate::tokenizer::TiktokenCounter;

    /// Send `message` to the session `chat_id` and stream the reply to stdout
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `chat_id` - Session to continue; a new session is created when absent
    /// * `user` - Owner of the session
    /// * `message` - User turn text
    ///
    /// # Errors
    ///
    /// Returns the orchestrator's error when the exchange fails or is canceled
    pub async fn run_chat(
        config: Config,
        chat_id: Option<String>,
        user: String,
        message: String,
    ) -> Result<()> {
        let store = open_store(&config)?;
        let provider = create_provider(&config.provider)?;
        let (tx, mut rx) = output_channel(config.stream.channel_capacity);

        let engine = ChatCompletionStream::new(
            Arc::new(store),
            Arc::from(provider),
            Arc::new(TiktokenCounter::new()),
            tx,
        );

        // Snapshots are cumulative; print only what is new in each one.
        let printer = tokio::spawn(async move {
            let mut printed = 0;
            let mut stdout = std::io::stdout();
            while let Some(snapshot) = rx.recv().await {
                if let Some(fresh) = snapshot.content.get(printed..) {
                    let _ = write!(stdout, "{}", fresh);
                    let _ = stdout.flush();
                }
                printed = snapshot.content.len();
            }
        });

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, canceling completion");
                    cancel.cancel();
                }
            })
        };

        let input = CompletionInput {
            chat_id: chat_id.unwrap_or_default(),
            user_id: user,
            user_message: message,
            config: config.completion.clone(),
        };

        let result = engine.execute(input, cancel).await;
        interrupt.abort();

        // Dropping the last sender ends the printer loop.
        drop(engine);
        if let Err(e) = printer.await {
            tracing::warn!("Output printer failed: {}", e);
        }
        println!();

        let output = result?;
        eprintln!("{} {}", "session".dimmed(), output.chat_id.cyan());
        Ok(())
    }
}
