//! Command-line interface definition for chatstream
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for streaming a chat turn and managing stored sessions.

use clap::{Parser, Subcommand};

/// chatstream - Streaming chat completions with bounded conversation memory
#[derive(Parser, Debug, Clone)]
#[command(name = "chatstream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the model used for new sessions
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Override the session database path
    #[arg(long = "db", global = true)]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for chatstream
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Send one user message and stream the assistant reply
    Chat {
        /// Session to continue; a new session is created under this id if absent
        #[arg(long)]
        chat_id: Option<String>,

        /// User that owns the session
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Message text
        message: String,
    },

    /// Manage stored sessions
    Sessions {
        /// Session management subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// List stored sessions, most recently updated first
    List,

    /// Show retained and evicted messages of a session
    Show {
        /// Session id
        id: String,
    },

    /// End a session so it accepts no more messages
    End {
        /// Session id
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["chatstream", "chat", "hello"]).unwrap();
        if let Commands::Chat {
            chat_id,
            user,
            message,
        } = cli.command
        {
            assert!(chat_id.is_none());
            assert_eq!(user, "local");
            assert_eq!(message, "hello");
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_chat_with_id_and_user() {
        let cli = Cli::try_parse_from([
            "chatstream",
            "chat",
            "--chat-id",
            "chat-1",
            "--user",
            "alice",
            "hi there",
        ])
        .unwrap();
        if let Commands::Chat {
            chat_id,
            user,
            message,
        } = cli.command
        {
            assert_eq!(chat_id.as_deref(), Some("chat-1"));
            assert_eq!(user, "alice");
            assert_eq!(message, "hi there");
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_chat_requires_message() {
        assert!(Cli::try_parse_from(["chatstream", "chat"]).is_err());
    }

    #[test]
    fn test_cli_parse_sessions_subcommands() {
        let cli = Cli::try_parse_from(["chatstream", "sessions", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                command: SessionCommand::List
            }
        ));

        let cli = Cli::try_parse_from(["chatstream", "sessions", "end", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                command: SessionCommand::End { ref id }
            } if id == "abc"
        ));
    }

    #[test]
    fn test_cli_global_overrides() {
        let cli = Cli::try_parse_from([
            "chatstream",
            "sessions",
            "list",
            "--db",
            "/tmp/x.db",
            "--model",
            "gpt-test",
        ])
        .unwrap();
        assert_eq!(cli.storage_path.as_deref(), Some("/tmp/x.db"));
        assert_eq!(cli.model.as_deref(), Some("gpt-test"));
    }

    #[test]
    fn test_cli_parse_with_config_and_verbose() {
        let cli =
            Cli::try_parse_from(["chatstream", "-v", "-c", "custom.yaml", "sessions", "list"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some("custom.yaml".to_string()));
    }

    #[test]
    fn test_cli_parse_missing_command() {
        assert!(Cli::try_parse_from(["chatstream"]).is_err());
    }
}
