use crate::chat::{Message, Session, SessionStatus};
use crate::cli::SessionCommand;
use crate::commands::open_store;
use crate::config::Config;
use crate::error::{ChatStreamError, Result};
use crate::storage::SessionGateway;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle session management commands
pub async fn handle_sessions(config: &Config, command: SessionCommand) -> Result<()> {
    let store = open_store(config)?;

    match command {
        SessionCommand::List => {
            let sessions = store.list().await?;

            if sessions.is_empty() {
                println!("{}", "No sessions found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "User".bold(),
                "Model".bold(),
                "Status".bold(),
                "Messages".bold(),
                "Tokens".bold(),
                "Last Updated".bold()
            ]);

            for session in sessions {
                let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();
                table.add_row(prettytable::row![
                    session.id.cyan(),
                    session.user_id,
                    session.model,
                    status_label(session.status),
                    session.message_count,
                    session.token_usage,
                    updated
                ]);
            }

            println!("\nSessions:");
            table.printstd();
            println!();
            println!(
                "Use {} to continue a session.",
                "chatstream chat --chat-id <ID> <MESSAGE>".cyan()
            );
            println!();
        }
        SessionCommand::Show { id } => {
            let session = load(&store, &id).await?;
            print_session(&session);
        }
        SessionCommand::End { id } => {
            let mut session = load(&store, &id).await?;
            if !session.is_active() {
                println!("{}", format!("Session {} already ended", id).yellow());
                return Ok(());
            }
            session.end();
            store.save(&session).await?;
            println!("{}", format!("Ended session {}", id).green());
        }
        SessionCommand::Delete { id } => {
            if store.delete(&id).await? {
                println!("{}", format!("Deleted session {}", id).green());
            } else {
                println!("{}", format!("No session with id {}", id).yellow());
            }
        }
    }

    Ok(())
}

async fn load(store: &dyn SessionGateway, id: &str) -> Result<Session> {
    store
        .find_by_id(id)
        .await?
        .ok_or_else(|| ChatStreamError::Storage(format!("Session {} not found", id)).into())
}

fn status_label(status: SessionStatus) -> colored::ColoredString {
    match status {
        SessionStatus::Active => "active".green(),
        SessionStatus::Ended => "ended".red(),
    }
}

fn print_session(session: &Session) {
    let context = session.buffer().context_info();

    println!();
    println!("{} {}", "Session".bold(), session.id().cyan());
    println!("  User:    {}", session.user_id());
    println!("  Model:   {}", session.config().model.name);
    println!("  Status:  {}", status_label(session.status()));
    println!(
        "  Context: {}/{} tokens ({:.1}%)",
        context.used_tokens, context.max_tokens, context.percentage_used
    );
    println!();

    println!("{}", "Retained messages:".bold());
    println!("{}", message_table(session.messages()));

    if !session.evicted_messages().is_empty() {
        println!("{}", "Evicted messages:".bold());
        println!("{}", message_table(session.evicted_messages()));
    }
}

fn message_table(messages: &[Message]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Role".bold(),
        "Tokens".bold(),
        "Content".bold()
    ]);

    for message in messages {
        table.add_row(prettytable::row![
            message.role_str(),
            message.token_cost(),
            preview(message.content(), 60)
        ]);
    }

    table
}

fn preview(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() > max_chars {
        let cut: String = single_line.chars().take(max_chars - 3).collect();
        format!("{}...", cut)
    } else {
        single_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("line one\nline two", 40), "line one line two");

        let long = "é".repeat(20);
        let cut = preview(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with("..."));
    }
}
