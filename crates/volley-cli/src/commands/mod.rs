//! Slash commands for interactive mode

mod session;

pub use session::SessionCommand;

use volley_chat::Session;

/// Result of executing a slash command
pub enum CommandResult {
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Start a new chat on the next prompt
    NewChat,
    /// End the current chat and start a new one
    EndChat,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, current: Option<&Session>) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "session" | "s" => SessionCommand::execute(current),

        "new" | "n" => CommandResult::NewChat,

        "end" => CommandResult::EndChat,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /session, /s         Show chat info and token budget
  /new, /n             Start a new chat
  /end                 End the current chat (no more messages) and start a new one
  /quit, /exit, /q     Exit volley"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert!(execute_command("hello", None).is_none());
    }

    #[test]
    fn test_aliases() {
        assert!(matches!(execute_command("/q", None), Some(CommandResult::Exit)));
        assert!(matches!(execute_command(" /NEW ", None), Some(CommandResult::NewChat)));
        assert!(matches!(execute_command("/end", None), Some(CommandResult::EndChat)));
    }

    #[test]
    fn test_unknown_command() {
        match execute_command("/bogus arg", None) {
            Some(CommandResult::Unknown(cmd)) => assert_eq!(cmd, "bogus"),
            _ => panic!("expected unknown command"),
        }
    }
}
