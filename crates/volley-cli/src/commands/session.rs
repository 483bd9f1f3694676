//! /session command - show chat info and token budget

use super::CommandResult;
use volley_chat::{Role, Session};

pub struct SessionCommand;

impl SessionCommand {
    pub fn execute(session: Option<&Session>) -> CommandResult {
        let Some(session) = session else {
            return CommandResult::Message(
                "No chat yet. The next prompt starts one.".to_string(),
            );
        };

        let mut output = String::from("Chat Info\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');

        output.push_str(&format!("ID:         {}\n", session.id()));
        output.push_str(&format!("User:       {}\n", session.user_id()));
        output.push_str(&format!(
            "Model:      {} ({} context)\n",
            session.model().name(),
            format_number(session.model().max_tokens())
        ));
        if session.is_ended() {
            output.push_str("Status:     ended\n");
        }
        output.push('\n');

        let count = |role: Role| session.messages().iter().filter(|m| m.role() == role).count();
        output.push_str(&format!("Messages:   {} total\n", session.messages().len()));
        output.push_str(&format!(
            "            {} user, {} assistant\n",
            count(Role::User),
            count(Role::Assistant)
        ));
        if !session.erased_messages().is_empty() {
            output.push_str(&format!(
                "            {} evicted to fit the budget\n",
                session.erased_messages().len()
            ));
        }
        output.push('\n');

        output.push_str("Token Budget:\n");
        output.push_str(&format!(
            "  Used:        {:>8}\n",
            format_number(session.token_usage())
        ));
        output.push_str(&format!(
            "  Reserved:    {:>8}\n",
            format_number(session.config().max_tokens)
        ));
        output.push_str(&format!(
            "  Remaining:   {:>8}\n",
            format_number(session.remaining_budget())
        ));

        CommandResult::Message(output)
    }
}

fn format_number(n: u32) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_chat::{GenerationConfig, Message, ModelDescriptor};

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(8_192), "8.2k");
        assert_eq!(format_number(1_047_576), "1.0M");
    }

    #[test]
    fn test_reports_budget() {
        let model = ModelDescriptor::new("test-model", 1000).unwrap();
        let system = Message::new(Role::System, "x".repeat(40), &model).unwrap();
        let session =
            Session::create_with_id("chat-1", "user-1", system, model, GenerationConfig::default())
                .unwrap();

        let CommandResult::Message(text) = SessionCommand::execute(Some(&session)) else {
            panic!("expected message");
        };
        assert!(text.contains("chat-1"));
        assert!(text.contains("Used:              10"));
        assert!(text.contains("Remaining:        734"));
    }
}
