use crate::core::gateway::{FunctionDeclaration, Part, Role};
use crate::core::storage::StoredConversation;

/// Messages kept per conversation when recalling history.
pub const HISTORY_MESSAGE_LIMIT: usize = 20;
const SUMMARY_MESSAGES: usize = 3;
const SNIPPET_LEN: usize = 100;

pub fn get_history_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "get_history",
        description: "Loads user conversation history into context for better understanding of user preferences and past interactions",
        parameters: serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "last": {
                    "type": "NUMBER",
                    "description": "The amount of history items to retrieve"
                }
            },
            "required": ["last"]
        }),
    }
}

/// Renders recalled conversations as a plain-text digest for model context:
/// the last few messages of each, truncated.
pub fn format_history(conversations: &[StoredConversation]) -> String {
    if conversations.is_empty() {
        return "No previous conversation history found for this user.".to_string();
    }

    let formatted = conversations
        .iter()
        .enumerate()
        .map(|(index, conversation)| {
            let date = conversation
                .last_message_datetime
                .split('T')
                .next()
                .unwrap_or(&conversation.last_message_datetime);
            let skip = conversation.messages.len().saturating_sub(SUMMARY_MESSAGES);
            let summary = conversation
                .messages
                .iter()
                .skip(skip)
                .map(|message| {
                    let speaker = match message.role {
                        Role::User => "User",
                        Role::Model => "Assistant",
                    };
                    let text = match &message.part {
                        Part::Text { text } => text.clone(),
                        other => serde_json::to_string(other).unwrap_or_default(),
                    };
                    format!("{}: {}", speaker, snippet(&text))
                })
                .collect::<Vec<_>>()
                .join("\n  ");

            format!(
                "Conversation {} ({}, {} messages):\n  {}",
                index + 1,
                date,
                conversation.messages.len(),
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Previous conversation history ({} conversations):\n\n{}",
        conversations.len(),
        formatted
    )
}

fn snippet(text: &str) -> String {
    if text.chars().count() > SNIPPET_LEN {
        let cut: String = text.chars().take(SNIPPET_LEN).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::StoredMessage;

    fn message(role: Role, text: &str) -> StoredMessage {
        StoredMessage {
            id: "m".into(),
            conversation_id: "c".into(),
            role,
            part: Part::text(text),
            date_time: "2024-06-01T12:00:00+00:00".into(),
        }
    }

    #[test]
    fn empty_history_has_explicit_message() {
        assert_eq!(
            format_history(&[]),
            "No previous conversation history found for this user."
        );
    }

    #[test]
    fn digest_includes_last_three_messages_only() {
        let conversation = StoredConversation {
            id: "c".into(),
            last_message_datetime: "2024-06-01T12:00:00+00:00".into(),
            messages: vec![
                message(Role::User, "one"),
                message(Role::Model, "two"),
                message(Role::User, "three"),
                message(Role::Model, "four"),
            ],
        };
        let digest = format_history(&[conversation]);
        assert!(!digest.contains("User: one"));
        assert!(digest.contains("Assistant: two"));
        assert!(digest.contains("User: three"));
        assert!(digest.contains("Assistant: four"));
        assert!(digest.contains("(2024-06-01, 4 messages)"));
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(150);
        let conversation = StoredConversation {
            id: "c".into(),
            last_message_datetime: "2024-06-01T12:00:00+00:00".into(),
            messages: vec![message(Role::User, &long)],
        };
        let digest = format_history(&[conversation]);
        assert!(digest.contains(&format!("{}...", "x".repeat(100))));
    }
}
