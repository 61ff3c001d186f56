use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageAuthor` values.
pub enum MessageAuthor {
    Customer,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `ConversationMessage` used across DeskLink components.
pub struct ConversationMessage {
    pub author: MessageAuthor,
    pub body: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Helpdesk conversation snapshot handed to the classification pipeline and
/// the content generator.
pub struct ConversationContext {
    pub id: u64,
    pub number: u64,
    pub subject: String,
    pub customer_name: String,
    pub customer_email: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

impl ConversationContext {
    pub fn first_customer_message(&self) -> Option<&ConversationMessage> {
        self.messages
            .iter()
            .find(|message| message.author == MessageAuthor::Customer)
    }

    /// Bounded excerpt of the transcript: at most `max_turns` messages, each
    /// truncated to `max_chars` characters, prefixed with the speaker.
    pub fn transcript_excerpt(&self, max_turns: usize, max_chars: usize) -> String {
        self.messages
            .iter()
            .take(max_turns)
            .map(|message| {
                let speaker = match message.author {
                    MessageAuthor::Customer => "Customer",
                    MessageAuthor::Agent => "Agent",
                };
                format!("{speaker}: {}", truncate_chars(message.body.trim(), max_chars))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        self.created_at
            .map(|created| (now - created).num_days())
            .unwrap_or(0)
    }
}

/// Truncates on a character boundary, appending an ellipsis when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}
