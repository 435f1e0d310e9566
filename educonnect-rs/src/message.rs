//! Conversation transcript types.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "You"),
            Self::Bot => write!(f, "Bot"),
        }
    }
}

/// One transcript entry. Fields are private so a message cannot change
/// after it has been appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    text: String,
    sender: Sender,
    created_at: DateTime<Utc>,
}

impl Message {
    fn new(sender: Sender, text: String) -> Self {
        Self {
            text,
            sender,
            created_at: Utc::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Transcript line with local wall-clock time, e.g. `[14:05] You: hi`.
    pub fn transcript_line(&self) -> String {
        let local = self.created_at().with_timezone(&Local);
        format!("[{}] {}: {}", local.format("%H:%M"), self.sender(), self.text())
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

/// Chronological transcript. Append-only.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct MessageHistory {
    messages: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message as typed. Returns `None` for blank text, which
    /// is never a valid user turn.
    pub fn push_user(&mut self, text: &str) -> Option<&Message> {
        if text.trim().is_empty() {
            return None;
        }
        self.messages.push(Message::new(Sender::User, text.to_string()));
        self.messages.last()
    }

    /// Append the reply for the latest user turn. Returns `None` when the
    /// latest message is not a user message, so a turn never gets two replies.
    pub fn push_bot(&mut self, text: impl Into<String>) -> Option<&Message> {
        if self.awaiting_bot_reply() {
            self.messages.push(Message::new(Sender::Bot, text.into()));
            self.messages.last()
        } else {
            None
        }
    }

    fn awaiting_bot_reply(&self) -> bool {
        matches!(self.messages.last(), Some(m) if m.sender == Sender::User)
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }
}

#[cfg(test)]
impl MessageHistory {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_user_keeps_text_and_rejects_blank() {
        let mut history = MessageHistory::new();
        assert!(history.push_user("   ").is_none());
        assert!(history.is_empty());

        let msg = history.push_user("  hello  ").unwrap();
        assert_eq!(msg.text(), "  hello  ");
        assert_eq!(msg.sender(), Sender::User);
    }

    #[test]
    fn test_bot_reply_requires_pending_user_turn() {
        let mut history = MessageHistory::new();
        assert!(history.push_bot("orphan").is_none());

        history.push_user("hi");
        assert!(history.push_bot("hello!").is_some());
        assert!(history.push_bot("second reply").is_none());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_order_is_chronological() {
        let mut history = MessageHistory::new();
        history.push_user("one");
        history.push_bot("two");
        history.push_user("three");
        let texts: Vec<&str> = history.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_display_prefix() {
        let mut history = MessageHistory::new();
        history.push_user("What is a noun?");
        assert_eq!(history.last().unwrap().to_string(), "You: What is a noun?");
    }

    #[test]
    fn test_transcript_line_has_time_prefix() {
        let mut history = MessageHistory::new();
        let msg = history.push_user("hi").unwrap();
        let line = msg.transcript_line();
        let expected_time = msg.created_at().with_timezone(&Local).format("%H:%M").to_string();
        assert_eq!(line, format!("[{expected_time}] You: hi"));
    }

    #[test]
    fn test_serializes_as_array() {
        let mut history = MessageHistory::new();
        history.push_user("hi");
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json[0]["sender"], "user");
        assert_eq!(json[0]["text"], "hi");
    }
}
