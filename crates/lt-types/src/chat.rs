//! Chat conversation data model shared by datasets, backends, and scoring.

use serde::{Deserialize, Serialize};

/// Speaker role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// An ordered conversation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Split off the final turn as the reference label, leaving the context.
    /// Returns `None` for an empty conversation.
    pub fn split_last(&self) -> Option<(ChatHistory, String)> {
        let (last, context) = self.messages.split_last()?;
        Some((ChatHistory::new(context.to_vec()), last.content.clone()))
    }

    /// Keep only the trailing `max_turns` messages. Used to honor the
    /// `context_length` parameter of a run configuration.
    pub fn window(&self, max_turns: usize) -> ChatHistory {
        let skip = self.messages.len().saturating_sub(max_turns);
        ChatHistory::new(self.messages[skip..].to_vec())
    }

    /// Flatten to `role: content` lines for logging and metric contexts.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> ChatHistory {
        ChatHistory::new(vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("Hi there"),
            ChatMessage::assistant("Hello! How can I help?"),
        ])
    }

    #[test]
    fn split_last_separates_label() {
        let history = sample_history();
        let (context, label) = history.split_last().unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(label, "Hello! How can I help?");
        assert!(ChatHistory::default().split_last().is_none());
    }

    #[test]
    fn window_keeps_trailing_turns() {
        let history = sample_history();
        let windowed = history.window(2);
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed.messages[0].role, ChatRole::User);
        // Window larger than the conversation is a no-op
        assert_eq!(history.window(10).len(), 3);
    }

    #[test]
    fn render_joins_roles_and_content() {
        let rendered = sample_history().render();
        assert!(rendered.starts_with("system: You are a helpful assistant."));
        assert!(rendered.contains("user: Hi there"));
    }

    #[test]
    fn role_serialization_is_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("x")).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }
}
