//! Core types for completion requests and results.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// `"user"`, `"assistant"`, `"system"`, or any provider-specific role.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a message with an arbitrary role.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a `"user"` message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an `"assistant"` message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Create a `"system"` message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// What the caller wants completed: a conversation, a bare prompt, or both.
///
/// A message sequence always takes precedence over the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionInput {
    /// Full conversation, in chat-history order.
    pub messages: Option<Vec<Message>>,
    /// Single prompt, used only when `messages` is `None`.
    pub prompt: Option<String>,
}

impl CompletionInput {
    /// Input from a conversation.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            prompt: None,
        }
    }

    /// Input from a single prompt.
    #[must_use]
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: None,
            prompt: Some(prompt.into()),
        }
    }
}

impl From<Vec<Message>> for CompletionInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}

impl From<&str> for CompletionInput {
    fn from(prompt: &str) -> Self {
        Self::from_prompt(prompt)
    }
}

impl From<String> for CompletionInput {
    fn from(prompt: String) -> Self {
        Self::from_prompt(prompt)
    }
}

/// The uniform output unit, whatever schema the provider answered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedChoice {
    /// Generated (or fallback) text.
    pub text: String,
}

impl NormalizedChoice {
    /// Create a choice.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A normalised completion. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionResult {
    choices: Vec<NormalizedChoice>,
}

impl CompletionResult {
    /// A result holding exactly one choice.
    #[must_use]
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            choices: vec![NormalizedChoice::new(text)],
        }
    }

    /// A result from several choices; `None` when `choices` is empty.
    #[must_use]
    pub fn from_choices(choices: Vec<NormalizedChoice>) -> Option<Self> {
        if choices.is_empty() {
            None
        } else {
            Some(Self { choices })
        }
    }

    /// All choices, in provider order.
    #[must_use]
    pub fn choices(&self) -> &[NormalizedChoice] {
        &self.choices
    }

    /// Text of the first choice.
    #[must_use]
    pub fn first_text(&self) -> &str {
        self.choices.first().map_or("", |c| c.text.as_str())
    }

    /// Re-wrap as an OpenAI chat-completion body:
    /// `{"choices":[{"message":{"role":"assistant","content":…}}]}`.
    #[must_use]
    pub fn to_chat_completion_json(&self) -> Value {
        let choices: Vec<Value> = self
            .choices
            .iter()
            .enumerate()
            .map(|(index, c)| {
                json!({
                    "index": index,
                    "message": { "role": "assistant", "content": c.text },
                })
            })
            .collect();
        json!({ "choices": choices })
    }

    /// Re-wrap as an OpenAI legacy completion body:
    /// `{"choices":[{"text":…}]}`.
    #[must_use]
    pub fn to_text_completion_json(&self) -> Value {
        let choices: Vec<Value> = self
            .choices
            .iter()
            .enumerate()
            .map(|(index, c)| json!({ "index": index, "text": c.text }))
            .collect();
        json!({ "choices": choices })
    }
}
