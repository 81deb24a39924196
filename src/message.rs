use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Tool name reported when a result's invocation id was never seen.
pub const UNKNOWN_TOOL_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// An agent-issued action request, kept for later result correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub invocation_id: String,
    pub tool_name: String,
    pub input: Value,
    pub expanded: bool,
}

impl ToolInvocation {
    #[must_use]
    pub fn new(invocation_id: impl Into<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            input,
            expanded: false,
        }
    }
}

/// Outcome of a [`ToolInvocation`], with the name resolved via correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub invocation_id: String,
    pub tool_name: String,
    pub content: Value,
}

/// One unit of message content; consumers match exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolInvocation(ToolInvocation),
    ToolResult(ToolResult),
    Error(String),
}

/// One turn's utterance in the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub created_at: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub streaming: bool,
}

impl ConversationMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now_rfc3339(),
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
            streaming: false,
        }
    }

    /// Empty assistant message that the stream will fill in.
    #[must_use]
    pub fn assistant_streaming() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now_rfc3339(),
            role: Role::Assistant,
            content: Vec::new(),
            streaming: true,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Concatenated text blocks, used for previews and tests.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_owned())
}
