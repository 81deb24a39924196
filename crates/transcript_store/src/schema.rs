use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRecordType {
    Conversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRecordType {
    Message,
}

/// First line of every transcript file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationHeader {
    #[serde(rename = "type")]
    pub record_type: ConversationRecordType,
    pub version: u32,
    pub conversation_id: String,
    pub created_at: String,
}

impl ConversationHeader {
    #[must_use]
    pub fn v1(conversation_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            record_type: ConversationRecordType::Conversation,
            version: 1,
            conversation_id: conversation_id.into(),
            created_at: created_at.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRecord {
    User,
    Assistant,
    System,
}

/// One persisted conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRecord {
    #[serde(rename = "type")]
    pub record_type: MessageRecordType,
    pub id: Uuid,
    pub ts: String,
    pub role: RoleRecord,
    pub content: Vec<ContentRecord>,
}

impl MessageRecord {
    #[must_use]
    pub fn new(
        id: Uuid,
        ts: impl Into<String>,
        role: RoleRecord,
        content: Vec<ContentRecord>,
    ) -> Self {
        Self {
            record_type: MessageRecordType::Message,
            id,
            ts: ts.into(),
            role,
            content,
        }
    }
}

/// Persisted form of one content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ContentRecord {
    Text {
        text: String,
    },
    ToolInvocation {
        invocation_id: String,
        tool_name: String,
        input: Value,
    },
    ToolResult {
        invocation_id: String,
        tool_name: String,
        content: Value,
    },
    Error {
        message: String,
    },
}

// Untagged: the single-variant `record_type` enums make the two shapes
// mutually exclusive, and the `type` field stays visible to the inner struct.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum JsonLine {
    Conversation(ConversationHeader),
    Message(MessageRecord),
}
