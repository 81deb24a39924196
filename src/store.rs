use async_trait::async_trait;
use transcript_store::{ContentRecord, MessageRecord, RoleRecord, TranscriptStore};

use crate::error::SessionError;
use crate::message::{ContentBlock, ConversationMessage, Role, ToolInvocation, ToolResult};

/// Load/save contract for conversation transcripts.
///
/// Saves are fire-and-forget snapshots triggered by the controller; they must
/// never block the event loop.
#[async_trait]
pub trait TranscriptRepository: Send + Sync {
    async fn load(&self, conversation_id: &str)
        -> Result<Vec<ConversationMessage>, SessionError>;

    async fn save(
        &self,
        conversation_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<(), SessionError>;
}

/// JSONL-file-backed repository over [`transcript_store::TranscriptStore`].
#[derive(Debug, Clone)]
pub struct FileTranscriptRepository {
    store: TranscriptStore,
}

impl FileTranscriptRepository {
    #[must_use]
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: TranscriptStore::new(root),
        }
    }
}

#[async_trait]
impl TranscriptRepository for FileTranscriptRepository {
    async fn load(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>, SessionError> {
        let store = self.store.clone();
        let conversation_id = conversation_id.to_owned();

        let records = tokio::task::spawn_blocking(move || store.load(&conversation_id))
            .await
            .map_err(|error| SessionError::Store(error.to_string()))?
            .map_err(|error| SessionError::Store(error.to_string()))?;

        Ok(records.into_iter().map(message_from_record).collect())
    }

    async fn save(
        &self,
        conversation_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<(), SessionError> {
        let store = self.store.clone();
        let conversation_id = conversation_id.to_owned();
        let records: Vec<MessageRecord> = messages.iter().map(record_from_message).collect();

        tokio::task::spawn_blocking(move || store.save(&conversation_id, &records))
            .await
            .map_err(|error| SessionError::Store(error.to_string()))?
            .map_err(|error| SessionError::Store(error.to_string()))
    }
}

fn record_from_message(message: &ConversationMessage) -> MessageRecord {
    MessageRecord::new(
        message.id,
        message.created_at.clone(),
        role_record(message.role),
        message.content.iter().map(content_record).collect(),
    )
}

fn message_from_record(record: MessageRecord) -> ConversationMessage {
    ConversationMessage {
        id: record.id,
        created_at: record.ts,
        role: role_from_record(record.role),
        content: record.content.into_iter().map(content_from_record).collect(),
        streaming: false,
    }
}

fn role_record(role: Role) -> RoleRecord {
    match role {
        Role::User => RoleRecord::User,
        Role::Assistant => RoleRecord::Assistant,
        Role::System => RoleRecord::System,
    }
}

fn role_from_record(role: RoleRecord) -> Role {
    match role {
        RoleRecord::User => Role::User,
        RoleRecord::Assistant => Role::Assistant,
        RoleRecord::System => Role::System,
    }
}

fn content_record(block: &ContentBlock) -> ContentRecord {
    match block {
        ContentBlock::Text(text) => ContentRecord::Text { text: text.clone() },
        ContentBlock::ToolInvocation(invocation) => ContentRecord::ToolInvocation {
            invocation_id: invocation.invocation_id.clone(),
            tool_name: invocation.tool_name.clone(),
            input: invocation.input.clone(),
        },
        ContentBlock::ToolResult(result) => ContentRecord::ToolResult {
            invocation_id: result.invocation_id.clone(),
            tool_name: result.tool_name.clone(),
            content: result.content.clone(),
        },
        ContentBlock::Error(message) => ContentRecord::Error {
            message: message.clone(),
        },
    }
}

fn content_from_record(record: ContentRecord) -> ContentBlock {
    match record {
        ContentRecord::Text { text } => ContentBlock::Text(text),
        ContentRecord::ToolInvocation {
            invocation_id,
            tool_name,
            input,
        } => ContentBlock::ToolInvocation(ToolInvocation::new(invocation_id, tool_name, input)),
        ContentRecord::ToolResult {
            invocation_id,
            tool_name,
            content,
        } => ContentBlock::ToolResult(ToolResult {
            invocation_id,
            tool_name,
            content,
        }),
        ContentRecord::Error { message } => ContentBlock::Error(message),
    }
}
