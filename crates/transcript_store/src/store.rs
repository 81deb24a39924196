use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::TranscriptStoreError;
use crate::paths::transcript_file_name;
use crate::schema::{ConversationHeader, JsonLine, MessageRecord};

/// File-backed transcript repository: one JSONL file per conversation under a
/// store root, header line first, one message record per line.
///
/// Saves replace the whole file; the session engine persists transcript
/// snapshots rather than appending deltas, because reconnect reconciliation
/// can rewrite the tail of the conversation.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    root: PathBuf,
}

impl TranscriptStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn conversation_path(&self, conversation_id: &str) -> PathBuf {
        self.root.join(transcript_file_name(conversation_id))
    }

    /// Load a conversation's messages, validating the file shape.
    ///
    /// A conversation that was never saved loads as an empty transcript.
    pub fn load(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, TranscriptStoreError> {
        let path = self.conversation_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|source| TranscriptStoreError::io("reading transcript file", &path, source))?;

        let mut header: Option<ConversationHeader> = None;
        let mut messages = Vec::new();
        let mut seen_ids: HashSet<Uuid> = HashSet::new();

        for (line_index, line) in contents.lines().enumerate() {
            let line_number = line_index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let parsed = parse_json_line(&path, line_number, line)?;

            if header.is_none() {
                match parsed {
                    JsonLine::Conversation(parsed_header) => {
                        validate_header_line(&path, line_number, &parsed_header)?;
                        header = Some(parsed_header);
                        continue;
                    }
                    JsonLine::Message(_) => {
                        return Err(TranscriptStoreError::InvalidHeaderRecord {
                            path,
                            line: line_number,
                        });
                    }
                }
            }

            match parsed {
                JsonLine::Conversation(_) => {
                    return Err(TranscriptStoreError::InvalidMessageRecord {
                        path,
                        line: line_number,
                    });
                }
                JsonLine::Message(message) => {
                    validate_message_line(&path, line_number, &message)?;
                    if !seen_ids.insert(message.id) {
                        return Err(TranscriptStoreError::DuplicateMessageId {
                            path,
                            line: line_number,
                            id: message.id.to_string(),
                        });
                    }
                    messages.push(message);
                }
            }
        }

        if header.is_none() {
            return Err(TranscriptStoreError::MissingHeader { path });
        }

        Ok(messages)
    }

    /// Replace the conversation file with a fresh snapshot.
    pub fn save(
        &self,
        conversation_id: &str,
        messages: &[MessageRecord],
    ) -> Result<(), TranscriptStoreError> {
        fs::create_dir_all(&self.root).map_err(|source| {
            TranscriptStoreError::io("creating transcript root", &self.root, source)
        })?;

        let path = self.conversation_path(conversation_id);
        let header = ConversationHeader::v1(conversation_id, now_rfc3339()?);

        let mut contents = String::new();
        contents.push_str(
            &serde_json::to_string(&header)
                .map_err(|source| TranscriptStoreError::json_serialize(&path, source))?,
        );
        contents.push('\n');
        for message in messages {
            contents.push_str(
                &serde_json::to_string(message)
                    .map_err(|source| TranscriptStoreError::json_serialize(&path, source))?,
            );
            contents.push('\n');
        }

        // Write-then-rename so a crash mid-save never leaves a torn file.
        let staging = path.with_extension("jsonl.tmp");
        fs::write(&staging, contents)
            .map_err(|source| TranscriptStoreError::io("writing transcript file", &staging, source))?;
        fs::rename(&staging, &path)
            .map_err(|source| TranscriptStoreError::io("replacing transcript file", &path, source))
    }
}

fn parse_json_line(
    path: &Path,
    line_number: usize,
    line: &str,
) -> Result<JsonLine, TranscriptStoreError> {
    serde_json::from_str::<JsonLine>(line)
        .map_err(|source| TranscriptStoreError::json_line(path, line_number, source))
}

fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &ConversationHeader,
) -> Result<(), TranscriptStoreError> {
    if header.version != 1 {
        return Err(TranscriptStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)
}

fn validate_message_line(
    path: &Path,
    line_number: usize,
    message: &MessageRecord,
) -> Result<(), TranscriptStoreError> {
    validate_rfc3339(path, line_number, "ts", &message.ts)
}

fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), TranscriptStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(TranscriptStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}

fn now_rfc3339() -> Result<String, TranscriptStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(TranscriptStoreError::ClockFormat)
}
