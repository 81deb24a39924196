mod error;
mod paths;
mod schema;
mod store;

pub use error::TranscriptStoreError;
pub use paths::{transcript_file_name, transcript_root};
pub use schema::{
    ContentRecord, ConversationHeader, ConversationRecordType, MessageRecord, MessageRecordType,
    RoleRecord,
};
pub use store::TranscriptStore;
