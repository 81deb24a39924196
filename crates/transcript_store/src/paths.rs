use std::path::{Path, PathBuf};

pub const TRANSCRIPT_DIR: [&str; 2] = [".tether", "transcripts"];

#[must_use]
pub fn transcript_root(base: &Path) -> PathBuf {
    base.join(TRANSCRIPT_DIR[0]).join(TRANSCRIPT_DIR[1])
}

#[must_use]
pub fn sanitize_conversation_id_for_filename(conversation_id: &str) -> String {
    conversation_id
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn transcript_file_name(conversation_id: &str) -> String {
    format!(
        "{}.jsonl",
        sanitize_conversation_id_for_filename(conversation_id)
    )
}

#[cfg(test)]
mod tests {
    use super::transcript_file_name;

    #[test]
    fn hostile_filename_characters_are_replaced() {
        assert_eq!(transcript_file_name("pod-1/chat 2"), "pod-1-chat-2.jsonl");
    }
}
