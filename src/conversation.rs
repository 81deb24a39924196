use std::collections::HashMap;

use agent_stream::{AgentContentBlock, AgentEvent};
use serde_json::Value;

use crate::message::{
    ContentBlock, ConversationMessage, ToolInvocation, ToolResult, UNKNOWN_TOOL_NAME,
};

/// Correlation entry: where an invocation was recorded and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CorrelationEntry {
    message_index: usize,
    tool_name: String,
}

/// Bookkeeping for one reconnect epoch: the stale partial message left by the
/// dropped connection and the placeholder the replay fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReconnectEpoch {
    stale_index: Option<usize>,
    placeholder_index: usize,
}

/// Applies agent events to the in-memory transcript.
///
/// Holds the only "currently streaming message" reference as an explicit
/// index, reassigned at turn start, reconnect epochs, and turn end.
#[derive(Debug, Default)]
pub struct ConversationBuilder {
    messages: Vec<ConversationMessage>,
    streaming_index: Option<usize>,
    correlation: HashMap<String, CorrelationEntry>,
    epoch: Option<ReconnectEpoch>,
}

impl ConversationBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn streaming_index(&self) -> Option<usize> {
        self.streaming_index
    }

    /// Replace the transcript with loaded history and rebuild correlation.
    pub fn seed(&mut self, mut messages: Vec<ConversationMessage>) {
        for message in &mut messages {
            message.streaming = false;
        }
        self.messages = messages;
        self.streaming_index = None;
        self.epoch = None;
        self.rebuild_correlation();
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage::user(text));
    }

    /// Start a fresh streaming assistant message for a turn attempt.
    pub fn begin_assistant_turn(&mut self) {
        self.finish_streaming();
        self.streaming_index = Some(self.messages.len());
        self.messages.push(ConversationMessage::assistant_streaming());
    }

    /// Apply one decoded agent event to the transcript.
    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Assistant(assistant) => {
                let Some(index) = self.streaming_index else {
                    return;
                };
                for block in &assistant.message.content {
                    self.apply_assistant_block(index, block);
                }
            }
            AgentEvent::User(user) => {
                let Some(index) = self.streaming_index else {
                    return;
                };
                for result in &user.message.content {
                    let tool_name = self
                        .correlation
                        .get(&result.tool_use_id)
                        .map(|entry| entry.tool_name.clone())
                        .unwrap_or_else(|| UNKNOWN_TOOL_NAME.to_owned());
                    self.messages[index]
                        .content
                        .push(ContentBlock::ToolResult(ToolResult {
                            invocation_id: result.tool_use_id.clone(),
                            tool_name,
                            content: result.content.clone().unwrap_or(Value::Null),
                        }));
                }
            }
            AgentEvent::Result(_) => self.finish_streaming(),
            AgentEvent::System(_) | AgentEvent::Unknown(_) => {}
        }
    }

    fn apply_assistant_block(&mut self, index: usize, block: &AgentContentBlock) {
        match block {
            AgentContentBlock::Text { text } => {
                // Merge consecutive text blocks into one.
                if let Some(ContentBlock::Text(existing)) = self.messages[index].content.last_mut()
                {
                    existing.push_str(text);
                } else {
                    self.messages[index]
                        .content
                        .push(ContentBlock::Text(text.clone()));
                }
            }
            AgentContentBlock::ToolUse { id, name, input } => {
                self.messages[index]
                    .content
                    .push(ContentBlock::ToolInvocation(ToolInvocation::new(
                        id.clone(),
                        name.clone(),
                        input.clone(),
                    )));
                self.correlation.insert(
                    id.clone(),
                    CorrelationEntry {
                        message_index: index,
                        tool_name: name.clone(),
                    },
                );
            }
            AgentContentBlock::Unknown => {}
        }
    }

    /// Mark the in-flight message as no longer streaming.
    pub fn finish_streaming(&mut self) {
        if let Some(index) = self.streaming_index.take() {
            if let Some(message) = self.messages.get_mut(index) {
                message.streaming = false;
            }
        }
    }

    /// Append an error block to the in-flight message, or record it as its
    /// own assistant message when no turn is streaming.
    pub fn append_error(&mut self, message: impl Into<String>) {
        let block = ContentBlock::Error(message.into());
        match self.streaming_index {
            Some(index) => self.messages[index].content.push(block),
            None => {
                let mut standalone = ConversationMessage::assistant_streaming();
                standalone.streaming = false;
                standalone.content.push(block);
                self.messages.push(standalone);
            }
        }
    }

    /// Drop a stalled attempt's message when it received nothing; otherwise
    /// keep its partial content and stop streaming into it.
    pub fn discard_streaming_if_empty(&mut self) {
        let Some(index) = self.streaming_index else {
            return;
        };
        if self.messages[index].is_empty() {
            self.messages.remove(index);
            self.streaming_index = None;
            self.rebuild_correlation();
        } else {
            self.finish_streaming();
        }
    }

    /// Open a reconnect epoch: keep the stale partial message in place and
    /// stream the replay into a fresh placeholder.
    pub fn begin_reconnect_epoch(&mut self) {
        let stale_index = self.streaming_index;
        if let Some(stale) = stale_index {
            self.messages[stale].streaming = false;
        }

        let placeholder_index = self.messages.len();
        self.messages.push(ConversationMessage::assistant_streaming());
        self.streaming_index = Some(placeholder_index);
        self.epoch = Some(ReconnectEpoch {
            stale_index,
            placeholder_index,
        });
        // A new connection is a new byte stream; correlation must not carry
        // entries the replay will re-register.
        self.rebuild_correlation();
    }

    /// Close the reconnect epoch after the replay stream ended cleanly.
    ///
    /// A non-empty replay supersedes the stale partial message; an empty
    /// replay discards the placeholder and keeps the stale partial.
    pub fn resolve_reconnect_epoch(&mut self) {
        let Some(epoch) = self.epoch.take() else {
            return;
        };

        let replay_non_empty = self
            .messages
            .get(epoch.placeholder_index)
            .is_some_and(|message| !message.is_empty());

        if replay_non_empty {
            if let Some(stale) = epoch.stale_index {
                self.messages.remove(stale);
                if let Some(streaming) = self.streaming_index {
                    if streaming > stale {
                        self.streaming_index = Some(streaming - 1);
                    }
                }
            }
        } else {
            self.messages.remove(epoch.placeholder_index);
            if self.streaming_index == Some(epoch.placeholder_index) {
                self.streaming_index = epoch.stale_index;
            }
        }

        self.rebuild_correlation();
    }

    /// Abort the reconnect epoch after the reattach attempt itself failed:
    /// drop the placeholder and restore the stale partial as in-flight.
    pub fn abandon_reconnect_epoch(&mut self) {
        let Some(epoch) = self.epoch.take() else {
            return;
        };

        if epoch.placeholder_index < self.messages.len() {
            self.messages.remove(epoch.placeholder_index);
        }
        self.streaming_index = epoch.stale_index;
        if let Some(stale) = epoch.stale_index {
            if let Some(message) = self.messages.get_mut(stale) {
                message.streaming = true;
            }
        }

        self.rebuild_correlation();
    }

    /// Rebuild the correlation index from every invocation in the transcript.
    pub fn rebuild_correlation(&mut self) {
        self.correlation.clear();
        for (message_index, message) in self.messages.iter().enumerate() {
            for block in &message.content {
                if let ContentBlock::ToolInvocation(invocation) = block {
                    self.correlation.insert(
                        invocation.invocation_id.clone(),
                        CorrelationEntry {
                            message_index,
                            tool_name: invocation.tool_name.clone(),
                        },
                    );
                }
            }
        }
    }

    #[cfg(test)]
    fn resolved_tool_name(&self, invocation_id: &str) -> Option<&str> {
        self.correlation
            .get(invocation_id)
            .map(|entry| entry.tool_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use agent_stream::AgentEvent;
    use serde_json::json;

    use super::ConversationBuilder;
    use crate::message::{ContentBlock, UNKNOWN_TOOL_NAME};

    fn event(line: &str) -> AgentEvent {
        serde_json::from_str(line).expect("event should decode")
    }

    fn builder_mid_turn() -> ConversationBuilder {
        let mut builder = ConversationBuilder::new();
        builder.push_user("do the thing");
        builder.begin_assistant_turn();
        builder
    }

    #[test]
    fn consecutive_text_blocks_merge_into_one() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hello, "}]}}"#,
        ));
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"world"}]}}"#,
        ));

        let message = &builder.messages()[1];
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.text(), "Hello, world");
    }

    #[test]
    fn tool_use_interrupts_text_merging() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[
                {"type":"text","text":"a"},
                {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}},
                {"type":"text","text":"b"}
            ]}}"#,
        ));

        let message = &builder.messages()[1];
        assert_eq!(message.content.len(), 3);
        assert!(matches!(message.content[1], ContentBlock::ToolInvocation(_)));
        assert_eq!(builder.resolved_tool_name("t1"), Some("Bash"));
    }

    #[test]
    fn tool_results_resolve_names_via_correlation() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[
                {"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"a.rs"}}
            ]}}"#,
        ));
        builder.apply(&event(
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"t1","content":"fn main() {}"}
            ]}}"#,
        ));

        let message = &builder.messages()[1];
        let ContentBlock::ToolResult(result) = &message.content[1] else {
            panic!("expected tool result block");
        };
        assert_eq!(result.tool_name, "Read");
        assert_eq!(result.content, json!("fn main() {}"));
    }

    #[test]
    fn unseen_invocation_id_resolves_to_unknown_without_error() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"never-seen","content":"x"}
            ]}}"#,
        ));

        let message = &builder.messages()[1];
        let ContentBlock::ToolResult(result) = &message.content[0] else {
            panic!("expected tool result block");
        };
        assert_eq!(result.tool_name, UNKNOWN_TOOL_NAME);
    }

    #[test]
    fn result_event_stops_streaming() {
        let mut builder = builder_mid_turn();
        assert!(builder.messages()[1].streaming);

        builder.apply(&event(r#"{"type":"result","session_id":"s1"}"#));

        assert!(!builder.messages()[1].streaming);
        assert!(builder.streaming_index().is_none());
    }

    #[test]
    fn events_without_a_streaming_message_are_ignored() {
        let mut builder = ConversationBuilder::new();
        builder.push_user("hi");
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"late"}]}}"#,
        ));

        assert_eq!(builder.messages().len(), 1);
    }

    #[test]
    fn non_empty_replay_supersedes_the_stale_partial() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#,
        ));

        builder.begin_reconnect_epoch();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial and the rest"}]}}"#,
        ));
        builder.resolve_reconnect_epoch();
        builder.finish_streaming();

        assert_eq!(builder.messages().len(), 2);
        assert_eq!(builder.messages()[1].text(), "partial and the rest");
    }

    #[test]
    fn empty_replay_keeps_the_stale_partial() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#,
        ));

        builder.begin_reconnect_epoch();
        builder.resolve_reconnect_epoch();
        builder.finish_streaming();

        assert_eq!(builder.messages().len(), 2);
        assert_eq!(builder.messages()[1].text(), "partial");
    }

    #[test]
    fn abandoned_epoch_restores_the_stale_partial_as_streaming() {
        let mut builder = builder_mid_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#,
        ));

        builder.begin_reconnect_epoch();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"half a replay"}]}}"#,
        ));
        builder.abandon_reconnect_epoch();

        assert_eq!(builder.messages().len(), 2);
        assert_eq!(builder.messages()[1].text(), "partial");
        assert!(builder.messages()[1].streaming);
    }

    #[test]
    fn seed_clears_streaming_flags_and_rebuilds_correlation() {
        let mut source = builder_mid_turn();
        source.apply(&event(
            r#"{"type":"assistant","message":{"content":[
                {"type":"tool_use","id":"t9","name":"Grep","input":{}}
            ]}}"#,
        ));
        let snapshot = source.messages().to_vec();

        let mut builder = ConversationBuilder::new();
        builder.seed(snapshot);

        assert!(builder.messages().iter().all(|message| !message.streaming));
        assert_eq!(builder.resolved_tool_name("t9"), Some("Grep"));
    }

    #[test]
    fn discard_streaming_drops_only_empty_attempts() {
        let mut builder = builder_mid_turn();
        builder.discard_streaming_if_empty();
        assert_eq!(builder.messages().len(), 1);

        builder.begin_assistant_turn();
        builder.apply(&event(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"kept"}]}}"#,
        ));
        builder.discard_streaming_if_empty();
        assert_eq!(builder.messages().len(), 2);
        assert!(!builder.messages()[1].streaming);
    }
}
