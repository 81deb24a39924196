//! Replayed managed-transport output through the full decode pipeline:
//! timestamp stripping, incremental line decoding, transcript building.

use agent_stream::LineDecoder;
use pod_api::strip_log_timestamps;
use tether::ConversationBuilder;

const REPLAY: &str = concat!(
    "2026-02-19T09:13:24.665Z [stdout] {\"type\":\"system\",\"session_id\":\"s1\",\"model\":\"sonnet\"}\n",
    "2026-02-19T09:13:25.001Z [stdout] {\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"Checking \"}]}}\n",
    "2026-02-19T09:13:25.440Z [stdout] {\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"the build.\"},{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"Bash\",\"input\":{\"command\":\"cargo check\"}}]}}\n",
    "2026-02-19T09:13:26.120Z [stdout] {\"type\":\"user\",\"message\":{\"content\":[{\"type\":\"tool_result\",\"tool_use_id\":\"t1\",\"content\":\"ok\"}]}}\n",
    "2026-02-19T09:13:27.000Z [stdout] {\"type\":\"result\",\"session_id\":\"s1\"}\n",
);

#[test]
fn stripped_replay_rebuilds_the_full_turn_at_any_chunking() {
    let stripped = strip_log_timestamps(REPLAY);
    let bytes = stripped.as_bytes();

    // The wire chunks arbitrarily; the rebuilt transcript must not care.
    for chunk_size in [1, 7, 64, bytes.len()] {
        let mut decoder = LineDecoder::default();
        let mut builder = ConversationBuilder::new();
        builder.push_user("check the build");
        builder.begin_assistant_turn();

        for chunk in bytes.chunks(chunk_size) {
            for event in decoder.feed(chunk) {
                builder.apply(&event);
            }
        }
        for event in decoder.flush() {
            builder.apply(&event);
        }

        let messages = builder.messages();
        assert_eq!(messages.len(), 2, "chunk size {chunk_size}");

        let turn = &messages[1];
        assert!(!turn.streaming, "result event must end streaming");
        assert_eq!(turn.text(), "Checking the build.");
        assert_eq!(turn.content.len(), 3, "merged text + invocation + result");

        let tether::ContentBlock::ToolResult(result) = &turn.content[2] else {
            panic!("expected a tool result block");
        };
        assert_eq!(result.tool_name, "Bash");
    }
}

#[test]
fn unprefixed_live_lines_pass_through_the_same_pipeline() {
    let live = "{\"type\":\"system\",\"session_id\":\"s2\"}\n";
    assert_eq!(strip_log_timestamps(live), live);

    let mut decoder = LineDecoder::default();
    let events = decoder.feed(strip_log_timestamps(live).as_bytes());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].session_id(), Some("s2"));
}
