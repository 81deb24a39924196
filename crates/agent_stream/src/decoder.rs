use crate::event::AgentEvent;

/// Incremental decoder for the agent's line-delimited JSON stream.
///
/// Bytes arrive in arbitrary chunks; complete lines are decoded as soon as
/// their terminating newline is seen. Lines that fail to decode are dropped so
/// unknown wire shapes from newer agents never abort the stream.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<AgentEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }

            if let Some(event) = decode_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Treat any buffered bytes without a trailing newline as one final line.
    pub fn flush(&mut self) -> Vec<AgentEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }

        let remaining = std::mem::take(&mut self.buffer);
        decode_line(&remaining).into_iter().collect()
    }

    /// Clear the buffer without emitting anything.
    ///
    /// Invoked at every new transport epoch so bytes from the old connection
    /// never concatenate with bytes from the new one.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn decode_line(line: &[u8]) -> Option<AgentEvent> {
    serde_json::from_slice(line).ok()
}

#[cfg(test)]
mod tests {
    use super::LineDecoder;
    use crate::event::AgentEvent;

    #[test]
    fn events_match_whole_input_decode_for_any_split_point() {
        let input = concat!(
            "{\"type\":\"system\",\"session_id\":\"s1\",\"model\":\"m\"}\n",
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}\n",
            "{\"type\":\"result\",\"session_id\":\"s1\"}\n",
        )
        .as_bytes();

        let mut whole = LineDecoder::default();
        let expected = whole.feed(input);
        assert_eq!(expected.len(), 3);

        for split in 0..=input.len() {
            let mut decoder = LineDecoder::default();
            let mut events = decoder.feed(&input[..split]);
            events.extend(decoder.feed(&input[split..]));
            assert_eq!(events, expected, "split at byte {split}");
        }
    }

    #[test]
    fn system_then_result_in_one_feed_preserves_order() {
        let mut decoder = LineDecoder::default();
        let events = decoder.feed(
            b"{\"type\":\"system\",\"session_id\":\"s1\",\"model\":\"m\"}\n{\"type\":\"result\",\"session_id\":\"s1\"}\n",
        );

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::System(_)));
        assert!(matches!(events[1], AgentEvent::Result(_)));
    }

    #[test]
    fn partial_line_emits_nothing_until_completed() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.feed(b"{\"type\":\"system\",\"ses").is_empty());

        let events = decoder.feed(b"sion_id\":\"s1\",\"model\":\"m\"}\n");
        assert_eq!(events.len(), 1);
        let AgentEvent::System(system) = &events[0] else {
            panic!("expected system event");
        };
        assert_eq!(system.session_id, "s1");
    }

    #[test]
    fn malformed_line_is_dropped_and_decoding_continues() {
        let mut decoder = LineDecoder::default();
        let events = decoder.feed(
            b"this is not json\n{\"type\":\"result\",\"session_id\":\"s1\"}\n",
        );

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AgentEvent::Result(_)));
    }

    #[test]
    fn unknown_type_yields_unknown_event_and_decoding_continues() {
        let mut decoder = LineDecoder::default();
        let events = decoder
            .feed(b"{\"type\":\"banner\"}\n{\"type\":\"result\",\"session_id\":\"s1\"}\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AgentEvent::Unknown("banner".to_owned()));
        assert!(matches!(events[1], AgentEvent::Result(_)));
    }

    #[test]
    fn flush_decodes_unterminated_tail_as_final_line() {
        let mut decoder = LineDecoder::default();
        assert!(decoder
            .feed(b"{\"type\":\"result\",\"session_id\":\"s9\"}")
            .is_empty());

        let events = decoder.flush();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AgentEvent::Result(_)));
        assert!(decoder.is_empty());
    }

    #[test]
    fn flush_after_reset_returns_no_events() {
        let mut decoder = LineDecoder::default();
        decoder.feed(b"{\"type\":\"result\",\"session_id\":\"s1\"}");
        decoder.reset();

        assert!(decoder.flush().is_empty());
        assert!(decoder.is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut decoder = LineDecoder::default();
        let events = decoder.feed(b"\n\n{\"type\":\"result\",\"session_id\":\"s1\"}\n\n");
        assert_eq!(events.len(), 1);
    }
}
