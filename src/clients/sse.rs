//! Incremental Server-Sent Events parsing for the streaming chat-completion
//! client. Adapted from the teacher's `fae_llm::providers::sse` parser,
//! trimmed to the `data:`/`[DONE]` subset the upstream OpenAI-compatible
//! endpoint actually emits.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub data: String,
}

impl SseEvent {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    data_lines: Vec<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        SseEvent { data: self.data_lines.join("\n") }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.has_data() {
                let event = self.build();
                self.data_lines.clear();
                return Some(event);
            }
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data_lines.push(value.to_string());
        }
        None
    }
}

/// Feed chunks of bytes as they arrive over the wire; collect complete
/// events as they become available.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: String,
    builder: EventBuilder,
}

impl SseLineParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let text = String::from_utf8_lossy(chunk);
        let mut events = Vec::new();
        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
                if let Some(event) = self.builder.process_line(&line) {
                    events.push(event);
                }
            } else {
                self.line_buffer.push(ch);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_with_trailing_blank_line_yields_one_event() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn event_split_across_two_chunks_is_reassembled() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        let events = parser.push(b"lo\n\n");
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn done_sentinel_is_recognised() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: [DONE]\n\n");
        assert!(events[0].is_done());
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: hi\r\n\r\n");
        assert_eq!(events[0].data, "hi");
    }
}
