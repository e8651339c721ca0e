//! Incremental Server-Sent-Events parser for the HTTP client.

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

/// Feeds on raw bytes, emits complete frames. Partial lines and
/// frames are buffered across chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current_id: Option<String>,
    current_event: Option<String>,
    current_data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            if line.ends_with('\n') {
                line.pop();
            }
            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                if !self.current_data.is_empty() {
                    frames.push(SseFrame {
                        id: self.current_id.take(),
                        event: self.current_event.take(),
                        data: self.current_data.join("\n"),
                    });
                    self.current_data.clear();
                } else {
                    self.current_event = None;
                }
                continue;
            }
            if line.starts_with(':') {
                continue; // comment / keep-alive
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            match field {
                "id" => self.current_id = Some(value.to_string()),
                "event" => self.current_event = Some(value.to_string()),
                "data" => self.current_data.push(value.to_string()),
                _ => {} // unknown fields are ignored
            }
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_frame() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"id: 3\nevent: message\ndata: {\"x\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                id: Some("3".to_string()),
                event: Some("message".to_string()),
                data: "{\"x\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn partial_chunks_accumulate() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"id: 7\nda").is_empty());
        assert!(parser.feed(b"ta: hello\n").is_empty());
        let frames = parser.feed(b"\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn comments_are_skipped() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b": keep-alive\n\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn multiline_data_joined() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"data: a\ndata: b\n\n");
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn crlf_lines_accepted() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"id: 1\r\ndata: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("1"));
    }

    #[test]
    fn named_terminal_event() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event: events-gone\ndata: resync\n\n");
        assert_eq!(frames[0].event.as_deref(), Some("events-gone"));
    }
}
