//! Incremental server-sent events decoder.

/// One dispatched SSE message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Splits a byte stream into SSE messages.
///
/// Bytes are pushed as they arrive; complete messages are pulled with
/// [`SseDecoder::next_message`]. Comment lines (keep-alives) are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Option<SseMessage> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                if self.data.is_empty() && self.event.is_none() && self.id.is_none() {
                    continue;
                }
                return Some(SseMessage {
                    event: self.event.take(),
                    data: std::mem::take(&mut self.data).join("\n"),
                    id: self.id.take(),
                });
            }

            if line[0] == b':' {
                continue;
            }

            let (field, value) = match line.iter().position(|&b| b == b':') {
                Some(colon) => {
                    let value = &line[colon + 1..];
                    (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
                }
                None => (&line[..], &[][..]),
            };
            let value = String::from_utf8_lossy(value).into_owned();

            match field {
                b"event" => self.event = Some(value),
                b"data" => self.data.push(value),
                b"id" if !value.is_empty() => self.id = Some(value),
                _ => {}
            }
        }
    }
}
