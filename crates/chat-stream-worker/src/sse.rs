//! Incremental decoder for chat-completion SSE streams.
//!
//! Bytes go in through [`SseDecoder::push_chunk`] in whatever pieces the
//! transport delivers them; cumulative assistant text comes out as
//! [`DecoderEvent`]s. The decoder has no I/O and can be driven from tests
//! directly.

use tracing::debug;

use crate::errors::StreamError;

const DONE_MARKER: &str = "[DONE]";
const DATA_PREFIX: &str = "data:";

/// Result of feeding bytes to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// New delta content was appended; carries the cumulative text.
    Progress(String),
    /// One event's payload was not valid JSON. Decoding continues.
    ParseError(StreamError),
    /// Stream finished; carries the final cumulative text.
    Done(String),
}

impl DecoderEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// UTF-8 decoder that tolerates multi-byte characters split across chunks.
///
/// Incomplete trailing sequences are held back until the next chunk. Invalid
/// sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the input.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Ends the stream. A held-back partial sequence becomes one U+FFFD.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Splits `buffer + chunk` on `\n`.
///
/// Returns the complete lines and the trailing fragment that is not yet
/// newline-terminated (possibly empty).
pub fn split_lines(buffer: &str, chunk: &str) -> (Vec<String>, String) {
    let mut joined = String::with_capacity(buffer.len() + chunk.len());
    joined.push_str(buffer);
    joined.push_str(chunk);

    let mut lines: Vec<String> = joined.split('\n').map(ToOwned::to_owned).collect();
    let rest = lines.pop().unwrap_or_default();
    (lines, rest)
}

/// Parses one event payload and returns `choices[0].delta.content` when it is
/// a non-empty string.
pub fn extract_delta_content(payload: &str) -> Result<Option<String>, StreamError> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| StreamError::parse(format!("invalid SSE JSON payload: {e}")))?;
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned))
}

/// Per-task decoder state.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8StreamDecoder,
    line_buf: String,
    event_data: Vec<String>,
    text: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative text so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True once `[DONE]` was seen or `finish` was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one chunk of the response body.
    ///
    /// After a `[DONE]` event everything else, including the rest of this
    /// chunk, is discarded.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<DecoderEvent> {
        if self.finished {
            return Vec::new();
        }
        let decoded = self.utf8.decode(chunk);
        let (lines, rest) = split_lines(&self.line_buf, &decoded);
        self.line_buf = rest;

        let mut events = Vec::new();
        for line in &lines {
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
            if self.finished {
                self.line_buf.clear();
                self.event_data.clear();
                break;
            }
        }
        events
    }

    /// Signals end of stream.
    ///
    /// Folds the `data:` lines already collected for the current event into
    /// the text, then returns the terminal `Done`. The unterminated tail of
    /// the line buffer is never a complete line and is dropped. Returns `None`
    /// if the decoder already finished on `[DONE]`.
    pub fn finish(&mut self) -> Option<DecoderEvent> {
        if self.finished {
            return None;
        }
        let _ = self.utf8.flush();
        self.line_buf.clear();

        if !self.event_data.is_empty() {
            let payload = std::mem::take(&mut self.event_data).concat();
            if payload != DONE_MARKER {
                match extract_delta_content(&payload) {
                    Ok(Some(delta)) => self.text.push_str(&delta),
                    Ok(None) => {}
                    Err(err) => {
                        debug!(
                            detail = err.detail().unwrap_or_default(),
                            "dropping malformed trailing event"
                        );
                    }
                }
            }
        }

        self.finished = true;
        Some(DecoderEvent::Done(self.text.clone()))
    }

    fn process_line(&mut self, raw: &str) -> Option<DecoderEvent> {
        let line = raw.trim();
        if line.is_empty() {
            return self.dispatch_event();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            self.event_data.push(data.trim().to_string());
        }
        // id:, event:, retry: and unknown fields are ignored.
        None
    }

    fn dispatch_event(&mut self) -> Option<DecoderEvent> {
        if self.event_data.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.event_data).concat();
        if payload == DONE_MARKER {
            self.finished = true;
            return Some(DecoderEvent::Done(self.text.clone()));
        }
        match extract_delta_content(&payload) {
            Ok(Some(delta)) => {
                self.text.push_str(&delta);
                Some(DecoderEvent::Progress(self.text.clone()))
            }
            Ok(None) => None,
            Err(err) => Some(DecoderEvent::ParseError(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_event(content: &str) -> String {
        let payload = serde_json::json!({"choices":[{"delta":{"content":content}}]});
        format!("data: {payload}\n\n")
    }

    fn decode_in_chunks(chunks: &[&[u8]]) -> Vec<DecoderEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push_chunk(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    fn final_text(events: &[DecoderEvent]) -> String {
        match events.last() {
            Some(DecoderEvent::Done(text)) => text.clone(),
            other => panic!("expected terminal Done, got {other:?}"),
        }
    }

    #[test]
    fn split_lines_keeps_trailing_fragment() {
        let (lines, rest) = split_lines("par", "tial\nnext\nrem");
        assert_eq!(lines, vec!["partial".to_string(), "next".to_string()]);
        assert_eq!(rest, "rem");

        let (lines, rest) = split_lines("abc", "def");
        assert!(lines.is_empty());
        assert_eq!(rest, "abcdef");

        let (lines, rest) = split_lines("", "done\n");
        assert_eq!(lines, vec!["done".to_string()]);
        assert_eq!(rest, "");
    }

    #[test]
    fn emits_cumulative_progress_then_done() {
        let input = format!(
            "{}{}data: [DONE]\n\n",
            delta_event("Hi"),
            delta_event(" there")
        );
        let events = decode_in_chunks(&[input.as_bytes()]);
        assert_eq!(
            events,
            vec![
                DecoderEvent::Progress("Hi".into()),
                DecoderEvent::Progress("Hi there".into()),
                DecoderEvent::Done("Hi there".into()),
            ]
        );
    }

    #[test]
    fn multi_line_data_is_concatenated_without_separator() {
        let input = "data: {\"choices\":[{\"delta\":\ndata: {\"content\":\"AB\"}}]}\n\n";
        let mut decoder = SseDecoder::new();
        assert_eq!(
            decoder.push_chunk(input.as_bytes()),
            vec![DecoderEvent::Progress("AB".into())]
        );
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_result() {
        let input = format!(
            "{}: keep-alive\r\n{}{}data: [DONE]\n\n",
            delta_event("你好"),
            delta_event(", café"),
            delta_event(" 🚀"),
        );
        let bytes = input.as_bytes();
        let expected = final_text(&decode_in_chunks(&[bytes]));
        assert_eq!(expected, "你好, café 🚀");

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(final_text(&decode_in_chunks(&[a, b])), expected, "split at {split}");
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(final_text(&decode_in_chunks(&singles)), expected);
    }

    #[test]
    fn utf8_decoder_holds_back_split_characters() {
        let mut utf8 = Utf8StreamDecoder::default();
        let bytes = "你".as_bytes();
        assert_eq!(utf8.decode(&bytes[..2]), "");
        assert_eq!(utf8.decode(&bytes[2..]), "你");
        assert_eq!(utf8.flush(), "");
    }

    #[test]
    fn utf8_decoder_replaces_invalid_and_truncated_sequences() {
        let mut utf8 = Utf8StreamDecoder::default();
        assert_eq!(utf8.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(utf8.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(utf8.flush(), "\u{FFFD}");
    }

    #[test]
    fn malformed_json_is_reported_and_skipped() {
        let input = format!("data: not-json\n\n{}", delta_event("ok"));
        let mut decoder = SseDecoder::new();
        let events = decoder.push_chunk(input.as_bytes());
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            DecoderEvent::ParseError(StreamError::Parse { .. })
        ));
        assert_eq!(events[1], DecoderEvent::Progress("ok".into()));
        assert_eq!(decoder.finish(), Some(DecoderEvent::Done("ok".into())));
    }

    #[test]
    fn done_discards_everything_after_it() {
        let input = format!("{}data: [DONE]\n\n{}data: {{", delta_event("a"), delta_event("b"));
        let mut decoder = SseDecoder::new();
        let events = decoder.push_chunk(input.as_bytes());
        assert_eq!(
            events,
            vec![
                DecoderEvent::Progress("a".into()),
                DecoderEvent::Done("a".into())
            ]
        );
        assert!(decoder.is_finished());
        assert!(decoder.push_chunk(delta_event("c").as_bytes()).is_empty());
        assert_eq!(decoder.finish(), None);
        assert_eq!(decoder.text(), "a");
    }

    #[test]
    fn unterminated_trailing_data_line_adds_nothing() {
        let pending = delta_event(" there");
        let input = format!("{}{}", delta_event("Hi"), pending.trim_end());
        let events = decode_in_chunks(&[input.as_bytes()]);
        assert_eq!(
            events,
            vec![
                DecoderEvent::Progress("Hi".into()),
                DecoderEvent::Done("Hi".into()),
            ]
        );
    }

    #[test]
    fn end_of_stream_with_terminated_line_but_no_blank_line() {
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
        let events = decode_in_chunks(&[input.as_bytes()]);
        assert_eq!(events, vec![DecoderEvent::Done("x".into())]);
    }

    #[test]
    fn empty_stream_still_completes() {
        assert_eq!(decode_in_chunks(&[]), vec![DecoderEvent::Done(String::new())]);
    }

    #[test]
    fn pending_malformed_or_done_payload_at_eof_is_skipped() {
        let input = format!("{}data: [DONE]\n", delta_event("a"));
        assert_eq!(final_text(&decode_in_chunks(&[input.as_bytes()])), "a");

        let input = format!("{}data: {{broken\n", delta_event("a"));
        let events = decode_in_chunks(&[input.as_bytes()]);
        assert_eq!(
            events,
            vec![
                DecoderEvent::Progress("a".into()),
                DecoderEvent::Done("a".into())
            ]
        );
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let input = format!(
            ": keep-alive\nid: 7\nevent: message\nretry: 100\n{}",
            delta_event("x")
        );
        let mut decoder = SseDecoder::new();
        assert_eq!(
            decoder.push_chunk(input.as_bytes()),
            vec![DecoderEvent::Progress("x".into())]
        );
    }

    #[test]
    fn json_without_content_emits_nothing() {
        let input = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n\
                     data: {\"choices\":[]}\n\n\
                     data: 42\n\n";
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_chunk(input.as_bytes()).is_empty());
        assert_eq!(decoder.text(), "");
    }

    #[test]
    fn blank_lines_without_data_do_not_dispatch() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_chunk(b"\n\n\r\n: ping\n\n").is_empty());
    }
}
