//! Transport framing: UTF-8 block decoding, frame extraction from SSE and
//! newline-delimited text, and recombination of payloads split across frames.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Upper bound on fragments held while waiting for a split payload to
/// complete. Once exceeded, the oldest fragment is evicted, so a permanently
/// malformed stream loses data instead of growing the buffer without bound.
pub const RECOMBINE_WINDOW: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// UTF-8 Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Decode buffered bytes as UTF-8, leaving an incomplete trailing sequence in
/// the buffer for the next block. Invalid non-prefix sequences are dropped.
pub fn decode_utf8_block(byte_buffer: &mut Vec<u8>) -> Option<String> {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(byte_buffer) {
            Ok(text) => {
                out.push_str(text);
                byte_buffer.clear();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if valid > 0 {
                    let prefix: Vec<u8> = byte_buffer.drain(..valid).collect();
                    // Safe: from_utf8 just validated this prefix
                    out.push_str(&String::from_utf8(prefix).unwrap());
                }
                match e.error_len() {
                    // Multi-byte sequence cut at the block boundary: keep the
                    // tail and wait for more bytes.
                    None => break,
                    Some(len) => {
                        debug!(bytes = len, "dropping invalid UTF-8 sequence");
                        byte_buffer.drain(..len);
                    }
                }
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Split one decoded text block into protocol frames.
///
/// Lines carrying an `event:` marker are SSE metadata, not payload, and are
/// dropped. Each remaining line is split on the `data:` prefix convention,
/// which also unpacks multiple payload segments squeezed onto one physical
/// line; newline-delimited formats without the prefix pass through whole.
/// Frames are trimmed and never empty.
pub fn split_frames(block: &str) -> impl Iterator<Item = &str> {
    block
        .lines()
        .filter(|line| !line.contains("event:"))
        .flat_map(|line| line.split("data:"))
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
}

/// Syntactic well-formedness probe: can this frame stand alone as one
/// structured payload?
pub fn is_complete_payload(frame: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(frame).is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Recombination
// ─────────────────────────────────────────────────────────────────────────────

/// Reassembles payloads that a provider split across transport frames.
///
/// Fragments that fail [`is_complete_payload`] are appended to a FIFO window
/// of at most [`RECOMBINE_WINDOW`] entries and the concatenation is retested
/// after each arrival.
#[derive(Debug, Default)]
pub struct ChunkRecombiner {
    pending: VecDeque<String>,
}

impl ChunkRecombiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `frame` cannot stand alone and must go through
    /// [`ChunkRecombiner::recombine`] before interpretation.
    pub fn should_combine(frame: &str) -> bool {
        !is_complete_payload(frame)
    }

    /// Buffer `frame` and retest the concatenated window.
    ///
    /// On success the window is cleared and the concatenation returned with
    /// `true`; on failure the window is kept for the next frame and the
    /// (still incomplete) concatenation returned with `false`.
    pub fn recombine(&mut self, frame: &str) -> (String, bool) {
        self.pending.push_back(frame.to_string());
        if self.pending.len() > RECOMBINE_WINDOW {
            warn!("recombination window full, evicting oldest fragment");
            self.pending.pop_front();
        }

        let combined: String = self.pending.iter().map(String::as_str).collect();
        if is_complete_payload(&combined) {
            self.pending.clear();
            (combined, true)
        } else {
            debug!(
                pending = self.pending.len(),
                "payload still incomplete after recombination"
            );
            (combined, false)
        }
    }

    /// Number of fragments currently awaiting recombination.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_lines_and_data_prefix() {
        let block = "data: {\"a\":1}\n\ndata: {\"b\":2}\n";
        let frames: Vec<&str> = split_frames(block).collect();
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn drops_event_metadata_lines() {
        let block = "event: message\ndata: {\"a\":1}\n";
        let frames: Vec<&str> = split_frames(block).collect();
        assert_eq!(frames, vec!["{\"a\":1}"]);
    }

    #[test]
    fn unpacks_multiple_data_segments_per_line() {
        let block = "data: {\"a\":1}data: {\"b\":2}\n";
        let frames: Vec<&str> = split_frames(block).collect();
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn plain_ndjson_lines_pass_through() {
        let block = "{\"done\":false}\n{\"done\":true}\n";
        let frames: Vec<&str> = split_frames(block).collect();
        assert_eq!(frames, vec!["{\"done\":false}", "{\"done\":true}"]);
    }

    #[test]
    fn never_yields_blank_frames() {
        let block = "\n  \ndata:\ndata:   \n";
        assert_eq!(split_frames(block).count(), 0);
    }

    #[test]
    fn complete_payloads_bypass_combining() {
        assert!(!ChunkRecombiner::should_combine("{\"a\":1}"));
        assert!(ChunkRecombiner::should_combine("{\"a\":"));
        assert!(ChunkRecombiner::should_combine("plain text"));
    }

    #[test]
    fn recombines_a_payload_split_in_three() {
        let payload = "{\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}";
        let mut recombiner = ChunkRecombiner::new();

        let (_, complete) = recombiner.recombine(&payload[..10]);
        assert!(!complete);
        let (_, complete) = recombiner.recombine(&payload[10..25]);
        assert!(!complete);
        let (combined, complete) = recombiner.recombine(&payload[25..]);
        assert!(complete);
        assert_eq!(combined, payload);
        assert_eq!(recombiner.pending(), 0);
    }

    #[test]
    fn window_never_exceeds_five_fragments() {
        let mut recombiner = ChunkRecombiner::new();
        for _ in 0..20 {
            recombiner.recombine("{\"unterminated\":");
            assert!(recombiner.pending() <= RECOMBINE_WINDOW);
        }
    }

    #[test]
    fn eviction_still_allows_later_success() {
        let mut recombiner = ChunkRecombiner::new();
        for _ in 0..RECOMBINE_WINDOW {
            recombiner.recombine("garbage");
        }
        // Five fresh fragments push out all the garbage.
        for piece in ["{\"a\"", ":", "1", ",\"b\":2", "}"] {
            recombiner.recombine(piece);
        }
        assert_eq!(recombiner.pending(), 0);
    }

    #[test]
    fn decodes_a_multibyte_char_split_across_blocks() {
        let emoji = "🦀".as_bytes();
        let mut buffer = emoji[..2].to_vec();
        assert_eq!(decode_utf8_block(&mut buffer), None);
        assert_eq!(buffer.len(), 2);

        buffer.extend_from_slice(&emoji[2..]);
        assert_eq!(decode_utf8_block(&mut buffer).as_deref(), Some("🦀"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn drops_invalid_bytes_and_keeps_going() {
        let mut buffer = b"ok\xff\xfemore".to_vec();
        assert_eq!(decode_utf8_block(&mut buffer).as_deref(), Some("okmore"));
        assert!(buffer.is_empty());
    }
}
