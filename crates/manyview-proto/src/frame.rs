use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("buffer exceeds max size without delimiter: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
}

/// Complete frames extracted from one chunk, plus any framing errors hit
/// while extracting them.
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    pub frames: Vec<Vec<u8>>,
    pub errors: Vec<FrameError>,
}

/// Splits a raw byte stream into newline-delimited frames.
///
/// Chunks may cut frames anywhere; the trailing incomplete fragment is kept
/// across calls and no frame is ever emitted twice. The newline terminator is
/// stripped (along with an optional `\r`) and blank or whitespace-only lines
/// are skipped. A
/// buffered fragment that outgrows `max_frame_bytes` without seeing a
/// delimiter is discarded and reported, so one runaway line cannot pin the
/// buffer forever.
#[derive(Debug)]
pub struct LineFramer {
    max_frame_bytes: usize,
    pending: Vec<u8>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LineFramer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> FrameBatch {
        let mut batch = FrameBatch::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut frame = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            frame.pop();
            if frame.ends_with(b"\r") {
                frame.pop();
            }
            if frame.iter().all(|byte| byte.is_ascii_whitespace()) {
                continue;
            }
            if frame.len() > self.max_frame_bytes {
                batch.errors.push(FrameError::OversizedFrame {
                    size: frame.len(),
                    max: self.max_frame_bytes,
                });
                continue;
            }
            batch.frames.push(frame);
        }

        if self.pending.len() > self.max_frame_bytes {
            batch.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
        }

        batch
    }

    /// Drains the trailing fragment at end-of-stream. The transport calls
    /// this once after a zero-length read so a final unterminated frame is
    /// not silently dropped.
    pub fn finish(&mut self) -> FrameBatch {
        let mut batch = FrameBatch::default();
        if self.pending.is_empty() {
            return batch;
        }
        let mut frame = std::mem::take(&mut self.pending);
        if frame.ends_with(b"\r") {
            frame.pop();
        }
        if frame.len() > self.max_frame_bytes {
            batch.errors.push(FrameError::OversizedFrame {
                size: frame.len(),
                max: self.max_frame_bytes,
            });
        } else if !frame.iter().all(|b| b.is_ascii_whitespace()) {
            batch.frames.push(frame);
        }
        batch
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_as_strings(batch: &FrameBatch) -> Vec<String> {
        batch
            .frames
            .iter()
            .map(|f| String::from_utf8(f.clone()).expect("utf8 frame"))
            .collect()
    }

    #[test]
    fn whole_stream_in_one_chunk() {
        let mut framer = LineFramer::default();
        let batch = framer.push_chunk(b"{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
        assert!(batch.errors.is_empty());
        assert_eq!(
            frames_as_strings(&batch),
            vec!["{\"a\":1}", "{\"b\":2}", "{\"c\":3}"]
        );
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn split_invariance_across_chunk_boundaries() {
        let stream = b"{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n";

        let mut reference = LineFramer::default();
        let expected = frames_as_strings(&reference.push_chunk(stream));

        // Every possible single split point, plus byte-at-a-time.
        for split in 0..stream.len() {
            let mut framer = LineFramer::default();
            let mut collected = Vec::new();
            collected.extend(frames_as_strings(&framer.push_chunk(&stream[..split])));
            collected.extend(frames_as_strings(&framer.push_chunk(&stream[split..])));
            assert_eq!(collected, expected, "split at byte {split}");
        }

        let mut framer = LineFramer::default();
        let mut collected = Vec::new();
        for byte in stream {
            collected.extend(frames_as_strings(&framer.push_chunk(&[*byte])));
        }
        assert_eq!(collected, expected);
    }

    #[test]
    fn partial_frame_is_retained_not_emitted() {
        let mut framer = LineFramer::default();
        let batch = framer.push_chunk(b"{\"a\":1}\n{\"b\"");
        assert_eq!(frames_as_strings(&batch), vec!["{\"a\":1}"]);
        assert_eq!(framer.pending_len(), 4);

        let batch = framer.push_chunk(b":2}\n");
        assert_eq!(frames_as_strings(&batch), vec!["{\"b\":2}"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn crlf_and_blank_lines_are_tolerated() {
        let mut framer = LineFramer::default();
        let batch = framer.push_chunk(b"{\"a\":1}\r\n\n\r\n{\"b\":2}\n");
        assert!(batch.errors.is_empty());
        assert_eq!(frames_as_strings(&batch), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn whitespace_only_lines_are_skipped_mid_stream_and_at_eof() {
        let mut framer = LineFramer::default();
        let batch = framer.push_chunk(b" \n{\"a\":1}\n\t \n  ");
        assert!(batch.errors.is_empty());
        assert_eq!(frames_as_strings(&batch), vec!["{\"a\":1}"]);
        assert!(framer.finish().frames.is_empty());
    }

    #[test]
    fn oversized_line_is_dropped_and_reported() {
        let mut framer = LineFramer::new(16);
        let mut chunk = vec![b'x'; 64];
        chunk.push(b'\n');
        chunk.extend_from_slice(b"{\"a\":1}\n");
        let batch = framer.push_chunk(&chunk);
        assert_eq!(frames_as_strings(&batch), vec!["{\"a\":1}"]);
        assert!(matches!(
            batch.errors.as_slice(),
            [FrameError::OversizedFrame { size: 64, .. }]
        ));
    }

    #[test]
    fn oversized_buffer_without_delimiter_is_cleared() {
        let mut framer = LineFramer::new(8);
        let batch = framer.push_chunk(&[b'y'; 32]);
        assert!(batch.frames.is_empty());
        assert!(matches!(
            batch.errors.as_slice(),
            [FrameError::OversizedBuffer { size: 32, max: 8 }]
        ));
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn finish_drains_trailing_fragment_once() {
        let mut framer = LineFramer::default();
        framer.push_chunk(b"{\"a\":1}\n{\"tail\"");
        let batch = framer.finish();
        assert_eq!(frames_as_strings(&batch), vec!["{\"tail\""]);
        assert!(framer.finish().frames.is_empty());
    }
}
