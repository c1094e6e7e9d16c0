// sesame-os3/sesame-proto/src/segment.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! GATT segmentation.
//!
//! Frames are split into segments of at most [`SEGMENT_PAYLOAD_LEN`] bytes,
//! each prefixed with a header byte `(parsing_type << 1) | is_start`.
//! `parsing_type` is 0 while more segments follow and, on the last segment,
//! 1 for a plain frame or 2 for an encrypted one. The same framing is used
//! in both directions.

/// Payload bytes per GATT write / notification, excluding the header.
pub const SEGMENT_PAYLOAD_LEN: usize = 19;

const PARSING_MORE: u8 = 0;
const PARSING_PLAIN: u8 = 1;
const PARSING_ENCRYPTED: u8 = 2;

/// A complete frame reassembled from notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub encrypted: bool,
}

/// Splits `data` into header-prefixed segments. Empty input yields no segments.
pub fn segment(data: &[u8], encrypted: bool) -> Vec<Vec<u8>> {
    let last = if encrypted { PARSING_ENCRYPTED } else { PARSING_PLAIN };
    let count = data.chunks(SEGMENT_PAYLOAD_LEN).len();
    data.chunks(SEGMENT_PAYLOAD_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let parsing_type = if i + 1 == count { last } else { PARSING_MORE };
            let is_start = u8::from(i == 0);
            let mut segment = Vec::with_capacity(chunk.len() + 1);
            segment.push((parsing_type << 1) | is_start);
            segment.extend_from_slice(chunk);
            segment
        })
        .collect()
}

/// Rebuilds frames from a stream of segments.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes collected for a frame that has not been completed yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one segment, returning a frame once its last segment arrives.
    pub fn push(&mut self, segment: &[u8]) -> Option<Frame> {
        let Some((&header, body)) = segment.split_first() else {
            tracing::warn!("Ignoring empty segment");
            return None;
        };
        match header {
            0 => {
                self.buffer.extend_from_slice(body);
                None
            }
            1 => {
                if !self.buffer.is_empty() {
                    tracing::warn!(
                        discarded = self.buffer.len(),
                        "Overwriting incomplete packet"
                    );
                }
                self.buffer.clear();
                self.buffer.extend_from_slice(body);
                None
            }
            2 => Some(self.finish(body, false)),
            3 => Some(Frame { data: body.to_vec(), encrypted: false }),
            4 => Some(self.finish(body, true)),
            5 => Some(Frame { data: body.to_vec(), encrypted: true }),
            other => {
                tracing::warn!(header = other, data = ?segment, "Unhandled segment header");
                None
            }
        }
    }

    fn finish(&mut self, body: &[u8], encrypted: bool) -> Frame {
        self.buffer.extend_from_slice(body);
        Frame {
            data: std::mem::take(&mut self.buffer),
            encrypted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment_headers() {
        assert_eq!(segment(&[2, 9, 9, 9, 9], false), vec![vec![3, 2, 9, 9, 9, 9]]);
        assert_eq!(segment(&[82, 0], true), vec![vec![5, 82, 0]]);
        assert!(segment(&[], true).is_empty());
    }

    #[test]
    fn test_split_segments() {
        let data: Vec<u8> = (0..45).collect();
        let segments = segment(&data, true);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0][0], 1);
        assert_eq!(segments[1][0], 0);
        assert_eq!(segments[2][0], 4);
        assert_eq!(segments[0].len(), 20);
        assert_eq!(segments[2].len(), 8);

        let plain = segment(&data[..38], false);
        assert_eq!(plain.len(), 2);
        assert_eq!(plain[1][0], 2);
        assert_eq!(plain[1].len(), 20);
    }

    #[test]
    fn test_reassemble_split_frame() {
        let data: Vec<u8> = (0..45).collect();
        let mut reassembler = Reassembler::new();
        let mut frames = Vec::new();
        for seg in segment(&data, true) {
            frames.extend(reassembler.push(&seg));
        }
        assert_eq!(frames, vec![Frame { data, encrypted: true }]);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_reassemble_single_frames() {
        let mut reassembler = Reassembler::new();
        assert_eq!(
            reassembler.push(&[3, 8, 14, 1, 2, 3, 4]),
            Some(Frame { data: vec![8, 14, 1, 2, 3, 4], encrypted: false })
        );
        assert_eq!(
            reassembler.push(&[5, 0xaa]),
            Some(Frame { data: vec![0xaa], encrypted: true })
        );
    }

    #[test]
    fn test_new_head_discards_incomplete_frame() {
        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.push(&[1, 1, 1]), None);
        assert_eq!(reassembler.push(&[1, 2, 2]), None);
        assert_eq!(
            reassembler.push(&[2, 3]),
            Some(Frame { data: vec![2, 2, 3], encrypted: false })
        );
    }

    #[test]
    fn test_ignores_bad_segments() {
        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.push(&[]), None);
        assert_eq!(reassembler.push(&[7, 1, 2]), None);
        assert_eq!(reassembler.pending(), 0);
    }
}
