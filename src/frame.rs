//! Binary wire frame: assembly, CRC, and sentinel-delimited re-synchronization.
//!
//! The device may concatenate several frames into a single TCP write, so the
//! only safe parser strategy is to scan for the prefix sentinel and
//! re-synchronize on CRC failure rather than trust any single length field.

use crate::error::FrameError;

pub const PREFIX: u32 = 0x0000_55AA;
pub const SUFFIX: u32 = 0x0000_AA55;

/// prefix(4) + seqno(4) + cmd(4) + length(4)
pub const HEADER_LEN: usize = 16;
/// crc(4) + suffix(4)
pub const FOOTER_LEN: usize = 8;
/// The protocol's 28-byte floor: a frame is accepted iff it is at least this
/// long, full stop — header + footer + 4 bytes, whatever those 4 bytes hold.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + FOOTER_LEN + 4;

/// A frame parsed off the wire: header fields plus whatever sits between the
/// header and the CRC, with any leading return code split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub seq: u32,
    pub cmd: u32,
    pub return_code: Option<u32>,
    /// Body bytes after the optional return code, before CRC+suffix. Still
    /// encrypted (and, for V3.3 non-query commands, still carries the
    /// cleartext version header) — decoding that is `crypto`'s and
    /// `version`'s job, not the codec's.
    pub raw_body: Vec<u8>,
}

/// Assemble a complete frame: prefix, seq, cmd, length, body, CRC, suffix.
///
/// `body` is whatever should land at offset 16 — already encrypted, and
/// already carrying a version header if the caller's protocol/command needs
/// one. This function never attaches a return code; that only ever appears
/// on frames the device sends back to us.
pub fn encode(seq: u32, cmd: u32, body: &[u8]) -> Vec<u8> {
    let length = (body.len() + FOOTER_LEN) as u32;

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len() + FOOTER_LEN);
    frame.extend_from_slice(&PREFIX.to_be_bytes());
    frame.extend_from_slice(&seq.to_be_bytes());
    frame.extend_from_slice(&cmd.to_be_bytes());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(body);

    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&SUFFIX.to_be_bytes());

    frame
}

/// Scan `stream` for occurrences of the prefix sentinel and split it into
/// candidate segments, each running from one prefix up to (but not
/// including) the next. Candidates that don't parse cleanly are dropped
/// rather than surfaced as errors — a single corrupt frame must never stall
/// the rest of the stream.
pub fn split(stream: &[u8]) -> Vec<RawFrame> {
    let prefix_bytes = PREFIX.to_be_bytes();
    let mut starts = Vec::new();

    if stream.len() >= 4 {
        for i in 0..=stream.len() - 4 {
            if stream[i..i + 4] == prefix_bytes {
                starts.push(i);
            }
        }
    }

    let mut frames = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(stream.len());
        if let Ok(frame) = parse_candidate(&stream[start..end]) {
            frames.push(frame);
        }
    }
    frames
}

/// Validate prefix/suffix/CRC on a candidate segment (one that already
/// begins with the prefix sentinel) and return its header fields plus the
/// raw bytes between header and CRC. Splitting a leading return code out of
/// that body is specific to device-reply framing, not this check, so it's
/// left to callers.
fn validate_candidate(candidate: &[u8]) -> Result<(u32, u32, &[u8]), FrameError> {
    if candidate.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort);
    }

    let prefix = u32::from_be_bytes(candidate[0..4].try_into().unwrap());
    if prefix != PREFIX {
        return Err(FrameError::InvalidPrefix(prefix));
    }

    let suffix_offset = candidate.len() - 4;
    let suffix = u32::from_be_bytes(candidate[suffix_offset..].try_into().unwrap());
    if suffix != SUFFIX {
        return Err(FrameError::InvalidSuffix(suffix));
    }

    let crc_offset = suffix_offset - 4;
    let expected_crc = u32::from_be_bytes(candidate[crc_offset..crc_offset + 4].try_into().unwrap());
    let actual_crc = crc32fast::hash(&candidate[..crc_offset]);
    if expected_crc != actual_crc {
        return Err(FrameError::CrcMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    let seq = u32::from_be_bytes(candidate[4..8].try_into().unwrap());
    let cmd = u32::from_be_bytes(candidate[8..12].try_into().unwrap());

    Ok((seq, cmd, &candidate[HEADER_LEN..crc_offset]))
}

/// Validate and parse a single candidate segment (one that already begins
/// with the prefix sentinel).
pub fn parse_candidate(candidate: &[u8]) -> Result<RawFrame, FrameError> {
    let (seq, cmd, body) = validate_candidate(candidate)?;
    let (return_code, raw_body) = split_return_code(body);

    Ok(RawFrame {
        seq,
        cmd,
        return_code,
        raw_body: raw_body.to_vec(),
    })
}

/// Validate a discovery datagram (spec §4.G: same frame layout as §3) and
/// return its body sliced unconditionally at offset 20 — four bytes past
/// the header, every time, regardless of whether those bytes look like a
/// reply return code. Discovery broadcasts aren't replies and never carry
/// one; the four bytes just sit in front of the ciphertext.
pub(crate) fn discovery_body(datagram: &[u8]) -> Result<&[u8], FrameError> {
    let (_, _, body) = validate_candidate(datagram)?;
    body.get(4..).ok_or(FrameError::TooShort)
}

/// A frame "carries a return code" iff its leading 4 bytes, read as a u32,
/// have all but the low byte clear (spec §3).
fn split_return_code(body: &[u8]) -> (Option<u32>, &[u8]) {
    if body.len() >= 4 {
        let candidate_rc = u32::from_be_bytes(body[0..4].try_into().unwrap());
        if candidate_rc & 0xFFFF_FF00 == 0 {
            return (Some(candidate_rc), &body[4..]);
        }
    }
    (None, body)
}

/// Bound on how much unresolved tail data `FrameDecoder` will hold before
/// giving up and discarding it — a stream that never produces a valid
/// prefix/suffix pair should not grow this buffer without limit.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Incremental framing over a live TCP stream: bytes arrive in arbitrary
/// chunks (a read may end mid-frame), so completed frames are extracted as
/// soon as they're recognizable and an incomplete tail is kept for the next
/// push. This is `split` generalized to a stream that grows over time
/// instead of one fixed buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly read bytes in; returns every frame that could be
    /// completed as a result, in arrival order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let Some(start) = find_prefix(&self.buffer, 0) else {
                self.buffer.clear();
                break;
            };
            if start > 0 {
                self.buffer.drain(..start);
            }

            match find_prefix(&self.buffer, 4) {
                Some(next) => {
                    if let Ok(frame) = parse_candidate(&self.buffer[..next]) {
                        out.push(frame);
                    }
                    self.buffer.drain(..next);
                }
                None => {
                    if let Ok(frame) = parse_candidate(&self.buffer) {
                        out.push(frame);
                        self.buffer.clear();
                    } else if self.buffer.len() > MAX_PENDING_BYTES {
                        self.buffer.clear();
                    }
                    break;
                }
            }
        }

        out
    }
}

fn find_prefix(haystack: &[u8], from: usize) -> Option<usize> {
    let prefix_bytes = PREFIX.to_be_bytes();
    if haystack.len() < from + 4 {
        return None;
    }
    (from..=haystack.len() - 4).find(|&i| haystack[i..i + 4] == prefix_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_split_roundtrips_two_frames() {
        let a = encode(1, 7, b"hello");
        let b = encode(2, 7, b"world!");
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let frames = split(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].seq, 1);
        assert_eq!(frames[1].seq, 2);
    }

    #[test]
    fn split_never_panics_on_garbage() {
        let garbage = vec![0xAAu8; 137];
        assert!(split(&garbage).is_empty());

        let mut almost = PREFIX.to_be_bytes().to_vec();
        almost.extend_from_slice(&[1, 2, 3]);
        assert!(split(&almost).is_empty());
    }

    #[test]
    fn corrupt_frame_is_dropped_next_is_kept() {
        let mut first = encode(10, 9, b"abcd");
        first[16] ^= 0x01; // flip a body byte, invalidating the CRC
        let second = encode(11, 9, b"abcd");

        let mut stream = first;
        stream.extend_from_slice(&second);

        let frames = split(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, 11);
    }

    #[test]
    fn return_code_detected_only_when_top_bytes_clear() {
        let (rc, rest) = split_return_code(&[0, 0, 0, 5, 1, 2]);
        assert_eq!(rc, Some(5));
        assert_eq!(rest, &[1, 2]);

        let (rc, rest) = split_return_code(&[0x33, 0x2e, 0x33, 0, 1, 2]);
        assert_eq!(rc, None);
        assert_eq!(rest, &[0x33, 0x2e, 0x33, 0, 1, 2]);
    }

    #[test]
    fn decoder_holds_a_frame_split_across_two_reads() {
        let whole = encode(5, 7, b"split me please");
        let (first_half, second_half) = whole.split_at(whole.len() - 5);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(first_half).is_empty());

        let frames = decoder.push(second_half);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, 5);
    }

    #[test]
    fn decoder_handles_two_frames_in_one_push() {
        let a = encode(1, 10, b"abcd");
        let b = encode(2, 10, b"abcd");
        let mut stream = a;
        stream.extend_from_slice(&b);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&stream);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn decoder_recovers_after_corrupt_frame() {
        let mut first = encode(1, 9, b"abcd");
        first[16] ^= 0xFF;
        let second = encode(2, 9, b"abcd");
        let mut stream = first;
        stream.extend_from_slice(&second);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, 2);
    }

    #[test]
    fn decoder_never_panics_on_random_bytes_fed_one_at_a_time() {
        let mut decoder = FrameDecoder::new();
        let data = [0x00u8, 0x55, 0xAA, 0xFF, 0x00, 0x00, 0x55, 0xAA, 0x01, 0x02];
        for b in data {
            decoder.push(&[b]);
        }
    }
}
