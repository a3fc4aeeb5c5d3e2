//! Length-prefixed framing for streams and datagrams.
//!
//! Wire format:
//! ```text
//! [length:4][payload:length] [length:4][payload:length] ...
//! ```
//! `length` is a little-endian `i32` and must be positive.
//!
//! # Why framing? (for beginners)
//!
//! TCP is a byte *stream*: one `read()` may return half a message, or three
//! messages glued together.  The length prefix lets the receiver find the
//! message boundaries again.  [`FrameDecoder`] accumulates bytes across
//! reads and hands out complete payloads.
//!
//! UDP keeps datagram boundaries, but a datagram may still carry several
//! frames.  A datagram has no continuation, so [`decode_datagram`] simply
//! drops any incomplete tail.

use thiserror::Error;
use tracing::trace;

use crate::protocol::packet::Packet;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors raised while splitting a stream into frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A declared frame length was zero or negative.  The stream can no
    /// longer be realigned.
    #[error("invalid frame length {0}")]
    InvalidLength(i32),
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes `packet` as `[length][packet_id][fields]`.
///
/// Used for TCP in both directions and for server → client UDP.  The packet
/// itself is left untouched, so one packet can be sent to many clients.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut stamped = packet.to_writer();
    stamped.insert_identifier_prefix(i32::from(packet.id()));
    stamped.insert_length_prefix();
    stamped.into_bytes()
}

/// Encodes `packet` as `[length][tag][packet_id][fields]`.
///
/// Used for client → server UDP, where `tag` is the sender's client id so
/// the server can tell datagrams apart on its single shared socket.
pub fn encode_tagged_packet(tag: i32, packet: &Packet) -> Vec<u8> {
    let mut stamped = packet.to_writer();
    stamped.insert_identifier_prefix(i32::from(packet.id()));
    stamped.insert_identifier_prefix(tag);
    stamped.insert_length_prefix();
    stamped.into_bytes()
}

// ── Stream decoding ───────────────────────────────────────────────────────────

/// Accumulates stream bytes and yields complete frame payloads in order.
///
/// # Examples
///
/// ```rust
/// use tandem_core::{encode_packet, FrameDecoder, Packet, PacketId};
///
/// let bytes = encode_packet(&Packet::new(PacketId::Test));
/// let mut decoder = FrameDecoder::new();
///
/// decoder.push(&bytes[..3]);
/// assert_eq!(decoder.next_frame(), Ok(None));
///
/// decoder.push(&bytes[3..]);
/// let payload = decoder.next_frame().unwrap().unwrap();
/// assert_eq!(Packet::from_frame(&payload).unwrap().id(), PacketId::Test);
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Bytes at the front of `buf` already handed out.
    consumed: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            consumed: 0,
        }
    }

    /// Appends bytes from one read event.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete payload, or `None` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidLength`] when a declared length is zero
    /// or negative.  The buffered bytes are discarded; callers on a reliable
    /// stream should treat this as fatal.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let unread = &self.buf[self.consumed..];
        if unread.len() < LENGTH_PREFIX_SIZE {
            self.compact();
            return Ok(None);
        }

        let declared = read_length(unread);
        if declared <= 0 {
            self.clear();
            return Err(FrameError::InvalidLength(declared));
        }

        let end = LENGTH_PREFIX_SIZE + declared as usize;
        if unread.len() < end {
            self.compact();
            return Ok(None);
        }

        let payload = unread[LENGTH_PREFIX_SIZE..end].to_vec();
        self.consumed += end;
        Ok(Some(payload))
    }

    /// Pushes `bytes` and drains every complete payload.
    ///
    /// Payloads decoded before an invalid length are still returned through
    /// `frames`; the error is reported after them.
    ///
    /// # Errors
    ///
    /// Same as [`FrameDecoder::next_frame`].
    pub fn decode(&mut self, bytes: &[u8], frames: &mut Vec<Vec<u8>>) -> Result<(), FrameError> {
        self.push(bytes);
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(())
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.consumed
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.consumed = 0;
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.consumed = 0;
        }
    }
}

// ── Datagram decoding ─────────────────────────────────────────────────────────

/// Splits one datagram into its frame payloads.
///
/// Decoding stops at the first incomplete frame or non-positive length; the
/// rest of the datagram is dropped.
pub fn decode_datagram(datagram: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut rest = datagram;

    while rest.len() >= LENGTH_PREFIX_SIZE {
        let declared = read_length(rest);
        if declared <= 0 {
            trace!("datagram frame with length {declared}; dropping {} bytes", rest.len());
            break;
        }
        let end = LENGTH_PREFIX_SIZE + declared as usize;
        if rest.len() < end {
            trace!("incomplete datagram frame: declared {declared}, {} available", rest.len() - LENGTH_PREFIX_SIZE);
            break;
        }
        frames.push(&rest[LENGTH_PREFIX_SIZE..end]);
        rest = &rest[end..];
    }

    frames
}

fn read_length(bytes: &[u8]) -> i32 {
    let mut le = [0u8; LENGTH_PREFIX_SIZE];
    le.copy_from_slice(&bytes[..LENGTH_PREFIX_SIZE]);
    i32::from_le_bytes(le)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet_id::PacketId;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as i32).to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    // ── Encoding ─────────────────────────────────────────────────────────────

    #[test]
    fn test_encode_packet_layout_is_length_id_fields() {
        // Arrange
        let mut p = Packet::new(PacketId::Welcome);
        p.write(&7i32);

        // Act
        let bytes = encode_packet(&p);

        // Assert
        assert_eq!(&bytes[0..4], &8i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &7i32.to_le_bytes());
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn test_encode_tagged_packet_puts_tag_before_packet_id() {
        let p = Packet::new(PacketId::Test);

        let bytes = encode_tagged_packet(5, &p);

        assert_eq!(&bytes[0..4], &8i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &5i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &3i32.to_le_bytes());
    }

    #[test]
    fn test_encode_packet_leaves_source_packet_unchanged() {
        let mut p = Packet::new(PacketId::Test);
        p.write(&1u8);

        let first = encode_packet(&p);
        let second = encode_packet(&p);

        assert_eq!(first, second);
        assert_eq!(p.len(), 1);
    }

    // ── Stream decoding ──────────────────────────────────────────────────────

    #[test]
    fn test_frames_split_across_reads_come_out_whole_and_in_order() {
        // Arrange: three frames, fed one byte at a time.
        let mut stream = Vec::new();
        for payload in [&b"one"[..], &b"two!"[..], &b"three"[..]] {
            stream.extend(frame(payload));
        }
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();

        // Act
        for byte in &stream {
            decoder.decode(std::slice::from_ref(byte), &mut frames).unwrap();
        }

        // Assert
        assert_eq!(frames, vec![b"one".to_vec(), b"two!".to_vec(), b"three".to_vec()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_coalesced_frames_in_one_read_all_decode() {
        let mut bytes = frame(b"a");
        bytes.extend(frame(b"bc"));
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();

        decoder.decode(&bytes, &mut frames).unwrap();

        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_partial_frame_is_retained_for_next_read() {
        let bytes = frame(b"hello");
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();

        decoder.decode(&bytes[..6], &mut frames).unwrap();
        assert!(frames.is_empty());
        assert_eq!(decoder.buffered(), 6);

        decoder.decode(&bytes[6..], &mut frames).unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_zero_length_halts_decoding_and_discards_buffer() {
        // Arrange: a good frame, then a zero length, then another good frame.
        let mut bytes = frame(b"ok");
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend(frame(b"lost"));
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();

        // Act
        let result = decoder.decode(&bytes, &mut frames);

        // Assert
        assert_eq!(result, Err(FrameError::InvalidLength(0)));
        assert_eq!(frames, vec![b"ok".to_vec()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&(-5i32).to_le_bytes());
        assert_eq!(decoder.next_frame(), Err(FrameError::InvalidLength(-5)));
    }

    // ── Datagram decoding ────────────────────────────────────────────────────

    #[test]
    fn test_datagram_with_two_frames_yields_both() {
        let mut dgram = frame(b"x");
        dgram.extend(frame(b"yz"));

        assert_eq!(decode_datagram(&dgram), vec![&b"x"[..], &b"yz"[..]]);
    }

    #[test]
    fn test_datagram_incomplete_tail_is_dropped() {
        let mut dgram = frame(b"x");
        dgram.extend_from_slice(&10i32.to_le_bytes());
        dgram.extend_from_slice(b"short");

        assert_eq!(decode_datagram(&dgram), vec![&b"x"[..]]);
    }

    #[test]
    fn test_datagram_with_non_positive_length_yields_nothing_after_it() {
        let mut dgram = (-1i32).to_le_bytes().to_vec();
        dgram.extend(frame(b"never"));

        assert!(decode_datagram(&dgram).is_empty());
    }
}
