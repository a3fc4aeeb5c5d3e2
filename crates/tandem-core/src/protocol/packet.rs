//! The [`Packet`]: a typed byte buffer with a read cursor.
//!
//! A packet is either being **written** (built field by field before
//! sending) or being **read** (constructed from received bytes).  The two
//! modes never mix: reads on a write-mode packet fail with
//! [`DecodeError::NotReadable`], and writes on a read-mode packet panic.
//! [`Packet::reset`] is the explicit way back to an empty write-mode packet.
//!
//! # Header reserve
//!
//! The transport stamps up to three 4-byte values in front of the payload
//! just before sending: the packet id, (for client UDP) the client id, and
//! the frame length.  A write-mode packet allocates [`HEADER_RESERVE`] bytes
//! ahead of the payload so these stamps fill the reserve back to front
//! instead of shifting every payload byte.  If the reserve is exhausted the
//! stamp falls back to an insert at the head of the buffer.
//!
//! ```text
//!   reserve (12)       start                 end
//! [ . . . . . . . . .  | len | id | fields ... ]
//!                      └── as_bytes() ──────────┘
//! ```

use std::fmt;

use crate::protocol::field::{take, Decode, DecodeError, Encode};
use crate::protocol::packet_id::PacketId;

/// Bytes reserved in front of a write-mode payload for transport stamps.
pub const HEADER_RESERVE: usize = 12;

const PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Read,
}

/// A unit of application data.
///
/// Fields must be read back in exactly the order and types they were
/// written.  Reading past the end is a [`DecodeError`]; it never yields a
/// zeroed or truncated value.
///
/// # Examples
///
/// ```rust
/// use tandem_core::{Packet, PacketId};
///
/// let mut out = Packet::new(PacketId::WelcomeResponse);
/// out.write(&7i32).write("alice");
///
/// let mut inbound = Packet::from_body(out.id(), out.body());
/// assert_eq!(inbound.read::<i32>().unwrap(), 7);
/// assert_eq!(inbound.read::<String>().unwrap(), "alice");
/// assert_eq!(inbound.unread_len(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Packet {
    id: PacketId,
    buf: Vec<u8>,
    /// First live byte; everything before it is unused reserve.
    start: usize,
    /// First field byte, after any id or stamps.
    body_start: usize,
    /// Absolute read position.  Equals `body_start` in write mode.
    cursor: usize,
    mode: Mode,
}

impl Packet {
    /// Creates an empty write-mode packet tagged with `id`.
    ///
    /// The id is kept alongside the buffer and only stamped into the bytes by
    /// the transport (see [`crate::protocol::framing::encode_packet`]).
    pub fn new(id: PacketId) -> Self {
        let mut buf = Vec::with_capacity(HEADER_RESERVE + 64);
        buf.resize(HEADER_RESERVE, 0);
        Self {
            id,
            buf,
            start: HEADER_RESERVE,
            body_start: HEADER_RESERVE,
            cursor: HEADER_RESERVE,
            mode: Mode::Write,
        }
    }

    /// Creates a read-mode packet from a received frame payload
    /// (`[packet_id:4][fields...]`).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] if the payload is shorter
    /// than the 4-byte packet id.
    pub fn from_frame(payload: &[u8]) -> Result<Self, DecodeError> {
        let (raw_id, used) = i32::decode(payload)?;
        Ok(Self {
            id: PacketId::from(raw_id),
            buf: payload.to_vec(),
            start: 0,
            body_start: used,
            cursor: used,
            mode: Mode::Read,
        })
    }

    /// Creates a read-mode packet from an id and its field bytes.
    pub fn from_body(id: PacketId, body: &[u8]) -> Self {
        Self {
            id,
            buf: body.to_vec(),
            start: 0,
            body_start: 0,
            cursor: 0,
            mode: Mode::Read,
        }
    }

    /// Returns a write-mode copy with the same id and fields, for
    /// re-sending a packet regardless of which mode it is in.
    pub fn to_writer(&self) -> Self {
        let mut copy = Self::new(self.id);
        copy.buf.extend_from_slice(self.body());
        copy
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Returns `true` if this packet was built from received bytes.
    pub fn is_readable(&self) -> bool {
        self.mode == Mode::Read
    }

    // ── Writing ───────────────────────────────────────────────────────────────

    /// Appends `value` using its wire encoding.  Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if the packet is in read mode.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        self.assert_writable();
        value.encode(&mut self.buf);
        self
    }

    /// Appends raw bytes with no length prefix.
    ///
    /// # Panics
    ///
    /// Panics if the packet is in read mode.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.assert_writable();
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Stamps the current length (`len()`) as a 4-byte prefix.
    ///
    /// # Panics
    ///
    /// Panics if the packet is in read mode.
    pub fn insert_length_prefix(&mut self) {
        let length = self.len() as i32;
        self.insert_prefix(length.to_le_bytes());
    }

    /// Stamps `id` as a 4-byte prefix (packet id or client id).
    ///
    /// # Panics
    ///
    /// Panics if the packet is in read mode.
    pub fn insert_identifier_prefix(&mut self, id: i32) {
        self.insert_prefix(id.to_le_bytes());
    }

    fn insert_prefix(&mut self, bytes: [u8; PREFIX_SIZE]) {
        self.assert_writable();
        if self.start >= PREFIX_SIZE {
            self.start -= PREFIX_SIZE;
            self.buf[self.start..self.start + PREFIX_SIZE].copy_from_slice(&bytes);
        } else {
            // Reserve exhausted: shift everything after `start`.
            self.buf.splice(self.start..self.start, bytes);
            self.body_start += PREFIX_SIZE;
            self.cursor += PREFIX_SIZE;
        }
    }

    fn assert_writable(&self) {
        assert!(
            self.mode == Mode::Write,
            "cannot write to a {} packet in read mode; call reset() first",
            self.id
        );
    }

    // ── Reading ───────────────────────────────────────────────────────────────

    /// Decodes the next field and advances the cursor past it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if too few bytes remain or the packet is in
    /// write mode.  The cursor does not move on error.
    pub fn read<T: Decode>(&mut self) -> Result<T, DecodeError> {
        let (value, used) = T::decode(self.unread()?)?;
        self.cursor += used;
        Ok(value)
    }

    /// Decodes the next field without advancing the cursor.
    ///
    /// # Errors
    ///
    /// Same as [`Packet::read`].
    pub fn peek<T: Decode>(&self) -> Result<T, DecodeError> {
        T::decode(self.unread()?).map(|(value, _)| value)
    }

    /// Reads `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Packet::read`].
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let raw = take(self.unread()?, len, "bytes")?.to_vec();
        self.cursor += len;
        Ok(raw)
    }

    /// Moves the cursor back to the first field.
    pub fn rewind(&mut self) {
        self.cursor = self.body_start;
    }

    fn unread(&self) -> Result<&[u8], DecodeError> {
        match self.mode {
            Mode::Read => Ok(&self.buf[self.cursor..]),
            Mode::Write => Err(DecodeError::NotReadable),
        }
    }

    // ── Buffer access ─────────────────────────────────────────────────────────

    /// Total live bytes, including any stamped prefixes.
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes the cursor has not consumed yet.  Equals `len()` in write mode.
    pub fn unread_len(&self) -> usize {
        match self.mode {
            Mode::Read => self.buf.len() - self.cursor,
            Mode::Write => self.len(),
        }
    }

    /// The live bytes, including stamped prefixes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// The field bytes only.
    pub fn body(&self) -> &[u8] {
        &self.buf[self.body_start..]
    }

    /// Consumes the packet and returns its live bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.drain(..self.start);
        self.buf
    }

    /// Clears the packet back to an empty write-mode packet tagged `id`.
    pub fn reset(&mut self, id: PacketId) {
        *self = Self::new(id);
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packet: {} bytes, {} unread",
            self.id,
            self.len(),
            self.unread_len()
        )
    }
}
