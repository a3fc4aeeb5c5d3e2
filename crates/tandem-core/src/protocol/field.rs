//! Field codec: how individual values are laid out inside a packet.
//!
//! Wire format of each supported field type (all integers little-endian):
//! ```text
//! u8 / bool            1 byte   (bool: 0 = false, anything else = true)
//! i16                  2 bytes
//! i32 / f32            4 bytes
//! i64                  8 bytes
//! string               [char_count:4][one byte per char]
//! Vec3                 [x:f32][y:f32][z:f32]
//! Quat                 [x:f32][y:f32][z:f32][w:f32]
//! ```
//!
//! Strings carry exactly one byte per character.  Characters outside ASCII
//! are written as `?`, and non-ASCII bytes read back as `?`, so the
//! character count always equals the byte count.

use thiserror::Error;

use crate::domain::geometry::{Quat, Vec3};

/// Errors that can occur while reading fields out of a packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer unread bytes remain than the field needs.
    #[error("insufficient data reading {field}: need {needed} bytes, {available} unread")]
    InsufficientData {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// A length prefix inside the payload is negative.
    #[error("negative length {length} for {field}")]
    NegativeLength { field: &'static str, length: i32 },

    /// The packet was built for writing; only received packets can be read.
    #[error("packet is in write mode and cannot be read")]
    NotReadable,
}

/// A value that can be appended to a packet buffer.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);
}

/// A value that can be decoded from the front of a byte slice.
///
/// `decode` returns the value together with the number of bytes it consumed
/// so the caller can advance its cursor.  It never returns a partial value:
/// if `bytes` is too short the whole read fails.
pub trait Decode: Sized {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError>;
}

// ── Fixed-width numeric fields ────────────────────────────────────────────────

macro_rules! le_field {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }

        impl Decode for $ty {
            fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let raw = take(bytes, WIDTH, $name)?;
                let mut le = [0u8; WIDTH];
                le.copy_from_slice(raw);
                Ok((<$ty>::from_le_bytes(le), WIDTH))
            }
        }
    )*};
}

le_field! {
    u8 => "u8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    f32 => "f32",
}

impl Encode for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let raw = take(bytes, 1, "bool")?;
        Ok((raw[0] != 0, 1))
    }
}

// ── Strings ───────────────────────────────────────────────────────────────────

impl Encode for str {
    fn encode(&self, out: &mut Vec<u8>) {
        let count = self.chars().count();
        out.extend_from_slice(&(count as i32).to_le_bytes());
        out.extend(self.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
    }
}

impl Encode for String {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_str().encode(out);
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let (length, prefix) = i32::decode(bytes)?;
        if length < 0 {
            return Err(DecodeError::NegativeLength {
                field: "string",
                length,
            });
        }
        let raw = take(&bytes[prefix..], length as usize, "string")?;
        let text = raw
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        Ok((text, prefix + raw.len()))
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

impl Encode for Vec3 {
    fn encode(&self, out: &mut Vec<u8>) {
        self.x.encode(out);
        self.y.encode(out);
        self.z.encode(out);
    }
}

impl Decode for Vec3 {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        take(bytes, 12, "Vec3")?;
        let (x, _) = f32::decode(&bytes[0..])?;
        let (y, _) = f32::decode(&bytes[4..])?;
        let (z, _) = f32::decode(&bytes[8..])?;
        Ok((Vec3::new(x, y, z), 12))
    }
}

impl Encode for Quat {
    fn encode(&self, out: &mut Vec<u8>) {
        self.x.encode(out);
        self.y.encode(out);
        self.z.encode(out);
        self.w.encode(out);
    }
}

impl Decode for Quat {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        take(bytes, 16, "Quat")?;
        let (x, _) = f32::decode(&bytes[0..])?;
        let (y, _) = f32::decode(&bytes[4..])?;
        let (z, _) = f32::decode(&bytes[8..])?;
        let (w, _) = f32::decode(&bytes[12..])?;
        Ok((Quat::new(x, y, z, w), 16))
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, out: &mut Vec<u8>) {
        (**self).encode(out);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Returns the first `needed` bytes of `bytes`, or an error naming `field`.
pub(crate) fn take<'a>(
    bytes: &'a [u8],
    needed: usize,
    field: &'static str,
) -> Result<&'a [u8], DecodeError> {
    bytes.get(..needed).ok_or(DecodeError::InsufficientData {
        field,
        needed,
        available: bytes.len(),
    })
}
