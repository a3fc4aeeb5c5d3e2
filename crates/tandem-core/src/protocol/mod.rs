//! Protocol module containing the packet type, its field codec, and framing.

pub mod field;
pub mod framing;
pub mod packet;
pub mod packet_id;

pub use field::{Decode, DecodeError, Encode};
pub use framing::{decode_datagram, encode_packet, encode_tagged_packet, FrameDecoder, FrameError};
pub use packet::Packet;
pub use packet_id::PacketId;
