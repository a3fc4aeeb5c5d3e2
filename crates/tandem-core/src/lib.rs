//! # tandem-core
//!
//! Shared library for Tandem containing the packet codec, stream/datagram
//! framing, the connection handshake state machine, and the dispatch queue
//! that moves network callbacks onto a single processing thread.
//!
//! This crate is used by both the server and the client.  It has no
//! dependencies on sockets or an async runtime, so every piece can be unit
//! tested with plain byte slices.
//!
//! # Architecture overview (for beginners)
//!
//! Tandem is a small dual-transport networking layer for real-time
//! applications such as LAN game servers.  Every client keeps two channels
//! open to the server:
//!
//! - a **TCP** connection for reliable, ordered traffic (handshake, chat,
//!   spawn announcements), and
//! - a **UDP** "connection" for frequent, loss-tolerant updates (positions,
//!   input state).
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network.  A [`Packet`] is a
//!   growable little-endian byte buffer with a read cursor; the framing layer
//!   wraps packets in `[length:4][payload]` frames.
//!
//! - **`domain`** – Plain data types with no I/O: geometry values carried in
//!   packets and the [`Handshake`] state machine that takes a connection from
//!   "accepted" to "active".
//!
//! - **`dispatch`** – The [`DispatchQueue`]: I/O tasks schedule work, one
//!   tick thread drains it.
//!
//! - **`events`** – Named subscriber lists used to raise connect, disconnect
//!   and packet events in subscription order.

pub mod dispatch;
pub mod domain;
pub mod events;
pub mod protocol;

pub use dispatch::DispatchQueue;
pub use domain::geometry::{Quat, Vec3};
pub use domain::handshake::{Handshake, HandshakeError, HandshakeState};
pub use events::{SubscriptionId, Subscribers};
pub use protocol::field::{Decode, DecodeError, Encode};
pub use protocol::framing::{decode_datagram, encode_packet, encode_tagged_packet, FrameDecoder, FrameError};
pub use protocol::packet::Packet;
pub use protocol::packet_id::PacketId;

/// Identifier the server assigns to each client.  Never reused within one
/// server process.
pub type ClientId = i32;
