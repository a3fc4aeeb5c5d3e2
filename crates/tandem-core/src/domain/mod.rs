//! Domain types for Tandem.
//!
//! This module contains plain data and state with no infrastructure
//! dependencies: no sockets, no runtime, no file system.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has **no** imports from OS
//! APIs, network libraries or async runtimes, so it can be compiled and
//! tested anywhere without any external setup.
//!
//! The server and client crates depend on these types; the types never
//! depend on them.

/// Vector and rotation values carried inside packets.
pub mod geometry;

/// The connection handshake state machine.
///
/// See [`handshake::Handshake`] for the main type.
pub mod handshake;
