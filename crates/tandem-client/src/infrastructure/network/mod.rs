//! Network infrastructure for the client.
//!
//! - **`connector`** – Resolves the server address, opens the TCP
//!   connection and runs its reader and writer tasks.
//! - **`udp`** – Opens the UDP socket bound to the TCP connection's local
//!   address and runs its receive loop.
//!
//! Both schedule callbacks tagged with the connection's generation number,
//! so anything still in flight from an earlier connection is ignored after a
//! reconnect.

pub mod connector;
pub mod udp;
