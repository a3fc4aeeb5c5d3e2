//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP listener, runs the accept loop (capacity
//!   check, id allocation, registration, `Welcome`), and the per-connection
//!   read and write tasks.
//!
//! - **`udp`** – Binds the single UDP socket shared by all clients and runs
//!   the receive loop that turns datagrams into tagged packets.
//!
//! Neither module runs application code.  Everything they decode is
//! scheduled onto the server's dispatch queue and handled on the tick thread.

pub mod listener;
pub mod udp;
