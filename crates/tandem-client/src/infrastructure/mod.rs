//! Infrastructure layer for the client.
//!
//! Contains the OS-facing adapters: the TCP connector with its read and
//! write tasks, the UDP channel, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tandem_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – Resolves and connects to the server, reassembles TCP
//!   frames, opens the UDP socket on the TCP connection's local port, and
//!   schedules everything it receives onto the client's dispatch queue.
//!
//! - **`storage`** – Loads and saves [`ClientConfig`](storage::config::ClientConfig).

pub mod network;
pub mod storage;
