//! Infrastructure layer for the server.
//!
//! Contains the OS-facing adapters: the TCP listener and per-connection
//! tasks, the shared UDP socket, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tandem_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
