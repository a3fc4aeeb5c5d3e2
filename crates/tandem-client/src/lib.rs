//! tandem-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client connects over TCP, answers the server's `Welcome`, then opens
//! a UDP socket on the same local port and announces it with one datagram.
//! From then on the application sends and receives on either channel.

pub mod application;
pub mod client;
pub mod infrastructure;

pub use application::app::ClientApplication;
pub use client::{Attachment, ClientError, ClientEvents, NetworkClient};
pub use infrastructure::storage::config::{load_config, save_config, ClientConfig, ConfigError};
