//! tandem-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;
pub mod server;

pub use application::app::ServerApplication;
pub use infrastructure::storage::config::{load_config, save_config, ConfigError, ServerConfig};
pub use server::{Attachment, NetworkServer, ServerError, ServerEvents};
