//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the server's TOML file, fills in defaults
//! for anything missing, and validates ranges before the server is built.

pub mod config;
