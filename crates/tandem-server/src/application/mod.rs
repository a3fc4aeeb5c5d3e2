//! Application layer for the server.
//!
//! Everything here runs on the tick thread or is shared with it through
//! `Arc`s.  Nothing in this layer opens sockets.
//!
//! # Sub-modules
//!
//! - **`session`**  – One client's handshake state, UDP endpoint and outbound
//!   frame queue.
//!
//! - **`registry`** – The id → session map and the id allocator.  Admission
//!   enforces the connection limit.
//!
//! - **`app`**      – The [`ServerApplication`](app::ServerApplication) trait
//!   game code implements to receive connect, disconnect and packet events.
//!
//! - **`lobby`**    – A small demo application: spawns a player per client,
//!   relays chat and turns input updates into position broadcasts.

pub mod app;
pub mod lobby;
pub mod registry;
pub mod session;
