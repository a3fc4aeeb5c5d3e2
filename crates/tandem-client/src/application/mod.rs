//! Application layer for the client.
//!
//! - **`app`**  – The [`ClientApplication`](app::ClientApplication) trait
//!   game code implements to receive connect, disconnect and packet events.
//!
//! - **`demo`** – A demo player that tracks the server lobby's roster and
//!   walks in a slow circle.

pub mod app;
pub mod demo;
