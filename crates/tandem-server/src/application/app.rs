//! The seam between the networking layer and game code.
//!
//! A [`ServerApplication`] receives the server's events on the tick thread.
//! [`NetworkServer::attach`](crate::NetworkServer::attach) subscribes all
//! four callbacks at once; every method has an empty default so an
//! application implements only what it needs.

use tandem_core::{ClientId, DecodeError, Packet};

use crate::server::NetworkServer;

/// Game-side handler for server events.
///
/// All callbacks run on the thread that calls
/// [`NetworkServer::tick`](crate::NetworkServer::tick), never concurrently
/// with each other.
#[cfg_attr(test, mockall::automock)]
pub trait ServerApplication: Send + Sync + 'static {
    /// Called once when the application is attached.
    fn on_initialize(&self, _server: &NetworkServer) {}

    /// A client completed the handshake.
    fn on_client_connect(&self, _server: &NetworkServer, _client: ClientId) {}

    /// A client that had completed the handshake went away.
    fn on_client_disconnect(&self, _server: &NetworkServer, _client: ClientId) {}

    /// An application packet arrived from an active client, over either
    /// transport.  The packet's read cursor is at the start of the body.
    ///
    /// # Errors
    ///
    /// A [`DecodeError`] is logged by the server; the client stays connected.
    fn on_client_packet(
        &self,
        _server: &NetworkServer,
        _client: ClientId,
        _packet: &mut Packet,
    ) -> Result<(), DecodeError> {
        Ok(())
    }
}
