//! The seam between the client's networking layer and game code.

use tandem_core::{DecodeError, Packet};

use crate::client::NetworkClient;

/// Game-side handler for client events.  Callbacks run on the thread that
/// calls [`NetworkClient::tick`](crate::NetworkClient::tick).
#[cfg_attr(test, mockall::automock)]
pub trait ClientApplication: Send + Sync + 'static {
    /// Called once when the application is attached.
    fn on_initialize(&self, _client: &NetworkClient) {}

    /// The handshake completed and both channels are open.
    fn on_connect(&self, _client: &NetworkClient) {}

    /// An active connection was closed, by either side.
    fn on_disconnect(&self, _client: &NetworkClient) {}

    /// An application packet arrived over TCP or UDP.
    ///
    /// # Errors
    ///
    /// A [`DecodeError`] is logged; the connection stays open.
    fn on_packet(&self, _client: &NetworkClient, _packet: &mut Packet) -> Result<(), DecodeError> {
        Ok(())
    }
}
