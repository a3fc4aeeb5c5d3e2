//! Per-client session state.
//!
//! A [`Session`] pairs one client's reliable channel (an outbound frame
//! queue drained by the connection's writer task) with its unreliable
//! endpoint (the UDP source address, recorded by the first datagram).  It
//! also tracks where the client is in the [`Handshake`].
//!
//! Sessions are shared as `Arc<Session>` between the registry, the
//! connection's I/O tasks and the tick thread, so all mutable state sits
//! behind one short-lived lock.

use std::net::SocketAddr;

use parking_lot::Mutex;
use tandem_core::{ClientId, Handshake, HandshakeError, HandshakeState};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Message for a connection's writer task.
#[derive(Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes to write as-is (already framed).
    Frame(Vec<u8>),
    /// Shut down the write half and stop.
    Close,
}

/// What the server should do with a datagram that names this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramVerdict {
    /// First datagram: its source is now the session's endpoint.  The
    /// datagram itself is not delivered.
    Bound,
    /// Source matches the recorded endpoint and the session is active.
    Deliver,
    /// Source differs from the recorded endpoint.  Nothing changed.
    Spoofed,
    /// The session cannot take datagrams in its current state.
    NotReady,
}

#[derive(Debug)]
struct SessionState {
    handshake: Handshake,
    username: Option<String>,
    udp_endpoint: Option<SocketAddr>,
}

/// One connected client.
#[derive(Debug)]
pub struct Session {
    id: ClientId,
    peer_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: Mutex<Option<AbortHandle>>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Creates a session in the `Accepted` state.
    pub fn new(id: ClientId, peer_addr: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            peer_addr,
            outbound,
            reader: Mutex::new(None),
            state: Mutex::new(SessionState {
                handshake: Handshake::new(),
                username: None,
                udp_endpoint: None,
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Remote address of the TCP connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Name sent in the client's `WelcomeResponse`, once authenticated.
    pub fn username(&self) -> Option<String> {
        self.state.lock().username.clone()
    }

    pub fn state(&self) -> HandshakeState {
        self.state.lock().handshake.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == HandshakeState::Active
    }

    pub fn is_alive(&self) -> bool {
        self.state() != HandshakeState::Disconnected
    }

    /// Source address of the client's datagrams, once bound.
    pub fn udp_endpoint(&self) -> Option<SocketAddr> {
        self.state.lock().udp_endpoint
    }

    /// Queues an already-framed buffer on the reliable channel.  Returns
    /// `false` if the writer task has gone away.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.outbound.send(Outbound::Frame(frame)).is_ok()
    }

    // ── Handshake steps (driven by the server) ───────────────────────────────

    /// Records that `Welcome` was sent.
    pub(crate) fn welcome(&self) -> Result<(), HandshakeError> {
        self.state.lock().handshake.welcome()
    }

    /// Checks the echoed id and, if it matches, moves to `Active` (through
    /// `Bound` when a datagram already recorded the endpoint).
    pub(crate) fn authenticate(&self, echoed: ClientId, username: String) -> Result<(), HandshakeError> {
        let mut state = self.state.lock();
        state.handshake.verify_echo(self.id, echoed)?;
        state.username = Some(username);
        if state.udp_endpoint.is_some() {
            state.handshake.bind()?;
        }
        state.handshake.activate()
    }

    /// Applies the trust-on-first-packet rule to a datagram from `source`.
    pub(crate) fn accept_datagram(&self, source: SocketAddr) -> DatagramVerdict {
        let mut state = self.state.lock();
        let handshake_state = state.handshake.state();
        if matches!(handshake_state, HandshakeState::Accepted | HandshakeState::Disconnected) {
            return DatagramVerdict::NotReady;
        }

        match state.udp_endpoint {
            None => {
                state.udp_endpoint = Some(source);
                if handshake_state == HandshakeState::Authenticated {
                    // Cannot fail: checked the state above under the same lock.
                    let _ = state.handshake.bind();
                }
                DatagramVerdict::Bound
            }
            Some(endpoint) if endpoint != source => DatagramVerdict::Spoofed,
            Some(_) if handshake_state == HandshakeState::Active => DatagramVerdict::Deliver,
            Some(_) => DatagramVerdict::NotReady,
        }
    }

    pub(crate) fn set_reader(&self, handle: AbortHandle) {
        if self.is_alive() {
            *self.reader.lock() = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Closes both channels and marks the session `Disconnected`.
    ///
    /// Returns the state the session was in, or `None` if it was already
    /// closed.
    pub fn close(&self) -> Option<HandshakeState> {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.handshake.disconnect()?;
            state.udp_endpoint = None;
            previous
        };

        // The writer may already be gone; that is fine.
        let _ = self.outbound.send(Outbound::Close);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn welcomed(id: ClientId) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(id, addr(5000), tx);
        session.welcome().unwrap();
        (session, rx)
    }

    #[test]
    fn test_matching_echo_activates_and_stores_username() {
        // Arrange
        let (session, _rx) = welcomed(7);

        // Act
        session.authenticate(7, "alice".into()).unwrap();

        // Assert
        assert!(session.is_active());
        assert_eq!(session.username().as_deref(), Some("alice"));
    }

    #[test]
    fn test_mismatched_echo_leaves_session_welcomed() {
        let (session, _rx) = welcomed(7);

        let result = session.authenticate(8, "mallory".into());

        assert_eq!(result, Err(HandshakeError::IdMismatch { assigned: 7, echoed: 8 }));
        assert_eq!(session.state(), HandshakeState::Welcomed);
        assert_eq!(session.username(), None);
    }

    #[test]
    fn test_first_datagram_binds_endpoint_without_delivery() {
        let (session, _rx) = welcomed(1);
        session.authenticate(1, "a".into()).unwrap();

        assert_eq!(session.accept_datagram(addr(6000)), DatagramVerdict::Bound);
        assert_eq!(session.udp_endpoint(), Some(addr(6000)));
        assert_eq!(session.accept_datagram(addr(6000)), DatagramVerdict::Deliver);
    }

    #[test]
    fn test_datagram_from_other_endpoint_is_spoofed_and_changes_nothing() {
        // Arrange
        let (session, _rx) = welcomed(1);
        session.authenticate(1, "a".into()).unwrap();
        session.accept_datagram(addr(6000));

        // Act
        let verdict = session.accept_datagram(addr(6001));

        // Assert
        assert_eq!(verdict, DatagramVerdict::Spoofed);
        assert_eq!(session.udp_endpoint(), Some(addr(6000)));
        assert!(session.is_active());
    }

    #[test]
    fn test_datagram_before_authentication_binds_and_auth_passes_through_bound() {
        // Arrange: UDP overtakes the TCP WelcomeResponse.
        let (session, _rx) = welcomed(3);
        assert_eq!(session.accept_datagram(addr(6000)), DatagramVerdict::Bound);
        assert_eq!(session.accept_datagram(addr(6000)), DatagramVerdict::NotReady);

        // Act
        session.authenticate(3, "c".into()).unwrap();

        // Assert
        assert!(session.is_active());
        assert_eq!(session.accept_datagram(addr(6000)), DatagramVerdict::Deliver);
    }

    #[test]
    fn test_close_sends_close_and_is_idempotent() {
        // Arrange
        let (session, mut rx) = welcomed(1);
        session.authenticate(1, "a".into()).unwrap();
        session.accept_datagram(addr(6000));

        // Act
        let first = session.close();
        let second = session.close();

        // Assert
        assert_eq!(first, Some(HandshakeState::Active));
        assert_eq!(second, None);
        assert!(!session.is_alive());
        assert_eq!(session.udp_endpoint(), None);
        assert_eq!(rx.try_recv(), Ok(Outbound::Close));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_queues_frame_for_writer() {
        let (session, mut rx) = welcomed(1);

        assert!(session.send(vec![1, 2, 3]));

        assert_eq!(rx.try_recv(), Ok(Outbound::Frame(vec![1, 2, 3])));
    }
}
