//! The `NetworkClient` facade.
//!
//! # Connecting (for beginners)
//!
//! ```text
//! connect()            TCP socket open, reader/writer tasks running
//!   │
//! tick(): Welcome      read greeting + id, send WelcomeResponse(id, username)
//!   │                  open UDP on the TCP local port, send an empty Test
//!   │                  datagram so the server learns our endpoint
//!   ▼
//! Active               on_connect fires; packets flow both ways
//! ```
//!
//! Like the server, the client never runs application code on socket
//! tasks.  Everything received is scheduled onto the dispatch queue and
//! handled when the owner calls [`NetworkClient::tick`].
//!
//! Each `connect` starts a new *generation*.  Callbacks carry the generation
//! they were scheduled under and are ignored once it is stale, so a late
//! EOF from a previous connection can never tear down the current one.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tandem_core::{
    encode_packet, encode_tagged_packet, ClientId, DecodeError, DispatchQueue, Handshake, HandshakeError,
    HandshakeState, Packet, PacketId, SubscriptionId, Subscribers,
};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::application::app::ClientApplication;
use crate::infrastructure::network::connector::{self, Outbound, TcpLink};
use crate::infrastructure::network::udp::{self, UdpLink};
use crate::infrastructure::storage::config::{ClientConfig, ConfigError};

/// Raised when the client connects or disconnects.
pub type ConnectionHandler = dyn Fn(&NetworkClient) + Send + Sync;

/// Raised for each application packet from the server.
pub type PacketHandler = dyn Fn(&NetworkClient, &mut Packet) -> Result<(), DecodeError> + Send + Sync;

/// Errors raised while connecting.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host}:{port} did not resolve to any address")]
    Unresolved { host: String, port: u16 },

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to open UDP socket on {addr}: {source}")]
    UdpBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("client I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Subscriber lists for the three client events.
#[derive(Debug, Default)]
pub struct ClientEvents {
    pub on_connect: Subscribers<ConnectionHandler>,
    pub on_disconnect: Subscribers<ConnectionHandler>,
    pub on_packet: Subscribers<PacketHandler>,
}

/// Subscriptions created by [`NetworkClient::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    connect: SubscriptionId,
    disconnect: SubscriptionId,
    packet: SubscriptionId,
}

#[derive(Debug, Default)]
struct Connection {
    generation: u64,
    handshake: Handshake,
    id: Option<ClientId>,
    tcp: Option<TcpLink>,
    udp: Option<UdpLink>,
    runtime: Option<Handle>,
}

/// Dual-transport client.
pub struct NetworkClient {
    config: ClientConfig,
    queue: Arc<DispatchQueue<NetworkClient>>,
    events: ClientEvents,
    conn: Mutex<Connection>,
}

impl NetworkClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            queue: Arc::new(DispatchQueue::new()),
            events: ClientEvents::default(),
            conn: Mutex::new(Connection::default()),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Opens the TCP connection.  The handshake completes on a later
    /// [`tick`](Self::tick), when the server's `Welcome` is processed.
    ///
    /// Returns the server address connected to.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyConnected`] if a connection is open, or a
    /// resolve/connect error.
    pub async fn connect(&self) -> Result<SocketAddr, ClientError> {
        if self.conn.lock().tcp.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        self.config.validate()?;

        let server_addr = connector::resolve(&self.config.server_address, self.config.port).await?;
        let generation = self.conn.lock().generation + 1;
        let link = connector::connect(server_addr, self.config.buffer_size, generation, Arc::clone(&self.queue)).await?;

        {
            let mut conn = self.conn.lock();
            if conn.tcp.is_some() {
                link.reader.abort();
                let _ = link.outbound.send(Outbound::Close);
                return Err(ClientError::AlreadyConnected);
            }
            *conn = Connection {
                generation,
                handshake: Handshake::new(),
                id: None,
                tcp: Some(link),
                udp: None,
                runtime: Some(Handle::current()),
            };
        }
        info!("connecting to {server_addr} as {}", self.config.username);
        Ok(server_addr)
    }

    /// Closes both channels.  Raises `on_disconnect` if the handshake had
    /// completed.  Returns `false` if there was no connection.
    pub fn disconnect(&self) -> bool {
        let (previous, tcp, udp) = {
            let mut conn = self.conn.lock();
            if conn.tcp.is_none() {
                return false;
            }
            let Some(previous) = conn.handshake.disconnect() else {
                return false;
            };
            (previous, conn.tcp.take(), conn.udp.take())
        };

        if let Some(tcp) = tcp {
            let _ = tcp.outbound.send(Outbound::Close);
            tcp.reader.abort();
        }
        if let Some(udp) = udp {
            udp.receiver.abort();
        }
        info!("disconnected from server");

        if previous == HandshakeState::Active {
            for subscriber in self.events.on_disconnect.snapshot().iter() {
                (subscriber.handler)(self);
            }
        }
        true
    }

    /// Runs every callback scheduled since the last tick.
    pub fn tick(&self) -> usize {
        self.queue.drain(self)
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &ClientEvents {
        &self.events
    }

    /// Id assigned by the server, once `Welcome` has been processed.
    pub fn id(&self) -> Option<ClientId> {
        self.conn.lock().id
    }

    pub fn state(&self) -> HandshakeState {
        self.conn.lock().handshake.state()
    }

    /// `true` while the TCP connection is open (handshake may be pending).
    pub fn is_connected(&self) -> bool {
        self.conn.lock().tcp.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.state() == HandshakeState::Active
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.conn.lock().tcp.as_ref().map(|tcp| tcp.local_addr)
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.conn.lock().tcp.as_ref().map(|tcp| tcp.server_addr)
    }

    // ── Applications ─────────────────────────────────────────────────────────

    /// Subscribes `app` to all three events and calls its `on_initialize`.
    pub fn attach<A: ClientApplication>(&self, app: Arc<A>) -> Attachment {
        let name = std::any::type_name::<A>();
        app.on_initialize(self);

        let on_connect = Arc::clone(&app);
        let connect = self.events.on_connect.subscribe(
            name,
            Arc::new(move |client: &NetworkClient| on_connect.on_connect(client)),
        );
        let on_disconnect = Arc::clone(&app);
        let disconnect = self.events.on_disconnect.subscribe(
            name,
            Arc::new(move |client: &NetworkClient| on_disconnect.on_disconnect(client)),
        );
        let packet = self.events.on_packet.subscribe(
            name,
            Arc::new(move |client: &NetworkClient, packet: &mut Packet| app.on_packet(client, packet)),
        );
        Attachment {
            connect,
            disconnect,
            packet,
        }
    }

    pub fn detach(&self, attachment: Attachment) {
        self.events.on_connect.unsubscribe(attachment.connect);
        self.events.on_disconnect.unsubscribe(attachment.disconnect);
        self.events.on_packet.unsubscribe(attachment.packet);
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Queues `packet` on the TCP connection.  Returns `false` when not
    /// connected.
    pub fn send_tcp(&self, packet: &Packet) -> bool {
        let conn = self.conn.lock();
        match &conn.tcp {
            Some(tcp) => tcp.outbound.send(Outbound::Frame(encode_packet(packet))).is_ok(),
            None => {
                debug!("send_tcp while disconnected; dropping {packet}");
                false
            }
        }
    }

    /// Sends `packet` as a datagram tagged with this client's id.  Returns
    /// `false` if the UDP channel is not open or the datagram was dropped.
    pub fn send_udp(&self, packet: &Packet) -> bool {
        let (id, socket) = {
            let conn = self.conn.lock();
            match (conn.id, &conn.udp) {
                (Some(id), Some(udp)) => (id, Arc::clone(&udp.socket)),
                _ => {
                    debug!("send_udp before the UDP channel is open; dropping {packet}");
                    return false;
                }
            }
        };

        match socket.try_send(&encode_tagged_packet(id, packet)) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("UDP send buffer full; dropping {packet}");
                false
            }
            Err(e) => {
                warn!("UDP send failed: {e}");
                false
            }
        }
    }

    // ── Tick-thread handlers (scheduled by the socket tasks) ─────────────────

    fn is_current(&self, generation: u64) -> bool {
        let conn = self.conn.lock();
        conn.generation == generation && conn.tcp.is_some()
    }

    pub(crate) fn handle_tcp_packet(&self, generation: u64, packet: Packet) {
        if !self.is_current(generation) {
            trace!("dropping {packet} from a closed connection");
            return;
        }
        match (self.state(), packet.id()) {
            (HandshakeState::Accepted, PacketId::Welcome) => self.complete_handshake(packet),
            (HandshakeState::Active, _) => self.emit_packet(packet),
            (state, id) => debug!("ignoring {id} while {state}"),
        }
    }

    pub(crate) fn handle_datagram(&self, generation: u64, packet: Packet) {
        if self.is_current(generation) && self.is_active() {
            self.emit_packet(packet);
        } else {
            trace!("dropping datagram {packet}");
        }
    }

    pub(crate) fn connection_lost(&self, generation: u64) {
        if self.is_current(generation) {
            self.disconnect();
        }
    }

    fn complete_handshake(&self, mut welcome: Packet) {
        let (greeting, id) = match read_welcome(&mut welcome) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("malformed Welcome ({e}); disconnecting");
                self.disconnect();
                return;
            }
        };
        info!("message from server: {greeting}");

        if let Err(e) = self.begin_session(id) {
            warn!("handshake failed: {e}");
            self.disconnect();
            return;
        }

        info!("connected as client {id}");
        for subscriber in self.events.on_connect.snapshot().iter() {
            (subscriber.handler)(self);
        }
    }

    /// Answers `Welcome`, opens the UDP channel and announces our endpoint.
    fn begin_session(&self, id: ClientId) -> Result<(), ClientError> {
        {
            let mut conn = self.conn.lock();
            conn.id = Some(id);
            conn.handshake.welcome()?;
        }

        let mut response = Packet::new(PacketId::WelcomeResponse);
        response.write(&id).write(self.config.username.as_str());
        if !self.send_tcp(&response) {
            return Err(ClientError::NotConnected);
        }

        let mut conn = self.conn.lock();
        conn.handshake.authenticate()?;
        let (Some(tcp), Some(runtime)) = (&conn.tcp, &conn.runtime) else {
            return Err(ClientError::NotConnected);
        };
        let link = udp::open(
            runtime,
            tcp.local_addr,
            tcp.server_addr,
            self.config.buffer_size,
            conn.generation,
            Arc::clone(&self.queue),
        )?;

        // An empty Test datagram tells the server which endpoint is ours.
        if let Err(e) = link.socket.try_send(&encode_tagged_packet(id, &Packet::new(PacketId::Test))) {
            warn!("binding datagram not sent: {e}");
        }
        conn.udp = Some(link);
        conn.handshake.bind()?;
        conn.handshake.activate()?;
        Ok(())
    }

    fn emit_packet(&self, mut packet: Packet) {
        trace!("dispatching {packet}");
        for subscriber in self.events.on_packet.snapshot().iter() {
            packet.rewind();
            if let Err(e) = (subscriber.handler)(self, &mut packet) {
                warn!("{} failed on {packet}: {e}", subscriber.name);
            }
        }
    }
}

impl std::fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkClient")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        let conn = self.conn.get_mut();
        if let Some(tcp) = conn.tcp.take() {
            tcp.reader.abort();
        }
        if let Some(udp) = conn.udp.take() {
            udp.receiver.abort();
        }
    }
}

/// `[greeting: string][id: i32]`
fn read_welcome(packet: &mut Packet) -> Result<(String, ClientId), DecodeError> {
    let greeting = packet.read()?;
    let id = packet.read()?;
    Ok((greeting, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl ClientApplication for Recorder {
        fn on_connect(&self, client: &NetworkClient) {
            self.log.lock().push(format!("connect {:?}", client.id()));
        }

        fn on_disconnect(&self, _client: &NetworkClient) {
            self.log.lock().push("disconnect".into());
        }
    }

    #[test]
    fn test_new_client_is_not_connected() {
        let client = NetworkClient::new(ClientConfig::default());

        assert!(!client.is_connected());
        assert_eq!(client.id(), None);
        assert_eq!(client.state(), HandshakeState::Accepted);
    }

    #[test]
    fn test_disconnect_without_connection_is_noop() {
        // Arrange
        let client = NetworkClient::new(ClientConfig::default());
        let recorder = Arc::new(Recorder::default());
        client.attach(Arc::clone(&recorder));

        // Act
        let closed = client.disconnect();

        // Assert
        assert!(!closed);
        assert!(recorder.log.lock().is_empty());
    }

    #[test]
    fn test_sends_while_disconnected_are_dropped() {
        let client = NetworkClient::new(ClientConfig::default());

        assert!(!client.send_tcp(&Packet::new(PacketId::Test)));
        assert!(!client.send_udp(&Packet::new(PacketId::Test)));
    }

    #[test]
    fn test_stale_generation_callbacks_are_ignored() {
        // Arrange
        let client = NetworkClient::new(ClientConfig::default());
        let recorder = Arc::new(Recorder::default());
        client.attach(Arc::clone(&recorder));
        let mut welcome = Packet::new(PacketId::Welcome);
        welcome.write("hi").write(&1i32);

        // Act
        client.handle_tcp_packet(7, Packet::from_body(welcome.id(), welcome.body()));
        client.connection_lost(7);

        // Assert
        assert_eq!(client.id(), None);
        assert!(recorder.log.lock().is_empty());
    }

    #[test]
    fn test_read_welcome_reads_greeting_then_id() {
        let mut out = Packet::new(PacketId::Welcome);
        out.write("Welcome to the server!").write(&7i32);
        let mut inbound = Packet::from_body(out.id(), out.body());

        let (greeting, id) = read_welcome(&mut inbound).unwrap();

        assert_eq!(greeting, "Welcome to the server!");
        assert_eq!(id, 7);
    }

    #[test]
    fn test_attach_calls_on_initialize_once_with_mock() {
        use crate::application::app::MockClientApplication;

        // Arrange
        let mut app = MockClientApplication::new();
        app.expect_on_initialize().times(1).return_const(());
        let client = NetworkClient::new(ClientConfig::default());

        // Act
        let attachment = client.attach(Arc::new(app));
        client.detach(attachment);

        // Assert
        assert!(client.events().on_packet.is_empty());
    }
}
