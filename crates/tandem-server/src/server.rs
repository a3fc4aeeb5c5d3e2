//! The `NetworkServer` facade.
//!
//! # Threads (for beginners)
//!
//! ```text
//!  accept task ──┐
//!  reader tasks ─┼─► DispatchQueue ──► tick() on the caller's thread ──► events
//!  UDP task ─────┘
//! ```
//!
//! Socket tasks never touch application state.  They turn bytes into
//! [`Packet`]s and schedule a callback; the owner of the server calls
//! [`NetworkServer::tick`] at a fixed rate, which runs those callbacks in
//! arrival order and raises connect, disconnect and packet events.
//!
//! Sending goes the other way and never blocks the tick thread: TCP frames
//! are pushed onto each session's writer queue, UDP datagrams go out with
//! `try_send_to` and are dropped if the socket buffer is full.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tandem_core::{
    encode_packet, ClientId, DecodeError, DispatchQueue, HandshakeState, Packet, PacketId, SubscriptionId,
    Subscribers,
};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::application::app::ServerApplication;
use crate::application::registry::{ClientRegistry, IdAllocator};
use crate::application::session::{DatagramVerdict, Session};
use crate::infrastructure::network::{listener, udp};
use crate::infrastructure::storage::config::{ConfigError, ServerConfig};

/// Raised with the id of a client that connected or disconnected.
pub type ClientHandler = dyn Fn(&NetworkServer, ClientId) + Send + Sync;

/// Raised for each application packet from an active client.
pub type PacketHandler = dyn Fn(&NetworkServer, ClientId, &mut Packet) -> Result<(), DecodeError> + Send + Sync;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Subscriber lists for the three server events.
#[derive(Debug, Default)]
pub struct ServerEvents {
    pub on_client_connect: Subscribers<ClientHandler>,
    pub on_client_disconnect: Subscribers<ClientHandler>,
    pub on_client_packet: Subscribers<PacketHandler>,
}

/// Subscriptions created by [`NetworkServer::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    connect: SubscriptionId,
    disconnect: SubscriptionId,
    packet: SubscriptionId,
}

/// Dual-transport server.
pub struct NetworkServer {
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    ids: Arc<IdAllocator>,
    queue: Arc<DispatchQueue<NetworkServer>>,
    events: ServerEvents,
    running: AtomicBool,
    udp: Mutex<Option<Arc<UdpSocket>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl NetworkServer {
    /// Creates a stopped server.  Nothing is bound until [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            ids: Arc::new(IdAllocator::new()),
            queue: Arc::new(DispatchQueue::new()),
            events: ServerEvents::default(),
            running: AtomicBool::new(false),
            udp: Mutex::new(None),
            local_addr: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Binds the TCP listener and the UDP socket on the same port and spawns
    /// the accept and receive loops.  Calling it again while running returns
    /// the bound address.
    ///
    /// With `port = 0` the OS picks the TCP port and UDP binds the same one.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] for an invalid configuration,
    /// [`ServerError::BindFailed`] if either socket cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }
        self.config.validate()?;

        let tcp = listener::bind(self.config.socket_addr()?, self.config.buffer_size)?;
        let local = tcp.local_addr()?;
        let socket = Arc::new(udp::bind(local).await?);

        let accept = tokio::spawn(listener::accept_loop(
            tcp,
            listener::AcceptContext {
                registry: Arc::clone(&self.registry),
                ids: Arc::clone(&self.ids),
                queue: Arc::clone(&self.queue),
                limit: self.config.limit_of_connections,
                buffer_size: self.config.buffer_size,
                greeting: self.config.greeting.clone(),
            },
        ));
        let receive = tokio::spawn(udp::recv_loop(
            Arc::clone(&socket),
            self.config.buffer_size,
            Arc::clone(&self.queue),
        ));

        *self.tasks.lock() = vec![accept.abort_handle(), receive.abort_handle()];
        *self.udp.lock() = Some(socket);
        *self.local_addr.lock() = Some(local);
        self.running.store(true, Ordering::Release);

        info!(
            "server listening on {local} (TCP + UDP), up to {} clients",
            self.config.limit_of_connections
        );
        Ok(local)
    }

    /// Stops accepting, disconnects every client (raising disconnect events
    /// for active ones) and closes the UDP socket.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for id in self.registry.ids() {
            self.disconnect(id);
        }
        *self.udp.lock() = None;
        *self.local_addr.lock() = None;
        info!("server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs every callback the socket tasks scheduled since the last tick.
    /// Returns how many ran.
    pub fn tick(&self) -> usize {
        self.queue.drain(self)
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn events(&self) -> &ServerEvents {
        &self.events
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Queue drained by [`tick`](Self::tick).  Work scheduled here runs on
    /// the tick thread with access to the server.
    pub fn dispatch_queue(&self) -> &Arc<DispatchQueue<NetworkServer>> {
        &self.queue
    }

    /// Address the sockets are bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn limit_of_connections(&self) -> usize {
        self.config.limit_of_connections
    }

    pub fn client(&self, id: ClientId) -> Option<Arc<Session>> {
        self.registry.get(id)
    }

    pub fn clients(&self) -> Vec<Arc<Session>> {
        self.registry.all()
    }

    // ── Applications ─────────────────────────────────────────────────────────

    /// Subscribes `app` to all three events under its type name and calls
    /// its `on_initialize`.
    pub fn attach<A: ServerApplication>(&self, app: Arc<A>) -> Attachment {
        let name = std::any::type_name::<A>();
        app.on_initialize(self);

        let on_connect = Arc::clone(&app);
        let connect = self.events.on_client_connect.subscribe(
            name,
            Arc::new(move |server: &NetworkServer, id: ClientId| on_connect.on_client_connect(server, id)),
        );
        let on_disconnect = Arc::clone(&app);
        let disconnect = self.events.on_client_disconnect.subscribe(
            name,
            Arc::new(move |server: &NetworkServer, id: ClientId| on_disconnect.on_client_disconnect(server, id)),
        );
        let packet = self.events.on_client_packet.subscribe(
            name,
            Arc::new(move |server: &NetworkServer, id: ClientId, packet: &mut Packet| {
                app.on_client_packet(server, id, packet)
            }),
        );

        debug!("attached application {name}");
        Attachment {
            connect,
            disconnect,
            packet,
        }
    }

    /// Removes the subscriptions created by [`attach`](Self::attach).
    pub fn detach(&self, attachment: Attachment) {
        self.events.on_client_connect.unsubscribe(attachment.connect);
        self.events.on_client_disconnect.unsubscribe(attachment.disconnect);
        self.events.on_client_packet.unsubscribe(attachment.packet);
    }

    // ── Reliable sends ───────────────────────────────────────────────────────

    /// Queues `packet` on one client's TCP connection.  Returns `false` if
    /// the client is unknown or its writer has stopped.
    pub fn send_tcp(&self, client: ClientId, packet: &Packet) -> bool {
        match self.registry.get(client) {
            Some(session) => session.send(encode_packet(packet)),
            None => {
                debug!("send_tcp: no client {client}; dropping {packet}");
                false
            }
        }
    }

    /// Queues `packet` for every active client.  Returns how many accepted it.
    pub fn send_tcp_to_all(&self, packet: &Packet) -> usize {
        self.broadcast_tcp(packet, None)
    }

    pub fn send_tcp_to_all_except(&self, except: ClientId, packet: &Packet) -> usize {
        self.broadcast_tcp(packet, Some(except))
    }

    fn broadcast_tcp(&self, packet: &Packet, except: Option<ClientId>) -> usize {
        let frame = encode_packet(packet);
        self.recipients(except)
            .iter()
            .filter(|session| session.send(frame.clone()))
            .count()
    }

    // ── Unreliable sends ─────────────────────────────────────────────────────

    /// Sends `packet` to one client's bound UDP endpoint.  Returns `false`
    /// if the client is unknown, not yet bound, or the datagram was dropped.
    pub fn send_udp(&self, client: ClientId, packet: &Packet) -> bool {
        let Some(session) = self.registry.get(client) else {
            debug!("send_udp: no client {client}; dropping {packet}");
            return false;
        };
        let Some(endpoint) = session.udp_endpoint() else {
            debug!("send_udp: client {client} has no UDP endpoint yet; dropping {packet}");
            return false;
        };
        self.send_datagram(&encode_packet(packet), endpoint)
    }

    pub fn send_udp_to_all(&self, packet: &Packet) -> usize {
        self.broadcast_udp(packet, None)
    }

    pub fn send_udp_to_all_except(&self, except: ClientId, packet: &Packet) -> usize {
        self.broadcast_udp(packet, Some(except))
    }

    fn broadcast_udp(&self, packet: &Packet, except: Option<ClientId>) -> usize {
        let datagram = encode_packet(packet);
        self.recipients(except)
            .iter()
            .filter_map(|session| session.udp_endpoint())
            .filter(|endpoint| self.send_datagram(&datagram, *endpoint))
            .count()
    }

    fn send_datagram(&self, datagram: &[u8], to: SocketAddr) -> bool {
        let Some(socket) = self.udp.lock().clone() else {
            debug!("UDP socket not bound; dropping datagram for {to}");
            return false;
        };
        match socket.try_send_to(datagram, to) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("UDP send buffer full; dropping datagram for {to}");
                false
            }
            Err(e) => {
                warn!("UDP send to {to} failed: {e}");
                false
            }
        }
    }

    /// Active sessions, minus `except`.
    fn recipients(&self, except: Option<ClientId>) -> Vec<Arc<Session>> {
        self.registry
            .all()
            .into_iter()
            .filter(|session| session.is_active() && Some(session.id()) != except)
            .collect()
    }

    // ── Disconnect ───────────────────────────────────────────────────────────

    /// Unregisters `client`, closes both of its channels and, if it had
    /// completed the handshake, raises `on_client_disconnect`.  Returns
    /// `false` if the client was not registered.
    pub fn disconnect(&self, client: ClientId) -> bool {
        let Some(session) = self.registry.unregister(client) else {
            return false;
        };
        let previous = session.close();
        info!("client {client} disconnected ({} remaining)", self.registry.len());

        if previous == Some(HandshakeState::Active) {
            for subscriber in self.events.on_client_disconnect.snapshot().iter() {
                (subscriber.handler)(self, client);
            }
        }
        true
    }

    // ── Tick-thread handlers (scheduled by the socket tasks) ─────────────────

    pub(crate) fn handle_tcp_packet(&self, client: ClientId, packet: Packet) {
        let Some(session) = self.registry.get(client) else {
            trace!("dropping {packet} for departed client {client}");
            return;
        };

        match (session.state(), packet.id()) {
            (HandshakeState::Welcomed, PacketId::WelcomeResponse) => self.complete_handshake(&session, packet),
            (HandshakeState::Active, _) => self.emit_packet(client, packet),
            (state, id) => debug!("client {client}: ignoring {id} while {state}"),
        }
    }

    pub(crate) fn handle_datagram(&self, client: ClientId, source: SocketAddr, packet: Packet) {
        let Some(session) = self.registry.get(client) else {
            trace!("dropping datagram from {source} for unknown client {client}");
            return;
        };

        match session.accept_datagram(source) {
            DatagramVerdict::Bound => info!("client {client} UDP bound to {source}"),
            DatagramVerdict::Deliver => self.emit_packet(client, packet),
            DatagramVerdict::Spoofed => trace!("dropping datagram for client {client} from foreign endpoint {source}"),
            DatagramVerdict::NotReady => trace!("client {client} not ready for datagrams; dropping {packet}"),
        }
    }

    fn complete_handshake(&self, session: &Session, mut response: Packet) {
        let client = session.id();
        let (echoed, username) = match read_welcome_response(&mut response) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("client {client}: malformed WelcomeResponse ({e}); disconnecting");
                self.disconnect(client);
                return;
            }
        };

        if let Err(e) = session.authenticate(echoed, username.clone()) {
            warn!("client {client} failed the handshake: {e}");
            self.disconnect(client);
            return;
        }

        info!("{} connected successfully and is now player {client}", session.peer_addr());
        debug!("client {client} username: {username}");
        for subscriber in self.events.on_client_connect.snapshot().iter() {
            (subscriber.handler)(self, client);
        }
    }

    fn emit_packet(&self, client: ClientId, mut packet: Packet) {
        trace!("client {client}: dispatching {packet}");
        for subscriber in self.events.on_client_packet.snapshot().iter() {
            packet.rewind();
            if let Err(e) = (subscriber.handler)(self, client, &mut packet) {
                warn!("{} failed on {packet} from client {client}: {e}", subscriber.name);
            }
        }
    }
}

impl std::fmt::Debug for NetworkServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkServer")
            .field("local_addr", &self.local_addr())
            .field("running", &self.is_running())
            .field("clients", &self.registry.len())
            .finish()
    }
}

impl Drop for NetworkServer {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// `[id: i32][username: string]`
fn read_welcome_response(packet: &mut Packet) -> Result<(ClientId, String), DecodeError> {
    let echoed = packet.read()?;
    let username = packet.read()?;
    Ok((echoed, username))
}
