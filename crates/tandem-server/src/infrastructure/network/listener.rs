//! TCP listener, accept loop and per-connection I/O tasks.
//!
//! # Connection tasks
//!
//! Each admitted connection is split into two halves, each driven by its own
//! Tokio task:
//!
//! - **reader**: reads up to `buffer_size` bytes at a time, reassembles
//!   frames with a [`FrameDecoder`] and schedules one `handle_tcp_packet`
//!   callback per packet.  EOF, a socket error or a corrupt frame ends the
//!   task and schedules a disconnect.
//! - **writer**: drains the session's [`Outbound`] queue onto the socket.
//!   A write error schedules a disconnect; [`Outbound::Close`] shuts the
//!   write half down.
//!
//! Neither task touches the registry beyond admission.  Everything else
//! happens on the tick thread.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tandem_core::{encode_packet, ClientId, DispatchQueue, FrameDecoder, Packet, PacketId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::application::registry::{Admission, ClientRegistry, IdAllocator};
use crate::application::session::Outbound;
use crate::server::{NetworkServer, ServerError};

/// Pending connections the OS may queue before `accept`.
const BACKLOG: u32 = 1024;

/// Pause after a failed `accept` (e.g. out of file descriptors) so the loop
/// does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Shared state the accept loop needs; cloned out of the server at start.
pub(crate) struct AcceptContext {
    pub registry: Arc<ClientRegistry>,
    pub ids: Arc<IdAllocator>,
    pub queue: Arc<DispatchQueue<NetworkServer>>,
    pub limit: usize,
    pub buffer_size: usize,
    pub greeting: String,
}

/// Binds a listening socket on `addr` with `buffer_size` kernel buffers.
pub(crate) fn bind(addr: SocketAddr, buffer_size: usize) -> Result<TcpListener, ServerError> {
    let bind_err = |source| ServerError::BindFailed { addr, source };
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    let size = u32::try_from(buffer_size).unwrap_or(u32::MAX);
    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.set_recv_buffer_size(size).map_err(bind_err)?;
    socket.set_send_buffer_size(size).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(BACKLOG).map_err(bind_err)
}

/// Accepts connections until the task is aborted.
pub(crate) async fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => admit(stream, peer, &ctx),
            Err(e) => {
                error!("accept error: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Registers `stream` as a new client and sends it `Welcome`, or drops it
/// if the server is full.
fn admit(stream: TcpStream, peer: SocketAddr, ctx: &AcceptContext) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let session = match ctx.registry.admit(&ctx.ids, ctx.limit, peer, outbound_tx) {
        Admission::Admitted(session) => session,
        Admission::Full => {
            info!("{peer} failed to connect: server full ({} clients)", ctx.limit);
            return;
        }
        Admission::Duplicate(id) => {
            error!("client id {id} is already registered; refusing {peer}");
            return;
        }
    };
    let id = session.id();

    if let Err(e) = stream.set_nodelay(true) {
        debug!("client {id}: could not disable Nagle: {e}");
    }
    let (read_half, write_half) = stream.into_split();
    tokio::spawn(write_loop(id, write_half, outbound_rx, Arc::clone(&ctx.queue)));
    let reader = tokio::spawn(read_loop(id, read_half, ctx.buffer_size, Arc::clone(&ctx.queue)));
    session.set_reader(reader.abort_handle());

    let mut welcome = Packet::new(PacketId::Welcome);
    welcome.write(ctx.greeting.as_str()).write(&id);
    session.send(encode_packet(&welcome));
    if let Err(e) = session.welcome() {
        warn!("client {id}: {e}");
    }
    info!("incoming connection from {peer} assigned client {id}");
}

async fn read_loop(
    id: ClientId,
    mut read_half: OwnedReadHalf,
    buffer_size: usize,
    queue: Arc<DispatchQueue<NetworkServer>>,
) {
    let mut decoder = FrameDecoder::with_capacity(buffer_size);
    let mut read_buf = vec![0u8; buffer_size];
    let mut frames = Vec::new();

    loop {
        let n = match read_half.read(&mut read_buf).await {
            Ok(0) => {
                debug!("client {id}: connection closed by peer");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("client {id}: read failed: {e}");
                break;
            }
        };

        let framing = decoder.decode(&read_buf[..n], &mut frames);
        if !schedule_frames(id, &mut frames, &queue) {
            break;
        }
        if let Err(e) = framing {
            warn!("client {id}: {e}; dropping connection");
            break;
        }
    }

    queue.schedule(move |server: &NetworkServer| {
        server.disconnect(id);
    });
}

/// Schedules one callback per complete frame.  Returns `false` on a frame
/// too short to carry a packet id.
fn schedule_frames(id: ClientId, frames: &mut Vec<Vec<u8>>, queue: &DispatchQueue<NetworkServer>) -> bool {
    for frame in frames.drain(..) {
        match Packet::from_frame(&frame) {
            Ok(packet) => {
                trace!("client {id}: received {packet}");
                queue.schedule(move |server: &NetworkServer| server.handle_tcp_packet(id, packet));
            }
            Err(e) => {
                warn!("client {id}: undecodable frame ({e}); dropping connection");
                return false;
            }
        }
    }
    true
}

async fn write_loop(
    id: ClientId,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    queue: Arc<DispatchQueue<NetworkServer>>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(bytes) => {
                if let Err(e) = write_half.write_all(&bytes).await {
                    debug!("client {id}: write failed: {e}");
                    queue.schedule(move |server: &NetworkServer| {
                        server.disconnect(id);
                    });
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = write_half.shutdown().await {
        trace!("client {id}: shutdown: {e}");
    }
}
