//! TCP connection to the server.
//!
//! [`connect`] resolves the configured host, opens the socket with the
//! configured buffer sizes and splits it into two tasks:
//!
//! - the **reader** reassembles frames and schedules
//!   `handle_tcp_packet` for each one.  EOF, a read error or a corrupt frame
//!   ends it and schedules `connection_lost`.
//! - the **writer** drains [`Outbound`] messages onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use tandem_core::{DispatchQueue, FrameDecoder, Packet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::client::{ClientError, NetworkClient};

/// Message for the writer task.
#[derive(Debug, PartialEq, Eq)]
pub enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// An open TCP connection and the handles that control it.
#[derive(Debug)]
pub(crate) struct TcpLink {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub reader: AbortHandle,
    pub local_addr: SocketAddr,
    pub server_addr: SocketAddr,
}

/// Resolves `host:port`, preferring the first address returned.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ClientError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|source| ClientError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs.next().ok_or_else(|| ClientError::Unresolved {
        host: host.to_string(),
        port,
    })
}

/// Connects to `server_addr` and spawns the reader and writer tasks.
pub(crate) async fn connect(
    server_addr: SocketAddr,
    buffer_size: usize,
    generation: u64,
    queue: Arc<DispatchQueue<NetworkClient>>,
) -> Result<TcpLink, ClientError> {
    let stream = open(server_addr, buffer_size).await?;
    let local_addr = stream.local_addr()?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not disable Nagle: {e}");
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(write_half, outbound_rx, generation, Arc::clone(&queue)));
    let reader = tokio::spawn(read_loop(read_half, buffer_size, generation, queue)).abort_handle();

    Ok(TcpLink {
        outbound,
        reader,
        local_addr,
        server_addr,
    })
}

async fn open(server_addr: SocketAddr, buffer_size: usize) -> Result<TcpStream, ClientError> {
    let connect_err = |source| ClientError::ConnectFailed {
        addr: server_addr,
        source,
    };
    let socket = if server_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(connect_err)?;

    let size = u32::try_from(buffer_size).unwrap_or(u32::MAX);
    socket.set_recv_buffer_size(size).map_err(connect_err)?;
    socket.set_send_buffer_size(size).map_err(connect_err)?;
    socket.connect(server_addr).await.map_err(connect_err)
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    buffer_size: usize,
    generation: u64,
    queue: Arc<DispatchQueue<NetworkClient>>,
) {
    let mut decoder = FrameDecoder::with_capacity(buffer_size);
    let mut read_buf = vec![0u8; buffer_size];
    let mut frames = Vec::new();

    'read: loop {
        let n = match read_half.read(&mut read_buf).await {
            Ok(0) => {
                debug!("server closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("read from server failed: {e}");
                break;
            }
        };

        let framing = decoder.decode(&read_buf[..n], &mut frames);
        for frame in frames.drain(..) {
            match Packet::from_frame(&frame) {
                Ok(packet) => {
                    trace!("received {packet}");
                    queue.schedule(move |client: &NetworkClient| client.handle_tcp_packet(generation, packet));
                }
                Err(e) => {
                    warn!("undecodable frame from server ({e}); disconnecting");
                    break 'read;
                }
            }
        }
        if let Err(e) = framing {
            warn!("stream from server corrupted ({e}); disconnecting");
            break;
        }
    }

    queue.schedule(move |client: &NetworkClient| client.connection_lost(generation));
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    generation: u64,
    queue: Arc<DispatchQueue<NetworkClient>>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(bytes) => {
                if let Err(e) = write_half.write_all(&bytes).await {
                    debug!("write to server failed: {e}");
                    queue.schedule(move |client: &NetworkClient| client.connection_lost(generation));
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = write_half.shutdown().await {
        trace!("shutdown: {e}");
    }
}
