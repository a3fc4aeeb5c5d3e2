//! The client's UDP channel.
//!
//! The socket binds the TCP connection's local address (same IP, same port)
//! and is connected to the server, so only the server's datagrams are
//! received.  Outbound datagrams carry `[length][client_id][packet_id][fields]`;
//! inbound ones `[length][packet_id][fields]`.

use std::net::SocketAddr;
use std::sync::Arc;

use tandem_core::{decode_datagram, DispatchQueue, Packet};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::client::{ClientError, NetworkClient};

/// An open UDP channel.
#[derive(Debug)]
pub(crate) struct UdpLink {
    pub socket: Arc<UdpSocket>,
    pub receiver: AbortHandle,
}

/// Binds `local_addr`, connects to `server_addr` and spawns the receive
/// loop on `runtime`.  Does not need to run inside an async context.
pub(crate) fn open(
    runtime: &Handle,
    local_addr: SocketAddr,
    server_addr: SocketAddr,
    buffer_size: usize,
    generation: u64,
    queue: Arc<DispatchQueue<NetworkClient>>,
) -> Result<UdpLink, ClientError> {
    let bind_err = |source| ClientError::UdpBind {
        addr: local_addr,
        source,
    };
    let std_socket = std::net::UdpSocket::bind(local_addr).map_err(bind_err)?;
    std_socket.connect(server_addr).map_err(bind_err)?;
    std_socket.set_nonblocking(true).map_err(bind_err)?;

    let _runtime = runtime.enter();
    let socket = Arc::new(UdpSocket::from_std(std_socket).map_err(bind_err)?);
    let receiver = runtime
        .spawn(recv_loop(Arc::clone(&socket), buffer_size, generation, queue))
        .abort_handle();
    Ok(UdpLink { socket, receiver })
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    generation: u64,
    queue: Arc<DispatchQueue<NetworkClient>>,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match socket.recv(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                debug!("UDP receive error: {e}");
                continue;
            }
        };

        for frame in decode_datagram(&buf[..n]) {
            match Packet::from_frame(frame) {
                Ok(packet) => {
                    queue.schedule(move |client: &NetworkClient| client.handle_datagram(generation, packet));
                }
                Err(e) => trace!("malformed datagram from server: {e}"),
            }
        }
    }
}
