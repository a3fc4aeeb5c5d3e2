//! The server's UDP endpoint.
//!
//! One socket, bound to the same port as the TCP listener, serves every
//! client.  Inbound datagrams carry `[length][client_id][packet_id][fields]`;
//! the receive loop splits off the client id and schedules
//! `handle_datagram`, which checks the source address against the client's
//! recorded endpoint on the tick thread.

use std::net::SocketAddr;
use std::sync::Arc;

use tandem_core::{decode_datagram, ClientId, Decode, DecodeError, DispatchQueue, Packet};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::server::{NetworkServer, ServerError};

pub(crate) async fn bind(addr: SocketAddr) -> Result<UdpSocket, ServerError> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| ServerError::BindFailed { addr, source })
}

/// Receives datagrams until the task is aborted.
pub(crate) async fn recv_loop(
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    queue: Arc<DispatchQueue<NetworkServer>>,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let (n, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // Includes ICMP "port unreachable" reports for departed
                // clients on some platforms.
                debug!("UDP receive error: {e}");
                continue;
            }
        };

        for frame in decode_datagram(&buf[..n]) {
            match split_client_id(frame) {
                Ok((client, packet)) => {
                    queue.schedule(move |server: &NetworkServer| server.handle_datagram(client, source, packet));
                }
                Err(e) => trace!("malformed datagram from {source}: {e}"),
            }
        }
    }
}

/// `[client_id: i32][packet_id: i32][fields]` → `(client_id, packet)`.
fn split_client_id(frame: &[u8]) -> Result<(ClientId, Packet), DecodeError> {
    let (client, used) = i32::decode(frame)?;
    let packet = Packet::from_frame(&frame[used..])?;
    Ok((client, packet))
}
