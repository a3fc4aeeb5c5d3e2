//! Demo application: a lobby of moving players.
//!
//! - On connect, the newcomer is told about every player already in the
//!   lobby, then everyone (newcomer included) receives its `SpawnEntity`.
//! - `Test` messages are logged and relayed to every other client over TCP
//!   as `[from: i32][message: string]`.
//! - `InputUpdate` (`[count: i32][count × bool][rotation: Quat]`) moves the
//!   sender's player.  The new position goes to everyone over UDP, the new
//!   rotation to everyone except the sender.
//!
//! Movement keys are read in `W, S, A, D` order; extra inputs are ignored.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tandem_core::{ClientId, DecodeError, Packet, PacketId, Quat, Vec3};
use tracing::{debug, info};

use super::app::ServerApplication;
use crate::server::NetworkServer;

/// Player speed in units per second.
const MOVE_SPEED: f32 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: ClientId,
    pub username: String,
    pub position: Vec3,
    pub rotation: Quat,
}

impl Player {
    fn spawn_packet(&self) -> Packet {
        let mut packet = Packet::new(PacketId::SpawnEntity);
        packet
            .write(&self.id)
            .write(self.username.as_str())
            .write(&self.position)
            .write(&self.rotation);
        packet
    }
}

#[derive(Debug)]
pub struct Lobby {
    spawn_position: Vec3,
    /// Distance covered in one tick at full speed.
    step: f32,
    players: Mutex<BTreeMap<ClientId, Player>>,
}

impl Lobby {
    pub fn new(spawn_position: Vec3, tick_rate_hz: u32) -> Self {
        Self {
            spawn_position,
            step: MOVE_SPEED / tick_rate_hz.max(1) as f32,
            players: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn player(&self, id: ClientId) -> Option<Player> {
        self.players.lock().get(&id).cloned()
    }

    pub fn player_count(&self) -> usize {
        self.players.lock().len()
    }

    fn relay_message(&self, server: &NetworkServer, from: ClientId, packet: &mut Packet) -> Result<(), DecodeError> {
        let message: String = packet.read()?;
        info!("client {from} says: {message}");

        let mut relay = Packet::new(PacketId::Test);
        relay.write(&from).write(message.as_str());
        server.send_tcp_to_all_except(from, &relay);
        Ok(())
    }

    fn apply_input(&self, server: &NetworkServer, from: ClientId, packet: &mut Packet) -> Result<(), DecodeError> {
        let count: i32 = packet.read()?;
        if count < 0 {
            return Err(DecodeError::NegativeLength {
                field: "input count",
                length: count,
            });
        }
        let mut inputs = [false; 4];
        for i in 0..count as usize {
            let pressed: bool = packet.read()?;
            if let Some(slot) = inputs.get_mut(i) {
                *slot = pressed;
            }
        }
        let rotation: Quat = packet.read()?;

        let player = {
            let mut players = self.players.lock();
            let Some(player) = players.get_mut(&from) else {
                debug!("input from client {from} with no player");
                return Ok(());
            };
            let [forward, back, left, right] = inputs;
            let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
            let direction = Vec3::new(axis(right, left), 0.0, axis(forward, back));
            let motion = rotation.rotate(direction).normalized().scale(self.step);
            player.position = player.position + motion;
            player.rotation = rotation;
            player.clone()
        };

        let mut position = Packet::new(PacketId::PositionUpdate);
        position.write(&player.id).write(&player.position);
        server.send_udp_to_all(&position);

        let mut turn = Packet::new(PacketId::RotationUpdate);
        turn.write(&player.id).write(&player.rotation);
        server.send_udp_to_all_except(from, &turn);
        Ok(())
    }
}

impl ServerApplication for Lobby {
    fn on_initialize(&self, server: &NetworkServer) {
        info!(
            "lobby ready: spawn at ({}, {}, {}), up to {} players",
            self.spawn_position.x,
            self.spawn_position.y,
            self.spawn_position.z,
            server.limit_of_connections()
        );
    }

    fn on_client_connect(&self, server: &NetworkServer, client: ClientId) {
        let username = server
            .client(client)
            .and_then(|session| session.username())
            .unwrap_or_else(|| format!("player{client}"));
        let newcomer = Player {
            id: client,
            username,
            position: self.spawn_position,
            rotation: Quat::IDENTITY,
        };

        let existing: Vec<Player> = {
            let mut players = self.players.lock();
            let existing = players.values().cloned().collect();
            players.insert(client, newcomer.clone());
            existing
        };

        for player in &existing {
            server.send_tcp(client, &player.spawn_packet());
        }
        server.send_tcp_to_all(&newcomer.spawn_packet());
        info!("{} joined the lobby as client {client}", newcomer.username);
    }

    fn on_client_disconnect(&self, _server: &NetworkServer, client: ClientId) {
        if let Some(player) = self.players.lock().remove(&client) {
            info!("{} left the lobby", player.username);
        }
    }

    fn on_client_packet(&self, server: &NetworkServer, client: ClientId, packet: &mut Packet) -> Result<(), DecodeError> {
        match packet.id() {
            PacketId::Test => self.relay_message(server, client, packet),
            PacketId::InputUpdate => self.apply_input(server, client, packet),
            other => {
                debug!("lobby ignoring {other} from client {client}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tandem_core::FrameDecoder;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::session::{Outbound, Session};
    use crate::infrastructure::storage::config::ServerConfig;

    /// Registers an active session with `server` and returns its outbound
    /// queue.
    fn join(server: &NetworkServer, id: ClientId, name: &str) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(id, SocketAddr::from(([127, 0, 0, 1], 40000)), tx));
        session.welcome().unwrap();
        session.authenticate(id, name.to_string()).unwrap();
        assert!(server.registry().register(session));
        rx
    }

    /// Decodes every TCP frame queued so far.
    fn received(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Packet> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        while let Ok(Outbound::Frame(bytes)) = rx.try_recv() {
            decoder.decode(&bytes, &mut frames).unwrap();
        }
        frames.iter().map(|f| Packet::from_frame(f).unwrap()).collect()
    }

    #[test]
    fn test_connect_spawns_newcomer_everywhere_and_replays_existing() {
        // Arrange
        let server = NetworkServer::new(ServerConfig::default());
        let lobby = Lobby::new(Vec3::new(0.0, 1.0, 0.0), 30);
        let mut rx_alice = join(&server, 1, "alice");
        lobby.on_client_connect(&server, 1);
        received(&mut rx_alice);
        let mut rx_bob = join(&server, 2, "bob");

        // Act
        lobby.on_client_connect(&server, 2);

        // Assert: bob hears about alice, then about himself.
        let to_bob = received(&mut rx_bob);
        let spawned: Vec<i32> = to_bob
            .into_iter()
            .map(|mut p| {
                assert_eq!(p.id(), PacketId::SpawnEntity);
                p.read::<i32>().unwrap()
            })
            .collect();
        assert_eq!(spawned, vec![1, 2]);

        let mut to_alice = received(&mut rx_alice);
        assert_eq!(to_alice.len(), 1);
        assert_eq!(to_alice[0].read::<i32>().unwrap(), 2);
        assert_eq!(to_alice[0].read::<String>().unwrap(), "bob");
        assert_eq!(to_alice[0].read::<Vec3>().unwrap(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(lobby.player_count(), 2);
    }

    #[test]
    fn test_test_message_is_relayed_to_others_only() {
        // Arrange
        let server = NetworkServer::new(ServerConfig::default());
        let lobby = Lobby::new(Vec3::ZERO, 30);
        let mut rx_alice = join(&server, 1, "alice");
        let mut rx_bob = join(&server, 2, "bob");
        let mut message = Packet::new(PacketId::Test);
        message.write("hello");
        let mut inbound = Packet::from_body(message.id(), message.body());

        // Act
        lobby.on_client_packet(&server, 1, &mut inbound).unwrap();

        // Assert
        assert!(received(&mut rx_alice).is_empty());
        let mut to_bob = received(&mut rx_bob);
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_bob[0].read::<i32>().unwrap(), 1);
        assert_eq!(to_bob[0].read::<String>().unwrap(), "hello");
    }

    #[test]
    fn test_forward_input_moves_player_along_z() {
        // Arrange
        let server = NetworkServer::new(ServerConfig::default());
        let lobby = Lobby::new(Vec3::ZERO, 10);
        let _rx = join(&server, 1, "alice");
        lobby.on_client_connect(&server, 1);
        let mut input = Packet::new(PacketId::InputUpdate);
        input
            .write(&4i32)
            .write(&true)
            .write(&false)
            .write(&false)
            .write(&false)
            .write(&Quat::IDENTITY);
        let mut inbound = Packet::from_body(input.id(), input.body());

        // Act
        lobby.on_client_packet(&server, 1, &mut inbound).unwrap();

        // Assert: 5 units/s at 10 Hz is half a unit per tick.
        let player = lobby.player(1).unwrap();
        assert!((player.position.z - 0.5).abs() < 1e-6);
        assert_eq!(player.position.x, 0.0);
    }

    #[test]
    fn test_truncated_input_is_decode_error() {
        let server = NetworkServer::new(ServerConfig::default());
        let lobby = Lobby::new(Vec3::ZERO, 30);
        let mut input = Packet::new(PacketId::InputUpdate);
        input.write(&2i32).write(&true);
        let mut inbound = Packet::from_body(input.id(), input.body());

        let result = lobby.on_client_packet(&server, 1, &mut inbound);

        assert!(matches!(result, Err(DecodeError::InsufficientData { .. })));
    }

    #[test]
    fn test_disconnect_removes_player() {
        let server = NetworkServer::new(ServerConfig::default());
        let lobby = Lobby::new(Vec3::ZERO, 30);
        let _rx = join(&server, 1, "alice");
        lobby.on_client_connect(&server, 1);

        lobby.on_client_disconnect(&server, 1);

        assert_eq!(lobby.player(1), None);
    }
}
