//! Demo application that plays along with the server's lobby.
//!
//! Keeps a roster of the players the server has spawned, applies their
//! position and rotation updates, logs relayed chat, and drives its own
//! player with [`DemoPlayer::send_input`]: always walking forward while
//! slowly turning.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tandem_core::{ClientId, DecodeError, Packet, PacketId, Quat, Vec3};
use tracing::{debug, info};

use super::app::ClientApplication;
use crate::client::NetworkClient;

/// Yaw added per tick, in radians.
const TURN_PER_TICK: f32 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub username: String,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Default)]
pub struct DemoPlayer {
    roster: Mutex<BTreeMap<ClientId, RemotePlayer>>,
    chat: Mutex<Vec<(ClientId, String)>>,
}

impl DemoPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, id: ClientId) -> Option<RemotePlayer> {
        self.roster.lock().get(&id).cloned()
    }

    pub fn player_count(&self) -> usize {
        self.roster.lock().len()
    }

    /// Chat messages relayed by the server, oldest first.
    pub fn messages(&self) -> Vec<(ClientId, String)> {
        self.chat.lock().clone()
    }

    /// Sends one `InputUpdate` over UDP: forward held, turning by
    /// [`TURN_PER_TICK`] each tick.
    pub fn send_input(&self, client: &NetworkClient, tick: u64) -> bool {
        let mut packet = Packet::new(PacketId::InputUpdate);
        let inputs = [true, false, false, false];
        packet.write(&(inputs.len() as i32));
        for pressed in &inputs {
            packet.write(pressed);
        }
        packet.write(&yaw(tick as f32 * TURN_PER_TICK));
        client.send_udp(&packet)
    }

    fn on_spawn(&self, packet: &mut Packet) -> Result<(), DecodeError> {
        let id: ClientId = packet.read()?;
        let username: String = packet.read()?;
        let position: Vec3 = packet.read()?;
        let rotation: Quat = packet.read()?;
        info!("{username} spawned as client {id}");
        self.roster.lock().insert(
            id,
            RemotePlayer {
                username,
                position,
                rotation,
            },
        );
        Ok(())
    }

    fn on_position(&self, packet: &mut Packet) -> Result<(), DecodeError> {
        let id: ClientId = packet.read()?;
        let position: Vec3 = packet.read()?;
        if let Some(player) = self.roster.lock().get_mut(&id) {
            player.position = position;
        }
        Ok(())
    }

    fn on_rotation(&self, packet: &mut Packet) -> Result<(), DecodeError> {
        let id: ClientId = packet.read()?;
        let rotation: Quat = packet.read()?;
        if let Some(player) = self.roster.lock().get_mut(&id) {
            player.rotation = rotation;
        }
        Ok(())
    }

    fn on_chat(&self, packet: &mut Packet) -> Result<(), DecodeError> {
        let from: ClientId = packet.read()?;
        let message: String = packet.read()?;
        info!("client {from} says: {message}");
        self.chat.lock().push((from, message));
        Ok(())
    }
}

/// Rotation of `angle` radians about the Y axis.
fn yaw(angle: f32) -> Quat {
    let half = angle / 2.0;
    Quat::new(0.0, half.sin(), 0.0, half.cos())
}

impl ClientApplication for DemoPlayer {
    fn on_connect(&self, client: &NetworkClient) {
        let mut hello = Packet::new(PacketId::Test);
        hello.write(format!("{} joined", client.config().username).as_str());
        client.send_tcp(&hello);
    }

    fn on_disconnect(&self, _client: &NetworkClient) {
        self.roster.lock().clear();
    }

    fn on_packet(&self, _client: &NetworkClient, packet: &mut Packet) -> Result<(), DecodeError> {
        match packet.id() {
            PacketId::SpawnEntity => self.on_spawn(packet),
            PacketId::PositionUpdate => self.on_position(packet),
            PacketId::RotationUpdate => self.on_rotation(packet),
            PacketId::Test => self.on_chat(packet),
            other => {
                debug!("demo ignoring {other}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::config::ClientConfig;

    fn inbound(packet: &Packet) -> Packet {
        Packet::from_body(packet.id(), packet.body())
    }

    fn spawn(id: ClientId, name: &str) -> Packet {
        let mut packet = Packet::new(PacketId::SpawnEntity);
        packet
            .write(&id)
            .write(name)
            .write(&Vec3::new(0.0, 1.0, 0.0))
            .write(&Quat::IDENTITY);
        inbound(&packet)
    }

    #[test]
    fn test_spawn_then_position_updates_roster() {
        // Arrange
        let client = NetworkClient::new(ClientConfig::default());
        let demo = DemoPlayer::new();
        demo.on_packet(&client, &mut spawn(3, "carol")).unwrap();
        let mut moved = Packet::new(PacketId::PositionUpdate);
        moved.write(&3i32).write(&Vec3::new(1.0, 1.0, 2.0));

        // Act
        demo.on_packet(&client, &mut inbound(&moved)).unwrap();

        // Assert
        let carol = demo.player(3).unwrap();
        assert_eq!(carol.username, "carol");
        assert_eq!(carol.position, Vec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn test_update_for_unknown_player_is_ignored() {
        let client = NetworkClient::new(ClientConfig::default());
        let demo = DemoPlayer::new();
        let mut turned = Packet::new(PacketId::RotationUpdate);
        turned.write(&9i32).write(&Quat::IDENTITY);

        demo.on_packet(&client, &mut inbound(&turned)).unwrap();

        assert_eq!(demo.player_count(), 0);
    }

    #[test]
    fn test_chat_is_recorded_in_order() {
        let client = NetworkClient::new(ClientConfig::default());
        let demo = DemoPlayer::new();
        for (from, text) in [(1, "hi"), (2, "hello")] {
            let mut chat = Packet::new(PacketId::Test);
            chat.write(&from).write(text);
            demo.on_packet(&client, &mut inbound(&chat)).unwrap();
        }

        assert_eq!(demo.messages(), vec![(1, "hi".to_string()), (2, "hello".to_string())]);
    }

    #[test]
    fn test_truncated_spawn_is_decode_error() {
        let client = NetworkClient::new(ClientConfig::default());
        let demo = DemoPlayer::new();
        let mut partial = Packet::new(PacketId::SpawnEntity);
        partial.write(&1i32);

        let result = demo.on_packet(&client, &mut inbound(&partial));

        assert!(matches!(result, Err(DecodeError::InsufficientData { .. })));
        assert_eq!(demo.player_count(), 0);
    }

    #[test]
    fn test_disconnect_clears_roster() {
        let client = NetworkClient::new(ClientConfig::default());
        let demo = DemoPlayer::new();
        demo.on_packet(&client, &mut spawn(1, "alice")).unwrap();

        demo.on_disconnect(&client);

        assert_eq!(demo.player_count(), 0);
    }

    #[test]
    fn test_yaw_quarter_turn_maps_forward_to_right() {
        let turned = yaw(std::f32::consts::FRAC_PI_2).rotate(Vec3::new(0.0, 0.0, 1.0));

        assert!((turned.x - 1.0).abs() < 1e-5);
        assert!(turned.z.abs() < 1e-5);
    }

    #[test]
    fn test_send_input_without_connection_returns_false() {
        let client = NetworkClient::new(ClientConfig::default());

        assert!(!DemoPlayer::new().send_input(&client, 0));
    }
}
