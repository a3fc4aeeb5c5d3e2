//! Packet identifiers.
//!
//! Every payload starts with a 4-byte little-endian identifier that tells the
//! receiver how to read the remaining fields.  Identifiers 1–7 are built in;
//! any other value is free for application use and round-trips through
//! [`PacketId::Application`].

use std::fmt;

/// Tag describing the layout of a packet's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketId {
    /// Reserved; never sent on purpose.
    Invalid,
    /// Server → client: `[greeting: string][assigned_id: i32]`.
    Welcome,
    /// Client → server: `[echoed_id: i32][username: string]`.
    WelcomeResponse,
    /// Free-form test or chat message; an empty one over UDP binds the endpoint.
    Test,
    /// Server → clients: announces a new entity.
    SpawnEntity,
    /// Server → clients: entity position.
    PositionUpdate,
    /// Server → clients: entity rotation.
    RotationUpdate,
    /// Client → server: input state.
    InputUpdate,
    /// Any identifier outside the built-in range.
    ///
    /// Values 0–7 always decode to the named variants, so
    /// `Application(3)` is sent as, and received as, [`PacketId::Test`].
    Application(i32),
}

impl PacketId {
    /// Returns `true` for identifiers defined by the transport itself.
    pub fn is_builtin(self) -> bool {
        !matches!(self, PacketId::Application(_))
    }
}

impl From<i32> for PacketId {
    fn from(raw: i32) -> Self {
        match raw {
            0 => PacketId::Invalid,
            1 => PacketId::Welcome,
            2 => PacketId::WelcomeResponse,
            3 => PacketId::Test,
            4 => PacketId::SpawnEntity,
            5 => PacketId::PositionUpdate,
            6 => PacketId::RotationUpdate,
            7 => PacketId::InputUpdate,
            other => PacketId::Application(other),
        }
    }
}

impl From<PacketId> for i32 {
    fn from(id: PacketId) -> Self {
        match id {
            PacketId::Invalid => 0,
            PacketId::Welcome => 1,
            PacketId::WelcomeResponse => 2,
            PacketId::Test => 3,
            PacketId::SpawnEntity => 4,
            PacketId::PositionUpdate => 5,
            PacketId::RotationUpdate => 6,
            PacketId::InputUpdate => 7,
            PacketId::Application(raw) => raw,
        }
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketId::Application(raw) => write!(f, "Application({raw})"),
            named => write!(f, "{named:?}({})", i32::from(*named)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_round_trip_through_i32() {
        for raw in 0..=7 {
            let id = PacketId::from(raw);
            assert!(id.is_builtin());
            assert_eq!(i32::from(id), raw);
        }
    }

    #[test]
    fn test_unknown_ids_become_application_ids() {
        assert_eq!(PacketId::from(42), PacketId::Application(42));
        assert_eq!(PacketId::from(-1), PacketId::Application(-1));
    }

    #[test]
    fn test_display_includes_numeric_value() {
        assert_eq!(PacketId::WelcomeResponse.to_string(), "WelcomeResponse(2)");
        assert_eq!(PacketId::Application(99).to_string(), "Application(99)");
    }
}
