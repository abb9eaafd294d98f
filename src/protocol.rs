//! Outbound packet surface.
//!
//! The grid never serializes or frames packets itself. A live entity may
//! carry a [`PacketSink`]; broadcast helpers pick recipients and hand the
//! opaque [`GamePacket`] to each sink unconditionally (no batching, no
//! backpressure).

use serde::{Deserialize, Serialize};

/// Opcode of the weather toggle sent to joining players.
pub const SC_ON_OFF_SNOW: u16 = 0x01a9;

/// An already-encoded server→client packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePacket {
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl GamePacket {
    pub fn new(opcode: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Snow on/off toggle.
    pub fn snow(on: bool) -> Self {
        Self::new(SC_ON_OFF_SNOW, vec![on as u8])
    }
}

/// Delivery channel of a connected entity (usually a player session).
pub trait PacketSink: Send + Sync {
    fn send_packet(&self, packet: &GamePacket);
}
