//! Inter-core packet-timer message.
//!
//! On the central node the radio-adjacent processor owns the end-of-packet
//! capture; for every transmitted beacon it forwards the beacon's sequence
//! number and the captured counter to the application processor over a named
//! endpoint. Both cores share one address space and endianness, so the
//! message is a plain Pod struct viewed as bytes.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct PacketTimerMsg {
    /// Sequence number of the beacon whose end event was captured.
    pub seq: u8,
    /// Counter value latched at the end-of-packet event.
    pub timer: u32,
}

pub const PACKET_TIMER_MSG_LEN: usize = core::mem::size_of::<PacketTimerMsg>();

const_assert_eq!(PACKET_TIMER_MSG_LEN, 5);

impl PacketTimerMsg {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<PacketTimerMsg> {
        bytemuck::try_from_bytes(bytes).ok().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let msg = PacketTimerMsg {
            seq: 0x41,
            timer: 0x0001_0000,
        };

        let bytes = msg.as_bytes();
        assert_eq!(bytes.len(), PACKET_TIMER_MSG_LEN);
        assert_eq!(PacketTimerMsg::from_bytes(bytes), Some(msg));
        assert_eq!(PacketTimerMsg::from_bytes(&bytes[..4]), None);
    }
}
