//! Beacon payload codec.
//!
//! The central node broadcasts one beacon per periodic-advertising event. The
//! payload is a packed little-endian header followed by an optional command:
//!
//! ```text
//! offset  size  field
//! 0       1     sync_seq        +1 per beacon, wraps
//! 1       4     sync_time       central counter at the previous beacon's
//!                               end-of-packet event
//! 5       2     cmd_seq         +1 per issued command, wraps
//! 7       1     cmd_id          0 = none, 1 = start, 2 = stop
//! 8       4     cmd_start_time  start only
//! ```
//!
//! Early firmware sent the 5-byte sync header alone; those payloads still
//! decode, carrying timing only. The command tag travels as a bare `u8` so
//! no enum layout leaks onto the wire.

use crate::time::Ticks;

/// Sync header plus the largest command.
pub const MAX_LEN: usize = 12;

const LEGACY_LEN: usize = 5;
const HEADER_LEN: usize = 7;

const CMD_ID_NONE: u8 = 0;
const CMD_ID_START: u8 = 1;
const CMD_ID_STOP: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    Start { time: Ticks },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    /// Sequence number of the beacon carrying this payload.
    pub sync_seq: u8,
    /// Central counter captured at the end of the previous beacon, i.e. the
    /// beacon numbered `sync_seq - 1`.
    pub sync_time: Ticks,
    /// Sequence number of the most recently issued command.
    pub cmd_seq: u16,
    pub cmd: Command,
}

impl Beacon {
    /// Encode into `buf`, returning the number of bytes used.
    pub fn encode(&self, buf: &mut [u8; MAX_LEN]) -> usize {
        buf[0] = self.sync_seq;
        buf[1..5].copy_from_slice(&self.sync_time.0.to_le_bytes());
        buf[5..7].copy_from_slice(&self.cmd_seq.to_le_bytes());

        match self.cmd {
            Command::None => {
                buf[7] = CMD_ID_NONE;
                HEADER_LEN + 1
            }
            Command::Stop => {
                buf[7] = CMD_ID_STOP;
                HEADER_LEN + 1
            }
            Command::Start { time } => {
                buf[7] = CMD_ID_START;
                buf[8..12].copy_from_slice(&time.0.to_le_bytes());
                MAX_LEN
            }
        }
    }

    /// Decode a received payload. Returns `None` for any length or command
    /// tag the format does not define.
    pub fn decode(data: &[u8]) -> Option<Beacon> {
        if data.len() < LEGACY_LEN {
            return None;
        }

        let sync_seq = data[0];
        let sync_time = Ticks(u32::from_le_bytes(data[1..5].try_into().ok()?));

        if data.len() == LEGACY_LEN {
            return Some(Beacon {
                sync_seq,
                sync_time,
                cmd_seq: 0,
                cmd: Command::None,
            });
        }

        if data.len() < HEADER_LEN + 1 {
            return None;
        }

        let cmd_seq = u16::from_le_bytes(data[5..7].try_into().ok()?);

        let cmd = match (data[7], data.len()) {
            (CMD_ID_NONE, 8) => Command::None,
            (CMD_ID_STOP, 8) => Command::Stop,
            (CMD_ID_START, 12) => Command::Start {
                time: Ticks(u32::from_le_bytes(data[8..12].try_into().ok()?)),
            },
            _ => return None,
        };

        Some(Beacon {
            sync_seq,
            sync_time,
            cmd_seq,
            cmd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(beacon: Beacon) -> usize {
        let mut buf = [0u8; MAX_LEN];
        let len = beacon.encode(&mut buf);
        assert_eq!(Beacon::decode(&buf[..len]), Some(beacon));
        len
    }

    #[test]
    fn round_trips_every_command() {
        let len = round_trip(Beacon {
            sync_seq: 0x42,
            sync_time: Ticks(0x0001_0000),
            cmd_seq: 0,
            cmd: Command::None,
        });
        assert_eq!(len, 8);

        let len = round_trip(Beacon {
            sync_seq: 0xff,
            sync_time: Ticks(u32::MAX),
            cmd_seq: 0xbeef,
            cmd: Command::Stop,
        });
        assert_eq!(len, 8);

        let len = round_trip(Beacon {
            sync_seq: 0,
            sync_time: Ticks(0),
            cmd_seq: 1,
            cmd: Command::Start { time: Ticks(0x11e8_4800) },
        });
        assert_eq!(len, 12);
    }

    #[test]
    fn encodes_the_documented_byte_layout() {
        // beacon 0x42 pairing the previous beacon's timestamp 0x00010000
        let mut buf = [0u8; MAX_LEN];
        let len = Beacon {
            sync_seq: 0x42,
            sync_time: Ticks(0x0001_0000),
            cmd_seq: 0,
            cmd: Command::None,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..len], &[0x42, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);

        let len = Beacon {
            sync_seq: 0x43,
            sync_time: Ticks(0x0001_2ee0),
            cmd_seq: 0,
            cmd: Command::None,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..len], &[0x43, 0xe0, 0x2e, 0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn cmd_seq_travels_little_endian() {
        let mut buf = [0u8; MAX_LEN];
        let len = Beacon {
            sync_seq: 1,
            sync_time: Ticks(0),
            cmd_seq: 0x1234,
            cmd: Command::Stop,
        }
        .encode(&mut buf);
        assert_eq!(len, 8);
        assert_eq!(buf[5], 0x34);
        assert_eq!(buf[6], 0x12);
    }

    #[test]
    fn decodes_legacy_sync_only_payload() {
        let beacon = Beacon::decode(&[0x07, 0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(beacon.sync_seq, 0x07);
        assert_eq!(beacon.sync_time, Ticks(0x0403_0201));
        assert_eq!(beacon.cmd, Command::None);
    }

    #[test]
    fn rejects_undefined_lengths() {
        let bytes = [0u8; 16];
        for len in [0, 1, 4, 6, 7, 9, 10, 11, 13, 16] {
            assert_eq!(Beacon::decode(&bytes[..len]), None, "length {len}");
        }
    }

    #[test]
    fn rejects_unknown_command_tag() {
        let mut buf = [0u8; MAX_LEN];
        let len = Beacon {
            sync_seq: 9,
            sync_time: Ticks(100),
            cmd_seq: 3,
            cmd: Command::Stop,
        }
        .encode(&mut buf);

        buf[7] = 7;
        assert_eq!(Beacon::decode(&buf[..len]), None);
    }

    #[test]
    fn rejects_truncated_start() {
        let mut buf = [0u8; MAX_LEN];
        let len = Beacon {
            sync_seq: 9,
            sync_time: Ticks(100),
            cmd_seq: 3,
            cmd: Command::Start { time: Ticks(500) },
        }
        .encode(&mut buf);
        assert_eq!(Beacon::decode(&buf[..len - 1]), None);

        // stop must not carry a start time
        buf[7] = 2;
        assert_eq!(Beacon::decode(&buf[..len]), None);
    }
}
