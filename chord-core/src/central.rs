//! Central-side beacon assembly.
//!
//! The radio-adjacent core reports `{seq, timer}` for every transmitted
//! beacon. The assembler turns each report into the next advertising
//! payload: the report's hardware timestamp rides in the following beacon
//! (whose sequence number is `seq + 1`), together with at most one command
//! drained from the mailbox. Assembly runs on a work-queue context, never in
//! the interrupt path that delivers the report.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use chord_protocol::beacon::{Beacon, Command};
use chord_protocol::link::PacketTimerMsg;
use chord_protocol::time::Ticks;
use chord_protocol::NOMINAL_TICK_RATE;
use thiserror::Error;

/// Delay from start command to start of recording. Must be long enough for
/// every audio node to receive the command off the beacon stream.
pub const START_DELAY: u32 = 2 * NOMINAL_TICK_RATE.0;

const COMMAND_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("command queue full")]
pub struct QueueFull;

/// Bounded mailbox from the shell/UI contexts into the assembler. Drained at
/// most one command per beacon.
pub struct CommandQueue {
    queue: heapless::mpmc::MpMcQueue<Command, COMMAND_QUEUE_DEPTH>,
}

impl CommandQueue {
    pub const fn new() -> CommandQueue {
        CommandQueue {
            queue: heapless::mpmc::MpMcQueue::new(),
        }
    }

    pub fn enqueue(&self, cmd: Command) -> Result<(), QueueFull> {
        self.queue.enqueue(cmd).map_err(|_| QueueFull)
    }

    fn dequeue(&self) -> Option<Command> {
        self.queue.dequeue()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        CommandQueue::new()
    }
}

pub struct BeaconAssembler {
    commands: CommandQueue,
    /// Timestamp of the last transmitted beacon.
    last_packet_time: AtomicU32,
    state: Mutex<AssemblerState>,
}

struct AssemblerState {
    first_seq: bool,
    prev_seq: u8,
    cmd_seq: u16,
}

impl BeaconAssembler {
    pub fn new() -> BeaconAssembler {
        BeaconAssembler {
            commands: CommandQueue::new(),
            last_packet_time: AtomicU32::new(0),
            state: Mutex::new(AssemblerState {
                first_seq: true,
                prev_seq: 0,
                cmd_seq: 0,
            }),
        }
    }

    /// Schedule a recording start relative to the last beacon's timestamp.
    /// Returns the start time placed on the wire.
    pub fn queue_start(&self) -> Result<Ticks, QueueFull> {
        let time = Ticks(self.last_packet_time.load(Ordering::Relaxed)).add_ticks(START_DELAY);
        self.commands.enqueue(Command::Start { time })?;
        Ok(time)
    }

    pub fn queue_stop(&self) -> Result<(), QueueFull> {
        self.commands.enqueue(Command::Stop)
    }

    /// Assemble the advertising payload following the reported beacon.
    pub fn on_packet_timer(&self, msg: &PacketTimerMsg) -> Beacon {
        let mut state = self.state.lock().unwrap();

        if !state.first_seq && msg.seq != state.prev_seq.wrapping_add(1) {
            let expected = state.prev_seq.wrapping_add(1);
            log::warn!("packet timer seq mismatch: {} != {expected}", msg.seq);
        }
        state.prev_seq = msg.seq;
        state.first_seq = false;

        self.last_packet_time.store(msg.timer, Ordering::Relaxed);

        let cmd = match self.commands.dequeue() {
            Some(cmd) => {
                state.cmd_seq = state.cmd_seq.wrapping_add(1);
                cmd
            }
            None => Command::None,
        };

        Beacon {
            sync_seq: msg.seq.wrapping_add(1),
            sync_time: Ticks(msg.timer),
            cmd_seq: state.cmd_seq,
            cmd,
        }
    }
}

impl Default for BeaconAssembler {
    fn default() -> Self {
        BeaconAssembler::new()
    }
}
