//! Audio-node session manager.
//!
//! The long-lived follow-the-central flow is a state machine driven by an
//! event queue: beacon receptions arrive from the radio callback context,
//! cancellation from whoever owns the node's lifecycle. Beacon handling
//! feeds the sync timer and dispatches recording commands; a command is
//! dispatched once per `cmd_seq`, so wireless retransmissions are
//! idempotent.

use std::sync::{Arc, Mutex};

use chord_protocol::beacon::{self, Beacon, Command};
use chord_protocol::time::Ticks;

use crate::record::Recorder;
use crate::sync::SyncTimer;

#[derive(Debug, Clone, Copy)]
pub enum NodeEvent {
    /// A periodic-advertising payload and the local capture latched at its
    /// end-of-packet event.
    Beacon {
        payload: [u8; beacon::MAX_LEN],
        len: usize,
        capture: Ticks,
    },
    Cancel,
}

impl NodeEvent {
    /// Build a beacon event from raw payload bytes. Oversized payloads are
    /// not representable on the advertising channel and yield `None`.
    pub fn beacon(data: &[u8], capture: Ticks) -> Option<NodeEvent> {
        if data.len() > beacon::MAX_LEN {
            return None;
        }

        let mut payload = [0u8; beacon::MAX_LEN];
        payload[..data.len()].copy_from_slice(data);
        Some(NodeEvent::Beacon {
            payload,
            len: data.len(),
            capture,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No beacon stream seen yet.
    Idle,
    /// Receiving the central's beacon stream.
    Following,
}

pub struct NodeManager {
    sync_timer: Arc<Mutex<SyncTimer>>,
    recorder: Arc<Recorder>,
    state: NodeState,
    /// Sequence number of the last dispatched command.
    last_cmd_seq: Option<u16>,
    cancelled: bool,
}

impl NodeManager {
    pub fn new(sync_timer: Arc<Mutex<SyncTimer>>, recorder: Arc<Recorder>) -> NodeManager {
        NodeManager {
            sync_timer,
            recorder,
            state: NodeState::Idle,
            last_cmd_seq: None,
            cancelled: false,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Process one event. Returns `false` once the manager is cancelled.
    pub fn handle(&mut self, event: NodeEvent) -> bool {
        if self.cancelled {
            return false;
        }

        match event {
            NodeEvent::Cancel => {
                self.cancelled = true;
                false
            }
            NodeEvent::Beacon {
                payload,
                len,
                capture,
            } => {
                self.handle_beacon(&payload[..len], capture);
                true
            }
        }
    }

    fn handle_beacon(&mut self, payload: &[u8], capture: Ticks) {
        let Some(beacon) = Beacon::decode(payload) else {
            log::debug!("ignoring malformed beacon payload ({} bytes)", payload.len());
            return;
        };

        self.sync_timer
            .lock()
            .unwrap()
            .receive_beacon(&beacon, capture);

        if self.state == NodeState::Idle {
            log::info!("following central beacon stream");
            self.state = NodeState::Following;
        }

        match beacon.cmd {
            Command::None => {}
            Command::Start { time } => {
                // a repeated cmd_seq is a wireless retransmission
                if self.fresh_command(beacon.cmd_seq) {
                    self.recorder.start(time);
                }
            }
            Command::Stop => {
                if self.fresh_command(beacon.cmd_seq) {
                    self.recorder.stop();
                }
            }
        }
    }

    fn fresh_command(&mut self, cmd_seq: u16) -> bool {
        if self.last_cmd_seq == Some(cmd_seq) {
            return false;
        }
        self.last_cmd_seq = Some(cmd_seq);
        true
    }
}
