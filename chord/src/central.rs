//! Central role: broadcast timestamped beacons, accept operator commands.
//!
//! Three contexts mirror the firmware split. The transmitter thread stands in
//! for the radio and its packet-end capture: it sends the current payload
//! every interval, latches the tick clock at send completion and reports
//! `{seq, timer}` over a channel (the inter-core link). The assembler context
//! consumes the reports and rebuilds the payload. The shell thread feeds
//! start/stop commands into the bounded mailbox.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use structopt::StructOpt;

use chord_core::capture::{CaptureRoute, Registry};
use chord_core::central::BeaconAssembler;
use chord_protocol::beacon::{self, Beacon, Command};
use chord_protocol::link::PacketTimerMsg;
use chord_protocol::time::Ticks;

use crate::socket::{BeaconTx, SocketOpt};
use crate::time::{SoftCaptureTimer, TickClock};
use crate::RunError;

#[derive(StructOpt)]
pub struct CentralOpt {
    #[structopt(flatten)]
    pub socket: SocketOpt,
    /// Beacon interval in milliseconds
    #[structopt(long, default_value = "100", env = "CHORD_CENTRAL_INTERVAL_MS")]
    pub interval_ms: u64,
}

type Payload = ([u8; beacon::MAX_LEN], usize);

pub fn run(opt: CentralOpt) -> Result<(), RunError> {
    let socket = BeaconTx::open(opt.socket).map_err(RunError::Listen)?;

    let mut registry = Registry::new();
    let packet_end = registry
        .allocate(CaptureRoute::RadioPacketEnd)
        .map_err(RunError::CaptureSetup)?;
    let captures = Arc::new(SoftCaptureTimer::new(TickClock));

    let assembler = Arc::new(BeaconAssembler::new());
    let payload = Arc::new(Mutex::new(encode_payload(&Beacon {
        sync_seq: 0,
        sync_time: Ticks(0),
        cmd_seq: 0,
        cmd: Command::None,
    })));

    let (timer_tx, timer_rx) = mpsc::sync_channel::<PacketTimerMsg>(4);
    let running = Arc::new(AtomicBool::new(true));

    let transmitter = {
        let payload = payload.clone();
        let captures = captures.clone();
        let running = running.clone();
        let interval = Duration::from_millis(opt.interval_ms);

        thread::Builder::new()
            .name("chord/beacon".into())
            .spawn(move || {
                crate::thread::set_name("chord/beacon");

                let mut seq: u8 = 0;
                while running.load(Ordering::Relaxed) {
                    thread::sleep(interval);

                    let (buf, len) = *payload.lock().unwrap();
                    if let Err(err) = socket.send(&buf[..len]) {
                        log::error!("failed to send beacon: {err}");
                        continue;
                    }

                    // end of packet: capture, then report across the link
                    let timer = captures.latch(packet_end);
                    let msg = PacketTimerMsg { seq, timer: timer.0 };
                    seq = seq.wrapping_add(1);

                    if timer_tx.send(msg).is_err() {
                        break;
                    }
                }
            })
            .map_err(RunError::Thread)?
    };

    {
        let assembler = assembler.clone();
        let running = running.clone();

        thread::Builder::new()
            .name("chord/shell".into())
            .spawn(move || {
                shell_loop(&assembler, &running);
            })
            .map_err(RunError::Thread)?;
    }

    log::info!("central running, commands: start | stop | quit");

    // beacon assembly, on its own context like the firmware work queue
    for msg in timer_rx {
        let beacon = assembler.on_packet_timer(&msg);
        *payload.lock().unwrap() = encode_payload(&beacon);
    }

    running.store(false, Ordering::Relaxed);
    let _ = transmitter.join();
    Ok(())
}

fn encode_payload(beacon: &Beacon) -> Payload {
    let mut buf = [0u8; beacon::MAX_LEN];
    let len = beacon.encode(&mut buf);
    (buf, len)
}

fn shell_loop(assembler: &BeaconAssembler, running: &AtomicBool) {
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };

        match line.trim() {
            "" => {}
            "start" => match assembler.queue_start() {
                Ok(time) => log::info!("recording start queued for central tick {time}"),
                Err(err) => log::error!("cannot queue start: {err}"),
            },
            "stop" => match assembler.queue_stop() {
                Ok(()) => log::info!("recording stop queued"),
                Err(err) => log::error!("cannot queue stop: {err}"),
            },
            "quit" => break,
            other => log::warn!("unknown command: {other}"),
        }
    }

    running.store(false, Ordering::Relaxed);
}
