//! Audio-node role: follow the beacon stream, steer the sample clock,
//! record.

use std::fs;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use structopt::StructOpt;

use chord_core::audio::{
    AudioFormat, BlockTimeQueue, Session, SessionConfig,
};
use chord_core::capture::{CaptureRoute, Registry};
use chord_core::codec::{CodecChannel, CodecProperty, DummyCodec, InputCodec};
use chord_core::node::{NodeEvent, NodeManager};
use chord_core::record::{Recorder, WavFormat};
use chord_core::sync::{EstimatorConfig, SyncTimer};

use crate::audio::{SoftOscillator, ToneSource};
use crate::settings::Settings;
use crate::socket::{BeaconRx, SocketOpt};
use crate::time::{SoftCaptureTimer, TickClock};
use crate::RunError;

#[derive(StructOpt)]
pub struct NodeOpt {
    #[structopt(flatten)]
    pub socket: SocketOpt,
    /// Recording directory
    #[structopt(long, default_value = "recordings", env = "CHORD_NODE_DIR")]
    pub dir: PathBuf,
    /// Settings file (defaults to settings.json in the recording directory)
    #[structopt(long, env = "CHORD_NODE_SETTINGS")]
    pub settings: Option<PathBuf>,
    /// Test tone frequency in Hz
    #[structopt(long, default_value = "440", env = "CHORD_NODE_TONE_HZ")]
    pub tone_hz: f32,
    /// Set the analog input gain on both channels and persist it
    #[structopt(long)]
    pub analog_gain: Option<i32>,
    /// Set the digital input gain on both channels and persist it
    #[structopt(long)]
    pub digital_gain: Option<i32>,
}

pub fn run(opt: NodeOpt) -> Result<(), RunError> {
    let socket = BeaconRx::open(opt.socket).map_err(RunError::Listen)?;

    fs::create_dir_all(&opt.dir).map_err(RunError::Io)?;

    // capture routing, wired once at init
    let mut registry = Registry::new();
    let adv_channel = registry
        .allocate(CaptureRoute::RadioPacketEnd)
        .map_err(RunError::CaptureSetup)?;
    let i2s_channel = registry
        .allocate(CaptureRoute::AudioBlockBoundary)
        .map_err(RunError::CaptureSetup)?;
    // reserved for USB audio feedback
    let _usb_channel = registry
        .allocate(CaptureRoute::UsbStartOfFrame)
        .map_err(RunError::CaptureSetup)?;
    let captures = Arc::new(SoftCaptureTimer::new(TickClock));

    let format = AudioFormat::default();

    // codec and persisted gains
    let mut codec = DummyCodec::new();
    codec.configure(&format).map_err(RunError::Codec)?;

    let settings_path = opt
        .settings
        .unwrap_or_else(|| opt.dir.join("settings.json"));
    let mut settings = Settings::load(settings_path).map_err(RunError::Settings)?;
    settings.apply(&mut codec);

    for (property, value) in [
        (CodecProperty::AnalogGain, opt.analog_gain),
        (CodecProperty::DigitalGain, opt.digital_gain),
    ] {
        let Some(value) = value else { continue };
        for channel in CodecChannel::ALL {
            settings
                .set_gain(&mut codec, channel, property, value)
                .map_err(RunError::Settings)?;
        }
    }

    codec.start().map_err(RunError::Codec)?;

    let sync_timer = Arc::new(Mutex::new(SyncTimer::new(&EstimatorConfig::default())));
    let recorder = Arc::new(Recorder::new(
        opt.dir.clone(),
        WavFormat {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 24,
            max_file_size: u32::MAX,
        },
    ));

    let session_config = SessionConfig {
        format,
        estimator: EstimatorConfig {
            k_u: crate::audio::trim_gain(),
            ..EstimatorConfig::default()
        },
        ..SessionConfig::default()
    };

    // block-time snapshots: capture hook -> audio thread
    let times: &'static mut BlockTimeQueue = Box::leak(Box::new(BlockTimeQueue::new()));
    let (producer, consumer) = times.split();

    let source = ToneSource::new(
        format,
        session_config.block_size,
        opt.tone_hz,
        captures.clone(),
        i2s_channel,
        producer,
    )
    .map_err(RunError::Pipeline)?;

    let mut session = Session::new(
        &session_config,
        source,
        SoftOscillator::new(),
        consumer,
        sync_timer.clone(),
        recorder.clone(),
    )
    .map_err(RunError::Pipeline)?;

    // detached: the session loop has no shutdown path of its own, the
    // process lifetime bounds it
    let _ = thread::Builder::new()
        .name("chord/audio".into())
        .spawn(move || {
            crate::thread::set_name("chord/audio");
            crate::thread::set_realtime_priority();

            if let Err(err) = session.run() {
                log::error!("audio session died: {err}");
            }
        })
        .map_err(RunError::Thread)?;

    // reception context -> manager event queue
    let (events_tx, events_rx) = mpsc::sync_channel::<NodeEvent>(16);

    let receiver = {
        let captures = captures.clone();

        thread::Builder::new()
            .name("chord/adv".into())
            .spawn(move || {
                crate::thread::set_name("chord/adv");

                let mut buf = [0u8; 64];
                loop {
                    match socket.recv(&mut buf) {
                        Ok(len) => {
                            // end of packet: the capture latches first
                            let capture = captures.latch(adv_channel);

                            let Some(event) = NodeEvent::beacon(&buf[..len], capture) else {
                                continue;
                            };
                            if events_tx.try_send(event).is_err() {
                                log::warn!("event queue full, dropping beacon");
                            }
                        }
                        Err(err) => {
                            log::error!("beacon reception failed: {err}");
                            let _ = events_tx.try_send(NodeEvent::Cancel);
                            break;
                        }
                    }
                }
            })
            .map_err(RunError::Thread)?
    };

    log::info!("node running, recording to {}", opt.dir.display());

    let mut manager = NodeManager::new(sync_timer, recorder);
    for event in events_rx {
        if !manager.handle(event) {
            break;
        }
    }

    let _ = receiver.join();
    Ok(())
}
