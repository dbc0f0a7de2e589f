//! Host-side audio hardware stand-ins: a paced tone generator in place of
//! the I2S peripheral, and a plain register cell in place of the audio
//! master oscillator's trim field.

use std::f32::consts::TAU;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chord_core::audio::{
    AudioFormat, BlockSource, BlockTime, BlockTimeProducer, PipelineError, TrimOscillator,
};
use chord_core::capture::CaptureChannel;
use chord_protocol::time::Phase;

use crate::time::SoftCaptureTimer;

/// Legal range of the master oscillator's frequency-trim register.
pub const TRIM_REG_MIN: u16 = 36_834;
pub const TRIM_REG_MAX: u16 = 42_874;
/// Register value producing the nominal master clock frequency.
pub const TRIM_REG_NOMINAL: u16 = 39_854;

/// Nominal master clock frequency (Hz).
const MASTER_CLOCK_HZ: f64 = 11_289_600.0;

/// Fractional frequency change of the master clock per register LSB.
pub fn trim_gain() -> f32 {
    (32e6 / (12.0 * 65_536.0 * MASTER_CLOCK_HZ)) as f32
}

/// The trim register of a master clock that exists only on paper. Writing it
/// steers nothing, but the applied step feeds back into the estimator's
/// control-input term exactly as on hardware.
pub struct SoftOscillator {
    register: u16,
}

impl SoftOscillator {
    pub fn new() -> SoftOscillator {
        SoftOscillator {
            register: TRIM_REG_NOMINAL,
        }
    }
}

impl Default for SoftOscillator {
    fn default() -> Self {
        SoftOscillator::new()
    }
}

impl TrimOscillator for SoftOscillator {
    fn range(&self) -> (u16, u16) {
        (TRIM_REG_MIN, TRIM_REG_MAX)
    }

    fn trim(&self) -> u16 {
        self.register
    }

    fn set_trim(&mut self, trim: u16) {
        self.register = trim;
    }
}

/// Sine generator delivering blocks at the hardware cadence. Doubles as the
/// buffer-boundary capture hook: each block boundary latches the reference
/// counter and queues the block-time snapshot, like the peripheral
/// interconnect route does on hardware.
pub struct ToneSource {
    format: AudioFormat,
    frames_per_block: u32,
    tone_step: f32,
    tone_phase: f32,

    period: Duration,
    next_deadline: Instant,

    captures: Arc<SoftCaptureTimer>,
    channel: CaptureChannel,
    times: BlockTimeProducer,
    i2s_time: Phase,
    block_duration: Phase,
}

impl ToneSource {
    pub fn new(
        format: AudioFormat,
        block_size: usize,
        tone_hz: f32,
        captures: Arc<SoftCaptureTimer>,
        channel: CaptureChannel,
        times: BlockTimeProducer,
    ) -> Result<ToneSource, PipelineError> {
        let frames_per_block = format.frames_per_block(block_size)?;
        let block_duration = Phase::from_int(format.block_duration(block_size)?);

        let period = Duration::from_nanos(
            u64::from(frames_per_block) * 1_000_000_000 / u64::from(format.sample_rate),
        );

        Ok(ToneSource {
            format,
            frames_per_block,
            tone_step: TAU * tone_hz / format.sample_rate as f32,
            tone_phase: 0.0,
            period,
            next_deadline: Instant::now() + period,
            captures,
            channel,
            times,
            i2s_time: Phase::ZERO,
            block_duration,
        })
    }
}

impl BlockSource for ToneSource {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        // pace delivery to the hardware block cadence
        if let Some(wait) = self.next_deadline.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        self.next_deadline += self.period;

        // buffer boundary: latch the capture and queue the snapshot
        let ref_time = self.captures.latch(self.channel);
        let snapshot = BlockTime {
            i2s_time: self.i2s_time,
            ref_time,
        };
        self.i2s_time += self.block_duration;

        if self.times.enqueue(snapshot).is_err() {
            // the consumer stalled long enough for the queue to fill; on
            // hardware the I2S buffers would have overrun first
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "block time queue overrun",
            ));
        }

        // synthesize one block of 32-bit LE samples
        let mut buf = Vec::with_capacity(
            self.frames_per_block as usize * self.format.bytes_per_frame_raw(),
        );
        for _ in 0..self.frames_per_block {
            let sample = (self.tone_phase.sin() * 0.25 * i32::MAX as f32) as i32;
            self.tone_phase = (self.tone_phase + self.tone_step) % TAU;

            for _ in 0..self.format.channels {
                buf.extend_from_slice(&sample.to_le_bytes());
            }
        }

        Ok(buf)
    }

    fn recover(&mut self) -> io::Result<()> {
        // the peripheral restart a prepare+start would do: drop the missed
        // deadline and resume pacing from now
        self.next_deadline = Instant::now() + self.period;
        Ok(())
    }
}
