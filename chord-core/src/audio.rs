//! Audio block pipeline.
//!
//! The hardware delivers fixed-size blocks of 32-bit PCM. A
//! peripheral-interconnect route latches the reference counter at every
//! buffer boundary, and the capture hook queues a [`BlockTime`] snapshot
//! pairing that capture with the ideal elapsed-time accumulator. The audio
//! thread marries each block to its snapshot, runs the clock servo, packs
//! the samples to 24-bit and hands the block to the recorder.

use std::io;
use std::sync::{Arc, Mutex};

use chord_protocol::time::{Phase, Ticks};
use chord_protocol::NOMINAL_TICK_RATE;
use thiserror::Error;

use crate::record::{AudioBlock, Recorder};
use crate::sync::estimator::Observation;
use crate::sync::{ControllerConfig, EstimatorConfig, FreqController, FreqEstimator, SyncTimer};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("block size is not a multiple of the frame size")]
    MisalignedBlock,
    #[error("block duration is not a whole number of timer ticks")]
    FractionalBlockDuration,
    #[error("no timestamp for audio block; capture hook did not run")]
    MissingBlockTime,
    #[error("audio source: {0}")]
    Source(io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    /// Sample width as delivered by the hardware.
    pub word_bits: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat {
            channels: 2,
            sample_rate: 48_000,
            word_bits: 32,
        }
    }
}

impl AudioFormat {
    pub fn bytes_per_frame_raw(&self) -> usize {
        usize::from(self.channels) * usize::from(self.word_bits / 8)
    }

    /// Frame size after packing to 24-bit.
    pub fn bytes_per_frame_packed(&self) -> u16 {
        self.channels * 3
    }

    /// Sampling period in reference ticks, with fractional precision.
    pub fn sample_period(&self) -> Phase {
        Phase::from_int(NOMINAL_TICK_RATE.0).div_int(self.sample_rate)
    }

    pub fn frames_per_block(&self, block_size: usize) -> Result<u32, PipelineError> {
        let frame = self.bytes_per_frame_raw();
        if frame == 0 || block_size % frame != 0 {
            return Err(PipelineError::MisalignedBlock);
        }
        Ok((block_size / frame) as u32)
    }

    /// Block length in whole reference ticks. Sample rates that do not divide
    /// the block evenly into ticks are rejected.
    pub fn block_duration(&self, block_size: usize) -> Result<u32, PipelineError> {
        let frames = self.frames_per_block(block_size)?;
        let total = u64::from(NOMINAL_TICK_RATE.0) * u64::from(frames);

        if total % u64::from(self.sample_rate) != 0 {
            return Err(PipelineError::FractionalBlockDuration);
        }
        Ok((total / u64::from(self.sample_rate)) as u32)
    }
}

/// Snapshot queued by the capture hook at each PCM buffer boundary.
#[derive(Debug, Clone, Copy)]
pub struct BlockTime {
    /// Ticks that should have elapsed from stream start to this buffer's
    /// first frame, accumulated in ideal block durations.
    pub i2s_time: Phase,
    /// Reference counter captured at the buffer boundary.
    pub ref_time: Ticks,
}

/// Snapshot queue depth; bounded by the hardware buffer count.
pub const BLOCK_TIME_DEPTH: usize = 8;

pub type BlockTimeQueue = heapless::spsc::Queue<BlockTime, BLOCK_TIME_DEPTH>;
pub type BlockTimeProducer = heapless::spsc::Producer<'static, BlockTime, BLOCK_TIME_DEPTH>;
pub type BlockTimeConsumer = heapless::spsc::Consumer<'static, BlockTime, BLOCK_TIME_DEPTH>;

/// A source of fixed-size PCM blocks.
pub trait BlockSource {
    /// Block until the next full PCM buffer is available.
    fn read(&mut self) -> io::Result<Vec<u8>>;

    /// Re-prepare and restart the peripheral after a transient error.
    fn recover(&mut self) -> io::Result<()>;
}

/// The audio master clock's frequency-trim register.
pub trait TrimOscillator {
    /// Inclusive legal range of the trim register.
    fn range(&self) -> (u16, u16);

    fn trim(&self) -> u16;

    fn set_trim(&mut self, trim: u16);
}

/// Convert 32-bit little-endian samples to packed 24-bit in place by
/// dropping the least significant byte of each sample. Returns the packed
/// length.
pub fn pack_32_to_24(buf: &mut [u8]) -> usize {
    debug_assert!(buf.len() % 4 == 0);

    let mut i = 1;
    let mut j = 0;
    while i + 3 <= buf.len() {
        buf.copy_within(i..i + 3, j);
        i += 4;
        j += 3;
    }

    buf.len() / 4 * 3
}

/// Servo keeping emitted samples on the central sampling grid: estimates the
/// phase of the ideal sample clock against recovered central time and trims
/// the master oscillator towards the latched target phase.
pub struct AudioClock {
    est: FreqEstimator,
    ctlr: FreqController,
    sample_period: Phase,
    /// Target phase between the elapsed-sample counter and central time.
    /// Latched once per estimator initialization.
    target_theta: Phase,
    /// Trim step applied after the previous block.
    last_increment: i16,
}

impl AudioClock {
    pub fn new(
        estimator: &EstimatorConfig,
        controller: &ControllerConfig,
        sample_period: Phase,
    ) -> AudioClock {
        AudioClock {
            est: FreqEstimator::new(estimator),
            ctlr: FreqController::new(controller),
            sample_period,
            target_theta: Phase::ZERO,
            last_increment: 0,
        }
    }

    /// Run estimator and controller for one block and return the block's
    /// start in central time.
    pub fn update<O: TrimOscillator>(
        &mut self,
        sync_timer: &SyncTimer,
        block_time: &BlockTime,
        osc: &mut O,
    ) -> Ticks {
        let local = Phase::from_ticks(block_time.ref_time);

        // Convert the capture to central time if a central reference exists.
        // Until then the servo disciplines the sample clock against the local
        // timer; the first converted observation shows up as an outlier run
        // and resyncs the estimator onto the central grid.
        let ref_time = sync_timer.local_to_central(local).unwrap_or(local);

        let result = self
            .est
            .observe(block_time.i2s_time, ref_time, self.last_increment);
        let state = self.est.state();

        if result == Observation::Init {
            // Round the target to a whole number of sample periods; every
            // node rounds the same way, so their sampling instants coincide.
            self.target_theta = state.theta.round_to_multiple_of(self.sample_period);
            log::info!("audio clock target phase latched");
        }

        // Block timestamp assuming the servo holds the setpoint exactly.
        // While it is still converging the first blocks are off by the
        // residual and drift onto the grid over time.
        let start = block_time
            .i2s_time
            .wrapping_sub(self.target_theta)
            .whole_ticks();

        let step = self.ctlr.update(self.target_theta, &state);
        self.last_increment = apply_trim(osc, step);

        start
    }
}

/// Apply a trim step, clamped so the register stays inside its legal range.
/// Returns the step actually applied.
fn apply_trim<O: TrimOscillator>(osc: &mut O, step: i16) -> i16 {
    let trim = i32::from(osc.trim());
    let (min, max) = osc.range();

    let step = i32::from(step).clamp(i32::from(min) - trim, i32::from(max) - trim);
    osc.set_trim((trim + step) as u16);
    step as i16
}

pub struct SessionConfig {
    pub format: AudioFormat,
    /// Raw PCM block size in bytes.
    pub block_size: usize,
    /// Steer the master clock against recovered central time. Disabled, the
    /// pipeline timestamps blocks without trimming the oscillator.
    pub clock_recovery: bool,
    pub estimator: EstimatorConfig,
    pub controller: ControllerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            format: AudioFormat::default(),
            block_size: 14400,
            clock_recovery: true,
            estimator: EstimatorConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

/// The audio thread's per-block loop.
pub struct Session<S, O> {
    source: S,
    osc: O,
    clock: AudioClock,
    times: BlockTimeConsumer,
    sync_timer: Arc<Mutex<SyncTimer>>,
    recorder: Arc<Recorder>,
    duration_ticks: u32,
    bytes_per_frame: u16,
    clock_recovery: bool,
}

impl<S: BlockSource, O: TrimOscillator> Session<S, O> {
    pub fn new(
        config: &SessionConfig,
        source: S,
        osc: O,
        times: BlockTimeConsumer,
        sync_timer: Arc<Mutex<SyncTimer>>,
        recorder: Arc<Recorder>,
    ) -> Result<Session<S, O>, PipelineError> {
        let duration_ticks = config.format.block_duration(config.block_size)?;

        Ok(Session {
            source,
            osc,
            clock: AudioClock::new(
                &config.estimator,
                &config.controller,
                config.format.sample_period(),
            ),
            times,
            sync_timer,
            recorder,
            duration_ticks,
            bytes_per_frame: config.format.bytes_per_frame_packed(),
            clock_recovery: config.clock_recovery,
        })
    }

    /// Consume blocks until the session dies.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        loop {
            self.run_block()?;
        }
    }

    pub fn run_block(&mut self) -> Result<(), PipelineError> {
        let mut buf = match self.source.read() {
            Ok(buf) => buf,
            Err(err) => {
                log::error!("failed to read audio block: {err}");
                self.source.recover().map_err(PipelineError::Source)?;
                return Ok(());
            }
        };

        // the capture hook fires at the buffer boundary, strictly before the
        // block is delivered; an empty queue means the hook never ran
        let Some(block_time) = self.times.dequeue() else {
            return Err(PipelineError::MissingBlockTime);
        };

        let start_time = if self.clock_recovery {
            let sync_timer = self.sync_timer.lock().unwrap();
            self.clock.update(&sync_timer, &block_time, &mut self.osc)
        } else {
            let local = Phase::from_ticks(block_time.ref_time);
            self.sync_timer
                .lock()
                .unwrap()
                .local_to_central(local)
                .unwrap_or(local)
                .whole_ticks()
        };

        let len = pack_32_to_24(&mut buf);
        buf.truncate(len);

        let block = AudioBlock {
            buf: &buf,
            start_time,
            duration: self.duration_ticks,
            bytes_per_frame: self.bytes_per_frame,
        };

        if let Err(err) = self.recorder.write_block(&block) {
            log::error!("failed to record block: {err}");
        }

        Ok(())
    }
}
