//! Recording state machine.
//!
//! Start commands name a central-domain tick at which recording begins; the
//! recorder waits for the audio block whose time range covers that tick and
//! splits it at the matching frame boundary, so every node's first recorded
//! frame is the same frame. A start while running rolls to a new file with
//! the same frame-exact cut. Blocks keep flowing while stopped; they are
//! simply dropped.

pub mod wav;

use std::fs::{self, File};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chord_protocol::time::Ticks;
use thiserror::Error;

pub use wav::{WavFormat, WavWriter};

pub const FILE_PREFIX: &str = "REC_";
pub const FILE_EXT: &str = ".wav";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid recording format")]
    InvalidFormat,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One converted PCM block handed over by the audio pipeline.
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    pub buf: &'a [u8],
    /// Central-domain time of the block's first frame.
    pub start_time: Ticks,
    /// Length of the block in ticks.
    pub duration: u32,
    pub bytes_per_frame: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Stopped,
    WaitingStart,
    WaitingCut,
    Running,
}

/// A file handle exists exactly in the two states that write to one.
enum State {
    Stopped,
    WaitingStart { start: Ticks },
    WaitingCut { start: Ticks, file: WavWriter<File> },
    Running { file: WavWriter<File> },
}

pub struct Recorder {
    inner: Mutex<Inner>,
}

struct Inner {
    dir: PathBuf,
    format: WavFormat,
    /// Next unused file index.
    file_index: u32,
    state: State,
}

impl Recorder {
    pub fn new(dir: PathBuf, format: WavFormat) -> Recorder {
        let file_index = match next_file_index(&dir) {
            Ok(index) => index,
            Err(err) => {
                log::warn!("failed to scan {} for recordings: {err}", dir.display());
                0
            }
        };

        Recorder {
            inner: Mutex::new(Inner {
                dir,
                format,
                file_index,
                state: State::Stopped,
            }),
        }
    }

    pub fn status(&self) -> RecordStatus {
        match self.inner.lock().unwrap().state {
            State::Stopped => RecordStatus::Stopped,
            State::WaitingStart { .. } => RecordStatus::WaitingStart,
            State::WaitingCut { .. } => RecordStatus::WaitingCut,
            State::Running { .. } => RecordStatus::Running,
        }
    }

    /// Begin (or re-cut) recording at central time `time`.
    pub fn start(&self, time: Ticks) {
        let mut inner = self.inner.lock().unwrap();

        inner.state = match mem::replace(&mut inner.state, State::Stopped) {
            State::Stopped | State::WaitingStart { .. } => State::WaitingStart { start: time },
            State::WaitingCut { file, .. } | State::Running { file } => {
                State::WaitingCut { start: time, file }
            }
        };

        log::info!("record start at {time}");
    }

    /// Stop recording and finalize the open file, if any.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();

        match mem::replace(&mut inner.state, State::Stopped) {
            State::Stopped | State::WaitingStart { .. } => {}
            State::WaitingCut { file, .. } | State::Running { file } => {
                if let Err(err) = file.finish() {
                    log::error!("failed to finalize recording: {err}");
                }
                log::info!("record stop");
            }
        }
    }

    /// Feed one audio block through the state machine. Any I/O error closes
    /// the current file and stops the recording.
    pub fn write_block(&self, block: &AudioBlock) -> Result<(), RecordError> {
        let mut inner = self.inner.lock().unwrap();

        let state = mem::replace(&mut inner.state, State::Stopped);
        match inner.advance(state, block) {
            Ok(state) => {
                inner.state = state;
                Ok(())
            }
            Err(err) => {
                log::error!("record failed, stopping: {err}");
                Err(err)
            }
        }
    }
}

impl Inner {
    fn advance(&mut self, state: State, block: &AudioBlock) -> Result<State, RecordError> {
        match state {
            State::Stopped => Ok(State::Stopped),

            State::WaitingStart { start } => {
                let wait = start.0.wrapping_sub(block.start_time.0);
                if wait > block.duration {
                    return Ok(State::WaitingStart { start });
                }

                let mut file = self.open_next()?;
                file.write(&block.buf[split_offset(wait, block)..])?;
                Ok(State::Running { file })
            }

            State::WaitingCut { start, mut file } => {
                let wait = start.0.wrapping_sub(block.start_time.0);
                if wait > block.duration {
                    file.write(block.buf)?;
                    return Ok(State::WaitingCut { start, file });
                }

                let split = split_offset(wait, block);
                file.write(&block.buf[..split])?;
                if let Err(err) = file.finish() {
                    log::warn!("failed to finalize cut recording: {err}");
                }

                let mut file = self.open_next()?;
                file.write(&block.buf[split..])?;
                Ok(State::Running { file })
            }

            State::Running { mut file } => {
                file.write(block.buf)?;
                Ok(State::Running { file })
            }
        }
    }

    fn open_next(&mut self) -> Result<WavWriter<File>, RecordError> {
        let name = format!("{}{:04}{}", FILE_PREFIX, self.file_index, FILE_EXT);
        let path = self.dir.join(name);

        let file = File::create(&path)?;
        let writer = WavWriter::new(file, &self.format)?;

        self.file_index += 1;
        log::info!("recording to {}", path.display());
        Ok(writer)
    }
}

/// Byte offset of central time `start_time + wait` within the block, rounded
/// to a frame boundary.
fn split_offset(wait: u32, block: &AudioBlock) -> usize {
    let bytes_per_frame = u64::from(block.bytes_per_frame);
    let scaled = u64::from(wait) * block.buf.len() as u64 / bytes_per_frame;
    let offset = div_round_closest(scaled, u64::from(block.duration)) * bytes_per_frame;
    offset as usize
}

fn div_round_closest(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}

fn next_file_index(dir: &Path) -> io::Result<u32> {
    let mut next = 0;

    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(index) = parse_file_index(name) else { continue };

        // +1 to record the next free index
        next = next.max(index + 1);
    }

    Ok(next)
}

fn parse_file_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_EXT)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wav::WAV_HEADER_SIZE;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chord-record-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn start_cuts_the_covering_block_at_the_frame_boundary() {
        let dir = temp_dir("cut");
        let recorder = Recorder::new(dir.clone(), WavFormat::default());

        recorder.start(Ticks(1_000_000));
        assert_eq!(recorder.status(), RecordStatus::WaitingStart);

        // a block entirely before the start time is dropped
        let early = pattern(14400);
        let block = AudioBlock {
            buf: &early,
            start_time: Ticks(990_000),
            duration: 4800,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert_eq!(recorder.status(), RecordStatus::WaitingStart);
        assert!(!dir.join("REC_0000.wav").exists());

        // start falls 600 ticks into this block: 300 frames in, 1800 bytes
        let buf = pattern(14400);
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(999_400),
            duration: 4800,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert_eq!(recorder.status(), RecordStatus::Running);

        recorder.stop();
        assert_eq!(recorder.status(), RecordStatus::Stopped);

        let bytes = fs::read(dir.join("REC_0000.wav")).unwrap();
        assert_eq!(bytes.len() as u32, WAV_HEADER_SIZE + 12600);
        assert_eq!(u32_at(&bytes, 40), 12600);
        assert_eq!(u32_at(&bytes, 4), 12600 + 36);
        assert_eq!(&bytes[44..50], &buf[1800..1806]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn start_while_running_rolls_to_a_new_file() {
        let dir = temp_dir("roll");
        let recorder = Recorder::new(dir.clone(), WavFormat::default());

        let buf = pattern(14400);

        // start exactly on a block boundary records the whole block
        recorder.start(Ticks(10_000));
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(10_000),
            duration: 4800,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert_eq!(recorder.status(), RecordStatus::Running);

        // blocks between the re-start command and its start time keep going
        // to the old file
        recorder.start(Ticks(1_000_000));
        assert_eq!(recorder.status(), RecordStatus::WaitingCut);

        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(14_800),
            duration: 4800,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert_eq!(recorder.status(), RecordStatus::WaitingCut);

        // the covering block splits between the files
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(999_400),
            duration: 4800,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert_eq!(recorder.status(), RecordStatus::Running);
        recorder.stop();

        let old = fs::read(dir.join("REC_0000.wav")).unwrap();
        assert_eq!(u32_at(&old, 40), 14400 + 14400 + 1800);

        let new = fs::read(dir.join("REC_0001.wav")).unwrap();
        assert_eq!(u32_at(&new, 40), 12600);
        assert_eq!(&new[44..50], &buf[1800..1806]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stop_before_the_cut_discards_the_pending_start() {
        let dir = temp_dir("stop-pending");
        let recorder = Recorder::new(dir.clone(), WavFormat::default());

        recorder.start(Ticks(500));
        recorder.stop();
        assert_eq!(recorder.status(), RecordStatus::Stopped);

        // stop while stopped is a no-op
        recorder.stop();

        let buf = pattern(600);
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(400),
            duration: 100,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert!(!dir.join("REC_0000.wav").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn restart_replaces_the_pending_start_time() {
        let dir = temp_dir("restart");
        let recorder = Recorder::new(dir.clone(), WavFormat::default());

        recorder.start(Ticks(5_000));
        recorder.start(Ticks(9_000));

        // 10 ticks into a 100-tick block of 100 frames: split at frame 10
        let buf = pattern(600);
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(8_990),
            duration: 100,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        recorder.stop();

        let bytes = fs::read(dir.join("REC_0000.wav")).unwrap();
        assert_eq!(u32_at(&bytes, 40), 540);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unclosed_file_declares_the_maximum_data_size() {
        let dir = temp_dir("unclosed");
        let recorder = Recorder::new(dir.clone(), WavFormat::default());

        recorder.start(Ticks(0));
        let buf = pattern(14400);
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(0),
            duration: 4800,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        assert_eq!(recorder.status(), RecordStatus::Running);

        // file still open: the header must carry the maximum allowed sizes so
        // the file survives an abrupt power loss
        let bytes = fs::read(dir.join("REC_0000.wav")).unwrap();
        let max_data = (u32::MAX - WAV_HEADER_SIZE) / 6 * 6;
        assert_eq!(u32_at(&bytes, 40), max_data);
        assert_eq!(u32_at(&bytes, 4), max_data + WAV_HEADER_SIZE - 8);

        recorder.stop();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn boot_scan_continues_after_existing_recordings() {
        let dir = temp_dir("scan");
        fs::write(dir.join("REC_0002.wav"), b"x").unwrap();
        fs::write(dir.join("REC_0017.wav"), b"x").unwrap();
        fs::write(dir.join("REC_.wav"), b"x").unwrap();
        fs::write(dir.join("REC_12ab.wav"), b"x").unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();

        let recorder = Recorder::new(dir.clone(), WavFormat::default());
        recorder.start(Ticks(0));

        let buf = pattern(600);
        let block = AudioBlock {
            buf: &buf,
            start_time: Ticks(0),
            duration: 100,
            bytes_per_frame: 6,
        };
        recorder.write_block(&block).unwrap();
        recorder.stop();

        assert!(dir.join("REC_0018.wav").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn parses_only_well_formed_names() {
        assert_eq!(parse_file_index("REC_0000.wav"), Some(0));
        assert_eq!(parse_file_index("REC_0042.wav"), Some(42));
        assert_eq!(parse_file_index("REC_123456.wav"), Some(123456));
        assert_eq!(parse_file_index("REC_.wav"), None);
        assert_eq!(parse_file_index("REC_+1.wav"), None);
        assert_eq!(parse_file_index("REC_1.txt"), None);
        assert_eq!(parse_file_index("rec_1.wav"), None);
    }
}
