//! RIFF/WAVE PCM writer.
//!
//! The 44-byte header is written on open with the chunk sizes set to the
//! maximum the data chunk is allowed to reach. Updating them as data arrives
//! would mean a seek per block, and seeking on FAT gets slower as the file
//! grows; writing the maximum up front at least leaves the file playable if
//! it is never closed cleanly. The real sizes are patched in on
//! [`WavWriter::finish`].

use std::io::{self, Seek, SeekFrom, Write};

use super::RecordError;

pub const WAV_HEADER_SIZE: u32 = 44;

const CHUNK_SIZE_OFFSET: u64 = 4;
const SUBCHUNK_2_SIZE_OFFSET: u64 = 40;

#[derive(Debug, Clone, Copy)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Upper bound on the total file size, header included.
    pub max_file_size: u32,
}

impl Default for WavFormat {
    fn default() -> Self {
        WavFormat {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 24,
            max_file_size: u32::MAX,
        }
    }
}

impl WavFormat {
    pub fn bytes_per_frame(&self) -> u16 {
        self.channels * ((self.bits_per_sample + 7) / 8)
    }
}

pub struct WavWriter<W> {
    out: W,
    bytes_per_frame: u16,
    /// Limit of the data chunk, rounded down so it never splits a frame.
    max_data_size: u32,
    data_size: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(out: W, format: &WavFormat) -> Result<WavWriter<W>, RecordError> {
        if format.channels == 0 || format.sample_rate == 0 || format.bits_per_sample == 0 {
            return Err(RecordError::InvalidFormat);
        }
        if format.max_file_size < WAV_HEADER_SIZE {
            return Err(RecordError::InvalidFormat);
        }

        let bytes_per_frame = format.bytes_per_frame();
        let max_data_size = round_down(
            format.max_file_size - WAV_HEADER_SIZE,
            u32::from(bytes_per_frame),
        );

        let mut writer = WavWriter {
            out,
            bytes_per_frame,
            max_data_size,
            data_size: 0,
        };
        writer.write_header(format)?;
        Ok(writer)
    }

    fn write_header(&mut self, format: &WavFormat) -> io::Result<()> {
        let bytes_per_frame = u32::from(self.bytes_per_frame);
        let byte_rate = format.sample_rate * bytes_per_frame;

        self.out.write_all(b"RIFF")?;
        self.write_u32(self.max_data_size + WAV_HEADER_SIZE - 8)?;
        self.out.write_all(b"WAVE")?;

        self.out.write_all(b"fmt ")?;
        self.write_u32(16)?;
        self.write_u16(1)?; // PCM
        self.write_u16(format.channels)?;
        self.write_u32(format.sample_rate)?;
        self.write_u32(byte_rate)?;
        self.write_u16(self.bytes_per_frame)?;
        self.write_u16(format.bits_per_sample)?;

        self.out.write_all(b"data")?;
        self.write_u32(self.max_data_size)?;

        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.out.write_all(&value.to_le_bytes())
    }

    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.out.write_all(&value.to_le_bytes())
    }

    /// Append sample data, silently truncating anything beyond the data
    /// chunk's size limit.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let remaining = (self.max_data_size - self.data_size) as usize;
        let buf = &buf[..buf.len().min(remaining)];

        self.out.write_all(buf)?;
        self.data_size += buf.len() as u32;
        Ok(())
    }

    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Patch the real chunk sizes into the header and hand back the writer.
    ///
    /// The written size may contain a partial frame if we ran out of space
    /// mid-frame; the header is rounded down to whole frames but the file is
    /// not truncated.
    pub fn finish(mut self) -> io::Result<W> {
        let data_size = round_down(self.data_size, u32::from(self.bytes_per_frame));

        self.out.seek(SeekFrom::Start(CHUNK_SIZE_OFFSET))?;
        self.write_u32(data_size + WAV_HEADER_SIZE - 8)?;

        self.out.seek(SeekFrom::Start(SUBCHUNK_2_SIZE_OFFSET))?;
        self.write_u32(data_size)?;

        self.out.seek(SeekFrom::End(0))?;
        Ok(self.out)
    }
}

fn round_down(value: u32, multiple: u32) -> u32 {
    value / multiple * multiple
}
