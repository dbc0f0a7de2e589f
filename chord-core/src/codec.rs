//! Input-codec capability interface.
//!
//! Real codec drivers (register programming, bias sequencing) live outside
//! the engine; the pipeline only needs this narrow surface. Drivers are
//! chosen at construction and used through the trait, never interrogated for
//! their concrete type.

use core::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::audio::AudioFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecChannel {
    Left,
    Right,
}

impl CodecChannel {
    pub const ALL: [CodecChannel; 2] = [CodecChannel::Left, CodecChannel::Right];

    fn index(self) -> usize {
        match self {
            CodecChannel::Left => 0,
            CodecChannel::Right => 1,
        }
    }
}

impl fmt::Display for CodecChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecChannel::Left => write!(f, "left"),
            CodecChannel::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown codec channel")]
pub struct UnknownChannel;

impl FromStr for CodecChannel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(CodecChannel::Left),
            "right" => Ok(CodecChannel::Right),
            _ => Err(UnknownChannel),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecProperty {
    AnalogGain,
    DigitalGain,
}

impl CodecProperty {
    /// Key fragment used in settings storage.
    pub fn key(self) -> &'static str {
        match self {
            CodecProperty::AnalogGain => "a_gain",
            CodecProperty::DigitalGain => "d_gain",
        }
    }

    fn index(self) -> usize {
        match self {
            CodecProperty::AnalogGain => 0,
            CodecProperty::DigitalGain => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("codec does not support this property")]
    Unsupported,
    #[error("value out of range for this codec")]
    OutOfRange,
    #[error("codec is not configured")]
    NotConfigured,
}

pub trait InputCodec {
    fn configure(&mut self, format: &AudioFormat) -> Result<(), CodecError>;

    fn start(&mut self) -> Result<(), CodecError>;

    fn stop(&mut self) -> Result<(), CodecError>;

    fn get_property(
        &self,
        property: CodecProperty,
        channel: CodecChannel,
    ) -> Result<i32, CodecError>;

    fn set_property(
        &mut self,
        property: CodecProperty,
        channel: CodecChannel,
        value: i32,
    ) -> Result<(), CodecError>;
}

/// Stand-in driver for targets without real capture hardware: accepts any
/// configuration and remembers gains.
#[derive(Default)]
pub struct DummyCodec {
    configured: bool,
    gains: [[i32; 2]; 2],
}

impl DummyCodec {
    pub fn new() -> DummyCodec {
        DummyCodec::default()
    }
}

impl InputCodec for DummyCodec {
    fn configure(&mut self, _format: &AudioFormat) -> Result<(), CodecError> {
        self.configured = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), CodecError> {
        if !self.configured {
            return Err(CodecError::NotConfigured);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn get_property(
        &self,
        property: CodecProperty,
        channel: CodecChannel,
    ) -> Result<i32, CodecError> {
        Ok(self.gains[property.index()][channel.index()])
    }

    fn set_property(
        &mut self,
        property: CodecProperty,
        channel: CodecChannel,
        value: i32,
    ) -> Result<(), CodecError> {
        self.gains[property.index()][channel.index()] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_parse_and_format() {
        assert_eq!("left".parse::<CodecChannel>().unwrap(), CodecChannel::Left);
        assert_eq!("right".parse::<CodecChannel>().unwrap(), CodecChannel::Right);
        assert!("center".parse::<CodecChannel>().is_err());

        assert_eq!(CodecChannel::Left.to_string(), "left");
        assert_eq!(CodecChannel::Right.to_string(), "right");
    }

    #[test]
    fn dummy_codec_stores_gains_per_channel() {
        let mut codec = DummyCodec::new();
        assert_eq!(codec.start(), Err(CodecError::NotConfigured));

        codec.configure(&AudioFormat::default()).unwrap();
        codec.start().unwrap();

        codec
            .set_property(CodecProperty::AnalogGain, CodecChannel::Left, -6)
            .unwrap();
        codec
            .set_property(CodecProperty::DigitalGain, CodecChannel::Right, 12)
            .unwrap();

        assert_eq!(
            codec.get_property(CodecProperty::AnalogGain, CodecChannel::Left),
            Ok(-6),
        );
        assert_eq!(
            codec.get_property(CodecProperty::AnalogGain, CodecChannel::Right),
            Ok(0),
        );
        assert_eq!(
            codec.get_property(CodecProperty::DigitalGain, CodecChannel::Right),
            Ok(12),
        );

        codec.stop().unwrap();
    }
}
