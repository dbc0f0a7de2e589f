//! Gain settings storage.
//!
//! Gains persist under `audio/ch/{left|right}/{a_gain|d_gain}` keys, loaded
//! at boot and pushed through the codec, written back whenever one changes.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chord_core::codec::{CodecChannel, CodecError, CodecProperty, InputCodec};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings storage: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("codec rejected setting: {0}")]
    Codec(#[from] CodecError),
}

pub struct Settings {
    path: PathBuf,
    values: BTreeMap<String, i32>,
}

impl Settings {
    /// Load the settings file; a missing file is an empty store.
    pub fn load(path: PathBuf) -> Result<Settings, SettingsError> {
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Settings { path, values })
    }

    /// Push every stored gain through the codec. Unknown keys are warned
    /// about and left in place.
    pub fn apply(&self, codec: &mut dyn InputCodec) {
        for (key, value) in &self.values {
            match parse_key(key) {
                Some((channel, property)) => {
                    if let Err(err) = codec.set_property(property, channel, *value) {
                        log::warn!("failed to apply {key}: {err}");
                    }
                }
                None => log::warn!("unknown audio setting: {key}"),
            }
        }
    }

    /// Set a gain on the codec and persist it.
    pub fn set_gain(
        &mut self,
        codec: &mut dyn InputCodec,
        channel: CodecChannel,
        property: CodecProperty,
        value: i32,
    ) -> Result<(), SettingsError> {
        codec.set_property(property, channel, value)?;
        self.values.insert(key_for(channel, property), value);
        self.save()
    }

    fn save(&self) -> Result<(), SettingsError> {
        let contents = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

fn key_for(channel: CodecChannel, property: CodecProperty) -> String {
    format!("audio/ch/{channel}/{}", property.key())
}

fn parse_key(key: &str) -> Option<(CodecChannel, CodecProperty)> {
    let rest = key.strip_prefix("audio/ch/")?;
    let (channel, property) = rest.split_once('/')?;

    let channel = channel.parse().ok()?;
    let property = match property {
        "a_gain" => CodecProperty::AnalogGain,
        "d_gain" => CodecProperty::DigitalGain,
        _ => return None,
    };

    Some((channel, property))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chord_core::codec::DummyCodec;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("chord-settings-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn keys_follow_the_storage_layout() {
        assert_eq!(
            key_for(CodecChannel::Left, CodecProperty::AnalogGain),
            "audio/ch/left/a_gain",
        );
        assert_eq!(
            key_for(CodecChannel::Right, CodecProperty::DigitalGain),
            "audio/ch/right/d_gain",
        );

        assert_eq!(
            parse_key("audio/ch/left/a_gain"),
            Some((CodecChannel::Left, CodecProperty::AnalogGain)),
        );
        assert_eq!(parse_key("audio/ch/center/a_gain"), None);
        assert_eq!(parse_key("audio/ch/left/volume"), None);
        assert_eq!(parse_key("display/brightness"), None);
    }

    #[test]
    fn gains_round_trip_through_the_file() {
        let path = temp_file("round-trip");
        let _ = fs::remove_file(&path);

        let mut codec = DummyCodec::new();
        let mut settings = Settings::load(path.clone()).unwrap();
        settings
            .set_gain(&mut codec, CodecChannel::Left, CodecProperty::AnalogGain, -12)
            .unwrap();
        settings
            .set_gain(&mut codec, CodecChannel::Right, CodecProperty::DigitalGain, 6)
            .unwrap();

        // a fresh boot loads and applies the persisted gains
        let mut codec = DummyCodec::new();
        let settings = Settings::load(path.clone()).unwrap();
        settings.apply(&mut codec);

        assert_eq!(
            codec.get_property(CodecProperty::AnalogGain, CodecChannel::Left),
            Ok(-12),
        );
        assert_eq!(
            codec.get_property(CodecProperty::DigitalGain, CodecChannel::Right),
            Ok(6),
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let path = temp_file("missing");
        let _ = fs::remove_file(&path);

        let settings = Settings::load(path).unwrap();
        assert!(settings.values.is_empty());
    }
}
