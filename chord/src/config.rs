use std::env;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    multicast: Option<SocketAddrV4>,
    #[serde(default)]
    central: Central,
    #[serde(default)]
    node: Node,
}

#[derive(Deserialize, Default)]
pub struct Central {
    interval_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
pub struct Node {
    dir: Option<PathBuf>,
    settings: Option<PathBuf>,
    tone_hz: Option<f32>,
}

fn set_env<T: ToString>(name: &str, value: T) {
    env::set_var(name, value.to_string());
}

fn set_env_option<T: ToString>(name: &str, value: Option<T>) {
    if let Some(value) = value {
        set_env(name, value)
    }
}

pub fn load_into_env(config: &Config) {
    set_env_option("CHORD_MULTICAST", config.multicast);
    set_env_option("CHORD_CENTRAL_INTERVAL_MS", config.central.interval_ms);
    set_env_option("CHORD_NODE_DIR", config.node.dir.as_ref().map(|dir| dir.display()));
    set_env_option("CHORD_NODE_SETTINGS", config.node.settings.as_ref().map(|path| path.display()));
    set_env_option("CHORD_NODE_TONE_HZ", config.node.tone_hz);
}

fn load_file(path: &Path) -> Option<Config> {
    log::debug!("looking for config in {}", path.display());

    let contents = std::fs::read_to_string(path).ok()?;

    match toml::from_str(&contents) {
        Ok(config) => {
            log::info!("reading config from {}", path.display());
            Some(config)
        }
        Err(e) => {
            log::error!("error reading config: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn read() -> Option<Config> {
    // try current directory first
    if let Some(config) = load_file(Path::new("chord.toml")) {
        return Some(config);
    }

    // otherwise try xdg config dirs
    let dirs = xdg::BaseDirectories::new().unwrap();
    if let Some(config) = dirs.find_config_file("chord.toml") {
        return load_file(&config);
    }

    // found nothing
    None
}
