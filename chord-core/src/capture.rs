//! Capture-channel bookkeeping.
//!
//! Timestamping relies on peripheral-interconnect routes that latch the
//! free-running counter into a capture register with zero CPU involvement:
//! radio end-of-packet, the I2S buffer boundary, and (reserved for USB audio
//! feedback) the USB start-of-frame. Routes are wired once at init by
//! allocating a channel here; runtime code only ever reads captured values
//! through [`CaptureTimer`].

use chord_protocol::time::Ticks;
use thiserror::Error;

pub const MAX_CAPTURE_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRoute {
    RadioPacketEnd,
    AudioBlockBoundary,
    UsbStartOfFrame,
}

/// Identifier of an allocated capture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureChannel(u8);

impl CaptureChannel {
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no free capture channel for {0:?}")]
pub struct RegistryFull(pub CaptureRoute);

/// Hands out capture channels and remembers which route drives each.
#[derive(Default)]
pub struct Registry {
    routes: heapless::Vec<CaptureRoute, MAX_CAPTURE_CHANNELS>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn allocate(&mut self, route: CaptureRoute) -> Result<CaptureChannel, RegistryFull> {
        let index = self.routes.len() as u8;
        self.routes.push(route).map_err(RegistryFull)?;
        Ok(CaptureChannel(index))
    }

    pub fn route(&self, channel: CaptureChannel) -> Option<CaptureRoute> {
        self.routes.get(channel.index()).copied()
    }
}

/// Read access to the capture registers of an allocated channel.
pub trait CaptureTimer {
    /// Counter value latched by the most recent event on `channel`'s route.
    fn read(&self, channel: CaptureChannel) -> Ticks;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_distinct_channels() {
        let mut registry = Registry::new();

        let adv = registry.allocate(CaptureRoute::RadioPacketEnd).unwrap();
        let i2s = registry.allocate(CaptureRoute::AudioBlockBoundary).unwrap();

        assert_ne!(adv, i2s);
        assert_eq!(registry.route(adv), Some(CaptureRoute::RadioPacketEnd));
        assert_eq!(registry.route(i2s), Some(CaptureRoute::AudioBlockBoundary));
    }

    #[test]
    fn refuses_allocation_beyond_the_channel_count() {
        let mut registry = Registry::new();
        for _ in 0..MAX_CAPTURE_CHANNELS {
            registry.allocate(CaptureRoute::UsbStartOfFrame).unwrap();
        }

        assert_eq!(
            registry.allocate(CaptureRoute::UsbStartOfFrame),
            Err(RegistryFull(CaptureRoute::UsbStartOfFrame)),
        );
    }
}
