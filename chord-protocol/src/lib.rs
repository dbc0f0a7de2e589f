#![no_std]

pub mod beacon;
pub mod link;
pub mod time;

/// Rate of the free-running reference counter both node roles carry.
pub const NOMINAL_TICK_RATE: TickRate = TickRate(16_000_000);

#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{_0}")]
pub struct TickRate(pub u32);

impl From<TickRate> for u32 {
    fn from(value: TickRate) -> Self {
        value.0
    }
}

impl From<TickRate> for u64 {
    fn from(value: TickRate) -> Self {
        value.0.into()
    }
}

impl From<TickRate> for i64 {
    fn from(value: TickRate) -> Self {
        value.0.into()
    }
}

impl From<TickRate> for u128 {
    fn from(value: TickRate) -> Self {
        value.0.into()
    }
}
