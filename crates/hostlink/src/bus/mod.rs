//! Lock-guarded access to shared hardware buses.

pub mod spi;

pub use spi::{BusError, BusResult, SpiBus, SpiConfig, SpiDriver, BUS_LOCK_TIMEOUT};
