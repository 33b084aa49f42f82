//! Lock-guarded SPI bus sessions.
//!
//! The physical bus address space is exclusive for a whole session, not per
//! transfer, so the named lock spans the entire open-to-close lifetime:
//! `open` acquires `spi<bus>` before touching the hardware, `close` releases
//! it after the driver session is gone. Processes that derive the same bus
//! number contend on the same lock.
//!
//! The hardware itself is an external capability behind [`SpiDriver`]; this
//! module only owns the guarding and lifecycle.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::lock::{LockDir, LockError, LockGuard};

/// How long `open` waits for the bus lock before giving up.
pub const BUS_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Static configuration for an SPI channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpiConfig {
    /// Bus number (`/dev/spidev<bus>.<device>`).
    pub bus: u32,
    /// Device (chip select) index on the bus.
    pub device: u32,
    /// SPI mode (0-3).
    pub mode: u8,
    /// Maximum clock speed in Hz.
    pub max_speed_hz: u32,
}

impl SpiConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Io`] on filesystem errors and
    /// [`BusError::Config`] on parse errors.
    pub fn load(path: &Path) -> BusResult<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            BusError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }
}

/// Errors from guarded bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus lock could not be acquired or probed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Transfer or read was attempted on a closed handle.
    #[error("bus is not open")]
    NotOpen,

    /// Invalid bus configuration.
    #[error("invalid bus config: {0}")]
    Config(String),

    /// Driver or filesystem I/O error.
    #[error("bus I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Hardware transfer capability guarded by [`SpiBus`].
///
/// Concrete drivers (spidev ioctls, simulators) live outside this crate;
/// session teardown is drop.
pub trait SpiDriver: Sized {
    /// Opens the hardware channel for `(bus, device)`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the device cannot be opened.
    fn open(bus: u32, device: u32) -> io::Result<Self>;

    /// Applies the transfer mode and clock ceiling.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the settings are rejected.
    fn configure(&mut self, mode: u8, max_speed_hz: u32) -> io::Result<()>;

    /// Full-duplex transfer: clocks `tx` out and returns the bytes clocked
    /// in.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on transfer failure.
    fn transfer(&mut self, tx: &[u8]) -> io::Result<Vec<u8>>;

    /// Reads `count` bytes from the device.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on read failure.
    fn read(&mut self, count: usize) -> io::Result<Vec<u8>>;
}

/// Driver first: it must disconnect before the guard releases the bus.
struct Session<D> {
    driver: D,
    _guard: LockGuard,
}

/// Cross-process exclusive handle on one SPI channel.
///
/// `open` and `close` are idempotent; the lock is held for exactly the
/// open-to-close window and is released on every exit path, including a
/// driver failure halfway through `open`.
pub struct SpiBus<D: SpiDriver> {
    config: SpiConfig,
    locks: LockDir,
    lock_timeout: Duration,
    session: Option<Session<D>>,
}

impl<D: SpiDriver> SpiBus<D> {
    /// Creates a closed handle from static configuration.
    #[must_use]
    pub fn new(config: SpiConfig, locks: LockDir) -> Self {
        Self {
            config,
            locks,
            lock_timeout: BUS_LOCK_TIMEOUT,
            session: None,
        }
    }

    /// Overrides the lock acquisition timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The handle's static configuration.
    #[must_use]
    pub const fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// Returns `true` while a hardware session is live.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Lock name shared by every process naming this bus.
    #[must_use]
    pub fn lock_name(&self) -> String {
        format!("spi{}", self.config.bus)
    }

    /// Acquires the bus lock and opens the hardware channel. A no-op when
    /// already open.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Lock`] when the lock is not acquired within the
    /// timeout (fatal to this call, not retried internally), or
    /// [`BusError::Io`] when the driver rejects the open or configuration.
    /// A driver failure after acquisition releases the lock on the way out.
    pub fn open(&mut self) -> BusResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let guard = self.locks.acquire(&self.lock_name(), self.lock_timeout)?;
        let mut driver = D::open(self.config.bus, self.config.device)?;
        driver.configure(self.config.mode, self.config.max_speed_hz)?;

        debug!(
            bus = self.config.bus,
            device = self.config.device,
            "bus session opened"
        );
        self.session = Some(Session {
            driver,
            _guard: guard,
        });
        Ok(())
    }

    /// Disconnects the hardware session and releases the bus lock. A no-op
    /// when already closed.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session);
            debug!(bus = self.config.bus, "bus session closed");
        }
    }

    /// Full-duplex transfer on the open session.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotOpen`] when called on a closed handle; callers
    /// must bracket transfers with `open`/`close`.
    pub fn transfer(&mut self, tx: &[u8]) -> BusResult<Vec<u8>> {
        let session = self.session.as_mut().ok_or(BusError::NotOpen)?;
        Ok(session.driver.transfer(tx)?)
    }

    /// Reads `count` bytes from the open session.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotOpen`] when called on a closed handle.
    pub fn read(&mut self, count: usize) -> BusResult<Vec<u8>> {
        let session = self.session.as_mut().ok_or(BusError::NotOpen)?;
        Ok(session.driver.read(count)?)
    }
}

impl<D: SpiDriver> fmt::Debug for SpiBus<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiBus")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
