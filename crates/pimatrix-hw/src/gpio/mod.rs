//! GPIO line lifecycle management.
//!
//! A [`Pin`] exclusively owns one GPIO line for one logical HUB75
//! signal. Two kernel backends (sysfs and character device) and a
//! trace-recording mock all sit behind the same type, so the scan-out
//! engine never cares how a line was acquired.

pub mod cdev;
pub mod mock;
pub mod sysfs;

use std::time::Duration;

use tracing::warn;

use crate::config::GpioBackend;
use crate::error::Result;

pub use mock::{Trace, TraceEvent};

/// An open GPIO chip (or backend) that hands out pins.
pub enum Chip {
    /// `/sys/class/gpio` file triad. No per-chip handle needed.
    Sysfs,
    /// Character-device chip, e.g. `/dev/gpiochip0`.
    Cdev(cdev::CdevChip),
    /// In-memory backend recording every write.
    Mock(mock::MockChip),
}

impl Chip {
    /// Opens the backend named by the configuration.
    pub fn open(backend: &GpioBackend) -> Result<Self> {
        match backend {
            GpioBackend::Sysfs => Ok(Chip::Sysfs),
            GpioBackend::Cdev { chip } => Ok(Chip::Cdev(cdev::CdevChip::open(chip)?)),
            GpioBackend::Mock => Ok(Chip::Mock(mock::MockChip::new())),
        }
    }

    /// Requests exclusive ownership of one line, configured for output
    /// and driven low.
    pub fn request(&self, pin: u32) -> Result<Pin> {
        let line = match self {
            Chip::Sysfs => Line::Sysfs(sysfs::SysfsPin::export(pin)?),
            Chip::Cdev(chip) => Line::Cdev(chip.request_output(pin)?),
            Chip::Mock(chip) => Line::Mock(chip.request(pin)?),
        };
        Ok(Pin {
            id: pin,
            line: Some(line),
        })
    }

    /// The write trace, if this is the mock backend.
    pub fn trace(&self) -> Option<Trace> {
        match self {
            Chip::Mock(chip) => Some(chip.trace()),
            _ => None,
        }
    }
}

enum Line {
    Sysfs(sysfs::SysfsPin),
    Cdev(cdev::CdevLine),
    Mock(mock::MockPin),
}

/// An exclusively owned output line.
///
/// `set` takes `&mut self`: all pins of one matrix are driven from a
/// single sequencing thread, never two threads on the same line.
pub struct Pin {
    id: u32,
    line: Option<Line>,
}

impl Pin {
    /// The pin identifier this line was requested with.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Drives the line high or low.
    pub fn set(&mut self, high: bool) -> Result<()> {
        match self.line.as_mut() {
            Some(Line::Sysfs(p)) => p.set(self.id, high),
            Some(Line::Cdev(l)) => l.set(self.id, high),
            Some(Line::Mock(m)) => m.set(high),
            None => Err(crate::Error::ProtocolViolation("write to released pin")),
        }
    }

    /// High, hold, low. The primitive for software-timed latch edges.
    pub fn pulse(&mut self, hold: Duration) -> Result<()> {
        self.set(true)?;
        if !hold.is_zero() {
            std::thread::sleep(hold);
        }
        self.set(false)
    }

    /// Releases the line. Idempotent and best-effort: release commonly
    /// races with kernel-side cleanup, so failures are logged and never
    /// propagated.
    pub fn release(&mut self) {
        let Some(line) = self.line.take() else {
            return;
        };
        let result = match line {
            Line::Sysfs(p) => p.unexport(self.id),
            Line::Cdev(l) => l.release(),
            Line::Mock(m) => m.release(),
        };
        if let Err(e) = result {
            warn!("failed to release GPIO pin {}: {}", self.id, e);
        }
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        self.release();
    }
}
