//! Matrix configuration consumed by the scan-out engine.
//!
//! These are plain structs: loading them from disk (and defaulting)
//! is the calling application's concern.

use std::time::Duration;

use crate::error::{Error, Result};

/// GPIO pin assignment for one HUB75 connector.
///
/// Numbers are line offsets on the GPIO chip (cdev backend) or kernel
/// GPIO numbers (sysfs backend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    /// Red data, upper half.
    pub r1: u32,
    /// Green data, upper half.
    pub g1: u32,
    /// Blue data, upper half.
    pub b1: u32,
    /// Red data, lower half.
    pub r2: u32,
    /// Green data, lower half.
    pub g2: u32,
    /// Blue data, lower half.
    pub b2: u32,
    /// Pixel clock.
    pub clk: u32,
    /// Output enable (active low).
    pub oe: u32,
    /// Latch.
    pub lat: u32,
    /// Row address bits, least significant first (A, B, C, ...).
    pub addr: Vec<u32>,
}

impl Default for PinMap {
    /// Adafruit RGB Matrix Bonnet wiring.
    fn default() -> Self {
        Self {
            r1: 5,
            g1: 13,
            b1: 6,
            r2: 12,
            g2: 16,
            b2: 23,
            clk: 17,
            oe: 4,
            lat: 21,
            addr: vec![22, 26, 27, 20],
        }
    }
}

/// How GPIO lines are acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpioBackend {
    /// `/sys/class/gpio` export/direction/value triad.
    Sysfs,
    /// Character-device line requests on a named chip.
    Cdev { chip: String },
    /// In-memory backend recording a write trace. No hardware.
    Mock,
}

impl Default for GpioBackend {
    fn default() -> Self {
        GpioBackend::Cdev {
            chip: "/dev/gpiochip0".to_string(),
        }
    }
}

/// How one scan row's data is shifted out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Software bit-banging: 6 data bits per software-timed clock edge.
    Gpio,
    /// RP1 PIO state machine streaming packed words through its FIFO.
    Pio {
        /// State machine slot (0-3).
        slot: usize,
        /// 16.8 fixed-point clock divisor.
        clock_divisor: u32,
        /// Physical base address of the PIO controller block.
        controller_base: u64,
    },
}

impl Default for ScanStrategy {
    fn default() -> Self {
        ScanStrategy::Gpio
    }
}

impl ScanStrategy {
    /// Default PIO strategy for the Raspberry Pi 5's RP1.
    pub fn pio_default() -> Self {
        ScanStrategy::Pio {
            slot: 0,
            clock_divisor: 0x1000,
            controller_base: crate::pio::PIO_BASE,
        }
    }
}

/// Full configuration for one matrix.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    /// Panel width in pixels.
    pub width: usize,
    /// Panel height in pixels. Rows are scanned in upper/lower half
    /// pairs, so `height / 2` rows are addressable.
    pub height: usize,
    /// Number of row address lines the panel decodes (A-E).
    pub address_lines: u32,
    /// Pin assignment.
    pub pins: PinMap,
    /// GPIO acquisition backend.
    pub gpio: GpioBackend,
    /// Row data strategy.
    pub strategy: ScanStrategy,
    /// Target frames per second.
    pub frame_rate: u32,
    /// Channels strictly between zero and this floor are clamped up to
    /// it before transmission.
    pub min_brightness: u8,
    /// How long each row stays lit before advancing.
    pub row_hold: Duration,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            address_lines: 4,
            pins: PinMap::default(),
            gpio: GpioBackend::default(),
            strategy: ScanStrategy::default(),
            frame_rate: 75,
            min_brightness: 51,
            row_hold: Duration::from_micros(80),
        }
    }
}

impl MatrixConfig {
    /// Number of addressable rows (each drives an upper/lower pair).
    pub fn addressable_rows(&self) -> usize {
        self.height / 2
    }

    /// Row address mask derived from the configured address-line count.
    pub fn address_mask(&self) -> usize {
        (1usize << self.address_lines) - 1
    }

    /// Duration of one frame at the target rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate
    }

    /// Checks internal consistency before any hardware is touched.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.height % 2 != 0 {
            return Err(Error::InvalidConfig(format!(
                "height must be even (rows scan in half pairs), got {}",
                self.height
            )));
        }
        if self.address_lines == 0 || self.address_lines > 5 {
            return Err(Error::InvalidConfig(format!(
                "address_lines must be 1-5, got {}",
                self.address_lines
            )));
        }
        if self.addressable_rows() > (1 << self.address_lines) {
            return Err(Error::InvalidConfig(format!(
                "{} address lines select at most {} rows, panel needs {}",
                self.address_lines,
                1 << self.address_lines,
                self.addressable_rows()
            )));
        }
        if self.pins.addr.len() != self.address_lines as usize {
            // A missing pin would silently drop an address bit and land
            // rows on the wrong panel row.
            return Err(Error::InvalidConfig(format!(
                "{} address pins assigned but {} address lines configured",
                self.pins.addr.len(),
                self.address_lines
            )));
        }
        if self.frame_rate == 0 {
            return Err(Error::InvalidConfig("frame_rate must be non-zero".into()));
        }
        if let ScanStrategy::Pio { slot, .. } = self.strategy {
            if slot >= crate::pio::NUM_STATE_MACHINES {
                return Err(Error::InvalidConfig(format!(
                    "PIO slot must be 0-{}, got {}",
                    crate::pio::NUM_STATE_MACHINES - 1,
                    slot
                )));
            }
        }
        Ok(())
    }
}
