//! HUB75 scan-out engine.
//!
//! Renders frame snapshots by visiting every addressable row exactly
//! once, in strict per-row order: disable output, set address bits,
//! shift the row's data, latch, re-enable output, hold. Output enable
//! stays inactive for the whole address/data/latch window; violating
//! that order is the classic ghosting defect this module guards
//! against.

pub mod row;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{GpioBackend, MatrixConfig, ScanStrategy};
use crate::error::{Error, Result};
use crate::framebuffer::{FrameBuffer, FramePair};
use crate::gpio::{Chip, Pin, Trace};
use crate::pio::{program, StateMachine};

use row::RowDescriptor;

/// Latch hold time; one microsecond is ample for HUB75 driver chips.
const LATCH_PULSE: Duration = Duration::from_micros(1);

/// Bound on FIFO backpressure inside a row.
const FIFO_PUT_TIMEOUT: Duration = Duration::from_millis(100);

/// The single "drive one scan row" capability, in its two variants.
enum RowDriver {
    /// Software path: six data pins plus a software-timed clock.
    BitBang { data: [Pin; 6], clk: Pin },
    /// Hardware path: a running PIO state machine shifts the data and
    /// drives the clock from its side-set pin.
    Fifo { sm: StateMachine },
}

/// Drives one matrix from a single sequencing thread.
pub struct Hub75Engine {
    cfg: MatrixConfig,
    oe: Pin,
    lat: Pin,
    addr: Vec<Pin>,
    driver: RowDriver,
    /// Set while OE is inactive; data-pin changes are only legal then.
    output_disabled: bool,
    first_render: bool,
    torn_down: bool,
}

impl Hub75Engine {
    /// Opens pins and registers per the configuration and builds the
    /// engine. Everything acquired is released again on any error path
    /// (pins release on drop).
    pub fn new(cfg: &MatrixConfig) -> Result<Self> {
        cfg.validate()?;
        let chip = Chip::open(&cfg.gpio)?;
        Self::build(cfg.clone(), &chip)
    }

    /// Builds a bit-banging engine on the mock GPIO backend and hands
    /// back its write trace. Host-side testing only.
    pub fn with_mock(cfg: &MatrixConfig) -> Result<(Self, Trace)> {
        let mut cfg = cfg.clone();
        cfg.gpio = GpioBackend::Mock;
        cfg.strategy = ScanStrategy::Gpio;
        cfg.row_hold = Duration::ZERO;
        cfg.validate()?;

        let chip = Chip::open(&cfg.gpio)?;
        let trace = chip.trace().expect("mock chip always has a trace");
        let engine = Self::build(cfg, &chip)?;
        Ok((engine, trace))
    }

    fn build(cfg: MatrixConfig, chip: &Chip) -> Result<Self> {
        let oe = chip.request(cfg.pins.oe)?;
        let lat = chip.request(cfg.pins.lat)?;
        let addr = cfg
            .pins
            .addr
            .iter()
            .map(|&pin| chip.request(pin))
            .collect::<Result<Vec<_>>>()?;

        let driver = match cfg.strategy {
            ScanStrategy::Gpio => {
                let p = &cfg.pins;
                let data = [
                    chip.request(p.r1)?,
                    chip.request(p.g1)?,
                    chip.request(p.b1)?,
                    chip.request(p.r2)?,
                    chip.request(p.g2)?,
                    chip.request(p.b2)?,
                ];
                let clk = chip.request(p.clk)?;
                RowDriver::BitBang { data, clk }
            }
            ScanStrategy::Pio {
                slot,
                clock_divisor,
                controller_base,
            } => {
                let mut sm = StateMachine::open(controller_base, slot)?;
                sm.load_program(&program::HUB75_PROGRAM)?;
                sm.configure(program::hub75_pin_group(&cfg.pins), clock_divisor)?;
                sm.start()?;
                RowDriver::Fifo { sm }
            }
        };

        info!(
            "HUB75 engine ready: {}x{} panel, {} addressable rows, {} path",
            cfg.width,
            cfg.height,
            cfg.addressable_rows(),
            match driver {
                RowDriver::BitBang { .. } => "GPIO",
                RowDriver::Fifo { .. } => "PIO",
            }
        );

        Ok(Self {
            cfg,
            oe,
            lat,
            addr,
            driver,
            output_disabled: false,
            first_render: false,
            torn_down: false,
        })
    }

    /// The configuration this engine was built from.
    pub fn config(&self) -> &MatrixConfig {
        &self.cfg
    }

    /// Scans one frame snapshot out to the panel, then sleeps whatever
    /// remains of the frame period so cadence stays constant regardless
    /// of render latency.
    pub fn render_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        if !self.first_render {
            info!("starting to render frames to the matrix");
            self.first_render = true;
        }

        let frame_start = Instant::now();
        for r in 0..self.cfg.addressable_rows() {
            self.scan_row(frame, r).map_err(|e| Error::Row {
                row: r,
                source: Box::new(e),
            })?;
        }

        let period = self.cfg.frame_period();
        let elapsed = frame_start.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        }
        Ok(())
    }

    /// Drives one addressable row, in strict order. Any pin or FIFO
    /// failure aborts the row; there is no mid-row retry, because a
    /// retry would re-order the address/data/latch steps.
    pub fn scan_row(&mut self, frame: &FrameBuffer, row: usize) -> Result<()> {
        let rows = 1usize << self.cfg.address_lines;
        if row >= rows {
            // Rejected before any pin is touched.
            return Err(Error::RowOutOfRange { row, rows });
        }

        let desc = row::pack_row(
            frame,
            row,
            self.cfg.address_mask(),
            self.cfg.min_brightness,
        );

        // Output off for the whole address/data/latch window.
        self.oe.set(true)?;
        self.output_disabled = true;

        // Every address bit written individually, before any data pin
        // changes.
        for (bit, pin) in self.addr.iter_mut().enumerate() {
            pin.set((desc.addr >> bit) & 1 != 0)?;
        }

        self.shift_row(&desc)?;

        self.lat.pulse(LATCH_PULSE)?;

        self.output_disabled = false;
        self.oe.set(false)?;

        if !self.cfg.row_hold.is_zero() {
            std::thread::sleep(self.cfg.row_hold);
        }
        Ok(())
    }

    /// Shifts one row's packed data: one 6-bit group per pixel clock.
    fn shift_row(&mut self, desc: &RowDescriptor) -> Result<()> {
        if !self.output_disabled {
            return Err(Error::ProtocolViolation(
                "row data shifted while output enabled",
            ));
        }
        match &mut self.driver {
            RowDriver::BitBang { data, clk } => {
                for &group in &desc.bits {
                    for (bit, pin) in data.iter_mut().enumerate() {
                        pin.set((group >> bit) & 1 != 0)?;
                    }
                    clk.set(true)?;
                    clk.set(false)?;
                }
            }
            RowDriver::Fifo { sm } => {
                for &group in &desc.bits {
                    sm.put(u32::from(group), FIFO_PUT_TIMEOUT)?;
                }
                // The slot must finish shifting before the latch fires.
                sm.drain(FIFO_PUT_TIMEOUT)?;
            }
        }
        Ok(())
    }

    /// Sequencing-thread loop: swap in a published frame at each frame
    /// boundary, scan it, repeat until the cancellation flag is set.
    /// Recoverable errors skip the frame (logged, never silent); fatal
    /// errors tear the engine down and propagate.
    pub fn run(&mut self, frames: &FramePair, shutdown: &AtomicBool) -> Result<()> {
        let mut display = FrameBuffer::new(self.cfg.width, self.cfg.height);
        while !shutdown.load(Ordering::Relaxed) {
            frames.take_into(&mut display);
            match self.render_frame(&display) {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("skipping frame: {}", e);
                }
                Err(e) => {
                    self.teardown();
                    return Err(e);
                }
            }
        }
        self.teardown();
        Ok(())
    }

    /// Ordered teardown: output off, state machine stopped, then every
    /// GPIO line released. Each step is attempted even if an earlier
    /// one failed.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("shutting down scan-out");

        if let Err(e) = self.oe.set(true) {
            warn!("failed to disable output during teardown: {}", e);
        }
        if let RowDriver::Fifo { sm } = &mut self.driver {
            if let Err(e) = sm.stop() {
                warn!("failed to stop state machine {}: {}", sm.slot(), e);
            }
        }

        // Pin release is itself best-effort and idempotent.
        self.oe.release();
        self.lat.release();
        for pin in &mut self.addr {
            pin.release();
        }
        if let RowDriver::BitBang { data, clk } = &mut self.driver {
            for pin in data.iter_mut() {
                pin.release();
            }
            clk.release();
        }
    }
}

impl Drop for Hub75Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}
