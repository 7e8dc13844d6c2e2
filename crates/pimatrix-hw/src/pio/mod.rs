//! RP1 PIO state machine controller.
//!
//! Models the four-slot programmable I/O co-processor behind a
//! [`RegisterWindow`]. Each slot executes a small fixed instruction
//! program against an assigned pin group, with an output shift
//! register, a TX FIFO, and a fractional clock divisor.
//!
//! Register map: per-slot base = `slot * 0x40`, with the sub-offsets
//! below. Instruction memory is 32 words at window offset 0, one word
//! per 4-byte register.

pub mod program;

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};
use crate::mmio::RegisterWindow;

/// Physical base of the RP1 PIO block on the Raspberry Pi 5.
pub const PIO_BASE: u64 = 0x5020_0000;

/// Size of one PIO register block.
pub const PIO_WINDOW_SIZE: usize = 0x1000;

/// Slots per controller.
pub const NUM_STATE_MACHINES: usize = 4;

/// Instruction memory capacity in words.
pub const INSTR_CAPACITY: usize = 32;

/// Byte stride between per-slot register banks.
const SM_STRIDE: usize = 0x40;

// Per-slot register sub-offsets.
const CLKDIV: usize = 0x0c8;
const EXECCTRL: usize = 0x0cc;
const SHIFTCTRL: usize = 0x0d0;
const ADDR: usize = 0x0d4;
// Present on every slot, unused by the output-only shift program.
#[allow(dead_code)]
const INSTR: usize = 0x0d8;
const PINCTRL: usize = 0x0dc;
const FSTAT: usize = 0x0e0;
#[allow(dead_code)]
const RXF: usize = 0x0e4;
const TXF: usize = 0x0e8;

const EXECCTRL_ENABLE: u32 = 1;

/// FSTAT flags for this slot's TX FIFO.
const FSTAT_TX_FULL: u32 = 1 << 0;
const FSTAT_TX_EMPTY: u32 = 1 << 1;

/// Shift right with autopull, 32-bit threshold.
const SHIFTCTRL_OUT_RIGHT_AUTOPULL: u32 = 0x8000_0000;

// PINCTRL field positions.
const PINCTRL_OUT_BASE_SHIFT: u32 = 0;
const PINCTRL_SIDESET_BASE_SHIFT: u32 = 10;
const PINCTRL_OUT_COUNT_SHIFT: u32 = 20;
const PINCTRL_SIDESET_COUNT_SHIFT: u32 = 29;

/// How often `put` polls FSTAT while the FIFO is full.
const FIFO_POLL: Duration = Duration::from_micros(100);

/// OUT pin group and side-set assignment for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinGroup {
    /// First OUT pin.
    pub out_base: u32,
    /// Number of consecutive OUT pins (1-32).
    pub out_count: u32,
    /// Single side-set pin (the pixel clock for HUB75).
    pub side_set_base: u32,
}

impl PinGroup {
    /// Derives the packed PINCTRL word. Always computed from the
    /// fields, never hand-assembled at call sites.
    fn pinctrl_word(&self) -> u32 {
        (self.out_base << PINCTRL_OUT_BASE_SHIFT)
            | (self.side_set_base << PINCTRL_SIDESET_BASE_SHIFT)
            | (self.out_count << PINCTRL_OUT_COUNT_SHIFT)
            | (1 << PINCTRL_SIDESET_COUNT_SHIFT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SmState {
    Idle,
    Configured,
    Running,
    Stopped,
}

impl SmState {
    fn name(self) -> &'static str {
        match self {
            SmState::Idle => "idle",
            SmState::Configured => "configured",
            SmState::Running => "running",
            SmState::Stopped => "stopped",
        }
    }
}

/// One PIO state machine slot, owning the controller's register window.
pub struct StateMachine {
    window: RegisterWindow,
    slot: usize,
    state: SmState,
}

impl StateMachine {
    /// Wraps an already-mapped register window.
    pub fn new(window: RegisterWindow, slot: usize) -> Result<Self> {
        if slot >= NUM_STATE_MACHINES {
            return Err(Error::InvalidConfig(format!(
                "state machine slot must be 0-{}, got {}",
                NUM_STATE_MACHINES - 1,
                slot
            )));
        }
        Ok(Self {
            window,
            slot,
            state: SmState::Idle,
        })
    }

    /// Maps the controller's register block and claims `slot`.
    pub fn open(controller_base: u64, slot: usize) -> Result<Self> {
        let window = RegisterWindow::map(controller_base, PIO_WINDOW_SIZE)?;
        Self::new(window, slot)
    }

    /// The slot index (0-3).
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_running(&self) -> bool {
        self.state == SmState::Running
    }

    fn reg(&self, sub_offset: usize) -> usize {
        self.slot * SM_STRIDE + sub_offset
    }

    fn require_not_running(&self, required: &'static str) -> Result<()> {
        if self.state == SmState::Running {
            return Err(Error::InvalidState {
                sm: self.slot,
                state: self.state.name(),
                required,
            });
        }
        Ok(())
    }

    /// Writes the program into instruction memory.
    pub fn load_program(&mut self, words: &[u16]) -> Result<()> {
        self.require_not_running("not running")?;
        if words.len() > INSTR_CAPACITY {
            return Err(Error::ProgramTooLarge {
                len: words.len(),
                capacity: INSTR_CAPACITY,
            });
        }
        for (i, &word) in words.iter().enumerate() {
            self.window.write32(i * 4, u32::from(word))?;
        }
        debug!("loaded {} word program into slot {}", words.len(), self.slot);
        Ok(())
    }

    /// Configures pins, clocking and shift behavior, and resets the
    /// program counter. Fails with `InvalidState` while running.
    pub fn configure(&mut self, pins: PinGroup, clock_divisor: u32) -> Result<()> {
        self.require_not_running("idle, configured or stopped")?;

        self.window.write32(self.reg(PINCTRL), pins.pinctrl_word())?;
        self.window.write32(self.reg(CLKDIV), clock_divisor)?;
        self.window
            .write32(self.reg(SHIFTCTRL), SHIFTCTRL_OUT_RIGHT_AUTOPULL)?;
        self.window.write32(self.reg(ADDR), 0)?;

        self.state = SmState::Configured;
        debug!(
            "configured slot {}: out {}+{}, side-set {}, clkdiv {:#x}",
            self.slot, pins.out_base, pins.out_count, pins.side_set_base, clock_divisor
        );
        Ok(())
    }

    /// Starts execution.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SmState::Configured | SmState::Stopped => {
                self.window.write32(self.reg(EXECCTRL), EXECCTRL_ENABLE)?;
                self.state = SmState::Running;
                debug!("started state machine {}", self.slot);
                Ok(())
            }
            SmState::Running => Ok(()),
            SmState::Idle => Err(Error::InvalidState {
                sm: self.slot,
                state: self.state.name(),
                required: "configured",
            }),
        }
    }

    /// Halts execution. Callable in any state and idempotent; leaves
    /// program memory and the FIFO untouched.
    pub fn stop(&mut self) -> Result<()> {
        self.window.write32(self.reg(EXECCTRL), 0)?;
        if self.state == SmState::Running {
            self.state = SmState::Stopped;
            debug!("stopped state machine {}", self.slot);
        }
        Ok(())
    }

    /// Pushes one word into the TX FIFO, polling for space up to
    /// `timeout`. A timeout is flow-control backpressure, reported as
    /// the recoverable [`Error::FifoTimeout`], never a device fault.
    pub fn put(&mut self, word: u32, timeout: Duration) -> Result<()> {
        if self.state != SmState::Running {
            return Err(Error::InvalidState {
                sm: self.slot,
                state: self.state.name(),
                required: "running",
            });
        }

        let deadline = Instant::now() + timeout;
        while self.is_full()? {
            if Instant::now() >= deadline {
                return Err(Error::FifoTimeout {
                    sm: self.slot,
                    timeout,
                });
            }
            std::thread::sleep(FIFO_POLL);
        }

        self.window.write32(self.reg(TXF), word)
    }

    /// Waits for the TX FIFO to drain, polling up to `timeout`. Used
    /// between a row's last word and the latch, so the latch never
    /// captures a row the slot is still shifting.
    pub fn drain(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.is_empty()? {
            if Instant::now() >= deadline {
                return Err(Error::FifoTimeout {
                    sm: self.slot,
                    timeout,
                });
            }
            std::thread::sleep(FIFO_POLL);
        }
        Ok(())
    }

    /// Point-in-time TX-full check. Racy; coarse flow control only.
    pub fn is_full(&self) -> Result<bool> {
        Ok(self.window.read32(self.reg(FSTAT))? & FSTAT_TX_FULL != 0)
    }

    /// Point-in-time TX-empty check. Racy; coarse flow control only.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.window.read32(self.reg(FSTAT))? & FSTAT_TX_EMPTY != 0)
    }
}
