//! pimatrix hardware library
//!
//! Drives HUB75-interface RGB LED matrix panels from a Raspberry Pi 5,
//! turning an application-supplied pixel buffer into precisely timed
//! electrical signals. Two scan-out paths share one engine: software
//! bit-banging over GPIO lines, and FIFO streaming through an RP1 PIO
//! state machine.

pub mod config;
pub mod error;
pub mod framebuffer;
pub mod gpio;
pub mod hub75;
pub mod mmio;
pub mod pio;

pub use config::{GpioBackend, MatrixConfig, PinMap, ScanStrategy};
pub use error::{Error, Result};
pub use framebuffer::{FrameBuffer, FramePair, Rgb};
pub use hub75::Hub75Engine;
