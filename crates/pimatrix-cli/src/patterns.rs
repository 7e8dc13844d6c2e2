//! Test-pattern frame producers.

use clap::ValueEnum;
use pimatrix_hw::FrameBuffer;

/// Built-in test patterns for bring-up and wiring checks.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Pattern {
    /// Solid fill cycling red, green, blue, white
    #[default]
    Solid,
    /// Horizontal brightness ramp, scrolling one pixel per tick
    Gradient,
    /// Period-2 checkerboard, inverting every tick
    Checkerboard,
}

impl Pattern {
    /// Renders one animation tick into the buffer.
    pub fn render(&self, frame: &mut FrameBuffer, tick: u64) {
        match self {
            Pattern::Solid => {
                const COLORS: [[u8; 3]; 4] =
                    [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 255]];
                frame.fill(COLORS[(tick / 30) as usize % COLORS.len()]);
            }
            Pattern::Gradient => {
                let width = frame.width();
                let height = frame.height();
                for y in 0..height {
                    for x in 0..width {
                        let phase = (x + tick as usize) % width;
                        let level = (phase * 255 / width.max(1)) as u8;
                        frame.set_pixel(x, y, [level, level, level]);
                    }
                }
            }
            Pattern::Checkerboard => {
                let parity = (tick % 2) as usize;
                let width = frame.width();
                let height = frame.height();
                for y in 0..height {
                    for x in 0..width {
                        let on = (x + y + parity) % 2 == 0;
                        let color = if on { [255, 255, 255] } else { [0, 0, 0] };
                        frame.set_pixel(x, y, color);
                    }
                }
            }
        }
    }
}
