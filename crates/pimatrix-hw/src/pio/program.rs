//! The HUB75 shift program.
//!
//! Assembly (one side-set bit, driving the pixel clock):
//!
//! ```text
//! loop:
//!     out pins, 6   side 0   ; R1,G1,B1,R2,G2,B2, clock low
//!     nop           side 1   ; clock high, panel samples the data
//!     jmp loop      side 0   ; clock low again
//! ```

use crate::config::PinMap;
use crate::pio::PinGroup;

/// Machine code for the loop above.
pub const HUB75_PROGRAM: [u16; 3] = [
    0x6003, // out pins, 6   side 0
    0xA042, // nop           side 1
    0x0001, // jmp loop      side 0
];

/// Data bits shifted per pixel clock.
pub const BITS_PER_CLOCK: u32 = 6;

/// Pin group for the HUB75 program: the six data pins as OUT pins
/// starting at R1, the clock on side-set. The wiring must place
/// R1,G1,B1,R2,G2,B2 on consecutive offsets for the hardware path.
pub fn hub75_pin_group(pins: &PinMap) -> PinGroup {
    PinGroup {
        out_base: pins.r1,
        out_count: BITS_PER_CLOCK,
        side_set_base: pins.clk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_fits_instruction_memory() {
        assert!(HUB75_PROGRAM.len() <= crate::pio::INSTR_CAPACITY);
    }

    #[test]
    fn test_pin_group_from_map() {
        let pins = PinMap::default();
        let group = hub75_pin_group(&pins);
        assert_eq!(group.out_base, pins.r1);
        assert_eq!(group.out_count, 6);
        assert_eq!(group.side_set_base, pins.clk);
    }
}
