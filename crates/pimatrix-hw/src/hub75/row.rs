//! Per-row data derivation: address masking, brightness floor, and
//! 6-bit pixel packing.

use crate::framebuffer::FrameBuffer;

/// Data for one addressable scan row. Ephemeral; derived from the
/// frame snapshot, consumed by one scan pass.
pub struct RowDescriptor {
    /// Addressable row index.
    pub row: usize,
    /// Address value after masking to the configured line count.
    pub addr: usize,
    /// One packed group per pixel clock: bit 0 = R1, 1 = G1, 2 = B1,
    /// 3 = R2, 4 = G2, 5 = B2.
    pub bits: Vec<u8>,
}

/// Clamps a channel strictly between zero and the floor up to the
/// floor. True black stays black; this compensates for (not solves)
/// the single-bit depth of the panel data pins.
pub fn apply_floor(value: u8, floor: u8) -> u8 {
    if value > 0 && value < floor {
        floor
    } else {
        value
    }
}

/// Derives one row's descriptor from a frame snapshot. The row drives
/// an upper/lower half pair: pixel rows `row` and `row + height/2`.
pub fn pack_row(frame: &FrameBuffer, row: usize, addr_mask: usize, floor: u8) -> RowDescriptor {
    let half = frame.height() / 2;
    let mut bits = Vec::with_capacity(frame.width());
    for x in 0..frame.width() {
        let upper = frame.pixel(x, row).unwrap_or([0, 0, 0]);
        let lower = frame.pixel(x, row + half).unwrap_or([0, 0, 0]);

        let mut group = 0u8;
        for (i, &channel) in upper.iter().chain(lower.iter()).enumerate() {
            if apply_floor(channel, floor) > 0 {
                group |= 1 << i;
            }
        }
        bits.push(group);
    }
    RowDescriptor {
        row,
        addr: row & addr_mask,
        bits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_floor() {
        assert_eq!(apply_floor(0, 51), 0);
        assert_eq!(apply_floor(1, 51), 51);
        assert_eq!(apply_floor(50, 51), 51);
        assert_eq!(apply_floor(51, 51), 51);
        assert_eq!(apply_floor(200, 51), 200);
    }

    #[test]
    fn test_pack_row_half_pairing() {
        let mut frame = FrameBuffer::new(4, 8);
        // Upper half: red at (0, 1). Lower half: blue at (0, 5).
        frame.set_pixel(0, 1, [255, 0, 0]);
        frame.set_pixel(0, 5, [0, 0, 255]);

        let desc = pack_row(&frame, 1, 0x0F, 51);
        assert_eq!(desc.addr, 1);
        // R1 (bit 0) and B2 (bit 5).
        assert_eq!(desc.bits[0], 0b10_0001);
        assert_eq!(desc.bits[1], 0);
        assert_eq!(desc.bits.len(), 4);
    }

    #[test]
    fn test_address_masked_to_line_count() {
        let frame = FrameBuffer::new(2, 4);
        assert_eq!(pack_row(&frame, 9, 0x07, 0).addr, 1);
        assert_eq!(pack_row(&frame, 9, 0x1F, 0).addr, 9);
    }

    #[test]
    fn test_floor_does_not_invent_light() {
        let mut frame = FrameBuffer::new(1, 2);
        frame.set_pixel(0, 0, [0, 0, 0]);
        let desc = pack_row(&frame, 0, 0x0F, 200);
        assert_eq!(desc.bits[0], 0);
    }
}
