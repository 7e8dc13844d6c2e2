//! RGB frame buffers and the double-buffer swap seam.

use std::sync::Mutex;

/// One RGB pixel.
pub type Rgb = [u8; 3];

/// A width x height grid of 3-channel pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<Rgb>,
    width: usize,
    height: usize,
}

impl FrameBuffer {
    /// Creates a buffer initialized to black.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![[0, 0, 0]; width * height],
            width,
            height,
        }
    }

    /// Returns the width of the buffer.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the buffer.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Clears the buffer to black.
    pub fn clear(&mut self) {
        self.data.fill([0, 0, 0]);
    }

    /// Fills the buffer with a solid color.
    pub fn fill(&mut self, color: Rgb) {
        self.data.fill(color);
    }

    /// Sets a pixel. Out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = color;
        }
    }

    /// Gets a pixel, or `None` out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    /// Fills a rectangle, clipped to the buffer.
    pub fn fill_rect(&mut self, x: usize, y: usize, width: usize, height: usize, color: Rgb) {
        for dy in 0..height {
            for dx in 0..width {
                self.set_pixel(x + dx, y + dy, color);
            }
        }
    }

    /// Returns a reference to the raw pixel data.
    pub fn data(&self) -> &[Rgb] {
        &self.data
    }
}

/// Double-buffer handoff between a frame producer and the scan-out
/// engine.
///
/// Exactly two long-lived buffers exist per matrix: the engine
/// privately owns "display"; this type holds "next". The producer
/// copies a finished frame in with [`publish`](Self::publish); the
/// engine swaps it into its display buffer with
/// [`take_into`](Self::take_into), only ever at a whole-frame
/// boundary. A producer can therefore never tear a row mid-scan.
pub struct FramePair {
    next: Mutex<PendingFrame>,
}

struct PendingFrame {
    buffer: FrameBuffer,
    dirty: bool,
}

impl FramePair {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            next: Mutex::new(PendingFrame {
                buffer: FrameBuffer::new(width, height),
                dirty: false,
            }),
        }
    }

    /// Publishes a finished frame, replacing any not-yet-displayed one.
    ///
    /// Panics if the frame's dimensions differ from the pair's.
    pub fn publish(&self, frame: &FrameBuffer) {
        let mut next = self.next.lock().unwrap();
        assert!(
            frame.width == next.buffer.width && frame.height == next.buffer.height,
            "published frame is {}x{}, pair holds {}x{}",
            frame.width,
            frame.height,
            next.buffer.width,
            next.buffer.height,
        );
        next.buffer.data.copy_from_slice(&frame.data);
        next.dirty = true;
    }

    /// Swaps a published frame into `display`, if one is pending.
    /// Returns whether the display buffer changed.
    pub fn take_into(&self, display: &mut FrameBuffer) -> bool {
        let mut next = self.next.lock().unwrap();
        if !next.dirty {
            return false;
        }
        std::mem::swap(&mut next.buffer, display);
        next.dirty = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framebuffer_ops() {
        let mut fb = FrameBuffer::new(64, 32);
        assert_eq!(fb.width(), 64);
        assert_eq!(fb.height(), 32);

        fb.set_pixel(10, 20, [255, 0, 0]);
        assert_eq!(fb.pixel(10, 20), Some([255, 0, 0]));
        assert_eq!(fb.pixel(64, 0), None);

        fb.fill([0, 0, 255]);
        assert_eq!(fb.pixel(0, 0), Some([0, 0, 255]));

        fb.clear();
        assert_eq!(fb.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut fb = FrameBuffer::new(8, 8);
        fb.fill_rect(6, 6, 4, 4, [1, 2, 3]);
        assert_eq!(fb.pixel(7, 7), Some([1, 2, 3]));
        assert_eq!(fb.pixel(5, 5), Some([0, 0, 0]));
    }

    #[test]
    fn test_frame_pair_swap_at_boundary() {
        let pair = FramePair::new(4, 4);
        let mut display = FrameBuffer::new(4, 4);

        // Nothing published yet.
        assert!(!pair.take_into(&mut display));

        let mut frame = FrameBuffer::new(4, 4);
        frame.set_pixel(1, 1, [9, 9, 9]);
        pair.publish(&frame);

        assert!(pair.take_into(&mut display));
        assert_eq!(display.pixel(1, 1), Some([9, 9, 9]));

        // Consumed: a second take is a no-op.
        assert!(!pair.take_into(&mut display));
    }

    #[test]
    #[should_panic(expected = "published frame is 4x2, pair holds 2x2")]
    fn test_publish_rejects_mismatched_dimensions() {
        let pair = FramePair::new(2, 2);
        pair.publish(&FrameBuffer::new(4, 2));
    }

    #[test]
    fn test_publish_overwrites_pending() {
        let pair = FramePair::new(2, 2);
        let mut display = FrameBuffer::new(2, 2);

        let mut a = FrameBuffer::new(2, 2);
        a.fill([1, 1, 1]);
        pair.publish(&a);

        let mut b = FrameBuffer::new(2, 2);
        b.fill([2, 2, 2]);
        pair.publish(&b);

        assert!(pair.take_into(&mut display));
        assert_eq!(display.pixel(0, 0), Some([2, 2, 2]));
    }
}
