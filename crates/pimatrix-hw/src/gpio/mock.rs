//! In-memory GPIO backend recording a write trace.
//!
//! Ships in the crate (not test-only) so host-side development and the
//! integration tests can scan frames without hardware and then decode
//! the exact pin-level sequence the engine produced.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// One recorded pin write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub pin: u32,
    pub value: u8,
}

/// Shared, ordered record of every write made through a mock chip.
#[derive(Clone, Default)]
pub struct Trace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl Trace {
    /// Snapshot of all events so far, in write order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded writes.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards the recorded events.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn record(&self, pin: u32, value: u8) {
        self.events.lock().unwrap().push(TraceEvent { pin, value });
    }
}

/// Mock chip handing out trace-recording pins.
pub struct MockChip {
    trace: Trace,
    claimed: Arc<Mutex<HashSet<u32>>>,
}

impl MockChip {
    pub fn new() -> Self {
        Self {
            trace: Trace::default(),
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The shared trace all this chip's pins write into.
    pub fn trace(&self) -> Trace {
        self.trace.clone()
    }

    /// Claims a line; a held line is busy, like the real backends.
    pub fn request(&self, pin: u32) -> Result<MockPin> {
        let mut claimed = self.claimed.lock().unwrap();
        if !claimed.insert(pin) {
            return Err(Error::PinBusy(pin));
        }
        Ok(MockPin {
            pin,
            trace: self.trace.clone(),
            claimed: self.claimed.clone(),
        })
    }
}

impl Default for MockChip {
    fn default() -> Self {
        Self::new()
    }
}

/// One claimed mock line.
pub struct MockPin {
    pin: u32,
    trace: Trace,
    claimed: Arc<Mutex<HashSet<u32>>>,
}

impl MockPin {
    pub fn set(&mut self, high: bool) -> Result<()> {
        self.trace.record(self.pin, high as u8);
        Ok(())
    }

    pub fn release(self) -> std::io::Result<()> {
        self.claimed.lock().unwrap().remove(&self.pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_preserves_write_order() {
        let chip = MockChip::new();
        let trace = chip.trace();
        let mut a = chip.request(1).unwrap();
        let mut b = chip.request(2).unwrap();

        a.set(true).unwrap();
        b.set(true).unwrap();
        a.set(false).unwrap();

        let pins: Vec<u32> = trace.events().iter().map(|e| e.pin).collect();
        assert_eq!(pins, vec![1, 2, 1]);
    }

    #[test]
    fn test_clear_resets_trace() {
        let chip = MockChip::new();
        let trace = chip.trace();
        chip.request(1).unwrap().set(true).unwrap();
        assert_eq!(trace.len(), 1);
        trace.clear();
        assert!(trace.is_empty());
    }
}
