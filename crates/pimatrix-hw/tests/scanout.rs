//! End-to-end scan-out properties, checked against the write trace the
//! mock GPIO backend records.

use std::collections::HashMap;

use pimatrix_hw::gpio::TraceEvent;
use pimatrix_hw::{FrameBuffer, Hub75Engine, MatrixConfig, PinMap};

/// Decoded pin-level activity for one scanned row.
struct RowTrace {
    /// Final level of each address pin, in pin-map order.
    addr_bits: Vec<u8>,
    /// One 6-bit group per clock rising edge:
    /// bit 0 = R1, 1 = G1, 2 = B1, 3 = R2, 4 = G2, 5 = B2.
    pixels: Vec<u8>,
    /// Event indices (within the row) of the latch rising edge, the
    /// latch falling edge, the last clock rising edge, and the final
    /// output-enable assertion.
    latch_rise: Option<usize>,
    latch_fall: Option<usize>,
    last_clock: Option<usize>,
    output_on: Option<usize>,
}

/// Splits the trace into rows (each row starts with OE driven high)
/// and reconstructs what the panel would have seen.
fn decode_rows(events: &[TraceEvent], pins: &PinMap) -> Vec<RowTrace> {
    let data_pins = [pins.r1, pins.g1, pins.b1, pins.r2, pins.g2, pins.b2];
    let mut levels: HashMap<u32, u8> = HashMap::new();
    let mut rows: Vec<RowTrace> = Vec::new();
    let mut current: Option<RowTrace> = None;
    let mut index_in_row = 0usize;

    for event in events {
        let rising = event.value == 1 && levels.get(&event.pin).copied().unwrap_or(0) == 0;
        levels.insert(event.pin, event.value);

        if event.pin == pins.oe && event.value == 1 {
            if let Some(row) = current.take() {
                rows.push(row);
            }
            current = Some(RowTrace {
                addr_bits: vec![0; pins.addr.len()],
                pixels: Vec::new(),
                latch_rise: None,
                latch_fall: None,
                last_clock: None,
                output_on: None,
            });
            index_in_row = 0;
            continue;
        }

        let Some(row) = current.as_mut() else {
            continue;
        };
        index_in_row += 1;

        if let Some(bit) = pins.addr.iter().position(|&p| p == event.pin) {
            row.addr_bits[bit] = event.value;
        } else if event.pin == pins.clk && rising {
            let mut group = 0u8;
            for (bit, &pin) in data_pins.iter().enumerate() {
                group |= levels.get(&pin).copied().unwrap_or(0) << bit;
            }
            row.pixels.push(group);
            row.last_clock = Some(index_in_row);
        } else if event.pin == pins.lat && event.value == 1 {
            row.latch_rise = Some(index_in_row);
        } else if event.pin == pins.lat && event.value == 0 {
            row.latch_fall = Some(index_in_row);
        } else if event.pin == pins.oe && event.value == 0 {
            row.output_on = Some(index_in_row);
        }
    }
    if let Some(row) = current.take() {
        rows.push(row);
    }
    rows
}

fn addr_value(row: &RowTrace) -> usize {
    row.addr_bits
        .iter()
        .enumerate()
        .map(|(bit, &v)| (v as usize) << bit)
        .sum()
}

/// 64x32 panel with five address lines, as wired on the bonnet.
fn panel_config() -> MatrixConfig {
    let mut cfg = MatrixConfig {
        width: 64,
        height: 32,
        address_lines: 5,
        ..Default::default()
    };
    cfg.pins.addr = vec![22, 26, 27, 20, 24];
    cfg
}

#[test]
fn address_bits_follow_row_index_for_all_rows() {
    let cfg = panel_config();
    let (mut engine, trace) = Hub75Engine::with_mock(&cfg).unwrap();
    let frame = FrameBuffer::new(64, 32);
    engine.render_frame(&frame).unwrap();

    let rows = decode_rows(&trace.events(), &cfg.pins);
    assert_eq!(rows.len(), 16);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(addr_value(row), i & 0x1F, "row {i}");
    }
}

#[test]
fn output_enable_never_overlaps_address_or_data_writes() {
    let cfg = panel_config();
    let (mut engine, trace) = Hub75Engine::with_mock(&cfg).unwrap();
    let mut frame = FrameBuffer::new(64, 32);
    frame.fill([255, 255, 255]);
    engine.render_frame(&frame).unwrap();

    let pins = &cfg.pins;
    let mut guarded: Vec<u32> = vec![pins.r1, pins.g1, pins.b1, pins.r2, pins.g2, pins.b2];
    guarded.extend(&pins.addr);

    // OE is active low: value 0 enables the drivers. No guarded pin
    // may change while output is enabled.
    let mut oe_level = 1u8;
    for event in trace.events() {
        if event.pin == pins.oe {
            oe_level = event.value;
        } else if guarded.contains(&event.pin) {
            assert_eq!(
                oe_level, 1,
                "pin {} written while output enabled",
                event.pin
            );
        }
    }
}

#[test]
fn checkerboard_round_trips_through_the_scan() {
    let cfg = panel_config();
    let (mut engine, trace) = Hub75Engine::with_mock(&cfg).unwrap();

    let mut frame = FrameBuffer::new(64, 32);
    for y in 0..32 {
        for x in 0..64 {
            if (x + y) % 2 == 0 {
                frame.set_pixel(x, y, [255, 255, 255]);
            }
        }
    }
    engine.render_frame(&frame).unwrap();

    let rows = decode_rows(&trace.events(), &cfg.pins);
    assert_eq!(rows.len(), 16);
    for (r, row) in rows.iter().enumerate() {
        assert_eq!(row.pixels.len(), 64, "row {r}");
        for (x, &group) in row.pixels.iter().enumerate() {
            let upper_on = (x + r) % 2 == 0;
            let lower_on = (x + r + 16) % 2 == 0;
            let expected = if upper_on { 0b000_111 } else { 0 } | if lower_on { 0b111_000 } else { 0 };
            assert_eq!(group, expected, "row {r} pixel {x}");
        }
    }
}

#[test]
fn solid_red_at_the_floor_produces_the_canonical_row_sequence() {
    let cfg = panel_config();
    let floor = cfg.min_brightness;
    let (mut engine, trace) = Hub75Engine::with_mock(&cfg).unwrap();

    let mut frame = FrameBuffer::new(64, 32);
    frame.fill([floor, 0, 0]);
    engine.render_frame(&frame).unwrap();

    let rows = decode_rows(&trace.events(), &cfg.pins);
    assert_eq!(rows.len(), 16);
    for (r, row) in rows.iter().enumerate() {
        // Address bits equal row & 0x1F.
        assert_eq!(addr_value(row), r & 0x1F, "row {r}");

        // 64 pixel clocks, each asserting only the red bit for both
        // halves.
        assert_eq!(row.pixels.len(), 64, "row {r}");
        for &group in &row.pixels {
            assert_eq!(group, 0b001_001, "row {r}");
        }

        // Latch pulses after the last clock, output re-enabled last.
        let last_clock = row.last_clock.expect("clock edges");
        let latch_rise = row.latch_rise.expect("latch rise");
        let latch_fall = row.latch_fall.expect("latch fall");
        let output_on = row.output_on.expect("output re-enable");
        assert!(last_clock < latch_rise, "row {r}");
        assert!(latch_rise < latch_fall, "row {r}");
        assert!(latch_fall < output_on, "row {r}");
    }
}

#[test]
fn dim_channels_are_lifted_to_the_brightness_floor() {
    let cfg = panel_config();
    let (mut engine, trace) = Hub75Engine::with_mock(&cfg).unwrap();

    // Below the floor but non-zero: still transmitted as lit.
    let mut frame = FrameBuffer::new(64, 32);
    frame.fill([1, 0, 0]);
    engine.render_frame(&frame).unwrap();

    let rows = decode_rows(&trace.events(), &cfg.pins);
    for row in &rows {
        for &group in &row.pixels {
            assert_eq!(group, 0b001_001);
        }
    }
}

#[test]
fn unwired_address_bit_is_rejected_at_build_time() {
    // Five address lines but only four wired pins: rows 16-31 would
    // scan out with their high address bit silently dropped.
    let mut cfg = panel_config();
    cfg.pins.addr.truncate(4);
    assert!(Hub75Engine::with_mock(&cfg).is_err());
}

#[test]
fn out_of_range_row_rejected_before_any_pin_write() {
    let cfg = panel_config();
    let (mut engine, trace) = Hub75Engine::with_mock(&cfg).unwrap();
    let frame = FrameBuffer::new(64, 32);

    let err = engine.scan_row(&frame, 32).unwrap_err();
    assert!(matches!(
        err,
        pimatrix_hw::Error::RowOutOfRange { row: 32, rows: 32 }
    ));
    assert!(trace.is_empty());
}
