//! On-disk configuration.
//!
//! TOML structures are kept separate from [`MatrixConfig`] so the file
//! format can stay stable while the hardware types evolve. Unknown
//! fields are rejected; a typoed pin name silently falling back to a
//! default would be miserable to debug at the wiring level.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use pimatrix_hw::{GpioBackend, MatrixConfig, PinMap, ScanStrategy};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Panel geometry and timing.
    #[serde(default)]
    pub panel: PanelConfig,

    /// GPIO pin assignment.
    #[serde(default)]
    pub pins: PinsConfig,

    /// GPIO acquisition backend.
    #[serde(default)]
    pub gpio: GpioConfig,

    /// PIO scan-out. Present selects the hardware path; absent means
    /// software bit-banging.
    pub pio: Option<PioConfig>,
}

/// Panel geometry and timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConfig {
    /// Panel width in pixels
    #[serde(default = "default_width")]
    pub width: usize,

    /// Panel height in pixels
    #[serde(default = "default_height")]
    pub height: usize,

    /// Row address lines the panel decodes (A-E)
    #[serde(default = "default_address_lines")]
    pub address_lines: u32,

    /// Target frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Brightness floor: channels between zero and this are clamped up
    #[serde(default = "default_min_brightness")]
    pub min_brightness: u8,

    /// Per-row lit time in microseconds
    #[serde(default = "default_row_hold_us")]
    pub row_hold_us: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            address_lines: default_address_lines(),
            frame_rate: default_frame_rate(),
            min_brightness: default_min_brightness(),
            row_hold_us: default_row_hold_us(),
        }
    }
}

/// GPIO pin assignment. Defaults match the Adafruit RGB Matrix Bonnet.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinsConfig {
    #[serde(default = "default_r1")]
    pub r1: u32,
    #[serde(default = "default_g1")]
    pub g1: u32,
    #[serde(default = "default_b1")]
    pub b1: u32,
    #[serde(default = "default_r2")]
    pub r2: u32,
    #[serde(default = "default_g2")]
    pub g2: u32,
    #[serde(default = "default_b2")]
    pub b2: u32,
    #[serde(default = "default_clk")]
    pub clk: u32,
    #[serde(default = "default_oe")]
    pub oe: u32,
    #[serde(default = "default_lat")]
    pub lat: u32,
    /// Address bits, least significant first
    #[serde(default = "default_addr")]
    pub addr: Vec<u32>,
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self {
            r1: default_r1(),
            g1: default_g1(),
            b1: default_b1(),
            r2: default_r2(),
            g2: default_g2(),
            b2: default_b2(),
            clk: default_clk(),
            oe: default_oe(),
            lat: default_lat(),
            addr: default_addr(),
        }
    }
}

/// GPIO backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpioConfig {
    /// Backend: "cdev", "sysfs", or "mock"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Character-device chip path (cdev backend only)
    #[serde(default = "default_chip")]
    pub chip: String,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            chip: default_chip(),
        }
    }
}

/// RP1 PIO scan-out parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PioConfig {
    /// State machine slot (0-3)
    #[serde(default)]
    pub slot: usize,

    /// 16.8 fixed-point clock divisor
    #[serde(default = "default_clock_divisor")]
    pub clock_divisor: u32,

    /// Physical base address of the PIO controller block
    #[serde(default = "default_controller_base")]
    pub controller_base: u64,
}

// Default value functions
fn default_width() -> usize {
    64
}

fn default_height() -> usize {
    32
}

fn default_address_lines() -> u32 {
    4
}

fn default_frame_rate() -> u32 {
    75
}

fn default_min_brightness() -> u8 {
    51
}

fn default_row_hold_us() -> u64 {
    80
}

fn default_r1() -> u32 {
    5
}

fn default_g1() -> u32 {
    13
}

fn default_b1() -> u32 {
    6
}

fn default_r2() -> u32 {
    12
}

fn default_g2() -> u32 {
    16
}

fn default_b2() -> u32 {
    23
}

fn default_clk() -> u32 {
    17
}

fn default_oe() -> u32 {
    4
}

fn default_lat() -> u32 {
    21
}

fn default_addr() -> Vec<u32> {
    vec![22, 26, 27, 20]
}

fn default_backend() -> String {
    "cdev".to_string()
}

fn default_chip() -> String {
    "/dev/gpiochip0".to_string()
}

fn default_clock_divisor() -> u32 {
    0x1000
}

fn default_controller_base() -> u64 {
    0x5020_0000
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Converts the file-format structs into the hardware configuration.
    pub fn into_matrix_config(self) -> Result<MatrixConfig> {
        let gpio = match self.gpio.backend.as_str() {
            "cdev" => GpioBackend::Cdev {
                chip: self.gpio.chip,
            },
            "sysfs" => GpioBackend::Sysfs,
            "mock" => GpioBackend::Mock,
            other => bail!("unknown GPIO backend {other:?} (expected cdev, sysfs, or mock)"),
        };

        let strategy = match self.pio {
            Some(pio) => ScanStrategy::Pio {
                slot: pio.slot,
                clock_divisor: pio.clock_divisor,
                controller_base: pio.controller_base,
            },
            None => ScanStrategy::Gpio,
        };

        let cfg = MatrixConfig {
            width: self.panel.width,
            height: self.panel.height,
            address_lines: self.panel.address_lines,
            pins: PinMap {
                r1: self.pins.r1,
                g1: self.pins.g1,
                b1: self.pins.b1,
                r2: self.pins.r2,
                g2: self.pins.g2,
                b2: self.pins.b2,
                clk: self.pins.clk,
                oe: self.pins.oe,
                lat: self.pins.lat,
                addr: self.pins.addr,
            },
            gpio,
            strategy,
            frame_rate: self.panel.frame_rate,
            min_brightness: self.panel.min_brightness,
            row_hold: Duration::from_micros(self.panel.row_hold_us),
        };
        cfg.validate().context("invalid matrix configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_valid_defaults() {
        let config: Config = toml::from_str("").unwrap();
        let cfg = config.into_matrix_config().unwrap();
        assert_eq!(cfg.width, 64);
        assert_eq!(cfg.height, 32);
        assert_eq!(cfg.pins, PinMap::default());
        assert!(matches!(cfg.strategy, ScanStrategy::Gpio));
        assert!(matches!(cfg.gpio, GpioBackend::Cdev { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [panel]
            widht = 64
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pio_section_selects_hardware_path() {
        let config: Config = toml::from_str(
            r#"
            [pio]
            slot = 2
            "#,
        )
        .unwrap();
        let cfg = config.into_matrix_config().unwrap();
        match cfg.strategy {
            ScanStrategy::Pio {
                slot,
                clock_divisor,
                controller_base,
            } => {
                assert_eq!(slot, 2);
                assert_eq!(clock_divisor, 0x1000);
                assert_eq!(controller_base, 0x5020_0000);
            }
            other => panic!("expected PIO strategy, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_backend_name_rejected() {
        let config: Config = toml::from_str(
            r#"
            [gpio]
            backend = "wiringpi"
            "#,
        )
        .unwrap();
        assert!(config.into_matrix_config().is_err());
    }

    #[test]
    fn test_pin_overrides_applied() {
        let config: Config = toml::from_str(
            r#"
            [panel]
            height = 64
            address_lines = 5

            [pins]
            addr = [22, 26, 27, 20, 24]
            "#,
        )
        .unwrap();
        let cfg = config.into_matrix_config().unwrap();
        assert_eq!(cfg.pins.addr, vec![22, 26, 27, 20, 24]);
        assert_eq!(cfg.addressable_rows(), 32);
    }
}
