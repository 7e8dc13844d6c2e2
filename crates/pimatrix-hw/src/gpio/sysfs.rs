//! Sysfs GPIO backend: the export/direction/value file triad.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

const EXPORT: &str = "/sys/class/gpio/export";
const UNEXPORT: &str = "/sys/class/gpio/unexport";

/// Delay after export: the kernel creates the per-pin attribute files
/// asynchronously.
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

/// A pin exported through `/sys/class/gpio`.
pub struct SysfsPin {
    value_path: String,
}

impl SysfsPin {
    /// Exports the pin and configures it as an output.
    pub fn export(pin: u32) -> Result<Self> {
        debug!("exporting GPIO pin {} via sysfs", pin);
        if let Err(e) = write_attr(EXPORT, &pin.to_string()) {
            return Err(classify_export(pin, e));
        }

        std::thread::sleep(EXPORT_SETTLE);

        let direction_path = format!("/sys/class/gpio/gpio{pin}/direction");
        write_attr(&direction_path, "out").map_err(|e| classify_attr(pin, e))?;

        Ok(Self {
            value_path: format!("/sys/class/gpio/gpio{pin}/value"),
        })
    }

    /// Writes the value attribute.
    pub fn set(&mut self, pin: u32, high: bool) -> Result<()> {
        let v = if high { "1" } else { "0" };
        write_attr(&self.value_path, v).map_err(|source| Error::PinIo { pin, source })
    }

    /// Unexports the pin. The pin directory may already be gone if the
    /// kernel cleaned up first; the caller treats failures as
    /// best-effort.
    pub fn unexport(self, pin: u32) -> std::io::Result<()> {
        debug!("unexporting GPIO pin {}", pin);
        if !Path::new(&self.value_path).exists() {
            return Ok(());
        }
        write_attr(UNEXPORT, &pin.to_string())
    }
}

fn write_attr(path: &str, value: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.write_all(value.as_bytes())
}

fn classify_export(pin: u32, e: std::io::Error) -> Error {
    match e.raw_os_error() {
        // EBUSY or EEXIST: someone (possibly a previous unclean run)
        // already holds the export.
        Some(libc::EBUSY) | Some(libc::EEXIST) => Error::PinBusy(pin),
        Some(libc::EACCES) | Some(libc::EPERM) => Error::PermissionDenied(EXPORT.to_string()),
        _ => Error::PinIo { pin, source: e },
    }
}

fn classify_attr(pin: u32, e: std::io::Error) -> Error {
    match e.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => {
            Error::PermissionDenied(format!("/sys/class/gpio/gpio{pin}"))
        }
        _ => Error::PinIo { pin, source: e },
    }
}
