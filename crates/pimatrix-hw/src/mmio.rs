//! Bounds-checked access to memory-mapped peripheral registers.
//!
//! A [`RegisterWindow`] owns one mapped physical range from `/dev/mem`.
//! All accesses go through `read32`/`write32`, which validate the
//! offset against the window size before dereferencing; raw pointer
//! arithmetic never leaks out of this module. Accesses are volatile,
//! so register effects are immediately visible to the peripheral.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const MEM_DEVICE: &str = "/dev/mem";

/// Physical ranges this process currently has mapped. `/dev/mem` does
/// not arbitrate between mappings, so overlap detection is done here.
static CLAIMS: Mutex<Vec<(u64, usize)>> = Mutex::new(Vec::new());

fn claim(addr: u64, size: usize) -> Result<()> {
    let mut claims = CLAIMS.lock().unwrap();
    let end = addr + size as u64;
    for &(held_addr, held_size) in claims.iter() {
        let held_end = held_addr + held_size as u64;
        if addr < held_end && held_addr < end {
            return Err(Error::MappingConflict { addr });
        }
    }
    claims.push((addr, size));
    Ok(())
}

fn release_claim(addr: u64, size: usize) {
    let mut claims = CLAIMS.lock().unwrap();
    if let Some(i) = claims.iter().position(|&c| c == (addr, size)) {
        claims.swap_remove(i);
    }
}

/// One mapped physical register range.
pub struct RegisterWindow {
    base: *mut u8,
    size: usize,
    /// Physical address, `None` for anonymous scratch windows.
    phys: Option<u64>,
}

// The raw pointer is only a resource handle; the window moves to the
// sequencing thread but is never shared between threads.
unsafe impl Send for RegisterWindow {}

impl RegisterWindow {
    /// Maps `size` bytes of physical memory at `phys_addr` through
    /// `/dev/mem`.
    pub fn map(phys_addr: u64, size: usize) -> Result<Self> {
        claim(phys_addr, size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(MEM_DEVICE)
            .map_err(|e| {
                release_claim(phys_addr, size);
                match e.raw_os_error() {
                    Some(libc::EACCES) | Some(libc::EPERM) => {
                        Error::PermissionDenied(MEM_DEVICE.to_string())
                    }
                    _ => Error::Io(e),
                }
            })?;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                phys_addr as libc::off_t,
            )
        };
        if base == libc::MAP_FAILED {
            release_claim(phys_addr, size);
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        debug!(
            "mapped {:#x} bytes of register space at {:#010x}",
            size, phys_addr
        );
        Ok(Self {
            base: base as *mut u8,
            size,
            phys: Some(phys_addr),
        })
    }

    /// Maps an anonymous zeroed window with identical accessor
    /// semantics. Backs the controller tests; no device, no root.
    pub fn anonymous(size: usize) -> Result<Self> {
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(Self {
            base: base as *mut u8,
            size,
            phys: None,
        })
    }

    /// Window size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    fn check(&self, offset: usize) -> Result<()> {
        if self.base.is_null() {
            return Err(Error::WindowClosed);
        }
        if offset % 4 != 0 || offset + 4 > self.size {
            return Err(Error::RegisterOutOfRange {
                offset,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Reads a 32-bit register.
    pub fn read32(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;
        Ok(unsafe { (self.base.add(offset) as *const u32).read_volatile() })
    }

    /// Writes a 32-bit register.
    pub fn write32(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;
        unsafe { (self.base.add(offset) as *mut u32).write_volatile(value) };
        Ok(())
    }

    /// Unmaps the window. Idempotent; subsequent accesses fail with
    /// [`Error::WindowClosed`].
    pub fn unmap(&mut self) {
        if self.base.is_null() {
            return;
        }
        let rc = unsafe { libc::munmap(self.base as *mut libc::c_void, self.size) };
        if rc != 0 {
            warn!(
                "munmap failed for window of {:#x} bytes: {}",
                self.size,
                std::io::Error::last_os_error()
            );
        }
        self.base = std::ptr::null_mut();
        if let Some(phys) = self.phys.take() {
            release_claim(phys, self.size);
        }
    }
}

impl Drop for RegisterWindow {
    fn drop(&mut self) {
        self.unmap();
    }
}
