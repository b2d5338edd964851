//! Host port allocation for branch container groups.

use std::collections::HashSet;
use std::sync::Mutex;

use hovel_core::error::{HovelError, Result};

/// Hands out unique host ports from a fixed range.
///
/// The authoritative used set is rebuilt from the registry at startup via
/// [`PortAllocator::reserve`]; the derived web-terminal port (`port + 1000`)
/// is not tracked separately since its uniqueness follows from the branch
/// port's.
#[derive(Debug)]
pub struct PortAllocator {
    base: u16,
    max: u16,
    used: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(base: u16, max: u16) -> Self {
        Self {
            base,
            max,
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Lowest free port in the range.
    pub fn allocate(&self) -> Result<u16> {
        let mut used = self.used.lock().expect("port allocator lock poisoned");
        for port in self.base..=self.max {
            if !used.contains(&port) {
                used.insert(port);
                return Ok(port);
            }
        }
        Err(HovelError::PortExhausted)
    }

    /// Mark a port as used (startup recovery from the registry scan).
    pub fn reserve(&self, port: u16) {
        self.used
            .lock()
            .expect("port allocator lock poisoned")
            .insert(port);
    }

    /// Return a port to the free pool. Idempotent.
    pub fn release(&self, port: u16) {
        self.used
            .lock()
            .expect("port allocator lock poisoned")
            .remove(&port);
    }

    pub fn used_count(&self) -> usize {
        self.used.lock().expect("port allocator lock poisoned").len()
    }
}
