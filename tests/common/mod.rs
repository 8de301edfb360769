//! Shared test doubles: a scripted register bus and a no-op delay.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use servo_deck::transport::RegisterBus;
use servo_deck::{Error, Result};

struct SpyState {
    regs: [u8; 256],
    writes: Vec<(u8, u8)>,
    fail_counts: HashMap<u8, u32>,
}

impl Default for SpyState {
    fn default() -> Self {
        Self {
            regs: [0; 256],
            writes: Vec::new(),
            fail_counts: HashMap::new(),
        }
    }
}

/// A [`RegisterBus`] double that records every successful write and can be
/// scripted to fail writes to chosen registers. Cloned handles share state,
/// so a test can keep one handle for assertions while the driver owns the
/// other.
#[derive(Clone, Default)]
pub struct BusSpy(Rc<RefCell<SpyState>>);

impl BusSpy {
    pub fn new() -> Self {
        Self::default()
    }

    /// All successful writes so far, in order, as `(register, value)`.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.0.borrow().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.0.borrow().writes.len()
    }

    pub fn clear_writes(&self) {
        self.0.borrow_mut().writes.clear();
    }

    /// Current value of a register (updated by successful writes).
    pub fn reg(&self, register: u8) -> u8 {
        self.0.borrow().regs[register as usize]
    }

    /// Preload a register value for `read_byte`.
    pub fn set_reg(&self, register: u8, value: u8) {
        self.0.borrow_mut().regs[register as usize] = value;
    }

    /// Make the next `times` writes to `register` fail. Use `u32::MAX` for a
    /// register that is stuck for the whole test.
    pub fn fail_writes_to(&self, register: u8, times: u32) {
        self.0.borrow_mut().fail_counts.insert(register, times);
    }
}

impl RegisterBus for BusSpy {
    fn write_byte(&mut self, register: u8, value: u8) -> Result<()> {
        let mut state = self.0.borrow_mut();
        if let Some(remaining) = state.fail_counts.get_mut(&register) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(Error::Bus);
            }
        }
        state.regs[register as usize] = value;
        state.writes.push((register, value));
        Ok(())
    }

    fn read_byte(&mut self, register: u8) -> Result<u8> {
        Ok(self.0.borrow().regs[register as usize])
    }
}

/// Delay provider that returns immediately; settling delays are irrelevant
/// on a scripted bus.
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
