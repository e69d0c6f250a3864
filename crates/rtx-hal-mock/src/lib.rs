//! Mock platform implementation for testing the RTX kernel
//!
//! Provides a deterministic implementation of the `Hal` trait for hosted
//! unit tests: contexts are numbered tokens, context switches are recorded
//! rather than performed, and the interrupt mask is a counter so tests can
//! assert the critical-section discipline (in particular that no context
//! switch ever happens while interrupts are masked).

#![no_std]
extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicU64, Ordering};
use rtx_hal::{EntryPoint, Hal};

/// Context token handed out by the mock platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockContext {
    /// Sequential id, in order of synthesis.
    pub id: u64,
    /// Entry point the context was synthesized for.
    pub entry: EntryPoint,
    /// How many times this context has been restored.
    pub resumed: u64,
}

/// Mock HAL for unit testing.
pub struct MockHal {
    next_context_id: AtomicU64,
    interrupts_enabled: Cell<bool>,
    /// Set if `switch_context` was ever called with interrupts masked.
    switched_while_masked: Cell<bool>,
    /// Recorded switches as (outgoing context id, incoming context id).
    switch_log: RefCell<Vec<(Option<u64>, u64)>>,
    debug_log: RefCell<Vec<String>>,
}

impl MockHal {
    /// Create a new mock HAL with interrupts enabled.
    pub fn new() -> Self {
        Self {
            next_context_id: AtomicU64::new(1),
            interrupts_enabled: Cell::new(true),
            switched_while_masked: Cell::new(false),
            switch_log: RefCell::new(Vec::new()),
            debug_log: RefCell::new(Vec::new()),
        }
    }

    /// Whether interrupts are currently enabled.
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.get()
    }

    /// Whether any context switch happened with interrupts masked.
    pub fn switched_while_masked(&self) -> bool {
        self.switched_while_masked.get()
    }

    /// All recorded context switches, oldest first.
    pub fn switch_log(&self) -> Vec<(Option<u64>, u64)> {
        self.switch_log.borrow().clone()
    }

    /// Number of recorded context switches.
    pub fn switch_count(&self) -> usize {
        self.switch_log.borrow().len()
    }

    /// All captured debug messages.
    pub fn get_debug_log(&self) -> Vec<String> {
        self.debug_log.borrow().clone()
    }

    /// Check whether a debug message containing `substr` was logged.
    pub fn has_log_containing(&self, substr: &str) -> bool {
        self.debug_log
            .borrow()
            .iter()
            .any(|msg| msg.contains(substr))
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

// MockHal uses Cell/RefCell only from single-threaded test contexts.
unsafe impl Send for MockHal {}
unsafe impl Sync for MockHal {}

impl Hal for MockHal {
    type Context = MockContext;

    fn init_context(&self, entry: EntryPoint, _stack_words: usize) -> Self::Context {
        let id = self.next_context_id.fetch_add(1, Ordering::SeqCst);
        MockContext {
            id,
            entry,
            resumed: 0,
        }
    }

    fn switch_context(&self, from: Option<&mut Self::Context>, to: &mut Self::Context) {
        if !self.interrupts_enabled.get() {
            self.switched_while_masked.set(true);
        }
        to.resumed += 1;
        self.switch_log
            .borrow_mut()
            .push((from.map(|c| c.id), to.id));
    }

    fn disable_interrupts(&self) -> bool {
        self.interrupts_enabled.replace(false)
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        self.interrupts_enabled.set(was_enabled);
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.borrow_mut().push(String::from(msg));
    }
}
