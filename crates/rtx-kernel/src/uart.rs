//! UART i-process paths
//!
//! Interrupt-driven console plumbing. Receive side: bytes accumulate in a
//! line buffer; a carriage return completes the line, which is packed into
//! a freshly allocated envelope and delivered to the console owner
//! process. Transmit side: processes send envelopes to the UART's
//! mailbox; the transmit poll drains them into raw bytes and frees the
//! blocks.
//!
//! An i-process must never block: if the pool is momentarily empty when a
//! line completes, the line is dropped.

use alloc::vec::Vec;

use rtx_hal::Hal;
use rtx_kernel_core::{
    deliver, release_and_wake, try_receive, KernelCall, MessageKind, ProcState, UART_PID,
};

use crate::Rtx;

impl<H: Hal> Rtx<H> {
    /// Handle one received byte in UART interrupt context.
    pub fn uart_rx(&mut self, byte: u8) {
        if byte != b'\r' && byte != b'\n' {
            self.line_buffer.push(byte);
            return;
        }
        let line = core::mem::take(&mut self.line_buffer);

        let was_enabled = self.hal.disable_interrupts();
        let mut yield_needed = false;
        let mut dropped = false;
        if let Some(dst) = self.console_pid {
            match self.state.pool_mut().try_alloc() {
                Some(block) => {
                    if let Ok(env) = self.state.pool_mut().envelope_mut(block) {
                        env.sender = UART_PID;
                        env.destination = dst;
                        env.kind = MessageKind::ConsoleInput;
                        env.write_payload(&line);
                    }
                    let dst_was_waiting =
                        self.state.state_of(dst) == Some(ProcState::BlockedOnReceive);
                    deliver(&mut self.state, dst, block);

                    // Yield only for an owner this line just woke.
                    if dst_was_waiting {
                        yield_needed = self.outranks_current(dst);
                    }
                }
                None => dropped = true,
            }
        }
        self.hal.restore_interrupts(was_enabled);

        if dropped {
            self.hal.debug_write("uart: console line dropped, pool empty");
        }
        if yield_needed {
            self.handle_call(KernelCall::Yield);
        }
    }

    /// Drain the UART's transmit mailbox, returning the raw bytes to emit.
    /// Each drained envelope's block goes back through the normal release
    /// path, so a process blocked on the pool is readied; if a woken
    /// process outranks the interrupted one, the poll yields on exit.
    pub fn uart_tx_poll(&mut self) -> Vec<u8> {
        let was_enabled = self.hal.disable_interrupts();
        let mut bytes = Vec::new();
        let mut yield_needed = false;
        let mut bad_block = false;
        while let Some(block) = try_receive(&mut self.state, UART_PID) {
            if let Ok(env) = self.state.pool().envelope(block) {
                bytes.extend_from_slice(env.payload());
            }
            match release_and_wake(&mut self.state, block) {
                Ok(Some(pid)) => {
                    if self.outranks_current(pid) {
                        yield_needed = true;
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    bad_block = true;
                    break;
                }
            }
        }
        self.hal.restore_interrupts(was_enabled);

        if bad_block {
            self.hal.debug_write("uart: bad block in tx mailbox");
        }
        if yield_needed {
            self.handle_call(KernelCall::Yield);
        }
        bytes
    }

    fn outranks_current(&self, pid: rtx_kernel_core::ProcessId) -> bool {
        let candidate = self.state.priority_of(pid);
        let current = self.state.priority_of(self.state.current());
        match (candidate, current) {
            (Some(candidate), Some(current)) => candidate.outranks(current),
            _ => false,
        }
    }
}
