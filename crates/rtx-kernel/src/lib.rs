//! RTX kernel runtime
//!
//! Binds the pure kernel core to a platform behind the [`Hal`] trait. The
//! core decides; this crate acts: it masks interrupts around every core
//! transition, owns the per-process saved contexts, and performs the
//! context switches the core's [`Dispatch`] directives name.
//!
//! The critical-section discipline is strict: the core only ever runs with
//! interrupts masked, and a context switch only ever happens after the
//! mask is restored.

#![no_std]

extern crate alloc;

mod uart;

use alloc::collections::BTreeMap;

use rtx_hal::{EntryPoint, Hal};
use rtx_kernel_core::{
    step, timer_tick, BlockRef, CallResult, Dispatch, Envelope, KernelCall, KernelError,
    KernelState, Priority, ProcessId, ProcessInit, TickOutcome, IDLE_PID,
};

/// A running kernel instance.
pub struct Rtx<H: Hal> {
    hal: H,
    state: KernelState,
    contexts: BTreeMap<ProcessId, H::Context>,
    /// Destination for completed console input lines.
    console_pid: Option<ProcessId>,
    line_buffer: alloc::vec::Vec<u8>,
}

impl<H: Hal> Rtx<H> {
    /// Bring the kernel up: build the boot state, give the boot thread its
    /// identity as the idle process, then release the processor to the
    /// highest-priority user process.
    pub fn boot(
        hal: H,
        inits: &[ProcessInit],
        pool_blocks: usize,
        console_pid: Option<ProcessId>,
    ) -> Result<Self, KernelError> {
        let state = KernelState::boot(inits, pool_blocks)?;
        let mut rtx = Self {
            hal,
            state,
            contexts: BTreeMap::new(),
            console_pid,
            line_buffer: alloc::vec::Vec::new(),
        };

        // The boot thread is the idle process; it needs a context slot to
        // be saved into on the first dispatch away from it.
        let idle_ctx = rtx.synthesize_context(IDLE_PID);
        rtx.contexts.insert(IDLE_PID, idle_ctx);

        rtx.release_processor();
        Ok(rtx)
    }

    /// Execute one kernel call for the current process, then perform any
    /// resulting context switch.
    pub fn handle_call(&mut self, call: KernelCall) -> CallResult {
        let was_enabled = self.hal.disable_interrupts();
        let out = step(&mut self.state, call);
        self.hal.restore_interrupts(was_enabled);

        if let Some(dispatch) = out.dispatch {
            self.dispatch(dispatch);
        }
        out.result
    }

    /// Handle one timer interrupt; yields afterwards if a redelivery
    /// readied a higher-priority process.
    pub fn timer_interrupt(&mut self) -> TickOutcome {
        let was_enabled = self.hal.disable_interrupts();
        let outcome = timer_tick(&mut self.state);
        self.hal.restore_interrupts(was_enabled);

        if outcome.preempt_needed {
            self.handle_call(KernelCall::Yield);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Kernel call veneers
    // ------------------------------------------------------------------

    /// Request one pool block, blocking until one is available.
    pub fn request_memory_block(&mut self) -> CallResult {
        self.call_until_unblocked(KernelCall::AllocBlock)
    }

    pub fn release_memory_block(&mut self, block: BlockRef) -> Result<(), KernelError> {
        into_unit(self.handle_call(KernelCall::FreeBlock { block }))
    }

    pub fn send_message(&mut self, dst: ProcessId, block: BlockRef) -> Result<(), KernelError> {
        into_unit(self.handle_call(KernelCall::Send { dst, block }))
    }

    /// Receive the next envelope, blocking on an empty mailbox.
    pub fn receive_message(&mut self, filter: Option<ProcessId>) -> CallResult {
        self.call_until_unblocked(KernelCall::Receive { filter })
    }

    pub fn delayed_send(
        &mut self,
        dst: ProcessId,
        block: BlockRef,
        ticks: u64,
    ) -> Result<(), KernelError> {
        into_unit(self.handle_call(KernelCall::DelayedSend { dst, block, ticks }))
    }

    pub fn release_processor(&mut self) {
        self.handle_call(KernelCall::Yield);
    }

    pub fn set_process_priority(
        &mut self,
        pid: ProcessId,
        level: u32,
    ) -> Result<(), KernelError> {
        into_unit(self.handle_call(KernelCall::SetPriority { pid, level }))
    }

    pub fn get_process_priority(&mut self, pid: ProcessId) -> Result<Priority, KernelError> {
        match self.handle_call(KernelCall::GetPriority { pid }) {
            CallResult::Priority(priority) => Ok(priority),
            CallResult::Err(err) => Err(err),
            _ => Err(KernelError::LookupFailure),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> &KernelState {
        &self.state
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// The envelope stored in an allocated block, for composing a message
    /// before sending it.
    pub fn envelope_mut(&mut self, block: BlockRef) -> Result<&mut Envelope, KernelError> {
        self.state.pool_mut().envelope_mut(block)
    }

    pub fn envelope(&self, block: BlockRef) -> Result<&Envelope, KernelError> {
        self.state.pool().envelope(block)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Issue a call, retrying whenever the caller blocked and has since
    /// been resumed. On a platform whose context switch does not suspend
    /// the caller (the hosted mock), a blocked call is reported as
    /// [`CallResult::Blocked`] instead of retried, since the processor now
    /// belongs to another process.
    fn call_until_unblocked(&mut self, call: KernelCall) -> CallResult {
        loop {
            let caller = self.state.current();
            let result = self.handle_call(call);
            if result != CallResult::Blocked {
                return result;
            }
            if self.state.current() != caller {
                return CallResult::Blocked;
            }
        }
    }

    fn synthesize_context(&mut self, pid: ProcessId) -> H::Context {
        let (entry, stack_words) = match self.state.table().get(pid) {
            Some(record) => (record.entry, record.stack_words),
            None => panic!("dispatch names unknown process {}", pid.0),
        };
        self.hal.init_context(EntryPoint(entry), stack_words)
    }

    fn dispatch(&mut self, dispatch: Dispatch) {
        let mut to_ctx = if dispatch.to_was_new {
            // First dispatch of this process: a fresh initial context.
            self.synthesize_context(dispatch.to)
        } else {
            match self.contexts.remove(&dispatch.to) {
                Some(ctx) => ctx,
                None => self.synthesize_context(dispatch.to),
            }
        };

        let from_ctx = self.contexts.get_mut(&dispatch.from);
        self.hal.switch_context(from_ctx, &mut to_ctx);
        self.contexts.insert(dispatch.to, to_ctx);
    }
}

fn into_unit(result: CallResult) -> Result<(), KernelError> {
    match result {
        CallResult::Ok => Ok(()),
        CallResult::Err(err) => Err(err),
        // Blocking veneers never route through here.
        _ => Ok(()),
    }
}
