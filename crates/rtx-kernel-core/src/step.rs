//! Kernel call execution
//!
//! [`step`] is the single entry point for process-context kernel calls: it
//! applies one call for the currently running process and returns what the
//! caller gets back plus the context-switch decision, if any. Interrupt
//! context uses the non-blocking [`try_receive`] and [`deliver`] paths
//! instead; an i-process must never block.

use crate::sched::{schedule, unblock_to_ready, Dispatch};
use crate::state::KernelState;
use crate::types::{
    BlockRef, KernelError, Priority, ProcState, ProcessId, ProcessKind, PRIORITY_LEVELS,
    TIMER_PID,
};

/// A kernel call, as issued by the currently running process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelCall {
    /// Request one pool block, blocking until one is available.
    AllocBlock,
    /// Return a pool block.
    FreeBlock { block: BlockRef },
    /// Send the envelope in `block` to `dst`.
    Send { dst: ProcessId, block: BlockRef },
    /// Receive the next envelope, blocking on an empty mailbox. With a
    /// filter, only envelopes from that sender match.
    Receive { filter: Option<ProcessId> },
    /// Send the envelope in `block` to `dst` after `ticks` timer ticks.
    DelayedSend {
        dst: ProcessId,
        block: BlockRef,
        ticks: u64,
    },
    /// Release the processor voluntarily.
    Yield,
    /// Change a user process's priority to a user level number.
    SetPriority { pid: ProcessId, level: u32 },
    /// Read a process's priority.
    GetPriority { pid: ProcessId },
}

/// What a kernel call hands back to its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallResult {
    Ok,
    /// A freshly allocated block.
    Block(BlockRef),
    /// A received envelope, still owned by the caller's block.
    Envelope(BlockRef),
    Priority(Priority),
    /// The caller blocked; the wrapper retries the call when the caller is
    /// next dispatched.
    Blocked,
    Err(KernelError),
}

/// Outcome of one kernel call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepResult {
    pub result: CallResult,
    /// Context switch for the runtime wrapper to perform, if the call
    /// moved the processor to another process.
    pub dispatch: Option<Dispatch>,
}

impl StepResult {
    fn stay(result: CallResult) -> Self {
        Self {
            result,
            dispatch: None,
        }
    }
}

/// Execute one kernel call for the current process.
pub fn step(state: &mut KernelState, call: KernelCall) -> StepResult {
    match call {
        KernelCall::AllocBlock => step_alloc(state),
        KernelCall::FreeBlock { block } => step_free(state, block),
        KernelCall::Send { dst, block } => step_send(state, dst, block),
        KernelCall::Receive { filter } => step_receive(state, filter),
        KernelCall::DelayedSend { dst, block, ticks } => {
            step_delayed_send(state, dst, block, ticks)
        }
        KernelCall::Yield => StepResult {
            result: CallResult::Ok,
            dispatch: schedule(state),
        },
        KernelCall::SetPriority { pid, level } => step_set_priority(state, pid, level),
        KernelCall::GetPriority { pid } => step_get_priority(state, pid),
    }
}

/// Append the envelope in `block` to `dst`'s mailbox and ready `dst` if it
/// was waiting to receive. Never schedules; the caller decides whether the
/// delivery warrants a dispatch.
///
/// `dst` must exist: call paths validate the destination before stamping
/// the envelope, so a miss here is kernel corruption.
pub fn deliver(state: &mut KernelState, dst: ProcessId, block: BlockRef) {
    let mut mailbox = match state.table.get(dst) {
        Some(record) => record.mailbox,
        None => panic!("envelope addressed to unknown process {}", dst.0),
    };
    mailbox.enqueue(&mut state.pool, block);
    let was_waiting = {
        let record = match state.table.get_mut(dst) {
            Some(record) => record,
            None => return,
        };
        record.mailbox = mailbox;
        record.state == ProcState::BlockedOnReceive
    };
    if was_waiting {
        state.blocked_on_receive.remove(&mut state.table, dst);
        unblock_to_ready(state, dst);
    }
}

/// Non-blocking mailbox dequeue, for interrupt context.
pub fn try_receive(state: &mut KernelState, pid: ProcessId) -> Option<BlockRef> {
    let mut mailbox = state.table.get(pid)?.mailbox;
    let block = mailbox.dequeue(&mut state.pool);
    if let Some(record) = state.table.get_mut(pid) {
        record.mailbox = mailbox;
    }
    block
}

fn step_alloc(state: &mut KernelState) -> StepResult {
    if let Some(block) = state.pool.try_alloc() {
        return StepResult::stay(CallResult::Block(block));
    }

    let caller = state.current;
    let index = match state.table.get_mut(caller) {
        Some(record) => {
            record.state = ProcState::BlockedOnMemory;
            record.priority.queue_index()
        }
        None => return StepResult::stay(CallResult::Err(KernelError::LookupFailure)),
    };
    state.blocked_on_memory[index].push_back(&mut state.table, caller);
    StepResult {
        result: CallResult::Blocked,
        dispatch: schedule(state),
    }
}

/// Release a block and ready at most one blocked requester, highest level
/// first, FIFO within a level. Returns the woken process, if any. Shared
/// by the process-context free call and the interrupt-context transmit
/// drain; the caller decides whether the wake warrants a dispatch.
pub fn release_and_wake(
    state: &mut KernelState,
    block: BlockRef,
) -> Result<Option<ProcessId>, KernelError> {
    state.pool.release(block)?;
    for index in 0..PRIORITY_LEVELS {
        if let Some(pid) = state.blocked_on_memory[index].pop_front(&mut state.table) {
            unblock_to_ready(state, pid);
            return Ok(Some(pid));
        }
    }
    Ok(None)
}

fn step_free(state: &mut KernelState, block: BlockRef) -> StepResult {
    let woken = match release_and_wake(state, block) {
        Ok(woken) => woken,
        Err(err) => return StepResult::stay(CallResult::Err(err)),
    };
    let Some(pid) = woken else {
        return StepResult::stay(CallResult::Ok);
    };

    // The releaser yields if the woken process has at least its priority.
    let releaser_priority = match state.table.get(state.current) {
        Some(record) => record.priority,
        None => return StepResult::stay(CallResult::Ok),
    };
    let woken_priority = match state.table.get(pid) {
        Some(record) => record.priority,
        None => return StepResult::stay(CallResult::Ok),
    };
    if !releaser_priority.outranks(woken_priority) {
        return StepResult {
            result: CallResult::Ok,
            dispatch: schedule(state),
        };
    }
    StepResult::stay(CallResult::Ok)
}

fn step_send(state: &mut KernelState, dst: ProcessId, block: BlockRef) -> StepResult {
    let caller = state.current;
    let (dst_priority, dst_was_waiting) = match state.table.get(dst) {
        Some(record) => (
            record.priority,
            record.state == ProcState::BlockedOnReceive,
        ),
        None => return StepResult::stay(CallResult::Err(KernelError::LookupFailure)),
    };

    match state.pool.envelope_mut(block) {
        Ok(env) => {
            env.sender = caller;
            env.destination = dst;
            env.deadline = 0;
        }
        Err(err) => return StepResult::stay(CallResult::Err(err)),
    }
    deliver(state, dst, block);

    let caller_priority = match state.table.get(caller) {
        Some(record) => record.priority,
        None => return StepResult::stay(CallResult::Ok),
    };
    // Only a receiver this send just woke can justify taking the
    // processor. In particular an i-process destination is never waiting
    // and never schedulable, however high its rank.
    if state.preempt_on_send && dst_was_waiting && dst_priority.outranks(caller_priority) {
        return StepResult {
            result: CallResult::Ok,
            dispatch: schedule(state),
        };
    }
    StepResult::stay(CallResult::Ok)
}

fn step_receive(state: &mut KernelState, filter: Option<ProcessId>) -> StepResult {
    let caller = state.current;
    let mut mailbox = match state.table.get(caller) {
        Some(record) => record.mailbox,
        None => return StepResult::stay(CallResult::Err(KernelError::LookupFailure)),
    };
    let got = match filter {
        Some(sender) => mailbox.dequeue_from(&mut state.pool, sender),
        None => mailbox.dequeue(&mut state.pool),
    };
    if let Some(record) = state.table.get_mut(caller) {
        record.mailbox = mailbox;
    }
    if let Some(block) = got {
        return StepResult::stay(CallResult::Envelope(block));
    }

    // Idempotent: a re-issued receive after a hint wake must not relink.
    let already_waiting = state.table.link(caller).home().is_some();
    if let Some(record) = state.table.get_mut(caller) {
        record.state = ProcState::BlockedOnReceive;
    }
    if !already_waiting {
        state.blocked_on_receive.push_back(&mut state.table, caller);
    }
    StepResult {
        result: CallResult::Blocked,
        dispatch: schedule(state),
    }
}

fn step_delayed_send(
    state: &mut KernelState,
    dst: ProcessId,
    block: BlockRef,
    ticks: u64,
) -> StepResult {
    if !state.table.contains(dst) {
        return StepResult::stay(CallResult::Err(KernelError::LookupFailure));
    }
    let deadline = state.tick + ticks;
    let caller = state.current;
    match state.pool.envelope_mut(block) {
        Ok(env) => {
            env.sender = caller;
            env.destination = dst;
            env.deadline = deadline;
        }
        Err(err) => return StepResult::stay(CallResult::Err(err)),
    }

    // Routed through the timer's mailbox; redelivery happens at tick time
    // with preemption suppressed, so there is nothing to dispatch here.
    let mut mailbox = match state.table.get(TIMER_PID) {
        Some(record) => record.mailbox,
        None => return StepResult::stay(CallResult::Err(KernelError::LookupFailure)),
    };
    mailbox.enqueue(&mut state.pool, block);
    if let Some(record) = state.table.get_mut(TIMER_PID) {
        record.mailbox = mailbox;
    }
    StepResult::stay(CallResult::Ok)
}

fn step_set_priority(state: &mut KernelState, pid: ProcessId, level: u32) -> StepResult {
    let new_priority = match Priority::from_user_level(level) {
        Some(priority) => priority,
        None => return StepResult::stay(CallResult::Err(KernelError::InvalidPriority)),
    };
    let (kind, old_priority) = match state.table.get(pid) {
        Some(record) => (record.kind, record.priority),
        None => return StepResult::stay(CallResult::Err(KernelError::LookupFailure)),
    };
    if kind != ProcessKind::User {
        return StepResult::stay(CallResult::Err(KernelError::LookupFailure));
    }
    if new_priority == old_priority {
        return StepResult::stay(CallResult::Ok);
    }

    // Re-home queue membership before the priority changes under it.
    let home = state.table.link(pid).home();
    if let Some(tag) = home {
        match tag {
            crate::queue::QueueTag::Ready(index) => {
                state.ready[index].remove(&mut state.table, pid);
            }
            crate::queue::QueueTag::Memory(index) => {
                state.blocked_on_memory[index].remove(&mut state.table, pid);
            }
            crate::queue::QueueTag::Receive => {}
        }
    }
    if let Some(record) = state.table.get_mut(pid) {
        record.priority = new_priority;
    }
    let index = new_priority.queue_index();
    match home {
        Some(crate::queue::QueueTag::Ready(_)) => {
            state.ready[index].push_back(&mut state.table, pid);
        }
        Some(crate::queue::QueueTag::Memory(_)) => {
            state.blocked_on_memory[index].push_back(&mut state.table, pid);
        }
        _ => {}
    }
    StepResult::stay(CallResult::Ok)
}

fn step_get_priority(state: &mut KernelState, pid: ProcessId) -> StepResult {
    match state.table.get(pid) {
        Some(record) => StepResult::stay(CallResult::Priority(record.priority)),
        None => StepResult::stay(CallResult::Err(KernelError::LookupFailure)),
    }
}
