//! Timer i-process
//!
//! Runs once per timer interrupt. Delayed envelopes are routed through the
//! timer's own mailbox; each tick drains that mailbox into a
//! deadline-sorted pending queue, then redelivers every envelope whose
//! deadline has arrived to its true destination. Redelivery never
//! dispatches directly - interrupt context must not switch - so the
//! outcome reports whether the wrapper should yield on exit.

use crate::state::KernelState;
use crate::step::{deliver, try_receive};
use crate::types::TIMER_PID;

/// What one timer tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Envelopes redelivered to their destinations this tick.
    pub delivered: usize,
    /// Whether a redelivery readied a process that outranks the current
    /// one, so the wrapper should yield once the interrupt returns.
    pub preempt_needed: bool,
}

/// Handle one timer interrupt.
pub fn timer_tick(state: &mut KernelState) -> TickOutcome {
    // Newly arrived delayed sends move from the mailbox into the sorted
    // pending queue.
    while let Some(block) = try_receive(state, TIMER_PID) {
        let mut pending = state.timer_pending;
        pending.insert_by_deadline(&mut state.pool, block);
        state.timer_pending = pending;
    }

    let mut outcome = TickOutcome::default();
    loop {
        let Some(head) = state.timer_pending.peek() else {
            break;
        };
        let due = match state.pool.envelope(head) {
            Ok(env) => env.deadline <= state.tick,
            // An unoccupied block in the pending queue cannot be redelivered;
            // drop it from the queue below rather than spinning on it.
            Err(_) => true,
        };
        if !due {
            break;
        }

        let mut pending = state.timer_pending;
        let block = pending.dequeue(&mut state.pool);
        state.timer_pending = pending;
        let Some(block) = block else {
            break;
        };
        let Ok(env) = state.pool.envelope(block) else {
            continue;
        };
        let dst = env.destination;
        deliver(state, dst, block);
        outcome.delivered += 1;

        let dst_priority = state.priority_of(dst);
        let current_priority = state.priority_of(state.current);
        if let (Some(dst_priority), Some(current_priority)) = (dst_priority, current_priority) {
            if dst_priority.outranks(current_priority) {
                outcome.preempt_needed = true;
            }
        }
    }

    state.tick += 1;
    outcome
}
