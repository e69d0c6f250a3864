//! Scheduler
//!
//! Strict priority, FIFO within a level. The highest-priority ready process
//! always runs; a running process keeps the processor until it blocks,
//! yields, or a higher-priority process becomes ready. The idle process is
//! the fallback when every ready queue is empty and is never threaded
//! through the queues itself.

use crate::state::KernelState;
use crate::types::{ProcState, ProcessId, IDLE_PID, PRIORITY_LEVELS};

/// A context-switch decision. The core never touches real contexts; the
/// runtime wrapper performs the switch this describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatch {
    /// Process that owned the processor before the decision.
    pub from: ProcessId,
    /// Process that owns it now.
    pub to: ProcessId,
    /// Whether `to` has never run, so the wrapper must synthesize its
    /// initial context before switching.
    pub to_was_new: bool,
}

/// Dequeue the highest-priority ready process, falling back to idle.
fn pick_next(state: &mut KernelState) -> ProcessId {
    for index in 0..PRIORITY_LEVELS {
        if let Some(pid) = state.ready[index].pop_front(&mut state.table) {
            return pid;
        }
    }
    IDLE_PID
}

/// Re-evaluate which process should run.
///
/// A still-running caller is requeued at the tail of its level first, so a
/// yield among equals rotates FIFO. Returns `None` when the current process
/// keeps the processor.
pub(crate) fn schedule(state: &mut KernelState) -> Option<Dispatch> {
    let prev = state.current;

    let prev_running = state
        .table
        .get(prev)
        .map(|r| r.state == ProcState::Running)
        .unwrap_or(false);
    if prev_running {
        if let Some(record) = state.table.get_mut(prev) {
            record.state = ProcState::Ready;
        }
        if prev != IDLE_PID {
            let index = match state.table.get(prev) {
                Some(record) => record.priority.queue_index(),
                None => return None,
            };
            state.ready[index].push_back(&mut state.table, prev);
        }
    }

    let next = pick_next(state);
    let to_was_new = state
        .table
        .get(next)
        .map(|r| r.state == ProcState::New)
        .unwrap_or(false);
    if let Some(record) = state.table.get_mut(next) {
        record.state = ProcState::Running;
    }

    if next == prev {
        return None;
    }
    state.current = next;
    Some(Dispatch {
        from: prev,
        to: next,
        to_was_new,
    })
}

/// Move an unblocked process back into its ready queue. The caller has
/// already detached it from whatever blocked queue held it.
pub(crate) fn unblock_to_ready(state: &mut KernelState, pid: ProcessId) {
    let index = match state.table.get_mut(pid) {
        Some(record) => {
            record.state = ProcState::Ready;
            record.priority.queue_index()
        }
        None => return,
    };
    state.ready[index].push_back(&mut state.table, pid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ProcessInit;
    use crate::types::Priority;

    fn boot(inits: &[(u32, Priority)]) -> KernelState {
        let inits: alloc::vec::Vec<ProcessInit> = inits
            .iter()
            .map(|&(pid, priority)| ProcessInit {
                pid: ProcessId(pid),
                priority,
                entry: 0x1000 + pid as usize,
                stack_words: 128,
            })
            .collect();
        KernelState::boot(&inits, 8).unwrap()
    }

    #[test]
    fn test_highest_priority_wins() {
        let mut state = boot(&[(1, Priority::Low), (2, Priority::High)]);

        let dispatch = schedule(&mut state).unwrap();
        assert_eq!(dispatch.from, IDLE_PID);
        assert_eq!(dispatch.to, ProcessId(2));
        assert!(dispatch.to_was_new);
        assert_eq!(state.current(), ProcessId(2));
        assert_eq!(state.state_of(ProcessId(2)), Some(ProcState::Running));
        // The displaced idle process is runnable again.
        assert_eq!(state.state_of(IDLE_PID), Some(ProcState::Ready));
    }

    #[test]
    fn test_yield_rotates_fifo_within_level() {
        let mut state = boot(&[(1, Priority::Medium), (2, Priority::Medium)]);

        let first = schedule(&mut state).unwrap();
        assert_eq!(first.to, ProcessId(1));

        // 1 yields: 2 runs, 1 requeued behind it.
        let second = schedule(&mut state).unwrap();
        assert_eq!(second, Dispatch { from: ProcessId(1), to: ProcessId(2), to_was_new: true });

        // 2 yields: back to 1, no longer new.
        let third = schedule(&mut state).unwrap();
        assert_eq!(third.to, ProcessId(1));
        assert!(!third.to_was_new);
    }

    #[test]
    fn test_sole_runner_keeps_processor() {
        let mut state = boot(&[(1, Priority::Medium)]);
        assert_eq!(schedule(&mut state).unwrap().to, ProcessId(1));

        // Yield with an empty ready set: no switch.
        assert_eq!(schedule(&mut state), None);
        assert_eq!(state.current(), ProcessId(1));
        assert_eq!(state.state_of(ProcessId(1)), Some(ProcState::Running));
    }

    #[test]
    fn test_idle_runs_when_nothing_ready() {
        let mut state = boot(&[(1, Priority::Medium)]);
        assert_eq!(schedule(&mut state).unwrap().to, ProcessId(1));

        // Block the only user process by hand, then reschedule.
        state.table.get_mut(ProcessId(1)).unwrap().state = ProcState::BlockedOnReceive;
        state
            .blocked_on_receive
            .push_back(&mut state.table, ProcessId(1));

        let dispatch = schedule(&mut state).unwrap();
        assert_eq!(dispatch.to, IDLE_PID);
        assert_eq!(state.state_of(IDLE_PID), Some(ProcState::Running));
    }

    #[test]
    fn test_idle_yield_is_a_noop_without_ready_work() {
        let mut state = boot(&[]);
        assert_eq!(schedule(&mut state), None);
        assert_eq!(state.current(), IDLE_PID);
        assert_eq!(state.state_of(IDLE_PID), Some(ProcState::Running));
    }

    #[test]
    fn test_unblock_returns_to_tail() {
        let mut state = boot(&[(1, Priority::Medium), (2, Priority::Medium)]);
        assert_eq!(schedule(&mut state).unwrap().to, ProcessId(1));

        state.table.get_mut(ProcessId(1)).unwrap().state = ProcState::BlockedOnMemory;
        let index = Priority::Medium.queue_index();
        state.blocked_on_memory[index].push_back(&mut state.table, ProcessId(1));

        state.blocked_on_memory[index].remove(&mut state.table, ProcessId(1));
        unblock_to_ready(&mut state, ProcessId(1));

        assert_eq!(
            state.ready[index].members(&state.table),
            alloc::vec![ProcessId(2), ProcessId(1)]
        );
        assert_eq!(state.state_of(ProcessId(1)), Some(ProcState::Ready));
    }
}
