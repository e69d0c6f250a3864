//! Whole-state consistency checks
//!
//! Structural invariants that must hold between kernel calls. These are
//! debugging and test aids: production paths assume them, tests assert
//! them after every interesting transition.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::fmt;

use crate::queue::QueueTag;
use crate::state::KernelState;
use crate::types::{BlockRef, ProcState, ProcessId, ProcessKind, PRIORITY_LEVELS};

/// One detected inconsistency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A process appears in more than one scheduling queue.
    MultipleQueueMembership { pid: ProcessId },
    /// A queued process's state disagrees with the queue holding it.
    StateQueueMismatch {
        pid: ProcessId,
        state: ProcState,
        tag: QueueTag,
    },
    /// A queued process sits at the wrong priority level's queue.
    WrongQueueLevel { pid: ProcessId, tag: QueueTag },
    /// A process's state says it should be queued but no queue holds it.
    MissingQueueMembership { pid: ProcessId, state: ProcState },
    /// The current process is not in the `Running` state.
    CurrentNotRunning { pid: ProcessId },
    /// The current process is an i-process, which must never be scheduled.
    CurrentIsIProcess { pid: ProcessId },
    /// A running process other than the current one.
    StrayRunning { pid: ProcessId },
    /// A free pool block is linked into an envelope queue.
    QueuedBlockFree { block: BlockRef },
    /// A pool block appears in more than one envelope queue.
    BlockMultiplyQueued { block: BlockRef },
    /// The timer's pending queue is not in ascending deadline order.
    TimerQueueUnsorted,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleQueueMembership { pid } => {
                write!(f, "process {} is in more than one queue", pid.0)
            }
            Self::StateQueueMismatch { pid, state, tag } => {
                write!(f, "process {} is {:?} but sits in {:?}", pid.0, state, tag)
            }
            Self::WrongQueueLevel { pid, tag } => {
                write!(f, "process {} queued at wrong level {:?}", pid.0, tag)
            }
            Self::MissingQueueMembership { pid, state } => {
                write!(f, "process {} is {:?} but in no queue", pid.0, state)
            }
            Self::CurrentNotRunning { pid } => {
                write!(f, "current process {} is not running", pid.0)
            }
            Self::CurrentIsIProcess { pid } => {
                write!(f, "current process {} is an i-process", pid.0)
            }
            Self::StrayRunning { pid } => {
                write!(f, "process {} is running but not current", pid.0)
            }
            Self::QueuedBlockFree { block } => {
                write!(f, "free block {} is linked into an envelope queue", block.0)
            }
            Self::BlockMultiplyQueued { block } => {
                write!(f, "block {} is in more than one envelope queue", block.0)
            }
            Self::TimerQueueUnsorted => {
                write!(f, "timer pending queue is out of deadline order")
            }
        }
    }
}

/// Check every structural invariant, collecting all violations.
pub fn check_all_invariants(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    check_scheduling_queues(state, &mut violations);
    check_process_states(state, &mut violations);
    check_current(state, &mut violations);
    check_envelope_queues(state, &mut violations);
    violations
}

/// Panic with a report if any invariant is violated. Test helper.
pub fn assert_invariants(state: &KernelState) {
    let violations = check_all_invariants(state);
    if !violations.is_empty() {
        let mut report = alloc::string::String::new();
        for violation in &violations {
            report.push_str("\n  ");
            let _ = fmt::write(&mut report, format_args!("{violation}"));
        }
        panic!("kernel state invariants violated:{report}");
    }
}

fn check_scheduling_queues(state: &KernelState, violations: &mut Vec<InvariantViolation>) {
    let mut seen: BTreeSet<ProcessId> = BTreeSet::new();
    let mut visit = |pid: ProcessId,
                     tag: QueueTag,
                     violations: &mut Vec<InvariantViolation>| {
        if !seen.insert(pid) {
            violations.push(InvariantViolation::MultipleQueueMembership { pid });
        }
        let Some(record) = state.table.get(pid) else {
            return;
        };
        let (state_ok, level) = match tag {
            QueueTag::Ready(index) => (
                matches!(record.state, ProcState::Ready | ProcState::New),
                Some(index),
            ),
            QueueTag::Memory(index) => {
                (record.state == ProcState::BlockedOnMemory, Some(index))
            }
            QueueTag::Receive => (record.state == ProcState::BlockedOnReceive, None),
        };
        if !state_ok {
            violations.push(InvariantViolation::StateQueueMismatch {
                pid,
                state: record.state,
                tag,
            });
        }
        if let Some(index) = level {
            if record.priority.queue_index() != index {
                violations.push(InvariantViolation::WrongQueueLevel { pid, tag });
            }
        }
    };

    for index in 0..PRIORITY_LEVELS {
        for pid in state.ready[index].members(&state.table) {
            visit(pid, QueueTag::Ready(index), violations);
        }
        for pid in state.blocked_on_memory[index].members(&state.table) {
            visit(pid, QueueTag::Memory(index), violations);
        }
    }
    for pid in state.blocked_on_receive.members(&state.table) {
        visit(pid, QueueTag::Receive, violations);
    }
}

fn check_process_states(state: &KernelState, violations: &mut Vec<InvariantViolation>) {
    for record in state.table.records() {
        let pid = record.pid;
        // The idle process and i-processes live outside the queues.
        if record.kind != ProcessKind::User {
            continue;
        }
        let home = record.link.home();
        let expected = match record.state {
            ProcState::New | ProcState::Ready => {
                Some(QueueTag::Ready(record.priority.queue_index()))
            }
            ProcState::BlockedOnMemory => {
                Some(QueueTag::Memory(record.priority.queue_index()))
            }
            ProcState::BlockedOnReceive => Some(QueueTag::Receive),
            ProcState::Running => None,
        };
        match (record.state, home, expected) {
            (ProcState::Running, Some(tag), _) => {
                violations.push(InvariantViolation::StateQueueMismatch {
                    pid,
                    state: ProcState::Running,
                    tag,
                });
            }
            (ProcState::Running, None, _) => {
                if state.current != pid {
                    violations.push(InvariantViolation::StrayRunning { pid });
                }
            }
            (proc_state, None, Some(_)) => {
                violations.push(InvariantViolation::MissingQueueMembership {
                    pid,
                    state: proc_state,
                });
            }
            _ => {}
        }
    }
}

fn check_current(state: &KernelState, violations: &mut Vec<InvariantViolation>) {
    let pid = state.current;
    match state.table.get(pid) {
        Some(record) => {
            if record.state != ProcState::Running {
                violations.push(InvariantViolation::CurrentNotRunning { pid });
            }
            if record.kind == ProcessKind::IProcess {
                violations.push(InvariantViolation::CurrentIsIProcess { pid });
            }
        }
        None => violations.push(InvariantViolation::CurrentNotRunning { pid }),
    }
}

fn check_envelope_queues(state: &KernelState, violations: &mut Vec<InvariantViolation>) {
    let mut seen: BTreeSet<BlockRef> = BTreeSet::new();
    let mut visit = |block: BlockRef, violations: &mut Vec<InvariantViolation>| {
        if !seen.insert(block) {
            violations.push(InvariantViolation::BlockMultiplyQueued { block });
        }
        if state.pool.envelope(block).is_err() {
            violations.push(InvariantViolation::QueuedBlockFree { block });
        }
    };

    for record in state.table.records() {
        for block in record.mailbox.members(&state.pool) {
            visit(block, violations);
        }
    }

    let mut last_deadline = 0;
    for block in state.timer_pending.members(&state.pool) {
        visit(block, violations);
        if let Ok(env) = state.pool.envelope(block) {
            if env.deadline < last_deadline {
                violations.push(InvariantViolation::TimerQueueUnsorted);
            }
            last_deadline = env.deadline;
        }
    }
}
