//! RTX kernel core
//!
//! The pure decision-making core of a small preemptive, priority-based
//! kernel: process scheduling, fixed-size block allocation, mailbox
//! message passing, and delayed delivery via a timer i-process.
//!
//! Everything here is a deterministic state machine over [`KernelState`].
//! The core never touches hardware: kernel calls go in through [`step`],
//! interrupt work through [`timer_tick`] and the non-blocking mailbox
//! paths, and context-switch decisions come back out as [`Dispatch`]
//! directives for a platform-specific runtime wrapper to carry out.
//!
//! No `std`, no allocator assumptions beyond `alloc`, no interior
//! mutability. Determinism is the point: every test drives the core
//! directly and asserts on the exact resulting state.

#![no_std]

extern crate alloc;

pub mod invariants;
pub mod mailbox;
pub mod pool;
pub mod queue;
pub mod sched;
pub mod state;
pub mod step;
pub mod table;
pub mod timer;
pub mod types;

pub use invariants::{assert_invariants, check_all_invariants, InvariantViolation};
pub use mailbox::EnvQueue;
pub use pool::BlockPool;
pub use queue::{PcbQueue, QueueTag};
pub use sched::Dispatch;
pub use state::KernelState;
pub use step::{deliver, release_and_wake, step, try_receive, CallResult, KernelCall, StepResult};
pub use table::{ProcessInit, ProcessRecord, ProcessTable};
pub use timer::{timer_tick, TickOutcome};
pub use types::{
    BlockRef, Envelope, KernelError, MessageKind, Priority, ProcState, ProcessId, ProcessKind,
    BLOCK_SIZE, IDLE_PID, MSG_CAPACITY, NUM_BLOCKS, PRIORITY_LEVELS, TIMER_PID, UART_PID,
};
