//! Aggregate kernel state
//!
//! [`KernelState`] owns everything the kernel core decides with: the
//! process table, the block pool, the scheduling queues, the timer's
//! pending-delivery queue, and the tick counter. It has no platform
//! dependencies; the runtime wrapper drives it and acts on the decisions.

use core::array;

use crate::mailbox::EnvQueue;
use crate::pool::BlockPool;
use crate::queue::{PcbQueue, QueueTag};
use crate::table::{ProcessInit, ProcessRecord, ProcessTable};
use crate::types::{
    KernelError, Priority, ProcState, ProcessId, ProcessKind, IDLE_PID, PRIORITY_LEVELS,
    TIMER_PID, UART_PID,
};

/// Stack size, in words, for the contexts of the reserved processes.
const RESERVED_STACK_WORDS: usize = 128;

/// The complete state of the kernel core.
pub struct KernelState {
    pub(crate) table: ProcessTable,
    pub(crate) pool: BlockPool,
    /// Ready queues, one per priority level, indexed by queue index.
    pub(crate) ready: [PcbQueue; PRIORITY_LEVELS],
    /// Blocked-on-memory queues, mirroring the ready array.
    pub(crate) blocked_on_memory: [PcbQueue; PRIORITY_LEVELS],
    /// Processes waiting on an empty mailbox. Unordered set; wakeups go
    /// through the ready queues, so FIFO order here carries no meaning.
    pub(crate) blocked_on_receive: PcbQueue,
    /// Delayed envelopes not yet due, sorted by ascending deadline.
    pub(crate) timer_pending: EnvQueue,
    /// Ticks elapsed since boot.
    pub(crate) tick: u64,
    /// The process that currently owns the processor.
    pub(crate) current: ProcessId,
    /// Whether sends to a higher-priority destination preempt the sender.
    /// Cleared while the timer redelivers due envelopes.
    pub(crate) preempt_on_send: bool,
}

impl KernelState {
    /// Build the boot state: reserved records for the idle process and the
    /// two i-processes, plus one record per entry in `inits`. User
    /// processes start `New` in their ready queues; the idle process is
    /// running.
    pub fn boot(inits: &[ProcessInit], pool_blocks: usize) -> Result<Self, KernelError> {
        let mut table = ProcessTable::new();

        let mut idle =
            ProcessRecord::new(IDLE_PID, ProcessKind::Idle, Priority::Idle, 0, RESERVED_STACK_WORDS);
        idle.state = ProcState::Running;
        table.insert(idle);
        table.insert(ProcessRecord::new(
            TIMER_PID,
            ProcessKind::IProcess,
            Priority::System,
            0,
            RESERVED_STACK_WORDS,
        ));
        table.insert(ProcessRecord::new(
            UART_PID,
            ProcessKind::IProcess,
            Priority::System,
            0,
            RESERVED_STACK_WORDS,
        ));

        for init in inits {
            if table.contains(init.pid) {
                return Err(KernelError::LookupFailure);
            }
            if init.priority.user_level().is_none() && init.priority != Priority::System {
                return Err(KernelError::InvalidPriority);
            }
            table.insert(ProcessRecord::new(
                init.pid,
                ProcessKind::User,
                init.priority,
                init.entry,
                init.stack_words,
            ));
        }

        let mut state = Self {
            table,
            pool: BlockPool::new(pool_blocks),
            ready: array::from_fn(|i| PcbQueue::new(QueueTag::Ready(i))),
            blocked_on_memory: array::from_fn(|i| PcbQueue::new(QueueTag::Memory(i))),
            blocked_on_receive: PcbQueue::new(QueueTag::Receive),
            timer_pending: EnvQueue::new(),
            tick: 0,
            current: IDLE_PID,
            preempt_on_send: true,
        };

        for init in inits {
            let index = init.priority.queue_index();
            state.ready[index].push_back(&mut state.table, init.pid);
        }

        Ok(state)
    }

    pub fn current(&self) -> ProcessId {
        self.current
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn priority_of(&self, pid: ProcessId) -> Option<Priority> {
        self.table.get(pid).map(|r| r.priority)
    }

    pub fn state_of(&self, pid: ProcessId) -> Option<ProcState> {
        self.table.get(pid).map(|r| r.state)
    }

    pub fn kind_of(&self, pid: ProcessId) -> Option<ProcessKind> {
        self.table.get(pid).map(|r| r.kind)
    }

    /// Number of free pool blocks.
    pub fn free_blocks(&self) -> usize {
        self.pool.capacity() - self.pool.occupied_count()
    }

    /// Number of envelopes queued in a process's mailbox.
    pub fn mailbox_len(&self, pid: ProcessId) -> usize {
        match self.table.get(pid) {
            Some(record) => record.mailbox.len(&self.pool),
            None => 0,
        }
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BlockPool {
        &mut self.pool
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }
}
