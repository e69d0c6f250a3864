//! Core kernel types
//!
//! Fundamental types used throughout the kernel core. Everything here is
//! pure data - no behavior that depends on the platform.

use serde::{Deserialize, Serialize};

/// Process identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

/// The reserved idle process. Always present, always runnable, never
/// threaded through the normal ready queues.
pub const IDLE_PID: ProcessId = ProcessId(0);

/// The timer i-process. Owns the mailbox that delayed envelopes are routed
/// through; never scheduled.
pub const TIMER_PID: ProcessId = ProcessId(14);

/// The UART i-process. Owns the outbound-character mailbox; never scheduled.
pub const UART_PID: ProcessId = ProcessId(15);

/// Scheduling priority. `System` outranks every user level and is serviced
/// unconditionally; `Idle` is reserved for the idle process. User code may
/// only assign `High` through `Lowest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Reserved class for system processes; always serviced first.
    System,
    High,
    Medium,
    Low,
    Lowest,
    /// Reserved level of the idle process.
    Idle,
}

/// Number of priority levels, including the reserved System and Idle ones.
pub const PRIORITY_LEVELS: usize = 6;

impl Priority {
    /// Queue index of this level. Lower index means higher priority; the
    /// ready and blocked-on-memory queue arrays are indexed by this.
    pub fn queue_index(self) -> usize {
        match self {
            Priority::System => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
            Priority::Lowest => 4,
            Priority::Idle => 5,
        }
    }

    /// Level from a queue index, for iterating the queue arrays.
    pub fn from_queue_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Priority::System),
            1 => Some(Priority::High),
            2 => Some(Priority::Medium),
            3 => Some(Priority::Low),
            4 => Some(Priority::Lowest),
            5 => Some(Priority::Idle),
            _ => None,
        }
    }

    /// Map a user-visible level number (0 = highest) to a priority.
    /// Only the four user levels are addressable this way.
    pub fn from_user_level(level: u32) -> Option<Self> {
        match level {
            0 => Some(Priority::High),
            1 => Some(Priority::Medium),
            2 => Some(Priority::Low),
            3 => Some(Priority::Lowest),
            _ => None,
        }
    }

    /// User-visible level number, if this is a user level.
    pub fn user_level(self) -> Option<u32> {
        match self {
            Priority::High => Some(0),
            Priority::Medium => Some(1),
            Priority::Low => Some(2),
            Priority::Lowest => Some(3),
            _ => None,
        }
    }

    /// Strictly higher priority than `other`.
    pub fn outranks(self, other: Priority) -> bool {
        self.queue_index() < other.queue_index()
    }
}

/// Process lifecycle state.
///
/// `New -> Ready -> Running -> {Ready, BlockedOnMemory, BlockedOnReceive}
/// -> Ready -> ...` - processes never reach a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcState {
    /// Created but never dispatched; its first dispatch synthesizes a
    /// fresh initial context.
    New,
    /// Runnable, waiting in a ready queue.
    Ready,
    /// Currently owns the processor.
    Running,
    /// Waiting for any pool block to become free.
    BlockedOnMemory,
    /// Waiting for its own mailbox to become non-empty.
    BlockedOnReceive,
}

/// What kind of process a table record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessKind {
    /// Ordinary scheduled process.
    User,
    /// The reserved idle process.
    Idle,
    /// Interrupt-triggered pseudo-process; owns a mailbox but is never
    /// scheduled and never blocks.
    IProcess,
}

/// Message-type tag carried in every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Default,
    /// A completed console input line from the UART i-process.
    ConsoleInput,
    /// Command registration with the keyboard command decoder.
    CommandRegistration,
    /// Wall-clock display traffic.
    WallClock,
}

// ============================================================================
// Block pool geometry
// ============================================================================

/// Size of one pool block in bytes. Every envelope occupies exactly one
/// block: header plus inline payload.
pub const BLOCK_SIZE: usize = 128;

/// Default number of pool blocks.
pub const NUM_BLOCKS: usize = 20;

/// Bytes of envelope payload that fit in a block alongside the header.
pub const MSG_CAPACITY: usize = 96;

/// Handle to a pool block: a byte offset into the pool region.
///
/// Valid handles are in range and aligned to [`BLOCK_SIZE`]; anything else
/// is rejected with [`KernelError::InvalidAddress`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRef(pub u32);

impl BlockRef {
    /// Handle for the pool slot at `index`.
    pub fn from_index(index: usize) -> Self {
        BlockRef((index * BLOCK_SIZE) as u32)
    }

    /// Byte offset of this handle.
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

/// A message unit: routing header plus inline payload, stored in the pool
/// block the sender allocated for it. The kernel never frees an envelope;
/// whoever finishes consuming it releases the block.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Process that sent the envelope.
    pub sender: ProcessId,
    /// Process the envelope is addressed to.
    pub destination: ProcessId,
    /// Message-type tag.
    pub kind: MessageKind,
    /// Absolute tick at which a delayed envelope becomes deliverable;
    /// zero for immediate sends.
    pub deadline: u64,
    len: usize,
    payload: [u8; MSG_CAPACITY],
}

impl Envelope {
    /// An empty envelope with cleared routing fields.
    pub fn empty() -> Self {
        Self {
            sender: IDLE_PID,
            destination: IDLE_PID,
            kind: MessageKind::Default,
            deadline: 0,
            len: 0,
            payload: [0; MSG_CAPACITY],
        }
    }

    /// The payload bytes currently stored in the envelope.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Copy `data` into the inline payload region, truncating to
    /// [`MSG_CAPACITY`]. Returns the number of bytes stored.
    pub fn write_payload(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(MSG_CAPACITY);
        self.payload[..n].copy_from_slice(&data[..n]);
        self.len = n;
        n
    }

    /// Reset the envelope to its post-allocation state.
    pub fn clear(&mut self) {
        *self = Envelope::empty();
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Recoverable kernel errors.
///
/// Pool exhaustion is never surfaced as an error - it is resolved by
/// blocking the caller. Structurally impossible queue states are fatal and
/// panic instead of returning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Free of a null, out-of-range, misaligned, or unoccupied block.
    InvalidAddress,
    /// Priority level outside the user-assignable range.
    InvalidPriority,
    /// Unknown or non-addressable process id.
    LookupFailure,
}
