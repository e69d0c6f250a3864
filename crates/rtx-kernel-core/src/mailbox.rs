//! Envelope queues
//!
//! FIFO queues of envelopes, linked through the pool slots the envelopes
//! live in. Each process record owns one as its mailbox; the timer holds a
//! second, deadline-sorted one for pending delayed deliveries.
//!
//! A block is a member of at most one envelope queue at a time. The queue
//! does not own the pool; every operation borrows it.

use serde::{Deserialize, Serialize};

use crate::pool::BlockPool;
use crate::types::{BlockRef, ProcessId};

/// FIFO queue of pool-resident envelopes.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EnvQueue {
    head: Option<BlockRef>,
    tail: Option<BlockRef>,
}

impl EnvQueue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn peek(&self) -> Option<BlockRef> {
        self.head
    }

    pub fn len(&self, pool: &BlockPool) -> usize {
        let mut count = 0;
        let mut cursor = self.head;
        while let Some(block) = cursor {
            count += 1;
            cursor = pool.link(block);
        }
        count
    }

    /// Append an envelope at the tail.
    pub fn enqueue(&mut self, pool: &mut BlockPool, block: BlockRef) {
        pool.set_link(block, None);
        match self.tail {
            None => {
                self.head = Some(block);
                self.tail = Some(block);
            }
            Some(tail) => {
                pool.set_link(tail, Some(block));
                self.tail = Some(block);
            }
        }
    }

    /// Dequeue the head envelope, if any.
    pub fn dequeue(&mut self, pool: &mut BlockPool) -> Option<BlockRef> {
        let head = self.head?;
        self.head = pool.link(head);
        if self.head.is_none() {
            self.tail = None;
        }
        pool.set_link(head, None);
        Some(head)
    }

    /// Dequeue the oldest envelope sent by `sender`, splicing it out from
    /// anywhere in the queue.
    pub fn dequeue_from(&mut self, pool: &mut BlockPool, sender: ProcessId) -> Option<BlockRef> {
        let head = self.head?;
        let head_sender = pool.envelope(head).ok()?.sender;
        if head_sender == sender {
            return self.dequeue(pool);
        }

        let mut prev = head;
        loop {
            let candidate = pool.link(prev)?;
            let matches = match pool.envelope(candidate) {
                Ok(env) => env.sender == sender,
                Err(_) => false,
            };
            if matches {
                let after = pool.link(candidate);
                pool.set_link(prev, after);
                if after.is_none() {
                    self.tail = Some(prev);
                }
                pool.set_link(candidate, None);
                return Some(candidate);
            }
            prev = candidate;
        }
    }

    /// Insert an envelope in ascending deadline order. Envelopes with equal
    /// deadlines keep their arrival order.
    pub fn insert_by_deadline(&mut self, pool: &mut BlockPool, block: BlockRef) {
        let deadline = match pool.envelope(block) {
            Ok(env) => env.deadline,
            Err(_) => return,
        };
        pool.set_link(block, None);

        let Some(head) = self.head else {
            self.head = Some(block);
            self.tail = Some(block);
            return;
        };

        let head_deadline = pool.envelope(head).map(|e| e.deadline).unwrap_or(0);
        if deadline < head_deadline {
            pool.set_link(block, Some(head));
            self.head = Some(block);
            return;
        }

        // Find the last envelope whose deadline is <= the new one.
        let mut prev = head;
        loop {
            match pool.link(prev) {
                Some(next) => {
                    let next_deadline = pool.envelope(next).map(|e| e.deadline).unwrap_or(0);
                    if deadline < next_deadline {
                        pool.set_link(block, Some(next));
                        pool.set_link(prev, Some(block));
                        return;
                    }
                    prev = next;
                }
                None => {
                    pool.set_link(prev, Some(block));
                    self.tail = Some(block);
                    return;
                }
            }
        }
    }

    /// Member blocks in queue order. Used by invariant checks and tests.
    pub fn members(&self, pool: &BlockPool) -> alloc::vec::Vec<BlockRef> {
        let mut out = alloc::vec::Vec::new();
        let mut cursor = self.head;
        while let Some(block) = cursor {
            out.push(block);
            cursor = pool.link(block);
        }
        out
    }
}
