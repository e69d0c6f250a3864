//! Intrusive process queues
//!
//! FIFO queues threaded through per-process link cells. Every process owns
//! exactly one link cell, embedded in its process-table record for the
//! process's whole lifetime; a queue borrows the cell while the process is
//! a member. The cell records which queue currently holds it, so the
//! "member of at most one queue" invariant is directly checkable.
//!
//! Removal is a single traversal that re-derives the tail from the list
//! itself; there are no head/tail special cases spread across call sites.

use serde::{Deserialize, Serialize};

use crate::table::ProcessTable;
use crate::types::ProcessId;

/// Identity of a queue a link cell can be a member of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueTag {
    /// Ready queue for the priority level at this queue index.
    Ready(usize),
    /// Blocked-on-memory queue for the priority level at this queue index.
    Memory(usize),
    /// The blocked-on-receive set.
    Receive,
}

/// Per-process queue linkage. One cell per process, owned by its table
/// record; never constructed as a transient.
#[derive(Clone, Copy, Debug)]
pub struct LinkCell {
    pub(crate) next: Option<ProcessId>,
    pub(crate) home: Option<QueueTag>,
}

impl LinkCell {
    pub(crate) fn unlinked() -> Self {
        Self {
            next: None,
            home: None,
        }
    }

    /// Which queue currently holds this cell, if any.
    pub fn home(&self) -> Option<QueueTag> {
        self.home
    }
}

/// FIFO queue of processes, linked through their table-resident cells.
#[derive(Clone, Copy, Debug)]
pub struct PcbQueue {
    head: Option<ProcessId>,
    tail: Option<ProcessId>,
    tag: QueueTag,
}

impl PcbQueue {
    pub const fn new(tag: QueueTag) -> Self {
        Self {
            head: None,
            tail: None,
            tag,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<ProcessId> {
        self.head
    }

    pub fn tag(&self) -> QueueTag {
        self.tag
    }

    /// Append `pid` at the tail.
    ///
    /// Panics if the process is already a member of any queue: moving a
    /// process between queues is remove-then-insert, never a copy, and a
    /// double insert means scheduling state is already corrupt.
    pub fn push_back(&mut self, table: &mut ProcessTable, pid: ProcessId) {
        let tag = self.tag;
        let cell = table.link_mut(pid);
        if let Some(home) = cell.home {
            panic!(
                "process {} already linked into {:?} while inserting into {:?}",
                pid.0, home, tag
            );
        }
        cell.next = None;
        cell.home = Some(self.tag);

        match self.tail {
            None => {
                self.head = Some(pid);
                self.tail = Some(pid);
            }
            Some(tail) => {
                table.link_mut(tail).next = Some(pid);
                self.tail = Some(pid);
            }
        }
    }

    /// Dequeue the head, if any.
    pub fn pop_front(&mut self, table: &mut ProcessTable) -> Option<ProcessId> {
        let head = self.head?;
        let cell = table.link_mut(head);
        debug_assert_eq!(cell.home, Some(self.tag));
        self.head = cell.next;
        if self.head.is_none() {
            self.tail = None;
        }
        cell.next = None;
        cell.home = None;
        Some(head)
    }

    /// Remove `pid` from anywhere in the queue. Returns whether it was a
    /// member. The tail is re-derived from the traversal itself.
    pub fn remove(&mut self, table: &mut ProcessTable, pid: ProcessId) -> bool {
        let Some(head) = self.head else {
            return false;
        };
        if head == pid {
            self.pop_front(table);
            return true;
        }

        let mut prev = head;
        loop {
            let next = table.link(prev).next;
            match next {
                None => return false,
                Some(candidate) if candidate == pid => {
                    let after = table.link(candidate).next;
                    table.link_mut(prev).next = after;
                    if after.is_none() {
                        // prev is the last node the traversal reached.
                        self.tail = Some(prev);
                    }
                    let cell = table.link_mut(candidate);
                    cell.next = None;
                    cell.home = None;
                    return true;
                }
                Some(candidate) => prev = candidate,
            }
        }
    }

    /// Whether `pid` is a member, by walking the links.
    pub fn contains(&self, table: &ProcessTable, pid: ProcessId) -> bool {
        let mut cursor = self.head;
        while let Some(member) = cursor {
            if member == pid {
                return true;
            }
            cursor = table.link(member).next;
        }
        false
    }

    /// Members in queue order. Used by invariant checks and tests.
    pub fn members(&self, table: &ProcessTable) -> alloc::vec::Vec<ProcessId> {
        let mut out = alloc::vec::Vec::new();
        let mut cursor = self.head;
        while let Some(member) = cursor {
            out.push(member);
            cursor = table.link(member).next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ProcessRecord;
    use crate::types::{Priority, ProcessKind};

    fn table_with_pids(pids: &[u32]) -> ProcessTable {
        let mut table = ProcessTable::new();
        for &pid in pids {
            table.insert(ProcessRecord::new(
                ProcessId(pid),
                ProcessKind::User,
                Priority::Medium,
                0,
                64,
            ));
        }
        table
    }

    #[test]
    fn test_fifo_order() {
        let mut table = table_with_pids(&[1, 2, 3]);
        let mut q = PcbQueue::new(QueueTag::Ready(2));

        q.push_back(&mut table, ProcessId(1));
        q.push_back(&mut table, ProcessId(2));
        q.push_back(&mut table, ProcessId(3));

        assert_eq!(q.pop_front(&mut table), Some(ProcessId(1)));
        assert_eq!(q.pop_front(&mut table), Some(ProcessId(2)));
        assert_eq!(q.pop_front(&mut table), Some(ProcessId(3)));
        assert_eq!(q.pop_front(&mut table), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_membership_tag_set_and_cleared() {
        let mut table = table_with_pids(&[7]);
        let mut q = PcbQueue::new(QueueTag::Memory(1));

        q.push_back(&mut table, ProcessId(7));
        assert_eq!(table.link(ProcessId(7)).home(), Some(QueueTag::Memory(1)));

        q.pop_front(&mut table);
        assert_eq!(table.link(ProcessId(7)).home(), None);
    }

    #[test]
    fn test_remove_middle_keeps_order_and_tail() {
        let mut table = table_with_pids(&[1, 2, 3, 4]);
        let mut q = PcbQueue::new(QueueTag::Ready(1));
        for pid in 1..=4 {
            q.push_back(&mut table, ProcessId(pid));
        }

        assert!(q.remove(&mut table, ProcessId(2)));
        assert_eq!(
            q.members(&table),
            alloc::vec![ProcessId(1), ProcessId(3), ProcessId(4)]
        );

        // The tail must still be live: appending lands after 4.
        q.push_back(&mut table, ProcessId(2));
        assert_eq!(
            q.members(&table),
            alloc::vec![ProcessId(1), ProcessId(3), ProcessId(4), ProcessId(2)]
        );
    }

    #[test]
    fn test_remove_tail_rederives_tail() {
        let mut table = table_with_pids(&[1, 2, 3]);
        let mut q = PcbQueue::new(QueueTag::Ready(1));
        for pid in 1..=3 {
            q.push_back(&mut table, ProcessId(pid));
        }

        assert!(q.remove(&mut table, ProcessId(3)));
        q.push_back(&mut table, ProcessId(3));
        assert_eq!(
            q.members(&table),
            alloc::vec![ProcessId(1), ProcessId(2), ProcessId(3)]
        );
    }

    #[test]
    fn test_remove_head_and_only_element() {
        let mut table = table_with_pids(&[5]);
        let mut q = PcbQueue::new(QueueTag::Receive);
        q.push_back(&mut table, ProcessId(5));

        assert!(q.remove(&mut table, ProcessId(5)));
        assert!(q.is_empty());
        assert_eq!(table.link(ProcessId(5)).home(), None);

        assert!(!q.remove(&mut table, ProcessId(5)));
    }

    #[test]
    fn test_remove_absent_returns_false() {
        let mut table = table_with_pids(&[1, 2]);
        let mut q = PcbQueue::new(QueueTag::Ready(3));
        q.push_back(&mut table, ProcessId(1));
        assert!(!q.remove(&mut table, ProcessId(2)));
        assert_eq!(q.members(&table), alloc::vec![ProcessId(1)]);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn test_double_insert_panics() {
        let mut table = table_with_pids(&[1]);
        let mut a = PcbQueue::new(QueueTag::Ready(1));
        let mut b = PcbQueue::new(QueueTag::Memory(1));
        a.push_back(&mut table, ProcessId(1));
        b.push_back(&mut table, ProcessId(1));
    }

    #[test]
    fn test_contains_walks_links() {
        let mut table = table_with_pids(&[1, 2, 3]);
        let mut q = PcbQueue::new(QueueTag::Ready(1));
        q.push_back(&mut table, ProcessId(1));
        q.push_back(&mut table, ProcessId(3));

        assert!(q.contains(&table, ProcessId(1)));
        assert!(q.contains(&table, ProcessId(3)));
        assert!(!q.contains(&table, ProcessId(2)));
    }
}
