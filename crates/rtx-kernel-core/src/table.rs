//! Process table
//!
//! One record per process, created at boot and never destroyed. The record
//! owns everything per-process the kernel core tracks: scheduling fields,
//! the mailbox, and the queue link cell.

use alloc::collections::BTreeMap;

use crate::mailbox::EnvQueue;
use crate::queue::LinkCell;
use crate::types::{Priority, ProcState, ProcessId, ProcessKind};

/// Boot-time description of one user process.
#[derive(Clone, Copy, Debug)]
pub struct ProcessInit {
    pub pid: ProcessId,
    pub priority: Priority,
    /// Entry point handed to the platform when the first context is built.
    pub entry: usize,
    /// Stack size, in words, for the platform context.
    pub stack_words: usize,
}

/// Everything the kernel core tracks about one process.
#[derive(Clone, Debug)]
pub struct ProcessRecord {
    pub pid: ProcessId,
    pub kind: ProcessKind,
    pub priority: Priority,
    pub state: ProcState,
    pub mailbox: EnvQueue,
    pub entry: usize,
    pub stack_words: usize,
    pub(crate) link: LinkCell,
}

impl ProcessRecord {
    pub fn new(
        pid: ProcessId,
        kind: ProcessKind,
        priority: Priority,
        entry: usize,
        stack_words: usize,
    ) -> Self {
        Self {
            pid,
            kind,
            priority,
            state: ProcState::New,
            mailbox: EnvQueue::new(),
            entry,
            stack_words,
            link: LinkCell::unlinked(),
        }
    }
}

/// All process records, keyed by pid.
pub struct ProcessTable {
    records: BTreeMap<ProcessId, ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, record: ProcessRecord) {
        self.records.insert(record.pid, record);
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn get(&self, pid: ProcessId) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut ProcessRecord> {
        self.records.get_mut(&pid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.records.keys().copied()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    /// Queue link cell of a known process. The table is populated once at
    /// boot, so an unknown pid here is a kernel bug, not a caller error.
    pub(crate) fn link(&self, pid: ProcessId) -> &LinkCell {
        match self.records.get(&pid) {
            Some(record) => &record.link,
            None => panic!("no table record for process {}", pid.0),
        }
    }

    pub(crate) fn link_mut(&mut self, pid: ProcessId) -> &mut LinkCell {
        match self.records.get_mut(&pid) {
            Some(record) => &mut record.link,
            None => panic!("no table record for process {}", pid.0),
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_start_new_and_unlinked() {
        let record = ProcessRecord::new(ProcessId(3), ProcessKind::User, Priority::Low, 0x40, 128);
        assert_eq!(record.state, ProcState::New);
        assert!(record.mailbox.is_empty());
        assert_eq!(record.link.home(), None);
    }

    #[test]
    fn test_lookup() {
        let mut table = ProcessTable::new();
        table.insert(ProcessRecord::new(
            ProcessId(1),
            ProcessKind::User,
            Priority::High,
            0,
            64,
        ));

        assert!(table.contains(ProcessId(1)));
        assert!(!table.contains(ProcessId(2)));
        assert_eq!(table.get(ProcessId(1)).map(|r| r.priority), Some(Priority::High));
        assert_eq!(table.len(), 1);
    }

    #[test]
    #[should_panic(expected = "no table record")]
    fn test_link_of_unknown_pid_panics() {
        let table = ProcessTable::new();
        let _ = table.link(ProcessId(99));
    }
}
