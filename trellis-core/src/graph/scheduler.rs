//! Update Scheduler
//!
//! The scheduler is the worklist of observers that a transaction must
//! finalize when it closes. Marking nodes stale only enqueues; the work
//! itself happens when the outermost transaction drains the queue.
//!
//! # Algorithm
//!
//! 1. A write marks every transitively dependent node possibly stale.
//! 2. Each reaction reached this way is enqueued exactly once, no matter how
//!    many paths lead to it.
//! 3. On close, reactions are validated in enqueue order. Validation pulls
//!    from dependencies, so upstream derived nodes recompute on demand
//!    before any reaction observes them. No topological sort is needed.
//! 4. Reactions that write while the queue drains enqueue further work onto
//!    the same queue.

use std::collections::{HashSet, VecDeque};

use super::node::NodeId;

/// FIFO worklist with set semantics.
#[derive(Debug, Default)]
pub(crate) struct UpdateScheduler {
    queue: VecDeque<NodeId>,
    queued: HashSet<NodeId>,
}

impl UpdateScheduler {
    /// Enqueue an observer. Returns false if it was already pending.
    pub fn enqueue(&mut self, id: NodeId) -> bool {
        if !self.queued.insert(id) {
            return false;
        }
        self.queue.push_back(id);
        true
    }

    /// Pop the next pending observer.
    pub fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.queue.pop_front() {
            if self.queued.remove(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Drop a pending observer, e.g. because it was disposed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        self.queued.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Remove and return everything still pending, in order.
    pub fn drain(&mut self) -> Vec<NodeId> {
        std::iter::from_fn(|| self.next()).collect()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> NodeId {
        NodeId::from_parts(index, 0)
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut scheduler = UpdateScheduler::default();
        assert!(scheduler.enqueue(id(1)));
        assert!(!scheduler.enqueue(id(1)));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next(), Some(id(1)));
        assert_eq!(scheduler.next(), None);
    }

    #[test]
    fn drains_in_enqueue_order() {
        let mut scheduler = UpdateScheduler::default();
        scheduler.enqueue(id(3));
        scheduler.enqueue(id(1));
        scheduler.enqueue(id(2));

        let order: Vec<_> = std::iter::from_fn(|| scheduler.next()).collect();
        assert_eq!(order, vec![id(3), id(1), id(2)]);
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn removed_entries_are_skipped() {
        let mut scheduler = UpdateScheduler::default();
        scheduler.enqueue(id(1));
        scheduler.enqueue(id(2));
        assert!(scheduler.remove(id(1)));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next(), Some(id(2)));
        assert_eq!(scheduler.next(), None);
    }

    #[test]
    fn requeue_after_drain() {
        let mut scheduler = UpdateScheduler::default();
        scheduler.enqueue(id(1));
        assert_eq!(scheduler.next(), Some(id(1)));
        assert!(scheduler.enqueue(id(1)));
        assert_eq!(scheduler.next(), Some(id(1)));
    }
}
