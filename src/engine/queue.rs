// src/engine/queue.rs

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::dag::thunk::TaskId;

/// Private, ordered work list of one executor.
///
/// Invariants:
/// - no duplicates;
/// - the most recently enqueued task sits at the tail, so tail-to-head
///   scans are LIFO and favor depth-first completion.
#[derive(Debug, Default)]
pub struct ReservedQueue {
    order: VecDeque<TaskId>,
    members: FxHashSet<TaskId>,
}

impl ReservedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task, or move it to the tail if already present.
    pub fn enqueue(&mut self, task: TaskId) {
        if self.members.contains(&task) {
            if self.order.back() == Some(&task) {
                return;
            }
            self.order.retain(|t| *t != task);
        } else {
            self.members.insert(task);
        }
        self.order.push_back(task);
    }

    /// Remove the last occurrence of a task, if present.
    pub fn dequeue(&mut self, task: TaskId) {
        if self.members.remove(&task) {
            if let Some(pos) = self.order.iter().rposition(|t| *t == task) {
                self.order.remove(pos);
            }
        }
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.members.contains(&task)
    }

    /// Tail-to-head iteration, matching the reservation scan order.
    pub fn iter_rev(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.order.iter().rev().copied()
    }

    pub fn tail(&self) -> Option<TaskId> {
        self.order.back().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Outcome of a [`ShareRing::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The task is already in the ring; nothing was inserted.
    Duplicate,
    /// The ring is at capacity; the caller must place the task elsewhere.
    Full,
}

/// Bounded deque of tasks one executor offers to its peers.
///
/// Every operation (push, steal, length) happens under the ring's one
/// lock, because control decisions depend on absence (duplicate
/// rejection, empty detection) and a stale snapshot would break them.
/// The duplicate scan walks the ring under the same lock; capacity is
/// fixed at construction.
#[derive(Debug)]
pub struct ShareRing {
    slots: Mutex<VecDeque<TaskId>>,
    capacity: usize,
}

impl ShareRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, task: TaskId) -> PushOutcome {
        let mut slots = self.slots.lock();
        if slots.iter().any(|t| *t == task) {
            return PushOutcome::Duplicate;
        }
        if slots.len() >= self.capacity {
            return PushOutcome::Full;
        }
        slots.push_back(task);
        PushOutcome::Pushed
    }

    /// Steal the oldest offering not already in `taken`.
    ///
    /// The lock is held across the whole loop so one atomic act selects a
    /// task; previously-taken duplicates (possible when a task is
    /// transiently re-shared) are discarded along the way. Returns `None`
    /// when the ring drains.
    pub fn steal(&self, taken: &FxHashSet<TaskId>) -> Option<TaskId> {
        let mut slots = self.slots.lock();
        while let Some(task) = slots.pop_front() {
            if !taken.contains(&task) {
                return Some(task);
            }
        }
        None
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.slots.lock().iter().any(|t| *t == task)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::thunk::{ThunkBuilder, Value};

    fn task(n: i64) -> TaskId {
        ThunkBuilder::literal(Value::Int(n)).build().id()
    }

    #[test]
    fn enqueue_moves_existing_task_to_tail() {
        let mut q = ReservedQueue::new();
        let (a, b, c) = (task(1), task(2), task(3));
        q.enqueue(a);
        q.enqueue(b);
        q.enqueue(c);
        q.enqueue(a);

        assert_eq!(q.len(), 3);
        assert_eq!(q.tail(), Some(a));
        let order: Vec<_> = q.iter_rev().collect();
        assert_eq!(order, vec![a, c, b]);
    }

    #[test]
    fn dequeue_removes_membership() {
        let mut q = ReservedQueue::new();
        let (a, b) = (task(1), task(2));
        q.enqueue(a);
        q.enqueue(b);
        q.dequeue(a);

        assert!(!q.contains(a));
        assert_eq!(q.tail(), Some(b));
        q.dequeue(a); // absent; no-op
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn ring_rejects_duplicates_and_overflow() {
        let ring = ShareRing::new(2);
        let (a, b, c) = (task(1), task(2), task(3));

        assert_eq!(ring.push(a), PushOutcome::Pushed);
        assert_eq!(ring.push(a), PushOutcome::Duplicate);
        assert_eq!(ring.push(b), PushOutcome::Pushed);
        assert_eq!(ring.push(c), PushOutcome::Full);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn steal_is_fifo_and_skips_taken() {
        let ring = ShareRing::new(8);
        let (a, b, c) = (task(1), task(2), task(3));
        ring.push(a);
        ring.push(b);
        ring.push(c);

        let mut taken = FxHashSet::default();
        taken.insert(a);
        taken.insert(b);

        assert_eq!(ring.steal(&taken), Some(c));
        assert!(ring.is_empty());
    }

    #[test]
    fn steal_on_empty_or_fully_taken_ring_returns_none() {
        let ring = ShareRing::new(4);
        let taken = FxHashSet::default();
        assert_eq!(ring.steal(&taken), None);

        let a = task(1);
        ring.push(a);
        let mut taken = FxHashSet::default();
        taken.insert(a);
        assert_eq!(ring.steal(&taken), None);
        assert!(ring.is_empty());
    }
}
