//! Admission queue: ready mirrors ordered by weight, FIFO within a weight.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One queued admission request. `ticket` is globally increasing, so it
/// both orders equal weights and identifies the enqueue it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueEntry {
    pub(crate) weight: i8,
    pub(crate) ticket: u64,
    pub(crate) name: String,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| other.ticket.cmp(&self.ticket))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap of entries. Stale ones (deactivated or removed mirrors) are
/// discarded when they surface, or when the same mirror is pushed again, so
/// the heap holds at most one entry per mirror name.
#[derive(Debug, Default)]
pub(crate) struct AdmissionQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl AdmissionQueue {
    /// A mirror is only pushed when it is not Queued, so any entry already
    /// carrying its name is stale.
    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.heap.retain(|queued| queued.name != entry.name);
        self.heap.push(entry);
    }

    /// Next entry to admit, left in place.
    pub(crate) fn peek(&self) -> Option<&QueueEntry> {
        self.heap.peek()
    }

    pub(crate) fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, weight: i8, ticket: u64) -> QueueEntry {
        QueueEntry {
            weight,
            ticket,
            name: name.to_string(),
        }
    }

    #[test]
    fn higher_weight_first_then_fifo() {
        let mut q = AdmissionQueue::default();
        q.push(entry("low", -5, 1));
        q.push(entry("mid-a", 0, 2));
        q.push(entry("high", 10, 3));
        q.push(entry("mid-b", 0, 4));
        q.push(entry("mid-c", 0, 5));
        assert_eq!(q.len(), 5);

        let order: Vec<_> = std::iter::from_fn(|| q.pop().map(|e| e.name)).collect();
        assert_eq!(order, vec!["high", "mid-a", "mid-b", "mid-c", "low"]);
    }

    #[test]
    fn pushing_a_name_again_replaces_its_entry() {
        let mut q = AdmissionQueue::default();
        q.push(entry("a", 0, 1));
        q.push(entry("b", 0, 2));
        q.push(entry("a", 0, 3));
        assert_eq!(q.len(), 2);

        let order: Vec<_> = std::iter::from_fn(|| q.pop().map(|e| (e.name, e.ticket))).collect();
        assert_eq!(order, vec![("b".to_string(), 2), ("a".to_string(), 3)]);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut q = AdmissionQueue::default();
        q.push(entry("a", 1, 1));
        assert_eq!(q.peek().map(|e| e.name.as_str()), Some("a"));
        assert_eq!(q.len(), 1);
        assert!(q.pop().is_some());
        assert!(q.peek().is_none());
    }
}
