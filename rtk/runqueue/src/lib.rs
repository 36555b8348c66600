#![no_std]
#![forbid(unsafe_code)]

//! # rtk run queue
//!
//! One FIFO of thread identifiers per priority level plus a bit cache that
//! records which levels are non-empty. Selecting the next thread is a
//! `leading_zeros` on the cache followed by a peek at that level's head, so
//! the cost does not depend on how many threads are ready.
//!
//! The queue knows nothing about thread states. The scheduler decides who
//! goes in and out; this crate only keeps the order.

use heapless::Deque;
use rtk_core::{Priority, ThreadId, SCHED_PRIO_LEVELS, THREADS_NUMOF};

/// Bit cache of non-empty priority levels
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LevelCache {
    bits: u32,
}

impl LevelCache {
    /// Empty cache
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    fn insert(&mut self, prio: Priority) {
        self.bits |= 1u32 << prio.raw();
    }

    fn remove(&mut self, prio: Priority) {
        self.bits &= !(1u32 << prio.raw());
    }

    /// True if `prio` has at least one queued thread.
    pub fn contains(&self, prio: Priority) -> bool {
        (self.bits & (1u32 << prio.raw())) != 0
    }

    /// Most urgent non-empty level
    pub fn max(&self) -> Option<Priority> {
        if self.bits == 0 {
            None
        } else {
            Some(Priority::new_unchecked(31 - self.bits.leading_zeros() as u8))
        }
    }

    /// Raw bitmap, bit `n` set when level `n` is non-empty
    pub const fn bits(&self) -> u32 {
        self.bits
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LevelCache {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "LevelCache({=u32:#b})", self.bits);
    }
}

/// Ready queues for every priority level
pub struct RunQueue {
    queues: [Deque<ThreadId, THREADS_NUMOF>; SCHED_PRIO_LEVELS],
    cache: LevelCache,
}

impl RunQueue {
    /// Create an empty run queue
    pub const fn new() -> Self {
        Self {
            queues: [const { Deque::new() }; SCHED_PRIO_LEVELS],
            cache: LevelCache::new(),
        }
    }

    /// Append `pid` at the tail of its level.
    ///
    /// Fails, handing the identifier back, only if the level already holds
    /// every thread the table can contain.
    pub fn push_back(&mut self, pid: ThreadId, prio: Priority) -> Result<(), ThreadId> {
        self.queues[prio.index()].push_back(pid)?;
        self.cache.insert(prio);
        Ok(())
    }

    /// Insert `pid` at the head of its level, ahead of its peers.
    pub fn push_front(&mut self, pid: ThreadId, prio: Priority) -> Result<(), ThreadId> {
        self.queues[prio.index()].push_front(pid)?;
        self.cache.insert(prio);
        Ok(())
    }

    /// Remove and return the head of a level.
    pub fn pop_head(&mut self, prio: Priority) -> Option<ThreadId> {
        let queue = &mut self.queues[prio.index()];
        let pid = queue.pop_front();
        if queue.is_empty() {
            self.cache.remove(prio);
        }
        pid
    }

    /// Remove `pid` wherever it sits in its level, keeping the order of the
    /// others. Returns `false` if it was not queued there.
    pub fn remove(&mut self, pid: ThreadId, prio: Priority) -> bool {
        let queue = &mut self.queues[prio.index()];
        let mut found = false;
        for _ in 0..queue.len() {
            let Some(head) = queue.pop_front() else {
                break;
            };
            if head == pid && !found {
                found = true;
            } else {
                // Cannot fail: one element was just popped.
                let _ = queue.push_back(head);
            }
        }
        if queue.is_empty() {
            self.cache.remove(prio);
        }
        found
    }

    /// Rotate a level by one: the head moves to the tail.
    pub fn advance(&mut self, prio: Priority) {
        let queue = &mut self.queues[prio.index()];
        if let Some(head) = queue.pop_front() {
            let _ = queue.push_back(head);
        }
    }

    /// Most urgent non-empty level
    pub fn highest(&self) -> Option<Priority> {
        self.cache.max()
    }

    /// Head of the most urgent non-empty level, without removing it.
    pub fn peek_next(&self) -> Option<(ThreadId, Priority)> {
        let prio = self.cache.max()?;
        self.queues[prio.index()].front().map(|pid| (*pid, prio))
    }

    /// Remove and return the head of the most urgent non-empty level.
    pub fn pop_next(&mut self) -> Option<(ThreadId, Priority)> {
        let prio = self.cache.max()?;
        self.pop_head(prio).map(|pid| (pid, prio))
    }

    /// True if `pid` is queued at `prio`.
    pub fn contains(&self, pid: ThreadId, prio: Priority) -> bool {
        self.queues[prio.index()].iter().any(|queued| *queued == pid)
    }

    /// Threads queued at `prio`, head first
    pub fn iter_level(&self, prio: Priority) -> impl Iterator<Item = ThreadId> + '_ {
        self.queues[prio.index()].iter().copied()
    }

    /// Number of threads queued at `prio`
    pub fn level_len(&self, prio: Priority) -> usize {
        self.queues[prio.index()].len()
    }

    /// Total number of queued threads
    pub fn len(&self) -> usize {
        self.queues.iter().map(Deque::len).sum()
    }

    /// True if no thread is queued at any level.
    pub fn is_empty(&self) -> bool {
        self.cache.bits() == 0
    }

    /// Snapshot of the level cache
    pub fn cache(&self) -> LevelCache {
        self.cache
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u8) -> ThreadId {
        ThreadId::new(raw).unwrap()
    }

    fn prio(raw: u8) -> Priority {
        Priority::new(raw).unwrap()
    }

    #[test]
    fn cache_tracks_non_empty_levels() {
        let mut rq = RunQueue::new();
        assert!(rq.is_empty());
        assert_eq!(rq.highest(), None);

        rq.push_back(pid(1), prio(3)).unwrap();
        rq.push_back(pid(2), prio(7)).unwrap();
        assert_eq!(rq.cache().bits(), (1 << 3) | (1 << 7));
        assert_eq!(rq.highest(), Some(prio(7)));

        assert_eq!(rq.pop_head(prio(7)), Some(pid(2)));
        assert!(!rq.cache().contains(prio(7)));
        assert_eq!(rq.highest(), Some(prio(3)));
    }

    #[test]
    fn fifo_within_a_level() {
        let mut rq = RunQueue::new();
        for raw in [4, 1, 9] {
            rq.push_back(pid(raw), prio(2)).unwrap();
        }
        assert_eq!(rq.pop_next(), Some((pid(4), prio(2))));
        assert_eq!(rq.pop_next(), Some((pid(1), prio(2))));
        assert_eq!(rq.pop_next(), Some((pid(9), prio(2))));
        assert_eq!(rq.pop_next(), None);
    }

    #[test]
    fn push_front_jumps_the_line() {
        let mut rq = RunQueue::new();
        rq.push_back(pid(1), prio(5)).unwrap();
        rq.push_front(pid(2), prio(5)).unwrap();
        assert_eq!(rq.peek_next(), Some((pid(2), prio(5))));
    }

    #[test]
    fn remove_keeps_order_and_clears_cache() {
        let mut rq = RunQueue::new();
        for raw in 0..4 {
            rq.push_back(pid(raw), prio(1)).unwrap();
        }
        assert!(rq.remove(pid(2), prio(1)));
        assert!(!rq.remove(pid(2), prio(1)));
        let order: heapless::Vec<ThreadId, 4> = rq.iter_level(prio(1)).collect();
        assert_eq!(order.as_slice(), &[pid(0), pid(1), pid(3)]);

        for raw in [0, 1, 3] {
            assert!(rq.remove(pid(raw), prio(1)));
        }
        assert!(rq.is_empty());
    }

    #[test]
    fn advance_rotates_head_to_tail() {
        let mut rq = RunQueue::new();
        rq.push_back(pid(1), prio(0)).unwrap();
        rq.push_back(pid(2), prio(0)).unwrap();
        rq.advance(prio(0));
        assert_eq!(rq.peek_next(), Some((pid(2), prio(0))));
        rq.advance(prio(4));
        assert_eq!(rq.len(), 2);
    }

    #[test]
    fn level_capacity_matches_thread_table() {
        let mut rq = RunQueue::new();
        for raw in 0..THREADS_NUMOF as u8 {
            rq.push_back(pid(raw), Priority::HIGHEST).unwrap();
        }
        assert_eq!(rq.push_back(pid(0), Priority::HIGHEST), Err(pid(0)));
        assert_eq!(rq.level_len(Priority::HIGHEST), THREADS_NUMOF);
    }
}
