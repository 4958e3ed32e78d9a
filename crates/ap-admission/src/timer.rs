//! Cancellable deadline queue
//!
//! The engine never sleeps. It records deadlines here and the owner of the
//! event loop asks for [`TimerQueue::next_deadline`] and feeds expired events
//! back in.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Deadline-ordered queue of events
///
/// Events sharing a deadline fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<E> {
    next_id: u64,
    queue: BTreeMap<(Instant, u64), E>,
    deadlines: HashMap<TimerId, Instant>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        TimerQueue {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, deadline: Instant, event: E) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.queue.insert((deadline, id.0), event);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Cancel a scheduled event, returning it if it had not fired yet
    pub fn cancel(&mut self, id: TimerId) -> Option<E> {
        let deadline = self.deadlines.remove(&id)?;
        self.queue.remove(&(deadline, id.0))
    }

    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        self.deadlines.get(&id).copied()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest event due at `now`
    ///
    /// Handlers may schedule or cancel between calls, so expired events are
    /// handed out one at a time.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(TimerId, E)> {
        let (&(deadline, seq), _) = self.queue.iter().next()?;
        if deadline > now {
            return None;
        }
        let event = self.queue.remove(&(deadline, seq))?;
        let id = TimerId(seq);
        self.deadlines.remove(&id);
        Some((id, event))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn schedule_cancel_event() {
        let now = Instant::now();
        let mut timers = TimerQueue::new();

        let id = timers.schedule(now + Duration::from_secs(5), 8);
        assert!(timers.is_scheduled(id));
        assert_eq!(timers.pop_expired(now), None);
        assert_eq!(timers.pop_expired(now + Duration::from_secs(5)), Some((id, 8)));
        assert_eq!(timers.pop_expired(now + Duration::from_secs(5)), None);

        let id = timers.schedule(now, 9);
        assert_eq!(timers.cancel(id), Some(9));
        assert_eq!(timers.cancel(id), None);
        assert!(timers.is_empty());
    }

    #[test]
    fn fires_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerQueue::new();
        timers.schedule(now + Duration::from_secs(3), 3);
        timers.schedule(now + Duration::from_secs(1), 1);
        timers.schedule(now + Duration::from_secs(1), 2);

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(1)));

        let later = now + Duration::from_secs(10);
        let fired: Vec<_> = std::iter::from_fn(|| timers.pop_expired(later))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(fired, vec![1, 2, 3]);
    }

    #[test]
    fn cancel_all() {
        let now = Instant::now();
        let mut timers = TimerQueue::new();
        let a = timers.schedule(now, 1);
        timers.schedule(now, 2);
        timers.cancel_all();
        assert!(!timers.is_scheduled(a));
        assert_eq!(timers.next_deadline(), None);
        assert_eq!(timers.len(), 0);
    }
}
