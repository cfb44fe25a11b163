//! Single-threaded discrete-event scheduler.
//!
//! Grounded on `original_source/examples/cottoncandy-sim.cc`, which drives
//! the whole simulation through `ns3::Simulator::Schedule`; this module is
//! the from-scratch Rust counterpart of that event queue, keeping a
//! callback-on-scheduler model rather than mapping onto async. Events carry
//! only a `Time` and an opaque, `Copy` domain payload rather than a boxed
//! closure, so the scheduler itself has no dependency on the MAC or radio
//! types it drives — [`crate::sim::driver`] owns the `match` over the
//! payload.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Simulation time, in microseconds since the start of the run.
///
/// Integral rather than floating point so that ordering is total and event
/// dispatch is bit-for-bit reproducible across platforms.
pub type Time = u64;

/// One microsecond.
pub const US: Time = 1;
/// One millisecond.
pub const MS: Time = 1_000;
/// One second.
pub const S: Time = 1_000_000;

/// Convert a fractional number of seconds into scheduler ticks.
pub fn secs(s: f64) -> Time {
    (s * S as f64).round() as Time
}

/// Handle returned by [`Scheduler::schedule_at`] / [`schedule_after`],
/// usable with [`Scheduler::cancel`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct EventHandle(u64);

struct Entry<P> {
    time: Time,
    seq: u64,
    payload: P,
    live: bool,
}

impl<P> PartialEq for Entry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<P> Eq for Entry<P> {}

impl<P> PartialOrd for Entry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Entry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert time so the earliest time (and,
        // within a tick, the earliest insertion / lowest seq) pops first.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A deterministic, single-threaded priority queue of `(time, seq, payload)`.
///
/// `P` is the event payload the simulation driver chooses to carry —
/// typically `(NodeId, MacEvent)`. The scheduler never inspects `P`; it only
/// orders and dispatches it.
pub struct Scheduler<P> {
    now: Time,
    next_seq: u64,
    queue: BinaryHeap<Entry<P>>,
    /// Count of cancelled-but-not-yet-popped entries, tracked only so
    /// [`Scheduler::pending`] stays accurate without scanning the heap.
    dead: usize,
}

impl<P> Default for Scheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Scheduler<P> {
    pub fn new() -> Self {
        Scheduler {
            now: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            dead: 0,
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> Time {
        self.now
    }

    /// Number of events still live (not yet popped, not cancelled).
    pub fn pending(&self) -> usize {
        self.queue.len() - self.dead
    }

    /// Schedule `payload` to fire at absolute time `t`.
    ///
    /// `t` must be `>= now()`; the scheduler never schedules into the past.
    pub fn schedule_at(&mut self, t: Time, payload: P) -> EventHandle {
        debug_assert!(t >= self.now, "cannot schedule an event in the past");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            time: t,
            seq,
            payload,
            live: true,
        });
        EventHandle(seq)
    }

    /// Schedule `payload` to fire `delta` ticks from now.
    pub fn schedule_after(&mut self, delta: Time, payload: P) -> EventHandle {
        self.schedule_at(self.now + delta, payload)
    }

    /// Cancel a previously scheduled event.
    ///
    /// Idempotent: cancelling an already-fired or already-cancelled handle
    /// is a no-op. Cancellation only marks the entry dead in a side table;
    /// the heap itself is untouched until the entry is popped.
    pub fn cancel(&mut self, handle: EventHandle) {
        // BinaryHeap has no in-place mutation by key, so we rebuild lazily:
        // we keep a parallel "dead set" instead of scanning. Since entries
        // are tiny and runs are bounded, a linear pass over the live heap
        // (only triggered on cancel, not on every dispatch) is cheap enough
        // and keeps the dispatch loop itself O(log n).
        let mut rebuilt = BinaryHeap::with_capacity(self.queue.len());
        let mut found = false;
        for mut entry in self.queue.drain() {
            if !found && entry.live && entry.seq == handle.0 {
                entry.live = false;
                self.dead += 1;
                found = true;
            }
            rebuilt.push(entry);
        }
        self.queue = rebuilt;
    }

    /// Pop and return the next live event, advancing `now` to its time.
    /// Returns `None` once the queue is exhausted.
    fn pop_next(&mut self) -> Option<(Time, P)> {
        while let Some(entry) = self.queue.pop() {
            if !entry.live {
                self.dead -= 1;
                continue;
            }
            self.now = entry.time;
            return Some((entry.time, entry.payload));
        }
        None
    }

    /// Run the simulation forward, invoking `dispatch` for every live event
    /// up to and including `t_stop`. Stops early if the queue drains.
    pub fn run_until<F: FnMut(&mut Self, Time, P)>(&mut self, t_stop: Time, mut dispatch: F) {
        loop {
            match self.queue.peek() {
                Some(entry) if entry.time <= t_stop => {}
                _ => break,
            }
            let Some((time, payload)) = self.pop_next() else {
                break;
            };
            dispatch(self, time, payload);
        }
        if self.now < t_stop {
            self.now = t_stop;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_in_time_order() {
        let mut sched: Scheduler<i32> = Scheduler::new();
        sched.schedule_at(30, 3);
        sched.schedule_at(10, 1);
        sched.schedule_at(20, 2);

        let mut seen = Vec::new();
        sched.run_until(100, |_, _t, p| seen.push(p));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut sched: Scheduler<i32> = Scheduler::new();
        sched.schedule_at(10, 1);
        sched.schedule_at(10, 2);
        sched.schedule_at(10, 3);

        let mut seen = Vec::new();
        sched.run_until(100, |_, _t, p| seen.push(p));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn cancel_skips_dispatch() {
        let mut sched: Scheduler<i32> = Scheduler::new();
        sched.schedule_at(10, 1);
        let h2 = sched.schedule_at(20, 2);
        sched.schedule_at(30, 3);

        sched.cancel(h2);

        let mut seen = Vec::new();
        sched.run_until(100, |_, _t, p| seen.push(p));
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut sched: Scheduler<i32> = Scheduler::new();
        let h = sched.schedule_at(10, 1);
        sched.cancel(h);
        sched.cancel(h);

        let mut seen = Vec::new();
        sched.run_until(100, |_, _t, p| seen.push(p));
        assert!(seen.is_empty());
    }

    #[test]
    fn run_until_stops_at_boundary() {
        let mut sched: Scheduler<i32> = Scheduler::new();
        sched.schedule_at(10, 1);
        sched.schedule_at(50, 2);

        let mut seen = Vec::new();
        sched.run_until(20, |_, _t, p| seen.push(p));
        assert_eq!(seen, vec![1]);
        assert_eq!(sched.now(), 20);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn schedule_after_is_relative_to_now() {
        let mut sched: Scheduler<i32> = Scheduler::new();
        sched.schedule_at(10, 1);
        sched.run_until(10, |s, _t, _p| {
            s.schedule_after(5, 2);
        });
        assert_eq!(sched.now(), 10);
        let mut seen = Vec::new();
        sched.run_until(100, |_, _t, p| seen.push(p));
        assert_eq!(seen, vec![2]);
    }
}
