//! Bounded fan-in queue for distinguished triples
//!
//! Multi-producer / single-consumer FIFO of fixed capacity. Workers push
//! distinguished triples, the coordinator pops them; when the
//! coordinator resolves the logarithm it closes the queue, which wakes
//! every blocked producer so the pool can drain and exit. Blocking is
//! condition-variable based; the lock is held only across the buffer
//! operation itself.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::triple::Triple;

/// Push failure: the queue was closed while the producer waited.
#[derive(Debug, thiserror::Error)]
#[error("queue closed during shutdown")]
pub struct QueueClosed;

struct State {
    buf: VecDeque<Triple>,
    closed: bool,
}

/// Bounded MPSC FIFO carrying triples from the walks to the coordinator.
pub struct TripleQueue {
    state: Mutex<State>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl TripleQueue {
    /// Create a queue holding at most `capacity` triples.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a triple, blocking while the queue is full. Fails only if
    /// the queue is closed before space opens up; the triple is dropped
    /// in that case, which is fine during shutdown.
    pub fn push(&self, triple: Triple) -> Result<(), QueueClosed> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        while state.buf.len() >= self.capacity {
            if state.closed {
                return Err(QueueClosed);
            }
            state = self.not_full.wait(state).expect("queue lock poisoned");
        }
        if state.closed {
            return Err(QueueClosed);
        }
        state.buf.push_back(triple);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest triple, blocking while the queue is empty.
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Triple> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        loop {
            if let Some(triple) = state.buf.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(triple);
            }
            if state.closed {
                return None;
            }
            state = self.not_empty.wait(state).expect("queue lock poisoned");
        }
    }

    /// Close the queue: wakes every blocked producer and consumer.
    /// Pending items remain poppable; further pushes fail.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Current number of queued triples.
    pub fn len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").buf.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::AffinePoint;
    use num_bigint::BigInt;
    use std::sync::Arc;
    use std::thread;

    fn marker(i: u32) -> Triple {
        Triple {
            point: AffinePoint::finite(i, 0u32),
            a: BigInt::from(i),
            b: BigInt::from(i),
        }
    }

    #[test]
    fn fifo_within_a_producer() {
        let q = TripleQueue::new(8);
        for i in 0..5 {
            q.push(marker(i)).expect("open");
        }
        for i in 0..5 {
            assert_eq!(q.pop().expect("non-empty").a, BigInt::from(i));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn capacity_is_respected_and_accounting_balances() {
        let q = Arc::new(TripleQueue::new(4));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..64 {
                    q.push(marker(i)).expect("open");
                    assert!(q.len() <= 4);
                }
            })
        };
        let mut popped = 0;
        while popped < 64 {
            let t = q.pop().expect("producer still pushing");
            assert_eq!(t.a, BigInt::from(popped));
            popped += 1;
        }
        producer.join().expect("producer thread");
        assert!(q.is_empty());
    }

    #[test]
    fn close_wakes_a_blocked_producer() {
        let q = Arc::new(TripleQueue::new(1));
        q.push(marker(0)).expect("open");
        let blocked = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(marker(1)))
        };
        // Give the producer a moment to block on the full queue.
        thread::sleep(std::time::Duration::from_millis(50));
        q.close();
        assert!(blocked.join().expect("producer thread").is_err());
        // The item enqueued before the close is still poppable.
        assert_eq!(q.pop().expect("pending item").a, BigInt::from(0u32));
        assert!(q.pop().is_none());
    }

    #[test]
    fn close_wakes_a_blocked_consumer() {
        let q = Arc::new(TripleQueue::new(4));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };
        thread::sleep(std::time::Duration::from_millis(50));
        q.close();
        assert!(consumer.join().expect("consumer thread").is_none());
        assert!(q.push(marker(0)).is_err());
    }
}
