use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use nmeaplex_frame::SentenceBlock;

use crate::error::QueueError;

/// Returned by [`BoundedQueue::push`] once the queue is closed.
///
/// Hands the rejected sentence back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("queue closed")]
pub struct QueueClosed(pub SentenceBlock);

struct State {
    items: VecDeque<SentenceBlock>,
    closed: bool,
}

/// Blocking FIFO of sentences with a fixed capacity.
///
/// `push` waits while the queue is full and `pop` waits while it is empty.
/// After [`close`](Self::close), pushes fail and pops drain what is left
/// before returning `None`.
pub struct BoundedQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl BoundedQueue {
    /// Allocate an empty queue holding up to `capacity` sentences.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let mut items = VecDeque::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|_| QueueError::Alloc(capacity))?;
        Ok(Self {
            state: Mutex::new(State {
                items,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        })
    }

    /// Append a sentence, blocking while the queue is full.
    pub fn push(&self, sentence: SentenceBlock) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        while !state.closed && state.items.len() >= self.capacity {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return Err(QueueClosed(sentence));
        }
        state.items.push_back(sentence);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest sentence, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<SentenceBlock> {
        let mut state = self.lock();
        loop {
            if let Some(sentence) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(sentence);
            }
            if state.closed {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the queue and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued sentences.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue holds no sentences.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Maximum number of queued sentences.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use nmeaplex_frame::InterfaceId;

    use super::*;

    fn sentence(n: usize) -> SentenceBlock {
        SentenceBlock::from_body(format!("$TEST,{n}").as_bytes(), InterfaceId::new(1)).unwrap()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedQueue::new(0),
            Err(QueueError::ZeroCapacity)
        ));
    }

    #[test]
    fn preserves_fifo_order() {
        let queue = BoundedQueue::new(8).unwrap();
        for n in 0..8 {
            queue.push(sentence(n)).unwrap();
        }
        assert_eq!(queue.len(), 8);
        for n in 0..8 {
            assert_eq!(queue.pop().unwrap(), sentence(n));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn push_blocks_when_full_until_pop() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        queue.push(sentence(0)).unwrap();
        queue.push(sentence(1)).unwrap();

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                queue.push(sentence(2)).unwrap();
                pushed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!pushed.load(Ordering::SeqCst), "third push should block");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap(), sentence(0));
        producer.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.pop().unwrap(), sentence(1));
        assert_eq!(queue.pop().unwrap(), sentence(2));
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(50));
        queue.push(sentence(9)).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(sentence(9)));
    }

    #[test]
    fn close_drains_then_reports_closed() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.push(sentence(0)).unwrap();
        queue.push(sentence(1)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(queue.push(sentence(2)), Err(QueueClosed(s)) if s == sentence(2)));
        assert_eq!(queue.pop(), Some(sentence(0)));
        assert_eq!(queue.pop(), Some(sentence(1)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn close_wakes_blocked_consumer_and_producer() {
        let empty = Arc::new(BoundedQueue::new(1).unwrap());
        let consumer = {
            let queue = Arc::clone(&empty);
            thread::spawn(move || queue.pop())
        };

        let full = Arc::new(BoundedQueue::new(1).unwrap());
        full.push(sentence(0)).unwrap();
        let producer = {
            let queue = Arc::clone(&full);
            thread::spawn(move || queue.push(sentence(1)).is_err())
        };

        thread::sleep(Duration::from_millis(50));
        empty.close();
        full.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(producer.join().unwrap());
    }

    #[test]
    fn concurrent_producer_consumer_keeps_order() {
        let queue = Arc::new(BoundedQueue::new(3).unwrap());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for n in 0..500 {
                    queue.push(sentence(n)).unwrap();
                }
                queue.close();
            })
        };

        let mut seen = 0;
        while let Some(block) = queue.pop() {
            assert_eq!(block, sentence(seen));
            seen += 1;
        }
        producer.join().unwrap();
        assert_eq!(seen, 500);
    }
}
