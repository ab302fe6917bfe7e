use parking_lot::Mutex;

/// Pre-populated work queue shared by scan workers.
///
/// Every item is handed out exactly once. Pops never block waiting for work,
/// an empty queue means the worker is done.
#[derive(Debug)]
pub struct WorkQueue<T> {
    /// Stored reversed so popping from the back hands out items in insertion
    /// order.
    items: Mutex<Vec<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut items: Vec<_> = items.into_iter().collect();
        items.reverse();
        WorkQueue {
            items: Mutex::new(items),
        }
    }

    /// Take the next item, or None if the queue is drained.
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn pops_in_insertion_order() {
        let queue = WorkQueue::new(vec![1, 2, 3]);
        assert_eq!(3, queue.len());
        assert_eq!(Some(1), queue.pop());
        assert_eq!(Some(2), queue.pop());
        assert_eq!(Some(3), queue.pop());
        assert_eq!(None, queue.pop());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_pop_once() {
        const ITEMS: usize = 10_000;
        let queue = WorkQueue::new(0..ITEMS);
        let seen: Vec<AtomicUsize> = (0..ITEMS).map(|_| AtomicUsize::new(0)).collect();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while let Some(item) = queue.pop() {
                        seen[item].fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert!(queue.is_empty());
        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }
}
