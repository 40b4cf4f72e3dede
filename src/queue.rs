//! A generic bounded MPMC queue: the global task queue and the ready queue are both one of
//! these. Backed by `tokio::sync::mpsc`, whose internal bound already gives "at most capacity
//! items buffered"; the `Mutex` around the receiver only exists to let several consumers
//! (worker threads) share a single receive end.

use tokio::sync::{mpsc, Mutex};

use crate::error::QueueError;

pub struct BoundedQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Mutex<mpsc::Receiver<T>>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Blocks until there is room, or the queue is closed.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.sender.send(item).await.map_err(|_| QueueError::Closed)
    }

    /// Non-blocking enqueue: `false` if the queue is full or closed.
    pub fn try_put(&self, item: T) -> bool {
        self.sender.try_send(item).is_ok()
    }

    /// Blocks until an item is available, or the queue is closed and drained (`None`).
    pub async fn dequeue(&self) -> Option<T> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Stops accepting new items; already-buffered items still drain via `dequeue`.
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        queue.enqueue(1).await.unwrap();
        assert_eq!(queue.dequeue().await, Some(1));
    }

    #[tokio::test]
    async fn try_put_fails_when_full() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(1);
        assert!(queue.try_put(1));
        assert!(!queue.try_put(2));
    }

    #[tokio::test]
    async fn close_drains_then_ends_stream() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        queue.try_put(1);
        queue.close().await;
        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, None);
    }
}
