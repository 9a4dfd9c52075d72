use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::QueueClosed;

/// Multi-producer, single-consumer FIFO that can be closed from either end.
///
/// Once closed, `enqueue` fails and items already queued are discarded.
pub fn closable_queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (sender, receiver) = flume::unbounded();
    let closed = Arc::new(AtomicBool::new(false));
    (
        QueueSender {
            sender,
            closed: closed.clone(),
        },
        QueueReceiver { receiver, closed },
    )
}

pub struct QueueSender<T> {
    sender: flume::Sender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    pub fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        if self.is_closed() {
            return Err(QueueClosed);
        }
        self.sender.send(item).map_err(|_| QueueClosed)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct QueueReceiver<T> {
    receiver: flume::Receiver<T>,
    closed: Arc<AtomicBool>,
}

impl<T> QueueReceiver<T> {
    pub fn dequeue(&self) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Everything queued right now, in enqueue order.
    pub fn drain(&self) -> Vec<T> {
        if self.is_closed() {
            return vec![];
        }
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.receiver.drain();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
