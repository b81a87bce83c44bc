//! Work queues with join semantics
//!
//! A queue counts unfinished items: every `put` adds one and every
//! `task_done` removes one. `join` waits until the count reaches zero, which
//! happens only after each dequeued item has been fully handled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Entry of a work queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Url(String),
    /// Tells the receiving worker to exit
    Stop,
}

/// Unbounded FIFO shared by the engine and its workers
#[derive(Debug)]
pub struct WorkQueue {
    name: &'static str,
    sender: flume::Sender<QueueItem>,
    receiver: flume::Receiver<QueueItem>,
    unfinished: AtomicUsize,
    drained: Notify,
}

impl WorkQueue {
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            name,
            sender,
            receiver,
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn put(&self, url: String) {
        self.push(QueueItem::Url(url));
    }

    pub fn put_stop(&self) {
        self.push(QueueItem::Stop);
    }

    fn push(&self, item: QueueItem) {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        // The queue holds its own receiver, so the channel never disconnects
        let _ = self.sender.send(item);
    }

    /// Dequeues the next item, or `None` once `timeout` elapses
    pub async fn get(&self, timeout: Duration) -> Option<QueueItem> {
        match tokio::time::timeout(timeout, self.receiver.recv_async()).await {
            Ok(Ok(item)) => Some(item),
            _ => None,
        }
    }

    /// Marks one dequeued item as handled
    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);

        if previous <= 1 {
            self.drained.notify_waiters();
        }
    }

    /// Items waiting to be dequeued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Items queued or in flight
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// Waits until every item has been handled; false on timeout
    pub async fn join(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let drained = self.drained.notified();
                tokio::pin!(drained);
                drained.as_mut().enable();

                if self.unfinished() == 0 {
                    return;
                }
                drained.await;
            }
        })
        .await
        .is_ok()
    }
}
