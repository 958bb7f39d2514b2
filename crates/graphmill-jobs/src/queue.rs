//! Bounded multi-consumer work queue with a join barrier.
//!
//! Every [`WorkQueue::put`] must be matched by one [`WorkQueue::task_done`]
//! once the item is handled; [`WorkQueue::join`] resolves when nothing is
//! outstanding. Workers retire on [`WorkItem::Shutdown`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};

use graphmill_core::{Error, Result};

/// What a worker receives.
#[derive(Debug)]
pub enum WorkItem<T> {
    Work(T),
    Shutdown,
}

pub struct WorkQueue<T> {
    tx: mpsc::Sender<WorkItem<T>>,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem<T>>>>,
    outstanding: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            outstanding: self.outstanding.clone(),
            idle: self.idle.clone(),
        }
    }
}

impl<T: Send> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Enqueue an item, waiting while the queue is full.
    pub async fn put(&self, item: T) -> Result<()> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(WorkItem::Work(item)).await.is_err() {
            self.task_done();
            return Err(Error::Worker("work queue closed".to_string()));
        }
        Ok(())
    }

    /// Enqueue one shutdown message. Not counted as outstanding work.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(WorkItem::Shutdown)
            .await
            .map_err(|_| Error::Worker("work queue closed before shutdown".to_string()))
    }

    /// Next item in FIFO order; `None` only if every sender is gone.
    pub async fn recv(&self) -> Option<WorkItem<T>> {
        self.rx.lock().await.recv().await
    }

    /// Mark one item handled.
    pub fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until every enqueued item has been marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_and_shutdown() {
        let queue = WorkQueue::new(4);
        queue.put(1).await.unwrap();
        queue.put(2).await.unwrap();
        queue.shutdown().await.unwrap();

        assert!(matches!(queue.recv().await, Some(WorkItem::Work(1))));
        assert!(matches!(queue.recv().await, Some(WorkItem::Work(2))));
        assert!(matches!(queue.recv().await, Some(WorkItem::Shutdown)));
        assert_eq!(queue.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_join_waits_for_task_done() {
        let queue: WorkQueue<u32> = WorkQueue::new(4);
        queue.join().await;

        queue.put(7).await.unwrap();
        let worker = queue.clone();
        let handle = tokio::spawn(async move {
            if let Some(WorkItem::Work(_)) = worker.recv().await {
                tokio::time::sleep(Duration::from_millis(20)).await;
                worker.task_done();
            }
        });

        tokio::time::timeout(Duration::from_secs(2), queue.join())
            .await
            .expect("join should resolve once the item is done");
        assert_eq!(queue.outstanding(), 0);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_workers_share_one_queue() {
        let queue: WorkQueue<u32> = WorkQueue::new(2);
        let seen = Arc::new(AtomicUsize::new(0));
        let mut workers = tokio::task::JoinSet::new();
        for _ in 0..3 {
            let queue = queue.clone();
            let seen = seen.clone();
            workers.spawn(async move {
                while let Some(WorkItem::Work(_)) = queue.recv().await {
                    seen.fetch_add(1, Ordering::SeqCst);
                    queue.task_done();
                }
            });
        }
        for i in 0..10 {
            queue.put(i).await.unwrap();
        }
        queue.join().await;
        for _ in 0..3 {
            queue.shutdown().await.unwrap();
        }
        while workers.join_next().await.is_some() {}
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }
}
