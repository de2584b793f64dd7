//! # Transport
//!
//! The broker-facing seams: the per-batch transport contract (offset
//! resolution, commit, heartbeat), topic routing, and the partition runner
//! that feeds batches to handlers with bounded partition concurrency.

use crate::error::{ReconcileError, TransportError};
use crate::message::Batch;
use crate::processor::BatchReport;
use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Default bound of the per-partition batch queue.
pub const PARTITION_QUEUE_CAPACITY: usize = 16;

/// Calls the engine makes back into the broker for one batch.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Mark `offset` as processed.
    fn resolve_offset(&self, partition: i32, offset: i64);

    /// Commit `offset`, the next offset to consume, for `partition`.
    async fn commit_offsets_if_necessary(&self, partition: i32, offset: i64) -> Result<(), TransportError>;

    async fn heartbeat(&self, partition: i32) -> Result<(), TransportError>;
}

/// Handles every batch of one topic.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, batch: &Batch, transport: &dyn BatchTransport) -> Result<BatchReport, ReconcileError>;
}

/// Routes batches to the handler registered for their topic.
#[derive(Default, Clone)]
pub struct TopicRouter {
    handlers: HashMap<String, Arc<dyn BatchHandler>>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, topic: impl Into<String>, handler: Arc<dyn BatchHandler>) -> Self {
        self.register(topic, handler);
        self
    }

    pub fn register(&mut self, topic: impl Into<String>, handler: Arc<dyn BatchHandler>) {
        self.handlers.insert(topic.into(), handler);
    }

    pub async fn dispatch(&self, batch: &Batch, transport: &dyn BatchTransport) -> Result<BatchReport, ReconcileError> {
        let handler = self
            .handlers
            .get(&batch.topic)
            .ok_or_else(|| ReconcileError::NoHandlerForTopic(batch.topic.clone()))?;
        handler.handle_batch(batch, transport).await
    }
}

/// Everything a [`RecordingTransport`] has been asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLog {
    pub resolved: Vec<(i32, i64)>,
    pub commits: Vec<(i32, i64)>,
    pub heartbeats: Vec<i32>,
}

/// In-process transport that records every call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    log: Mutex<TransportLog>,
    fail_commits: AtomicBool,
    fail_heartbeats: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> TransportLog {
        self.log.lock().clone()
    }

    /// Last committed offset of `partition`.
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.log
            .lock()
            .commits
            .iter()
            .rev()
            .find(|(p, _)| *p == partition)
            .map(|(_, offset)| *offset)
    }

    pub fn heartbeat_count(&self) -> usize {
        self.log.lock().heartbeats.len()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_heartbeats(&self, fail: bool) {
        self.fail_heartbeats.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BatchTransport for RecordingTransport {
    fn resolve_offset(&self, partition: i32, offset: i64) {
        self.log.lock().resolved.push((partition, offset));
    }

    async fn commit_offsets_if_necessary(&self, partition: i32, offset: i64) -> Result<(), TransportError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(TransportError::new("commit", format!("partition {partition} rejected offset {offset}")));
        }
        self.log.lock().commits.push((partition, offset));
        Ok(())
    }

    async fn heartbeat(&self, partition: i32) -> Result<(), TransportError> {
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(TransportError::new("heartbeat", "session expired"));
        }
        self.log.lock().heartbeats.push(partition);
        Ok(())
    }
}

type WorkerResult = Result<Vec<BatchReport>, ReconcileError>;

struct PartitionWorker {
    tx: mpsc::Sender<Batch>,
    handle: JoinHandle<WorkerResult>,
}

/// Feeds batches to a [`TopicRouter`], one worker task per partition.
///
/// Batches of one partition are handled strictly in submission order. A
/// semaphore bounds how many partitions are inside a handler at once. The
/// first failure of a partition stops its worker; later submissions for it
/// are rejected and the failure is reported by [`PartitionRunner::drain`].
pub struct PartitionRunner {
    router: Arc<TopicRouter>,
    transport: Arc<dyn BatchTransport>,
    permits: Arc<Semaphore>,
    queue_capacity: usize,
    workers: HashMap<i32, PartitionWorker>,
}

impl PartitionRunner {
    pub fn new(
        router: Arc<TopicRouter>,
        transport: Arc<dyn BatchTransport>,
        partitions_in_flight: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            router,
            transport,
            permits: Arc::new(Semaphore::new(partitions_in_flight.max(1))),
            queue_capacity: queue_capacity.max(1),
            workers: HashMap::new(),
        }
    }

    /// Queue `batch` on its partition's worker, waiting if the queue is full.
    pub async fn submit(&mut self, batch: Batch) -> Result<(), ReconcileError> {
        let partition = batch.partition;
        let worker = self.workers.entry(partition).or_insert_with(|| {
            spawn_partition_worker(
                partition,
                self.router.clone(),
                self.transport.clone(),
                self.permits.clone(),
                self.queue_capacity,
            )
        });
        worker.tx.send(batch).await.map_err(|_| ReconcileError::WorkerStopped {
            partition,
            reason: "worker exited after a failed batch".to_string(),
        })
    }

    /// Close every queue, wait for the workers, and collect their reports
    /// ordered by partition. Returns the first partition failure, if any.
    pub async fn drain(self) -> Result<Vec<BatchReport>, ReconcileError> {
        let mut workers: Vec<_> = self.workers.into_iter().collect();
        workers.sort_by_key(|(partition, _)| *partition);

        let mut reports = Vec::new();
        let mut first_error = None;
        for (partition, worker) in workers {
            drop(worker.tx);
            let outcome = match worker.handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(ReconcileError::WorkerStopped {
                    partition,
                    reason: join_error.to_string(),
                }),
            };
            match outcome {
                Ok(partition_reports) => reports.extend(partition_reports),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }
}

fn spawn_partition_worker(
    partition: i32,
    router: Arc<TopicRouter>,
    transport: Arc<dyn BatchTransport>,
    permits: Arc<Semaphore>,
    queue_capacity: usize,
) -> PartitionWorker {
    let (tx, rx) = mpsc::channel::<Batch>(queue_capacity);
    let handle = tokio::spawn(run_partition(partition, rx, router, transport, permits));
    PartitionWorker { tx, handle }
}

async fn run_partition(
    partition: i32,
    mut rx: mpsc::Receiver<Batch>,
    router: Arc<TopicRouter>,
    transport: Arc<dyn BatchTransport>,
    permits: Arc<Semaphore>,
) -> WorkerResult {
    let mut reports = Vec::new();
    while let Some(batch) = rx.recv().await {
        let _permit = permits
            .acquire()
            .await
            .map_err(|err| ReconcileError::WorkerStopped {
                partition,
                reason: err.to_string(),
            })?;
        debug!(partition, messages = batch.len(), "dispatching batch");
        match router.dispatch(&batch, transport.as_ref()).await {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(partition, topic = %batch.topic, error = %err, "batch failed; stopping partition");
                rx.close();
                let mut dropped = 0usize;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                if dropped > 0 {
                    warn!(partition, dropped, "discarding queued batches after failure");
                }
                return Err(err);
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::BatchReport;

    struct Echo;

    #[async_trait]
    impl BatchHandler for Echo {
        async fn handle_batch(
            &self,
            batch: &Batch,
            transport: &dyn BatchTransport,
        ) -> Result<BatchReport, ReconcileError> {
            if let Some(last) = batch.last_offset() {
                transport.commit_offsets_if_necessary(batch.partition, last + 1).await?;
            }
            Ok(BatchReport::empty(batch.partition))
        }
    }

    #[tokio::test]
    async fn router_rejects_unknown_topics() {
        let router = TopicRouter::new().with_handler("offers", Arc::new(Echo));
        let transport = RecordingTransport::new();
        let err = router
            .dispatch(&Batch::new("prices", 0, vec![]), &transport)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoHandlerForTopic(topic) if topic == "prices"));
        assert!(transport.log().commits.is_empty());
    }

    #[tokio::test]
    async fn recording_transport_fails_on_demand() {
        let transport = RecordingTransport::new();
        transport.commit_offsets_if_necessary(1, 10).await.unwrap();
        transport.fail_commits(true);
        assert!(transport.commit_offsets_if_necessary(1, 20).await.is_err());
        assert_eq!(transport.committed(1), Some(10));
        assert_eq!(transport.committed(2), None);

        transport.fail_heartbeats(true);
        assert!(transport.heartbeat(1).await.is_err());
        assert_eq!(transport.heartbeat_count(), 0);
    }
}
