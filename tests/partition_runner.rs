use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offerfold::test_support::{generate_batch, BatchShape, MessageFactory};
use offerfold::{
    Batch, BatchHandler, BatchReport, BatchTransport, MemoryStores, OfferConsumer, OfferfoldConfig, PartitionRunner,
    ProcessingMode, ReconcileError, RecordingTransport, TopicRouter,
};
use parking_lot::Mutex;

/// Records every batch it sees, optionally failing one offset.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(i32, i64)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_at: Option<(i32, i64)>,
}

#[async_trait]
impl BatchHandler for Recorder {
    async fn handle_batch(&self, batch: &Batch, transport: &dyn BatchTransport) -> Result<BatchReport, ReconcileError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let first = batch.messages.first().map(|m| m.offset).unwrap_or_default();
        self.seen.lock().push((batch.partition, first));
        if self.fail_at == Some((batch.partition, first)) {
            return Err(ReconcileError::WorkerStopped {
                partition: batch.partition,
                reason: "recorder failure".to_string(),
            });
        }
        if let Some(last) = batch.last_offset() {
            transport.commit_offsets_if_necessary(batch.partition, last + 1).await?;
        }
        Ok(BatchReport::empty(batch.partition))
    }
}

fn batches(partitions: i32, per_partition: usize) -> Vec<Batch> {
    let mut factories: Vec<MessageFactory> = (0..partitions).map(MessageFactory::new).collect();
    let mut out = Vec::new();
    for round in 0..per_partition {
        for factory in &mut factories {
            let contest = format!("c{round}");
            let messages = vec![factory.contest(&contest), factory.contest(&contest)];
            out.push(factory.batch(messages));
        }
    }
    out
}

fn runner(recorder: Arc<Recorder>, transport: Arc<RecordingTransport>, in_flight: usize) -> PartitionRunner {
    let router = TopicRouter::new().with_handler("offers", recorder);
    PartitionRunner::new(Arc::new(router), transport, in_flight, 4)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batches_of_a_partition_run_in_order() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(RecordingTransport::new());
    let mut runner = runner(recorder.clone(), transport.clone(), 3);
    for batch in batches(3, 4) {
        runner.submit(batch).await?;
    }
    let reports = runner.drain().await?;
    assert_eq!(reports.len(), 12);

    let seen = recorder.seen.lock().clone();
    for partition in 0..3 {
        let offsets: Vec<i64> = seen.iter().filter(|(p, _)| *p == partition).map(|(_, o)| *o).collect();
        assert_eq!(offsets, vec![0, 2, 4, 6], "partition {partition}");
        assert_eq!(transport.committed(partition), Some(8));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partitions_in_flight_are_bounded() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(RecordingTransport::new());
    let mut runner = runner(recorder.clone(), transport, 2);
    for batch in batches(5, 3) {
        runner.submit(batch).await?;
    }
    runner.drain().await?;

    let max = recorder.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max in flight {max}");
    assert_eq!(recorder.seen.lock().len(), 15);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_batch_stops_only_its_partition() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder {
        fail_at: Some((1, 2)),
        ..Recorder::default()
    });
    let transport = Arc::new(RecordingTransport::new());
    let mut runner = runner(recorder.clone(), transport.clone(), 3);
    for batch in batches(3, 4) {
        // Later submissions to the stopped partition may be rejected.
        let _ = runner.submit(batch).await;
    }
    let result = runner.drain().await;
    assert!(matches!(result, Err(ReconcileError::WorkerStopped { partition: 1, .. })));

    let seen = recorder.seen.lock().clone();
    let partition_one: Vec<i64> = seen.iter().filter(|(p, _)| *p == 1).map(|(_, o)| *o).collect();
    assert_eq!(partition_one, vec![0, 2]);
    assert_eq!(transport.committed(1), Some(2));
    assert_eq!(transport.committed(0), Some(8));
    assert_eq!(transport.committed(2), Some(8));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unrouted_topic_fails_the_partition() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(RecordingTransport::new());
    let mut runner = runner(recorder.clone(), transport.clone(), 1);

    let mut factory = MessageFactory::new(0).with_topic("prices");
    let messages = vec![factory.contest("c1")];
    runner.submit(factory.batch(messages)).await?;

    let result = runner.drain().await;
    assert!(matches!(result, Err(ReconcileError::NoHandlerForTopic(ref topic)) if topic == "prices"));
    assert!(recorder.seen.lock().is_empty());
    assert!(transport.log().commits.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumer_reconciles_every_partition() -> anyhow::Result<()> {
    let mut config = OfferfoldConfig::default();
    config.consumer.partitions_consumed_concurrently = 2;
    let stores = MemoryStores::default();
    let consumer = OfferConsumer::new(config, stores.stores());
    let transport = Arc::new(RecordingTransport::new());

    let mut input = Vec::new();
    for partition in 0..3 {
        let mut factory = MessageFactory::new(partition);
        input.push(generate_batch(&mut factory, BatchShape::default(), partition as u64));
    }
    let expected: Vec<(i32, Option<i64>)> = input
        .iter()
        .map(|batch| (batch.partition, batch.last_offset().map(|o| o + 1)))
        .collect();

    let reports = consumer.run(input, transport.clone()).await?;
    assert_eq!(reports.len(), 3);
    for (partition, offset) in expected {
        assert_eq!(transport.committed(partition), offset);
    }
    // Every partition carries the same contest and proposition keys.
    let shape = BatchShape::default();
    assert_eq!(stores.contests.len(), shape.contests);
    assert_eq!(stores.propositions.len(), shape.contests * shape.propositions_per_contest);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumer_routes_only_the_configured_topic() -> anyhow::Result<()> {
    let mut config = OfferfoldConfig::default();
    config.consumer.mode = ProcessingMode::Optimized;
    let stores = MemoryStores::default();
    let consumer = OfferConsumer::new(config.clone(), stores.stores());
    assert_eq!(consumer.processor().options(), config.processor_options());

    let transport = RecordingTransport::new();
    let router = consumer.router();
    let mut factory = MessageFactory::new(0).with_topic(config.topic.name.as_str());
    let messages = vec![factory.contest("c1")];
    router.dispatch(&factory.batch(messages), &transport).await?;
    assert_eq!(stores.contests.len(), 1);

    let mut stray = MessageFactory::new(0).with_topic("prices");
    let messages = vec![stray.contest("c2")];
    let result = router.dispatch(&stray.batch(messages), &transport).await;
    assert!(matches!(result, Err(ReconcileError::NoHandlerForTopic(ref topic)) if topic == "prices"));
    assert_eq!(stores.contests.len(), 1);
    Ok(())
}
