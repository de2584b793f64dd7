//! # Offerfold
//!
//! A change-stream reconciliation engine for sports-offer data. Snapshots and
//! partial deltas for contests, propositions, options, variants, outcomes and
//! markets arrive in partitioned batches; the engine folds them into
//! materialized aggregates in a backing store and commits each batch's
//! offsets only once every write has landed.

pub mod cache;
pub mod config;
pub mod error;
pub mod grouping;
pub mod key;
pub mod message;
pub mod model;
pub mod normalize;
pub mod processor;
pub mod reconcile;
pub mod store;
pub mod test_support;
pub mod transport;

// Re-export main types for convenience
pub use config::{ConfigOverrides, OfferfoldConfig};
pub use error::{ReconcileError, StoreError, TransportError};
pub use key::CompositeKey;
pub use message::{Batch, MessageKind, RawMessage};
pub use model::{Contest, MarketAggregate, PropositionAggregate};
pub use processor::{BatchPhase, BatchProcessor, BatchReport, ProcessingMode, ProcessorOptions};
pub use store::{Aggregate, AggregateStore, MemoryStore, MemoryStores, StoreMetrics, Stores};
pub use transport::{BatchHandler, BatchTransport, PartitionRunner, RecordingTransport, TopicRouter};

use std::sync::Arc;
use tracing::warn;

/// A configured consumer: one processor registered for the configured
/// topic, fed through a partition runner.
pub struct OfferConsumer {
    config: OfferfoldConfig,
    processor: Arc<BatchProcessor>,
    router: Arc<TopicRouter>,
}

impl OfferConsumer {
    pub fn new(config: OfferfoldConfig, stores: Stores) -> Self {
        let processor = Arc::new(BatchProcessor::new(stores, config.processor_options()));
        let router = Arc::new(TopicRouter::new().with_handler(config.topic.name.clone(), processor.clone()));
        Self {
            config,
            processor,
            router,
        }
    }

    pub fn config(&self) -> &OfferfoldConfig {
        &self.config
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    pub fn router(&self) -> Arc<TopicRouter> {
        self.router.clone()
    }

    pub fn runner(&self, transport: Arc<dyn BatchTransport>) -> PartitionRunner {
        PartitionRunner::new(
            self.router.clone(),
            transport,
            self.config.consumer.partitions_consumed_concurrently,
            self.config.consumer.partition_queue_capacity,
        )
    }

    /// Run `batches` to completion and return the reports of every
    /// committed batch, ordered by partition.
    pub async fn run(
        &self,
        batches: impl IntoIterator<Item = Batch>,
        transport: Arc<dyn BatchTransport>,
    ) -> Result<Vec<BatchReport>, ReconcileError> {
        let mut runner = self.runner(transport);
        let mut rejected = None;
        for batch in batches {
            if let Err(err) = runner.submit(batch).await {
                warn!(error = %err, "stopped submitting batches");
                rejected = Some(err);
                break;
            }
        }
        let reports = runner.drain().await?;
        match rejected {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }
}
