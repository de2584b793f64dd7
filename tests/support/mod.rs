use std::collections::BTreeMap;
use std::sync::Arc;

use offerfold::{
    Batch, BatchProcessor, BatchReport, CompositeKey, Contest, MarketAggregate, MemoryStores, ProcessorOptions,
    PropositionAggregate, RecordingTransport,
};

/// Every processor configuration the engine supports.
#[allow(dead_code)]
pub fn all_modes() -> Vec<(&'static str, ProcessorOptions)> {
    vec![
        ("normal", ProcessorOptions::normal()),
        ("normal+cache", ProcessorOptions::normal().with_cache(true)),
        ("normal+concurrent", ProcessorOptions::normal().concurrent(true)),
        (
            "normal+cache+concurrent",
            ProcessorOptions::normal().with_cache(true).concurrent(true),
        ),
        ("optimized", ProcessorOptions::optimized()),
    ]
}

/// Everything persisted across the three stores.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    pub contests: BTreeMap<CompositeKey, Contest>,
    pub propositions: BTreeMap<CompositeKey, PropositionAggregate>,
    pub markets: BTreeMap<CompositeKey, MarketAggregate>,
}

#[allow(dead_code)]
pub fn stored_state(stores: &MemoryStores) -> StoredState {
    StoredState {
        contests: stores.contests.snapshot(),
        propositions: stores.propositions.snapshot(),
        markets: stores.markets.snapshot(),
    }
}

/// Process `batches` in order on a single processor.
#[allow(dead_code)]
pub async fn process_all(
    stores: &MemoryStores,
    options: ProcessorOptions,
    batches: &[Batch],
    transport: &Arc<RecordingTransport>,
) -> anyhow::Result<Vec<BatchReport>> {
    let processor = BatchProcessor::new(stores.stores(), options);
    let mut reports = Vec::with_capacity(batches.len());
    for batch in batches {
        reports.push(processor.process(batch, transport.as_ref()).await?);
    }
    Ok(reports)
}

/// Fresh stores and transport, then `batches` through `options`.
#[allow(dead_code)]
pub async fn run_fresh(
    options: ProcessorOptions,
    batches: &[Batch],
) -> anyhow::Result<(MemoryStores, Vec<BatchReport>)> {
    let stores = MemoryStores::default();
    let transport = Arc::new(RecordingTransport::new());
    let reports = process_all(&stores, options, batches, &transport).await?;
    Ok((stores, reports))
}
