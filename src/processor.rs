//! # Batch Processor
//!
//! Drives one batch through classification, grouping, store reads,
//! reconciliation, persistence, offset commit and heartbeat. Two strategies
//! share the same decode and apply rules:
//!
//! - **normal**: one delta at a time in arrival order, one read and one write
//!   per delta (optionally served by the batch cache, optionally fanned out
//!   across proposition keys).
//! - **optimized**: every kind is grouped and pre-combined per key first, so
//!   each distinct key is read once and written once.
//!
//! Nothing is committed unless every store write of the batch succeeded.

use crate::cache::StoreAccess;
use crate::error::ReconcileError;
use crate::grouping::{
    group_concat, group_latest, group_nested, GroupLevel, Identified, KeyField, KeyFn, Merge, MergeStrategy, Nested,
};
use crate::key::CompositeKey;
use crate::message::{classify, Batch, Classified, MessageKind, RawMessage};
use crate::model::{Contest, Market, MarketAggregate, Outcome, Proposition, PropositionAggregate};
use crate::normalize::{
    decode, normalize, Delta, MarketPatch, MarketPriceChanged, Normalize, OptionChanged, OutcomeChanged,
    OutcomeResultChanged, PropositionChange, PropositionChanged, VariantChanged, PROPOSITION_IDENTITY,
};
use crate::reconcile::PropositionChangeSet;
use crate::store::{Aggregate, Stores};
use crate::transport::{BatchHandler, BatchTransport};
use async_trait::async_trait;
use futures::future::try_join_all;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Reconciliation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Per-delta read, apply and write.
    #[default]
    Normal,
    /// Grouped and pre-combined; one read and one write per distinct key.
    Optimized,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Normal => f.write_str("normal"),
            ProcessingMode::Optimized => f.write_str("optimized"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessorOptions {
    pub mode: ProcessingMode,
    /// Serve repeated reads of a key from the batch cache (normal mode).
    pub with_cache: bool,
    /// Fan out across proposition keys within a kind (normal mode).
    pub concurrent: bool,
}

impl ProcessorOptions {
    pub fn normal() -> Self {
        Self::default()
    }

    pub fn optimized() -> Self {
        Self {
            mode: ProcessingMode::Optimized,
            ..Self::default()
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.with_cache = enabled;
        self
    }

    pub fn concurrent(mut self, enabled: bool) -> Self {
        self.concurrent = enabled;
        self
    }
}

/// States a batch moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BatchPhase {
    Idle,
    Classifying,
    Grouping,
    Fetching,
    Reconciling,
    Persisting,
    Committing,
    HeartbeatSent,
}

/// Per-kind outcome of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Messages of the kind in the batch.
    pub messages: usize,
    /// Records folded into a stored aggregate.
    pub applied: usize,
    pub malformed: usize,
    pub unknown_aggregate: usize,
}

/// Summary of one successfully committed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub partition: i32,
    pub messages: usize,
    pub kinds: BTreeMap<MessageKind, KindStats>,
    pub untagged: usize,
    /// Reads and writes that reached the backing stores.
    pub store_reads: u64,
    pub store_writes: u64,
    pub phases: Vec<BatchPhase>,
    /// Offset committed for the partition, if the batch had messages.
    pub committed_offset: Option<i64>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn empty(partition: i32) -> Self {
        Self {
            partition,
            messages: 0,
            kinds: BTreeMap::new(),
            untagged: 0,
            store_reads: 0,
            store_writes: 0,
            phases: Vec::new(),
            committed_offset: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn kind(&self, kind: MessageKind) -> KindStats {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    pub fn applied(&self) -> usize {
        self.kinds.values().map(|s| s.applied).sum()
    }

    pub fn malformed(&self) -> usize {
        self.kinds.values().map(|s| s.malformed).sum()
    }

    pub fn unknown_aggregate(&self) -> usize {
        self.kinds.values().map(|s| s.unknown_aggregate).sum()
    }

    fn stats(&mut self, kind: MessageKind) -> &mut KindStats {
        self.kinds.entry(kind).or_default()
    }
}

/// Records phase transitions and rejects going backwards.
struct PhaseTracker {
    current: BatchPhase,
    visited: Vec<BatchPhase>,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            current: BatchPhase::Idle,
            visited: Vec::new(),
        }
    }

    fn advance(&mut self, next: BatchPhase) {
        debug_assert!(
            next > self.current || next == BatchPhase::Idle,
            "phase {next:?} after {:?}",
            self.current
        );
        debug!(from = ?self.current, to = ?next, "batch phase");
        self.current = next;
        self.visited.push(next);
    }
}

/// Store access for the lifetime of one batch.
struct BatchAccess {
    contests: StoreAccess<Contest>,
    propositions: StoreAccess<PropositionAggregate>,
    markets: StoreAccess<MarketAggregate>,
}

impl BatchAccess {
    fn new(stores: &Stores, with_cache: bool) -> Self {
        Self {
            contests: StoreAccess::new(stores.contests.clone(), with_cache),
            propositions: StoreAccess::new(stores.propositions.clone(), with_cache),
            markets: StoreAccess::new(stores.markets.clone(), with_cache),
        }
    }

    fn reads(&self) -> u64 {
        self.contests.backend_reads() + self.propositions.backend_reads() + self.markets.backend_reads()
    }

    fn writes(&self) -> u64 {
        self.contests.backend_writes() + self.propositions.backend_writes() + self.markets.backend_writes()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Applied {
    applied: usize,
    unknown: usize,
}

impl Applied {
    fn add(&mut self, other: Applied) {
        self.applied += other.applied;
        self.unknown += other.unknown;
    }
}

/// Reconciles batches of offer messages into the stores.
pub struct BatchProcessor {
    stores: Stores,
    options: ProcessorOptions,
}

impl BatchProcessor {
    pub fn new(stores: Stores, options: ProcessorOptions) -> Self {
        Self { stores, options }
    }

    pub fn options(&self) -> ProcessorOptions {
        self.options
    }

    /// Reconcile `batch`, then commit its offsets and heartbeat.
    ///
    /// On error nothing is committed and no heartbeat is sent; the batch is
    /// expected to be redelivered.
    #[instrument(skip_all, fields(topic = %batch.topic, partition = batch.partition, messages = batch.len()))]
    pub async fn process(&self, batch: &Batch, transport: &dyn BatchTransport) -> Result<BatchReport, ReconcileError> {
        let started = Instant::now();
        let mut report = BatchReport::empty(batch.partition);
        report.messages = batch.len();
        let mut phases = PhaseTracker::new();

        phases.advance(BatchPhase::Classifying);
        let classified = classify(&batch.messages);
        if let Some((tag, offset)) = classified.unrecognized.first() {
            return Err(ReconcileError::NoHandlerForKind {
                tag: tag.clone(),
                offset: *offset,
            });
        }
        report.untagged = classified.untagged;
        for kind in MessageKind::PROCESSING_ORDER {
            let count = classified.count(kind);
            if count > 0 {
                report.stats(kind).messages = count;
            }
        }

        // Dropped at the end of this call on every path, taking the cache with it.
        let access = BatchAccess::new(&self.stores, self.options.with_cache);
        match self.options.mode {
            ProcessingMode::Normal => {
                self.reconcile_sequential(&classified, &access, &mut phases, &mut report)
                    .await?
            }
            ProcessingMode::Optimized => {
                self.reconcile_optimized(&classified, &access, &mut phases, &mut report)
                    .await?
            }
        }
        report.store_reads = access.reads();
        report.store_writes = access.writes();
        drop(access);

        phases.advance(BatchPhase::Committing);
        for message in &batch.messages {
            transport.resolve_offset(batch.partition, message.offset);
        }
        if let Some(last) = batch.last_offset() {
            transport
                .commit_offsets_if_necessary(batch.partition, last + 1)
                .await?;
            report.committed_offset = Some(last + 1);
        }
        transport.heartbeat(batch.partition).await?;
        phases.advance(BatchPhase::HeartbeatSent);
        phases.advance(BatchPhase::Idle);

        report.phases = phases.visited;
        report.elapsed = started.elapsed();
        log_summary(&report, self.options.mode);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Normal mode
    // -----------------------------------------------------------------------

    /// Kinds one after the other; within a kind, deltas in arrival order.
    /// Each delta is read, applied and written before the next one, so the
    /// fetch/reconcile/persist phases run interleaved inside `Reconciling`.
    async fn reconcile_sequential(
        &self,
        classified: &Classified<'_>,
        access: &BatchAccess,
        phases: &mut PhaseTracker,
        report: &mut BatchReport,
    ) -> Result<(), ReconcileError> {
        phases.advance(BatchPhase::Grouping);
        phases.advance(BatchPhase::Fetching);
        phases.advance(BatchPhase::Reconciling);

        for kind in MessageKind::PROCESSING_ORDER {
            if classified.count(kind) == 0 {
                continue;
            }
            let started = Instant::now();
            let stats = report.stats(kind);
            let outcome = match kind {
                MessageKind::Contest => {
                    let contests = decode_snapshots::<Contest>(classified, kind, &[KeyField::Contest], stats);
                    upsert_in_order(&access.contests, contests).await?
                }
                MessageKind::Proposition => {
                    let snapshots = decode_snapshots::<Proposition>(classified, kind, PROPOSITION_IDENTITY, stats);
                    let aggregates = snapshots.into_iter().map(PropositionAggregate::from).collect();
                    upsert_in_order(&access.propositions, aggregates).await?
                }
                MessageKind::Market => {
                    let snapshots = decode_snapshots::<Market>(classified, kind, PROPOSITION_IDENTITY, stats);
                    let aggregates = snapshots.into_iter().map(MarketAggregate::from).collect();
                    upsert_in_order(&access.markets, aggregates).await?
                }
                MessageKind::PropositionChanged => {
                    let deltas =
                        proposition_changes::<PropositionChanged>(classified, stats, PropositionChange::Proposition);
                    self.apply_deltas(&access.propositions, kind, deltas).await?
                }
                MessageKind::OptionChanged => {
                    let deltas = proposition_changes::<OptionChanged>(classified, stats, PropositionChange::Option);
                    self.apply_deltas(&access.propositions, kind, deltas).await?
                }
                MessageKind::VariantChanged => {
                    let deltas = proposition_changes::<VariantChanged>(classified, stats, PropositionChange::Variant);
                    self.apply_deltas(&access.propositions, kind, deltas).await?
                }
                MessageKind::OutcomeChanged => {
                    let deltas = proposition_changes::<OutcomeChanged>(classified, stats, PropositionChange::Outcome);
                    self.apply_deltas(&access.propositions, kind, deltas).await?
                }
                MessageKind::OutcomeResult => {
                    let deltas =
                        proposition_changes::<OutcomeResultChanged>(classified, stats, PropositionChange::Result);
                    self.apply_deltas(&access.propositions, kind, deltas).await?
                }
                MessageKind::MarketPriceChanged => {
                    let deltas = decode_changes::<MarketPriceChanged>(classified, stats);
                    self.apply_deltas(&access.markets, kind, deltas).await?
                }
            };

            let stats = report.stats(kind);
            stats.applied += outcome.applied;
            stats.unknown_aggregate += outcome.unknown;
            log_kind(kind, stats, started.elapsed());
        }

        phases.advance(BatchPhase::Persisting);
        Ok(())
    }

    /// Read, apply and write each delta. With `concurrent` set, deltas are
    /// split by aggregate key and the keys run concurrently; each key's
    /// deltas keep their arrival order.
    async fn apply_deltas<A>(
        &self,
        access: &StoreAccess<A>,
        kind: MessageKind,
        deltas: Vec<Delta<A::Patch>>,
    ) -> Result<Applied, ReconcileError>
    where
        A: Aggregate,
        Delta<A::Patch>: Identified,
    {
        if !self.options.concurrent {
            return apply_in_order(access, kind, deltas).await;
        }

        let by_key = group_concat(deltas, &KeyFn::custom(Delta::key));
        let outcomes = try_join_all(by_key.into_values().map(|deltas| apply_in_order(access, kind, deltas))).await?;
        let mut total = Applied::default();
        for outcome in outcomes {
            total.add(outcome);
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Optimized mode
    // -----------------------------------------------------------------------

    async fn reconcile_optimized(
        &self,
        classified: &Classified<'_>,
        access: &BatchAccess,
        phases: &mut PhaseTracker,
        report: &mut BatchReport,
    ) -> Result<(), ReconcileError> {
        phases.advance(BatchPhase::Grouping);

        let contests = decode_snapshots::<Contest>(
            classified,
            MessageKind::Contest,
            &[KeyField::Contest],
            report.stats(MessageKind::Contest),
        );
        report.stats(MessageKind::Contest).applied = contests.len();
        let contests = group_latest(contests, &KeyFn::Field(KeyField::Contest));

        let snapshots = decode_snapshots::<Proposition>(
            classified,
            MessageKind::Proposition,
            PROPOSITION_IDENTITY,
            report.stats(MessageKind::Proposition),
        );
        report.stats(MessageKind::Proposition).applied = snapshots.len();
        let mut propositions: HashMap<CompositeKey, PropositionAggregate> = group_latest(
            snapshots,
            &KeyFn::custom(|p: &Proposition| CompositeKey::proposition(&p.contest_key, &p.proposition_key)),
        )
        .into_iter()
        .map(|(key, snapshot)| (key, PropositionAggregate::from(snapshot)))
        .collect();

        let snapshots = decode_snapshots::<Market>(
            classified,
            MessageKind::Market,
            PROPOSITION_IDENTITY,
            report.stats(MessageKind::Market),
        );
        report.stats(MessageKind::Market).applied = snapshots.len();
        let mut markets: HashMap<CompositeKey, MarketAggregate> = group_latest(
            snapshots,
            &KeyFn::custom(|m: &Market| CompositeKey::proposition(&m.contest_key, &m.proposition_key)),
        )
        .into_iter()
        .map(|(key, snapshot)| (key, MarketAggregate::from(snapshot)))
        .collect();

        let mut change_sets: HashMap<CompositeKey, PropositionChangeSet> = HashMap::new();
        fold_changes(
            decode_changes::<PropositionChanged>(classified, report.stats(MessageKind::PropositionChanged)),
            &[
                GroupLevel::concat(KeyField::Contest),
                GroupLevel::field(KeyField::Proposition, MergeStrategy::Merge),
            ],
            MessageKind::PropositionChanged,
            PropositionChange::Proposition,
            &mut change_sets,
        );
        fold_changes(
            decode_changes::<OptionChanged>(classified, report.stats(MessageKind::OptionChanged)),
            &nested_levels(GroupLevel::field(KeyField::Option, MergeStrategy::Merge)),
            MessageKind::OptionChanged,
            PropositionChange::Option,
            &mut change_sets,
        );
        fold_changes(
            decode_changes::<VariantChanged>(classified, report.stats(MessageKind::VariantChanged)),
            &nested_levels(GroupLevel::field(KeyField::Variant, MergeStrategy::Merge)),
            MessageKind::VariantChanged,
            PropositionChange::Variant,
            &mut change_sets,
        );
        fold_changes(
            decode_changes::<OutcomeChanged>(classified, report.stats(MessageKind::OutcomeChanged)),
            &nested_levels(GroupLevel::new(
                KeyFn::custom(|d: &Delta<Outcome>| d.patch.outcome_key()),
                MergeStrategy::Merge,
            )),
            MessageKind::OutcomeChanged,
            PropositionChange::Outcome,
            &mut change_sets,
        );
        fold_changes(
            decode_changes::<OutcomeResultChanged>(classified, report.stats(MessageKind::OutcomeResult)),
            &[
                GroupLevel::concat(KeyField::Contest),
                GroupLevel::field(KeyField::Proposition, MergeStrategy::Merge),
            ],
            MessageKind::OutcomeResult,
            PropositionChange::Result,
            &mut change_sets,
        );

        let price_deltas =
            decode_changes::<MarketPriceChanged>(classified, report.stats(MessageKind::MarketPriceChanged));
        let mut price_counts: HashMap<CompositeKey, usize> = HashMap::new();
        for delta in &price_deltas {
            *price_counts.entry(delta.key()).or_default() += 1;
        }
        let price_changes = group_by_proposition(price_deltas);

        phases.advance(BatchPhase::Fetching);
        let proposition_keys: Vec<CompositeKey> = change_sets
            .keys()
            .filter(|key| !propositions.contains_key(*key))
            .cloned()
            .collect();
        let market_keys: Vec<CompositeKey> = price_changes
            .keys()
            .filter(|key| !markets.contains_key(*key))
            .cloned()
            .collect();
        debug!(
            propositions = proposition_keys.len(),
            markets = market_keys.len(),
            "fetching distinct keys"
        );
        let (fetched_propositions, fetched_markets) = tokio::try_join!(
            access.propositions.fetch_many(proposition_keys),
            access.markets.fetch_many(market_keys)
        )?;
        propositions.extend(fetched_propositions);
        markets.extend(fetched_markets);

        phases.advance(BatchPhase::Reconciling);
        for (key, change_set) in change_sets {
            match propositions.get_mut(&key) {
                Some(aggregate) => {
                    change_set.apply_to(aggregate);
                    for (kind, count) in change_set.sources() {
                        report.stats(kind).applied += count;
                    }
                }
                None => {
                    for (kind, count) in change_set.sources() {
                        skip_unknown(kind, &key, count);
                        report.stats(kind).unknown_aggregate += count;
                    }
                }
            }
        }
        for (key, delta) in price_changes {
            let count = price_counts.get(&key).copied().unwrap_or_default();
            let stats = report.stats(MessageKind::MarketPriceChanged);
            match markets.get_mut(&key) {
                Some(market) => {
                    market.apply(&delta.patch);
                    stats.applied += count;
                }
                None => {
                    skip_unknown(MessageKind::MarketPriceChanged, &key, count);
                    stats.unknown_aggregate += count;
                }
            }
        }

        phases.advance(BatchPhase::Persisting);
        tokio::try_join!(
            access.contests.upsert_many(contests.into_values()),
            access.propositions.upsert_many(propositions.into_values()),
            access.markets.upsert_many(markets.into_values())
        )?;
        Ok(())
    }
}

#[async_trait]
impl BatchHandler for BatchProcessor {
    async fn handle_batch(&self, batch: &Batch, transport: &dyn BatchTransport) -> Result<BatchReport, ReconcileError> {
        self.process(batch, transport).await
    }
}

/// Snapshot deltas for `A` applied in arrival order; each one is written.
async fn upsert_in_order<A: Aggregate>(access: &StoreAccess<A>, aggregates: Vec<A>) -> Result<Applied, ReconcileError> {
    let mut outcome = Applied::default();
    for aggregate in aggregates {
        access.upsert(aggregate).await?;
        outcome.applied += 1;
    }
    Ok(outcome)
}

async fn apply_in_order<A: Aggregate>(
    access: &StoreAccess<A>,
    kind: MessageKind,
    deltas: Vec<Delta<A::Patch>>,
) -> Result<Applied, ReconcileError> {
    let mut outcome = Applied::default();
    for delta in deltas {
        let key = delta.key();
        match access.fetch(&key).await? {
            Some(mut aggregate) => {
                aggregate.apply(&delta.patch);
                access.upsert(aggregate).await?;
                outcome.applied += 1;
            }
            None => {
                skip_unknown(kind, &key, 1);
                outcome.unknown += 1;
            }
        }
    }
    Ok(outcome)
}

/// Log `deltas` dropped because their aggregate is in neither the batch nor
/// the store.
fn skip_unknown(kind: MessageKind, key: &CompositeKey, deltas: usize) {
    let err = ReconcileError::UnknownAggregate { kind, key: key.clone() };
    debug_assert!(err.is_recoverable());
    warn!(error = %err, deltas, "dropping deltas");
}

/// Decode every message of one kind, dropping and counting malformed ones.
fn decode_all<T>(
    messages: &[&RawMessage],
    stats: &mut KindStats,
    mut decode_one: impl FnMut(&RawMessage) -> Result<T, ReconcileError>,
) -> Vec<T> {
    let mut decoded = Vec::with_capacity(messages.len());
    for message in messages {
        match decode_one(*message) {
            Ok(value) => decoded.push(value),
            Err(err) => {
                warn!(
                    offset = message.offset,
                    key = message.key.as_deref().unwrap_or_default(),
                    error = %err,
                    "dropping malformed message"
                );
                stats.malformed += 1;
            }
        }
    }
    decoded
}

fn decode_snapshots<T>(
    classified: &Classified<'_>,
    kind: MessageKind,
    identity: &[KeyField],
    stats: &mut KindStats,
) -> Vec<T>
where
    T: serde::de::DeserializeOwned + Identified,
{
    decode_all(classified.of_kind(kind), stats, |message| decode::<T>(kind, identity, message))
}

fn decode_changes<T: Normalize>(classified: &Classified<'_>, stats: &mut KindStats) -> Vec<Delta<T::Patch>> {
    decode_all(classified.of_kind(T::KIND), stats, normalize::<T>)
}

fn proposition_changes<T: Normalize>(
    classified: &Classified<'_>,
    stats: &mut KindStats,
    wrap: fn(T::Patch) -> PropositionChange,
) -> Vec<Delta<PropositionChange>> {
    decode_changes::<T>(classified, stats)
        .into_iter()
        .map(|delta| delta.map(wrap))
        .collect()
}

/// Contest and proposition concat levels above `leaf`.
fn nested_levels<P>(leaf: GroupLevel<Delta<P>>) -> [GroupLevel<Delta<P>>; 3] {
    [
        GroupLevel::concat(KeyField::Contest),
        GroupLevel::concat(KeyField::Proposition),
        leaf,
    ]
}

/// Group `deltas` with `levels`, then file each pre-combined leaf under its
/// proposition's change set.
fn fold_changes<P>(
    deltas: Vec<Delta<P>>,
    levels: &[GroupLevel<Delta<P>>],
    kind: MessageKind,
    wrap: fn(P) -> PropositionChange,
    change_sets: &mut HashMap<CompositeKey, PropositionChangeSet>,
) where
    Delta<P>: Identified + Merge,
{
    for delta in &deltas {
        change_sets.entry(delta.key()).or_default().record_source(kind);
    }
    for (_, delta) in Nested::Branch(group_nested(deltas, levels)).flatten() {
        change_sets
            .entry(delta.key())
            .or_default()
            .push(wrap(delta.patch));
    }
}

/// Market price deltas merged per proposition.
fn group_by_proposition(deltas: Vec<Delta<MarketPatch>>) -> HashMap<CompositeKey, Delta<MarketPatch>> {
    let levels = [
        GroupLevel::concat(KeyField::Contest),
        GroupLevel::field(KeyField::Proposition, MergeStrategy::Merge),
    ];
    Nested::Branch(group_nested(deltas, &levels))
        .flatten()
        .into_iter()
        .map(|(_, delta)| (delta.key(), delta))
        .collect()
}

fn per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

fn log_kind(kind: MessageKind, stats: &KindStats, elapsed: Duration) {
    info!(
        kind = %kind,
        messages = stats.messages,
        applied = stats.applied,
        malformed = stats.malformed,
        unknown_aggregate = stats.unknown_aggregate,
        elapsed_ms = elapsed.as_millis() as u64,
        per_second = per_second(stats.messages, elapsed),
        "kind reconciled"
    );
}

fn log_summary(report: &BatchReport, mode: ProcessingMode) {
    info!(
        mode = %mode,
        partition = report.partition,
        messages = report.messages,
        applied = report.applied(),
        malformed = report.malformed(),
        unknown_aggregate = report.unknown_aggregate(),
        untagged = report.untagged,
        store_reads = report.store_reads,
        store_writes = report.store_writes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        per_second = per_second(report.messages, report.elapsed),
        "batch committed"
    );
}
