use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;

use anyhow::Context;
use offerfold::config::{ConfigOverrides, ConsumerOverrides, OfferfoldConfig, TopicOverrides};
use offerfold::{Batch, MemoryStores, OfferConsumer, ProcessingMode, RawMessage, RecordingTransport};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"offerfold_replay - Replay recorded offer messages through the reconciler

USAGE:
    offerfold_replay --input <FILE> [OPTIONS]

OPTIONS:
    -i, --input <FILE>        JSON-lines file, one message per line
    -c, --config <FILE>       Path to config file (TOML)
    -m, --mode <MODE>         normal | optimized
        --with-cache          Batch-scoped read cache (normal mode)
        --concurrent          Fan out across propositions (normal mode)
        --partitions <N>      Partitions processed at the same time [default: 3]
        --topic <NAME>        Topic the messages belong to [default: offers]
        --batch-size <N>      Messages per batch [default: 500]
        --dump                Print the stored aggregates as JSON
    -h, --help                Print help

ENVIRONMENT:
    OFFERFOLD_CONFIG                 Path to config file
    OFFERFOLD_CONSUMER__MODE         normal | optimized
    OFFERFOLD_CONSUMER__WITH_CACHE   true | false
    RUST_LOG                         Log filter, e.g. offerfold=debug

INPUT LINE:
    {{"partition":0,"offset":12,"key":"c1","headers":{{"messageType":"OptionChanged"}},"value":{{...}}}}
"#
    );
}

/// One line of the replay file.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    partition: i32,
    offset: i64,
    key: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    value: serde_json::Value,
}

impl ReplayLine {
    fn into_message(self) -> anyhow::Result<RawMessage> {
        Ok(RawMessage {
            key: self.key,
            value: serde_json::to_vec(&self.value)?,
            headers: self
                .headers
                .into_iter()
                .map(|(name, value)| (name, value.into_bytes()))
                .collect(),
            partition: self.partition,
            offset: self.offset,
        })
    }
}

fn load_batches(path: &str, topic: &str, batch_size: usize) -> anyhow::Result<Vec<Batch>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let mut by_partition: BTreeMap<i32, Vec<RawMessage>> = BTreeMap::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ReplayLine =
            serde_json::from_str(line).with_context(|| format!("{path}:{}", index + 1))?;
        let message = parsed.into_message()?;
        by_partition.entry(message.partition).or_default().push(message);
    }

    let mut batches = Vec::new();
    for (partition, mut messages) in by_partition {
        messages.sort_by_key(|m| m.offset);
        for chunk in messages.chunks(batch_size.max(1)) {
            batches.push(Batch::new(topic, partition, chunk.to_vec()));
        }
    }
    Ok(batches)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let input = parse_arg("--input")
        .or_else(|| parse_arg("-i"))
        .context("--input is required")?;

    // Build CLI overrides
    let mut overrides = ConfigOverrides::default();
    let mut consumer = ConsumerOverrides::default();
    if let Some(mode) = parse_arg("--mode").or_else(|| parse_arg("-m")) {
        consumer.mode = Some(match mode.as_str() {
            "normal" => ProcessingMode::Normal,
            "optimized" => ProcessingMode::Optimized,
            other => anyhow::bail!("unknown mode `{other}` (expected normal or optimized)"),
        });
    }
    if has_flag("--with-cache") {
        consumer.with_cache = Some(true);
    }
    if has_flag("--concurrent") {
        consumer.concurrent = Some(true);
    }
    if let Some(partitions) = parse_arg("--partitions") {
        consumer.partitions_consumed_concurrently = Some(partitions.parse()?);
    }
    overrides.consumer = Some(consumer);
    if let Some(topic) = parse_arg("--topic") {
        overrides.topic = Some(TopicOverrides { name: Some(topic) });
    }

    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("OFFERFOLD_CONFIG").ok());
    let config = OfferfoldConfig::load(config_path.as_deref(), overrides)?;
    let batch_size: usize = parse_arg("--batch-size")
        .unwrap_or_else(|| "500".to_string())
        .parse()?;

    let batches = load_batches(&input, &config.topic.name, batch_size)?;
    let stores = MemoryStores::new(config.store_latency());
    let transport = Arc::new(RecordingTransport::new());
    let consumer = OfferConsumer::new(config, stores.stores());

    println!(
        "Replaying {} batches from {} (mode: {}, cache: {}, concurrent: {})",
        batches.len(),
        input,
        consumer.config().consumer.mode,
        consumer.config().consumer.with_cache,
        consumer.config().consumer.concurrent,
    );

    let started = std::time::Instant::now();
    let reports = consumer.run(batches, transport.clone()).await?;
    let elapsed = started.elapsed();

    let messages: usize = reports.iter().map(|r| r.messages).sum();
    let applied: usize = reports.iter().map(|r| r.applied()).sum();
    let malformed: usize = reports.iter().map(|r| r.malformed()).sum();
    let unknown: usize = reports.iter().map(|r| r.unknown_aggregate()).sum();
    let untagged: usize = reports.iter().map(|r| r.untagged).sum();
    let reads: u64 = reports.iter().map(|r| r.store_reads).sum();
    let writes: u64 = reports.iter().map(|r| r.store_writes).sum();

    println!("Batches:        {}", reports.len());
    println!("Messages:       {messages}");
    println!("Applied:        {applied}");
    println!("Dropped:        {malformed} malformed, {unknown} unknown aggregate, {untagged} untagged");
    println!("Store traffic:  {reads} reads, {writes} writes");
    println!(
        "Stored:         {} contests, {} propositions, {} markets",
        stores.contests.len(),
        stores.propositions.len(),
        stores.markets.len()
    );
    for (partition, offset) in transport.log().commits.iter().fold(BTreeMap::new(), |mut last, (p, o)| {
        last.insert(*p, *o);
        last
    }) {
        println!("Committed:      partition {partition} at offset {offset}");
    }
    println!("Elapsed:        {:.2?}", elapsed);

    if has_flag("--dump") {
        let dump = serde_json::json!({
            "contests": stores.contests.snapshot().into_values().collect::<Vec<_>>(),
            "propositions": stores.propositions.snapshot().into_values().collect::<Vec<_>>(),
            "markets": stores.markets.snapshot().into_values().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&dump)?);
    }

    Ok(())
}
