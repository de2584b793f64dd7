use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::config::DEFAULT_TOPIC;
use crate::message::{Batch, MessageKind, RawMessage};

/// Builds wire messages for one partition with consecutive offsets.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    pub topic: String,
    pub partition: i32,
    next_offset: i64,
}

impl MessageFactory {
    pub fn new(partition: i32) -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            partition,
            next_offset: 0,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Continue numbering at `offset`.
    pub fn skip_to(&mut self, offset: i64) {
        self.next_offset = offset;
    }

    pub fn next_offset(&self) -> i64 {
        self.next_offset
    }

    pub fn batch(&self, messages: Vec<RawMessage>) -> Batch {
        Batch::new(self.topic.clone(), self.partition, messages)
    }

    pub fn raw(&mut self, kind: MessageKind, key: &str, value: Value) -> RawMessage {
        let offset = self.next_offset;
        self.next_offset += 1;
        let bytes = serde_json::to_vec(&value).unwrap_or_default();
        RawMessage::tagged(kind, key, bytes, self.partition, offset)
    }

    fn stamp(&self) -> String {
        format!("2024-01-01T00:00:{:02}Z", self.next_offset % 60)
    }

    pub fn contest(&mut self, contest: &str) -> RawMessage {
        let value = json!({
            "contestKey": contest,
            "name": format!("Contest {contest}"),
            "type": "Match",
            "startTimestamp": "2024-01-01T18:00:00Z",
            "endTimestamp": "2024-01-01T20:00:00Z",
            "status": "PreGame",
            "timestamp": self.stamp(),
        });
        self.raw(MessageKind::Contest, contest, value)
    }

    /// Proposition snapshot with one variant `v1` and an outcome per option.
    pub fn proposition(&mut self, contest: &str, proposition: &str, options: &[&str]) -> RawMessage {
        let option_entries: Vec<Value> = options
            .iter()
            .map(|option| json!({"optionKey": option, "name": format!("Option {option}"), "isAvailable": true}))
            .collect();
        let outcome_entries: Vec<Value> = options
            .iter()
            .map(|option| json!({"optionKey": option, "variantKey": "v1", "isAvailable": true}))
            .collect();
        let value = json!({
            "contestKey": contest,
            "propositionKey": proposition,
            "name": format!("Proposition {proposition}"),
            "type": "Proposition1",
            "isAvailable": true,
            "options": option_entries,
            "variants": [{"variantKey": "v1", "name": "Full time"}],
            "outcomes": outcome_entries,
            "timestamp": self.stamp(),
        });
        self.raw(MessageKind::Proposition, contest, value)
    }

    pub fn market(&mut self, contest: &str, proposition: &str) -> RawMessage {
        let value = json!({
            "contestKey": contest,
            "propositionKey": proposition,
            "isAvailable": true,
            "timestamp": self.stamp(),
        });
        self.raw(MessageKind::Market, contest, value)
    }

    pub fn proposition_changed(
        &mut self,
        contest: &str,
        proposition: &str,
        name: Option<&str>,
        is_available: Option<bool>,
    ) -> RawMessage {
        let mut value = json!({"contestKey": contest, "propositionKey": proposition});
        insert_opt(&mut value, "name", name.map(Value::from));
        insert_opt(&mut value, "isAvailable", is_available.map(Value::from));
        self.raw(MessageKind::PropositionChanged, contest, value)
    }

    pub fn option_changed(
        &mut self,
        contest: &str,
        proposition: &str,
        option: &str,
        name: Option<&str>,
        is_available: Option<bool>,
    ) -> RawMessage {
        let mut value = json!({"contestKey": contest, "propositionKey": proposition, "optionKey": option});
        insert_opt(&mut value, "name", name.map(Value::from));
        insert_opt(&mut value, "isAvailable", is_available.map(Value::from));
        self.raw(MessageKind::OptionChanged, contest, value)
    }

    pub fn variant_changed(
        &mut self,
        contest: &str,
        proposition: &str,
        variant: &str,
        name: Option<&str>,
        is_available: Option<bool>,
    ) -> RawMessage {
        let mut value = json!({"contestKey": contest, "propositionKey": proposition, "variantKey": variant});
        insert_opt(&mut value, "name", name.map(Value::from));
        insert_opt(&mut value, "isAvailable", is_available.map(Value::from));
        self.raw(MessageKind::VariantChanged, contest, value)
    }

    pub fn outcome_changed(
        &mut self,
        contest: &str,
        proposition: &str,
        option: &str,
        variant: &str,
        is_available: Option<bool>,
    ) -> RawMessage {
        let mut value = json!({
            "contestKey": contest,
            "propositionKey": proposition,
            "optionKey": option,
            "variantKey": variant,
        });
        insert_opt(&mut value, "isAvailable", is_available.map(Value::from));
        self.raw(MessageKind::OutcomeChanged, contest, value)
    }

    pub fn outcome_result(
        &mut self,
        contest: &str,
        proposition: &str,
        option: &str,
        variant: &str,
        status: &str,
        win_amount: f64,
    ) -> RawMessage {
        self.outcome_results(contest, proposition, &[(option, variant, status, win_amount)])
    }

    /// Settlements given as `(option, variant, status, win amount)`.
    pub fn outcome_results(
        &mut self,
        contest: &str,
        proposition: &str,
        results: &[(&str, &str, &str, f64)],
    ) -> RawMessage {
        let entries: Vec<Value> = results
            .iter()
            .map(|(option, variant, status, win_amount)| {
                json!({"optionKey": option, "variantKey": variant, "status": status, "winAmount": win_amount})
            })
            .collect();
        let value = json!({
            "contestKey": contest,
            "propositionKey": proposition,
            "outcomeResult": entries,
            "timestamp": self.stamp(),
        });
        self.raw(MessageKind::OutcomeResult, contest, value)
    }

    pub fn price_changed(
        &mut self,
        contest: &str,
        proposition: &str,
        option: &str,
        variant: &str,
        price: f64,
    ) -> RawMessage {
        self.prices_changed(contest, proposition, &[(option, variant, price)])
    }

    /// Prices given as `(option, variant, price)`.
    pub fn prices_changed(&mut self, contest: &str, proposition: &str, prices: &[(&str, &str, f64)]) -> RawMessage {
        let stamp = self.stamp();
        let entries: Vec<Value> = prices
            .iter()
            .map(|(option, variant, price)| {
                json!({"optionKey": option, "variantKey": variant, "price": price, "timestamp": stamp})
            })
            .collect();
        let value = json!({
            "contestKey": contest,
            "propositionKey": proposition,
            "prices": entries,
            "timestamp": stamp,
        });
        self.raw(MessageKind::MarketPriceChanged, contest, value)
    }

    /// Proposition change carrying nested option entries `(option, name)`.
    pub fn proposition_options_changed(
        &mut self,
        contest: &str,
        proposition: &str,
        options: &[(&str, &str)],
    ) -> RawMessage {
        let entries: Vec<Value> = options
            .iter()
            .map(|(option, name)| json!({"optionKey": option, "name": name}))
            .collect();
        let value = json!({"contestKey": contest, "propositionKey": proposition, "options": entries});
        self.raw(MessageKind::PropositionChanged, contest, value)
    }
}

fn insert_opt(value: &mut Value, field: &str, entry: Option<Value>) {
    if let (Value::Object(map), Some(entry)) = (value, entry) {
        map.insert(field.to_string(), entry);
    }
}

/// Shape of a generated batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchShape {
    pub contests: usize,
    pub propositions_per_contest: usize,
    pub options_per_proposition: usize,
    /// Change messages after the snapshots.
    pub deltas: usize,
    /// Chance that a delta targets a proposition with no snapshot.
    pub orphan_probability: f64,
}

impl Default for BatchShape {
    fn default() -> Self {
        Self {
            contests: 2,
            propositions_per_contest: 3,
            options_per_proposition: 3,
            deltas: 60,
            orphan_probability: 0.05,
        }
    }
}

/// Deterministic mixed batch: snapshots for every contest, proposition and
/// market, followed by shuffled change messages of every kind.
pub fn generate_batch(factory: &mut MessageFactory, shape: BatchShape, seed: u64) -> Batch {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut messages = Vec::new();

    let option_keys: Vec<String> = (0..shape.options_per_proposition.max(1))
        .map(|i| format!("o{i}"))
        .collect();
    let option_refs: Vec<&str> = option_keys.iter().map(String::as_str).collect();

    for c in 0..shape.contests {
        let contest = format!("c{c}");
        messages.push(factory.contest(&contest));
        for p in 0..shape.propositions_per_contest {
            let proposition = format!("p{p}");
            messages.push(factory.proposition(&contest, &proposition, &option_refs));
            messages.push(factory.market(&contest, &proposition));
        }
    }

    let names = ["Home", "Away", "Draw", "Over", "Under"];
    for _ in 0..shape.deltas {
        let contest = format!("c{}", rng.random_range(0..shape.contests.max(1)));
        let proposition = if rng.random_bool(shape.orphan_probability) {
            format!("orphan{}", rng.random_range(0..3))
        } else {
            format!("p{}", rng.random_range(0..shape.propositions_per_contest.max(1)))
        };
        let option = option_refs[rng.random_range(0..option_refs.len())];
        let variant = if rng.random_bool(0.8) { "v1" } else { "v2" };
        let name = if rng.random_bool(0.7) {
            Some(names[rng.random_range(0..names.len())])
        } else {
            None
        };
        let available = if rng.random_bool(0.5) {
            Some(rng.random_bool(0.5))
        } else {
            None
        };

        // Nested lists sometimes carry several entries, repeated keys included.
        let entries = if rng.random_bool(0.3) { rng.random_range(2..5) } else { 1 };
        let message = match rng.random_range(0..7) {
            0 if entries > 1 => {
                let options: Vec<(&str, &str)> = (0..entries)
                    .map(|_| {
                        (
                            option_refs[rng.random_range(0..option_refs.len())],
                            names[rng.random_range(0..names.len())],
                        )
                    })
                    .collect();
                factory.proposition_options_changed(&contest, &proposition, &options)
            }
            0 => factory.proposition_changed(&contest, &proposition, name, available),
            1 | 2 => factory.option_changed(&contest, &proposition, option, name, available),
            3 => factory.variant_changed(&contest, &proposition, variant, name, available),
            4 => factory.outcome_changed(&contest, &proposition, option, variant, available),
            5 => {
                let results: Vec<(&str, &str, &str, f64)> = (0..entries)
                    .map(|_| {
                        let option = option_refs[rng.random_range(0..option_refs.len())];
                        let status = if rng.random_bool(0.5) { "Won" } else { "Lost" };
                        (option, variant, status, rng.random_range(0..400) as f64 / 100.0)
                    })
                    .collect();
                factory.outcome_results(&contest, &proposition, &results)
            }
            _ => {
                let prices: Vec<(&str, &str, f64)> = (0..entries)
                    .map(|_| {
                        let option = option_refs[rng.random_range(0..option_refs.len())];
                        (option, variant, rng.random_range(101..900) as f64 / 100.0)
                    })
                    .collect();
                factory.prices_changed(&contest, &proposition, &prices)
            }
        };
        messages.push(message);
    }

    factory.batch(messages)
}
