//! # Reconciliation Rules
//!
//! How each delta folds into its aggregate. Every rule is an overlay:
//! fields present in the delta replace the stored ones, absent fields are
//! kept, and nested entries are replaced-or-inserted by their stable key.
//! Applying the same delta twice leaves the aggregate unchanged.

use crate::grouping::Merge;
use crate::key::CompositeKey;
use crate::message::MessageKind;
use crate::model::{
    Contest, ContestPatch, MarketAggregate, OfferOption, Outcome, PropositionAggregate, Variant,
};
use crate::normalize::{MarketPatch, PropositionChange, PropositionPatch, ResultPatch};
use crate::store::Aggregate;
use std::collections::BTreeMap;

impl Aggregate for Contest {
    type Patch = ContestPatch;
    const NAME: &'static str = "contest";

    fn key(&self) -> CompositeKey {
        CompositeKey::contest(&self.contest_key)
    }

    fn apply(&mut self, patch: &ContestPatch) {
        overlay(&mut self.name, &patch.name);
        overlay(&mut self.kind, &patch.kind);
        overlay(&mut self.start_timestamp, &patch.start_timestamp);
        overlay(&mut self.end_timestamp, &patch.end_timestamp);
        overlay(&mut self.status, &patch.status);
        overlay(&mut self.timestamp, &patch.timestamp);
    }
}

impl Aggregate for PropositionAggregate {
    type Patch = PropositionChange;
    const NAME: &'static str = "proposition";

    fn key(&self) -> CompositeKey {
        PropositionAggregate::key(self)
    }

    fn apply(&mut self, change: &PropositionChange) {
        match change {
            PropositionChange::Proposition(patch) => apply_proposition(self, patch),
            PropositionChange::Option(option) => apply_option(self, option),
            PropositionChange::Variant(variant) => apply_variant(self, variant),
            PropositionChange::Outcome(outcome) => apply_outcome(self, outcome),
            PropositionChange::Result(results) => apply_results(self, results),
        }
    }
}

impl Aggregate for MarketAggregate {
    type Patch = MarketPatch;
    const NAME: &'static str = "market";

    fn key(&self) -> CompositeKey {
        MarketAggregate::key(self)
    }

    fn apply(&mut self, patch: &MarketPatch) {
        overlay(&mut self.is_available, &patch.is_available);
        for price in &patch.prices {
            self.prices.insert(price.outcome_key(), price.clone());
        }
        overlay(&mut self.timestamp, &patch.timestamp);
    }
}

fn overlay<T: Clone>(field: &mut T, patch: &Option<T>) {
    if let Some(value) = patch {
        *field = value.clone();
    }
}

fn apply_proposition(aggregate: &mut PropositionAggregate, patch: &PropositionPatch) {
    overlay(&mut aggregate.name, &patch.name);
    overlay(&mut aggregate.kind, &patch.kind);
    overlay(&mut aggregate.is_available, &patch.is_available);
    overlay(&mut aggregate.timestamp, &patch.timestamp);
    for option in &patch.options {
        apply_option(aggregate, option);
    }
    for variant in &patch.variants {
        apply_variant(aggregate, variant);
    }
    for outcome in &patch.outcomes {
        apply_outcome(aggregate, outcome);
    }
}

fn apply_option(aggregate: &mut PropositionAggregate, option: &OfferOption) {
    aggregate
        .options
        .entry(option.option_key.clone())
        .or_insert_with(|| OfferOption::empty(&option.option_key))
        .merge(option);
}

fn apply_variant(aggregate: &mut PropositionAggregate, variant: &Variant) {
    aggregate
        .variants
        .entry(variant.variant_key.clone())
        .or_insert_with(|| Variant::empty(&variant.variant_key))
        .merge(variant);
}

fn apply_outcome(aggregate: &mut PropositionAggregate, outcome: &Outcome) {
    aggregate
        .outcomes
        .entry(outcome.outcome_key())
        .or_insert_with(|| Outcome::empty(&outcome.option_key, &outcome.variant_key))
        .merge(outcome);
}

/// Settlements replace any earlier settlement for the same outcome and mark
/// the outcome resulted.
fn apply_results(aggregate: &mut PropositionAggregate, results: &ResultPatch) {
    for settlement in &results.settlements {
        let key = settlement.outcome_key();
        aggregate
            .outcomes
            .entry(key.clone())
            .or_insert_with(|| Outcome::empty(&settlement.option_key, &settlement.variant_key))
            .resulted = Some(true);
        aggregate.results.insert(key, settlement.clone());
    }
    overlay(&mut aggregate.timestamp, &results.timestamp);
}

/// Pre-combined changes for one proposition, applied in kind order.
#[derive(Debug, Clone, Default)]
pub struct PropositionChangeSet {
    changes: Vec<PropositionChange>,
    sources: BTreeMap<MessageKind, usize>,
}

impl PropositionChangeSet {
    pub fn push(&mut self, change: PropositionChange) {
        self.changes.push(change);
    }

    /// Count one input delta of `kind` folded into this set.
    pub fn record_source(&mut self, kind: MessageKind) {
        *self.sources.entry(kind).or_default() += 1;
    }

    /// Input deltas per kind, before pre-combination.
    pub fn sources(&self) -> impl Iterator<Item = (MessageKind, usize)> + '_ {
        self.sources.iter().map(|(kind, count)| (*kind, *count))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply every change to `aggregate`. Changes of an earlier kind in the
    /// processing order land first; same-kind changes keep insertion order.
    pub fn apply_to(&self, aggregate: &mut PropositionAggregate) {
        for kind in MessageKind::PROCESSING_ORDER {
            for change in self.changes.iter().filter(|c| c.kind() == kind) {
                aggregate.apply(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Proposition, Settlement};

    fn proposition() -> PropositionAggregate {
        PropositionAggregate::from(Proposition {
            contest_key: "c1".into(),
            proposition_key: "p1".into(),
            name: "Winner".into(),
            kind: "Proposition1".into(),
            is_available: true,
            options: vec![
                OfferOption {
                    name: Some("W".into()),
                    ..OfferOption::empty("o1")
                },
                OfferOption {
                    name: Some("L".into()),
                    ..OfferOption::empty("o2")
                },
            ],
            variants: vec![Variant::empty("v1")],
            outcomes: vec![Outcome::empty("o1", "v1")],
            timestamp: "t0".into(),
        })
    }

    #[test]
    fn option_delta_replaces_only_present_fields() {
        let mut aggregate = proposition();
        aggregate.apply(&PropositionChange::Option(OfferOption {
            is_available: Some(false),
            ..OfferOption::empty("o1")
        }));
        assert_eq!(aggregate.options["o1"].name.as_deref(), Some("W"));
        assert_eq!(aggregate.options["o1"].is_available, Some(false));
        assert_eq!(aggregate.options["o2"].name.as_deref(), Some("L"));
    }

    #[test]
    fn unseen_nested_key_is_inserted() {
        let mut aggregate = proposition();
        aggregate.apply(&PropositionChange::Variant(Variant {
            name: Some("Handicap".into()),
            ..Variant::empty("v2")
        }));
        assert_eq!(aggregate.variants.len(), 2);
        assert_eq!(aggregate.variants["v2"].name.as_deref(), Some("Handicap"));
    }

    #[test]
    fn every_change_is_idempotent() {
        let changes = [
            PropositionChange::Proposition(PropositionPatch {
                name: Some("Renamed".into()),
                outcomes: vec![Outcome::empty("o2", "v1")],
                ..Default::default()
            }),
            PropositionChange::Option(OfferOption::empty("o3")),
            PropositionChange::Outcome(Outcome {
                is_available: Some(true),
                ..Outcome::empty("o1", "v1")
            }),
            PropositionChange::Result(ResultPatch {
                settlements: vec![Settlement {
                    option_key: "o1".into(),
                    variant_key: "v1".into(),
                    status: "Won".into(),
                    win_amount: 1.5,
                }],
                timestamp: Some("t5".into()),
            }),
        ];
        for change in &changes {
            let mut once = proposition();
            once.apply(change);
            let mut twice = once.clone();
            twice.apply(change);
            assert_eq!(once, twice, "{:?}", change.kind());
        }
    }

    #[test]
    fn results_mark_outcome_resulted() {
        let mut aggregate = proposition();
        aggregate.apply(&PropositionChange::Result(ResultPatch {
            settlements: vec![Settlement {
                option_key: "o2".into(),
                variant_key: "v1".into(),
                status: "Lost".into(),
                win_amount: 0.0,
            }],
            timestamp: None,
        }));
        let key = CompositeKey::outcome("o2", "v1");
        assert_eq!(aggregate.outcomes[&key].resulted, Some(true));
        assert_eq!(aggregate.results[&key].status, "Lost");
        assert_eq!(aggregate.timestamp, "t0");
    }

    #[test]
    fn change_set_applies_in_kind_order() {
        let mut set = PropositionChangeSet::default();
        assert!(set.is_empty());
        set.push(PropositionChange::Option(OfferOption {
            name: Some("from option delta".into()),
            ..OfferOption::empty("o1")
        }));
        set.record_source(MessageKind::OptionChanged);
        set.record_source(MessageKind::OptionChanged);
        set.push(PropositionChange::Proposition(PropositionPatch {
            options: vec![OfferOption {
                name: Some("from proposition delta".into()),
                ..OfferOption::empty("o1")
            }],
            ..Default::default()
        }));
        set.record_source(MessageKind::PropositionChanged);
        assert_eq!(set.len(), 2);

        let mut aggregate = proposition();
        set.apply_to(&mut aggregate);
        assert_eq!(aggregate.options["o1"].name.as_deref(), Some("from option delta"));
        let sources: Vec<_> = set.sources().collect();
        assert_eq!(
            sources,
            vec![(MessageKind::PropositionChanged, 1), (MessageKind::OptionChanged, 2)]
        );
    }

    #[test]
    fn market_prices_are_latest_wins_per_outcome() {
        use crate::model::{Market, Price};
        let mut market = MarketAggregate::from(Market {
            contest_key: "c1".into(),
            proposition_key: "p1".into(),
            is_available: true,
            timestamp: "t0".into(),
        });
        let price = |value: f64, ts: &str| Price {
            option_key: "o1".into(),
            variant_key: "v1".into(),
            price: value,
            timestamp: ts.into(),
        };
        market.apply(&MarketPatch {
            is_available: None,
            prices: vec![price(1.8, "t1")],
            timestamp: None,
        });
        market.apply(&MarketPatch {
            is_available: Some(false),
            prices: vec![price(2.1, "t2")],
            timestamp: Some("t2".into()),
        });
        assert_eq!(market.prices.len(), 1);
        assert_eq!(market.prices[&CompositeKey::outcome("o1", "v1")].price, 2.1);
        assert!(!market.is_available);
    }
}
