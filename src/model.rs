//! # Data Model
//!
//! Wire-level snapshots and the materialized aggregates they fold into.
//! Field names follow the wire (camelCase JSON).

use crate::grouping::{group_latest, Identified, KeyField, KeyFn, Merge};
use crate::key::CompositeKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a contest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContestStatus {
    Cancelled,
    Concluded,
    InPlay,
    Postponed,
    PreGame,
    Suspended,
}

impl fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContestStatus::Cancelled => "Cancelled",
            ContestStatus::Concluded => "Concluded",
            ContestStatus::InPlay => "InPlay",
            ContestStatus::Postponed => "Postponed",
            ContestStatus::PreGame => "PreGame",
            ContestStatus::Suspended => "Suspended",
        };
        f.write_str(label)
    }
}

/// Contest snapshot. Stored as-is: a newer snapshot replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub contest_key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_timestamp: String,
    pub end_timestamp: String,
    pub status: ContestStatus,
    pub timestamp: String,
}

/// Partial update of a stored contest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContestPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub status: Option<ContestStatus>,
    pub timestamp: Option<String>,
}

impl Merge for ContestPatch {
    fn merge(&mut self, later: &Self) {
        self.name.merge(&later.name);
        self.kind.merge(&later.kind);
        self.start_timestamp.merge(&later.start_timestamp);
        self.end_timestamp.merge(&later.end_timestamp);
        self.status.merge(&later.status);
        self.timestamp.merge(&later.timestamp);
    }
}

/// Option of a proposition. Entries created from deltas may be partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferOption {
    pub option_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

impl OfferOption {
    pub fn empty(option_key: impl Into<String>) -> Self {
        Self {
            option_key: option_key.into(),
            name: None,
            kind: None,
            is_available: None,
        }
    }
}

impl Merge for OfferOption {
    fn merge(&mut self, later: &Self) {
        self.name.merge(&later.name);
        self.kind.merge(&later.kind);
        self.is_available.merge(&later.is_available);
    }
}

impl Identified for OfferOption {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Option => Some(&self.option_key),
            _ => None,
        }
    }
}

/// Variant of a proposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub variant_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

impl Variant {
    pub fn empty(variant_key: impl Into<String>) -> Self {
        Self {
            variant_key: variant_key.into(),
            name: None,
            kind: None,
            is_available: None,
        }
    }
}

impl Merge for Variant {
    fn merge(&mut self, later: &Self) {
        self.name.merge(&later.name);
        self.kind.merge(&later.kind);
        self.is_available.merge(&later.is_available);
    }
}

impl Identified for Variant {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Variant => Some(&self.variant_key),
            _ => None,
        }
    }
}

/// Outcome of a proposition, identified by its (option, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub option_key: String,
    pub variant_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resulted: Option<bool>,
}

impl Outcome {
    pub fn empty(option_key: impl Into<String>, variant_key: impl Into<String>) -> Self {
        Self {
            option_key: option_key.into(),
            variant_key: variant_key.into(),
            is_available: None,
            resulted: None,
        }
    }

    pub fn outcome_key(&self) -> CompositeKey {
        CompositeKey::outcome(&self.option_key, &self.variant_key)
    }
}

impl Merge for Outcome {
    fn merge(&mut self, later: &Self) {
        self.is_available.merge(&later.is_available);
        self.resulted.merge(&later.resulted);
    }
}

impl Identified for Outcome {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Option => Some(&self.option_key),
            KeyField::Variant => Some(&self.variant_key),
            _ => None,
        }
    }
}

/// Settled result of one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub option_key: String,
    pub variant_key: String,
    pub status: String,
    pub win_amount: f64,
}

impl Settlement {
    pub fn outcome_key(&self) -> CompositeKey {
        CompositeKey::outcome(&self.option_key, &self.variant_key)
    }
}

/// Price of one outcome on a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub option_key: String,
    pub variant_key: String,
    pub price: f64,
    pub timestamp: String,
}

impl Price {
    pub fn outcome_key(&self) -> CompositeKey {
        CompositeKey::outcome(&self.option_key, &self.variant_key)
    }
}

/// Proposition snapshot as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposition {
    pub contest_key: String,
    pub proposition_key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_available: bool,
    #[serde(default)]
    pub options: Vec<OfferOption>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
    pub timestamp: String,
}

/// Materialized proposition: the unit the engine stores.
///
/// Nested collections are keyed by stable identifiers, never by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropositionAggregate {
    pub contest_key: String,
    pub proposition_key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_available: bool,
    pub options: BTreeMap<String, OfferOption>,
    pub variants: BTreeMap<String, Variant>,
    pub outcomes: BTreeMap<CompositeKey, Outcome>,
    #[serde(default)]
    pub results: BTreeMap<CompositeKey, Settlement>,
    pub timestamp: String,
}

impl PropositionAggregate {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::proposition(&self.contest_key, &self.proposition_key)
    }
}

impl From<Proposition> for PropositionAggregate {
    /// Duplicate entries in the snapshot collapse to the last one per key.
    fn from(snapshot: Proposition) -> Self {
        let options = group_latest(snapshot.options, &KeyFn::Field(KeyField::Option))
            .into_iter()
            .map(|(key, option)| (key.into_string(), option))
            .collect();
        let variants = group_latest(snapshot.variants, &KeyFn::Field(KeyField::Variant))
            .into_iter()
            .map(|(key, variant)| (key.into_string(), variant))
            .collect();
        let outcomes = group_latest(snapshot.outcomes, &KeyFn::custom(Outcome::outcome_key))
            .into_iter()
            .collect();

        Self {
            contest_key: snapshot.contest_key,
            proposition_key: snapshot.proposition_key,
            name: snapshot.name,
            kind: snapshot.kind,
            is_available: snapshot.is_available,
            options,
            variants,
            outcomes,
            results: BTreeMap::new(),
            timestamp: snapshot.timestamp,
        }
    }
}

/// Market snapshot as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub contest_key: String,
    pub proposition_key: String,
    pub is_available: bool,
    pub timestamp: String,
}

/// Materialized market with prices keyed by outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAggregate {
    pub contest_key: String,
    pub proposition_key: String,
    pub is_available: bool,
    pub prices: BTreeMap<CompositeKey, Price>,
    pub timestamp: String,
}

impl MarketAggregate {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::proposition(&self.contest_key, &self.proposition_key)
    }
}

impl From<Market> for MarketAggregate {
    /// A snapshot carries no prices; the price map starts empty.
    fn from(snapshot: Market) -> Self {
        Self {
            contest_key: snapshot.contest_key,
            proposition_key: snapshot.proposition_key,
            is_available: snapshot.is_available,
            prices: BTreeMap::new(),
            timestamp: snapshot.timestamp,
        }
    }
}

impl Identified for Contest {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Contest => Some(&self.contest_key),
            _ => None,
        }
    }
}

impl Identified for Proposition {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Contest => Some(&self.contest_key),
            KeyField::Proposition => Some(&self.proposition_key),
            _ => None,
        }
    }
}

impl Identified for Market {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Contest => Some(&self.contest_key),
            KeyField::Proposition => Some(&self.proposition_key),
            _ => None,
        }
    }
}
