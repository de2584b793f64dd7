//! # Change Normalization
//!
//! Decodes wire change payloads and turns them into canonical deltas: the
//! contest/proposition identity is lifted out of the payload, absent nested
//! collections become empty, and payloads whose identity fields are missing
//! or contain the key separator are rejected as malformed.

use crate::error::ReconcileError;
use crate::grouping::{Identified, KeyField, Merge};
use crate::key::{CompositeKey, KEY_SEPARATOR};
use crate::message::{MessageKind, RawMessage};
use crate::model::{OfferOption, Outcome, Price, Settlement, Variant};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Canonical delta: full identity path plus the changed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<P> {
    pub contest_key: String,
    pub proposition_key: String,
    pub patch: P,
}

impl<P> Delta<P> {
    pub fn new(contest_key: impl Into<String>, proposition_key: impl Into<String>, patch: P) -> Self {
        Self {
            contest_key: contest_key.into(),
            proposition_key: proposition_key.into(),
            patch,
        }
    }

    /// Identity of the aggregate the delta targets.
    pub fn key(&self) -> CompositeKey {
        CompositeKey::proposition(&self.contest_key, &self.proposition_key)
    }

    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> Delta<Q> {
        Delta {
            contest_key: self.contest_key,
            proposition_key: self.proposition_key,
            patch: f(self.patch),
        }
    }
}

impl<P: Identified> Identified for Delta<P> {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match field {
            KeyField::Contest => Some(&self.contest_key),
            KeyField::Proposition => Some(&self.proposition_key),
            nested => self.patch.key_field(nested),
        }
    }
}

impl<P: Merge> Merge for Delta<P> {
    fn merge(&mut self, later: &Self) {
        self.patch.merge(&later.patch);
    }
}

/// Overlay `later` entries onto `entries`, matching by key. Unmatched
/// entries are appended in order. Both lists hold at most one entry per key
/// when built by [`collapse_keyed`].
pub(crate) fn merge_keyed<T, F>(entries: &mut Vec<T>, later: &[T], key: F)
where
    T: Merge + Clone,
    F: Fn(&T) -> CompositeKey,
{
    for incoming in later {
        let incoming_key = key(incoming);
        match entries.iter_mut().find(|entry| key(entry) == incoming_key) {
            Some(existing) => existing.merge(incoming),
            None => entries.push(incoming.clone()),
        }
    }
}

/// Fold repeated keys of one nested list into a single entry, overlaying in
/// arrival order. The position of a key's first appearance is kept.
pub(crate) fn collapse_keyed<T, F>(entries: Vec<T>, key: F) -> Vec<T>
where
    T: Merge + Clone,
    F: Fn(&T) -> CompositeKey,
{
    let mut collapsed = Vec::with_capacity(entries.len());
    merge_keyed(&mut collapsed, &entries, key);
    collapsed
}

fn option_key(option: &OfferOption) -> CompositeKey {
    CompositeKey::from(option.option_key.as_str())
}

fn variant_key(variant: &Variant) -> CompositeKey {
    CompositeKey::from(variant.variant_key.as_str())
}

impl Merge for Settlement {
    fn merge(&mut self, later: &Self) {
        *self = later.clone();
    }
}

impl Merge for Price {
    fn merge(&mut self, later: &Self) {
        *self = later.clone();
    }
}

/// Changed fields of a proposition itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropositionPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_available: Option<bool>,
    pub timestamp: Option<String>,
    pub options: Vec<OfferOption>,
    pub variants: Vec<Variant>,
    pub outcomes: Vec<Outcome>,
}

impl Merge for PropositionPatch {
    fn merge(&mut self, later: &Self) {
        self.name.merge(&later.name);
        self.kind.merge(&later.kind);
        self.is_available.merge(&later.is_available);
        self.timestamp.merge(&later.timestamp);
        merge_keyed(&mut self.options, &later.options, option_key);
        merge_keyed(&mut self.variants, &later.variants, variant_key);
        merge_keyed(&mut self.outcomes, &later.outcomes, Outcome::outcome_key);
    }
}

impl Identified for PropositionPatch {
    fn key_field(&self, _field: KeyField) -> Option<&str> {
        None
    }
}

/// Settlements reported for a proposition's outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPatch {
    pub settlements: Vec<Settlement>,
    pub timestamp: Option<String>,
}

impl Merge for ResultPatch {
    fn merge(&mut self, later: &Self) {
        merge_keyed(&mut self.settlements, &later.settlements, Settlement::outcome_key);
        self.timestamp.merge(&later.timestamp);
    }
}

impl Identified for ResultPatch {
    fn key_field(&self, _field: KeyField) -> Option<&str> {
        None
    }
}

/// Changed fields of a market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPatch {
    pub is_available: Option<bool>,
    pub prices: Vec<Price>,
    pub timestamp: Option<String>,
}

impl Merge for MarketPatch {
    fn merge(&mut self, later: &Self) {
        self.is_available.merge(&later.is_available);
        merge_keyed(&mut self.prices, &later.prices, Price::outcome_key);
        self.timestamp.merge(&later.timestamp);
    }
}

impl Identified for MarketPatch {
    fn key_field(&self, _field: KeyField) -> Option<&str> {
        None
    }
}

/// Any delta that targets a proposition aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum PropositionChange {
    Proposition(PropositionPatch),
    Option(OfferOption),
    Variant(Variant),
    Outcome(Outcome),
    Result(ResultPatch),
}

impl PropositionChange {
    pub fn kind(&self) -> MessageKind {
        match self {
            PropositionChange::Proposition(_) => MessageKind::PropositionChanged,
            PropositionChange::Option(_) => MessageKind::OptionChanged,
            PropositionChange::Variant(_) => MessageKind::VariantChanged,
            PropositionChange::Outcome(_) => MessageKind::OutcomeChanged,
            PropositionChange::Result(_) => MessageKind::OutcomeResult,
        }
    }
}

impl Identified for PropositionChange {
    fn key_field(&self, field: KeyField) -> Option<&str> {
        match self {
            PropositionChange::Option(option) => option.key_field(field),
            PropositionChange::Variant(variant) => variant.key_field(field),
            PropositionChange::Outcome(outcome) => outcome.key_field(field),
            PropositionChange::Proposition(_) | PropositionChange::Result(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Payload kinds the normalizer understands.
pub trait Normalize: DeserializeOwned + Identified {
    const KIND: MessageKind;
    /// Identity fields that must be present and non-empty.
    const IDENTITY: &'static [KeyField];
    type Patch;

    fn into_delta(self) -> Delta<Self::Patch>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropositionChanged {
    pub contest_key: String,
    pub proposition_key: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_available: Option<bool>,
    pub options: Option<Vec<OfferOption>>,
    pub variants: Option<Vec<Variant>>,
    pub outcomes: Option<Vec<Outcome>>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChanged {
    pub contest_key: String,
    pub proposition_key: String,
    pub option_key: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantChanged {
    pub contest_key: String,
    pub proposition_key: String,
    pub variant_key: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeChanged {
    pub contest_key: String,
    pub proposition_key: String,
    pub option_key: String,
    pub variant_key: String,
    pub is_available: Option<bool>,
    pub resulted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResultChanged {
    pub contest_key: String,
    pub proposition_key: String,
    pub outcome_result: Option<Vec<Settlement>>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPriceChanged {
    pub contest_key: String,
    pub proposition_key: String,
    pub prices: Option<Vec<Price>>,
    pub timestamp: Option<String>,
}

macro_rules! proposition_identity {
    ($($ty:ty => { $($field:ident : $name:ident),* }),* $(,)?) => {
        $(
            impl Identified for $ty {
                fn key_field(&self, field: KeyField) -> Option<&str> {
                    match field {
                        KeyField::Contest => Some(&self.contest_key),
                        KeyField::Proposition => Some(&self.proposition_key),
                        $(KeyField::$name => Some(&self.$field),)*
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

proposition_identity! {
    PropositionChanged => {},
    OptionChanged => { option_key: Option },
    VariantChanged => { variant_key: Variant },
    OutcomeChanged => { option_key: Option, variant_key: Variant },
    OutcomeResultChanged => {},
    MarketPriceChanged => {},
}

/// Identity fields every proposition-scoped payload carries.
pub const PROPOSITION_IDENTITY: &[KeyField] = &[KeyField::Contest, KeyField::Proposition];

impl Normalize for PropositionChanged {
    const KIND: MessageKind = MessageKind::PropositionChanged;
    const IDENTITY: &'static [KeyField] = PROPOSITION_IDENTITY;
    type Patch = PropositionPatch;

    fn into_delta(self) -> Delta<PropositionPatch> {
        Delta::new(
            self.contest_key,
            self.proposition_key,
            PropositionPatch {
                name: self.name,
                kind: self.kind,
                is_available: self.is_available,
                timestamp: self.timestamp,
                options: collapse_keyed(self.options.unwrap_or_default(), option_key),
                variants: collapse_keyed(self.variants.unwrap_or_default(), variant_key),
                outcomes: collapse_keyed(self.outcomes.unwrap_or_default(), Outcome::outcome_key),
            },
        )
    }
}

impl Normalize for OptionChanged {
    const KIND: MessageKind = MessageKind::OptionChanged;
    const IDENTITY: &'static [KeyField] = &[KeyField::Contest, KeyField::Proposition, KeyField::Option];
    type Patch = OfferOption;

    fn into_delta(self) -> Delta<OfferOption> {
        Delta::new(
            self.contest_key,
            self.proposition_key,
            OfferOption {
                option_key: self.option_key,
                name: self.name,
                kind: self.kind,
                is_available: self.is_available,
            },
        )
    }
}

impl Normalize for VariantChanged {
    const KIND: MessageKind = MessageKind::VariantChanged;
    const IDENTITY: &'static [KeyField] = &[KeyField::Contest, KeyField::Proposition, KeyField::Variant];
    type Patch = Variant;

    fn into_delta(self) -> Delta<Variant> {
        Delta::new(
            self.contest_key,
            self.proposition_key,
            Variant {
                variant_key: self.variant_key,
                name: self.name,
                kind: self.kind,
                is_available: self.is_available,
            },
        )
    }
}

impl Normalize for OutcomeChanged {
    const KIND: MessageKind = MessageKind::OutcomeChanged;
    const IDENTITY: &'static [KeyField] = &[
        KeyField::Contest,
        KeyField::Proposition,
        KeyField::Option,
        KeyField::Variant,
    ];
    type Patch = Outcome;

    fn into_delta(self) -> Delta<Outcome> {
        Delta::new(
            self.contest_key,
            self.proposition_key,
            Outcome {
                option_key: self.option_key,
                variant_key: self.variant_key,
                is_available: self.is_available,
                resulted: self.resulted,
            },
        )
    }
}

impl Normalize for OutcomeResultChanged {
    const KIND: MessageKind = MessageKind::OutcomeResult;
    const IDENTITY: &'static [KeyField] = PROPOSITION_IDENTITY;
    type Patch = ResultPatch;

    fn into_delta(self) -> Delta<ResultPatch> {
        Delta::new(
            self.contest_key,
            self.proposition_key,
            ResultPatch {
                settlements: collapse_keyed(self.outcome_result.unwrap_or_default(), Settlement::outcome_key),
                timestamp: self.timestamp,
            },
        )
    }
}

impl Normalize for MarketPriceChanged {
    const KIND: MessageKind = MessageKind::MarketPriceChanged;
    const IDENTITY: &'static [KeyField] = PROPOSITION_IDENTITY;
    type Patch = MarketPatch;

    fn into_delta(self) -> Delta<MarketPatch> {
        Delta::new(
            self.contest_key,
            self.proposition_key,
            MarketPatch {
                is_available: None,
                prices: collapse_keyed(self.prices.unwrap_or_default(), Price::outcome_key),
                timestamp: self.timestamp,
            },
        )
    }
}

/// Decode a JSON payload and check that `identity` fields are non-empty.
pub fn decode<T>(kind: MessageKind, identity: &[KeyField], message: &RawMessage) -> Result<T, ReconcileError>
where
    T: DeserializeOwned + Identified,
{
    let payload: T = serde_json::from_slice(&message.value).map_err(|err| ReconcileError::Malformed {
        kind,
        offset: message.offset,
        reason: err.to_string(),
    })?;

    for field in identity {
        let reason = match payload.key_field(*field) {
            Some(value) if value.contains(KEY_SEPARATOR) => format!("{field:?} identity contains '{KEY_SEPARATOR}'"),
            Some(value) if !value.trim().is_empty() => continue,
            _ => format!("empty {field:?} identity"),
        };
        return Err(ReconcileError::Malformed {
            kind,
            offset: message.offset,
            reason,
        });
    }

    Ok(payload)
}

/// Decode a change message into its canonical delta.
pub fn normalize<T: Normalize>(message: &RawMessage) -> Result<Delta<T::Patch>, ReconcileError> {
    decode::<T>(T::KIND, T::IDENTITY, message).map(Normalize::into_delta)
}
