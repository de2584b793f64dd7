//! # Grouping Module
//!
//! Groups homogeneous change records by a composite identity and reduces
//! each group with one of three merge strategies. [`group_nested`] composes
//! the single-level grouping across an ordered list of key levels to build
//! a map that mirrors the contest → proposition → option hierarchy.

use crate::key::CompositeKey;
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

/// Field-by-field overlay of a later record onto an earlier one.
///
/// Fields present in `later` overwrite the receiver's, fields absent in
/// `later` are kept. Implementations must be idempotent: overlaying the same
/// record twice equals overlaying it once.
pub trait Merge {
    fn merge(&mut self, later: &Self);
}

impl<T: Clone> Merge for Option<T> {
    fn merge(&mut self, later: &Self) {
        if let Some(value) = later {
            *self = Some(value.clone());
        }
    }
}

/// How the records sharing a key are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Keep every record, in arrival order.
    #[default]
    Concat,
    /// Keep only the last record in arrival order.
    Latest,
    /// Left-fold every record with [`Merge::merge`].
    Merge,
}

/// Named identity components a record can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyField {
    Contest,
    Proposition,
    Option,
    Variant,
}

/// Records that expose their identity components by name.
pub trait Identified {
    fn key_field(&self, field: KeyField) -> Option<&str>;
}

/// Key extractor: a named field or a caller-supplied function.
pub enum KeyFn<T> {
    Field(KeyField),
    Custom(Arc<dyn Fn(&T) -> CompositeKey + Send + Sync>),
}

impl<T> KeyFn<T> {
    pub fn custom(f: impl Fn(&T) -> CompositeKey + Send + Sync + 'static) -> Self {
        KeyFn::Custom(Arc::new(f))
    }
}

impl<T: Identified> KeyFn<T> {
    pub fn key_of(&self, item: &T) -> CompositeKey {
        match self {
            KeyFn::Field(field) => CompositeKey::from(item.key_field(*field).unwrap_or_default()),
            KeyFn::Custom(f) => f(item),
        }
    }
}

impl<T> Clone for KeyFn<T> {
    fn clone(&self) -> Self {
        match self {
            KeyFn::Field(field) => KeyFn::Field(*field),
            KeyFn::Custom(f) => KeyFn::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for KeyFn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFn::Field(field) => write!(f, "Field({field:?})"),
            KeyFn::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Reduced value of one group.
#[derive(Debug, Clone, PartialEq)]
pub enum Grouped<T> {
    List(Vec<T>),
    Single(T),
}

/// Group `items` by `key` and reduce each group with `strategy`.
///
/// Keys with no records produce no entry.
pub fn group_by<T>(
    items: impl IntoIterator<Item = T>,
    key: &KeyFn<T>,
    strategy: MergeStrategy,
) -> HashMap<CompositeKey, Grouped<T>>
where
    T: Identified + Merge,
{
    match strategy {
        MergeStrategy::Concat => group_concat(items, key)
            .into_iter()
            .map(|(k, list)| (k, Grouped::List(list)))
            .collect(),
        MergeStrategy::Latest => group_latest(items, key)
            .into_iter()
            .map(|(k, item)| (k, Grouped::Single(item)))
            .collect(),
        MergeStrategy::Merge => group_merged(items, key)
            .into_iter()
            .map(|(k, item)| (k, Grouped::Single(item)))
            .collect(),
    }
}

/// Concat grouping with a typed result.
pub fn group_concat<T: Identified>(
    items: impl IntoIterator<Item = T>,
    key: &KeyFn<T>,
) -> HashMap<CompositeKey, Vec<T>> {
    let mut groups: HashMap<CompositeKey, Vec<T>> = HashMap::new();
    for item in items {
        groups.entry(key.key_of(&item)).or_default().push(item);
    }
    groups
}

/// Latest grouping with a typed result.
pub fn group_latest<T: Identified>(
    items: impl IntoIterator<Item = T>,
    key: &KeyFn<T>,
) -> HashMap<CompositeKey, T> {
    let mut groups = HashMap::new();
    for item in items {
        groups.insert(key.key_of(&item), item);
    }
    groups
}

/// Merge grouping with a typed result.
pub fn group_merged<T: Identified + Merge>(
    items: impl IntoIterator<Item = T>,
    key: &KeyFn<T>,
) -> HashMap<CompositeKey, T> {
    let mut groups: HashMap<CompositeKey, T> = HashMap::new();
    for item in items {
        groups
            .entry(key.key_of(&item))
            .and_modify(|existing| existing.merge(&item))
            .or_insert(item);
    }
    groups
}

/// One level of a nested grouping.
#[derive(Debug, Clone)]
pub struct GroupLevel<T> {
    pub key: KeyFn<T>,
    pub strategy: MergeStrategy,
}

impl<T> GroupLevel<T> {
    pub fn new(key: KeyFn<T>, strategy: MergeStrategy) -> Self {
        Self { key, strategy }
    }

    pub fn field(field: KeyField, strategy: MergeStrategy) -> Self {
        Self::new(KeyFn::Field(field), strategy)
    }

    /// Concat level, the default for every level but the last.
    pub fn concat(field: KeyField) -> Self {
        Self::field(field, MergeStrategy::Concat)
    }
}

/// Node of a nested grouping.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested<T> {
    Branch(HashMap<CompositeKey, Nested<T>>),
    List(Vec<T>),
    Leaf(T),
}

impl<T> Nested<T> {
    pub fn as_branch(&self) -> Option<&HashMap<CompositeKey, Nested<T>>> {
        match self {
            Nested::Branch(children) => Some(children),
            _ => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Nested::Leaf(item) => Some(item),
            _ => None,
        }
    }

    /// Every record under this node with the key path leading to it.
    pub fn flatten(self) -> Vec<(Vec<CompositeKey>, T)> {
        let mut out = Vec::new();
        flatten_into(self, &mut Vec::new(), &mut out);
        out
    }
}

fn flatten_into<T>(node: Nested<T>, path: &mut Vec<CompositeKey>, out: &mut Vec<(Vec<CompositeKey>, T)>) {
    match node {
        Nested::Leaf(item) => out.push((path.clone(), item)),
        Nested::List(items) => out.extend(items.into_iter().map(|item| (path.clone(), item))),
        Nested::Branch(children) => {
            for (key, child) in children {
                path.push(key);
                flatten_into(child, path, out);
                path.pop();
            }
        }
    }
}

/// Group `items` level by level.
///
/// A concat level with remaining levels recurses into each group's list;
/// otherwise the group's reduced value becomes the leaf. Levels apply in the
/// order given. An empty `levels` slice yields an empty map.
pub fn group_nested<T>(items: Vec<T>, levels: &[GroupLevel<T>]) -> HashMap<CompositeKey, Nested<T>>
where
    T: Identified + Merge,
{
    let Some((first, rest)) = levels.split_first() else {
        return HashMap::new();
    };

    group_by(items, &first.key, first.strategy)
        .into_iter()
        .map(|(key, grouped)| {
            let node = match grouped {
                Grouped::List(list) if !rest.is_empty() => Nested::Branch(group_nested(list, rest)),
                Grouped::List(list) => Nested::List(list),
                Grouped::Single(item) => Nested::Leaf(item),
            };
            (key, node)
        })
        .collect()
}
