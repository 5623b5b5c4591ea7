//! Immutable merged settings snapshot.

use crate::error::{ConfigError, Result};
use config::{Value, ValueKind};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};

/// The merged view of every configuration layer at one point in time.
///
/// Values are kept as a flat map of dotted key paths (`registry.host`), so a
/// higher layer only replaces the leaves it actually defines. A snapshot is
/// never mutated after construction; reloads publish a new one.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    values: BTreeMap<String, Value>,
    config: config::Config,
    contributors: Vec<String>,
    skipped: Vec<String>,
}

impl ResolvedSettings {
    /// An empty snapshot.
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
            config: config::Config::default(),
            contributors: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn from_layers(
        values: BTreeMap<String, Value>,
        contributors: Vec<String>,
        skipped: Vec<String>,
    ) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(LeafTree::from_leaves(&values))
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to build configuration: {}", e)))?;

        Ok(Self {
            values,
            config,
            contributors,
            skipped,
        })
    }

    /// Map the whole key space onto `T`. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindError`] when a required field is missing or
    /// has the wrong type.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        self.config
            .clone()
            .try_deserialize::<T>()
            .map_err(|e| ConfigError::BindError(e.to_string()))
    }

    /// Map one section (e.g. `registry`) onto `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindError`] when the section is absent or does not fit `T`.
    pub fn bind_section<T: DeserializeOwned>(&self, section: &str) -> Result<T> {
        self.config
            .get::<T>(section)
            .map_err(|e| ConfigError::BindError(format!("section '{}': {}", section, e)))
    }

    /// Read one value by dotted key path.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.config
            .get::<T>(key)
            .map_err(|e| ConfigError::BindError(format!("key '{}': {}", key, e)))
    }

    /// Whether `key` is set, either as a leaf or as a section with leaves.
    pub fn contains(&self, key: &str) -> bool {
        if self.values.contains_key(key) {
            return true;
        }
        let prefix = format!("{}.", key);
        self.values
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    /// Leaf key paths in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of leaf values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of the sources that contributed, lowest precedence first.
    pub fn contributors(&self) -> &[String] {
        &self.contributors
    }

    /// Names of optional sources that failed and contributed nothing fresh.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Leaf keys whose value differs between `self` and `other`, including
    /// keys present on one side only.
    pub fn changed_keys(&self, other: &ResolvedSettings) -> Vec<String> {
        let mut changed: Vec<String> = self
            .values
            .iter()
            .filter(|(key, value)| {
                other
                    .values
                    .get(*key)
                    .is_none_or(|theirs| !same_value(value, theirs))
            })
            .map(|(key, _)| key.clone())
            .collect();

        changed.extend(
            other
                .values
                .keys()
                .filter(|key| !self.values.contains_key(*key))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

impl PartialEq for ResolvedSettings {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len() && self.changed_keys(other).is_empty()
    }
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self::empty()
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (&a.kind, &b.kind) {
        (ValueKind::Array(xs), ValueKind::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (ValueKind::Table(xs), ValueKind::Table(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| same_value(x, y)))
        }
        (x, y) => x == y,
    }
}

/// The merged leaves re-nested into one table.
///
/// Segments are split on `.` only and inserted as plain table keys, so nested
/// payload keys holding `/`, `:`, spaces or brackets never go through path
/// parsing. `config` still parses top-level keys, falling back to a plain
/// identifier when one is not a valid path.
#[derive(Debug, Clone)]
struct LeafTree(HashMap<String, Value>);

impl LeafTree {
    fn from_leaves(values: &BTreeMap<String, Value>) -> Self {
        let mut root = HashMap::new();
        for (path, value) in values {
            insert_leaf(&mut root, path, value.clone());
        }
        Self(root)
    }
}

fn insert_leaf(table: &mut HashMap<String, Value>, path: &str, value: Value) {
    let Some((head, rest)) = path.split_once('.') else {
        table.insert(path.to_string(), value);
        return;
    };

    let entry = table
        .entry(head.to_string())
        .or_insert_with(|| Value::new(None, ValueKind::Table(HashMap::new())));
    if !matches!(entry.kind, ValueKind::Table(_)) {
        entry.kind = ValueKind::Table(HashMap::new());
    }
    if let ValueKind::Table(child) = &mut entry.kind {
        insert_leaf(child, rest, value);
    }
}

impl config::Source for LeafTree {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<HashMap<String, Value>, config::ConfigError> {
        Ok(self.0.clone())
    }

    fn collect_to(&self, cache: &mut Value) -> std::result::Result<(), config::ConfigError> {
        if !matches!(cache.kind, ValueKind::Table(_)) {
            cache.kind = ValueKind::Table(HashMap::new());
        }
        if let ValueKind::Table(table) = &mut cache.kind {
            table.extend(self.0.clone());
        }
        Ok(())
    }
}

/// Overlay one layer's payload onto the accumulated flat map.
///
/// Tables are descended into so that only leaves are replaced. Setting a leaf
/// drops anything the lower layers had nested below it, and setting a nested
/// key drops a lower-layer scalar at any of its ancestors.
pub(crate) fn overlay<I>(target: &mut BTreeMap<String, Value>, prefix: &str, layer: I)
where
    I: IntoIterator<Item = (String, Value)>,
{
    for (key, value) in layer {
        let path = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };

        match value.kind {
            ValueKind::Table(table) if !table.is_empty() => overlay(target, &path, table),
            kind => set_leaf(target, path, Value::new(None, kind)),
        }
    }
}

fn set_leaf(target: &mut BTreeMap<String, Value>, path: String, value: Value) {
    let mut end = 0;
    while let Some(offset) = path[end..].find('.') {
        end += offset;
        target.remove(&path[..end]);
        end += 1;
    }

    let below = format!("{}.", path);
    let nested: Vec<String> = target
        .range(below.clone()..)
        .take_while(|(k, _)| k.starts_with(&below))
        .map(|(k, _)| k.clone())
        .collect();
    for key in nested {
        target.remove(&key);
    }

    target.insert(path, value);
}
