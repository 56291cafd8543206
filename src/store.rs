//! Path-addressed hierarchical configuration store.
//!
//! Instrument settings form a tree addressed by `:`-separated paths such as
//! `ACQUIRE:NUMAVG`. Command grammars frequently give one path two roles at
//! once: a settable scalar and a namespace prefix for sub-parameters (a
//! measurement slot that has a type and independently settable details).
//! [`ConfigStore`] keeps both facts losslessly by modeling each node as a
//! tagged variant: a plain leaf, a branch, or a branch that also carries a
//! direct value.
//!
//! On disk a store is a single JSON object whose nesting mirrors the path
//! segmentation. A node that carries both a value and children serializes
//! its direct value under the reserved `"&"` key; that key never appears in
//! caller-visible paths.

use crate::error::{CacheError, Result};
use crate::value::ParamValue;
use log::warn;
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Path segment separator.
pub const SEPARATOR: char = ':';

/// Reserved JSON key holding the direct value of a valued subtree.
const VALUE_KEY: &str = "&";

/// One node of the configuration tree.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    /// A scalar with no children.
    Leaf(ParamValue),
    /// A pure namespace.
    Branch(BTreeMap<String, Node>),
    /// A namespace that also carries a direct value.
    Valued {
        value: ParamValue,
        children: BTreeMap<String, Node>,
    },
}

impl Node {
    /// Mutable child map, promoting a leaf to a valued subtree first so the
    /// existing scalar survives as the node's direct value.
    fn children_mut(&mut self) -> &mut BTreeMap<String, Node> {
        if let Node::Leaf(value) = self {
            let value = value.clone();
            *self = Node::Valued {
                value,
                children: BTreeMap::new(),
            };
        }
        match self {
            Node::Branch(children) | Node::Valued { children, .. } => children,
            // a leaf is promoted just above
            Node::Leaf(_) => unreachable!(),
        }
    }

    fn children(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Branch(children) | Node::Valued { children, .. } => Some(children),
            Node::Leaf(_) => None,
        }
    }

    fn direct_value(&self) -> Option<&ParamValue> {
        match self {
            Node::Leaf(value) | Node::Valued { value, .. } => Some(value),
            Node::Branch(_) => None,
        }
    }
}

/// Tree of instrument settings keyed by segmented path strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    root: BTreeMap<String, Node>,
}

impl ConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split(SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    /// Direct value at `path`.
    ///
    /// A path that lands on a pure branch (or on nothing) fails with
    /// [`CacheError::NotFound`]; a valued subtree answers with its direct
    /// value, its children untouched.
    pub fn get(&self, path: &str) -> Result<&ParamValue> {
        let segments = Self::segments(path);
        let mut map = &self.root;
        let mut walked = segments.iter().peekable();
        while let Some(segment) = walked.next() {
            let node = map
                .get(*segment)
                .ok_or_else(|| CacheError::NotFound(path.to_string()))?;
            if walked.peek().is_none() {
                return node
                    .direct_value()
                    .ok_or_else(|| CacheError::NotFound(path.to_string()));
            }
            map = node
                .children()
                .ok_or_else(|| CacheError::NotFound(path.to_string()))?;
        }
        Err(CacheError::NotFound(path.to_string()))
    }

    /// Whether a direct value exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Store `value` at `path`, creating intermediate nodes as needed.
    ///
    /// Collisions never lose data: a leaf encountered mid-path is promoted
    /// to a valued subtree, and setting onto an existing subtree stores the
    /// scalar as the subtree's direct value.
    pub fn set(&mut self, path: &str, value: impl Into<ParamValue>) {
        let segments = Self::segments(path);
        let Some((last, groups)) = segments.split_last() else {
            return;
        };
        let value = value.into();
        let mut map = &mut self.root;
        for segment in groups {
            let node = map
                .entry((*segment).to_string())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            map = node.children_mut();
        }
        match map.entry((*last).to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Node::Leaf(value));
            }
            Entry::Occupied(slot) => {
                let node = slot.into_mut();
                match node {
                    Node::Leaf(current) | Node::Valued { value: current, .. } => *current = value,
                    Node::Branch(children) => {
                        let children = std::mem::take(children);
                        *node = Node::Valued { value, children };
                    }
                }
            }
        }
    }

    /// Sequentially apply a list of path/value pairs.
    pub fn set_list<P, V>(&mut self, pairs: impl IntoIterator<Item = (P, V)>)
    where
        P: AsRef<str>,
        V: Into<ParamValue>,
    {
        for (path, value) in pairs {
            self.set(path.as_ref(), value);
        }
    }

    /// Depth-first walk emitting one `(path, value)` pair per direct value.
    ///
    /// A valued subtree emits its own path before its children. Child order
    /// is sorted, so the output is deterministic for a given content. An
    /// empty `subgroup` walks the whole store; a `subgroup` that does not
    /// exist yields an empty sequence.
    pub fn flatten(&self, subgroup: &str) -> Vec<(String, ParamValue)> {
        let mut pairs = Vec::new();
        let segments = Self::segments(subgroup);
        if segments.is_empty() {
            walk_map(&self.root, "", &mut pairs);
            return pairs;
        }
        let mut map = &self.root;
        let mut walked = segments.iter().peekable();
        while let Some(segment) = walked.next() {
            let Some(node) = map.get(*segment) else {
                return pairs;
            };
            if walked.peek().is_none() {
                walk_node(node, &segments.join(":"), &mut pairs);
                return pairs;
            }
            let Some(children) = node.children() else {
                return pairs;
            };
            map = children;
        }
        pairs
    }

    /// Copy all direct values under `subgroup` from `source` into `self`,
    /// applying the same collision rules as [`ConfigStore::set`].
    pub fn merge(&mut self, source: &ConfigStore, subgroup: &str) {
        for (path, value) in source.flatten(subgroup) {
            self.set(&path, value);
        }
    }

    /// Build a store from a `;`-delimited bulk settings reply.
    ///
    /// Each segment is either a full `:GROUP:LEAF value` pair or a bare
    /// `LEAF value` inheriting the group prefix of the most recent full
    /// segment, which is how instruments echo back "all settings" queries.
    /// The result is equivalent to issuing every parsed pair through
    /// [`ConfigStore::set`].
    pub fn from_bulk_response(text: &str) -> Self {
        let mut store = Self::new();
        let mut prefix = String::new();
        for segment in text.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (word, value) = match segment.split_once(' ') {
                Some((word, value)) => (word, value.trim()),
                None => (segment, ""),
            };
            let path = if word.starts_with(SEPARATOR) {
                let full = word.trim_matches(SEPARATOR).to_string();
                prefix = match full.rsplit_once(SEPARATOR) {
                    Some((groups, _)) => groups.to_string(),
                    None => String::new(),
                };
                full
            } else if prefix.is_empty() {
                word.to_string()
            } else {
                format!("{prefix}{SEPARATOR}{word}")
            };
            store.set(&path, ParamValue::parse(value));
        }
        store
    }

    /// Serialize `subgroup` of this store to a JSON file.
    ///
    /// When `overwrite` is false and the file exists, its current contents
    /// are loaded first and this store's `subgroup` is merged into them
    /// before writing, so unrelated settings in the file survive.
    pub fn save(&self, file: &Path, subgroup: &str, overwrite: bool) -> Result<()> {
        let mut base = if !overwrite && file.exists() {
            Self::from_file(file, "")?
        } else {
            Self::new()
        };
        base.merge(self, subgroup);
        if let Some(parent) = file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let handle = fs::File::create(file)?;
        serde_json::to_writer_pretty(handle, &base.to_json())?;
        Ok(())
    }

    /// Load a store from a JSON file, extracting only `subgroup`.
    pub fn from_file(file: &Path, subgroup: &str) -> Result<Self> {
        let text = fs::read_to_string(file)?;
        let value: Value = serde_json::from_str(&text)?;
        let full = Self::from_json(&value);
        if Self::segments(subgroup).is_empty() {
            return Ok(full);
        }
        let mut extracted = Self::new();
        extracted.merge(&full, subgroup);
        Ok(extracted)
    }

    /// JSON rendering of the whole tree.
    pub fn to_json(&self) -> Value {
        Value::Object(map_to_json(&self.root))
    }

    /// Build a store from a JSON object.
    ///
    /// Non-object roots and unrepresentable entries are skipped with a
    /// warning rather than failing the whole load.
    pub fn from_json(value: &Value) -> Self {
        let mut store = Self::new();
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    insert_json(&mut store, key, child);
                }
            }
            other => warn!("ignoring non-object configuration root: {other}"),
        }
        store
    }
}

fn walk_node(node: &Node, path: &str, pairs: &mut Vec<(String, ParamValue)>) {
    if let Some(value) = node.direct_value() {
        pairs.push((path.to_string(), value.clone()));
    }
    if let Some(children) = node.children() {
        walk_map(children, path, pairs);
    }
}

fn walk_map(map: &BTreeMap<String, Node>, prefix: &str, pairs: &mut Vec<(String, ParamValue)>) {
    for (key, node) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{SEPARATOR}{key}")
        };
        walk_node(node, &path, pairs);
    }
}

fn value_to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::Int(int) => Value::from(*int),
        ParamValue::Float(float) => {
            serde_json::Number::from_f64(*float).map_or_else(|| Value::from(float.to_string()), Value::Number)
        }
        ParamValue::Str(text) => Value::from(text.clone()),
    }
}

fn map_to_json(map: &BTreeMap<String, Node>) -> Map<String, Value> {
    let mut object = Map::new();
    for (key, node) in map {
        let rendered = match node {
            Node::Leaf(value) => value_to_json(value),
            Node::Branch(children) => Value::Object(map_to_json(children)),
            Node::Valued { value, children } => {
                let mut rendered_children = map_to_json(children);
                rendered_children.insert(VALUE_KEY.to_string(), value_to_json(value));
                Value::Object(rendered_children)
            }
        };
        object.insert(key.clone(), rendered);
    }
    object
}

fn json_to_value(value: &Value) -> Option<ParamValue> {
    match value {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(ParamValue::Int(int))
            } else {
                number.as_f64().map(ParamValue::Float)
            }
        }
        Value::String(text) => Some(ParamValue::parse(text)),
        Value::Bool(flag) => Some(ParamValue::Str(flag.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn insert_json(store: &mut ConfigStore, path: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == VALUE_KEY {
                    if let Some(parsed) = json_to_value(child) {
                        store.set(path, parsed);
                    }
                } else {
                    insert_json(store, &format!("{path}{SEPARATOR}{key}"), child);
                }
            }
        }
        other => match json_to_value(other) {
            Some(parsed) => store.set(path, parsed),
            None => warn!("ignoring unrepresentable configuration entry at '{path}'"),
        },
    }
}

impl fmt::Display for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.to_json()).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}
