//! OSCQuery namespace nodes as the runner serves them.
//!
//! A node is a container (`CONTENTS`), a value leaf (`TYPE` + `VALUE`), or
//! both. Single values arrive bare, lists as JSON arrays.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// One `RANGE` entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RangeSpec {
    /// Lower bound.
    #[serde(rename = "MIN", default)]
    pub min: Option<f64>,
    /// Upper bound.
    #[serde(rename = "MAX", default)]
    pub max: Option<f64>,
    /// Allowed values.
    #[serde(rename = "VALS", default)]
    pub vals: Option<Vec<Value>>,
}

/// A node of the OSCQuery address tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NamespaceNode {
    /// Absolute address.
    #[serde(rename = "FULL_PATH", default)]
    pub full_path: String,
    /// Children by segment name.
    #[serde(rename = "CONTENTS", default)]
    pub contents: BTreeMap<String, NamespaceNode>,
    /// OSC type tags of the value.
    #[serde(rename = "TYPE", default)]
    pub type_tags: Option<String>,
    /// Current value. A published `null` is `Some(Value::Null)`.
    #[serde(rename = "VALUE", default, deserialize_with = "present")]
    pub value: Option<Value>,
    /// Ranges, one per value.
    #[serde(rename = "RANGE", default, deserialize_with = "lenient_range")]
    pub range: Vec<RangeSpec>,
    /// Human-readable description.
    #[serde(rename = "DESCRIPTION", default)]
    pub description: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// Some leaves publish RANGE entries as `null` or as a bare object.
fn lenient_range<'de, D>(deserializer: D) -> Result<Vec<RangeSpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(_) => vec![raw],
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

impl NamespaceNode {
    /// Parse a node from the text channel.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Direct child by segment name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&NamespaceNode> {
        self.contents.get(name)
    }

    /// Descendant by `/`-separated relative path.
    #[must_use]
    pub fn descend(&self, relative: &str) -> Option<&NamespaceNode> {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Whether the node is a value leaf.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The value, unwrapping a one-element list.
    #[must_use]
    pub fn scalar(&self) -> Option<&Value> {
        match self.value.as_ref()? {
            Value::Array(items) => items.first(),
            other => Some(other),
        }
    }

    /// Value as a number.
    #[must_use]
    pub fn value_f64(&self) -> Option<f64> {
        self.scalar().and_then(Value::as_f64)
    }

    /// Value as a string.
    #[must_use]
    pub fn value_str(&self) -> Option<&str> {
        self.scalar().and_then(Value::as_str)
    }

    /// Value as a boolean. `T`/`F` leaves carry the flag in the type tag.
    #[must_use]
    pub fn value_bool(&self) -> Option<bool> {
        match self.type_tags.as_deref() {
            Some("T") => return Some(true),
            Some("F") => return Some(false),
            _ => {}
        }
        match self.scalar()? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            _ => None,
        }
    }

    /// List value as strings. Non-string entries are skipped.
    #[must_use]
    pub fn value_strings(&self) -> Vec<String> {
        match &self.value {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// List value as numbers. Non-numeric entries are skipped.
    #[must_use]
    pub fn value_numbers(&self) -> Vec<f64> {
        match &self.value {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_f64).collect(),
            Some(Value::Number(n)) => n.as_f64().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// First range's bounds.
    #[must_use]
    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        self.range.first().map_or((None, None), |r| (r.min, r.max))
    }

    /// First range's allowed values, rendered as strings.
    #[must_use]
    pub fn range_values(&self) -> Vec<String> {
        self.range
            .first()
            .and_then(|r| r.vals.as_ref())
            .map(|vals| {
                vals.iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Walk value leaves depth-first, yielding each with its path relative to
    /// this node (`poly/1/gain`). A leaf's own children are not visited.
    pub fn value_leaves(&self) -> Vec<(String, &NamespaceNode)> {
        let mut out = Vec::new();
        for (name, child) in &self.contents {
            collect_leaves(child, name.clone(), &mut out);
        }
        out
    }
}

fn collect_leaves<'a>(node: &'a NamespaceNode, prefix: String, out: &mut Vec<(String, &'a NamespaceNode)>) {
    if node.has_value() {
        out.push((prefix, node));
        return;
    }
    for (name, child) in &node.contents {
        collect_leaves(child, format!("{prefix}/{name}"), out);
    }
}
