//! Ontology model
//!
//! The shape the UI submits and the store hands back. Ids are assigned by the
//! store from each entity's position, so ids on incoming entities are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete ontology: top-level classes with their subclasses, plus rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default)]
    pub superclasses: Vec<Superclass>,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Top-level class. Owns zero or more subclasses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Superclass {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Value>,
    #[serde(default)]
    pub relationships: Vec<Value>,
    #[serde(default)]
    pub subclasses: Vec<Subclass>,
}

/// Class nested under a superclass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subclass {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Value>,
    #[serde(default)]
    pub relationships: Vec<Value>,
}

impl Ontology {
    /// Number of subclasses across all superclasses
    pub fn subclass_count(&self) -> usize {
        self.superclasses.iter().map(|s| s.subclasses.len()).sum()
    }
}

/// Row id of the superclass at `index`
pub fn superclass_id(index: usize) -> String {
    format!("sc-{}", index)
}

/// Row id of subclass `sub_index` under the superclass at `index`
pub fn subclass_id(index: usize, sub_index: usize) -> String {
    format!("sub-{}-{}", index, sub_index)
}

/// Row id of the rule at `index`
pub fn rule_id(index: usize) -> String {
    format!("rule-{}", index)
}

/// Outcome of a successful replace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSummary {
    pub superclasses: usize,
    pub subclasses: usize,
    pub rules: usize,
    pub replaced_at: DateTime<Utc>,
}

/// Row counts of the ontology tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyCounts {
    pub superclasses: i64,
    pub subclasses: i64,
    pub rules: i64,
}
