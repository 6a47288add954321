//! Structured filter expressions
//!
//! A `FilterExpr` is a conjunction of OR-groups of field = value predicates,
//! matching the upstream index's own filter combination semantics. Filters
//! are built structurally and serialized to the wire format only at the
//! index boundary, so malformed or injectable filter strings cannot occur.

use serde::Serialize;

/// A single field = value equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Conjunction (AND) of disjunctions (OR) of equality predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpr {
    groups: Vec<Vec<Predicate>>,
}

impl FilterExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one OR-group. Empty groups are dropped.
    pub fn and_group(mut self, group: Vec<Predicate>) -> Self {
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    /// Add a single-predicate group (plain AND condition).
    pub fn and(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.and_group(vec![Predicate::new(field, value)])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Vec<Predicate>] {
        &self.groups
    }

    /// Serialize to the index's facet-filter wire format: a list of
    /// OR-groups, each predicate rendered as `field:value`.
    pub fn to_wire(&self) -> Vec<Vec<String>> {
        self.groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|p| format!("{}:{}", p.field, p.value))
                    .collect()
            })
            .collect()
    }

    /// Whether a field -> values view of a document satisfies the
    /// expression: every group must have at least one matching predicate.
    /// Multi-valued fields match on any of their values.
    pub fn matches<F>(&self, field_values: F) -> bool
    where
        F: Fn(&str) -> Vec<String>,
    {
        self.groups.iter().all(|group| {
            group
                .iter()
                .any(|p| field_values(&p.field).iter().any(|v| v == &p.value))
        })
    }
}

impl Serialize for FilterExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}
