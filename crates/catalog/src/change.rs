//! Field-level change detection with an explicit overwrite policy.
//!
//! Supplier feeds are often sparser than the locally curated data, so the
//! default policy never lets a blank feed cell erase a value.

use serde::{Deserialize, Serialize};

use supplysync_core::DomainResult;

use crate::candidate::Candidates;
use crate::field::{FieldValue, ItemField, descriptor};
use crate::item::SupplyItem;

/// How a candidate value may replace the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Skip blank candidates and equal values, otherwise overwrite.
    OverwriteIfDifferent,
    /// Write only while the current value is blank; never touch it afterwards.
    PopulateIfEmpty,
}

impl FieldPolicy {
    /// Whether `candidate` should replace `current` under this policy.
    pub fn accepts(&self, current: &FieldValue, candidate: &FieldValue) -> bool {
        if candidate.is_blank() || candidate == current {
            return false;
        }
        match self {
            FieldPolicy::OverwriteIfDifferent => true,
            FieldPolicy::PopulateIfEmpty => current.is_blank(),
        }
    }
}

/// One checked field and its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: ItemField,
    pub policy: FieldPolicy,
}

impl FieldRule {
    pub fn new(field: ItemField, policy: FieldPolicy) -> Self {
        Self { field, policy }
    }
}

/// A staged `(field, old, new)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: ItemField,
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Field-level differences for one item in one run. Empty means "no write".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Changeset {
    changes: Vec<FieldChange>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: ItemField) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Write every staged value into `item`.
    pub fn apply_to(&self, item: &mut SupplyItem) -> DomainResult<()> {
        for change in &self.changes {
            (descriptor(change.field).set)(item, change.new.clone())?;
        }
        Ok(())
    }
}

impl core::fmt::Display for Changeset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, c) in self.changes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?} -> {:?}", c.field, c.old.to_string(), c.new.to_string())?;
        }
        Ok(())
    }
}

/// Compares candidates against an item's current values, rule by rule.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector<'a> {
    rules: &'a [FieldRule],
}

impl<'a> ChangeDetector<'a> {
    pub fn new(rules: &'a [FieldRule]) -> Self {
        Self { rules }
    }

    /// Compute the changeset without touching the item.
    ///
    /// Fields without a candidate are skipped; fields not covered by a rule are
    /// never compared.
    pub fn detect(&self, item: &SupplyItem, candidates: &Candidates) -> Changeset {
        let mut changes = Vec::new();
        for rule in self.rules {
            let Some(candidate) = candidates.get(rule.field) else {
                continue;
            };
            let current = (descriptor(rule.field).get)(item);
            if rule.policy.accepts(&current, candidate) {
                changes.push(FieldChange {
                    field: rule.field,
                    old: current,
                    new: candidate.clone(),
                });
            }
        }
        Changeset { changes }
    }
}
