//! Feed line parser: one raw delimited line -> named raw cells.
//!
//! Purely lexical. No trimming, coercion or validation happens here; that is
//! the candidate builder's job.

use std::collections::BTreeMap;

use crate::profile::{FeedField, SupplierProfile};

/// Raw cells of one feed line, keyed by semantic field.
///
/// A field is absent when the profile does not map it or the line is too short
/// to reach its column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedRow {
    cells: BTreeMap<FeedField, String>,
}

impl FeedRow {
    pub fn get(&self, field: FeedField) -> Option<&str> {
        self.cells.get(&field).map(String::as_str)
    }

    /// The reconciliation key, if present and not blank.
    pub fn key(&self) -> Option<&str> {
        self.get(FeedField::SupplierProductCode)
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Split `line` on the profile separator and pick the mapped columns.
pub fn parse_line(line: &str, profile: &SupplierProfile) -> FeedRow {
    let line = line.trim_end_matches(['\r', '\n']);
    let columns: Vec<&str> = line.split(profile.separator).collect();

    let cells = profile
        .columns
        .iter()
        .filter_map(|(field, column)| {
            let value = columns.get(column?)?;
            Some((field, (*value).to_string()))
        })
        .collect();

    FeedRow { cells }
}
