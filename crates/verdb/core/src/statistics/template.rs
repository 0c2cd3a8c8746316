// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Statistic templates
//!
//! A template carries everything about an index's statistic that depends
//! only on the schema: qualifier, column expressions, types and functional
//! dependencies. Templates are cached per (schema hash, index name) and
//! shared by every histogram built for that index until the schema changes.

use super::histogram::Statistic;
use super::lib::{StatsError, StatsResult};
use crate::catalog::{ColumnType, IndexDef, IndexKind, Schema};
use crate::storage::Hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifies the index a statistic describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatQualifier {
    pub database: String,
    pub table: String,
    pub index: String,
}

impl StatQualifier {
    pub fn new(database: impl Into<String>, table: impl Into<String>, index: impl Into<String>) -> Self {
        Self { database: database.into(), table: table.into(), index: index.into() }
    }
}

impl fmt::Display for StatQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.table, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexClass {
    #[default]
    Default,
    Spatial,
    FullText,
}

/// Set of 1-based column ordinals
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColSet(BTreeSet<u16>);

impl ColSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, col: u16) {
        self.0.insert(col);
    }

    pub fn contains(&self, col: u16) -> bool {
        self.0.contains(&col)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_subset(&self, other: &ColSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl FromIterator<u16> for ColSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Functional dependencies implied by an index over a table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionalDeps {
    /// All columns of the table
    pub all: ColSet,
    /// Columns declared NOT NULL
    pub not_null: ColSet,
    /// Index columns form a strict key (unique and non-null)
    pub strict_key: Option<ColSet>,
    /// Index columns form a key that admits NULLs
    pub lax_key: Option<ColSet>,
}

impl FunctionalDeps {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn has_strict_key(&self) -> bool {
        self.strict_key.is_some()
    }
}

/// Cache key for templates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateKey {
    pub schema_hash: Hash,
    pub index: String,
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.schema_hash.short())
    }
}

/// Lower-case a column expression and strip a leading `table.` qualifier
fn normalize_expression(table: &str, expr: &str) -> String {
    let lower = expr.to_lowercase();
    let prefix = format!("{}.", table.to_lowercase());
    lower.strip_prefix(&prefix).map(str::to_string).unwrap_or(lower)
}

/// Functional dependencies and index column set for `index` over `schema`
pub fn index_fds(table: &str, schema: &Schema, index: &IndexDef) -> StatsResult<(FunctionalDeps, ColSet)> {
    let all: ColSet = (1..=schema.columns().len() as u16).collect();
    let not_null: ColSet = schema.columns().iter().enumerate().filter(|(_, c)| !c.nullable).map(|(i, _)| i as u16 + 1).collect();

    let mut colset = ColSet::new();
    for name in &index.columns {
        let (i, _) = schema.column(&normalize_expression(table, name)).ok_or_else(|| StatsError::TemplateFailed(format!("{}: index {} references unknown column {}", table, index.name, name)))?;
        colset.add(i as u16 + 1);
    }

    let mut fds = FunctionalDeps { all, not_null, strict_key: None, lax_key: None };
    if index.unique {
        if colset.is_subset(&fds.not_null) {
            fds.strict_key = Some(colset.clone());
        } else {
            fds.lax_key = Some(colset.clone());
        }
    }
    Ok((fds, colset))
}

/// Build the schema-derived part of an index statistic
///
/// Column expressions are lower-cased with the `table.` prefix stripped,
/// which is the form index comparisons expect.
pub fn build_template(table: &str, schema: &Schema, index: &IndexDef) -> StatsResult<Statistic> {
    let (fds, colset) = index_fds(&table.to_lowercase(), schema, index)?;

    let class = match index.kind {
        IndexKind::Spatial => IndexClass::Spatial,
        IndexKind::FullText => IndexClass::FullText,
        _ => IndexClass::Default,
    };

    let columns: Vec<String> = index.columns.iter().map(|c| normalize_expression(table, c)).collect();
    let types: Vec<ColumnType> = columns.iter().filter_map(|c| schema.column(c)).map(|(_, col)| col.ty).collect();

    Ok(Statistic::template(StatQualifier::new("", table, index.name.clone()), columns, types, class, fds, colset))
}
