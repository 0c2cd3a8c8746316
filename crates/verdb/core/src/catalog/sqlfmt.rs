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

//! DDL generation for schema changes

use super::delta::TableDelta;
use super::lib::CatalogResult;
use super::schema::{Column, IndexDef, IndexKind, Schema};

fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn column_def(col: &Column) -> String {
    let mut def = format!("{} {}", quote(&col.name), col.ty);
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    def
}

fn index_def(idx: &IndexDef) -> String {
    let kind = match idx.kind {
        IndexKind::Btree if idx.unique => "UNIQUE KEY ",
        IndexKind::Btree => "KEY ",
        IndexKind::Spatial => "SPATIAL KEY ",
        IndexKind::FullText => "FULLTEXT KEY ",
        IndexKind::Vector => "VECTOR KEY ",
    };
    let cols: Vec<String> = idx.columns.iter().map(|c| quote(c)).collect();
    format!("{}{} ({})", kind, quote(&idx.name), cols.join(","))
}

/// `CREATE TABLE` statement for `schema`
pub fn create_table_statement(name: &str, schema: &Schema) -> String {
    let mut lines: Vec<String> = schema.columns().iter().map(|c| format!("  {}", column_def(c))).collect();
    let pk: Vec<String> = schema.columns().iter().filter(|c| c.primary_key).map(|c| quote(&c.name)).collect();
    if !pk.is_empty() {
        lines.push(format!("  PRIMARY KEY ({})", pk.join(",")));
    }
    for idx in schema.indexes() {
        lines.push(format!("  {}", index_def(idx)));
    }
    format!("CREATE TABLE {} (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_0900_bin;", quote(name), lines.join(",\n"))
}

/// Statements that turn the old table of `delta` into the new one
///
/// Covers create, drop, rename, column add/drop/modify, primary key changes
/// and index add/drop. Pure data changes produce no statements.
pub fn schema_patch_statements(delta: &TableDelta) -> CatalogResult<Vec<String>> {
    let name = &delta.current_name()?.name;
    if delta.is_drop() {
        return Ok(vec![format!("DROP TABLE {};", quote(name))]);
    }
    let (Some(from), Some(to)) = (delta.from_schema(), delta.to_schema()) else {
        return Ok(delta.to_schema().map(|s| vec![create_table_statement(name, s)]).unwrap_or_default());
    };

    let mut stmts = Vec::new();
    if delta.is_rename() {
        if let Some(old) = &delta.from_name {
            stmts.push(format!("RENAME TABLE {} TO {};", quote(&old.name), quote(name)));
        }
    }
    if !delta.has_schema_changed()? {
        return Ok(stmts);
    }

    let table = quote(name);
    for col in from.columns() {
        if to.column(&col.name).is_none() {
            stmts.push(format!("ALTER TABLE {} DROP COLUMN {};", table, quote(&col.name)));
        }
    }
    for col in to.columns() {
        match from.column(&col.name) {
            None => stmts.push(format!("ALTER TABLE {} ADD COLUMN {};", table, column_def(col))),
            Some((_, old)) if old.ty != col.ty || old.nullable != col.nullable => {
                stmts.push(format!("ALTER TABLE {} MODIFY COLUMN {};", table, column_def(col)));
            }
            Some(_) => {}
        }
    }

    let old_pk: Vec<&str> = from.columns().iter().filter(|c| c.primary_key).map(|c| c.name.as_str()).collect();
    let new_pk: Vec<&str> = to.columns().iter().filter(|c| c.primary_key).map(|c| c.name.as_str()).collect();
    if old_pk != new_pk {
        if !old_pk.is_empty() {
            stmts.push(format!("ALTER TABLE {} DROP PRIMARY KEY;", table));
        }
        if !new_pk.is_empty() {
            let cols: Vec<String> = new_pk.iter().map(|c| quote(c)).collect();
            stmts.push(format!("ALTER TABLE {} ADD PRIMARY KEY ({});", table, cols.join(",")));
        }
    }

    for idx in from.indexes() {
        if !to.indexes().contains(idx) {
            stmts.push(format!("ALTER TABLE {} DROP INDEX {};", table, quote(&idx.name)));
        }
    }
    for idx in to.indexes() {
        if !from.indexes().contains(idx) {
            stmts.push(format!("ALTER TABLE {} ADD {};", table, index_def(idx)));
        }
    }
    Ok(stmts)
}
