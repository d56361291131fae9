//! Table shapes and the DDL that evolves them

use std::collections::HashSet;

/// PostgreSQL limit on bind parameters in one statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL truncates identifiers longer than this many bytes
pub const MAX_IDENT_BYTES: usize = 63;

/// SQL type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    Text,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Numeric => "NUMERIC(15,2)",
            ColumnType::Text => "TEXT",
        }
    }

    /// Map an `information_schema.columns.data_type` value
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "numeric" | "decimal" | "integer" | "bigint" | "smallint" | "real"
            | "double precision" => ColumnType::Numeric,
            _ => ColumnType::Text,
        }
    }
}

/// Columns of a destination table, in ordinal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub exists: bool,
    pub columns: Vec<(String, ColumnType)>,
}

impl TableSchema {
    pub fn missing(table: &str) -> Self {
        Self {
            table: table.to_string(),
            exists: false,
            columns: Vec::new(),
        }
    }

    /// Schema for a fresh table: allow-listed columns are numeric
    pub fn for_batch(table: &str, columns: &[String], numeric_columns: &HashSet<String>) -> Self {
        Self {
            table: table.to_string(),
            exists: false,
            columns: columns
                .iter()
                .map(|name| {
                    let ty = if numeric_columns.contains(name) {
                        ColumnType::Numeric
                    } else {
                        ColumnType::Text
                    };
                    (name.clone(), ty)
                })
                .collect(),
        }
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, ty)| *ty)
    }

    /// Incoming columns the table does not have yet, in incoming order
    pub fn missing_columns<'a>(&self, incoming: &'a [String]) -> Vec<&'a String> {
        incoming
            .iter()
            .filter(|name| self.column_type(name).is_none())
            .collect()
    }

    pub fn add_column(&mut self, name: &str, ty: ColumnType) {
        if self.column_type(name).is_none() {
            self.columns.push((name.to_string(), ty));
        }
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table),
            columns.join(", ")
        )
    }
}

/// Cut an identifier to PostgreSQL's length limit on a char boundary
pub fn truncate_ident(name: &str) -> String {
    if name.len() <= MAX_IDENT_BYTES {
        return name.to_string();
    }
    let mut end = MAX_IDENT_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", truncate_ident(name).replace('"', "\"\""))
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

/// New columns always arrive as text
pub fn add_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(column),
        ColumnType::Text.sql()
    )
}

/// `INSERT INTO "t" ("a", "b") ` ready for `push_values`
pub fn insert_prefix(table: &str, columns: &[String]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "INSERT INTO {} ({}) ",
        quote_ident(table),
        columns.join(", ")
    )
}

/// Rows per INSERT, bounded by the chunk size and the bind limit
pub fn rows_per_statement(chunk_size: usize, column_count: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / column_count.max(1);
    chunk_size.min(by_params).max(1)
}
