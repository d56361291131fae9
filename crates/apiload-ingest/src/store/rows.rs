//! Turning API records into flat rows

use serde_json::{Map, Value};
use sqlx::types::BigDecimal;
use std::collections::HashSet;
use std::str::FromStr;

use super::schema::truncate_ident;

/// Flat rows for one batch plus the union of their columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedBatch {
    /// Column names in order of first appearance
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl PreparedBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }
}

/// Flatten every record of a batch and collect the column set
pub fn prepare_batch(records: &[Value]) -> PreparedBatch {
    let mut seen = HashSet::new();
    let mut batch = PreparedBatch::default();

    for record in records {
        for row in flatten_record(record) {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    batch.columns.push(key.clone());
                }
            }
            batch.rows.push(row);
        }
    }
    batch
}

/// Rows produced by one record
///
/// When a field holds a list of objects, each object becomes a row and the
/// record's other fields are copied into it. Keys from the list item win over
/// copied fields. Arrays of records are flattened element by element.
pub fn flatten_record(record: &Value) -> Vec<Map<String, Value>> {
    let object = match record {
        Value::Object(object) => object,
        Value::Array(items) => return items.iter().flat_map(flatten_record).collect(),
        _ => return Vec::new(),
    };

    let Some((list_key, items)) = object.iter().find_map(|(key, value)| {
        record_list(value).map(|items| (key.as_str(), items))
    }) else {
        let mut row = Map::new();
        normalize(object, "", &mut row);
        return vec![row];
    };

    let mut hoisted = Map::new();
    for (key, value) in object {
        if key != list_key {
            normalize_value(key, value, &mut hoisted);
        }
    }

    items
        .iter()
        .map(|item| {
            let mut row = Map::new();
            normalize(item, "", &mut row);
            for (key, value) in &hoisted {
                if !row.contains_key(key) {
                    row.insert(key.clone(), value.clone());
                }
            }
            row
        })
        .collect()
}

/// A non-empty array whose elements are all objects
fn record_list(value: &Value) -> Option<Vec<&Map<String, Value>>> {
    let Value::Array(items) = value else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    items.iter().map(Value::as_object).collect()
}

/// Nested objects become dotted column names
fn normalize(object: &Map<String, Value>, prefix: &str, out: &mut Map<String, Value>) {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        normalize_value(&name, value, out);
    }
}

fn normalize_value(name: &str, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Object(nested) if !nested.is_empty() => normalize(nested, name, out),
        other => {
            out.insert(truncate_ident(name), other.clone());
        },
    }
}

/// Text form of a cell; strings as-is, other non-null values as JSON text
pub fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric form of a cell
///
/// Missing, null and empty-string values become 0. Parsed values are rounded
/// to two decimal places; anything that does not parse, or does not fit in
/// NUMERIC(15,2) after rounding, becomes NULL.
pub fn coerce_numeric(value: Option<&Value>) -> Option<BigDecimal> {
    let parsed = match value {
        None | Some(Value::Null) => return Some(BigDecimal::from(0)),
        Some(Value::String(s)) if s.trim().is_empty() => return Some(BigDecimal::from(0)),
        Some(Value::String(s)) => BigDecimal::from_str(s.trim()).ok()?,
        Some(Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok()?,
        Some(_) => return None,
    };
    let rounded = parsed.round(NUMERIC_SCALE);
    (rounded.abs() < BigDecimal::from(NUMERIC_LIMIT)).then_some(rounded)
}

/// Fractional digits of a NUMERIC(15,2) column
const NUMERIC_SCALE: i64 = 2;

/// Smallest magnitude that overflows NUMERIC(15,2)
const NUMERIC_LIMIT: i64 = 10_000_000_000_000;
