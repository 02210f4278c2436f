//! Loosely typed tabular data and its CSV codec.
//!
//! Every pipeline stage consumes and produces a [`Table`]: an ordered set of
//! column names plus rows mapping column → [`Value`]. Values stay loosely
//! typed (`Str`, `Float`, `Null`) until a cleaning stage narrows them — the
//! table itself enforces no schema. Column order is first-appearance order,
//! which keeps artifact headers stable across identical runs.
//!
//! ## Why CSV for checkpoint artifacts?
//!
//! Artifacts exist to be inspected when a run misbehaves: a dated CSV with a
//! header row opens in anything and diffs cleanly between runs. `Null` is
//! encoded as the empty field and decoded back to `Null`, so "empty" and
//! "absent" stay semantically equivalent across a save/load boundary.

use std::collections::HashMap;
use std::io;

use tracing::warn;

/// A single cell. `Float` exists so enrichment can contribute numeric
/// coordinates without stringifying them prematurely; everything read back
/// from a CSV artifact is `Str` or `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Float(f64),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: a `Float` directly, or a `Str` that parses as one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Render for a CSV cell. `Null` becomes the empty field.
    fn to_field(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Float(f) => f.to_string(),
            Value::Null => String::new(),
        }
    }

    /// Decode from a CSV cell. The empty field is `Null`.
    fn from_field(field: &str) -> Value {
        if field.is_empty() {
            Value::Null
        } else {
            Value::Str(field.to_string())
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) => Value::Str(s),
            None => Value::Null,
        }
    }
}

/// One row: column name → value. Missing columns read as `Null`.
pub type Row = HashMap<String, Value>;

/// An ordered sequence of rows sharing a column set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Value at (row, column); `Null` when the row exists but lacks the column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).map(|r| r.get(column).unwrap_or(&Value::Null))
    }

    /// Set a cell, registering the column on first use.
    pub fn set(&mut self, row: usize, column: &str, value: Value) {
        self.ensure_column(column);
        if let Some(r) = self.rows.get_mut(row) {
            r.insert(column.to_string(), value);
        }
    }

    /// Append a row from ordered (column, value) pairs. Pair order drives
    /// the registration order of any columns not seen before.
    pub fn push_row(&mut self, pairs: Vec<(String, Value)>) {
        let mut row = Row::with_capacity(pairs.len());
        for (name, value) in pairs {
            self.ensure_column(&name);
            row.insert(name, value);
        }
        self.rows.push(row);
    }

    /// Add a whole column at once. `values` must have one entry per row.
    ///
    /// # Panics
    /// Panics when `values.len()` differs from the row count. A length
    /// mismatch means the caller built the column against a different
    /// table shape; silently truncating or padding would corrupt rows.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) {
        assert_eq!(
            values.len(),
            self.rows.len(),
            "column '{name}' has {} values for {} rows",
            values.len(),
            self.rows.len()
        );
        self.ensure_column(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(name.to_string(), value);
        }
    }

    /// Drop columns by name; unknown names are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        self.columns.retain(|c| !names.contains(&c.as_str()));
        for row in &mut self.rows {
            for name in names {
                row.remove(*name);
            }
        }
    }

    /// Rename a column, keeping its position. No-op if absent.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(col) = self.columns.iter_mut().find(|c| c.as_str() == from) {
            *col = to.to_string();
            for row in &mut self.rows {
                if let Some(v) = row.remove(from) {
                    row.insert(to.to_string(), v);
                }
            }
        }
    }

    /// Keep only the named columns, in the given order.
    pub fn select_columns(&mut self, names: &[&str]) {
        self.columns = names.iter().map(|n| n.to_string()).collect();
        for row in &mut self.rows {
            row.retain(|k, _| names.contains(&k.as_str()));
        }
    }

    /// Vertically stack tables, unioning their column sets.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut out = Table::new();
        for table in tables {
            for column in &table.columns {
                out.ensure_column(column);
            }
            out.rows.extend(table.rows);
        }
        out
    }

    /// Build a table from JSON records, flattening nested objects into
    /// dot-keyed columns (`properties.data.title`). Arrays are kept as their
    /// raw JSON text; a cleaning stage decides what to do with them.
    /// Non-object records are skipped with a warning.
    pub fn from_json_records(records: &[serde_json::Value]) -> Table {
        let mut table = Table::new();
        for record in records {
            if !record.is_object() {
                warn!("Skipping non-object JSON record: {}", record);
                continue;
            }
            let mut pairs = Vec::new();
            flatten_json("", record, &mut pairs);
            table.push_row(pairs);
        }
        table
    }

    /// Serialise to CSV with a header row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(&self.columns)?;
        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| row.get(c).unwrap_or(&Value::Null).to_field())
                .collect();
            w.write_record(&record)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Deserialise from CSV. The header row names the columns; empty fields
    /// decode to `Null`.
    pub fn read_csv<R: io::Read>(reader: R) -> Result<Table, csv::Error> {
        let mut r = csv::Reader::from_reader(reader);
        let columns: Vec<String> = r.headers()?.iter().map(|h| h.to_string()).collect();

        let mut table = Table {
            columns: columns.clone(),
            rows: Vec::new(),
        };
        for record in r.records() {
            let record = record?;
            let mut row = Row::with_capacity(columns.len());
            for (column, field) in columns.iter().zip(record.iter()) {
                row.insert(column.clone(), Value::from_field(field));
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    fn ensure_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, Value)>) {
    use serde_json::Value as Json;
    match value {
        Json::Object(map) => {
            for (key, inner) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_json(&name, inner, out);
            }
        }
        Json::Null => out.push((prefix.to_string(), Value::Null)),
        Json::Number(n) => out.push((
            prefix.to_string(),
            n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        )),
        Json::Bool(b) => out.push((prefix.to_string(), Value::Str(b.to_string()))),
        Json::String(s) => out.push((prefix.to_string(), Value::Str(s.clone()))),
        Json::Array(_) => out.push((
            prefix.to_string(),
            Value::Str(value.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        let mut t = Table::new();
        t.push_row(vec![
            ("Name".into(), "The Crown".into()),
            ("AnnualRent".into(), "32000".into()),
            ("City".into(), Value::Null),
        ]);
        t.push_row(vec![
            ("Name".into(), "The Swan".into()),
            ("AnnualRent".into(), Value::Null),
            ("City".into(), "Leeds".into()),
        ]);
        t
    }

    #[test]
    fn null_survives_csv_round_trip() {
        let t = sample();
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let back = Table::read_csv(buf.as_slice()).unwrap();

        assert_eq!(back.columns(), &["Name", "AnnualRent", "City"]);
        assert_eq!(back.get(0, "City"), Some(&Value::Null));
        assert_eq!(back.get(1, "City"), Some(&Value::Str("Leeds".into())));
    }

    #[test]
    fn column_order_is_first_appearance() {
        let mut t = Table::new();
        t.push_row(vec![("A".into(), "1".into()), ("B".into(), "2".into())]);
        t.push_row(vec![("B".into(), "3".into()), ("C".into(), "4".into())]);
        assert_eq!(t.columns(), &["A", "B", "C"]);
        // Row 1 never had A
        assert_eq!(t.get(1, "A"), Some(&Value::Null));
    }

    #[test]
    fn json_records_flatten_to_dot_keys() {
        let records = vec![json!({
            "GuideRent": 28000,
            "geometry": { "location": { "lat": 53.8, "lng": -1.55 } },
            "tags": ["freehold", "garden"],
        })];
        let t = Table::from_json_records(&records);
        assert_eq!(t.get(0, "GuideRent"), Some(&Value::Float(28000.0)));
        assert_eq!(t.get(0, "geometry.location.lat"), Some(&Value::Float(53.8)));
        // Arrays are kept as raw JSON text
        assert_eq!(
            t.get(0, "tags").and_then(|v| v.as_str()),
            Some(r#"["freehold","garden"]"#)
        );
    }

    #[test]
    fn non_object_records_are_skipped() {
        let records = vec![json!("just a string"), json!({"A": 1})];
        let t = Table::from_json_records(&records);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn concat_unions_columns() {
        let mut a = Table::new();
        a.push_row(vec![("A".into(), "1".into())]);
        let mut b = Table::new();
        b.push_row(vec![("B".into(), "2".into())]);

        let t = Table::concat(vec![a, b]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.columns(), &["A", "B"]);
        assert_eq!(t.get(0, "B"), Some(&Value::Null));
    }

    #[test]
    #[should_panic(expected = "values for")]
    fn add_column_rejects_wrong_length() {
        let mut t = sample();
        t.add_column("Region", vec![Value::Str("Yorkshire".into())]);
    }

    #[test]
    fn rename_and_select() {
        let mut t = sample();
        t.rename_column("AnnualRent", "Rent");
        t.select_columns(&["Rent", "Name"]);
        assert_eq!(t.columns(), &["Rent", "Name"]);
        assert_eq!(t.get(0, "Rent").and_then(|v| v.as_str()), Some("32000"));
    }
}
