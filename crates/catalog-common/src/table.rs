//! In-memory catalog table and its CSV encoding.
//!
//! A table is a list of rows keyed by column name. Every row carries every
//! column of the table; cells a row never set are [`Cell::Missing`].
//!
//! Multi-valued cells are written to CSV as Python-style list literals
//! (`['a', 'b']`) so that downstream intake-esm readers can evaluate them,
//! and the sidecar lists those columns under `columns_with_iterables`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// No value recorded
    Missing,
    /// Scalar text value
    Text(String),
    /// Ordered sequence of values
    List(Vec<String>),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cell::List(values.into_iter().map(Into::into).collect())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Cell::List(_))
    }

    /// Scalar value, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the sequence form. Scalars become one-element lists and
    /// missing cells become empty lists.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Cell::Missing => Vec::new(),
            Cell::Text(s) => vec![s],
            Cell::List(items) => items,
        }
    }

    /// True when the cell holds no usable value (missing, empty text, or an
    /// empty list).
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Text(s) => s.is_empty(),
            Cell::List(items) => items.is_empty(),
        }
    }

    fn to_csv_field(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::List(items) => list_literal(items),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<Vec<String>> for Cell {
    fn from(value: Vec<String>) -> Self {
        Cell::List(value)
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Missing)
    }
}

/// One table row, keyed by column name.
pub type CatalogRow = BTreeMap<String, Cell>;

/// Catalog table with a stable column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogTable {
    columns: Vec<String>,
    rows: Vec<CatalogRow>,
}

impl CatalogTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows. Columns named in `column_order` come first
    /// (when present in any row), the rest follow alphabetically.
    pub fn from_rows(rows: Vec<CatalogRow>, column_order: &[&str]) -> Self {
        let present: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();

        let mut columns: Vec<String> = column_order
            .iter()
            .filter(|c| present.contains(**c))
            .map(|c| c.to_string())
            .collect();
        for column in &present {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }

        let mut table = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            table.push(row);
        }
        table
    }

    /// Append a row, widening the table if the row introduces new columns.
    pub fn push(&mut self, mut row: CatalogRow) {
        let new_columns: Vec<String> = row
            .keys()
            .filter(|k| !self.columns.contains(k))
            .cloned()
            .collect();
        for column in new_columns {
            for existing in &mut self.rows {
                existing.insert(column.clone(), Cell::Missing);
            }
            self.columns.push(column);
        }
        for column in &self.columns {
            row.entry(column.clone()).or_insert(Cell::Missing);
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Columns where at least one row holds a sequence value.
    pub fn columns_with_iterables(&self) -> BTreeSet<String> {
        self.columns
            .iter()
            .filter(|column| {
                self.rows
                    .iter()
                    .any(|row| row.get(column.as_str()).is_some_and(Cell::is_list))
            })
            .cloned()
            .collect()
    }

    /// Rewrite every cell of every multi-valued column into sequence form so
    /// that no column mixes scalar and sequence cells. Returns the columns
    /// that were normalized.
    pub fn normalize_iterables(&mut self) -> BTreeSet<String> {
        let iterables = self.columns_with_iterables();
        for row in &mut self.rows {
            for column in &iterables {
                if let Some(cell) = row.get_mut(column) {
                    if !cell.is_list() {
                        let value = std::mem::replace(cell, Cell::Missing);
                        *cell = Cell::List(value.into_list());
                    }
                }
            }
        }
        iterables
    }

    /// Drop exact duplicate rows, keeping the first occurrence. Returns the
    /// number of rows removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<CatalogRow> = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }

    /// Row indices grouped by the values of `keys`.
    pub fn group_indices(&self, keys: &[String]) -> BTreeMap<Vec<Cell>, Vec<usize>> {
        let mut groups: BTreeMap<Vec<Cell>, Vec<usize>> = BTreeMap::new();
        for (idx, row) in self.rows.iter().enumerate() {
            let key = keys
                .iter()
                .map(|k| row.get(k).cloned().unwrap_or(Cell::Missing))
                .collect();
            groups.entry(key).or_default().push(idx);
        }
        groups
    }

    /// Remove the rows at `indices`, returning them in table order.
    pub fn take_rows(&mut self, indices: &BTreeSet<usize>) -> Vec<CatalogRow> {
        let mut taken = Vec::with_capacity(indices.len());
        let mut kept = Vec::with_capacity(self.rows.len());
        for (idx, row) in std::mem::take(&mut self.rows).into_iter().enumerate() {
            if indices.contains(&idx) {
                taken.push(row);
            } else {
                kept.push(row);
            }
        }
        self.rows = kept;
        taken
    }

    pub fn set_cell(&mut self, row: usize, column: &str, cell: Cell) {
        if !self.has_column(column) {
            for existing in &mut self.rows {
                existing.insert(column.to_string(), Cell::Missing);
            }
            self.columns.push(column.to_string());
        }
        if let Some(target) = self.rows.get_mut(row) {
            target.insert(column.to_string(), cell);
        }
    }

    /// Order-independent rendering of the table content: one line per row,
    /// columns in sorted order, lines sorted.
    pub fn canonical_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, cell)| {
                        let value = serde_json::to_string(cell).unwrap_or_default();
                        format!("{}={}", column, value)
                    })
                    .collect::<Vec<_>>()
                    .join("\u{1f}")
            })
            .collect();
        lines.sort();
        lines
    }

    /// Encode as CSV with a header row.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| escape_field(c)).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in &self.rows {
            let fields: Vec<String> = self
                .columns
                .iter()
                .map(|c| {
                    let cell = row.get(c).unwrap_or(&Cell::Missing);
                    escape_field(&cell.to_csv_field())
                })
                .collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }

    /// Decode CSV written by [`CatalogTable::to_csv`]. Fields of the columns
    /// in `iterable_columns` are parsed as list literals.
    pub fn from_csv(text: &str, iterable_columns: &BTreeSet<String>) -> CatalogResult<Self> {
        let mut records = parse_csv_records(text)?.into_iter();
        let columns = match records.next() {
            Some(header) => header,
            None => return Ok(Self::new()),
        };

        let mut table = Self {
            columns: columns.clone(),
            rows: Vec::new(),
        };
        for (idx, record) in records.enumerate() {
            let line = idx + 2;
            if record.len() != columns.len() {
                return Err(CatalogError::Csv {
                    line,
                    message: format!("expected {} fields, found {}", columns.len(), record.len()),
                });
            }
            let mut row = CatalogRow::new();
            for (column, field) in columns.iter().zip(record) {
                let cell = if field.is_empty() {
                    Cell::Missing
                } else if iterable_columns.contains(column) {
                    Cell::List(parse_list_literal(&field).ok_or_else(|| CatalogError::Csv {
                        line,
                        message: format!("column '{}' holds no list literal: {}", column, field),
                    })?)
                } else {
                    Cell::Text(field)
                };
                row.insert(column.clone(), cell);
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Write the table as gzip-compressed CSV.
    pub fn write_csv_gz(&self, path: &Path) -> CatalogResult<()> {
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(self.to_csv().as_bytes())?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    /// Read a table written by [`CatalogTable::write_csv_gz`].
    pub fn read_csv_gz(path: &Path, iterable_columns: &BTreeSet<String>) -> CatalogResult<Self> {
        let file = File::open(path)?;
        let mut text = String::new();
        GzDecoder::new(file).read_to_string(&mut text)?;
        Self::from_csv(&text, iterable_columns)
    }
}

fn escape_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| format!("'{}'", item.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Parse a Python-style list of string literals (`['a', "b"]`).
fn parse_list_literal(raw: &str) -> Option<Vec<String>> {
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

/// Split CSV text into records, honouring quoted fields that contain
/// separators, doubled quotes or line breaks.
fn parse_csv_records(text: &str) -> CatalogResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CatalogError::Csv {
            line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
