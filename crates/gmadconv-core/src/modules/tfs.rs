//! Column table loader for MAD-X TFS files and plain whitespace tables.
//!
//! TFS files carry `@` header records, a `*` column line, a `$` format
//! line and optional `#segment` markers (PTC `trackone` output). Plain
//! tables name their columns on the first non-empty line, optionally
//! behind a `#`, with unit suffixes such as `S[m]` stripped.

use crate::domain::{LatticeError, PropertyValue};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read table '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("table line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("table has no column named '{column}'")]
    MissingColumn { column: String },
    #[error("column '{column}' holds text, not numbers")]
    TextColumn { column: String },
}

impl From<TableError> for LatticeError {
    fn from(error: TableError) -> Self {
        let message = error.to_string();
        match error {
            TableError::Read { .. } => LatticeError::io_system("IO.TABLE_READ", message),
            TableError::Parse { .. } => LatticeError::input_validation("INPUT.TABLE_SYNTAX", message),
            TableError::MissingColumn { .. } | TableError::TextColumn { .. } => {
                LatticeError::input_validation("INPUT.TABLE_COLUMN", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Text(values) => values.len(),
        }
    }

    fn slice(&self, range: Range<usize>) -> Self {
        match self {
            Self::Numeric(values) => Self::Numeric(values[range].to_vec()),
            Self::Text(values) => Self::Text(values[range].to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub rows: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: BTreeMap<String, PropertyValue>,
    names: Vec<String>,
    columns: Vec<ColumnData>,
    segments: Vec<Segment>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, ColumnData::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn header(&self, name: &str) -> Option<&PropertyValue> {
        self.headers.get(&name.to_ascii_uppercase())
    }

    /// Numeric column by case-insensitive name.
    pub fn column(&self, name: &str) -> Result<&[f64], TableError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
            })?;
        match &self.columns[index] {
            ColumnData::Numeric(values) => Ok(values),
            ColumnData::Text(_) => Err(TableError::TextColumn {
                column: name.to_string(),
            }),
        }
    }

    pub fn text_column(&self, name: &str) -> Option<&[String]> {
        match &self.columns[self.column_index(name)?] {
            ColumnData::Text(values) => Some(values),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Numeric cell; `None` when the column is absent or holds text.
    pub fn number_at(&self, column: &str, row: usize) -> Option<f64> {
        self.column(column).ok()?.get(row).copied()
    }

    pub fn text_at(&self, column: &str, row: usize) -> Option<&str> {
        self.text_column(column)?.get(row).map(String::as_str)
    }

    pub fn header_number(&self, name: &str) -> Option<f64> {
        self.header(name).and_then(PropertyValue::as_number)
    }

    pub fn header_text(&self, name: &str) -> Option<&str> {
        match self.header(name)? {
            PropertyValue::Text(text) => Some(text.as_str()),
            PropertyValue::Number(_) => None,
        }
    }

    /// Row whose `S` is closest to `s`; the first such row on ties.
    pub fn nearest_s_index(&self, s: f64) -> Result<usize, TableError> {
        let positions = self.column("S")?;
        positions
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (index, value)| {
                let distance = (value - s).abs();
                match best {
                    Some((_, best_distance)) if best_distance <= distance => best,
                    _ => Some((index, distance)),
                }
            })
            .map(|(index, _)| index)
            .ok_or_else(|| TableError::MissingColumn {
                column: "S".to_string(),
            })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Rows of the `index`-th segment (zero based) as a standalone table.
    pub fn segment(&self, index: usize) -> Option<Table> {
        let segment = self.segments.get(index)?;
        Some(Table {
            headers: self.headers.clone(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| column.slice(segment.rows.clone()))
                .collect(),
            segments: Vec::new(),
        })
    }

    /// The final segment, or the whole table when it has no segments.
    pub fn last_segment(&self) -> Table {
        match self.segments.len().checked_sub(1) {
            Some(index) => self.segment(index).unwrap_or_else(|| self.clone()),
            None => self.clone(),
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }
}

pub fn load_table(path: impl AsRef<Path>) -> Result<Table, TableError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| TableError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_table(&content)?;
    tracing::debug!(
        path = %path.display(),
        rows = table.len(),
        columns = table.names.len(),
        segments = table.segments.len(),
        "loaded table"
    );
    Ok(table)
}

pub fn parse_table(content: &str) -> Result<Table, TableError> {
    let mut headers = BTreeMap::new();
    let mut names: Option<Vec<String>> = None;
    let mut text_columns: Vec<bool> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut segments: Vec<Segment> = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(record) = line.strip_prefix('@') {
            let (key, value) = parse_header(record, line_number)?;
            headers.insert(key, value);
            continue;
        }

        if let Some(marker) = line.strip_prefix("#segment") {
            if let Some(open) = segments.last_mut() {
                open.rows.end = rows.len();
            }
            let name = tokenize(marker).pop().unwrap_or_default();
            segments.push(Segment {
                name,
                rows: rows.len()..rows.len(),
            });
            continue;
        }

        if let Some(columns) = line.strip_prefix('*') {
            names = Some(tokenize(columns).into_iter().map(strip_unit).collect());
            continue;
        }

        if let Some(formats) = line.strip_prefix('$') {
            text_columns = tokenize(formats)
                .iter()
                .map(|format| format.ends_with('s'))
                .collect();
            continue;
        }

        if names.is_none() {
            let header_line = line.strip_prefix('#').unwrap_or(line);
            names = Some(tokenize(header_line).into_iter().map(strip_unit).collect());
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let cells = tokenize(line);
        let width = names.as_ref().map_or(0, Vec::len);
        if cells.len() != width {
            return Err(TableError::Parse {
                line: line_number,
                message: format!("expected {} values, found {}", width, cells.len()),
            });
        }
        rows.push(cells);
    }

    if let Some(open) = segments.last_mut() {
        open.rows.end = rows.len();
    }

    let names = names.unwrap_or_default();
    let mut columns = Vec::with_capacity(names.len());
    for (column_index, name) in names.iter().enumerate() {
        let declared_text = text_columns.get(column_index).copied().unwrap_or(false);
        columns.push(build_column(name, column_index, &rows, declared_text)?);
    }

    Ok(Table {
        headers,
        names,
        columns,
        segments,
    })
}

fn build_column(
    name: &str,
    column_index: usize,
    rows: &[Vec<String>],
    declared_text: bool,
) -> Result<ColumnData, TableError> {
    let cells = rows.iter().map(|row| row[column_index].as_str());
    if declared_text {
        return Ok(ColumnData::Text(cells.map(str::to_string).collect()));
    }

    let parsed: Option<Vec<f64>> = cells.clone().map(parse_cell).collect();
    match parsed {
        Some(values) => Ok(ColumnData::Numeric(values)),
        None if rows.is_empty() => Ok(ColumnData::Numeric(Vec::new())),
        None => {
            tracing::trace!(column = name, "treating column with non-numeric cells as text");
            Ok(ColumnData::Text(cells.map(str::to_string).collect()))
        }
    }
}

fn parse_header(record: &str, line: usize) -> Result<(String, PropertyValue), TableError> {
    let mut tokens = tokenize(record).into_iter();
    let key = tokens.next().ok_or_else(|| TableError::Parse {
        line,
        message: "header record without a name".to_string(),
    })?;
    let format = tokens.next().unwrap_or_default();
    let raw = tokens.collect::<Vec<_>>().join(" ");

    let value = if format.ends_with('s') {
        PropertyValue::Text(raw)
    } else {
        match parse_cell(&raw) {
            Some(number) => PropertyValue::Number(number),
            None => PropertyValue::Text(raw),
        }
    };
    Ok((key.to_ascii_uppercase(), value))
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok()
}

/// Drops a trailing `[unit]` from a column name.
fn strip_unit(name: String) -> String {
    match name.find('[') {
        Some(index) if name.ends_with(']') && index > 0 => name[..index].to_string(),
        _ => name,
    }
}

/// Whitespace split that keeps double-quoted tokens whole, without quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for character in line.chars() {
        match character {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        tokens.push(current);
    }
    tokens
}
