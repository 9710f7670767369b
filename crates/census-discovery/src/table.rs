//! Tabular results of data queries.
//!
//! The data API answers with a JSON array of arrays: the first row is the
//! header, the remaining rows are data. Cells arrive as strings (or
//! occasionally numbers and nulls); columns start out as text and are
//! coerced to numbers by the caller, which knows the variable types.

use std::fmt;

use census_core::{Error, Result};
use serde_json::Value;

/// Values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Raw text cells; `None` for JSON null.
    Text(Vec<Option<String>>),
    /// Numeric cells; `None` for null or unparseable text.
    Numeric(Vec<Option<f64>>),
}

impl ColumnValues {
    /// Number of cells.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(values) => values.len(),
            ColumnValues::Numeric(values) => values.len(),
        }
    }

    /// Returns `true` if the column has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow text cells, if the column is text.
    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            ColumnValues::Text(values) => Some(values),
            ColumnValues::Numeric(_) => None,
        }
    }

    /// Borrow numeric cells, if the column is numeric.
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            ColumnValues::Numeric(values) => Some(values),
            ColumnValues::Text(_) => None,
        }
    }

    /// Render cell `row` for display; nulls render empty.
    pub fn display(&self, row: usize) -> String {
        match self {
            ColumnValues::Text(values) => values.get(row).cloned().flatten().unwrap_or_default(),
            ColumnValues::Numeric(values) => values
                .get(row)
                .copied()
                .flatten()
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Header name.
    pub name: String,
    /// Cell values.
    pub values: ColumnValues,
}

/// A query result keyed by the response header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table from a data API response.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedResponse`] if the response is not an array of
    /// arrays, the header is missing or not all strings, or a row's length
    /// differs from the header's.
    pub fn from_response(response: &Value) -> Result<Self> {
        let rows = response
            .as_array()
            .ok_or_else(|| Error::malformed_response("expected an array of rows"))?;
        let (header, data) = rows
            .split_first()
            .ok_or_else(|| Error::malformed_response("response has no header row"))?;

        let names = header
            .as_array()
            .ok_or_else(|| Error::malformed_response("header is not an array"))?
            .iter()
            .map(|cell| {
                cell.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::malformed_response(format!("header cell {cell} is not a string")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(data.len()); names.len()];
        for (index, row) in data.iter().enumerate() {
            let row = row
                .as_array()
                .ok_or_else(|| Error::malformed_response(format!("row {} is not an array", index + 1)))?;
            if row.len() != names.len() {
                return Err(Error::malformed_response(format!(
                    "row {} has {} cells, header has {}",
                    index + 1,
                    row.len(),
                    names.len()
                )));
            }
            for (column, cell) in cells.iter_mut().zip(row) {
                column.push(cell_text(cell));
            }
        }

        Ok(Self {
            columns: names
                .into_iter()
                .zip(cells)
                .map(|(name, values)| Column {
                    name,
                    values: ColumnValues::Text(values),
                })
                .collect(),
        })
    }

    /// Convert column `name` to numbers.
    ///
    /// Unparseable cells become `None`. Returns `false` if there is no such
    /// column; an already numeric column is left as is.
    pub fn coerce_numeric(&mut self, name: &str) -> bool {
        let Some(column) = self.columns.iter_mut().find(|c| c.name == name) else {
            return false;
        };
        if let ColumnValues::Text(values) = &column.values {
            let numbers = values
                .iter()
                .map(|cell| cell.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                .collect();
            column.values = ColumnValues::Numeric(numbers);
        }
        true
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// All columns in header order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Header names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of data rows.
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }
}

fn cell_text(cell: &Value) -> Option<String> {
    match cell {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<&str> = self.column_names().collect();
        writeln!(f, "{}", header.join("\t"))?;
        for row in 0..self.num_rows() {
            let cells: Vec<String> = self.columns.iter().map(|c| c.values.display(row)).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
