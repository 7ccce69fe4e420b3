//! Tabular data model
//!
//! A [`Dataset`] is an immutable, column-oriented table. Every row carries a
//! stable record id (its position in the originally loaded table) that
//! survives subsetting, so splits and resamples can always be traced back to
//! the source records.

pub mod loader;
pub mod stats;

pub use loader::{read_csv, write_csv};
pub use stats::RunningStats;

use crate::error::{KolosalError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Numeric,
    Categorical,
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric value; `NaN` marks a missing entry
    Numeric(f64),
    Categorical(String),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Numeric(_) => FieldType::Numeric,
            Value::Categorical(_) => FieldType::Categorical,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            Value::Categorical(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Categorical(s) => write!(f, "{}", s),
        }
    }
}

/// One row as a field name → value mapping
pub type Record = BTreeMap<String, Value>;

/// Homogeneous column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    /// Create a numeric column
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Create a categorical column
    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field_type(&self) -> FieldType {
        match &self.data {
            ColumnData::Numeric(_) => FieldType::Numeric,
            ColumnData::Categorical(_) => FieldType::Categorical,
        }
    }

    /// Numeric values, if this is a numeric column
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Categorical(_) => None,
        }
    }

    /// Categorical values, if this is a categorical column
    pub fn as_categorical(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Categorical(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Value at row `i`
    pub fn value(&self, i: usize) -> Option<Value> {
        match &self.data {
            ColumnData::Numeric(v) => v.get(i).map(|x| Value::Numeric(*x)),
            ColumnData::Categorical(v) => v.get(i).map(|s| Value::Categorical(s.clone())),
        }
    }

    /// String key of row `i`, used for stratification and class labels
    pub fn key(&self, i: usize) -> Option<String> {
        self.value(i).map(|v| v.to_string())
    }

    /// Rename the column
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn take(&self, indices: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        };
        Column {
            name: self.name.clone(),
            data,
        }
    }
}

/// Ordered field names and types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
}

impl Schema {
    pub fn fields(&self) -> &[(String, FieldType)] {
        &self.fields
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Immutable column-oriented table with stable record ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    record_ids: Vec<usize>,
}

impl Dataset {
    /// Build a dataset from columns of equal length with unique names
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(KolosalError::SchemaMismatch(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
            if column.len() != n_rows {
                return Err(KolosalError::SchemaMismatch(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    n_rows
                )));
            }
        }
        Ok(Self {
            columns,
            record_ids: (0..n_rows).collect(),
        })
    }

    /// Build a dataset from records that all share one schema.
    ///
    /// Column order follows the field order of the first record.
    pub fn from_records(records: &[Record]) -> Result<Self> {
        let first = match records.first() {
            Some(r) => r,
            None => return Self::from_columns(Vec::new()),
        };

        let mut columns: Vec<Column> = first
            .iter()
            .map(|(name, value)| match value {
                Value::Numeric(_) => Column::numeric(name.clone(), Vec::with_capacity(records.len())),
                Value::Categorical(_) => {
                    Column::categorical::<String>(name.clone(), Vec::with_capacity(records.len()))
                }
            })
            .collect();

        for (row, record) in records.iter().enumerate() {
            if record.len() != columns.len() {
                return Err(KolosalError::SchemaMismatch(format!(
                    "record {} has {} fields, expected {}",
                    row,
                    record.len(),
                    columns.len()
                )));
            }
            for column in columns.iter_mut() {
                let value = record.get(&column.name).ok_or_else(|| {
                    KolosalError::SchemaMismatch(format!(
                        "record {} is missing field '{}'",
                        row, column.name
                    ))
                })?;
                match (&mut column.data, value) {
                    (ColumnData::Numeric(v), Value::Numeric(x)) => v.push(*x),
                    (ColumnData::Categorical(v), Value::Categorical(s)) => v.push(s.clone()),
                    _ => {
                        return Err(KolosalError::SchemaMismatch(format!(
                            "record {} field '{}' has type {:?}, expected {:?}",
                            row,
                            column.name,
                            value.field_type(),
                            column.field_type()
                        )))
                    }
                }
            }
        }

        Self::from_columns(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.record_ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn schema(&self) -> Schema {
        Schema {
            fields: self
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.field_type()))
                .collect(),
        }
    }

    /// Stable record ids, one per row
    pub fn record_ids(&self) -> &[usize] {
        &self.record_ids
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column or fail with a schema mismatch
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| KolosalError::SchemaMismatch(format!("column '{}' not found", name)))
    }

    /// Numeric values of a column
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        self.require(name)?.as_numeric().ok_or_else(|| {
            KolosalError::SchemaMismatch(format!("column '{}' is not numeric", name))
        })
    }

    /// Row `i` as a record
    pub fn record(&self, i: usize) -> Option<Record> {
        if i >= self.n_rows() {
            return None;
        }
        self.columns
            .iter()
            .map(|c| c.value(i).map(|v| (c.name.clone(), v)))
            .collect()
    }

    /// Rows at the given positions, carrying their record ids along
    pub fn take(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            record_ids: indices.iter().map(|&i| self.record_ids[i]).collect(),
        }
    }

    /// Keep only the named columns, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Dataset> {
        let columns = names
            .iter()
            .map(|n| self.require(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset {
            columns,
            record_ids: self.record_ids.clone(),
        })
    }

    /// Drop the named columns; unknown names are ignored
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> Dataset {
        Dataset {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.iter().any(|n| n.as_ref() == c.name))
                .cloned()
                .collect(),
            record_ids: self.record_ids.clone(),
        }
    }

    /// Replace a column of the same name in place, or append a new one
    ///
    /// A dataset with no columns keeps its record ids as long as the new
    /// column matches them; one with no columns and no rows takes `0..n`.
    pub fn with_column(&self, column: Column) -> Result<Dataset> {
        let fresh = self.columns.is_empty() && self.record_ids.is_empty();
        if !fresh && column.len() != self.n_rows() {
            return Err(KolosalError::SchemaMismatch(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.len(),
                self.n_rows()
            )));
        }
        let mut columns = self.columns.clone();
        match columns.iter().position(|c| c.name == column.name) {
            Some(pos) => columns[pos] = column,
            None => columns.push(column),
        }
        let record_ids = if fresh {
            (0..columns[0].len()).collect()
        } else {
            self.record_ids.clone()
        };
        Ok(Dataset { columns, record_ids })
    }

    /// String keys of a column (for strata and class labels)
    pub fn keys(&self, name: &str) -> Result<Vec<String>> {
        let column = self.require(name)?;
        Ok(match column.data() {
            ColumnData::Numeric(v) => v.iter().map(|x| x.to_string()).collect(),
            ColumnData::Categorical(v) => v.clone(),
        })
    }

    /// Row-major matrix of the named numeric columns
    pub fn to_matrix<S: AsRef<str>>(&self, names: &[S]) -> Result<Array2<f64>> {
        let col_refs = names
            .iter()
            .map(|n| self.numeric(n.as_ref()))
            .collect::<Result<Vec<&[f64]>>>()?;
        Ok(Array2::from_shape_fn((self.n_rows(), col_refs.len()), |(r, c)| {
            col_refs[c][r]
        }))
    }
}
