//! Batch implementation: a mapping from column name to typed column

use std::fmt;
use std::sync::Arc;

use crate::column::Column;
use crate::error::{Error, Result};
use crate::schema::{ColumnRole, Field, Schema};

/// A collection of named columns representing one step of a batch stream
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Schema describing the data
    schema: Arc<Schema>,

    /// Columns in schema order
    columns: Vec<Column>,

    /// Number of rows shared by all per-row columns
    row_count: usize,
}

impl Batch {
    /// Create a new batch with the given schema and columns.
    ///
    /// Columns must follow the schema order and kinds; per-row columns must
    /// all have the same length and per-batch columns hold at most one value.
    pub fn new(schema: Arc<Schema>, columns: Vec<Column>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::Schema(format!(
                "Schema declares {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }

        let mut row_count = None;
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.name() != field.name() {
                return Err(Error::Schema(format!(
                    "Column name mismatch: expected '{}', got '{}'",
                    field.name(),
                    column.name()
                )));
            }

            if !field.kind().accepts(column.kind()) {
                return Err(Error::Schema(format!(
                    "Column type mismatch for '{}': expected {}, got {}",
                    field.name(),
                    field.kind(),
                    column.kind()
                )));
            }

            if let Some(shape) = field.shape() {
                if shape != column.row_shape() {
                    return Err(Error::Shape(format!(
                        "Column '{}' rows have shape {:?}, expected {shape:?}",
                        field.name(),
                        column.row_shape()
                    )));
                }
            }

            match field.role() {
                ColumnRole::PerRow => match row_count {
                    None => row_count = Some(column.len()),
                    Some(n) if n != column.len() => {
                        return Err(Error::Schema(format!(
                            "Column '{}' has {} rows, expected {n}",
                            field.name(),
                            column.len()
                        )));
                    }
                    Some(_) => {}
                },
                ColumnRole::PerBatch if column.len() > 1 => {
                    return Err(Error::Schema(format!(
                        "Per-batch column '{}' holds {} values",
                        field.name(),
                        column.len()
                    )));
                }
                ColumnRole::PerBatch => {}
            }
        }

        Ok(Self {
            schema,
            columns,
            row_count: row_count.unwrap_or(0),
        })
    }

    /// Create a batch whose declared columns all exist and are empty
    pub fn empty(schema: Arc<Schema>) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| Column::empty(field.name(), field.kind(), field.shape().unwrap_or(&[])))
            .collect();
        Self {
            schema,
            columns,
            row_count: 0,
        }
    }

    /// Get the schema of this batch
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the number of rows in this batch
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Get the number of columns in this batch
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this batch has no rows
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Get a reference to a column by index
    pub fn column(&self, index: usize) -> Result<&Column> {
        self.columns.get(index).ok_or(Error::Index {
            index: isize::try_from(index).unwrap_or(isize::MAX),
            len: self.columns.len(),
        })
    }

    /// Get a reference to a column by name
    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        let index = self.schema.index_of(name)?;
        self.column(index)
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Consume the batch, returning its columns
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Column names in schema order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schema.names()
    }

    /// Slice this batch to a window of rows.
    ///
    /// Per-batch columns are kept unchanged.
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset.checked_add(length).map_or(true, |end| end > self.row_count) {
            return Err(Error::Index {
                index: isize::try_from(offset.saturating_add(length)).unwrap_or(isize::MAX),
                len: self.row_count,
            });
        }

        let columns = self
            .schema
            .fields()
            .iter()
            .zip(&self.columns)
            .map(|(field, column)| match field.role() {
                ColumnRole::PerRow => column.slice(offset, length),
                ColumnRole::PerBatch => Ok(column.clone()),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            row_count: length,
        })
    }

    /// Create a projection of this batch with only the specified columns
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let schema = Arc::new(self.schema.project(indices)?);
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        Self::new(schema, columns)
    }

    /// Create a projection of this batch with only the specified column names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|&name| self.schema.index_of(name))
            .collect::<Result<Vec<_>>>()?;
        self.project(&indices)
    }

    /// Remove a column by name
    pub fn drop_column(&self, name: &str) -> Result<Self> {
        let index = self.schema.index_of(name)?;
        let indices: Vec<usize> = (0..self.columns.len()).filter(|&i| i != index).collect();
        let mut projected = self.project(&indices)?;
        // a batch of per-batch columns only still has the rows it had
        if projected.schema.fields().iter().all(|f| f.role() == ColumnRole::PerBatch) {
            projected.row_count = self.row_count;
        }
        Ok(projected)
    }

    /// Add a column, or replace the column of the same name in place
    pub fn with_column(&self, field: Field, column: Column) -> Result<Self> {
        if field.name() != column.name() {
            return Err(Error::Schema(format!(
                "Field '{}' does not match column '{}'",
                field.name(),
                column.name()
            )));
        }
        let schema = self.schema.with_field(field)?;
        let mut columns = self.columns.clone();
        match self.schema.index_of(column.name()) {
            Ok(i) => columns[i] = column,
            Err(_) => columns.push(column),
        }
        Self::new(Arc::new(schema), columns)
    }

    /// Join batches of one schema into a single batch.
    ///
    /// Per-row columns are concatenated; per-batch columns take the value of
    /// the first batch that has one.
    pub fn concat(schema: Arc<Schema>, batches: &[Batch]) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let parts = batches
                .iter()
                .map(|batch| batch.column_by_name(field.name()))
                .collect::<Result<Vec<_>>>()?;
            let column = match (field.role(), parts.split_first()) {
                (_, None) => {
                    Column::empty(field.name(), field.kind(), field.shape().unwrap_or(&[]))
                }
                (ColumnRole::PerRow, Some((first, rest))) => first.concat(rest)?,
                (ColumnRole::PerBatch, Some((first, _))) => parts
                    .iter()
                    .find(|c| !c.is_empty())
                    .map_or_else(|| (*first).clone(), |c| (*c).clone()),
            };
            columns.push(column);
        }
        Self::new(schema, columns)
    }

    /// Calculate the total memory usage of this batch in bytes
    pub fn memory_usage(&self) -> usize {
        self.columns.iter().map(Column::memory_usage).sum()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_ROWS: usize = 10;
        const MAX_COLS: usize = 5;

        writeln!(f, "Batch: {} rows, {} columns", self.row_count, self.columns.len())?;

        let display_cols = self.columns.len().min(MAX_COLS);
        for (i, column) in self.columns.iter().take(display_cols).enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:15}", column.name())?;
        }
        if display_cols < self.columns.len() {
            write!(f, " | ... ({} more columns)", self.columns.len() - display_cols)?;
        }
        writeln!(f)?;

        for i in 0..display_cols {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:-<15}", "")?;
        }
        writeln!(f)?;

        let display_rows = self.row_count.min(MAX_ROWS);
        for row in 0..display_rows {
            for (i, column) in self.columns.iter().take(display_cols).enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                let cell = match column.get(row) {
                    Ok(value) => match value.scalar_value() {
                        Some(scalar) => scalar.to_string(),
                        None => format!("<{} {:?}>", value.kind(), value.shape()),
                    },
                    Err(_) => String::new(),
                };
                write!(f, "{cell:15}")?;
            }
            writeln!(f)?;
        }

        if self.row_count > MAX_ROWS {
            writeln!(f, "... ({} more rows)", self.row_count - MAX_ROWS)?;
        }

        Ok(())
    }
}
