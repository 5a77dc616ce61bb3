//! Named, homogeneous columns and their row-by-row builder

use std::fmt;

use crate::error::{Error, Result};
use crate::schema::{ElementKind, Field};
use crate::value::{ArrayData, Element, NdArray};

/// A named column of values sharing one element kind.
///
/// Axis 0 of the backing array is the row axis; every row has the same inner
/// shape. An empty column keeps its element kind and inner shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name of the column
    name: String,

    /// Values, one entry along axis 0 per row
    array: NdArray,
}

impl Column {
    /// Create a column from an array with at least one dimension
    pub fn new(name: &str, array: NdArray) -> Result<Self> {
        if array.rank() == 0 {
            return Err(Error::Shape(format!(
                "Column '{name}' needs a row axis, got a rank-0 value"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            array,
        })
    }

    /// Create a column of scalar rows
    pub fn from_vec<T: Element>(name: &str, values: Vec<T>) -> Self {
        Self {
            name: name.to_string(),
            array: NdArray::from_vec(values),
        }
    }

    /// Create a column with no rows
    pub fn empty(name: &str, kind: ElementKind, row_shape: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            array: NdArray::empty_with_shape(kind, row_shape),
        }
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the element kind of this column
    pub fn kind(&self) -> ElementKind {
        self.array.kind()
    }

    /// Get the backing array
    pub fn array(&self) -> &NdArray {
        &self.array
    }

    /// Consume the column, returning its array
    pub fn into_array(self) -> NdArray {
        self.array
    }

    /// Shape of a single row
    pub fn row_shape(&self) -> &[usize] {
        &self.array.shape()[1..]
    }

    /// Get the number of rows in this column
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Check if this column has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the value of one row
    pub fn get(&self, row: usize) -> Result<NdArray> {
        self.array.get(row)
    }

    /// Rename the column, keeping its values
    #[must_use]
    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Create a slice of this column
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        let end = offset.checked_add(length).filter(|&end| end <= self.len()).ok_or(
            Error::Index {
                index: isize::try_from(offset.saturating_add(length)).unwrap_or(isize::MAX),
                len: self.len(),
            },
        )?;
        Ok(Self {
            name: self.name.clone(),
            array: self.array.slice_rows(offset, end)?,
        })
    }

    /// Append the rows of `others` after the rows of this column
    pub fn concat(&self, others: &[&Column]) -> Result<Self> {
        let row_shape = self.row_shape().to_vec();
        let (mut shape, mut data) = self.array.clone().into_parts();
        for other in others {
            if other.row_shape() != row_shape.as_slice() {
                return Err(Error::Shape(format!(
                    "Cannot concatenate rows of shape {:?} onto column '{}' with rows of shape {row_shape:?}",
                    other.row_shape(),
                    self.name
                )));
            }
            data.extend_from(other.array.data())?;
            shape[0] += other.len();
        }
        Ok(Self {
            name: self.name.clone(),
            array: NdArray::from_parts(shape, data)?,
        })
    }

    /// Estimate the memory usage of this column in bytes
    pub fn memory_usage(&self) -> usize {
        self.name.len() + self.array.memory_usage()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} x {:?}", self.name, self.kind(), self.array.shape())
    }
}

/// Accumulates per-record values of one declared field into a column
#[derive(Debug)]
pub struct ColumnBuilder {
    field: Field,
    data: ArrayData,
    row_shape: Option<Vec<usize>>,
    rows: usize,
}

impl ColumnBuilder {
    /// Create a builder for `field`, reserving room for `capacity` rows
    pub fn new(field: &Field, capacity: usize) -> Self {
        let per_row: usize = field.shape().map_or(1, |shape| shape.iter().product());
        Self {
            field: field.clone(),
            data: ArrayData::with_capacity(field.kind(), capacity * per_row),
            row_shape: field.shape().map(<[usize]>::to_vec),
            rows: 0,
        }
    }

    /// Number of rows appended so far
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether no rows were appended
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Append one row.
    ///
    /// The value's kind must match the declared kind and its shape must match
    /// the declared shape, or the shape of the first row when none is declared.
    pub fn push(&mut self, value: &NdArray) -> Result<()> {
        if !self.field.kind().accepts(value.kind()) || !self.data.kind().accepts(value.kind()) {
            return Err(Error::Schema(format!(
                "Column '{}' expects {}, got {}",
                self.field.name(),
                self.data.kind(),
                value.kind()
            )));
        }
        match &self.row_shape {
            Some(shape) if shape.as_slice() != value.shape() => {
                return Err(Error::Shape(format!(
                    "Column '{}' expects rows of shape {shape:?}, got {:?}",
                    self.field.name(),
                    value.shape()
                )));
            }
            Some(_) => {}
            None => self.row_shape = Some(value.shape().to_vec()),
        }
        self.data.extend_from(value.data())?;
        self.rows += 1;
        Ok(())
    }

    /// Finish the column; the builder is left empty for the next batch
    pub fn finish(&mut self) -> Result<Column> {
        let row_shape = self.row_shape.clone().unwrap_or_default();
        let data = std::mem::replace(&mut self.data, ArrayData::new(self.field.kind()));
        let rows = std::mem::take(&mut self.rows);
        if self.field.shape().is_none() {
            self.row_shape = None;
        }

        let mut shape = Vec::with_capacity(row_shape.len() + 1);
        shape.push(rows);
        shape.extend_from_slice(&row_shape);
        let array = if rows == 0 {
            NdArray::empty_with_shape(self.field.kind(), &row_shape)
        } else {
            NdArray::from_parts(shape, data)?
        };
        Column::new(self.field.name(), array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_rows() {
        let field = Field::new("labels", ElementKind::Int32);
        let mut builder = ColumnBuilder::new(&field, 4);
        for label in [3, 2, 1] {
            builder.push(&NdArray::from(label)).unwrap();
        }
        let column = builder.finish().unwrap();
        assert_eq!(column, Column::from_vec("labels", vec![3, 2, 1]));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_builder_stacks_images() {
        let field = Field::new("images", ElementKind::UInt8).with_shape(vec![1, 2, 1]);
        let mut builder = ColumnBuilder::new(&field, 2);
        let image = NdArray::from_nested3(vec![vec![vec![7u8], vec![9u8]]]).unwrap();
        builder.push(&image).unwrap();
        builder.push(&image).unwrap();
        let column = builder.finish().unwrap();
        assert_eq!(column.array().shape(), &[2, 1, 2, 1]);
        assert_eq!(column.row_shape(), &[1, 2, 1]);
        assert_eq!(column.get(1).unwrap(), image);

        let wrong = NdArray::from_vec(vec![1u8, 2]);
        assert!(matches!(builder.push(&wrong), Err(Error::Shape(_))));
    }

    #[test]
    fn test_builder_rejects_other_kind() {
        let field = Field::new("Double", ElementKind::Float64);
        let mut builder = ColumnBuilder::new(&field, 1);
        assert!(matches!(builder.push(&NdArray::from(1)), Err(Error::Schema(_))));
    }

    #[test]
    fn test_empty_column_keeps_kind() {
        let field = Field::new("images", ElementKind::UInt8).with_shape(vec![4, 4, 3]);
        let column = ColumnBuilder::new(&field, 0).finish().unwrap();
        assert!(column.is_empty());
        assert_eq!(column.kind(), ElementKind::UInt8);
        assert_eq!(column.array().shape(), &[0, 4, 4, 3]);
    }

    #[test]
    fn test_slice() {
        let column = Column::from_vec("fpaths", vec!["a".to_string(), "b".into(), "c".into()]);
        let tail = column.slice(1, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.array().as_slice::<String>().unwrap(), &["b", "c"]);
        assert!(column.slice(2, 2).unwrap_err().is_index());
        assert!(Column::new("x", NdArray::from(1)).is_err());
    }

    #[test]
    fn test_concat() {
        let head = Column::from_vec("Int", vec![3, 2]);
        let tail = Column::from_vec("Int", vec![1]);
        let none = Column::empty("Int", ElementKind::Int32, &[]);
        let joined = head.concat(&[&none, &tail]).unwrap();
        assert_eq!(joined, Column::from_vec("Int", vec![3, 2, 1]));

        let wide = Column::new("Int", NdArray::from_nested2(vec![vec![1, 2]]).unwrap()).unwrap();
        assert!(matches!(head.concat(&[&wide]), Err(Error::Shape(_))));
    }
}
