//! Element kinds, fields and schemas for columnar batches

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element kind (dtype) shared by every element of a container or column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// No elements have ever been seen and no kind was declared
    Empty,

    /// Boolean
    Bool,

    /// 8-bit unsigned integer (image pixels)
    UInt8,

    /// 32-bit signed integer, the default for whole numbers
    Int32,

    /// 64-bit signed integer, only when explicitly requested
    Int64,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point, the default for fractional numbers
    Float64,

    /// Single character
    Char,

    /// UTF-8 string
    Str,

    /// Opaque reference to an arbitrary value
    Object,
}

impl ElementKind {
    /// Size of one element in bytes for fixed-width numeric kinds
    pub fn size_bytes(self) -> usize {
        match self {
            ElementKind::Bool | ElementKind::UInt8 => 1,
            ElementKind::Int32 | ElementKind::Float32 | ElementKind::Char => 4,
            ElementKind::Int64 | ElementKind::Float64 => 8,
            ElementKind::Empty | ElementKind::Str | ElementKind::Object => 0,
        }
    }

    /// Whether elements of this kind are plain numbers (booleans included)
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ElementKind::Bool
                | ElementKind::UInt8
                | ElementKind::Int32
                | ElementKind::Int64
                | ElementKind::Float32
                | ElementKind::Float64
        )
    }

    /// Whether elements of this kind are held by reference or by owned text
    pub fn is_object_like(self) -> bool {
        matches!(self, ElementKind::Char | ElementKind::Str | ElementKind::Object)
    }

    /// Check whether a value of kind `other` may be stored under this kind.
    ///
    /// `Empty` accepts anything; no other widening happens.
    pub fn accepts(self, other: ElementKind) -> bool {
        self == other || self == ElementKind::Empty
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Empty => "Empty",
            ElementKind::Bool => "Bool",
            ElementKind::UInt8 => "UInt8",
            ElementKind::Int32 => "Int32",
            ElementKind::Int64 => "Int64",
            ElementKind::Float32 => "Float32",
            ElementKind::Float64 => "Float64",
            ElementKind::Char => "Char",
            ElementKind::Str => "Str",
            ElementKind::Object => "Object",
        };
        f.write_str(name)
    }
}

/// How a column relates to the rows of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColumnRole {
    /// One value per row; all per-row columns of a batch have equal length
    #[default]
    PerRow,

    /// One value for the whole batch, taken from its first record
    PerBatch,
}

/// A field in a schema, with a name, element kind and row role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Element kind of the field
    pub kind: ElementKind,

    /// Row role of the field
    pub role: ColumnRole,

    /// Fixed shape of each value, if declared (e.g. `[h, w, c]` for images)
    pub shape: Option<Vec<usize>>,
}

impl Field {
    /// Create a new per-row scalar field
    pub fn new(name: &str, kind: ElementKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            role: ColumnRole::PerRow,
            shape: None,
        }
    }

    /// Create a new whole-batch metadata field
    pub fn per_batch(name: &str, kind: ElementKind) -> Self {
        Self {
            role: ColumnRole::PerBatch,
            ..Self::new(name, kind)
        }
    }

    /// Declare the fixed shape of each value of this field
    #[must_use]
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the element kind of this field
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Get the row role of this field
    pub fn role(&self) -> ColumnRole {
        self.role
    }

    /// Get the declared value shape, if any
    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.kind)?;
        if let Some(shape) = &self.shape {
            write!(f, " {shape:?}")?;
        }
        if self.role == ColumnRole::PerBatch {
            write!(f, " (per batch)")?;
        }
        Ok(())
    }
}

/// A schema describing the columns of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Fields in this schema
    fields: Vec<Field>,

    /// Field indices by name for faster lookup
    field_indices: HashMap<String, usize>,
}

impl Schema {
    /// Create a new schema with the given fields.
    ///
    /// Field names must be unique.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut field_indices = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field_indices.insert(field.name.clone(), i).is_some() {
                return Err(Error::Schema(format!("Duplicate column name: {}", field.name)));
            }
        }

        Ok(Self {
            fields,
            field_indices,
        })
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.field_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::Schema(format!("Column not found: {name}")))
    }

    /// Whether the schema declares a column with this name
    pub fn contains(&self, name: &str) -> bool {
        self.field_indices.contains_key(name)
    }

    /// Iterate over the column names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::name)
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Create a projection of this schema with only the specified fields
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let mut fields = Vec::with_capacity(indices.len());
        for &i in indices {
            let field = self.fields.get(i).ok_or(Error::Index {
                index: isize::try_from(i).unwrap_or(isize::MAX),
                len: self.fields.len(),
            })?;
            fields.push(field.clone());
        }
        Self::new(fields)
    }

    /// Create a projection of this schema with only the specified field names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|&name| self.index_of(name))
            .collect::<Result<Vec<_>>>()?;
        self.project(&indices)
    }

    /// Return a copy of this schema with `field` appended, or replacing the
    /// field of the same name in place
    pub fn with_field(&self, field: Field) -> Result<Self> {
        let mut fields = self.fields.clone();
        match self.field_indices.get(&field.name) {
            Some(&i) => fields[i] = field,
            None => fields.push(field),
        }
        Self::new(fields)
    }

    /// Return a copy of this schema without the named field
    pub fn without_field(&self, name: &str) -> Result<Self> {
        self.index_of(name)?;
        Self::new(self.fields.iter().filter(|f| f.name != name).cloned().collect())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::new(vec![
            Field::new("Int", ElementKind::Int32),
            Field::new("Int", ElementKind::Float64),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_lookup_and_projection() {
        let schema = Schema::new(vec![
            Field::new("images", ElementKind::UInt8).with_shape(vec![2, 2, 3]),
            Field::new("fpaths", ElementKind::Str),
            Field::per_batch("epoch", ElementKind::Int64),
        ])
        .unwrap();

        assert_eq!(schema.index_of("fpaths").unwrap(), 1);
        assert_eq!(schema.field_by_name("epoch").unwrap().role(), ColumnRole::PerBatch);
        assert!(matches!(schema.index_of("labels"), Err(Error::Schema(_))));

        let projected = schema.project_by_names(&["epoch", "images"]).unwrap();
        assert_eq!(projected.names().collect::<Vec<_>>(), vec!["epoch", "images"]);
        assert_eq!(projected.field(1).shape(), Some(&[2, 2, 3][..]));
    }

    #[test]
    fn test_with_and_without_field() {
        let schema = Schema::new(vec![Field::new("a", ElementKind::Int32)]).unwrap();
        let replaced = schema.with_field(Field::new("a", ElementKind::Float64)).unwrap();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced.field(0).kind(), ElementKind::Float64);

        let appended = schema.with_field(Field::new("b", ElementKind::Bool)).unwrap();
        assert_eq!(appended.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(appended.without_field("a").unwrap().names().collect::<Vec<_>>(), vec!["b"]);
        assert!(schema.without_field("zzz").is_err());
    }

    #[test]
    fn test_kind_sizes() {
        assert_eq!(ElementKind::Int32.size_bytes(), 4);
        assert_eq!(ElementKind::Float64.size_bytes(), 8);
        assert!(ElementKind::Empty.accepts(ElementKind::Str));
        assert!(!ElementKind::Int32.accepts(ElementKind::Int64));
        assert!(ElementKind::Char.is_object_like());
    }
}
