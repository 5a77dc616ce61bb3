//! Typed container model: scalars, rectangular multi-dimensional arrays and
//! named-field records

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::ElementKind;

/// Shared handle to an opaque value.
///
/// Object arrays hold these by reference; cloning the handle never clones the
/// referenced value and equality is reference identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Any + Send + Sync>);

impl ObjectRef {
    /// Wrap a value in a new shared handle
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap an existing shared value without copying it
    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(value)
    }

    /// Borrow the referenced value as `T`, if it is one
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both handles refer to the same value
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::as_ptr(&self.0).cast::<()>() == Arc::as_ptr(&other.0).cast::<()>()
    }

    /// Number of handles currently sharing the referenced value
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// A single element of any supported kind
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// 8-bit unsigned integer
    UInt8(u8),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// Single character
    Char(char),
    /// String
    Str(String),
    /// Opaque reference
    Object(ObjectRef),
}

impl Scalar {
    /// Element kind of this scalar
    pub fn kind(&self) -> ElementKind {
        match self {
            Scalar::Bool(_) => ElementKind::Bool,
            Scalar::UInt8(_) => ElementKind::UInt8,
            Scalar::Int32(_) => ElementKind::Int32,
            Scalar::Int64(_) => ElementKind::Int64,
            Scalar::Float32(_) => ElementKind::Float32,
            Scalar::Float64(_) => ElementKind::Float64,
            Scalar::Char(_) => ElementKind::Char,
            Scalar::Str(_) => ElementKind::Str,
            Scalar::Object(_) => ElementKind::Object,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::UInt8(v) => write!(f, "{v}"),
            Scalar::Int32(v) => write!(f, "{v}"),
            Scalar::Int64(v) => write!(f, "{v}"),
            Scalar::Float32(v) => write!(f, "{v}"),
            Scalar::Float64(v) => write!(f, "{v}"),
            Scalar::Char(v) => write!(f, "{v:?}"),
            Scalar::Str(v) => write!(f, "{v:?}"),
            Scalar::Object(v) => write!(f, "{v:?}"),
        }
    }
}

/// Flat, kind-tagged element storage of an array
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// No elements and no declared kind
    Empty,
    /// Booleans
    Bool(Vec<bool>),
    /// 8-bit unsigned integers
    UInt8(Vec<u8>),
    /// 32-bit signed integers
    Int32(Vec<i32>),
    /// 64-bit signed integers
    Int64(Vec<i64>),
    /// 32-bit floats
    Float32(Vec<f32>),
    /// 64-bit floats
    Float64(Vec<f64>),
    /// Characters
    Char(Vec<char>),
    /// Strings
    Str(Vec<String>),
    /// Opaque references
    Object(Vec<ObjectRef>),
}

/// Apply the same expression to the vector inside every non-empty variant
macro_rules! for_each_variant {
    ($data:expr, $v:ident => $body:expr, empty => $empty:expr) => {
        match $data {
            ArrayData::Empty => $empty,
            ArrayData::Bool($v) => $body,
            ArrayData::UInt8($v) => $body,
            ArrayData::Int32($v) => $body,
            ArrayData::Int64($v) => $body,
            ArrayData::Float32($v) => $body,
            ArrayData::Float64($v) => $body,
            ArrayData::Char($v) => $body,
            ArrayData::Str($v) => $body,
            ArrayData::Object($v) => $body,
        }
    };
}

/// Same as `for_each_variant`, rebuilding the same variant from the result
macro_rules! map_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Empty => ArrayData::Empty,
            ArrayData::Bool($v) => ArrayData::Bool($body),
            ArrayData::UInt8($v) => ArrayData::UInt8($body),
            ArrayData::Int32($v) => ArrayData::Int32($body),
            ArrayData::Int64($v) => ArrayData::Int64($body),
            ArrayData::Float32($v) => ArrayData::Float32($body),
            ArrayData::Float64($v) => ArrayData::Float64($body),
            ArrayData::Char($v) => ArrayData::Char($body),
            ArrayData::Str($v) => ArrayData::Str($body),
            ArrayData::Object($v) => ArrayData::Object($body),
        }
    };
}

impl ArrayData {
    /// Create empty storage of the given kind
    pub fn new(kind: ElementKind) -> Self {
        Self::with_capacity(kind, 0)
    }

    /// Create empty storage of the given kind with room for `capacity` elements
    pub fn with_capacity(kind: ElementKind, capacity: usize) -> Self {
        match kind {
            ElementKind::Empty => ArrayData::Empty,
            ElementKind::Bool => ArrayData::Bool(Vec::with_capacity(capacity)),
            ElementKind::UInt8 => ArrayData::UInt8(Vec::with_capacity(capacity)),
            ElementKind::Int32 => ArrayData::Int32(Vec::with_capacity(capacity)),
            ElementKind::Int64 => ArrayData::Int64(Vec::with_capacity(capacity)),
            ElementKind::Float32 => ArrayData::Float32(Vec::with_capacity(capacity)),
            ElementKind::Float64 => ArrayData::Float64(Vec::with_capacity(capacity)),
            ElementKind::Char => ArrayData::Char(Vec::with_capacity(capacity)),
            ElementKind::Str => ArrayData::Str(Vec::with_capacity(capacity)),
            ElementKind::Object => ArrayData::Object(Vec::with_capacity(capacity)),
        }
    }

    /// Element kind of this storage
    pub fn kind(&self) -> ElementKind {
        match self {
            ArrayData::Empty => ElementKind::Empty,
            ArrayData::Bool(_) => ElementKind::Bool,
            ArrayData::UInt8(_) => ElementKind::UInt8,
            ArrayData::Int32(_) => ElementKind::Int32,
            ArrayData::Int64(_) => ElementKind::Int64,
            ArrayData::Float32(_) => ElementKind::Float32,
            ArrayData::Float64(_) => ElementKind::Float64,
            ArrayData::Char(_) => ElementKind::Char,
            ArrayData::Str(_) => ElementKind::Str,
            ArrayData::Object(_) => ElementKind::Object,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len(), empty => 0)
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a copy of the element at `index`
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            ArrayData::Empty => None,
            ArrayData::Bool(v) => v.get(index).copied().map(Scalar::Bool),
            ArrayData::UInt8(v) => v.get(index).copied().map(Scalar::UInt8),
            ArrayData::Int32(v) => v.get(index).copied().map(Scalar::Int32),
            ArrayData::Int64(v) => v.get(index).copied().map(Scalar::Int64),
            ArrayData::Float32(v) => v.get(index).copied().map(Scalar::Float32),
            ArrayData::Float64(v) => v.get(index).copied().map(Scalar::Float64),
            ArrayData::Char(v) => v.get(index).copied().map(Scalar::Char),
            ArrayData::Str(v) => v.get(index).cloned().map(Scalar::Str),
            ArrayData::Object(v) => v.get(index).cloned().map(Scalar::Object),
        }
    }

    /// Append one element; its kind must match the storage kind.
    ///
    /// `Empty` storage adopts the kind of the first pushed element.
    pub fn push(&mut self, value: Scalar) -> Result<()> {
        if let ArrayData::Empty = self {
            *self = ArrayData::new(value.kind());
        }
        match (self, value) {
            (ArrayData::Bool(v), Scalar::Bool(x)) => v.push(x),
            (ArrayData::UInt8(v), Scalar::UInt8(x)) => v.push(x),
            (ArrayData::Int32(v), Scalar::Int32(x)) => v.push(x),
            (ArrayData::Int64(v), Scalar::Int64(x)) => v.push(x),
            (ArrayData::Float32(v), Scalar::Float32(x)) => v.push(x),
            (ArrayData::Float64(v), Scalar::Float64(x)) => v.push(x),
            (ArrayData::Char(v), Scalar::Char(x)) => v.push(x),
            (ArrayData::Str(v), Scalar::Str(x)) => v.push(x),
            (ArrayData::Object(v), Scalar::Object(x)) => v.push(x),
            (data, value) => {
                return Err(Error::Conversion(format!(
                    "Cannot store {} element in {} array",
                    value.kind(),
                    data.kind()
                )))
            }
        }
        Ok(())
    }

    /// Append all elements of `other`, which must have the same kind.
    ///
    /// `Empty` storage on either side is compatible with every kind.
    pub fn extend_from(&mut self, other: &ArrayData) -> Result<()> {
        if other.kind() == ElementKind::Empty {
            return Ok(());
        }
        if let ArrayData::Empty = self {
            *self = ArrayData::new(other.kind());
        }
        match (self, other) {
            (ArrayData::Bool(a), ArrayData::Bool(b)) => a.extend_from_slice(b),
            (ArrayData::UInt8(a), ArrayData::UInt8(b)) => a.extend_from_slice(b),
            (ArrayData::Int32(a), ArrayData::Int32(b)) => a.extend_from_slice(b),
            (ArrayData::Int64(a), ArrayData::Int64(b)) => a.extend_from_slice(b),
            (ArrayData::Float32(a), ArrayData::Float32(b)) => a.extend_from_slice(b),
            (ArrayData::Float64(a), ArrayData::Float64(b)) => a.extend_from_slice(b),
            (ArrayData::Char(a), ArrayData::Char(b)) => a.extend_from_slice(b),
            (ArrayData::Str(a), ArrayData::Str(b)) => a.extend_from_slice(b),
            (ArrayData::Object(a), ArrayData::Object(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::Conversion(format!(
                    "Cannot append {} elements to {} array",
                    b.kind(),
                    a.kind()
                )))
            }
        }
        Ok(())
    }

    /// Copy out the elements in `start..end`
    pub fn slice(&self, start: usize, end: usize) -> ArrayData {
        map_variant!(self, v => v[start..end].to_vec())
    }

    /// Estimated heap memory used by the elements
    pub fn memory_usage(&self) -> usize {
        match self {
            ArrayData::Str(v) => v.iter().map(String::len).sum(),
            ArrayData::Object(v) => v.len() * std::mem::size_of::<ObjectRef>(),
            other => other.len() * other.kind().size_bytes(),
        }
    }
}

/// Native element types that can populate typed arrays
pub trait Element: Clone + Send + Sync + 'static {
    /// Element kind of this type
    const KIND: ElementKind;

    /// Wrap a vector of elements into kind-tagged storage
    fn wrap(values: Vec<Self>) -> ArrayData;

    /// Borrow the elements of `data`, if it has this element kind
    fn view(data: &ArrayData) -> Option<&[Self]>;

    /// Convert a single element into a scalar
    fn into_scalar(self) -> Scalar;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const KIND: ElementKind = ElementKind::$variant;

            fn wrap(values: Vec<Self>) -> ArrayData {
                ArrayData::$variant(values)
            }

            fn view(data: &ArrayData) -> Option<&[Self]> {
                match data {
                    ArrayData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }
        }

        impl From<$ty> for Scalar {
            fn from(value: $ty) -> Self {
                Scalar::$variant(value)
            }
        }

        impl From<$ty> for NdArray {
            fn from(value: $ty) -> Self {
                NdArray::scalar(value)
            }
        }

        impl From<Vec<$ty>> for NdArray {
            fn from(values: Vec<$ty>) -> Self {
                NdArray::from_vec(values)
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(u8, UInt8);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);
impl_element!(char, Char);
impl_element!(String, Str);
impl_element!(ObjectRef, Object);

impl From<&str> for NdArray {
    fn from(value: &str) -> Self {
        NdArray::scalar(value.to_string())
    }
}

impl From<Scalar> for NdArray {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Bool(v) => NdArray::scalar(v),
            Scalar::UInt8(v) => NdArray::scalar(v),
            Scalar::Int32(v) => NdArray::scalar(v),
            Scalar::Int64(v) => NdArray::scalar(v),
            Scalar::Float32(v) => NdArray::scalar(v),
            Scalar::Float64(v) => NdArray::scalar(v),
            Scalar::Char(v) => NdArray::scalar(v),
            Scalar::Str(v) => NdArray::scalar(v),
            Scalar::Object(v) => NdArray::scalar(v),
        }
    }
}

/// A rectangular multi-dimensional array with a uniform element kind.
///
/// Elements are stored flat in row-major order; `shape` has one entry per
/// rank and its product always equals the element count. A rank-0 array
/// holds exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Create a rank-0 array holding one value
    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: T::wrap(vec![value]),
        }
    }

    /// Create a rank-1 array
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        Self {
            shape: vec![values.len()],
            data: T::wrap(values),
        }
    }

    /// Create a rank-2 array from nested rows; all rows must have equal length
    pub fn from_nested2<T: Element>(rows: Vec<Vec<T>>) -> Result<Self> {
        let inner = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * inner);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != inner {
                return Err(Error::Shape(format!(
                    "Row {i} has length {}, expected {inner}",
                    row.len()
                )));
            }
        }
        let outer = rows.len();
        for row in rows {
            flat.extend(row);
        }
        Ok(Self {
            shape: vec![outer, inner],
            data: T::wrap(flat),
        })
    }

    /// Create a rank-3 array from nested planes; the shape must be rectangular
    pub fn from_nested3<T: Element>(planes: Vec<Vec<Vec<T>>>) -> Result<Self> {
        let rows = planes.first().map_or(0, Vec::len);
        let cols = planes
            .first()
            .and_then(|plane| plane.first())
            .map_or(0, Vec::len);
        for (i, plane) in planes.iter().enumerate() {
            if plane.len() != rows {
                return Err(Error::Shape(format!(
                    "Plane {i} has {} rows, expected {rows}",
                    plane.len()
                )));
            }
            for (j, row) in plane.iter().enumerate() {
                if row.len() != cols {
                    return Err(Error::Shape(format!(
                        "Row [{i}][{j}] has length {}, expected {cols}",
                        row.len()
                    )));
                }
            }
        }
        let outer = planes.len();
        let flat: Vec<T> = planes.into_iter().flatten().flatten().collect();
        Ok(Self {
            shape: vec![outer, rows, cols],
            data: T::wrap(flat),
        })
    }

    /// Create an array from a shape and flat row-major storage
    pub fn from_parts(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::Shape(format!(
                "Shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Create an empty rank-1 array of the given kind
    pub fn empty(kind: ElementKind) -> Self {
        Self {
            shape: vec![0],
            data: ArrayData::new(kind),
        }
    }

    /// Create an array with zero rows whose rows would have shape `inner`
    pub fn empty_with_shape(kind: ElementKind, inner: &[usize]) -> Self {
        let mut shape = Vec::with_capacity(inner.len() + 1);
        shape.push(0);
        shape.extend_from_slice(inner);
        Self {
            shape,
            data: ArrayData::new(kind),
        }
    }

    /// Stack equally shaped arrays of the given kind along a new leading axis
    pub fn stack(kind: ElementKind, rows: &[NdArray]) -> Result<Self> {
        let inner = rows.first().map(|row| row.shape.clone()).unwrap_or_default();
        let mut data = ArrayData::with_capacity(kind, rows.iter().map(NdArray::size).sum());
        for (i, row) in rows.iter().enumerate() {
            if !kind.accepts(row.kind()) {
                return Err(Error::Conversion(format!(
                    "Row {i} has kind {}, expected {kind}",
                    row.kind()
                )));
            }
            if row.shape != inner {
                return Err(Error::Shape(format!(
                    "Row {i} has shape {:?}, expected {inner:?}",
                    row.shape
                )));
            }
            data.extend_from(&row.data)?;
        }
        let mut shape = Vec::with_capacity(inner.len() + 1);
        shape.push(rows.len());
        shape.extend(inner);
        Ok(Self { shape, data })
    }

    /// Shape of this array
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Element kind of this array
    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    /// Length along the leading axis (1 for a rank-0 array)
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Whether the leading axis has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of elements
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Flat element storage
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Consume the array, returning its shape and flat storage
    pub fn into_parts(self) -> (Vec<usize>, ArrayData) {
        (self.shape, self.data)
    }

    /// Borrow the flat elements as `T`, if the kind matches
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::view(&self.data)
    }

    /// The single value of a rank-0 array
    pub fn scalar_value(&self) -> Option<Scalar> {
        if self.rank() == 0 {
            self.data.get(0)
        } else {
            None
        }
    }

    /// Sub-array at position `index` along the leading axis
    pub fn get(&self, index: usize) -> Result<NdArray> {
        if self.rank() == 0 || index >= self.len() {
            return Err(Error::Index {
                index: isize::try_from(index).unwrap_or(isize::MAX),
                len: if self.rank() == 0 { 0 } else { self.len() },
            });
        }
        self.slice_rows(index, index + 1).map(|rows| {
            let (mut shape, data) = rows.into_parts();
            shape.remove(0);
            NdArray { shape, data }
        })
    }

    /// Rows `start..end` along the leading axis, keeping the rank
    pub fn slice_rows(&self, start: usize, end: usize) -> Result<NdArray> {
        if self.rank() == 0 || start > end || end > self.len() {
            return Err(Error::Index {
                index: isize::try_from(end).unwrap_or(isize::MAX),
                len: self.len(),
            });
        }
        let row_size: usize = self.shape[1..].iter().product();
        let mut shape = self.shape.clone();
        shape[0] = end - start;
        Ok(NdArray {
            shape,
            data: self.data.slice(start * row_size, end * row_size),
        })
    }

    /// Iterate over the sub-arrays along the leading axis
    pub fn rows(&self) -> impl Iterator<Item = NdArray> + '_ {
        let count = if self.rank() == 0 { 0 } else { self.len() };
        (0..count).filter_map(move |i| self.get(i).ok())
    }

    /// Estimated heap memory used by this array
    pub fn memory_usage(&self) -> usize {
        self.data.memory_usage() + self.shape.len() * std::mem::size_of::<usize>()
    }
}

/// One row of data before columnar regrouping: an ordered set of named values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, NdArray)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<NdArray>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a named value
    pub fn insert(&mut self, name: &str, value: impl Into<NdArray>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Borrow a named value
    pub fn get(&self, name: &str) -> Option<&NdArray> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Remove and return a named value
    pub fn take(&mut self, name: &str) -> Option<NdArray> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Field names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
