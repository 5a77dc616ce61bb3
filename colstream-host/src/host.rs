//! Host-visible values: dynamic scalars, lists, mappings and dtype-tagged arrays
//!
//! Numeric arrays keep their elements as a raw native-endian byte buffer
//! tagged with a [`DType`], the same layout a host array library exposes.
//! `str` and `object` arrays hold a list of host values instead. An `empty`
//! array carries no elements and no element type.

use std::collections::BTreeMap;
use std::fmt;
use std::mem::size_of;

use bytemuck::Pod;
use colstream_core::{Error, ObjectRef, Result};

/// Element type tag of a host array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Booleans stored one byte each
    Bool,

    /// 8-bit unsigned integers
    UInt8,

    /// 32-bit signed integers
    Int32,

    /// 64-bit signed integers
    Int64,

    /// 32-bit floats
    Float32,

    /// 64-bit floats
    Float64,

    /// Unicode strings
    Str,

    /// References to arbitrary host values
    Object,

    /// No element type; arrays of this dtype hold zero elements
    Empty,
}

impl DType {
    /// Size of one element in the byte buffer, or `None` for element-list dtypes
    pub fn item_size(self) -> Option<usize> {
        match self {
            DType::Bool | DType::UInt8 => Some(1),
            DType::Int32 | DType::Float32 => Some(4),
            DType::Int64 | DType::Float64 => Some(8),
            DType::Empty => Some(0),
            DType::Str | DType::Object => None,
        }
    }

    /// Host name of this dtype
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::UInt8 => "uint8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Str => "str",
            DType::Object => "object",
            DType::Empty => "empty",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Plain numeric types that can back a host array byte buffer
pub trait HostNumeric: Pod {
    /// Dtype tag for this type
    const DTYPE: DType;

    /// Convert one element into a host scalar
    fn into_host(self) -> HostValue;
}

macro_rules! impl_host_numeric {
    ($ty:ty, $dtype:ident, $variant:ident, $wide:ty) => {
        impl HostNumeric for $ty {
            const DTYPE: DType = DType::$dtype;

            fn into_host(self) -> HostValue {
                HostValue::$variant(<$wide>::from(self))
            }
        }
    };
}

impl_host_numeric!(u8, UInt8, Int, i64);
impl_host_numeric!(i32, Int32, Int, i64);
impl_host_numeric!(i64, Int64, Int, i64);
impl_host_numeric!(f32, Float32, Float, f64);
impl_host_numeric!(f64, Float64, Float, f64);

/// Element storage of a host array
#[derive(Debug, Clone, PartialEq)]
pub enum HostBuffer {
    /// Raw native-endian element bytes of a numeric or boolean array
    Bytes(Vec<u8>),

    /// Elements of a `str` or `object` array
    Elements(Vec<HostValue>),
}

/// A host array: dtype, shape and flat row-major storage
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    dtype: DType,
    shape: Vec<usize>,
    buffer: HostBuffer,
}

impl HostArray {
    /// Create an array, checking that the buffer fits the dtype and shape
    pub fn new(dtype: DType, shape: Vec<usize>, buffer: HostBuffer) -> Result<Self> {
        let size: usize = shape.iter().product();
        match (dtype.item_size(), &buffer) {
            (Some(item), HostBuffer::Bytes(bytes)) => {
                if bytes.len() != size * item {
                    return Err(Error::Conversion(format!(
                        "{dtype} array of shape {shape:?} needs {} bytes, got {}",
                        size * item,
                        bytes.len()
                    )));
                }
                if dtype == DType::Empty && size != 0 {
                    return Err(Error::Conversion(format!(
                        "empty array cannot have shape {shape:?}"
                    )));
                }
                if dtype == DType::Bool && bytes.iter().any(|&b| b > 1) {
                    return Err(Error::Conversion("bool array holds a byte other than 0 or 1".into()));
                }
            }
            (None, HostBuffer::Elements(elements)) => {
                if elements.len() != size {
                    return Err(Error::Conversion(format!(
                        "{dtype} array of shape {shape:?} needs {size} elements, got {}",
                        elements.len()
                    )));
                }
                if dtype == DType::Str && !elements.iter().all(|e| matches!(e, HostValue::Str(_))) {
                    return Err(Error::Conversion("str array holds a non-string element".into()));
                }
            }
            _ => {
                return Err(Error::Conversion(format!(
                    "{dtype} array cannot be backed by this buffer"
                )))
            }
        }
        Ok(Self {
            dtype,
            shape,
            buffer,
        })
    }

    /// Create a numeric array by copying `values` into a byte buffer
    pub fn from_numeric<T: HostNumeric>(shape: Vec<usize>, values: &[T]) -> Result<Self> {
        let bytes = bytemuck::cast_slice::<T, u8>(values).to_vec();
        Self::new(T::DTYPE, shape, HostBuffer::Bytes(bytes))
    }

    /// Create a boolean array
    pub fn from_bools(shape: Vec<usize>, values: &[bool]) -> Result<Self> {
        let bytes = values.iter().map(|&b| u8::from(b)).collect();
        Self::new(DType::Bool, shape, HostBuffer::Bytes(bytes))
    }

    /// Create a `str` or `object` array from host elements
    pub fn from_elements(dtype: DType, shape: Vec<usize>, elements: Vec<HostValue>) -> Result<Self> {
        Self::new(dtype, shape, HostBuffer::Elements(elements))
    }

    /// Create an empty one-dimensional array of the given dtype
    pub fn empty(dtype: DType) -> Self {
        let buffer = match dtype.item_size() {
            Some(_) => HostBuffer::Bytes(Vec::new()),
            None => HostBuffer::Elements(Vec::new()),
        };
        Self {
            dtype,
            shape: vec![0],
            buffer,
        }
    }

    /// Element type tag
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Shape of the array
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Length along the leading axis (1 for a 0-d array)
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Whether the leading axis is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw element bytes of a numeric or boolean array
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.buffer {
            HostBuffer::Bytes(bytes) => Some(bytes),
            HostBuffer::Elements(_) => None,
        }
    }

    /// Elements of a `str` or `object` array
    pub fn elements(&self) -> Option<&[HostValue]> {
        match &self.buffer {
            HostBuffer::Elements(elements) => Some(elements),
            HostBuffer::Bytes(_) => None,
        }
    }

    /// Decode the elements of a numeric array of dtype `T::DTYPE`
    pub fn to_numeric<T: HostNumeric>(&self) -> Result<Vec<T>> {
        match (&self.buffer, self.dtype == T::DTYPE) {
            (HostBuffer::Bytes(bytes), true) => Ok(bytes
                .chunks_exact(size_of::<T>())
                .map(bytemuck::pod_read_unaligned::<T>)
                .collect()),
            _ => Err(Error::Conversion(format!(
                "cannot read a {} array as {}",
                self.dtype,
                T::DTYPE
            ))),
        }
    }

    /// Decode the elements of a boolean array
    pub fn to_bools(&self) -> Result<Vec<bool>> {
        match (&self.buffer, self.dtype) {
            (HostBuffer::Bytes(bytes), DType::Bool) => Ok(bytes.iter().map(|&b| b != 0).collect()),
            _ => Err(Error::Conversion(format!("cannot read a {} array as bool", self.dtype))),
        }
    }

    /// Element at a flat row-major position, as a host scalar
    pub fn item(&self, index: usize) -> Option<HostValue> {
        if index >= self.size() {
            return None;
        }
        match &self.buffer {
            HostBuffer::Elements(elements) => elements.get(index).cloned(),
            HostBuffer::Bytes(bytes) => {
                let item = self.dtype.item_size()?;
                let raw = &bytes[index * item..(index + 1) * item];
                Some(match self.dtype {
                    DType::Bool => HostValue::Bool(raw[0] != 0),
                    DType::UInt8 => raw[0].into_host(),
                    DType::Int32 => bytemuck::pod_read_unaligned::<i32>(raw).into_host(),
                    DType::Int64 => bytemuck::pod_read_unaligned::<i64>(raw).into_host(),
                    DType::Float32 => bytemuck::pod_read_unaligned::<f32>(raw).into_host(),
                    DType::Float64 => bytemuck::pod_read_unaligned::<f64>(raw).into_host(),
                    DType::Str | DType::Object | DType::Empty => return None,
                })
            }
        }
    }

    /// Iterate over all elements as host scalars
    pub fn items(&self) -> impl Iterator<Item = HostValue> + '_ {
        (0..self.size()).filter_map(move |i| self.item(i))
    }

    /// Consume the array, returning dtype, shape and storage
    pub fn into_parts(self) -> (DType, Vec<usize>, HostBuffer) {
        (self.dtype, self.shape, self.buffer)
    }
}

/// A dynamically typed host value
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Absence of a value
    None,

    /// Boolean
    Bool(bool),

    /// Integer of any width
    Int(i64),

    /// Floating point number
    Float(f64),

    /// String
    Str(String),

    /// Reference to an opaque value
    Object(ObjectRef),

    /// Ordered list of values
    List(Vec<HostValue>),

    /// Mapping from string keys to values
    Dict(BTreeMap<String, HostValue>),

    /// Dtype-tagged array
    Array(HostArray),
}

impl HostValue {
    /// Host type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::None => "None",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "str",
            HostValue::Object(_) => "object",
            HostValue::List(_) => "list",
            HostValue::Dict(_) => "dict",
            HostValue::Array(_) => "ndarray",
        }
    }

    /// Borrow as an array
    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Borrow as a list
    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a mapping
    pub fn as_dict(&self) -> Option<&BTreeMap<String, HostValue>> {
        match self {
            HostValue::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow as an object reference
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            HostValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Look up a key of a mapping
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.as_dict().and_then(|map| map.get(key))
    }
}

impl From<HostArray> for HostValue {
    fn from(array: HostArray) -> Self {
        HostValue::Array(array)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::List(items)
    }
}
