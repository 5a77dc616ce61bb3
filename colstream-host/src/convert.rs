//! Kind-directed conversion between typed containers and host values
//!
//! Every element kind maps to exactly one host dtype:
//!
//! | kind                   | host dtype                        |
//! |------------------------|-----------------------------------|
//! | `Bool`                 | `bool`                            |
//! | `UInt8` .. `Float64`   | the numeric dtype of the same width |
//! | `Empty`                | `empty`                           |
//! | `Char`                 | `object` of one-character strings |
//! | `Str`                  | `str`                             |
//! | `Object`               | `object` holding the references   |
//!
//! Conversions are pure functions of their input. Narrowing that would lose
//! a value (an integer without an exact float image, a float overflowing
//! `float32`) is a conversion error.

use std::collections::BTreeMap;
use std::sync::Arc;

use colstream_core::{
    ArrayData, Batch, Column, ElementKind, Error, NdArray, ObjectRef, Range, Result, Scalar,
    Schema,
};
use tracing::trace;

use crate::host::{DType, HostArray, HostBuffer, HostValue};

/// Render a typed array as a dtype-tagged host array
pub fn to_host(value: &NdArray) -> Result<HostValue> {
    let shape = value.shape().to_vec();
    let array = match value.data() {
        ArrayData::Empty => HostArray::new(DType::Empty, shape, HostBuffer::Bytes(Vec::new()))?,
        ArrayData::Bool(v) => HostArray::from_bools(shape, v)?,
        ArrayData::UInt8(v) => HostArray::from_numeric(shape, v)?,
        ArrayData::Int32(v) => HostArray::from_numeric(shape, v)?,
        ArrayData::Int64(v) => HostArray::from_numeric(shape, v)?,
        ArrayData::Float32(v) => HostArray::from_numeric(shape, v)?,
        ArrayData::Float64(v) => HostArray::from_numeric(shape, v)?,
        ArrayData::Char(v) => HostArray::from_elements(
            DType::Object,
            shape,
            v.iter().map(|c| HostValue::Str(c.to_string())).collect(),
        )?,
        ArrayData::Str(v) => HostArray::from_elements(
            DType::Str,
            shape,
            v.iter().cloned().map(HostValue::Str).collect(),
        )?,
        ArrayData::Object(v) => {
            HostArray::from_elements(DType::Object, shape, v.iter().map(object_to_host).collect())?
        }
    };
    Ok(HostValue::Array(array))
}

/// Render a typed array as plain host scalars and nested lists
pub fn to_host_list(value: &NdArray) -> HostValue {
    match value.scalar_value() {
        Some(scalar) => scalar_to_host(scalar),
        None => HostValue::List(value.rows().map(|row| to_host_list(&row)).collect()),
    }
}

/// Convert a host value into a typed array, inferring the element kind
pub fn from_host(value: &HostValue) -> Result<NdArray> {
    convert(value, None)
}

/// Convert a host value into a typed array of the requested element kind
pub fn from_host_as(value: &HostValue, kind: ElementKind) -> Result<NdArray> {
    match kind {
        ElementKind::Empty => convert(value, None),
        kind => convert(value, Some(kind)),
    }
}

/// Render every column of a batch; keys equal the column names
pub fn batch_to_host(batch: &Batch) -> Result<HostValue> {
    let mut map = BTreeMap::new();
    for column in batch.columns() {
        map.insert(column.name().to_string(), to_host(column.array())?);
    }
    trace!(columns = map.len(), rows = batch.row_count(), "converted batch");
    Ok(HostValue::Dict(map))
}

/// Build a batch from a host mapping whose key set equals the schema's columns
pub fn columns_from_host(value: &HostValue, schema: Arc<Schema>) -> Result<Batch> {
    let map = value.as_dict().ok_or_else(|| {
        Error::Conversion(format!("expected a dict of columns, got {}", value.type_name()))
    })?;
    if let Some(extra) = map.keys().find(|key| !schema.contains(key)) {
        return Err(Error::Schema(format!("Unexpected column: {extra}")));
    }

    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let host = map
                .get(field.name())
                .ok_or_else(|| Error::Schema(format!("Column not found: {}", field.name())))?;
            Column::new(field.name(), from_host_as(host, field.kind())?)
        })
        .collect::<Result<Vec<_>>>()?;
    Batch::new(schema, columns)
}

/// Lazily render every batch of a stream
pub fn stream_to_host(stream: &Range<Batch>) -> Range<HostValue> {
    stream.try_map(|batch| batch_to_host(&batch))
}

fn object_to_host(object: &ObjectRef) -> HostValue {
    // host values wrapped on the way in are handed back as they were
    match object.downcast_ref::<HostValue>() {
        Some(value) => value.clone(),
        None => HostValue::Object(object.clone()),
    }
}

fn scalar_to_host(scalar: Scalar) -> HostValue {
    match scalar {
        Scalar::Bool(v) => HostValue::Bool(v),
        Scalar::UInt8(v) => HostValue::Int(i64::from(v)),
        Scalar::Int32(v) => HostValue::Int(i64::from(v)),
        Scalar::Int64(v) => HostValue::Int(v),
        Scalar::Float32(v) => HostValue::Float(f64::from(v)),
        Scalar::Float64(v) => HostValue::Float(v),
        Scalar::Char(v) => HostValue::Str(v.to_string()),
        Scalar::Str(v) => HostValue::Str(v),
        Scalar::Object(v) => object_to_host(&v),
    }
}

fn convert(value: &HostValue, target: Option<ElementKind>) -> Result<NdArray> {
    match value {
        HostValue::Array(array) => array_from_host(array, target),
        HostValue::List(_) => list_from_host(value, target),
        HostValue::None | HostValue::Dict(_) => Err(Error::Conversion(format!(
            "cannot convert {} to a typed array",
            value.type_name()
        ))),
        leaf => {
            let kind = match target {
                Some(kind) => kind,
                None => leaf_kind(leaf)?,
            };
            Ok(NdArray::from(scalar_from_host(leaf, kind)?))
        }
    }
}

/// Element kind a single host leaf infers to
fn leaf_kind(value: &HostValue) -> Result<ElementKind> {
    match value {
        HostValue::Bool(_) => Ok(ElementKind::Bool),
        HostValue::Int(_) => Ok(ElementKind::Int32),
        HostValue::Float(_) => Ok(ElementKind::Float64),
        HostValue::Str(s) if s.chars().count() == 1 => Ok(ElementKind::Char),
        HostValue::Str(_) => Ok(ElementKind::Str),
        HostValue::Object(_) => Ok(ElementKind::Object),
        other => Err(Error::Conversion(format!(
            "unsupported element of type {}",
            other.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn int_to_float32(v: i64) -> Result<f32> {
    let narrowed = v as f32;
    if narrowed as i128 == i128::from(v) {
        Ok(narrowed)
    } else {
        Err(Error::Conversion(format!("integer {v} has no exact float32 value")))
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn int_to_float64(v: i64) -> Result<f64> {
    let widened = v as f64;
    if widened as i128 == i128::from(v) {
        Ok(widened)
    } else {
        Err(Error::Conversion(format!("integer {v} has no exact float64 value")))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_float32(v: f64) -> Result<f32> {
    let narrowed = v as f32;
    if v.is_finite() && !narrowed.is_finite() {
        Err(Error::Conversion(format!("{v} overflows float32")))
    } else {
        Ok(narrowed)
    }
}

fn scalar_from_host(value: &HostValue, kind: ElementKind) -> Result<Scalar> {
    let out_of_range = |v: i64| Error::Conversion(format!("integer {v} does not fit in {kind}"));
    match (value, kind) {
        (HostValue::Bool(v), ElementKind::Bool) => Ok(Scalar::Bool(*v)),
        (HostValue::Int(v), ElementKind::UInt8) => {
            u8::try_from(*v).map(Scalar::UInt8).map_err(|_| out_of_range(*v))
        }
        (HostValue::Int(v), ElementKind::Int32) => {
            i32::try_from(*v).map(Scalar::Int32).map_err(|_| out_of_range(*v))
        }
        (HostValue::Int(v), ElementKind::Int64) => Ok(Scalar::Int64(*v)),
        (HostValue::Int(v), ElementKind::Float32) => int_to_float32(*v).map(Scalar::Float32),
        (HostValue::Int(v), ElementKind::Float64) => int_to_float64(*v).map(Scalar::Float64),
        (HostValue::Float(v), ElementKind::Float32) => float_to_float32(*v).map(Scalar::Float32),
        (HostValue::Float(v), ElementKind::Float64) => Ok(Scalar::Float64(*v)),
        (HostValue::Str(s), ElementKind::Char) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Scalar::Char(c)),
                _ => Err(Error::Conversion(format!("{s:?} is not a single character"))),
            }
        }
        (HostValue::Str(s), ElementKind::Str) => Ok(Scalar::Str(s.clone())),
        (HostValue::Object(o), ElementKind::Object) => Ok(Scalar::Object(o.clone())),
        // any other host value is kept whole behind a reference
        (other, ElementKind::Object) => Ok(Scalar::Object(ObjectRef::new(other.clone()))),
        (other, kind) => Err(Error::Conversion(format!(
            "cannot convert {} to {kind}",
            other.type_name()
        ))),
    }
}

/// Shape of a nested list, following the first element at every level
fn nested_shape(value: &HostValue) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut current = value;
    while let HostValue::List(items) = current {
        shape.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    shape
}

/// Collect the leaves of a nested list, rejecting jagged nesting
fn collect_leaves<'a>(
    value: &'a HostValue,
    shape: &[usize],
    depth: usize,
    leaves: &mut Vec<&'a HostValue>,
) -> Result<()> {
    match (value, shape.get(depth)) {
        (HostValue::List(items), Some(&len)) if items.len() == len => {
            for item in items {
                collect_leaves(item, shape, depth + 1, leaves)?;
            }
            Ok(())
        }
        (HostValue::List(items), Some(&len)) => Err(Error::Conversion(format!(
            "jagged list: expected {len} elements at depth {depth}, got {}",
            items.len()
        ))),
        (HostValue::List(_), None) | (_, Some(_)) => Err(Error::Conversion(format!(
            "jagged list: inconsistent nesting at depth {depth}"
        ))),
        (leaf, None) => {
            leaves.push(leaf);
            Ok(())
        }
    }
}

fn list_from_host(value: &HostValue, target: Option<ElementKind>) -> Result<NdArray> {
    let shape = nested_shape(value);
    let mut leaves = Vec::new();
    collect_leaves(value, &shape, 0, &mut leaves)?;

    let kind = match target {
        Some(kind) => kind,
        None => infer_kind(&leaves)?,
    };
    let mut data = ArrayData::with_capacity(kind, leaves.len());
    for leaf in leaves {
        data.push(scalar_from_host(leaf, kind)?)?;
    }
    NdArray::from_parts(shape, data)
}

/// Element kind shared by all leaves; strings of mixed length widen to `Str`
fn infer_kind(leaves: &[&HostValue]) -> Result<ElementKind> {
    let mut inferred = ElementKind::Empty;
    for leaf in leaves {
        let kind = leaf_kind(leaf)?;
        inferred = match (inferred, kind) {
            (ElementKind::Empty, kind) => kind,
            (a, b) if a == b => a,
            (ElementKind::Char | ElementKind::Str, ElementKind::Char | ElementKind::Str) => {
                ElementKind::Str
            }
            (a, b) => {
                return Err(Error::Conversion(format!(
                    "mixed element types {a} and {b} in one list"
                )))
            }
        };
    }
    Ok(inferred)
}

fn array_from_host(array: &HostArray, target: Option<ElementKind>) -> Result<NdArray> {
    let shape = array.shape().to_vec();
    let natural = match array.dtype() {
        DType::Bool => ElementKind::Bool,
        DType::UInt8 => ElementKind::UInt8,
        DType::Int32 => ElementKind::Int32,
        DType::Int64 => ElementKind::Int64,
        DType::Float32 => ElementKind::Float32,
        DType::Float64 => ElementKind::Float64,
        DType::Str => ElementKind::Str,
        DType::Object => infer_object_kind(array.elements().unwrap_or(&[])),
        DType::Empty => ElementKind::Empty,
    };

    let data = match (array.dtype(), target.unwrap_or(natural)) {
        (DType::Bool, ElementKind::Bool) => ArrayData::Bool(array.to_bools()?),
        (DType::UInt8, ElementKind::UInt8) => ArrayData::UInt8(array.to_numeric()?),
        (DType::Int32, ElementKind::Int32) => ArrayData::Int32(array.to_numeric()?),
        (DType::Int64, ElementKind::Int64) => ArrayData::Int64(array.to_numeric()?),
        (DType::Float32, ElementKind::Float32) => ArrayData::Float32(array.to_numeric()?),
        (DType::Float64, ElementKind::Float64) => ArrayData::Float64(array.to_numeric()?),
        (DType::Empty, kind) => ArrayData::new(kind),
        (DType::Str | DType::Object, kind) => {
            let elements = array.elements().unwrap_or(&[]);
            let mut data = ArrayData::with_capacity(kind, elements.len());
            for element in elements {
                data.push(scalar_from_host(element, kind)?)?;
            }
            data
        }
        (dtype, kind) => {
            return Err(Error::Conversion(format!(
                "cannot read a {dtype} array as {kind}"
            )))
        }
    };
    NdArray::from_parts(shape, data)
}

/// An object array of one-character strings holds characters
fn infer_object_kind(elements: &[HostValue]) -> ElementKind {
    let all_chars = !elements.is_empty()
        && elements
            .iter()
            .all(|e| matches!(e, HostValue::Str(s) if s.chars().count() == 1));
    if all_chars {
        ElementKind::Char
    } else {
        ElementKind::Object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colstream_core::{create_stream, Field, InMemorySource, Record, StreamConfig};
    use test_case::test_case;

    struct IntWrap {
        num: i32,
    }

    fn host_list(values: Vec<HostValue>) -> HostValue {
        HostValue::List(values)
    }

    #[test_case(ElementKind::Bool, DType::Bool ; "bool")]
    #[test_case(ElementKind::Char, DType::Object ; "char")]
    #[test_case(ElementKind::Int32, DType::Int32 ; "int32")]
    #[test_case(ElementKind::Float64, DType::Float64 ; "double")]
    #[test_case(ElementKind::Object, DType::Object ; "object")]
    #[test_case(ElementKind::Str, DType::Str ; "string")]
    #[test_case(ElementKind::Empty, DType::Empty ; "no kind")]
    fn test_empty_keeps_dtype(kind: ElementKind, dtype: DType) {
        let host = to_host(&NdArray::empty(kind)).unwrap();
        let array = host.as_array().unwrap();
        assert_eq!(array.len(), 0);
        assert_eq!(array.dtype(), dtype);
    }

    #[test]
    fn test_typed_vectors() {
        let chars = to_host(&NdArray::from_vec("oops!".chars().collect::<Vec<char>>())).unwrap();
        let chars = chars.as_array().unwrap();
        assert_eq!(chars.dtype(), DType::Object);
        assert_eq!(
            chars.items().collect::<Vec<_>>(),
            "oops!".chars().map(|c| HostValue::Str(c.to_string())).collect::<Vec<_>>()
        );

        let ints = to_host(&NdArray::from_vec(vec![-1, 0, 1, 2, 3])).unwrap();
        let ints = ints.as_array().unwrap();
        assert_eq!(ints.dtype(), DType::Int32);
        assert_eq!(ints.to_numeric::<i32>().unwrap(), vec![-1, 0, 1, 2, 3]);

        let doubles = to_host(&NdArray::from_vec(vec![-1.5, -0.5, 0.5, 1.5, 2.5])).unwrap();
        let doubles = doubles.as_array().unwrap();
        assert_eq!(doubles.dtype(), DType::Float64);
        assert_eq!(doubles.to_numeric::<f64>().unwrap(), vec![-1.5, -0.5, 0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_object_identity() {
        let objects: Vec<ObjectRef> = (1..=3).map(|num| ObjectRef::new(IntWrap { num })).collect();
        let host = to_host(&NdArray::from_vec(objects.clone())).unwrap();
        let array = host.as_array().unwrap();
        assert_eq!(array.dtype(), DType::Object);
        assert_eq!(array.len(), 3);
        for (i, element) in array.items().enumerate() {
            let object = element.as_object().unwrap();
            assert!(object.ptr_eq(&objects[i]));
            assert_eq!(object.downcast_ref::<IntWrap>().unwrap().num, i32::try_from(i).unwrap() + 1);
        }
    }

    #[test]
    fn test_nested_lists_keep_shape() {
        let vec2d = NdArray::from_nested2(vec![vec![1, 2, 3]; 3]).unwrap();
        let list = to_host_list(&vec2d);
        let row = host_list(vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);
        assert_eq!(list, host_list(vec![row.clone(), row.clone(), row]));
        assert_eq!(from_host(&list).unwrap(), vec2d);

        let empty = to_host_list(&NdArray::empty(ElementKind::Int32));
        assert_eq!(empty, host_list(Vec::new()));
        assert_eq!(to_host_list(&NdArray::from(2.5)), HostValue::Float(2.5));
    }

    #[test]
    fn test_list_inference() {
        let bools = host_list(vec![true.into(), false.into()]);
        assert_eq!(from_host(&bools).unwrap(), NdArray::from_vec(vec![true, false]));

        let chars = host_list(vec!["a".into(), "b".into()]);
        assert_eq!(from_host(&chars).unwrap().kind(), ElementKind::Char);

        let strings = host_list(vec!["a".into(), "bc".into()]);
        assert_eq!(from_host(&strings).unwrap(), NdArray::from_vec(vec!["a".to_string(), "bc".into()]));

        let empty = from_host(&host_list(Vec::new())).unwrap();
        assert_eq!(empty.kind(), ElementKind::Empty);
        assert_eq!(empty.shape(), &[0]);
    }

    #[test]
    fn test_conversion_errors() {
        let jagged = host_list(vec![
            host_list(vec![HostValue::Int(1), HostValue::Int(2)]),
            host_list(vec![HostValue::Int(3)]),
        ]);
        assert!(matches!(from_host(&jagged), Err(Error::Conversion(_))));

        let uneven_depth = host_list(vec![host_list(vec![HostValue::Int(1)]), HostValue::Int(2)]);
        assert!(matches!(from_host(&uneven_depth), Err(Error::Conversion(_))));

        let mixed = host_list(vec![HostValue::Int(1), HostValue::Float(2.0)]);
        assert!(matches!(from_host(&mixed), Err(Error::Conversion(_))));

        let wide = host_list(vec![HostValue::Int(i64::from(i32::MAX) + 1)]);
        assert!(matches!(from_host(&wide), Err(Error::Conversion(_))));
        assert_eq!(from_host_as(&wide, ElementKind::Int64).unwrap().kind(), ElementKind::Int64);

        assert!(matches!(from_host(&HostValue::None), Err(Error::Conversion(_))));
        let nested_none = host_list(vec![HostValue::None]);
        assert!(matches!(from_host(&nested_none), Err(Error::Conversion(_))));

        let ints = to_host(&NdArray::from_vec(vec![1, 2])).unwrap();
        assert!(matches!(from_host_as(&ints, ElementKind::Float64), Err(Error::Conversion(_))));
    }

    #[test]
    fn test_forced_kinds() {
        let empty_objects = HostValue::Array(HostArray::empty(DType::Object));
        assert_eq!(from_host(&empty_objects).unwrap().kind(), ElementKind::Object);
        assert_eq!(from_host_as(&empty_objects, ElementKind::Char).unwrap(), NdArray::empty(ElementKind::Char));

        let pixels = host_list(vec![HostValue::Int(0), HostValue::Int(255)]);
        assert_eq!(from_host_as(&pixels, ElementKind::UInt8).unwrap(), NdArray::from_vec(vec![0u8, 255]));
        let overflow = host_list(vec![HostValue::Int(256)]);
        assert!(from_host_as(&overflow, ElementKind::UInt8).is_err());
    }

    #[test]
    fn test_wrapped_host_objects_round_trip() {
        let elements = vec![HostValue::Int(7), HostValue::Str("seven".into())];
        let host = HostValue::Array(HostArray::from_elements(DType::Object, vec![2], elements).unwrap());
        let typed = from_host(&host).unwrap();
        assert_eq!(typed.kind(), ElementKind::Object);
        assert_eq!(to_host(&typed).unwrap(), host);
    }

    #[test]
    fn test_object_arrays_keep_any_host_value() {
        let mut dict = BTreeMap::new();
        dict.insert("x".to_string(), HostValue::Float(0.5));
        let elements = vec![
            HostValue::None,
            host_list(vec![HostValue::Int(1)]),
            HostValue::Dict(dict),
            to_host(&NdArray::from_vec(vec![1u8, 2])).unwrap(),
        ];
        let host = HostValue::Array(HostArray::from_elements(DType::Object, vec![4], elements).unwrap());
        let typed = from_host(&host).unwrap();
        assert_eq!(typed.kind(), ElementKind::Object);
        assert_eq!(typed.shape(), &[4]);
        assert_eq!(to_host(&typed).unwrap(), host);

        let forced = from_host_as(&host_list(vec![HostValue::None]), ElementKind::Object).unwrap();
        assert_eq!(to_host_list(&forced), host_list(vec![HostValue::None]));
    }

    #[test]
    fn test_empty_kind_round_trip() {
        for shape in [vec![0], vec![0, 3], vec![2, 0]] {
            let empty = NdArray::from_parts(shape.clone(), ArrayData::Empty).unwrap();
            let host = to_host(&empty).unwrap();
            assert_eq!(host.as_array().unwrap().dtype(), DType::Empty);
            assert_eq!(host.as_array().unwrap().shape(), shape.as_slice());
            assert_eq!(from_host(&host).unwrap(), empty);
        }

        let host = to_host(&NdArray::empty(ElementKind::Empty)).unwrap();
        assert_eq!(from_host_as(&host, ElementKind::Int32).unwrap(), NdArray::empty(ElementKind::Int32));
    }

    #[test_case(HostValue::Float(1e300), ElementKind::Float32 ; "float overflowing float32")]
    #[test_case(HostValue::Float(-1e39), ElementKind::Float32 ; "negative float overflowing float32")]
    #[test_case(HostValue::Int((1 << 53) + 1), ElementKind::Float64 ; "int beyond float64 mantissa")]
    #[test_case(HostValue::Int(i64::MAX), ElementKind::Float64 ; "int max to float64")]
    #[test_case(HostValue::Int((1 << 24) + 1), ElementKind::Float32 ; "int beyond float32 mantissa")]
    fn test_lossy_narrowing_is_rejected(value: HostValue, kind: ElementKind) {
        let list = host_list(vec![value]);
        assert!(matches!(from_host_as(&list, kind), Err(Error::Conversion(_))));
    }

    #[test]
    fn test_exact_narrowing_is_kept() {
        let ints = host_list(vec![HostValue::Int(1 << 53), HostValue::Int(-3)]);
        assert_eq!(
            from_host_as(&ints, ElementKind::Float64).unwrap(),
            NdArray::from_vec(vec![9_007_199_254_740_992.0, -3.0])
        );
        let floats = host_list(vec![HostValue::Float(0.5), HostValue::Float(f64::INFINITY)]);
        assert_eq!(
            from_host_as(&floats, ElementKind::Float32).unwrap(),
            NdArray::from_vec(vec![0.5f32, f32::INFINITY])
        );
    }

    #[test]
    fn test_columns_round_trip() {
        let schema = Arc::new(
            Schema::new(vec![
                Field::new("Int", ElementKind::Int32),
                Field::new("Double", ElementKind::Float64),
            ])
            .unwrap(),
        );
        let batch = Batch::new(
            Arc::clone(&schema),
            vec![Column::from_vec("Int", vec![1, 2]), Column::from_vec("Double", vec![9.0, 10.0])],
        )
        .unwrap();

        let host = batch_to_host(&batch).unwrap();
        let keys: Vec<&str> = host.as_dict().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Double", "Int"]);
        assert_eq!(host.get("Int").unwrap().as_array().unwrap().to_numeric::<i32>().unwrap(), vec![1, 2]);
        assert_eq!(columns_from_host(&host, Arc::clone(&schema)).unwrap(), batch);

        let mut partial = host.as_dict().unwrap().clone();
        partial.remove("Double");
        let err = columns_from_host(&HostValue::Dict(partial), Arc::clone(&schema)).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        let mut extra = host.as_dict().unwrap().clone();
        extra.insert("labels".into(), host_list(Vec::new()));
        assert!(columns_from_host(&HostValue::Dict(extra), schema).is_err());
    }

    #[test]
    fn test_stream_to_host() {
        let schema = Arc::new(Schema::new(vec![Field::new("Int", ElementKind::Int32)]).unwrap());
        let records = (0..5i32).map(|i| Record::new().with("Int", i)).collect();
        let source = Arc::new(InMemorySource::new(schema, records));
        let stream = create_stream(source, StreamConfig::new(2)).unwrap();

        let host = stream_to_host(&stream);
        assert_eq!(host.len(), Some(3));
        let last = host.at(-1).unwrap();
        assert_eq!(last.get("Int").unwrap().as_array().unwrap().to_numeric::<i32>().unwrap(), vec![4]);
    }
}
