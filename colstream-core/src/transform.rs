//! Batch transforms and their lazy application to batch streams

use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::column::{Column, ColumnBuilder};
use crate::error::{Error, Result};
use crate::random::SharedRng;
use crate::range::Range;
use crate::record_batch::Batch;
use crate::schema::{ElementKind, Field, Schema};
use crate::value::{ArrayData, NdArray};

/// A transformation that processes batches
pub trait BatchTransform: Send + Sync {
    /// Transform a batch
    fn apply(&self, batch: Batch) -> Result<Batch>;

    /// Get the output schema for this transform when applied to the given input schema
    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>>;

    /// Memory usage estimate in bytes
    fn memory_usage(&self) -> usize {
        0
    }
}

/// A chain of transforms that can be executed as a single transform
pub struct TransformChain<T> {
    /// The transforms in this chain
    transforms: Vec<T>,
}

impl<T> TransformChain<T> {
    /// Create a new transform chain
    pub fn new(transforms: Vec<T>) -> Self {
        Self { transforms }
    }

    /// Get a reference to the transforms in this chain
    pub fn transforms(&self) -> &[T] {
        &self.transforms
    }

    /// Append a transform to the end of the chain
    #[must_use]
    pub fn then(mut self, transform: T) -> Self {
        self.transforms.push(transform);
        self
    }
}

impl BatchTransform for TransformChain<Box<dyn BatchTransform>> {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let mut current = batch;

        for transform in &self.transforms {
            current = transform.apply(current)?;
        }

        Ok(current)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        let mut current = Arc::new(input_schema.clone());

        for transform in &self.transforms {
            current = transform.output_schema(&current)?;
        }

        Ok(current)
    }

    fn memory_usage(&self) -> usize {
        self.transforms.iter().map(|t| t.memory_usage()).sum()
    }
}

type RowFn = dyn Fn(&NdArray) -> Result<NdArray> + Send + Sync;

/// Maps every row of one column into a new or replaced column
pub struct MapColumn {
    /// Column read by the function
    from: String,

    /// Column written with the results
    to: Field,

    fun: Arc<RowFn>,
}

impl MapColumn {
    /// Create a transform applying `fun` to each row of `from`, storing the
    /// results under `to`
    pub fn new<F>(from: &str, to: Field, fun: F) -> Self
    where
        F: Fn(&NdArray) -> Result<NdArray> + Send + Sync + 'static,
    {
        Self {
            from: from.to_string(),
            to,
            fun: Arc::new(fun),
        }
    }
}

impl fmt::Debug for MapColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapColumn")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl BatchTransform for MapColumn {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let source = batch.column_by_name(&self.from)?;
        let mut builder = ColumnBuilder::new(&self.to, source.len());
        for row in source.array().rows() {
            builder.push(&(self.fun)(&row)?)?;
        }
        let column = builder.finish()?;
        batch.with_column(self.to.clone(), column)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        input_schema.index_of(&self.from)?;
        Ok(Arc::new(input_schema.with_field(self.to.clone())?))
    }
}

type ColumnsFn = dyn Fn(&[NdArray]) -> Result<Vec<NdArray>> + Send + Sync;

/// Maps a group of columns into a group of new or replaced columns, at a
/// chosen nesting depth.
///
/// With `dim == 0` the function sees whole column arrays. With `dim == 1` it
/// sees one row of every input column at a time, with `dim == 2` one element
/// of every row, and so on. Inputs are walked in lockstep, so they must have
/// equal lengths along each visited axis. The results of every call are
/// stacked back along the visited axes.
pub struct MapColumns {
    from: Vec<String>,
    to: Vec<Field>,
    dim: usize,
    fun: Arc<ColumnsFn>,

    /// Probability of applying `fun`, and the generator rolling the dice
    chance: Option<(f64, SharedRng)>,

    /// Position in `from` of every output, used when the dice roll fails
    passthrough: Vec<usize>,
}

impl MapColumns {
    /// Create a transform applying `fun` to every row of the `from` columns.
    ///
    /// `fun` receives one array per input and returns one array per output.
    pub fn new<F>(from: &[&str], to: Vec<Field>, fun: F) -> Self
    where
        F: Fn(&[NdArray]) -> Result<Vec<NdArray>> + Send + Sync + 'static,
    {
        Self {
            from: from.iter().map(|name| (*name).to_string()).collect(),
            to,
            dim: 1,
            fun: Arc::new(fun),
            chance: None,
            passthrough: Vec::new(),
        }
    }

    /// Apply the function at nesting depth `dim` instead of per row
    #[must_use]
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Apply the function only with probability `prob`; otherwise the outputs
    /// keep the values of the inputs of the same name.
    ///
    /// Every output must therefore also be an input.
    pub fn with_probability(mut self, prob: f64, rng: SharedRng) -> Result<Self> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(Error::InvalidArgument(format!(
                "probability must lie in [0, 1], got {prob}"
            )));
        }
        self.passthrough = self
            .to
            .iter()
            .map(|field| {
                self.from.iter().position(|name| name == field.name()).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "output '{}' of a probabilistic transform must also be an input",
                        field.name()
                    ))
                })
            })
            .collect::<Result<_>>()?;
        self.chance = Some((prob, rng));
        Ok(self)
    }

    fn call(&self, inputs: &[NdArray]) -> Result<Vec<NdArray>> {
        if let Some((prob, rng)) = &self.chance {
            if !rng.with(|rng| rng.gen_bool(*prob)) {
                return Ok(self.passthrough.iter().map(|&i| inputs[i].clone()).collect());
            }
        }
        let results = (self.fun)(inputs)?;
        if results.len() != self.to.len() {
            return Err(Error::InvalidArgument(format!(
                "transform returned {} arrays for {} outputs",
                results.len(),
                self.to.len()
            )));
        }
        self.to
            .iter()
            .zip(results)
            .map(|(field, array)| conform(field.kind(), array))
            .collect()
    }

    fn map_at_depth(&self, inputs: &[NdArray], depth: usize) -> Result<Vec<NdArray>> {
        if depth == 0 {
            return self.call(inputs);
        }
        let len = lockstep_len(inputs)?;
        let mut stacked: Vec<Vec<NdArray>> = self.to.iter().map(|_| Vec::with_capacity(len)).collect();
        for i in 0..len {
            let row = inputs.iter().map(|array| array.get(i)).collect::<Result<Vec<_>>>()?;
            for (rows, value) in stacked.iter_mut().zip(self.map_at_depth(&row, depth - 1)?) {
                rows.push(value);
            }
        }
        self.to
            .iter()
            .zip(stacked)
            .map(|(field, rows)| NdArray::stack(field.kind(), &rows))
            .collect()
    }
}

impl fmt::Debug for MapColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapColumns")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("dim", &self.dim)
            .field("probability", &self.chance.as_ref().map(|(prob, _)| *prob))
            .finish_non_exhaustive()
    }
}

impl BatchTransform for MapColumns {
    fn apply(&self, mut batch: Batch) -> Result<Batch> {
        let inputs = column_arrays(&batch, &self.from)?;
        if inputs.is_empty() {
            return Err(Error::InvalidArgument("transform needs at least one input column".into()));
        }

        let outputs = self.map_at_depth(&inputs, self.dim)?;
        for (field, array) in self.to.iter().zip(outputs) {
            let column = if self.dim > 0 && array.is_empty() {
                Column::empty(field.name(), field.kind(), field.shape().unwrap_or(&[]))
            } else {
                Column::new(field.name(), array)?
            };
            batch = batch.with_column(field.clone(), column)?;
        }
        Ok(batch)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        for name in &self.from {
            input_schema.index_of(name)?;
        }
        let mut schema = input_schema.clone();
        for field in &self.to {
            schema = schema.with_field(field.clone())?;
        }
        Ok(Arc::new(schema))
    }
}

type VisitFn = dyn Fn(&[NdArray]) -> Result<()> + Send + Sync;

/// Calls a function on a group of columns at a chosen nesting depth and
/// passes every batch through unchanged.
///
/// Depths follow [`MapColumns`].
pub struct ForEachColumns {
    from: Vec<String>,
    dim: usize,
    fun: Arc<VisitFn>,
}

impl ForEachColumns {
    /// Create a transform calling `fun` on every row of the `from` columns
    pub fn new<F>(from: &[&str], fun: F) -> Self
    where
        F: Fn(&[NdArray]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            from: from.iter().map(|name| (*name).to_string()).collect(),
            dim: 1,
            fun: Arc::new(fun),
        }
    }

    /// Call the function at nesting depth `dim` instead of per row
    #[must_use]
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    fn visit(&self, inputs: &[NdArray], depth: usize) -> Result<()> {
        if depth == 0 {
            return (self.fun)(inputs);
        }
        for i in 0..lockstep_len(inputs)? {
            let row = inputs.iter().map(|array| array.get(i)).collect::<Result<Vec<_>>>()?;
            self.visit(&row, depth - 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ForEachColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEachColumns")
            .field("from", &self.from)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl BatchTransform for ForEachColumns {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let inputs = column_arrays(&batch, &self.from)?;
        self.visit(&inputs, self.dim)?;
        Ok(batch)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        for name in &self.from {
            input_schema.index_of(name)?;
        }
        Ok(Arc::new(input_schema.clone()))
    }
}

fn column_arrays(batch: &Batch, names: &[String]) -> Result<Vec<NdArray>> {
    names
        .iter()
        .map(|name| batch.column_by_name(name).map(|column| column.array().clone()))
        .collect()
}

/// Common length along the leading axis of arrays walked in lockstep
fn lockstep_len(arrays: &[NdArray]) -> Result<usize> {
    let mut len = None;
    for array in arrays {
        if array.rank() == 0 {
            return Err(Error::Shape("cannot descend into a rank-0 value".into()));
        }
        match len {
            None => len = Some(array.len()),
            Some(n) if n != array.len() => {
                return Err(Error::Shape(format!(
                    "columns walked together have lengths {n} and {}",
                    array.len()
                )))
            }
            Some(_) => {}
        }
    }
    Ok(len.unwrap_or(0))
}

/// Retag an array without elements as `kind`; other arrays must already match
fn conform(kind: ElementKind, array: NdArray) -> Result<NdArray> {
    if array.kind() == kind || kind == ElementKind::Empty {
        return Ok(array);
    }
    if array.size() == 0 {
        let (shape, _) = array.into_parts();
        return NdArray::from_parts(shape, ArrayData::new(kind));
    }
    Err(Error::Conversion(format!(
        "transform produced {} values for a {kind} output",
        array.kind()
    )))
}

/// Removes one column from every batch
#[derive(Debug, Clone)]
pub struct DropColumn {
    name: String,
}

impl DropColumn {
    /// Create a transform removing the column `name`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl BatchTransform for DropColumn {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        batch.drop_column(&self.name)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        Ok(Arc::new(input_schema.without_field(&self.name)?))
    }
}

/// Lazily apply `transform` to every batch of `stream`
pub fn apply_transform(stream: &Range<Batch>, transform: Arc<dyn BatchTransform>) -> Range<Batch> {
    stream.try_map(move |batch| transform.apply(batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use std::sync::Mutex;

    fn labeled_batch() -> Batch {
        let schema = Schema::new(vec![
            Field::new("fpaths", ElementKind::Str),
            Field::new("str_labels", ElementKind::Str),
        ])
        .unwrap();
        Batch::new(
            Arc::new(schema),
            vec![
                Column::from_vec("fpaths", vec!["a.raw".to_string(), "b.raw".into()]),
                Column::from_vec("str_labels", vec!["cat".to_string(), "dog".into()]),
            ],
        )
        .unwrap()
    }

    fn label_length() -> MapColumn {
        MapColumn::new("str_labels", Field::new("label_len", ElementKind::Int32), |row| {
            match row.scalar_value() {
                Some(Scalar::Str(s)) => Ok(NdArray::from(i32::try_from(s.len()).unwrap())),
                _ => Err(Error::Conversion("expected a string label".into())),
            }
        })
    }

    #[test]
    fn test_map_column() {
        let batch = label_length().apply(labeled_batch()).unwrap();
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["fpaths", "str_labels", "label_len"]);
        assert_eq!(
            batch.column_by_name("label_len").unwrap(),
            &Column::from_vec("label_len", vec![3, 3])
        );

        let schema = Arc::clone(labeled_batch().schema());
        let empty = label_length().apply(Batch::empty(schema)).unwrap();
        assert_eq!(empty.column_by_name("label_len").unwrap().kind(), ElementKind::Int32);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_chain_and_schema() {
        let chain: TransformChain<Box<dyn BatchTransform>> =
            TransformChain::new(vec![Box::new(label_length()) as Box<dyn BatchTransform>])
                .then(Box::new(DropColumn::new("str_labels")));
        let input = labeled_batch();
        let expected_schema = chain.output_schema(input.schema()).unwrap();
        let output = chain.apply(input).unwrap();
        assert_eq!(output.schema(), &expected_schema);
        assert_eq!(output.keys().collect::<Vec<_>>(), vec!["fpaths", "label_len"]);

        let missing = DropColumn::new("labels");
        assert!(matches!(missing.apply(labeled_batch()), Err(Error::Schema(_))));
        assert!(missing.output_schema(labeled_batch().schema()).is_err());
    }

    #[test]
    fn test_apply_transform_is_lazy() {
        let stream = Range::from_vec(vec![labeled_batch(), labeled_batch()]);
        let mapped = apply_transform(&stream, Arc::new(DropColumn::new("fpaths")));
        assert_eq!(mapped.len(), Some(2));
        for batch in &mapped {
            assert_eq!(batch.unwrap().keys().collect::<Vec<_>>(), vec!["str_labels"]);
        }

        let failing = apply_transform(&stream, Arc::new(DropColumn::new("nope")));
        let mut cursor = failing.create();
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
    }

    fn int(array: &NdArray) -> i32 {
        match array.scalar_value() {
            Some(Scalar::Int32(v)) => v,
            other => panic!("expected an Int32 scalar, got {other:?}"),
        }
    }

    fn double(array: &NdArray) -> f64 {
        match array.scalar_value() {
            Some(Scalar::Float64(v)) => v,
            other => panic!("expected a Float64 scalar, got {other:?}"),
        }
    }

    /// Int `[3, 7]`, Double `[5.0, 1.0]` and 2-element Int `pairs` rows
    fn numbers_batch() -> Batch {
        let schema = Schema::new(vec![
            Field::new("Int", ElementKind::Int32),
            Field::new("Double", ElementKind::Float64),
            Field::new("pairs", ElementKind::Int32).with_shape(vec![2]),
        ])
        .unwrap();
        Batch::new(
            Arc::new(schema),
            vec![
                Column::from_vec("Int", vec![3, 7]),
                Column::from_vec("Double", vec![5.0, 1.0]),
                Column::new("pairs", NdArray::from_nested2(vec![vec![1, 2], vec![3, 4]]).unwrap())
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_two_columns_to_one() {
        let sum = MapColumns::new(&["Int", "Double"], vec![Field::new("Double", ElementKind::Float64)], |row| {
            Ok(vec![NdArray::from(f64::from(int(&row[0])) + double(&row[1]))])
        });
        let batch = sum.apply(numbers_batch()).unwrap();
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["Int", "Double", "pairs"]);
        assert_eq!(batch.column_by_name("Double").unwrap(), &Column::from_vec("Double", vec![8.0, 8.0]));
        assert_eq!(batch.column_by_name("Int").unwrap(), &Column::from_vec("Int", vec![3, 7]));
    }

    #[test]
    fn test_one_column_to_two() {
        let split = MapColumns::new(
            &["Int"],
            vec![Field::new("Int", ElementKind::Int32), Field::new("square", ElementKind::Float64)],
            |row| {
                let i = int(&row[0]);
                Ok(vec![NdArray::from(i + i), NdArray::from(f64::from(i * i))])
            },
        );
        let input = numbers_batch();
        let expected_schema = split.output_schema(input.schema()).unwrap();
        let batch = split.apply(input).unwrap();
        assert_eq!(batch.schema(), &expected_schema);
        assert_eq!(batch.column_by_name("Int").unwrap(), &Column::from_vec("Int", vec![6, 14]));
        assert_eq!(batch.column_by_name("square").unwrap(), &Column::from_vec("square", vec![9.0, 49.0]));
    }

    #[test]
    fn test_map_columns_at_depth() {
        let shifted = MapColumns::new(&["pairs"], vec![Field::new("pairs", ElementKind::Int32).with_shape(vec![2])], |v| {
            Ok(vec![NdArray::from(int(&v[0]) * 10)])
        })
        .with_dim(2);
        let batch = shifted.apply(numbers_batch()).unwrap();
        let pairs = batch.column_by_name("pairs").unwrap().array();
        assert_eq!(pairs.shape(), &[2, 2]);
        assert_eq!(pairs.as_slice::<i32>().unwrap(), &[10, 20, 30, 40]);

        let reversed = MapColumns::new(&["Int"], vec![Field::new("Int", ElementKind::Int32)], |whole| {
            let mut values = whole[0].as_slice::<i32>().unwrap().to_vec();
            values.reverse();
            Ok(vec![NdArray::from_vec(values)])
        })
        .with_dim(0);
        let batch = reversed.apply(numbers_batch()).unwrap();
        assert_eq!(batch.column_by_name("Int").unwrap(), &Column::from_vec("Int", vec![7, 3]));
    }

    #[test]
    fn test_map_columns_shape_errors() {
        let identity = |dim: usize| {
            MapColumns::new(&["Int", "pairs"], vec![Field::new("copy", ElementKind::Int32)], |v| {
                Ok(vec![v[0].clone()])
            })
            .with_dim(dim)
        };
        // rows of Int are scalars, rows of pairs have two entries
        assert!(matches!(identity(2).apply(numbers_batch()), Err(Error::Shape(_))));
        assert!(matches!(identity(3).apply(numbers_batch()), Err(Error::Shape(_))));

        let too_many = MapColumns::new(&["Int"], vec![Field::new("Int", ElementKind::Int32)], |v| {
            Ok(vec![v[0].clone(), v[0].clone()])
        });
        assert!(matches!(too_many.apply(numbers_batch()), Err(Error::InvalidArgument(_))));

        let wrong_kind = MapColumns::new(&["Int"], vec![Field::new("Int", ElementKind::Int32)], |_| {
            Ok(vec![NdArray::from(0.5)])
        });
        assert!(matches!(wrong_kind.apply(numbers_batch()), Err(Error::Conversion(_))));

        let missing = MapColumns::new(&["labels"], Vec::new(), |_| Ok(Vec::new()));
        assert!(matches!(missing.apply(numbers_batch()), Err(Error::Schema(_))));
        assert!(missing.output_schema(numbers_batch().schema()).is_err());
    }

    #[test]
    fn test_map_columns_on_empty_batch() {
        let shifted = MapColumns::new(&["pairs"], vec![Field::new("pairs", ElementKind::Int32).with_shape(vec![2])], |v| {
            Ok(vec![v[0].clone()])
        });
        let empty = shifted.apply(Batch::empty(Arc::clone(numbers_batch().schema()))).unwrap();
        let pairs = empty.column_by_name("pairs").unwrap();
        assert!(pairs.is_empty());
        assert_eq!(pairs.row_shape(), &[2]);
    }

    #[test]
    fn test_map_columns_with_probability() {
        let decrement = |prob: f64| {
            MapColumns::new(&["Int", "Double"], vec![Field::new("Int", ElementKind::Int32)], |row| {
                Ok(vec![NdArray::from(int(&row[0]) - 1)])
            })
            .with_probability(prob, SharedRng::seeded(3))
        };

        let never = decrement(0.0).unwrap().apply(numbers_batch()).unwrap();
        assert_eq!(never, numbers_batch());
        let always = decrement(1.0).unwrap().apply(numbers_batch()).unwrap();
        assert_eq!(always.column_by_name("Int").unwrap(), &Column::from_vec("Int", vec![2, 6]));

        let sometimes = decrement(0.5).unwrap();
        let rows: Vec<i32> = (0..50)
            .flat_map(|_| {
                let batch = sometimes.apply(numbers_batch()).unwrap();
                batch.column_by_name("Int").unwrap().array().as_slice::<i32>().unwrap().to_vec()
            })
            .collect();
        assert!(rows.iter().any(|&v| v == 3 || v == 7));
        assert!(rows.iter().any(|&v| v == 2 || v == 6));

        assert!(matches!(decrement(1.5), Err(Error::InvalidArgument(_))));
        let unrelated = MapColumns::new(&["Int"], vec![Field::new("other", ElementKind::Int32)], |row| {
            Ok(vec![row[0].clone()])
        })
        .with_probability(0.5, SharedRng::seeded(3));
        assert!(matches!(unrelated, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_for_each_columns_visits_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let visit = ForEachColumns::new(&["pairs"], move |v| {
            sink.lock().unwrap().push(int(&v[0]));
            Ok(())
        })
        .with_dim(2);

        let input = numbers_batch();
        assert_eq!(visit.output_schema(input.schema()).unwrap().as_ref(), input.schema().as_ref());
        assert_eq!(visit.apply(input).unwrap(), numbers_batch());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);

        let rows = ForEachColumns::new(&["Int", "Double"], |row| {
            if int(&row[0]) > 5 {
                Err(Error::InvalidArgument("row rejected".into()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(rows.apply(numbers_batch()), Err(Error::InvalidArgument(_))));
    }
}
