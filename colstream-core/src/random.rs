//! Seedable randomness for batch streams
//!
//! [`SharedRng`] is the generator handle transforms hold; [`RandomFill`]
//! attaches a column of uniform random numbers shaped after an existing
//! column; [`generate_groups`] and [`generate_many_groups`] assign rows to
//! groups such as train, validation and test splits.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::column::Column;
use crate::error::{Error, Result};
use crate::record_batch::Batch;
use crate::schema::{ElementKind, Field, Schema};
use crate::transform::BatchTransform;
use crate::value::{ArrayData, NdArray};

/// A random generator shared by every clone of the handle
#[derive(Debug, Clone)]
pub struct SharedRng(Arc<Mutex<StdRng>>);

impl SharedRng {
    /// Create a generator with a fixed seed, for reproducible streams
    pub fn seeded(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    /// Create a generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self(Arc::new(Mutex::new(StdRng::from_entropy())))
    }

    /// Run `f` with exclusive access to the generator
    pub fn with<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

/// Adds a `Float64` column of uniform numbers in `[0, 1)` shaped like an
/// existing column.
///
/// Values vary along the first `ndims` axes of the column (axis 0 being the
/// row axis) and repeat along the remaining ones: `ndims == 0` gives the
/// whole batch one value, `ndims == 1` gives every row its own constant value.
pub struct RandomFill {
    from: String,
    to: String,
    ndims: usize,
    rank: Option<usize>,
    rng: SharedRng,
}

impl RandomFill {
    /// Create a transform reading the shape of `from` and writing `to`
    pub fn new(from: &str, to: &str, ndims: usize) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            ndims,
            rank: None,
            rng: SharedRng::from_entropy(),
        }
    }

    /// Keep only the first `rank` axes of the source shape
    #[must_use]
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Draw the numbers from `rng`
    #[must_use]
    pub fn with_rng(mut self, rng: SharedRng) -> Self {
        self.rng = rng;
        self
    }

    fn target_rank(&self, source_rank: usize) -> Result<usize> {
        match self.rank {
            Some(0) => Err(Error::InvalidArgument(
                "a random column needs at least the row axis".into(),
            )),
            Some(rank) if rank > source_rank => Err(Error::Shape(format!(
                "cannot shape a rank-{rank} column after a rank-{source_rank} column"
            ))),
            Some(rank) => Ok(rank),
            None => Ok(source_rank),
        }
    }

    fn target_field(&self, source: &Field) -> Result<Field> {
        let field = Field::new(&self.to, ElementKind::Float64);
        Ok(match source.shape() {
            Some(row_shape) => {
                let rank = self.target_rank(row_shape.len() + 1)?;
                field.with_shape(row_shape[..rank - 1].to_vec())
            }
            None => field,
        })
    }
}

impl fmt::Debug for RandomFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomFill")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("ndims", &self.ndims)
            .field("rank", &self.rank)
            .finish_non_exhaustive()
    }
}

impl BatchTransform for RandomFill {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let source = batch.column_by_name(&self.from)?;
        let field = self.target_field(batch.schema().field_by_name(&self.from)?)?;

        let full_shape = source.array().shape();
        let shape = full_shape[..self.target_rank(full_shape.len())?].to_vec();
        let varying = self.ndims.min(shape.len());
        let draws: usize = shape[..varying].iter().product();
        let repeat: usize = shape[varying..].iter().product();

        let mut values = Vec::with_capacity(draws * repeat);
        self.rng.with(|rng| {
            for _ in 0..draws {
                let value: f64 = rng.gen();
                values.extend(std::iter::repeat(value).take(repeat));
            }
        });

        let column = Column::new(&self.to, NdArray::from_parts(shape, ArrayData::Float64(values))?)?;
        batch.with_column(field, column)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        let field = self.target_field(input_schema.field_by_name(&self.from)?)?;
        Ok(Arc::new(input_schema.with_field(field)?))
    }
}

fn normalized(ratios: &[f64]) -> Result<Vec<f64>> {
    if ratios.is_empty() {
        return Err(Error::InvalidArgument("at least one group ratio is needed".into()));
    }
    if let Some(bad) = ratios.iter().find(|r| !r.is_finite() || **r < 0.0) {
        return Err(Error::InvalidArgument(format!("invalid group ratio {bad}")));
    }
    let total: f64 = ratios.iter().sum();
    if total <= 0.0 {
        return Err(Error::InvalidArgument("group ratios sum to zero".into()));
    }
    Ok(ratios.iter().map(|r| r / total).collect())
}

/// Randomly assign `size` rows to groups in proportion to `ratios`.
///
/// Group `g` receives `floor(ratios[g] / sum * size)` rows. Rows left over by
/// the rounding belong to group 0.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn generate_groups<R: Rng + ?Sized>(
    size: usize,
    ratios: &[f64],
    rng: &mut R,
) -> Result<Vec<usize>> {
    let ratios = normalized(ratios)?;
    let mut order: Vec<usize> = (0..size).collect();
    order.shuffle(rng);

    let mut groups = vec![0; size];
    let mut assigned = 0;
    for (group, ratio) in ratios.iter().enumerate() {
        let count = (ratio * size as f64) as usize;
        for &row in order.iter().skip(assigned).take(count) {
            groups[row] = group;
        }
        assigned += count;
    }
    Ok(groups)
}

/// Generate `n` group assignments of `size` rows.
///
/// Groups are numbered volatile first, then fixed. Rows of the fixed groups
/// are drawn once and shared by every assignment (a held-out test split);
/// the remaining rows are redistributed among the volatile groups anew for
/// each assignment.
pub fn generate_many_groups<R: Rng + ?Sized>(
    n: usize,
    size: usize,
    volatile_ratios: &[f64],
    fixed_ratios: &[f64],
    rng: &mut R,
) -> Result<Vec<Vec<usize>>> {
    let all_ratios: Vec<f64> = volatile_ratios.iter().chain(fixed_ratios).copied().collect();
    let initial = generate_groups(size, &all_ratios, rng)?;
    let is_volatile = |group: usize| group < volatile_ratios.len();

    let mut assignments = Vec::with_capacity(n);
    for _ in 0..n {
        let mut groups = initial.clone();
        let volatile_rows = groups.iter().filter(|&&g| is_volatile(g)).count();
        if volatile_rows > 0 {
            let redrawn = generate_groups(volatile_rows, volatile_ratios, rng)?;
            for (slot, group) in groups.iter_mut().filter(|g| is_volatile(**g)).zip(redrawn) {
                *slot = group;
            }
        }
        assignments.push(groups);
    }
    Ok(assignments)
}
