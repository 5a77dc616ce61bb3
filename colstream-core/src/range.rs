//! Lazy, restartable ranges with negative indexing and zero-copy slicing
//!
//! A [`Range`] is a factory for independent cursors. Materialized ranges share
//! their backing slice through an `Arc`; generator ranges re-run their
//! factory for every cursor. Slicing never copies: a view keeps a handle to
//! the same backing plus a `[start, stop)` window over it.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Fallible element cursor produced by a generator factory
pub type Cursor<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

type CursorFactory<T> = dyn Fn() -> Result<Cursor<T>> + Send + Sync;

/// Length information of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// Exactly this many elements
    Finite(usize),

    /// Finite, but only known by traversing
    Unknown,

    /// Never exhausted
    Unbounded,
}

enum Backing<T> {
    Shared(Arc<[T]>),
    Generator {
        factory: Arc<CursorFactory<T>>,
        extent: Extent,
    },
}

impl<T> Clone for Backing<T> {
    fn clone(&self) -> Self {
        match self {
            Backing::Shared(data) => Backing::Shared(Arc::clone(data)),
            Backing::Generator { factory, extent } => Backing::Generator {
                factory: Arc::clone(factory),
                extent: *extent,
            },
        }
    }
}

/// A restartable, lazily evaluated sequence
pub struct Range<T> {
    backing: Backing<T>,

    /// First backing position visible through this range
    start: usize,

    /// One past the last visible backing position, `None` for "to the end"
    stop: Option<usize>,
}

impl<T> Clone for Range<T> {
    fn clone(&self) -> Self {
        Self {
            backing: self.backing.clone(),
            start: self.start,
            stop: self.stop,
        }
    }
}

impl<T> fmt::Debug for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.backing {
            Backing::Shared(_) => "shared",
            Backing::Generator { .. } => "generator",
        };
        f.debug_struct("Range")
            .field("backing", &kind)
            .field("start", &self.start)
            .field("stop", &self.stop)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Range<T> {
    /// Create a range over materialized elements
    pub fn from_vec(values: Vec<T>) -> Self {
        Self::from_shared(values.into())
    }

    /// Create a range over an already shared slice without copying it
    pub fn from_shared(values: Arc<[T]>) -> Self {
        let stop = Some(values.len());
        Self {
            backing: Backing::Shared(values),
            start: 0,
            stop,
        }
    }

    /// Create an empty range
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create a range whose cursors come from an infallible factory.
    ///
    /// The factory is invoked once per cursor, so every traversal starts over.
    pub fn from_fn<F, I>(extent: Extent, factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::try_from_fn(extent, move || {
            Ok(factory().into_iter().map(Ok::<T, Error>))
        })
    }

    /// Create a range whose cursors come from a fallible factory
    pub fn try_from_fn<F, I>(extent: Extent, factory: F) -> Self
    where
        F: Fn() -> Result<I> + Send + Sync + 'static,
        I: Iterator<Item = Result<T>> + Send + 'static,
    {
        let factory: Arc<CursorFactory<T>> =
            Arc::new(move || factory().map(|cursor| Box::new(cursor) as Cursor<T>));
        Self {
            backing: Backing::Generator { factory, extent },
            start: 0,
            stop: match extent {
                Extent::Finite(n) => Some(n),
                Extent::Unknown | Extent::Unbounded => None,
            },
        }
    }

    /// Create a range from an explicit state machine.
    ///
    /// Each cursor starts from its own clone of `seed` and calls `step` to
    /// produce the next element; `None` ends a finite sequence.
    pub fn unfold<S, F>(extent: Extent, seed: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&mut S) -> Option<T> + Send + Sync + 'static,
    {
        let step = Arc::new(step);
        Self::from_fn(extent, move || {
            let mut state = seed.clone();
            let step = Arc::clone(&step);
            std::iter::from_fn(move || (*step)(&mut state))
        })
    }

    /// Length information of this range or view
    pub fn extent(&self) -> Extent {
        match (&self.backing, self.stop) {
            (Backing::Shared(_), Some(stop)) => Extent::Finite(stop - self.start),
            (Backing::Shared(data), None) => Extent::Finite(data.len() - self.start),
            (Backing::Generator { extent, .. }, stop) => match (extent, stop) {
                (Extent::Finite(_) | Extent::Unbounded, Some(stop)) => {
                    Extent::Finite(stop - self.start)
                }
                (Extent::Finite(n), None) => Extent::Finite(n.saturating_sub(self.start)),
                (Extent::Unknown, _) => Extent::Unknown,
                (Extent::Unbounded, None) => Extent::Unbounded,
            },
        }
    }

    /// Number of elements, if known without traversing
    pub fn len(&self) -> Option<usize> {
        match self.extent() {
            Extent::Finite(n) => Some(n),
            Extent::Unknown | Extent::Unbounded => None,
        }
    }

    /// Whether the range is known to hold no elements
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Number of elements, traversing a fresh cursor if the size is unknown
    pub fn count(&self) -> Result<usize> {
        match self.extent() {
            Extent::Finite(n) => Ok(n),
            Extent::Unbounded => Err(Error::Unbounded("cannot count an unbounded range".into())),
            Extent::Unknown => {
                let mut n = 0;
                for item in self.create() {
                    item?;
                    n += 1;
                }
                Ok(n)
            }
        }
    }

    /// Start a fresh, independent traversal
    pub fn create(&self) -> RangeIter<T> {
        let state = match &self.backing {
            Backing::Shared(data) => IterState::Shared {
                data: Arc::clone(data),
                pos: self.start,
                stop: self.stop.unwrap_or(data.len()).min(data.len()),
            },
            Backing::Generator { factory, .. } => IterState::Pending {
                factory: Arc::clone(factory),
                skip: self.start,
                take: self.stop.map(|stop| stop - self.start),
            },
        };
        RangeIter { state }
    }

    /// Alias of [`Range::create`]
    pub fn iter(&self) -> RangeIter<T> {
        self.create()
    }

    /// Materialize every element of a finite range
    pub fn collect_vec(&self) -> Result<Vec<T>> {
        if self.extent() == Extent::Unbounded {
            return Err(Error::Unbounded("cannot collect an unbounded range".into()));
        }
        self.create().collect()
    }

    /// Element at `index`; negative indices count back from the end
    pub fn at(&self, index: isize) -> Result<T> {
        let resolved = if index >= 0 {
            index.unsigned_abs()
        } else {
            if self.extent() == Extent::Unbounded {
                return Err(Error::Unbounded(format!(
                    "negative index {index} on an unbounded range"
                )));
            }
            let len = self.count()?;
            let back = index.unsigned_abs();
            if back > len {
                return Err(Error::Index { index, len });
            }
            len - back
        };

        if let Backing::Shared(data) = &self.backing {
            let len = self.len().unwrap_or(0);
            return if resolved < len {
                Ok(data[self.start + resolved].clone())
            } else {
                Err(Error::Index { index, len })
            };
        }

        let mut seen = 0;
        for item in self.create() {
            let item = item?;
            if seen == resolved {
                return Ok(item);
            }
            seen += 1;
        }
        Err(Error::Index { index, len: seen })
    }

    /// Zero-copy view over `[start, stop)` with host-style clamping.
    ///
    /// Negative bounds count back from the end, then every bound is clamped
    /// into `[0, len]`; `start >= stop` gives an empty view. Slicing never
    /// fails on a finite range. On an unbounded range only non-negative
    /// bounds are meaningful.
    pub fn slice(&self, start: Option<isize>, stop: Option<isize>) -> Result<Range<T>> {
        let negative = start.is_some_and(|s| s < 0) || stop.is_some_and(|s| s < 0);
        let (lo, hi) = match self.extent() {
            Extent::Finite(len) => clamp_bounds(start, stop, len),
            Extent::Unknown if negative => clamp_bounds(start, stop, self.count()?),
            Extent::Unknown | Extent::Unbounded => {
                if negative {
                    return Err(Error::InvalidArgument(
                        "negative slice bound on an unbounded range".into(),
                    ));
                }
                let lo = start.map_or(0, isize::unsigned_abs);
                let hi = stop.map(|s| s.unsigned_abs().max(lo));
                (lo, hi)
            }
        };

        Ok(Range {
            backing: self.backing.clone(),
            start: self.start + lo,
            stop: hi.map(|hi| self.start + hi),
        })
    }

    /// Lazily transform every element
    pub fn map<U, F>(&self, f: F) -> Range<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.try_map(move |item| Ok(f(item)))
    }

    /// Lazily transform every element with a fallible function
    pub fn try_map<U, F>(&self, f: F) -> Range<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let parent = self.clone();
        let f = Arc::new(f);
        let extent = self.extent();
        Range::try_from_fn(extent, move || {
            let f = Arc::clone(&f);
            Ok(parent.create().map(move |item| item.and_then(|v| (*f)(v))))
        })
    }
}

impl<T: Clone + Send + Sync + 'static> IntoIterator for &Range<T> {
    type Item = Result<T>;
    type IntoIter = RangeIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.create()
    }
}

/// Resolve optional, possibly negative slice bounds against a known length
fn clamp_bounds(start: Option<isize>, stop: Option<isize>, len: usize) -> (usize, Option<usize>) {
    let resolve = |bound: isize| {
        if bound < 0 {
            len.saturating_sub(bound.unsigned_abs())
        } else {
            bound.unsigned_abs().min(len)
        }
    };
    let lo = start.map_or(0, resolve);
    let hi = stop.map_or(len, resolve).max(lo);
    (lo, Some(hi))
}

enum IterState<T> {
    Shared {
        data: Arc<[T]>,
        pos: usize,
        stop: usize,
    },
    Pending {
        factory: Arc<CursorFactory<T>>,
        skip: usize,
        take: Option<usize>,
    },
    Running {
        cursor: Cursor<T>,
        remaining: Option<usize>,
    },
    Done,
}

/// Single-owner cursor over a [`Range`].
///
/// Yields `Err` at most once: after an error the cursor is exhausted.
pub struct RangeIter<T> {
    state: IterState<T>,
}

impl<T: Clone> RangeIter<T> {
    fn start_generator(
        factory: &CursorFactory<T>,
        skip: usize,
        take: Option<usize>,
    ) -> Result<IterState<T>> {
        let mut cursor = factory()?;
        for _ in 0..skip {
            match cursor.next() {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(IterState::Done),
            }
        }
        Ok(IterState::Running {
            cursor,
            remaining: take,
        })
    }
}

impl<T: Clone> Iterator for RangeIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let IterState::Pending {
            factory,
            skip,
            take,
        } = &self.state
        {
            match Self::start_generator(&**factory, *skip, *take) {
                Ok(state) => self.state = state,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            }
        }

        match &mut self.state {
            IterState::Shared { data, pos, stop } => {
                if *pos >= *stop {
                    return None;
                }
                let item = data[*pos].clone();
                *pos += 1;
                Some(Ok(item))
            }
            IterState::Running { cursor, remaining } => {
                if *remaining == Some(0) {
                    self.state = IterState::Done;
                    return None;
                }
                match cursor.next() {
                    Some(Ok(item)) => {
                        if let Some(n) = remaining {
                            *n -= 1;
                        }
                        Some(Ok(item))
                    }
                    Some(Err(e)) => {
                        self.state = IterState::Done;
                        Some(Err(e))
                    }
                    None => {
                        self.state = IterState::Done;
                        None
                    }
                }
            }
            IterState::Pending { .. } | IterState::Done => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.state {
            IterState::Shared { pos, stop, .. } => {
                let n = stop.saturating_sub(*pos);
                (n, Some(n))
            }
            IterState::Pending { take, .. } => (0, *take),
            IterState::Running { remaining, .. } => (0, *remaining),
            IterState::Done => (0, Some(0)),
        }
    }
}

impl<T: Clone> std::iter::FusedIterator for RangeIter<T> {}
