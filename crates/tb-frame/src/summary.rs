//! The accumulator protocol and the builtin accumulators.
//!
//! An accumulator is three capabilities: a seed, a fold step over rows and a
//! finalizer. [`Accumulator`] states them with an associated state type;
//! [`Summarize`] is the object-safe face the fold engine drives, so fields
//! with different state types can sit in one ordered list.

use std::cmp::Ordering;
use std::fmt;

use tb_columnar::Row;
use tb_types::{Scalar, TypeError};

pub trait Accumulator: fmt::Debug {
    type State;

    fn init(&self) -> Self::State;

    fn step(&self, state: Self::State, row: &Row) -> Result<Self::State, TypeError>;

    fn result(&self, state: Self::State) -> Result<Scalar, TypeError>;
}

/// One group's in-progress fold.
pub trait RunningFold {
    fn step(&mut self, row: &Row) -> Result<(), TypeError>;

    fn finish(self: Box<Self>) -> Result<Scalar, TypeError>;
}

/// Type-erased accumulator. Implemented for every [`Accumulator`].
pub trait Summarize: fmt::Debug {
    fn begin(&self) -> Box<dyn RunningFold + '_>;
}

impl<A> Summarize for A
where
    A: Accumulator,
    A::State: 'static,
{
    fn begin(&self) -> Box<dyn RunningFold + '_> {
        Box::new(Running {
            accumulator: self,
            state: Some(self.init()),
        })
    }
}

struct Running<'a, A: Accumulator> {
    accumulator: &'a A,
    // `None` only after a failed step, which aborts the whole fold.
    state: Option<A::State>,
}

impl<A: Accumulator> RunningFold for Running<'_, A> {
    fn step(&mut self, row: &Row) -> Result<(), TypeError> {
        if let Some(state) = self.state.take() {
            self.state = Some(self.accumulator.step(state, row)?);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Scalar, TypeError> {
        match self.state {
            Some(state) => self.accumulator.result(state),
            None => Ok(Scalar::Null),
        }
    }
}

/// Ordered `name -> accumulator` fields for `summarize`.
#[derive(Debug, Default)]
pub struct Summaries {
    pub(crate) fields: Vec<(String, Box<dyn Summarize>)>,
}

impl Summaries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, accumulator: impl Summarize + 'static) -> Self {
        self.fields.push((name.into(), Box::new(accumulator)));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

type RowFn = dyn Fn(&Row) -> Result<Scalar, TypeError>;

/// How `mutate` computes one new column.
pub enum Mutation {
    /// Evaluated once per row.
    Map(Box<RowFn>),
    /// Folded per group, then broadcast to every row of the group.
    Summary(Box<dyn Summarize>),
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(_) => f.write_str("Map(<fn>)"),
            Self::Summary(accumulator) => f.debug_tuple("Summary").field(accumulator).finish(),
        }
    }
}

/// Ordered `name -> mutation` fields for `mutate`. Later fields may read
/// columns produced by earlier ones.
#[derive(Debug, Default)]
pub struct Mutations {
    pub(crate) fields: Vec<(String, Mutation)>,
}

impl Mutations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn map<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Row) -> Result<Scalar, TypeError> + 'static,
    {
        self.fields.push((name.into(), Mutation::Map(Box::new(func))));
        self
    }

    #[must_use]
    pub fn summary(
        mut self,
        name: impl Into<String>,
        accumulator: impl Summarize + 'static,
    ) -> Self {
        self.fields
            .push((name.into(), Mutation::Summary(Box::new(accumulator))));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count;

#[must_use]
pub fn count() -> Count {
    Count
}

impl Accumulator for Count {
    type State = i64;

    fn init(&self) -> i64 {
        0
    }

    fn step(&self, state: i64, _row: &Row) -> Result<i64, TypeError> {
        Ok(state + 1)
    }

    fn result(&self, state: i64) -> Result<Scalar, TypeError> {
        Ok(Scalar::Int64(state))
    }
}

/// Sum of a column. A null value makes the sum null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sum {
    column: String,
}

#[must_use]
pub fn sum(column: impl Into<String>) -> Sum {
    Sum {
        column: column.into(),
    }
}

impl Accumulator for Sum {
    type State = Scalar;

    fn init(&self) -> Scalar {
        Scalar::Int64(0)
    }

    fn step(&self, state: Scalar, row: &Row) -> Result<Scalar, TypeError> {
        state.add(row.get(&self.column))
    }

    fn result(&self, state: Scalar) -> Result<Scalar, TypeError> {
        Ok(state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mean {
    column: String,
}

#[must_use]
pub fn mean(column: impl Into<String>) -> Mean {
    Mean {
        column: column.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanState {
    count: i64,
    sum: Scalar,
}

impl Accumulator for Mean {
    type State = MeanState;

    fn init(&self) -> MeanState {
        MeanState {
            count: 0,
            sum: Scalar::Int64(0),
        }
    }

    fn step(&self, state: MeanState, row: &Row) -> Result<MeanState, TypeError> {
        Ok(MeanState {
            count: state.count + 1,
            sum: state.sum.add(row.get(&self.column))?,
        })
    }

    /// `sum / count`; an empty group gives a non-finite float.
    fn result(&self, state: MeanState) -> Result<Scalar, TypeError> {
        state.sum.div(&Scalar::Int64(state.count))
    }
}

/// Smallest non-null value of a column, or null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Min {
    column: String,
}

#[must_use]
pub fn min(column: impl Into<String>) -> Min {
    Min {
        column: column.into(),
    }
}

impl Accumulator for Min {
    type State = Option<Scalar>;

    fn init(&self) -> Option<Scalar> {
        None
    }

    fn step(&self, state: Option<Scalar>, row: &Row) -> Result<Option<Scalar>, TypeError> {
        keep_extreme(state, row.get(&self.column), Ordering::Less)
    }

    fn result(&self, state: Option<Scalar>) -> Result<Scalar, TypeError> {
        Ok(state.unwrap_or(Scalar::Null))
    }
}

/// Largest non-null value of a column, or null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Max {
    column: String,
}

#[must_use]
pub fn max(column: impl Into<String>) -> Max {
    Max {
        column: column.into(),
    }
}

impl Accumulator for Max {
    type State = Option<Scalar>;

    fn init(&self) -> Option<Scalar> {
        None
    }

    fn step(&self, state: Option<Scalar>, row: &Row) -> Result<Option<Scalar>, TypeError> {
        keep_extreme(state, row.get(&self.column), Ordering::Greater)
    }

    fn result(&self, state: Option<Scalar>) -> Result<Scalar, TypeError> {
        Ok(state.unwrap_or(Scalar::Null))
    }
}

fn keep_extreme(
    state: Option<Scalar>,
    candidate: &Scalar,
    wanted: Ordering,
) -> Result<Option<Scalar>, TypeError> {
    if candidate.is_missing() {
        return Ok(state);
    }
    match state {
        Some(current) if candidate.compare(&current)? != wanted => Ok(Some(current)),
        _ => Ok(Some(candidate.clone())),
    }
}

/// Value of a column in the first row of each group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct First {
    column: String,
}

#[must_use]
pub fn first(column: impl Into<String>) -> First {
    First {
        column: column.into(),
    }
}

impl Accumulator for First {
    type State = Option<Scalar>;

    fn init(&self) -> Option<Scalar> {
        None
    }

    fn step(&self, state: Option<Scalar>, row: &Row) -> Result<Option<Scalar>, TypeError> {
        Ok(state.or_else(|| Some(row.get(&self.column).clone())))
    }

    fn result(&self, state: Option<Scalar>) -> Result<Scalar, TypeError> {
        Ok(state.unwrap_or(Scalar::Null))
    }
}
