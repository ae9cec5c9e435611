#![forbid(unsafe_code)]

//! Immutable dataframe snapshots.
//!
//! A [`Dataframe`] holds a column view, a row view, or both. Whichever view
//! is missing is derived on first use and cached in a `OnceCell`; since a
//! frame is never mutated after construction the cached view can never go
//! stale. Derived frames share unchanged vectors and rows through `Rc`.

use std::cell::OnceCell;
use std::rc::Rc;

use tb_columnar::{
    ColumnError, Row, Vector, infer_row_names, rows_from_vectors, validate_vectors,
    vectors_from_rows,
};
use tb_types::TypeError;
use thiserror::Error;
use tracing::trace;

mod group;
mod summary;
mod transform;

pub use summary::{
    Accumulator, Count, First, Max, Mean, MeanState, Min, Mutation, Mutations, RunningFold, Sum,
    Summaries, Summarize, count, first, max, mean, min, sum,
};
pub use tb_columnar::{GroupKey, Scalar, row};
pub use transform::{Selection, SortKey};

#[derive(Debug, Error)]
pub enum FrameError {
    /// Neither a column nor a row view is available to read from.
    #[error("dataframe has no columns or rows to read from")]
    NoData,
    #[error("no column named {0:?}")]
    MissingColumn(String),
    #[error("column {0:?} already exists")]
    DuplicateColumn(String),
    #[error("dataframe is already grouped by {0:?}")]
    DuplicateGroup(String),
    #[error("vectors hold {vectors} rows but {rows} rows were supplied")]
    RowCountMismatch { vectors: usize, rows: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

#[derive(Debug, Clone)]
pub struct Dataframe {
    columns: OnceCell<Rc<[Vector]>>,
    rows: OnceCell<Rc<[Row]>>,
    groups: Rc<[String]>,
    column_names: Rc<[String]>,
}

impl Dataframe {
    /// Builds a frame from a column view, a row view, or both.
    ///
    /// `column_names` overrides the inferred column order; when vectors are
    /// supplied alongside it they are reordered to match. Every group name
    /// must be one of the columns.
    pub fn new(
        columns: Option<Vec<Vector>>,
        rows: Option<Vec<Row>>,
        groups: Vec<String>,
        column_names: Option<Vec<String>>,
    ) -> Result<Self, FrameError> {
        if columns.is_none() && rows.is_none() {
            return Err(FrameError::NoData);
        }

        let columns = match columns {
            Some(vectors) => {
                // No vectors means no rows.
                let len = validate_vectors(&vectors)?.unwrap_or(0);
                if let Some(rows) = rows.as_ref()
                    && len != rows.len()
                {
                    return Err(FrameError::RowCountMismatch {
                        vectors: len,
                        rows: rows.len(),
                    });
                }
                Some(match column_names.as_deref() {
                    Some(names) => order_vectors(vectors, names)?,
                    None => vectors,
                })
            }
            None => None,
        };

        let column_names: Vec<String> = match (column_names, &columns, &rows) {
            (Some(names), _, _) => names,
            (None, Some(vectors), _) => vectors.iter().map(|v| v.name().to_owned()).collect(),
            (None, None, Some(rows)) => infer_row_names(rows),
            (None, None, None) => return Err(FrameError::NoData),
        };

        if let Some(missing) = groups.iter().find(|g| !column_names.contains(*g)) {
            return Err(FrameError::MissingColumn(missing.clone()));
        }

        Ok(Self {
            columns: cached(columns.map(Rc::from)),
            rows: cached(rows.map(Rc::from)),
            groups: groups.into(),
            column_names: column_names.into(),
        })
    }

    pub fn from_vectors(vectors: Vec<Vector>) -> Result<Self, FrameError> {
        Self::new(Some(vectors), None, Vec::new(), None)
    }

    pub fn from_rows(rows: Vec<Row>) -> Result<Self, FrameError> {
        Self::new(None, Some(rows), Vec::new(), None)
    }

    /// Row-only frame over rows the caller already knows to match `names`.
    pub(crate) fn with_rows(
        rows: impl Into<Rc<[Row]>>,
        column_names: Rc<[String]>,
        groups: Rc<[String]>,
    ) -> Self {
        Self {
            columns: OnceCell::new(),
            rows: OnceCell::from(rows.into()),
            groups,
            column_names,
        }
    }

    /// Column-only frame over vectors that are already validated.
    pub(crate) fn with_vectors(vectors: impl Into<Rc<[Vector]>>, groups: Rc<[String]>) -> Self {
        let vectors: Rc<[Vector]> = vectors.into();
        let column_names = vectors.iter().map(|v| v.name().to_owned()).collect();
        Self {
            columns: OnceCell::from(vectors),
            rows: OnceCell::new(),
            groups,
            column_names,
        }
    }

    /// The column view, derived from the rows on first use.
    pub fn columns(&self) -> Result<&[Vector], FrameError> {
        if let Some(columns) = self.columns.get() {
            return Ok(columns);
        }
        let rows = self.rows.get().ok_or(FrameError::NoData)?;
        trace!(
            rows = rows.len(),
            columns = self.column_names.len(),
            "deriving column view"
        );
        let derived = vectors_from_rows(&self.column_names, rows);
        Ok(self.columns.get_or_init(|| derived.into()))
    }

    /// The row view, derived from the vectors on first use.
    pub fn rows(&self) -> Result<&[Row], FrameError> {
        if let Some(rows) = self.rows.get() {
            return Ok(rows);
        }
        let vectors = self.columns.get().ok_or(FrameError::NoData)?;
        let len = vectors.first().map(Vector::len).ok_or(FrameError::NoData)?;
        trace!(rows = len, columns = vectors.len(), "deriving row view");
        let derived = rows_from_vectors(vectors, len);
        Ok(self.rows.get_or_init(|| derived.into()))
    }

    /// Number of rows, read from whichever view exists without deriving the other.
    pub fn count(&self) -> Result<usize, FrameError> {
        if let Some(first) = self.columns.get().and_then(|columns| columns.first()) {
            return Ok(first.len());
        }
        self.rows.get().map(|rows| rows.len()).ok_or(FrameError::NoData)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn group_names(&self) -> &[String] {
        &self.groups
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|known| known == name)
    }

    pub fn column(&self, name: &str) -> Result<&Vector, FrameError> {
        self.columns()?
            .iter()
            .find(|vector| vector.name() == name)
            .ok_or_else(|| FrameError::MissingColumn(name.to_owned()))
    }

    pub fn is_empty(&self) -> Result<bool, FrameError> {
        Ok(self.count()? == 0)
    }

    /// First `n` rows, as a new row-only frame.
    pub fn head(&self, n: usize) -> Result<Self, FrameError> {
        let rows = self.rows()?;
        let take = n.min(rows.len());
        Ok(Self::with_rows(
            &rows[..take],
            Rc::clone(&self.column_names),
            Rc::clone(&self.groups),
        ))
    }

    #[must_use]
    pub(crate) fn shared_names(&self) -> Rc<[String]> {
        Rc::clone(&self.column_names)
    }

    #[must_use]
    pub(crate) fn shared_groups(&self) -> Rc<[String]> {
        Rc::clone(&self.groups)
    }

    /// Whether the column view has been built (or was supplied).
    #[must_use]
    pub fn has_column_view(&self) -> bool {
        self.columns.get().is_some()
    }

    /// Whether the row view has been built (or was supplied).
    #[must_use]
    pub fn has_row_view(&self) -> bool {
        self.rows.get().is_some()
    }
}

fn cached<T>(value: Option<T>) -> OnceCell<T> {
    value.map_or_else(OnceCell::new, OnceCell::from)
}

fn order_vectors(vectors: Vec<Vector>, names: &[String]) -> Result<Vec<Vector>, FrameError> {
    if let Some(unlisted) = vectors
        .iter()
        .find(|vector| !names.iter().any(|name| name == vector.name()))
    {
        return Err(FrameError::MissingColumn(unlisted.name().to_owned()));
    }
    names
        .iter()
        .map(|name| {
            vectors
                .iter()
                .find(|vector| vector.name() == name)
                .cloned()
                .ok_or_else(|| FrameError::MissingColumn(name.clone()))
        })
        .collect()
}
