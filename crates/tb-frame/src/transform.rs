//! Stateless transforms: select, filter, sort, mutate.

use std::cmp::Ordering;
use std::rc::Rc;

use tb_columnar::{Row, Vector};
use tb_types::{Scalar, TypeError};
use tracing::debug;

use crate::summary::{Mutation, Mutations};
use crate::{Dataframe, FrameError};

/// Which columns `select` keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Column(String),
    Columns(Vec<String>),
    /// `(new name, existing name)` pairs, in output order.
    Rename(Vec<(String, String)>),
}

impl Selection {
    pub fn rename<N, O>(pairs: impl IntoIterator<Item = (N, O)>) -> Self
    where
        N: Into<String>,
        O: Into<String>,
    {
        Self::Rename(
            pairs
                .into_iter()
                .map(|(new, old)| (new.into(), old.into()))
                .collect(),
        )
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Self::Column(name.to_owned())
    }
}

impl From<String> for Selection {
    fn from(name: String) -> Self {
        Self::Column(name)
    }
}

impl From<&[&str]> for Selection {
    fn from(names: &[&str]) -> Self {
        Self::Columns(names.iter().map(|name| (*name).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(names: [&str; N]) -> Self {
        Self::from(&names[..])
    }
}

impl From<Vec<String>> for Selection {
    fn from(names: Vec<String>) -> Self {
        Self::Columns(names)
    }
}

/// One sort key. Parsed from a column name, where a leading `-` means
/// descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    #[must_use]
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(column) => Self::desc(column),
            None => Self::asc(key),
        }
    }

    /// Missing values go last in both directions; only the comparison of
    /// present values flips for a descending key.
    fn compare(&self, left: &Row, right: &Row) -> Ordering {
        let (a, b) = (left.get(&self.column), right.get(&self.column));
        match (a.is_missing(), b.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let order = a.sort_cmp(b);
                if self.descending { order.reverse() } else { order }
            }
        }
    }

    /// Every present value in the key column must be comparable with the
    /// first one.
    fn check_comparable(&self, rows: &[Row]) -> Result<(), TypeError> {
        let mut present = rows
            .iter()
            .map(|row| row.get(&self.column))
            .filter(|value| !value.is_missing());
        if let Some(first) = present.next() {
            for value in present {
                first.compare(value)?;
            }
        }
        Ok(())
    }
}

impl From<&str> for SortKey {
    fn from(key: &str) -> Self {
        Self::parse(key)
    }
}

impl Dataframe {
    /// Projects columns. The kept vectors share storage with this frame.
    pub fn select(&self, selection: impl Into<Selection>) -> Result<Self, FrameError> {
        let columns = self.columns()?;
        let find = |name: &str| {
            columns
                .iter()
                .find(|vector| vector.name() == name)
                .ok_or_else(|| FrameError::MissingColumn(name.to_owned()))
        };

        let picked: Vec<Vector> = match selection.into() {
            Selection::Column(name) => vec![find(&name)?.clone()],
            // Names with no matching column are skipped.
            Selection::Columns(names) => names
                .iter()
                .filter_map(|name| find(name).ok().cloned())
                .collect(),
            Selection::Rename(pairs) => pairs
                .iter()
                .map(|(new, old)| find(old).map(|vector| vector.renamed(new.as_str())))
                .collect::<Result<_, _>>()?,
        };

        if let Some(dup) = picked
            .iter()
            .enumerate()
            .find(|(pos, v)| picked[..*pos].iter().any(|seen| seen.name() == v.name()))
        {
            return Err(FrameError::DuplicateColumn(dup.1.name().to_owned()));
        }

        debug!(columns = picked.len(), "select");
        if picked.is_empty() {
            // Zero columns still carry the row count.
            let rows = vec![Row::new(); self.count()?];
            return Ok(Self::with_rows(rows, Rc::from([]), Rc::from([])));
        }
        Ok(Self::with_vectors(picked, Rc::from([])))
    }

    /// Keeps the rows for which `predicate` holds, in their original order.
    pub fn filter<F>(&self, predicate: F) -> Result<Self, FrameError>
    where
        F: Fn(&Row) -> bool,
    {
        let rows = self.rows()?;
        let kept: Vec<Row> = rows.iter().filter(|row| predicate(row)).cloned().collect();
        debug!(rows_in = rows.len(), rows_out = kept.len(), "filter");
        Ok(Self::with_rows(kept, self.shared_names(), Rc::from([])))
    }

    /// Stable multi-key sort. Keys are column names, `-`-prefixed for
    /// descending order.
    pub fn sort<K>(&self, keys: &[K]) -> Result<Self, FrameError>
    where
        K: AsRef<str>,
    {
        let keys: Vec<SortKey> = keys.iter().map(|key| SortKey::parse(key.as_ref())).collect();
        if let Some(missing) = keys.iter().find(|key| !self.has_column(&key.column)) {
            return Err(FrameError::MissingColumn(missing.column.clone()));
        }

        let rows = self.rows()?;
        for key in &keys {
            key.check_comparable(rows)?;
        }
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            keys.iter()
                .map(|key| key.compare(&rows[a], &rows[b]))
                .find(|order| order.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        let sorted: Vec<Row> = order.into_iter().map(|idx| rows[idx].clone()).collect();
        debug!(rows = sorted.len(), keys = keys.len(), "sort");
        Ok(Self::with_rows(sorted, self.shared_names(), Rc::from([])))
    }

    /// Adds one column per field, in order. Each field sees the columns
    /// added by the fields before it. Accumulator fields are folded over the
    /// current grouping and broadcast back to every row of each group.
    pub fn mutate(&self, mutations: &Mutations) -> Result<Self, FrameError> {
        let mut frame = self.clone();
        for (name, mutation) in &mutations.fields {
            if frame.has_column(name) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
            let values: Vec<Scalar> = match mutation {
                Mutation::Map(func) => frame
                    .rows()?
                    .iter()
                    .map(|row| func(row))
                    .collect::<Result<_, _>>()?,
                Mutation::Summary(accumulator) => {
                    let folded = frame.fold(&[accumulator.as_ref()])?;
                    folded
                        .row_groups
                        .iter()
                        .map(|&group| folded.groups[group].results[0].clone())
                        .collect()
                }
            };
            frame = frame.append_vector(Vector::new(name.as_str(), values))?;
        }
        debug!(fields = mutations.len(), "mutate");
        Ok(frame)
    }

    /// This frame's columns plus `vector`, keeping the grouping.
    fn append_vector(&self, vector: Vector) -> Result<Self, FrameError> {
        let mut vectors: Vec<Vector> = self.columns()?.to_vec();
        vectors.push(vector);
        tb_columnar::validate_vectors(&vectors)?;
        Ok(Self::with_vectors(vectors, self.shared_groups()))
    }
}
