#![forbid(unsafe_code)]

//! Hash joins between two dataframes.
//!
//! Both sides are keyed with the same canonical [`GroupKey`] encoding the
//! aggregation engine uses, so a join key matches exactly when a group key
//! would.

use std::{collections::HashMap, mem::size_of};

use bumpalo::{Bump, collections::Vec as BumpVec};
use tb_columnar::{GroupKey, Row};
use tb_frame::{Dataframe, FrameError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Left,
    Right,
    Inner,
    Full,
}

impl JoinType {
    fn scans_left(self) -> bool {
        !matches!(self, Self::Right)
    }

    fn scans_right(self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }

    fn keeps_unmatched_left(self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }
}

/// How join keys are derived from each side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JoinOn {
    /// Every column present by name in both frames.
    #[default]
    Natural,
    Column(String),
    Columns(Vec<String>),
    /// `(left column, right column)` pairs.
    Mapping(Vec<(String, String)>),
}

impl JoinOn {
    pub fn mapping<L, R>(pairs: impl IntoIterator<Item = (L, R)>) -> Self
    where
        L: Into<String>,
        R: Into<String>,
    {
        Self::Mapping(
            pairs
                .into_iter()
                .map(|(left, right)| (left.into(), right.into()))
                .collect(),
        )
    }
}

impl From<&str> for JoinOn {
    fn from(name: &str) -> Self {
        Self::Column(name.to_owned())
    }
}

impl From<String> for JoinOn {
    fn from(name: String) -> Self {
        Self::Column(name)
    }
}

impl From<&[&str]> for JoinOn {
    fn from(names: &[&str]) -> Self {
        Self::Columns(names.iter().map(|name| (*name).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for JoinOn {
    fn from(names: [&str; N]) -> Self {
        Self::from(&names[..])
    }
}

impl From<Vec<String>> for JoinOn {
    fn from(names: Vec<String>) -> Self {
        Self::Columns(names)
    }
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("unsupported join key specification: {0}")]
    UnsupportedJoinSpec(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JoinExecutionTrace {
    used_arena: bool,
    output_rows: usize,
    estimated_bytes: usize,
}

/// Matched row positions: left, right, or both.
type Pair = (Option<usize>, Option<usize>);

struct KeyColumns {
    left: Vec<String>,
    right: Vec<String>,
    natural: bool,
}

pub fn left_join(
    left: &Dataframe,
    right: &Dataframe,
    on: impl Into<JoinOn>,
) -> Result<Dataframe, JoinError> {
    join(left, right, JoinType::Left, on)
}

pub fn right_join(
    left: &Dataframe,
    right: &Dataframe,
    on: impl Into<JoinOn>,
) -> Result<Dataframe, JoinError> {
    join(left, right, JoinType::Right, on)
}

pub fn inner_join(
    left: &Dataframe,
    right: &Dataframe,
    on: impl Into<JoinOn>,
) -> Result<Dataframe, JoinError> {
    join(left, right, JoinType::Inner, on)
}

pub fn full_join(
    left: &Dataframe,
    right: &Dataframe,
    on: impl Into<JoinOn>,
) -> Result<Dataframe, JoinError> {
    join(left, right, JoinType::Full, on)
}

pub fn join(
    left: &Dataframe,
    right: &Dataframe,
    join_type: JoinType,
    on: impl Into<JoinOn>,
) -> Result<Dataframe, JoinError> {
    join_with_options(
        left,
        right,
        join_type,
        &on.into(),
        JoinExecutionOptions::default(),
    )
}

pub fn join_with_options(
    left: &Dataframe,
    right: &Dataframe,
    join_type: JoinType,
    on: &JoinOn,
    options: JoinExecutionOptions,
) -> Result<Dataframe, JoinError> {
    let (joined, _) = join_with_trace(left, right, join_type, on, options)?;
    Ok(joined)
}

fn join_with_trace(
    left: &Dataframe,
    right: &Dataframe,
    join_type: JoinType,
    on: &JoinOn,
    options: JoinExecutionOptions,
) -> Result<(Dataframe, JoinExecutionTrace), JoinError> {
    let keys = resolve_keys(left, right, on)?;
    let left_rows = left.rows()?;
    let right_rows = right.rows()?;

    let left_keys: Vec<GroupKey> = left_rows
        .iter()
        .map(|row| GroupKey::from_row(row, &keys.left))
        .collect();
    let right_keys: Vec<GroupKey> = right_rows
        .iter()
        .map(|row| GroupKey::from_row(row, &keys.right))
        .collect();

    // Borrowed keys: each side's encoded keys outlive its index.
    let right_index = if join_type.scans_left() {
        index_positions(&right_keys)
    } else {
        HashMap::new()
    };
    let left_index = if join_type.scans_right() {
        index_positions(&left_keys)
    } else {
        HashMap::new()
    };

    let output_rows =
        estimate_output_rows(&left_keys, &right_keys, &left_index, &right_index, join_type);
    let estimated_bytes = output_rows.saturating_mul(size_of::<Pair>());
    let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;

    let rows = if use_arena {
        let arena = Bump::new();
        let mut pairs = BumpVec::<Pair>::with_capacity_in(output_rows, &arena);
        stage_pairs(
            &left_keys,
            &right_keys,
            &left_index,
            &right_index,
            join_type,
            |pair| pairs.push(pair),
        );
        materialize(pairs.as_slice(), left_rows, right_rows, join_type)
    } else {
        let mut pairs = Vec::<Pair>::with_capacity(output_rows);
        stage_pairs(
            &left_keys,
            &right_keys,
            &left_index,
            &right_index,
            join_type,
            |pair| pairs.push(pair),
        );
        materialize(&pairs, left_rows, right_rows, join_type)
    };

    let names = if keys.natural || rows.is_empty() {
        left_then_right_only(left, right)
    } else {
        union_of_row_names(&rows)
    };
    let rows: Vec<Row> = rows.iter().map(|row| row.project(&names)).collect();

    debug!(
        ?join_type,
        left_rows = left_rows.len(),
        right_rows = right_rows.len(),
        output_rows,
        used_arena = use_arena,
        "join"
    );

    let joined = Dataframe::new(None, Some(rows), Vec::new(), Some(names))?;
    Ok((
        joined,
        JoinExecutionTrace {
            used_arena: use_arena,
            output_rows,
            estimated_bytes,
        },
    ))
}

fn resolve_keys(left: &Dataframe, right: &Dataframe, on: &JoinOn) -> Result<KeyColumns, JoinError> {
    let (left_names, right_names) = match on {
        JoinOn::Natural => {
            let shared: Vec<String> = left
                .column_names()
                .iter()
                .filter(|name| right.has_column(name))
                .cloned()
                .collect();
            if shared.is_empty() {
                return Err(JoinError::UnsupportedJoinSpec(
                    "natural join needs at least one column present in both frames".to_owned(),
                ));
            }
            return Ok(KeyColumns {
                left: shared.clone(),
                right: shared,
                natural: true,
            });
        }
        JoinOn::Column(name) => (vec![name.clone()], vec![name.clone()]),
        JoinOn::Columns(names) if names.is_empty() => {
            return Err(JoinError::UnsupportedJoinSpec(
                "empty key column list".to_owned(),
            ));
        }
        JoinOn::Columns(names) => (names.clone(), names.clone()),
        JoinOn::Mapping(pairs) if pairs.is_empty() => {
            return Err(JoinError::UnsupportedJoinSpec("empty key mapping".to_owned()));
        }
        JoinOn::Mapping(pairs) => pairs.iter().cloned().unzip(),
    };

    for (frame, names) in [(left, &left_names), (right, &right_names)] {
        if let Some(missing) = names.iter().find(|name| !frame.has_column(name)) {
            return Err(FrameError::MissingColumn(missing.clone()).into());
        }
    }

    Ok(KeyColumns {
        left: left_names,
        right: right_names,
        natural: false,
    })
}

fn index_positions(keys: &[GroupKey]) -> HashMap<&GroupKey, Vec<usize>> {
    let mut index = HashMap::<&GroupKey, Vec<usize>>::new();
    for (pos, key) in keys.iter().enumerate() {
        index.entry(key).or_default().push(pos);
    }
    index
}

fn estimate_output_rows(
    left_keys: &[GroupKey],
    right_keys: &[GroupKey],
    left_index: &HashMap<&GroupKey, Vec<usize>>,
    right_index: &HashMap<&GroupKey, Vec<usize>>,
    join_type: JoinType,
) -> usize {
    let left_pass: usize = if join_type.scans_left() {
        left_keys
            .iter()
            .map(|key| match right_index.get(key) {
                Some(matches) => matches.len(),
                None if join_type.keeps_unmatched_left() => 1,
                None => 0,
            })
            .sum()
    } else {
        0
    };
    let right_pass: usize = right_keys
        .iter()
        .map(|key| match (join_type, left_index.get(key)) {
            (JoinType::Right, Some(matches)) => matches.len(),
            (JoinType::Right | JoinType::Full, None) => 1,
            _ => 0,
        })
        .sum();
    left_pass + right_pass
}

/// Emits position pairs in output order: the left pass first, then the
/// right pass.
fn stage_pairs(
    left_keys: &[GroupKey],
    right_keys: &[GroupKey],
    left_index: &HashMap<&GroupKey, Vec<usize>>,
    right_index: &HashMap<&GroupKey, Vec<usize>>,
    join_type: JoinType,
    mut push: impl FnMut(Pair),
) {
    if join_type.scans_left() {
        for (left_pos, key) in left_keys.iter().enumerate() {
            if let Some(matches) = right_index.get(key) {
                for &right_pos in matches {
                    push((Some(left_pos), Some(right_pos)));
                }
                continue;
            }
            if join_type.keeps_unmatched_left() {
                push((Some(left_pos), None));
            }
        }
    }

    if join_type.scans_right() {
        for (right_pos, key) in right_keys.iter().enumerate() {
            match left_index.get(key) {
                None => push((None, Some(right_pos))),
                Some(matches) if join_type == JoinType::Right => {
                    for &left_pos in matches {
                        push((Some(left_pos), Some(right_pos)));
                    }
                }
                // Full: matched right rows were emitted by the left pass.
                Some(_) => {}
            }
        }
    }
}

/// Merges each pair into one row. In a right join the left side wins field
/// collisions; otherwise the right side does.
fn materialize(
    pairs: &[Pair],
    left_rows: &[Row],
    right_rows: &[Row],
    join_type: JoinType,
) -> Vec<Row> {
    pairs
        .iter()
        .filter_map(|pair| match *pair {
            (Some(l), Some(r)) if join_type == JoinType::Right => {
                let mut row = right_rows[r].clone();
                row.overlay(&left_rows[l]);
                Some(row)
            }
            (Some(l), Some(r)) => {
                let mut row = left_rows[l].clone();
                row.overlay(&right_rows[r]);
                Some(row)
            }
            (Some(l), None) => Some(left_rows[l].clone()),
            (None, Some(r)) => Some(right_rows[r].clone()),
            (None, None) => None,
        })
        .collect()
}

fn left_then_right_only(left: &Dataframe, right: &Dataframe) -> Vec<String> {
    let mut names = left.column_names().to_vec();
    names.extend(
        right
            .column_names()
            .iter()
            .filter(|name| !left.has_column(name))
            .cloned(),
    );
    names
}

fn union_of_row_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for name in row.names() {
            if !names.iter().any(|known| known == name) {
                names.push(name.to_owned());
            }
        }
    }
    names
}

/// Join methods on [`Dataframe`].
pub trait Join {
    fn join_with(
        &self,
        right: &Dataframe,
        join_type: JoinType,
        on: impl Into<JoinOn>,
    ) -> Result<Dataframe, JoinError>;

    fn left_join(&self, right: &Dataframe, on: impl Into<JoinOn>) -> Result<Dataframe, JoinError> {
        self.join_with(right, JoinType::Left, on)
    }

    fn right_join(&self, right: &Dataframe, on: impl Into<JoinOn>) -> Result<Dataframe, JoinError> {
        self.join_with(right, JoinType::Right, on)
    }

    fn inner_join(&self, right: &Dataframe, on: impl Into<JoinOn>) -> Result<Dataframe, JoinError> {
        self.join_with(right, JoinType::Inner, on)
    }

    fn full_join(&self, right: &Dataframe, on: impl Into<JoinOn>) -> Result<Dataframe, JoinError> {
        self.join_with(right, JoinType::Full, on)
    }
}

impl Join for Dataframe {
    fn join_with(
        &self,
        right: &Dataframe,
        join_type: JoinType,
        on: impl Into<JoinOn>,
    ) -> Result<Dataframe, JoinError> {
        join(self, right, join_type, on)
    }
}
