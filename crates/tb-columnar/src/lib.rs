#![forbid(unsafe_code)]

use std::ops::Index;
use std::rc::Rc;

use serde::ser::{Serialize, SerializeMap, Serializer};
pub use tb_types::Scalar;
use thiserror::Error;

static NULL: Scalar = Scalar::Null;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColumnError {
    #[error("vector {name:?} has length {actual} but the frame has {expected} rows")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("vector name {0:?} appears more than once")]
    DuplicateName(String),
}

/// A named column. Values sit behind an `Rc` so a renamed or re-selected
/// vector shares storage with the one it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    name: String,
    values: Rc<[Scalar]>,
}

impl Vector {
    pub fn new(name: impl Into<String>, values: impl Into<Rc<[Scalar]>>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }

    pub fn from_values<T: Into<Scalar>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::new(
            name,
            values.into_iter().map(Into::into).collect::<Rc<[Scalar]>>(),
        )
    }

    /// Same values under a different name, without copying them.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Rc::clone(&self.values),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn shares_values_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.values, &other.values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }
}

/// Checks that names are unique and every vector has the same length.
/// Returns that common length, or `None` for an empty vector list.
pub fn validate_vectors(vectors: &[Vector]) -> Result<Option<usize>, ColumnError> {
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    let expected = first.len();
    for (pos, vector) in vectors.iter().enumerate() {
        if vector.len() != expected {
            return Err(ColumnError::LengthMismatch {
                name: vector.name.clone(),
                expected,
                actual: vector.len(),
            });
        }
        if vectors[..pos].iter().any(|seen| seen.name == vector.name) {
            return Err(ColumnError::DuplicateName(vector.name.clone()));
        }
    }
    Ok(Some(expected))
}

/// One record: an ordered mapping from column name to value.
///
/// Lookups of a name the row does not carry yield `Scalar::Null`, which is
/// how join output marks fields contributed by an unmatched side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Scalar)>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> &Scalar {
        self.try_get(name).unwrap_or(&NULL)
    }

    #[must_use]
    pub fn try_get(&self, name: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(key, _)| key == name)
    }

    /// Sets `name`, replacing the value in place when the name is already
    /// present so field order is that of first insertion.
    pub fn insert(&mut self, name: impl Into<String>, value: Scalar) {
        let name = name.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Overlays every field of `other` onto this row; `other` wins on collision.
    pub fn overlay(&mut self, other: &Self) {
        for (name, value) in &other.fields {
            self.insert(name.as_str(), value.clone());
        }
    }

    /// Copy of this row holding exactly `names`, in that order.
    #[must_use]
    pub fn project(&self, names: &[String]) -> Self {
        names
            .iter()
            .map(|name| (name.clone(), self.get(name).clone()))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> + '_ {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
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

impl Index<&str> for Row {
    type Output = Scalar;

    fn index(&self, name: &str) -> &Scalar {
        self.get(name)
    }
}

impl<K: Into<String>> FromIterator<(K, Scalar)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Scalar)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Builds a [`Row`] from `name => value` pairs.
///
/// ```
/// use tb_columnar::row;
///
/// let row = row! { "id" => 1, "name" => "a" };
/// assert_eq!(row["id"], tb_columnar::Scalar::Int64(1));
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::Row::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {
        <$crate::Row as ::std::iter::FromIterator<(::std::string::String, $crate::Scalar)>>::from_iter([
            $((::std::string::String::from($name), $crate::Scalar::from($value))),+
        ])
    };
}

/// Union of all row keys, in first-seen order.
#[must_use]
pub fn infer_row_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for name in row.names() {
            if !names.iter().any(|seen| seen == name) {
                names.push(name.to_owned());
            }
        }
    }
    names
}

/// Projects each name across all rows.
#[must_use]
pub fn vectors_from_rows(names: &[String], rows: &[Row]) -> Vec<Vector> {
    names
        .iter()
        .map(|name| {
            let values: Rc<[Scalar]> = rows.iter().map(|row| row.get(name).clone()).collect();
            Vector::new(name.clone(), values)
        })
        .collect()
}

/// Zips vectors positionally into rows. `vectors` must already be validated.
#[must_use]
pub fn rows_from_vectors(vectors: &[Vector], len: usize) -> Vec<Row> {
    (0..len)
        .map(|idx| {
            vectors
                .iter()
                .map(|vector| (vector.name.clone(), vector.values[idx].clone()))
                .collect()
        })
        .collect()
}

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_UTF8: u8 = 5;

/// Canonical encoding of a tuple of scalars, used as the hash key for
/// grouping and joins.
///
/// Every element is self-delimiting (a tag byte plus a fixed-width or
/// length-prefixed payload), so two tuples share an encoding only when they
/// hold equal values. Integral floats encode as integers so `1` and `1.0`
/// land in the same group, and all NaNs share one encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(Vec<u8>);

impl GroupKey {
    /// The key of the empty tuple: the single group of an ungrouped frame.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn encode<'a>(values: impl IntoIterator<Item = &'a Scalar>) -> Self {
        let mut key = Self::empty();
        for value in values {
            key.push(value);
        }
        key
    }

    #[must_use]
    pub fn from_row(row: &Row, names: &[String]) -> Self {
        Self::encode(names.iter().map(|name| row.get(name)))
    }

    pub fn push(&mut self, value: &Scalar) {
        let buf = &mut self.0;
        match value {
            Scalar::Null => buf.push(TAG_NULL),
            Scalar::Bool(false) => buf.push(TAG_FALSE),
            Scalar::Bool(true) => buf.push(TAG_TRUE),
            Scalar::Int64(v) => {
                buf.push(TAG_INT);
                buf.extend_from_slice(&v.to_be_bytes());
            }
            Scalar::Float64(v) => match integral_float(*v) {
                Some(int) => {
                    buf.push(TAG_INT);
                    buf.extend_from_slice(&int.to_be_bytes());
                }
                None => {
                    let bits = if v.is_nan() {
                        f64::NAN.to_bits()
                    } else {
                        v.to_bits()
                    };
                    buf.push(TAG_FLOAT);
                    buf.extend_from_slice(&bits.to_be_bytes());
                }
            },
            Scalar::Utf8(v) => {
                buf.push(TAG_UTF8);
                buf.extend_from_slice(&(v.len() as u64).to_be_bytes());
                buf.extend_from_slice(v.as_bytes());
            }
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn integral_float(value: f64) -> Option<i64> {
    // 2^63 itself is out of i64 range, hence the strict upper bound.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if value.is_finite() && value.fract() == 0.0 && value >= -LIMIT && value < LIMIT {
        Some(value as i64)
    } else {
        None
    }
}
