#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
}

/// A single cell value.
///
/// Rows and vectors are heterogeneous: nothing forces a column to hold a
/// single variant, so every operation that combines two scalars has to
/// decide per pair of variants whether the combination is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("values of dtype {left:?} and {right:?} cannot be ordered against each other")]
    Incomparable { left: DType, right: DType },
    #[error("operator {op} is undefined for dtypes {left:?} and {right:?}")]
    NonNumericOperands {
        op: &'static str,
        left: DType,
        right: DType,
    },
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null or a NaN float.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(v) => *v,
            Self::Int64(v) => *v != 0,
            Self::Float64(v) => *v != 0.0 && !v.is_nan(),
            Self::Utf8(v) => !v.is_empty(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            other => Err(TypeError::NonNumericValue {
                value: other.to_string(),
                dtype: other.dtype(),
            }),
        }
    }

    /// Natural ordering between two values.
    ///
    /// Numbers compare numerically across `Int64`/`Float64`, strings
    /// lexicographically and booleans with `false < true`. Two nulls are
    /// equal. Every other pairing is an error rather than a guess.
    pub fn compare(&self, other: &Self) -> Result<Ordering, TypeError> {
        match (self, other) {
            (Self::Null, Self::Null) => Ok(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Ok(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Ok(a.cmp(b)),
            (Self::Utf8(a), Self::Utf8(b)) => Ok(a.cmp(b)),
            (Self::Float64(a), Self::Float64(b)) => Ok(compare_floats(*a, *b)),
            (Self::Int64(a), Self::Float64(b)) => Ok(compare_int_float(*a, *b)),
            (Self::Float64(a), Self::Int64(b)) => Ok(compare_int_float(*b, *a).reverse()),
            _ => Err(TypeError::Incomparable {
                left: self.dtype(),
                right: other.dtype(),
            }),
        }
    }

    /// Total order used for sorting. Agrees with [`Scalar::compare`] wherever
    /// that succeeds; incomparable pairs fall back to dtype order.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|_| self.dtype().cmp(&other.dtype()))
    }

    pub fn binary(&self, other: &Self, op: ArithmeticOp) -> Result<Self, TypeError> {
        match (self, other) {
            (Self::Null, Self::Null | Self::Int64(_) | Self::Float64(_))
            | (Self::Int64(_) | Self::Float64(_), Self::Null) => Ok(Self::Null),
            (Self::Int64(a), Self::Int64(b)) => Ok(int_binary(*a, *b, op)),
            (Self::Int64(_) | Self::Float64(_), Self::Int64(_) | Self::Float64(_)) => {
                let lhs = self.to_f64()?;
                let rhs = other.to_f64()?;
                Ok(Self::Float64(float_binary(lhs, rhs, op)))
            }
            _ => Err(TypeError::NonNumericOperands {
                op: op.symbol(),
                left: self.dtype(),
                right: other.dtype(),
            }),
        }
    }

    pub fn add(&self, other: &Self) -> Result<Self, TypeError> {
        self.binary(other, ArithmeticOp::Add)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, TypeError> {
        self.binary(other, ArithmeticOp::Sub)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, TypeError> {
        self.binary(other, ArithmeticOp::Mul)
    }

    pub fn div(&self, other: &Self) -> Result<Self, TypeError> {
        self.binary(other, ArithmeticOp::Div)
    }
}

/// `-0.0` equals `0.0`, matching group-key equality. NaNs keep their
/// `total_cmp` position at either end.
fn compare_floats(a: f64, b: f64) -> Ordering {
    if a == b { Ordering::Equal } else { a.total_cmp(&b) }
}

/// Exact: no rounding of `int` through `f64`.
fn compare_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float above i64::MAX.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    int.cmp(&(whole as i64)).then_with(|| {
        let fraction = float - whole;
        if fraction > 0.0 {
            Ordering::Less
        } else if fraction < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

fn int_binary(a: i64, b: i64, op: ArithmeticOp) -> Scalar {
    let checked = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Sub => a.checked_sub(b),
        ArithmeticOp::Mul => a.checked_mul(b),
        ArithmeticOp::Div => None,
    };
    match checked {
        Some(v) => Scalar::Int64(v),
        // Overflow and division leave the integer domain.
        None => Scalar::Float64(float_binary(a as f64, b as f64, op)),
    }
}

fn float_binary(a: f64, b: f64, op: ArithmeticOp) -> f64 {
    match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Sub => a - b,
        ArithmeticOp::Mul => a * b,
        ArithmeticOp::Div => a / b,
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{DType, Scalar, TypeError};

    #[test]
    fn numbers_compare_across_int_and_float() {
        let int = Scalar::Int64(2);
        let float = Scalar::Float64(2.5);
        assert_eq!(int.compare(&float), Ok(Ordering::Less));
        assert_eq!(float.compare(&int), Ok(Ordering::Greater));
        assert_eq!(
            Scalar::Int64(3).compare(&Scalar::Float64(3.0)),
            Ok(Ordering::Equal)
        );
    }

    #[test]
    fn int_float_comparison_is_exact_past_f64_precision() {
        let big = 1_i64 << 53;
        let float = Scalar::Float64(big as f64);
        assert_eq!(Scalar::Int64(big + 1).compare(&float), Ok(Ordering::Greater));
        assert_eq!(Scalar::Int64(big).compare(&float), Ok(Ordering::Equal));
        assert_eq!(
            Scalar::Int64(i64::MAX).compare(&Scalar::Float64(9_223_372_036_854_775_808.0)),
            Ok(Ordering::Less)
        );
        assert_eq!(
            Scalar::Int64(-3).compare(&Scalar::Float64(-2.5)),
            Ok(Ordering::Less)
        );
        assert_eq!(
            Scalar::Float64(-2.5).compare(&Scalar::Int64(-2)),
            Ok(Ordering::Less)
        );
    }

    #[test]
    fn signed_zeros_compare_equal() {
        assert_eq!(
            Scalar::Float64(-0.0).compare(&Scalar::Float64(0.0)),
            Ok(Ordering::Equal)
        );
        assert_eq!(
            Scalar::Float64(-0.0).compare(&Scalar::Int64(0)),
            Ok(Ordering::Equal)
        );
    }

    #[test]
    fn sort_order_is_total_over_mixed_dtypes() {
        let values = [
            Scalar::from("t"),
            Scalar::Int64(1),
            Scalar::Bool(true),
            Scalar::Float64(0.5),
        ];
        assert_eq!(values[0].sort_cmp(&values[1]), Ordering::Greater);
        assert_eq!(values[2].sort_cmp(&values[3]), Ordering::Less);
        assert_eq!(values[1].sort_cmp(&values[3]), Ordering::Greater);
    }

    #[test]
    fn strings_compare_lexicographically() {
        let a = Scalar::from("apple");
        let b = Scalar::from("banana");
        assert_eq!(a.compare(&b), Ok(Ordering::Less));
    }

    #[test]
    fn mixed_text_and_number_is_not_comparable() {
        let err = Scalar::from("x")
            .compare(&Scalar::Int64(1))
            .expect_err("must fail");
        assert_eq!(
            err,
            TypeError::Incomparable {
                left: DType::Utf8,
                right: DType::Int64,
            }
        );
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let out = Scalar::Int64(4).mul(&Scalar::Int64(5)).expect("mul");
        assert_eq!(out, Scalar::Int64(20));
    }

    #[test]
    fn integer_overflow_promotes_to_float() {
        let out = Scalar::Int64(i64::MAX).add(&Scalar::Int64(1)).expect("add");
        assert!(matches!(out, Scalar::Float64(_)));
    }

    #[test]
    fn division_is_float_and_tolerates_zero() {
        assert_eq!(
            Scalar::Int64(3).div(&Scalar::Int64(2)).expect("div"),
            Scalar::Float64(1.5)
        );
        let out = Scalar::Int64(0).div(&Scalar::Int64(0)).expect("div");
        assert!(out.is_missing());
    }

    #[test]
    fn null_operand_propagates() {
        assert_eq!(
            Scalar::Null.add(&Scalar::Float64(1.0)).expect("add"),
            Scalar::Null
        );
    }

    #[test]
    fn text_arithmetic_is_rejected() {
        let err = Scalar::from("a")
            .add(&Scalar::Int64(1))
            .expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "operator + is undefined for dtypes Utf8 and Int64"
        );
    }

    #[test]
    fn json_shape_is_untagged() {
        let values = vec![
            Scalar::Null,
            Scalar::Bool(true),
            Scalar::Int64(7),
            Scalar::Float64(1.5),
            Scalar::from("x"),
        ];
        let json = serde_json::to_string(&values).expect("serialize");
        assert_eq!(json, r#"[null,true,7,1.5,"x"]"#);
        let back: Vec<Scalar> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, values);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Scalar::from(None::<i64>), Scalar::Null);
        assert_eq!(Scalar::from(Some("a")), Scalar::from("a"));
    }
}
