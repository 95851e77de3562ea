//! Simulation values: a concrete payload or the `Unknown` marker.
//!
//! Every operator defined on [`Value`] propagates `Unknown`: if either operand
//! is unknown, so is the result. Equality is deliberately non-reflexive for
//! the unknown case, the same way IEEE floats treat NaN: `Unknown` compares
//! unequal to everything, itself included.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub};

/// A simulation datum that is either not yet determined or a concrete value.
///
/// The default payload is `i64`, which is what signals and registers carry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Value<T = i64> {
    /// The simulation has not determined this value yet.
    Unknown,
    /// A determined value.
    Concrete(T),
}

impl<T> Default for Value<T> {
    fn default() -> Self {
        Value::Unknown
    }
}

impl<T> From<T> for Value<T> {
    fn from(value: T) -> Self {
        Value::Concrete(value)
    }
}

impl<T> Value<T> {
    /// Converts an `Option`, mapping `None` to [`Value::Unknown`].
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Value::Concrete(v),
            None => Value::Unknown,
        }
    }

    /// Returns `true` if the value is [`Value::Unknown`].
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// Returns `true` if the value is concrete.
    pub const fn is_concrete(&self) -> bool {
        matches!(self, Value::Concrete(_))
    }

    /// Returns the payload, or `None` if unknown.
    pub fn concrete(self) -> Option<T> {
        match self {
            Value::Concrete(v) => Some(v),
            Value::Unknown => None,
        }
    }

    /// Returns the payload, or `default` if unknown.
    pub fn unwrap_or(self, default: T) -> T {
        self.concrete().unwrap_or(default)
    }

    /// Borrows the payload.
    pub fn as_ref(&self) -> Value<&T> {
        match self {
            Value::Concrete(v) => Value::Concrete(v),
            Value::Unknown => Value::Unknown,
        }
    }

    /// Applies `f` to a concrete payload; unknown stays unknown.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Value<U> {
        match self {
            Value::Concrete(v) => Value::Concrete(f(v)),
            Value::Unknown => Value::Unknown,
        }
    }

    /// Applies a fallible `f` to a concrete payload.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Value<U>) -> Value<U> {
        match self {
            Value::Concrete(v) => f(v),
            Value::Unknown => Value::Unknown,
        }
    }

    /// Combines two values; the result is unknown if either side is.
    pub fn zip_with<U, R>(self, other: Value<U>, f: impl FnOnce(T, U) -> R) -> Value<R> {
        match (self, other) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(f(a, b)),
            _ => Value::Unknown,
        }
    }

    /// Converts the payload type. A conversion that does not fit yields unknown.
    pub fn cast<U: TryFrom<T>>(self) -> Value<U> {
        self.and_then(|v| Value::from_option(U::try_from(v).ok()))
    }
}

impl<T: PartialOrd> Value<T> {
    fn compare(&self, other: &Self, pred: impl FnOnce(Ordering) -> bool) -> Value<bool> {
        match (self, other) {
            (Value::Concrete(a), Value::Concrete(b)) => {
                Value::from_option(a.partial_cmp(b).map(pred))
            }
            _ => Value::Unknown,
        }
    }

    /// Three-valued `==`.
    pub fn cmp_eq(&self, other: &Self) -> Value<bool> {
        self.compare(other, Ordering::is_eq)
    }

    /// Three-valued `!=`.
    pub fn cmp_ne(&self, other: &Self) -> Value<bool> {
        self.compare(other, Ordering::is_ne)
    }

    /// Three-valued `<`.
    pub fn cmp_lt(&self, other: &Self) -> Value<bool> {
        self.compare(other, Ordering::is_lt)
    }

    /// Three-valued `<=`.
    pub fn cmp_le(&self, other: &Self) -> Value<bool> {
        self.compare(other, Ordering::is_le)
    }

    /// Three-valued `>`.
    pub fn cmp_gt(&self, other: &Self) -> Value<bool> {
        self.compare(other, Ordering::is_gt)
    }

    /// Three-valued `>=`.
    pub fn cmp_ge(&self, other: &Self) -> Value<bool> {
        self.compare(other, Ordering::is_ge)
    }
}

impl Value<bool> {
    /// Two-way multiplexer: `then` when true, `otherwise` when false,
    /// unknown when the select line is unknown.
    pub fn select<U>(self, then: Value<U>, otherwise: Value<U>) -> Value<U> {
        match self {
            Value::Concrete(true) => then,
            Value::Concrete(false) => otherwise,
            Value::Unknown => Value::Unknown,
        }
    }
}

impl<T: PartialEq> PartialEq for Value<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Concrete(a), Value::Concrete(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: PartialOrd> PartialOrd for Value<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Concrete(a), Value::Concrete(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => write!(f, "X"),
            Value::Concrete(v) => v.fmt(f),
        }
    }
}

/// Implements `Value op Value`, `Value op scalar` and `scalar op Value`
/// from a closure over two concrete payloads returning `Value`.
macro_rules! binop {
    ($t:ty, $trait:ident, $method:ident, |$a:ident, $b:ident| $body:expr) => {
        impl $trait for Value<$t> {
            type Output = Value<$t>;

            fn $method(self, rhs: Self) -> Value<$t> {
                self.zip_with(rhs, |$a: $t, $b: $t| $body).and_then(|v| v)
            }
        }

        impl $trait<$t> for Value<$t> {
            type Output = Value<$t>;

            fn $method(self, rhs: $t) -> Value<$t> {
                $trait::$method(self, Value::Concrete(rhs))
            }
        }

        impl $trait<Value<$t>> for $t {
            type Output = Value<$t>;

            fn $method(self, rhs: Value<$t>) -> Value<$t> {
                $trait::$method(Value::Concrete(self), rhs)
            }
        }
    };
}

macro_rules! scalar_cmp {
    ($t:ty) => {
        impl PartialEq<$t> for Value<$t> {
            fn eq(&self, other: &$t) -> bool {
                matches!(self, Value::Concrete(v) if v == other)
            }
        }

        impl PartialEq<Value<$t>> for $t {
            fn eq(&self, other: &Value<$t>) -> bool {
                other == self
            }
        }

        impl PartialOrd<$t> for Value<$t> {
            fn partial_cmp(&self, other: &$t) -> Option<Ordering> {
                match self {
                    Value::Concrete(v) => v.partial_cmp(other),
                    Value::Unknown => None,
                }
            }
        }
    };
}

// Integer arithmetic wraps like a hardware datapath. Division, remainder and
// shifts that the payload cannot represent produce unknown.
macro_rules! int_ops {
    ($($t:ty),*) => {$(
        binop!($t, Add, add, |a, b| Value::Concrete(a.wrapping_add(b)));
        binop!($t, Sub, sub, |a, b| Value::Concrete(a.wrapping_sub(b)));
        binop!($t, Mul, mul, |a, b| Value::Concrete(a.wrapping_mul(b)));
        binop!($t, Div, div, |a, b| Value::from_option(a.checked_div(b)));
        binop!($t, Rem, rem, |a, b| Value::from_option(a.checked_rem(b)));
        binop!($t, BitAnd, bitand, |a, b| Value::Concrete(a & b));
        binop!($t, BitOr, bitor, |a, b| Value::Concrete(a | b));
        binop!($t, BitXor, bitxor, |a, b| Value::Concrete(a ^ b));
        scalar_cmp!($t);

        impl Not for Value<$t> {
            type Output = Value<$t>;

            fn not(self) -> Value<$t> {
                self.map(|v| !v)
            }
        }

        impl Shl<u32> for Value<$t> {
            type Output = Value<$t>;

            fn shl(self, rhs: u32) -> Value<$t> {
                self.and_then(|v| Value::from_option(v.checked_shl(rhs)))
            }
        }

        impl Shr<u32> for Value<$t> {
            type Output = Value<$t>;

            fn shr(self, rhs: u32) -> Value<$t> {
                self.and_then(|v| Value::from_option(v.checked_shr(rhs)))
            }
        }

        impl Shl<Value<u32>> for Value<$t> {
            type Output = Value<$t>;

            fn shl(self, rhs: Value<u32>) -> Value<$t> {
                rhs.and_then(|n| self << n)
            }
        }

        impl Shr<Value<u32>> for Value<$t> {
            type Output = Value<$t>;

            fn shr(self, rhs: Value<u32>) -> Value<$t> {
                rhs.and_then(|n| self >> n)
            }
        }
    )*};
}

macro_rules! signed_ops {
    ($($t:ty),*) => {$(
        impl Neg for Value<$t> {
            type Output = Value<$t>;

            fn neg(self) -> Value<$t> {
                self.map(|v| v.wrapping_neg())
            }
        }
    )*};
}

int_ops!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
signed_ops!(i8, i16, i32, i64, i128, isize);

binop!(bool, BitAnd, bitand, |a, b| Value::Concrete(a & b));
binop!(bool, BitOr, bitor, |a, b| Value::Concrete(a | b));
binop!(bool, BitXor, bitxor, |a, b| Value::Concrete(a ^ b));
scalar_cmp!(bool);

impl Not for Value<bool> {
    type Output = Value<bool>;

    fn not(self) -> Value<bool> {
        self.map(|v| !v)
    }
}
