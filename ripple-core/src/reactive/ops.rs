//! Ready-made operator functions.
//!
//! Each constructor returns a [`Func`] with operator notation, so a node
//! built from it describes itself the way the expression would be written:
//!
//! ```rust,ignore
//! let q = construct_derived(ops::div(), [Arg::from(&v), Arg::from(&w)])?;
//! assert_eq!(q.to_string(), "V / W");
//! ```
//!
//! Numeric operands follow the usual promotion rules: two integers stay an
//! integer (checked for overflow), anything involving a float becomes a
//! float, and true division always yields a float.

use crate::error::ComputeError;

use super::func::{expect_arity, ComputeResult, Func};
use super::value::Value;

const PREC_COMPARE: u8 = 10;
const PREC_ADD: u8 = 60;
const PREC_MUL: u8 = 70;
const PREC_UNARY: u8 = 80;
const PREC_POW: u8 = 90;

enum Pair {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numeric(op: &'static str, lhs: &Value, rhs: &Value) -> Result<Pair, ComputeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Pair::Ints(*a, *b)),
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => Ok(Pair::Floats(a, b)),
            _ => Err(unsupported(op, lhs, rhs)),
        },
    }
}

fn unsupported(op: &'static str, lhs: &Value, rhs: &Value) -> ComputeError {
    ComputeError::UnsupportedOperands {
        op,
        lhs: lhs.kind(),
        rhs: rhs.kind(),
    }
}

fn binary(
    symbol: &'static str,
    precedence: u8,
    op: fn(&Value, &Value) -> ComputeResult,
) -> Func {
    Func::infix(symbol, precedence, move |args| {
        expect_arity(symbol.trim(), args, 2)?;
        op(&args[0], &args[1])
    })
}

fn checked(op: &'static str, result: Option<i64>) -> ComputeResult {
    result
        .map(Value::Int)
        .ok_or(ComputeError::Overflow { op })
}

pub fn add_values(lhs: &Value, rhs: &Value) -> ComputeResult {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(Value::from(format!("{a}{b}")));
    }
    match numeric("+", lhs, rhs)? {
        Pair::Ints(a, b) => checked("+", a.checked_add(b)),
        Pair::Floats(a, b) => Ok(Value::Float(a + b)),
    }
}

pub fn sub_values(lhs: &Value, rhs: &Value) -> ComputeResult {
    match numeric("-", lhs, rhs)? {
        Pair::Ints(a, b) => checked("-", a.checked_sub(b)),
        Pair::Floats(a, b) => Ok(Value::Float(a - b)),
    }
}

pub fn mul_values(lhs: &Value, rhs: &Value) -> ComputeResult {
    match numeric("*", lhs, rhs)? {
        Pair::Ints(a, b) => checked("*", a.checked_mul(b)),
        Pair::Floats(a, b) => Ok(Value::Float(a * b)),
    }
}

/// True division; always produces a float.
pub fn div_values(lhs: &Value, rhs: &Value) -> ComputeResult {
    let (a, b) = match numeric("/", lhs, rhs)? {
        Pair::Ints(a, b) => (a as f64, b as f64),
        Pair::Floats(a, b) => (a, b),
    };
    if b == 0.0 {
        return Err(ComputeError::DivisionByZero);
    }
    Ok(Value::Float(a / b))
}

/// Remainder with the sign of the divisor.
pub fn rem_values(lhs: &Value, rhs: &Value) -> ComputeResult {
    match numeric("%", lhs, rhs)? {
        Pair::Ints(_, 0) => Err(ComputeError::DivisionByZero),
        Pair::Ints(a, b) => checked("%", a.checked_rem_euclid(b)).map(|r| match r {
            Value::Int(r) if r != 0 && b < 0 => Value::Int(r + b),
            other => other,
        }),
        Pair::Floats(_, b) if b == 0.0 => Err(ComputeError::DivisionByZero),
        Pair::Floats(a, b) => {
            let r = a % b;
            Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
        }
    }
}

pub fn pow_values(lhs: &Value, rhs: &Value) -> ComputeResult {
    match numeric("**", lhs, rhs)? {
        Pair::Ints(a, b) if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| ComputeError::Overflow { op: "**" })?;
            checked("**", a.checked_pow(exp))
        }
        Pair::Ints(0, _) => Err(ComputeError::DivisionByZero),
        Pair::Ints(a, b) => Ok(Value::Float((a as f64).powf(b as f64))),
        Pair::Floats(a, b) => Ok(Value::Float(a.powf(b))),
    }
}

fn compare(
    op: &'static str,
    lhs: &Value,
    rhs: &Value,
    test: fn(std::cmp::Ordering) -> bool,
) -> ComputeResult {
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match numeric(op, lhs, rhs)? {
            Pair::Ints(a, b) => Some(a.cmp(&b)),
            Pair::Floats(a, b) => a.partial_cmp(&b),
        },
    };
    // NaN compares false against everything
    Ok(Value::Bool(ordering.is_some_and(test)))
}

pub fn add() -> Func {
    binary(" + ", PREC_ADD, add_values)
}

pub fn sub() -> Func {
    binary(" - ", PREC_ADD, sub_values)
}

pub fn mul() -> Func {
    binary(" * ", PREC_MUL, mul_values)
}

pub fn div() -> Func {
    binary(" / ", PREC_MUL, div_values)
}

pub fn rem() -> Func {
    binary(" % ", PREC_MUL, rem_values)
}

pub fn pow() -> Func {
    binary("**", PREC_POW, pow_values)
}

pub fn lt() -> Func {
    binary(" < ", PREC_COMPARE, |a, b| compare("<", a, b, |o| o.is_lt()))
}

pub fn gt() -> Func {
    binary(" > ", PREC_COMPARE, |a, b| compare(">", a, b, |o| o.is_gt()))
}

pub fn eq() -> Func {
    binary(" == ", PREC_COMPARE, |a, b| Ok(Value::Bool(a == b)))
}

pub fn neg() -> Func {
    Func::prefix("-", PREC_UNARY, |args| {
        expect_arity("-", args, 1)?;
        match &args[0] {
            Value::Int(i) => checked("-", i.checked_neg()),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(unsupported("-", other, other)),
        }
    })
}

pub fn abs() -> Func {
    Func::new("abs", |args| {
        expect_arity("abs", args, 1)?;
        match &args[0] {
            Value::Int(i) => checked("abs", i.checked_abs()),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(unsupported("abs", other, other)),
        }
    })
}
