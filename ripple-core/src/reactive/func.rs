//! Derived-node functions.
//!
//! A [`Func`] pairs a positional callable with the notation used to describe
//! it. The notation has no effect on evaluation; it is only used to render a
//! node's expression, e.g. when annotating a recomputation failure.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::error::ComputeError;

use super::value::Value;

/// Outcome of invoking a [`Func`].
pub type ComputeResult = Result<Value, ComputeError>;

type Apply = Rc<dyn Fn(&[Value]) -> ComputeResult>;

/// How a node built from a function is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    /// `name(a, b, ...)`
    Call,
    /// `<symbol>a`
    Prefix { symbol: &'static str, precedence: u8 },
    /// `a<symbol>b`; the symbol carries its own spacing.
    Infix { symbol: &'static str, precedence: u8 },
}

impl Notation {
    /// Binding strength of operator notations; calls never need parentheses.
    pub fn precedence(&self) -> Option<u8> {
        match self {
            Notation::Call => None,
            Notation::Prefix { precedence, .. } | Notation::Infix { precedence, .. } => {
                Some(*precedence)
            }
        }
    }
}

/// A positional function over values.
#[derive(Clone)]
pub struct Func {
    name: Cow<'static, str>,
    notation: Notation,
    apply: Apply,
}

impl Func {
    /// A function rendered as `name(args...)`.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        F: Fn(&[Value]) -> ComputeResult + 'static,
    {
        Self {
            name: name.into(),
            notation: Notation::Call,
            apply: Rc::new(apply),
        }
    }

    /// A unary operator rendered as `<symbol>x`.
    pub fn prefix<F>(symbol: &'static str, precedence: u8, apply: F) -> Self
    where
        F: Fn(&[Value]) -> ComputeResult + 'static,
    {
        Self {
            name: Cow::Borrowed(symbol),
            notation: Notation::Prefix { symbol, precedence },
            apply: Rc::new(apply),
        }
    }

    /// A binary operator rendered as `x<symbol>y`.
    pub fn infix<F>(symbol: &'static str, precedence: u8, apply: F) -> Self
    where
        F: Fn(&[Value]) -> ComputeResult + 'static,
    {
        Self {
            name: Cow::Borrowed(symbol.trim()),
            notation: Notation::Infix { symbol, precedence },
            apply: Rc::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notation(&self) -> Notation {
        self.notation
    }

    pub fn call(&self, args: &[Value]) -> ComputeResult {
        (self.apply)(args)
    }

    /// Render this function applied to already-rendered operands.
    ///
    /// Each operand comes with the precedence of the node it was rendered
    /// from, if that node uses operator notation.
    pub fn render(&self, operands: &[(String, Option<u8>)]) -> String {
        let wrap = |(text, inner): &(String, Option<u8>), outer: u8| match inner {
            Some(inner) if outer > *inner => format!("({text})"),
            _ => text.clone(),
        };

        match (self.notation, operands) {
            (Notation::Prefix { symbol, precedence }, [operand]) => {
                format!("{symbol}{}", wrap(operand, precedence))
            }
            (Notation::Infix { symbol, precedence }, [lhs, rhs]) => {
                format!("{}{symbol}{}", wrap(lhs, precedence), wrap(rhs, precedence))
            }
            _ => {
                let args: Vec<&str> = operands.iter().map(|(text, _)| text.as_str()).collect();
                format!("{}({})", self.name, args.join(", "))
            }
        }
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("notation", &self.notation)
            .finish_non_exhaustive()
    }
}

/// Check that `args` has exactly `expected` entries.
pub fn expect_arity(func: &str, args: &[Value], expected: usize) -> Result<(), ComputeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ComputeError::Arity {
            func: func.to_owned(),
            expected,
            found: args.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> (String, Option<u8>) {
        (text.to_owned(), None)
    }

    #[test]
    fn call_notation_lists_arguments() {
        let f = Func::new("hypot", |_| Ok(Value::Nil));
        assert_eq!(f.render(&[plain("a"), plain("2")]), "hypot(a, 2)");
    }

    #[test]
    fn infix_parenthesises_looser_operands() {
        let mul = Func::infix(" * ", 70, |_| Ok(Value::Nil));
        let rendered = mul.render(&[("a + b".to_owned(), Some(60)), plain("c")]);
        assert_eq!(rendered, "(a + b) * c");

        let add = Func::infix(" + ", 60, |_| Ok(Value::Nil));
        let rendered = add.render(&[("a * b".to_owned(), Some(70)), plain("c")]);
        assert_eq!(rendered, "a * b + c");
    }

    #[test]
    fn prefix_renders_symbol_first() {
        let neg = Func::prefix("-", 80, |_| Ok(Value::Nil));
        assert_eq!(neg.render(&[plain("x")]), "-x");
        assert_eq!(neg.render(&[("x - y".to_owned(), Some(60))]), "-(x - y)");
    }

    #[test]
    fn call_forwards_arguments() {
        let first = Func::new("first", |args| Ok(args[0].clone()));
        assert_eq!(first.call(&[Value::from(4)]).unwrap(), Value::from(4));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let err = expect_arity("f", &[Value::from(1)], 2).unwrap_err();
        assert_eq!(err.to_string(), "f expected 2 arguments, got 1");
    }
}
