//! Typed raster algebra
//!
//! Indicator formulas are built as [`Expr`] trees with ordinary arithmetic
//! operators, so scalar factors enter the formula as numbers rather than as
//! text spliced into an expression string:
//!
//! ```ignore
//! let rwd = 1.0 - Expr::band("AETI") / p95;
//! let raster = evaluate(&rwd, &[("AETI", &aeti)])?;
//! ```
//!
//! Evaluation follows IEEE-754: a zero or NaN denominator yields an infinite
//! or NaN pixel, never an error.

use crate::maybe_rayon::*;
use aquapi_core::raster::Raster;
use aquapi_core::{Error, Result};
use ndarray::Array2;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic operator of a binary node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }

    #[inline]
    fn apply(&self, l: f64, r: f64) -> f64 {
        match self {
            Self::Add => l + r,
            Self::Sub => l - r,
            Self::Mul => l * r,
            Self::Div => l / r,
        }
    }
}

/// A per-pixel arithmetic expression over named bands
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Band(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Self::Const(value)
    }

    pub fn band(name: impl Into<String>) -> Self {
        Self::Band(name.into())
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }


    /// Resolve band names to positions in `names`
    fn compile(&self, names: &[&str]) -> Result<Node> {
        Ok(match self {
            Expr::Const(v) => Node::Const(*v),
            Expr::Band(name) => Node::Band(
                names
                    .iter()
                    .position(|n| *n == name.as_str())
                    .ok_or_else(|| Error::UnboundBand(name.clone()))?,
            ),
            Expr::Binary { op, left, right } => Node::Binary {
                op: *op,
                left: Box::new(left.compile(names)?),
                right: Box::new(right.compile(names)?),
            },
            Expr::Neg(inner) => Node::Neg(Box::new(inner.compile(names)?)),
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            _ => 3,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Band(name) => f.write_str(name),
            Expr::Neg(inner) => {
                if inner.precedence() < 3 {
                    write!(f, "-({})", inner)
                } else {
                    write!(f, "-{}", inner)
                }
            }
            Expr::Binary { op, left, right } => {
                let p = op.precedence();
                if left.precedence() < p {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, " {} ", op.symbol())?;
                // Right operand of - and / needs parentheses at equal precedence too
                let tight = matches!(op, BinaryOp::Sub | BinaryOp::Div);
                if right.precedence() < p || (tight && right.precedence() == p) {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, Expr::Const(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::Const(self), rhs)
            }
        }
    };
}

impl_expr_op!(Add, add, BinaryOp::Add);
impl_expr_op!(Sub, sub, BinaryOp::Sub);
impl_expr_op!(Mul, mul, BinaryOp::Mul);
impl_expr_op!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// Expression with band names resolved to binding positions
#[derive(Debug)]
enum Node {
    Const(f64),
    Band(usize),
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Neg(Box<Node>),
}

impl Node {
    fn eval(&self, values: &[f64]) -> f64 {
        match self {
            Node::Const(v) => *v,
            Node::Band(i) => values[*i],
            Node::Binary { op, left, right } => op.apply(left.eval(values), right.eval(values)),
            Node::Neg(inner) => -inner.eval(values),
        }
    }
}

/// Evaluate `expr` at every pixel.
///
/// `bindings` maps band names to rasters; the first binding is the primary
/// raster whose georeferencing, width and height the output takes. All bound
/// rasters must share the primary's shape, checked before any pixel is
/// computed.
///
/// # Errors
/// - `UnboundBand` if the expression names a band missing from `bindings`
/// - `ShapeMismatch` if a bound raster differs in size from the primary
/// - `InvalidRequest` if `bindings` is empty
pub fn evaluate(expr: &Expr, bindings: &[(&str, &Raster)]) -> Result<Raster> {
    let (_, primary) = bindings
        .first()
        .ok_or_else(|| Error::InvalidRequest("expression evaluated without rasters".into()))?;

    let names: Vec<&str> = bindings.iter().map(|(name, _)| *name).collect();
    let node = expr.compile(&names)?;

    let (rows, cols) = primary.shape();
    for (_, raster) in &bindings[1..] {
        if raster.shape() != (rows, cols) {
            return Err(Error::shape_mismatch((rows, cols), raster.shape()));
        }
    }

    let rasters: Vec<&Raster> = bindings.iter().map(|(_, r)| *r).collect();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = vec![0.0; rasters.len()];
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                for (slot, raster) in values.iter_mut().zip(&rasters) {
                    *slot = raster.data()[(row, col)];
                }
                *out = node.eval(&values);
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = primary.with_data(array)?;
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}
