//! Numeric tower: Int32 -> Int64 -> Flt32 -> Flt64 -> Dec128

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        };
        f.write_str(symbol)
    }
}

/// Relational operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn test(&self, ordering: Ordering) -> bool {
        match self {
            RelOp::Lt => ordering == Ordering::Less,
            RelOp::Le => ordering != Ordering::Greater,
            RelOp::Gt => ordering == Ordering::Greater,
            RelOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// Numeric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int32(i32),
    Int64(i64),
    Flt32(f32),
    Flt64(f64),
    Dec128(Decimal),
}

impl Num {
    /// Position in the widening chain
    fn rank(&self) -> u8 {
        match self {
            Num::Int32(_) => 0,
            Num::Int64(_) => 1,
            Num::Flt32(_) => 2,
            Num::Flt64(_) => 3,
            Num::Dec128(_) => 4,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Num::Int32(_) => "Int32",
            Num::Int64(_) => "Int64",
            Num::Flt32(_) => "Flt32",
            Num::Flt64(_) => "Flt64",
            Num::Dec128(_) => "Dec128",
        }
    }

    /// Integral value, if this is an integer kind
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Num::Int32(n) => Some(*n as i64),
            Num::Int64(n) => Some(*n),
            _ => None,
        }
    }

    fn widen(self, rank: u8) -> Result<Num, KernelError> {
        if self.rank() >= rank {
            return Ok(self);
        }
        let widened = match (self, rank) {
            (Num::Int32(n), 1) => Num::Int64(n as i64),
            (Num::Int32(n), 2) => Num::Flt32(n as f32),
            (Num::Int32(n), 3) => Num::Flt64(n as f64),
            (Num::Int32(n), _) => Num::Dec128(Decimal::from(n)),
            (Num::Int64(n), 2) => Num::Flt32(n as f32),
            (Num::Int64(n), 3) => Num::Flt64(n as f64),
            (Num::Int64(n), _) => Num::Dec128(Decimal::from(n)),
            (Num::Flt32(x), 3) => Num::Flt64(x as f64),
            (Num::Flt32(x), _) => Num::Dec128(float_to_decimal(x as f64)?),
            (Num::Flt64(x), _) => Num::Dec128(float_to_decimal(x)?),
            (other, _) => other,
        };
        Ok(widened)
    }

    fn align(self, other: Num) -> Result<(Num, Num), KernelError> {
        let rank = self.rank().max(other.rank());
        Ok((self.widen(rank)?, other.widen(rank)?))
    }

    /// Apply an arithmetic operator, widening to the larger kind.
    /// Integer arithmetic wraps; integer or decimal division by zero faults.
    pub fn arith(self, op: ArithOp, other: Num) -> Result<Num, KernelError> {
        let result = match self.align(other)? {
            (Num::Int32(a), Num::Int32(b)) => Num::Int32(match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => {
                    check_divisor(b == 0)?;
                    a.wrapping_div(b)
                }
                ArithOp::Mod => {
                    check_divisor(b == 0)?;
                    a.wrapping_rem(b)
                }
            }),
            (Num::Int64(a), Num::Int64(b)) => Num::Int64(match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => {
                    check_divisor(b == 0)?;
                    a.wrapping_div(b)
                }
                ArithOp::Mod => {
                    check_divisor(b == 0)?;
                    a.wrapping_rem(b)
                }
            }),
            (Num::Flt32(a), Num::Flt32(b)) => Num::Flt32(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
            }),
            (Num::Flt64(a), Num::Flt64(b)) => Num::Flt64(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
            }),
            (Num::Dec128(a), Num::Dec128(b)) => {
                let value = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    ArithOp::Div => a.checked_div(b),
                    ArithOp::Mod => a.checked_rem(b),
                };
                Num::Dec128(value.ok_or_else(|| {
                    KernelError::Arithmetic(format!("{} {} {} is not representable", a, op, b))
                })?)
            }
            (a, b) => {
                return Err(KernelError::Arithmetic(format!(
                    "cannot apply {} to {} and {}",
                    op,
                    a.kind_name(),
                    b.kind_name()
                )))
            }
        };
        Ok(result)
    }

    pub fn negate(self) -> Num {
        match self {
            Num::Int32(n) => Num::Int32(n.wrapping_neg()),
            Num::Int64(n) => Num::Int64(n.wrapping_neg()),
            Num::Flt32(x) => Num::Flt32(-x),
            Num::Flt64(x) => Num::Flt64(-x),
            Num::Dec128(d) => Num::Dec128(-d),
        }
    }

    /// Compare after widening. `None` when a float operand is NaN.
    pub fn compare(self, other: Num) -> Result<Option<Ordering>, KernelError> {
        let ordering = match self.align(other)? {
            (Num::Int32(a), Num::Int32(b)) => Some(a.cmp(&b)),
            (Num::Int64(a), Num::Int64(b)) => Some(a.cmp(&b)),
            (Num::Flt32(a), Num::Flt32(b)) => a.partial_cmp(&b),
            (Num::Flt64(a), Num::Flt64(b)) => a.partial_cmp(&b),
            (Num::Dec128(a), Num::Dec128(b)) => Some(a.cmp(&b)),
            _ => None,
        };
        Ok(ordering)
    }

    /// Same kind and same value. Numbers of different kinds are never equal.
    pub fn same(&self, other: &Num) -> bool {
        match (self, other) {
            (Num::Int32(a), Num::Int32(b)) => a == b,
            (Num::Int64(a), Num::Int64(b)) => a == b,
            (Num::Flt32(a), Num::Flt32(b)) => a == b,
            (Num::Flt64(a), Num::Flt64(b)) => a == b,
            (Num::Dec128(a), Num::Dec128(b)) => a == b,
            _ => false,
        }
    }
}

fn check_divisor(is_zero: bool) -> Result<(), KernelError> {
    if is_zero {
        return Err(KernelError::Arithmetic("division by zero".to_string()));
    }
    Ok(())
}

fn float_to_decimal(x: f64) -> Result<Decimal, KernelError> {
    Decimal::try_from(x)
        .map_err(|_| KernelError::Arithmetic(format!("{} is not representable as Dec128", x)))
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int32(n) => write!(f, "{}", n),
            Num::Int64(n) => write!(f, "{}L", n),
            Num::Flt32(x) => write!(f, "{}f", x),
            Num::Flt64(x) => write!(f, "{}", x),
            Num::Dec128(d) => write!(f, "{}m", d),
        }
    }
}
