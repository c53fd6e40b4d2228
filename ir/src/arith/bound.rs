//! Constant integer bound analysis.
//!
//! Computes an interval `[min, max]` that contains every value an integer
//! expression can take, given bounds for its free variables. The analysis is
//! conservative: anything it cannot reason about gets the full range of its
//! dtype. `i64::MIN` and `i64::MAX` stand for negative and positive infinity.

use std::collections::HashMap;

use tessera_dtype::DType;

use crate::expr::{BinaryOp, ExprKind, PrimExpr, Var};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstIntBound {
    pub min: i64,
    pub max: i64,
}

pub const POS_INF: i64 = i64::MAX;
pub const NEG_INF: i64 = i64::MIN;

const INF: i128 = 1 << 100;

fn widen(v: i64) -> i128 {
    match v {
        POS_INF => INF,
        NEG_INF => -INF,
        v => v as i128,
    }
}

fn narrow(v: i128) -> i64 {
    if v >= i64::MAX as i128 {
        POS_INF
    } else if v <= i64::MIN as i128 {
        NEG_INF
    } else {
        v as i64
    }
}

fn clamp_inf(v: i128) -> i128 {
    v.clamp(-INF, INF)
}

impl ConstIntBound {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn point(value: i64) -> Self {
        Self { min: value, max: value }
    }

    pub fn everything() -> Self {
        Self { min: NEG_INF, max: POS_INF }
    }

    /// Full range representable by `dtype`.
    pub fn of_dtype(dtype: DType) -> Self {
        if dtype.is_bool() {
            return Self::new(0, 1);
        }
        if !dtype.is_int() {
            return Self::everything();
        }
        let bits = dtype.bits();
        if bits >= 64 {
            return if dtype.base().is_unsigned() { Self::new(0, POS_INF) } else { Self::everything() };
        }
        if dtype.base().is_unsigned() {
            Self::new(0, (1i64 << bits) - 1)
        } else {
            Self::new(-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        }
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max && self.min != NEG_INF && self.min != POS_INF
    }

    pub fn is_finite(&self) -> bool {
        self.min != NEG_INF && self.max != POS_INF
    }

    pub fn is_non_negative(&self) -> bool {
        self.min >= 0
    }

    pub fn union(&self, other: &Self) -> Self {
        Self { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    fn from_wide(min: i128, max: i128) -> Self {
        Self { min: narrow(clamp_inf(min)), max: narrow(clamp_inf(max)) }
    }

    pub(crate) fn add(&self, other: &Self) -> Self {
        Self::from_wide(widen(self.min) + widen(other.min), widen(self.max) + widen(other.max))
    }

    pub(crate) fn sub(&self, other: &Self) -> Self {
        Self::from_wide(widen(self.min) - widen(other.max), widen(self.max) - widen(other.min))
    }

    pub(crate) fn mul(&self, other: &Self) -> Self {
        let corners = [
            widen(self.min).saturating_mul(widen(other.min)),
            widen(self.min).saturating_mul(widen(other.max)),
            widen(self.max).saturating_mul(widen(other.min)),
            widen(self.max).saturating_mul(widen(other.max)),
        ];
        let (lo, hi) = min_max(&corners);
        Self::from_wide(lo, hi)
    }

    fn floordiv(&self, other: &Self) -> Self {
        if other.min <= 0 && other.max >= 0 {
            return Self::everything();
        }
        let corners = [
            floor_div_wide(widen(self.min), widen(other.min)),
            floor_div_wide(widen(self.min), widen(other.max)),
            floor_div_wide(widen(self.max), widen(other.min)),
            floor_div_wide(widen(self.max), widen(other.max)),
        ];
        let (lo, hi) = min_max(&corners);
        Self::from_wide(lo, hi)
    }

    fn floormod(&self, other: &Self) -> Self {
        if other.min <= 0 {
            return Self::everything();
        }
        let divisor_max = widen(other.max);
        if other.is_point() && self.is_finite() {
            let c = other.min as i128;
            let (qa, qb) = (widen(self.min).div_euclid(c), widen(self.max).div_euclid(c));
            if qa == qb {
                return Self::from_wide(widen(self.min).rem_euclid(c), widen(self.max).rem_euclid(c));
            }
        }
        if self.min >= 0 {
            return Self::from_wide(0, widen(self.max).min(divisor_max - 1));
        }
        Self::from_wide(0, divisor_max - 1)
    }
}

fn min_max(values: &[i128]) -> (i128, i128) {
    let lo = values.iter().copied().min().unwrap_or(-INF);
    let hi = values.iter().copied().max().unwrap_or(INF);
    (lo, hi)
}

fn floor_div_wide(a: i128, b: i128) -> i128 {
    if a.abs() >= INF {
        return if (a > 0) == (b > 0) { INF } else { -INF };
    }
    if b.abs() >= INF {
        return if a == 0 { 0 } else if (a > 0) == (b > 0) { 0 } else { -1 };
    }
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

/// Bound of `expr` given bounds for its variables.
pub fn const_int_bound(expr: &PrimExpr, vars: &HashMap<Var, ConstIntBound>) -> ConstIntBound {
    let dtype_bound = ConstIntBound::of_dtype(expr.dtype());
    let bound = match expr.kind() {
        ExprKind::Int(v) => return ConstIntBound::point(*v),
        ExprKind::Bool(v) => return ConstIntBound::point(*v as i64),
        ExprKind::Float(_) => return ConstIntBound::everything(),
        ExprKind::Var(var) => vars.get(var).copied().unwrap_or(dtype_bound),
        ExprKind::Binary(op, a, b) => {
            let (ba, bb) = (const_int_bound(a, vars), const_int_bound(b, vars));
            match op {
                BinaryOp::Add => ba.add(&bb),
                BinaryOp::Sub => ba.sub(&bb),
                BinaryOp::Mul => ba.mul(&bb),
                BinaryOp::FloorDiv => ba.floordiv(&bb),
                BinaryOp::FloorMod => ba.floormod(&bb),
                BinaryOp::Min => ConstIntBound::new(ba.min.min(bb.min), ba.max.min(bb.max)),
                BinaryOp::Max => ConstIntBound::new(ba.min.max(bb.min), ba.max.max(bb.max)),
            }
        }
        ExprKind::Cmp(..) | ExprKind::And(..) | ExprKind::Or(..) | ExprKind::Not(_) => ConstIntBound::new(0, 1),
        ExprKind::Select { then_value, else_value, .. } => {
            const_int_bound(then_value, vars).union(&const_int_bound(else_value, vars))
        }
        ExprKind::Cast(inner) => {
            if inner.dtype().is_int() || inner.dtype().is_bool() {
                const_int_bound(inner, vars)
            } else {
                dtype_bound
            }
        }
        ExprKind::Load { .. } => dtype_bound,
    };
    intersect(bound, dtype_bound)
}

fn intersect(a: ConstIntBound, b: ConstIntBound) -> ConstIntBound {
    let (min, max) = (a.min.max(b.min), a.max.min(b.max));
    if min > max { a } else { ConstIntBound { min, max } }
}
