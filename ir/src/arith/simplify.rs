//! Canonical simplification of index expressions.
//!
//! Integer expressions are flattened into a [`LinearSum`]: a constant plus
//! integer multiples of opaque atoms. Atoms are variables or non-linear
//! subexpressions (products of non-constants, divisions that do not cancel,
//! loads) whose own operands are already simplified. Terms keep their
//! first-occurrence order so the rebuilt expression reads like the input.

use std::collections::HashMap;

use tessera_dtype::DType;

use super::bound::{ConstIntBound, const_int_bound};
use crate::expr::{BinaryOp, CmpOp, ExprKind, PrimExpr, Var};

/// `constant + sum(coef * atom)`.
#[derive(Debug, Clone)]
pub struct LinearSum {
    pub terms: Vec<(PrimExpr, i64)>,
    pub constant: i64,
    pub dtype: DType,
}

impl LinearSum {
    pub fn constant(value: i64, dtype: DType) -> Self {
        Self { terms: Vec::new(), constant: value, dtype }
    }

    pub fn atom(expr: PrimExpr) -> Self {
        let dtype = expr.dtype();
        Self { terms: vec![(expr, 1)], constant: 0, dtype }
    }

    pub fn as_const(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    fn add_term(&mut self, atom: PrimExpr, coef: i64) {
        if coef == 0 {
            return;
        }
        match self.terms.iter().position(|(a, _)| *a == atom) {
            Some(pos) => {
                self.terms[pos].1 += coef;
                if self.terms[pos].1 == 0 {
                    self.terms.remove(pos);
                }
            }
            None => self.terms.push((atom, coef)),
        }
    }

    /// `self + sign * other`.
    pub fn combine(mut self, other: &LinearSum, sign: i64) -> Self {
        for (atom, coef) in &other.terms {
            self.add_term(atom.clone(), coef * sign);
        }
        self.constant += other.constant * sign;
        if other.dtype.bits() > self.dtype.bits() {
            self.dtype = other.dtype;
        }
        self
    }

    pub fn scale(mut self, k: i64) -> Self {
        if k == 0 {
            return Self::constant(0, self.dtype);
        }
        self.terms.iter_mut().for_each(|(_, c)| *c *= k);
        self.constant *= k;
        self
    }

    /// Rebuild an expression: positive terms first, then negative ones, then
    /// the constant.
    pub fn to_expr(&self) -> PrimExpr {
        let dtype = self.dtype;
        let term_expr = |atom: &PrimExpr, coef: i64| {
            if coef == 1 { atom.clone() } else { atom * PrimExpr::const_int(coef, dtype) }
        };

        let mut acc: Option<PrimExpr> = None;
        for (atom, coef) in self.terms.iter().filter(|(_, c)| *c > 0) {
            let t = term_expr(atom, *coef);
            acc = Some(match acc {
                Some(a) => a + t,
                None => t,
            });
        }
        for (atom, coef) in self.terms.iter().filter(|(_, c)| *c < 0) {
            acc = Some(match acc {
                Some(a) => a - term_expr(atom, -coef),
                None => term_expr(atom, *coef),
            });
        }
        match acc {
            None => PrimExpr::const_int(self.constant, dtype),
            Some(a) if self.constant > 0 => a + PrimExpr::const_int(self.constant, dtype),
            Some(a) if self.constant < 0 => a - PrimExpr::const_int(-self.constant, dtype),
            Some(a) => a,
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

pub struct Simplifier<'a> {
    bounds: &'a HashMap<Var, ConstIntBound>,
}

impl<'a> Simplifier<'a> {
    pub fn new(bounds: &'a HashMap<Var, ConstIntBound>) -> Self {
        Self { bounds }
    }

    pub fn simplify(&self, expr: &PrimExpr) -> PrimExpr {
        let dtype = expr.dtype();
        if is_scalar_int(dtype) {
            let result = self.linear(expr).to_expr();
            return if result == *expr { expr.clone() } else { result };
        }
        if dtype.is_bool() {
            return self.simplify_bool(expr);
        }
        self.simplify_other(expr)
    }

    /// Bound of a linear sum, combining atom bounds term by term.
    pub fn bound_of(&self, sum: &LinearSum) -> ConstIntBound {
        sum.terms.iter().fold(ConstIntBound::point(sum.constant), |acc, (atom, coef)| {
            let b = const_int_bound(atom, self.bounds).mul(&ConstIntBound::point(*coef));
            acc.add(&b)
        })
    }

    pub fn linear(&self, expr: &PrimExpr) -> LinearSum {
        let dtype = expr.dtype();
        match expr.kind() {
            ExprKind::Int(v) => LinearSum::constant(*v, dtype),
            ExprKind::Var(_) => LinearSum::atom(expr.clone()),
            ExprKind::Binary(op, a, b) => self.linear_binary(*op, a, b, dtype),
            ExprKind::Select { cond, then_value, else_value } => {
                let cond = self.simplify_bool(cond);
                match cond.as_bool() {
                    Some(true) => self.linear(then_value),
                    Some(false) => self.linear(else_value),
                    None => LinearSum::atom(PrimExpr::select(
                        cond,
                        self.simplify(then_value),
                        self.simplify(else_value),
                    )),
                }
            }
            ExprKind::Cast(inner) => {
                let inner_s = self.simplify(inner);
                match (inner_s.as_int(), inner_s.as_bool()) {
                    (Some(v), _) => LinearSum::constant(v, dtype),
                    (_, Some(b)) => LinearSum::constant(b as i64, dtype),
                    _ => LinearSum::atom(PrimExpr::cast(dtype, inner_s)),
                }
            }
            ExprKind::Load { buffer, indices } => {
                LinearSum::atom(PrimExpr::load(buffer, indices.iter().map(|i| self.simplify(i))))
            }
            _ => LinearSum::atom(expr.clone()),
        }
    }

    fn linear_binary(&self, op: BinaryOp, a: &PrimExpr, b: &PrimExpr, dtype: DType) -> LinearSum {
        let (la, lb) = (self.linear(a), self.linear(b));
        match op {
            BinaryOp::Add => la.combine(&lb, 1),
            BinaryOp::Sub => la.combine(&lb, -1),
            BinaryOp::Mul => match (la.as_const(), lb.as_const()) {
                (_, Some(k)) => la.scale(k),
                (Some(k), None) => lb.scale(k),
                (None, None) => LinearSum::atom(la.to_expr() * lb.to_expr()),
            },
            BinaryOp::FloorDiv => match lb.as_const() {
                Some(c) if c > 0 => self.div_linear(la, c),
                Some(c) if c != 0 && la.as_const().is_some() => LinearSum::constant(floor_div(la.constant, c), dtype),
                _ => LinearSum::atom(crate::expr::floordiv(la.to_expr(), lb.to_expr())),
            },
            BinaryOp::FloorMod => match lb.as_const() {
                Some(c) if c > 0 => self.mod_linear(la, c),
                _ => LinearSum::atom(crate::expr::floormod(la.to_expr(), lb.to_expr())),
            },
            BinaryOp::Min | BinaryOp::Max => {
                if let (Some(x), Some(y)) = (la.as_const(), lb.as_const()) {
                    let v = if op == BinaryOp::Min { x.min(y) } else { x.max(y) };
                    return LinearSum::constant(v, dtype);
                }
                let diff = self.bound_of(&la.clone().combine(&lb, -1));
                let pick_a = match op {
                    BinaryOp::Min => (diff.max <= 0).then_some(true).or((diff.min >= 0).then_some(false)),
                    _ => (diff.min >= 0).then_some(true).or((diff.max <= 0).then_some(false)),
                };
                match pick_a {
                    Some(true) => la,
                    Some(false) => lb,
                    None => LinearSum::atom(PrimExpr::binary(op, la.to_expr(), lb.to_expr())),
                }
            }
        }
    }

    /// `floordiv(sum, c)` with `c > 0`.
    fn div_linear(&self, sum: LinearSum, c: i64) -> LinearSum {
        let dtype = sum.dtype;
        if c == 1 {
            return sum;
        }
        if let Some(v) = sum.as_const() {
            return LinearSum::constant(v.div_euclid(c), dtype);
        }

        let mut quotient = LinearSum::constant(sum.constant.div_euclid(c), dtype);
        let mut rest = LinearSum::constant(sum.constant.rem_euclid(c), dtype);
        for (atom, coef) in &sum.terms {
            if coef % c == 0 {
                quotient.add_term(atom.clone(), coef / c);
            } else {
                rest.add_term(atom.clone(), *coef);
            }
        }
        if rest.terms.is_empty() {
            return quotient;
        }

        let bound = self.bound_of(&rest);
        if bound.is_finite() && bound.min.div_euclid(c) == bound.max.div_euclid(c) {
            quotient.constant += bound.min.div_euclid(c);
            return quotient;
        }

        // floor((g*x + r) / (g*c')) == floor((x + floor(r/g)) / c')
        let g = rest.terms.iter().fold(c, |g, (_, coef)| gcd(g, *coef));
        if g > 1 {
            let mut reduced = LinearSum::constant(rest.constant.div_euclid(g), dtype);
            for (atom, coef) in &rest.terms {
                reduced.add_term(atom.clone(), coef / g);
            }
            return quotient.combine(&self.div_linear(reduced, c / g), 1);
        }

        let atom = crate::expr::floordiv(rest.to_expr(), PrimExpr::const_int(c, dtype));
        quotient.add_term(atom, 1);
        quotient
    }

    /// `floormod(sum, c)` with `c > 0`.
    fn mod_linear(&self, sum: LinearSum, c: i64) -> LinearSum {
        let dtype = sum.dtype;
        if c == 1 {
            return LinearSum::constant(0, dtype);
        }
        let mut rest = LinearSum::constant(sum.constant.rem_euclid(c), dtype);
        for (atom, coef) in &sum.terms {
            if coef % c != 0 {
                rest.add_term(atom.clone(), *coef);
            }
        }
        if rest.terms.is_empty() {
            return rest;
        }

        let bound = self.bound_of(&rest);
        if bound.is_finite() && bound.min.div_euclid(c) == bound.max.div_euclid(c) {
            rest.constant -= bound.min.div_euclid(c) * c;
            return rest;
        }

        // (g*x + r) mod (g*c') == g * ((x + floor(r/g)) mod c') + r mod g
        let g = rest.terms.iter().fold(c, |g, (_, coef)| gcd(g, *coef));
        if g > 1 {
            let mut reduced = LinearSum::constant(rest.constant.div_euclid(g), dtype);
            for (atom, coef) in &rest.terms {
                reduced.add_term(atom.clone(), coef / g);
            }
            let mut result = self.mod_linear(reduced, c / g).scale(g);
            result.constant += rest.constant.rem_euclid(g);
            return result;
        }

        LinearSum::atom(crate::expr::floormod(rest.to_expr(), PrimExpr::const_int(c, dtype)))
    }

    // =========================================================================
    // Boolean expressions
    // =========================================================================

    fn simplify_bool(&self, expr: &PrimExpr) -> PrimExpr {
        match expr.kind() {
            ExprKind::Cmp(op, a, b) => self.simplify_cmp(*op, a, b),
            ExprKind::And(a, b) => {
                let (sa, sb) = (self.simplify_bool(a), self.simplify_bool(b));
                match (sa.as_bool(), sb.as_bool()) {
                    (Some(false), _) | (_, Some(false)) => PrimExpr::bool(false),
                    (Some(true), _) => sb,
                    (_, Some(true)) => sa,
                    _ if sa == sb => sa,
                    _ => PrimExpr::and(sa, sb),
                }
            }
            ExprKind::Or(a, b) => {
                let (sa, sb) = (self.simplify_bool(a), self.simplify_bool(b));
                match (sa.as_bool(), sb.as_bool()) {
                    (Some(true), _) | (_, Some(true)) => PrimExpr::bool(true),
                    (Some(false), _) => sb,
                    (_, Some(false)) => sa,
                    _ if sa == sb => sa,
                    _ => PrimExpr::or(sa, sb),
                }
            }
            ExprKind::Not(a) => {
                let sa = self.simplify_bool(a);
                match sa.kind() {
                    ExprKind::Bool(v) => PrimExpr::bool(!v),
                    ExprKind::Not(inner) => inner.clone(),
                    ExprKind::Cmp(op, x, y) => PrimExpr::cmp(op.negate(), x.clone(), y.clone()),
                    _ => PrimExpr::not(sa),
                }
            }
            ExprKind::Int(v) => PrimExpr::bool(*v != 0),
            _ => self.simplify_other(expr),
        }
    }

    fn simplify_cmp(&self, op: CmpOp, a: &PrimExpr, b: &PrimExpr) -> PrimExpr {
        if is_scalar_int(a.dtype()) && is_scalar_int(b.dtype()) {
            let (la, lb) = (self.linear(a), self.linear(b));
            let diff = la.clone().combine(&lb, -1);
            if let Some(d) = diff.as_const() {
                return PrimExpr::bool(op.eval(d, 0));
            }
            let bd = self.bound_of(&diff);
            let decided = match op {
                CmpOp::Lt => (bd.max < 0).then_some(true).or((bd.min >= 0).then_some(false)),
                CmpOp::Le => (bd.max <= 0).then_some(true).or((bd.min > 0).then_some(false)),
                CmpOp::Gt => (bd.min > 0).then_some(true).or((bd.max <= 0).then_some(false)),
                CmpOp::Ge => (bd.min >= 0).then_some(true).or((bd.max < 0).then_some(false)),
                CmpOp::Eq => (bd.min > 0 || bd.max < 0).then_some(false),
                CmpOp::Ne => (bd.min > 0 || bd.max < 0).then_some(true),
            };
            return match decided {
                Some(v) => PrimExpr::bool(v),
                None => PrimExpr::cmp(op, la.to_expr(), lb.to_expr()),
            };
        }
        let (sa, sb) = (self.simplify(a), self.simplify(b));
        match (sa.kind(), sb.kind()) {
            (ExprKind::Float(x), ExprKind::Float(y)) => PrimExpr::bool(op.eval(x.0, y.0)),
            (ExprKind::Bool(x), ExprKind::Bool(y)) => PrimExpr::bool(op.eval(x, y)),
            _ => PrimExpr::cmp(op, sa, sb),
        }
    }

    /// Non-integer expressions: simplify operands and fold float constants.
    fn simplify_other(&self, expr: &PrimExpr) -> PrimExpr {
        let dtype = expr.dtype();
        match expr.kind() {
            ExprKind::Binary(op, a, b) => {
                let (sa, sb) = (self.simplify(a), self.simplify(b));
                if let (ExprKind::Float(x), ExprKind::Float(y)) = (sa.kind(), sb.kind()) {
                    let folded = match op {
                        BinaryOp::Add => Some(x.0 + y.0),
                        BinaryOp::Sub => Some(x.0 - y.0),
                        BinaryOp::Mul => Some(x.0 * y.0),
                        BinaryOp::Min => Some(x.0.min(y.0)),
                        BinaryOp::Max => Some(x.0.max(y.0)),
                        BinaryOp::FloorDiv | BinaryOp::FloorMod => None,
                    };
                    if let Some(v) = folded {
                        return PrimExpr::float(v, dtype);
                    }
                }
                if sa.same_as(a) && sb.same_as(b) { expr.clone() } else { PrimExpr::binary(*op, sa, sb) }
            }
            ExprKind::Select { cond, then_value, else_value } => {
                let cond = self.simplify_bool(cond);
                match cond.as_bool() {
                    Some(true) => self.simplify(then_value),
                    Some(false) => self.simplify(else_value),
                    None => PrimExpr::select(cond, self.simplify(then_value), self.simplify(else_value)),
                }
            }
            ExprKind::Cast(inner) => {
                let s = self.simplify(inner);
                match (s.kind(), dtype.is_float()) {
                    (ExprKind::Int(v), true) => PrimExpr::float(*v as f64, dtype),
                    (ExprKind::Float(f), true) => PrimExpr::float(f.0, dtype),
                    _ if s.same_as(inner) => expr.clone(),
                    _ => PrimExpr::new(ExprKind::Cast(s), dtype),
                }
            }
            ExprKind::Load { buffer, indices } => {
                let new: Vec<PrimExpr> = indices.iter().map(|i| self.simplify(i)).collect();
                if new.iter().zip(indices.iter()).all(|(a, b)| a.same_as(b)) {
                    expr.clone()
                } else {
                    PrimExpr::load(buffer, new)
                }
            }
            ExprKind::Cmp(..) | ExprKind::And(..) | ExprKind::Or(..) | ExprKind::Not(_) => self.simplify_bool(expr),
            _ => expr.clone(),
        }
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

fn is_scalar_int(dtype: DType) -> bool {
    dtype.is_int() && dtype.lanes() == 1
}
