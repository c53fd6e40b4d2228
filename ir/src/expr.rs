//! Scalar expressions.
//!
//! [`PrimExpr`] is an immutable, reference-counted expression tree. Equality and
//! hashing are structural; variables compare by identity, so two distinct
//! [`Var`]s with the same name are different expressions.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::buffer::Buffer;

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

/// A named variable with a unique identity.
#[derive(Clone)]
pub struct Var(Arc<VarNode>);

#[derive(Debug)]
struct VarNode {
    id: u64,
    name: String,
    dtype: DType,
}

impl Var {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        let id = NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed);
        Self(Arc::new(VarNode { id, name: name.into(), dtype }))
    }

    /// Variable of the default index type (`int32`).
    pub fn index(name: impl Into<String>) -> Self {
        Self::new(name, DType::Int32)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    /// Fresh variable named `name + suffix` with the same dtype.
    pub fn copy_with_suffix(&self, suffix: &str) -> Self {
        Self::new(format!("{}{}", self.0.name, suffix), self.0.dtype)
    }

    /// Fresh variable with the given name and this variable's dtype.
    pub fn copy_with_name(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.0.dtype)
    }

    /// Fresh variable with the same name and a different dtype.
    pub fn copy_with_dtype(&self, dtype: DType) -> Self {
        Self::new(self.0.name.clone(), dtype)
    }

    pub fn to_expr(&self) -> PrimExpr {
        PrimExpr::from(self)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl std::fmt::Debug for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id)
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Floating point immediate compared and hashed by bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct FloatImm(pub f64);

impl PartialEq for FloatImm {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatImm {}

impl Hash for FloatImm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Arithmetic binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    FloorMod,
    Min,
    Max,
}

/// Comparison operators. Result dtype is always `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Operator with swapped operands: `a op b == b op.swap() a`.
    pub fn swap(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Logical negation: `!(a op b) == a op.negate() b`.
    pub fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }

    pub fn eval<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }
}

/// Expression node variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Int(i64),
    Float(FloatImm),
    Bool(bool),
    Var(Var),
    Binary(BinaryOp, PrimExpr, PrimExpr),
    Cmp(CmpOp, PrimExpr, PrimExpr),
    And(PrimExpr, PrimExpr),
    Or(PrimExpr, PrimExpr),
    Not(PrimExpr),
    Select { cond: PrimExpr, then_value: PrimExpr, else_value: PrimExpr },
    Cast(PrimExpr),
    Load { buffer: Buffer, indices: SmallVec<[PrimExpr; 4]> },
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub dtype: DType,
}

/// Immutable shared expression.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PrimExpr(Arc<ExprNode>);

impl PrimExpr {
    pub fn new(kind: ExprKind, dtype: DType) -> Self {
        Self(Arc::new(ExprNode { kind, dtype }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    /// Pointer identity (same allocation).
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // =========================================================================
    // Immediates
    // =========================================================================

    /// `int32` immediate.
    pub fn int(value: i64) -> Self {
        Self::const_int(value, DType::Int32)
    }

    pub fn const_int(value: i64, dtype: DType) -> Self {
        Self::new(ExprKind::Int(value), dtype)
    }

    pub fn float(value: f64, dtype: DType) -> Self {
        Self::new(ExprKind::Float(FloatImm(value)), dtype)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value), DType::Bool)
    }

    pub fn zero(dtype: DType) -> Self {
        Self::const_int(0, dtype)
    }

    pub fn one(dtype: DType) -> Self {
        Self::const_int(1, dtype)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            ExprKind::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self.kind() {
            ExprKind::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_int_value(&self, value: i64) -> bool {
        self.as_int() == Some(value)
    }

    pub fn is_one(&self) -> bool {
        self.is_int_value(1)
    }

    pub fn is_zero(&self) -> bool {
        self.is_int_value(0)
    }

    /// Literal `true` (or a non-zero integer immediate).
    pub fn is_const_true(&self) -> bool {
        match self.kind() {
            ExprKind::Bool(v) => *v,
            ExprKind::Int(v) => *v != 0,
            _ => false,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind(), ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_))
    }

    // =========================================================================
    // Composite constructors
    // =========================================================================

    /// Binary arithmetic. Integer immediates adopt the dtype of the other operand.
    pub fn binary(op: BinaryOp, a: PrimExpr, b: PrimExpr) -> Self {
        let (a, b) = match_const_dtypes(a, b);
        let dtype = result_dtype(&a, &b);
        Self::new(ExprKind::Binary(op, a, b), dtype)
    }

    pub fn cmp(op: CmpOp, a: PrimExpr, b: PrimExpr) -> Self {
        let (a, b) = match_const_dtypes(a, b);
        Self::new(ExprKind::Cmp(op, a, b), DType::Bool)
    }

    pub fn and(a: PrimExpr, b: PrimExpr) -> Self {
        Self::new(ExprKind::And(a, b), DType::Bool)
    }

    pub fn or(a: PrimExpr, b: PrimExpr) -> Self {
        Self::new(ExprKind::Or(a, b), DType::Bool)
    }

    pub fn not(a: PrimExpr) -> Self {
        Self::new(ExprKind::Not(a), DType::Bool)
    }

    pub fn select(cond: PrimExpr, then_value: PrimExpr, else_value: PrimExpr) -> Self {
        let (then_value, else_value) = match_const_dtypes(then_value, else_value);
        let dtype = then_value.dtype();
        Self::new(ExprKind::Select { cond, then_value, else_value }, dtype)
    }

    /// Cast to `dtype`. Casting to the same dtype returns the input.
    pub fn cast(dtype: DType, value: PrimExpr) -> Self {
        if value.dtype() == dtype {
            return value;
        }
        Self::new(ExprKind::Cast(value), dtype)
    }

    pub fn load(buffer: &Buffer, indices: impl IntoIterator<Item = PrimExpr>) -> Self {
        let dtype = buffer.dtype();
        Self::new(ExprKind::Load { buffer: buffer.clone(), indices: indices.into_iter().collect() }, dtype)
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> SmallVec<[&PrimExpr; 4]> {
        match self.kind() {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) | ExprKind::Var(_) => SmallVec::new(),
            ExprKind::Binary(_, a, b) | ExprKind::Cmp(_, a, b) | ExprKind::And(a, b) | ExprKind::Or(a, b) => {
                smallvec::smallvec![a, b]
            }
            ExprKind::Not(a) | ExprKind::Cast(a) => smallvec::smallvec![a],
            ExprKind::Select { cond, then_value, else_value } => smallvec::smallvec![cond, then_value, else_value],
            ExprKind::Load { indices, .. } => indices.iter().collect(),
        }
    }
}

impl std::fmt::Debug for PrimExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrimExpr({self})")
    }
}

fn match_const_dtypes(a: PrimExpr, b: PrimExpr) -> (PrimExpr, PrimExpr) {
    if a.dtype() == b.dtype() {
        return (a, b);
    }
    match (a.kind(), b.kind()) {
        (ExprKind::Int(v), _) if b.dtype().is_int() && !matches!(b.kind(), ExprKind::Int(_)) => {
            (PrimExpr::const_int(*v, b.dtype()), b)
        }
        (_, ExprKind::Int(v)) if a.dtype().is_int() => {
            let v = *v;
            let dtype = a.dtype();
            (a, PrimExpr::const_int(v, dtype))
        }
        _ => (a, b),
    }
}

fn result_dtype(a: &PrimExpr, b: &PrimExpr) -> DType {
    let (da, db) = (a.dtype(), b.dtype());
    if da.is_int() && db.is_int() && db.bits() > da.bits() { db } else { da }
}

// =========================================================================
// Conversions
// =========================================================================

impl From<&Var> for PrimExpr {
    fn from(var: &Var) -> Self {
        PrimExpr::new(ExprKind::Var(var.clone()), var.dtype())
    }
}

impl From<Var> for PrimExpr {
    fn from(var: Var) -> Self {
        let dtype = var.dtype();
        PrimExpr::new(ExprKind::Var(var), dtype)
    }
}

impl From<i64> for PrimExpr {
    fn from(value: i64) -> Self {
        PrimExpr::int(value)
    }
}

impl From<i32> for PrimExpr {
    fn from(value: i32) -> Self {
        PrimExpr::int(value as i64)
    }
}

impl From<bool> for PrimExpr {
    fn from(value: bool) -> Self {
        PrimExpr::bool(value)
    }
}

impl From<&PrimExpr> for PrimExpr {
    fn from(value: &PrimExpr) -> Self {
        value.clone()
    }
}

// =========================================================================
// Operators
// =========================================================================

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<PrimExpr>> std::ops::$trait<T> for PrimExpr {
            type Output = PrimExpr;
            fn $method(self, rhs: T) -> PrimExpr {
                PrimExpr::binary($op, self, rhs.into())
            }
        }

        impl<T: Into<PrimExpr>> std::ops::$trait<T> for &PrimExpr {
            type Output = PrimExpr;
            fn $method(self, rhs: T) -> PrimExpr {
                PrimExpr::binary($op, self.clone(), rhs.into())
            }
        }

        impl<T: Into<PrimExpr>> std::ops::$trait<T> for &Var {
            type Output = PrimExpr;
            fn $method(self, rhs: T) -> PrimExpr {
                PrimExpr::binary($op, self.into(), rhs.into())
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);

impl std::ops::Neg for PrimExpr {
    type Output = PrimExpr;
    fn neg(self) -> PrimExpr {
        let zero = PrimExpr::zero(self.dtype());
        PrimExpr::binary(BinaryOp::Sub, zero, self)
    }
}

pub fn floordiv(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::binary(BinaryOp::FloorDiv, a.into(), b.into())
}

pub fn floormod(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::binary(BinaryOp::FloorMod, a.into(), b.into())
}

pub fn min(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::binary(BinaryOp::Min, a.into(), b.into())
}

pub fn max(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::binary(BinaryOp::Max, a.into(), b.into())
}

pub fn eq(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::cmp(CmpOp::Eq, a.into(), b.into())
}

pub fn ne(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::cmp(CmpOp::Ne, a.into(), b.into())
}

pub fn lt(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::cmp(CmpOp::Lt, a.into(), b.into())
}

pub fn le(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::cmp(CmpOp::Le, a.into(), b.into())
}

pub fn gt(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::cmp(CmpOp::Gt, a.into(), b.into())
}

pub fn ge(a: impl Into<PrimExpr>, b: impl Into<PrimExpr>) -> PrimExpr {
    PrimExpr::cmp(CmpOp::Ge, a.into(), b.into())
}

/// Conjunction of all conditions; `true` when empty.
pub fn all(conds: impl IntoIterator<Item = PrimExpr>) -> PrimExpr {
    conds.into_iter().reduce(PrimExpr::and).unwrap_or_else(|| PrimExpr::bool(true))
}
