use std::collections::HashMap;

use crate::arith::{ConstIntBound, const_int_bound};
use crate::expr::{PrimExpr, Var, floordiv, floormod};
use tessera_dtype::DType;

#[test]
fn test_const_bound_is_point() {
    let bound = const_int_bound(&PrimExpr::int(5), &HashMap::new());
    assert_eq!(bound, ConstIntBound::point(5));
    assert!(bound.is_point());
}

#[test]
fn test_unbound_var_uses_dtype_range() {
    let i = Var::index("i");
    let bound = const_int_bound(&i.to_expr(), &HashMap::new());
    assert_eq!(bound, ConstIntBound::new(i32::MIN as i64, i32::MAX as i64));
}

#[test]
fn test_linear_bound() {
    let i = Var::index("i");
    let vars = HashMap::from([(i.clone(), ConstIntBound::new(0, 7))]);
    assert_eq!(const_int_bound(&(&i * 8), &vars), ConstIntBound::new(0, 56));
    assert_eq!(const_int_bound(&(&i * -2 + 3), &vars), ConstIntBound::new(-11, 3));
}

#[test]
fn test_floordiv_floormod_bound() {
    let i = Var::index("i");
    let vars = HashMap::from([(i.clone(), ConstIntBound::new(0, 100))]);
    assert_eq!(const_int_bound(&floormod(i.to_expr(), 4), &vars), ConstIntBound::new(0, 3));
    assert_eq!(const_int_bound(&floordiv(i.to_expr(), 4), &vars), ConstIntBound::new(0, 25));
}

#[test]
fn test_dtype_ranges() {
    assert_eq!(ConstIntBound::of_dtype(DType::Bool), ConstIntBound::new(0, 1));
    assert_eq!(ConstIntBound::of_dtype(DType::UInt8), ConstIntBound::new(0, 255));
    assert_eq!(ConstIntBound::of_dtype(DType::Int8), ConstIntBound::new(-128, 127));
    assert!(!ConstIntBound::of_dtype(DType::Int64).is_finite());
}
