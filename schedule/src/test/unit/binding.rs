use tessera_ir::arith::IterMark;
use tessera_ir::prelude::*;
use test_case::test_case;

use crate::error::ScheduleError;
use crate::primitive::blockize::binding::{IterBindings, derive_block_binding};
use crate::primitive::blockize::divide::SubspaceDivision;

fn mark(var: &Var, extent: i64) -> IterMark {
    if extent == 1 { IterMark::unit(DType::Int32) } else { IterMark::from_expr(var.to_expr(), PrimExpr::int(extent)) }
}

fn division(outer: IterMark, inner: IterMark) -> SubspaceDivision {
    SubspaceDivision { marks: vec![(outer, inner)], outer_predicate: PrimExpr::bool(true), inner_predicate: PrimExpr::bool(true) }
}

#[test_case(1, 1, false, "0" ; "both unit dropped")]
#[test_case(1, 1, true, "vi_o" ; "both unit preserved")]
#[test_case(1, 4, true, "vi_i" ; "inner only")]
#[test_case(2, 1, true, "vi_o" ; "outer only")]
#[test_case(2, 4, true, "vi_o * 4 + vi_i" ; "outer and inner")]
fn test_substitution(outer_extent: i64, inner_extent: i64, preserve: bool, expected: &str) {
    let (io, ii, vi) = (Var::index("io"), Var::index("ii"), Var::index("vi"));
    let div = division(mark(&io, outer_extent), mark(&ii, inner_extent));
    let iter_vars = [IterVar::spatial(&vi, outer_extent * inner_extent)];

    let (mut outer, mut inner) = (IterBindings::default(), IterBindings::default());
    let subst = derive_block_binding(&iter_vars, &div, &mut outer, &mut inner, preserve, false).unwrap();

    assert_eq!(subst[&vi].to_string(), expected);
    assert_eq!(outer.iter_vars.len(), 1);
    assert_eq!(outer.iter_vars[0].var.name(), "vi_o");
    assert_eq!(outer.iter_vars[0].dom.extent.as_int(), Some(outer_extent));
    assert_eq!(inner.iter_vars.len(), usize::from(inner_extent != 1));
}

#[test]
fn test_iter_types_carry_over() {
    let (io, ii, vk) = (Var::index("io"), Var::index("ii"), Var::index("vk"));
    let div = division(mark(&io, 2), mark(&ii, 4));
    let (mut outer, mut inner) = (IterBindings::default(), IterBindings::default());
    derive_block_binding(&[IterVar::reduce(&vk, 8)], &div, &mut outer, &mut inner, true, false).unwrap();

    assert_eq!(outer.iter_vars[0].iter_type, IterVarType::CommReduce);
    assert_eq!(inner.iter_vars[0].iter_type, IterVarType::CommReduce);
    assert_eq!(outer.values[0].to_string(), "io");
    assert_eq!(inner.values[0].to_string(), "ii");
}

fn existing(extent: i64, value: PrimExpr) -> (Var, IterBindings) {
    let var = Var::index("shared_o");
    let bindings = IterBindings { iter_vars: vec![IterVar::spatial(&var, extent)], values: vec![value] };
    (var, bindings)
}

#[test]
fn test_reuse_outer_keeps_existing_var() {
    let (io, ii, vi) = (Var::index("io"), Var::index("ii"), Var::index("vi"));
    let div = division(mark(&io, 2), mark(&ii, 4));
    let (shared, mut outer) = existing(2, io.to_expr());
    let mut inner = IterBindings::default();

    let subst = derive_block_binding(&[IterVar::spatial(&vi, 8)], &div, &mut outer, &mut inner, true, true).unwrap();
    assert_eq!(outer.iter_vars.len(), 1);
    assert_eq!(subst[&vi].to_string(), "shared_o * 4 + vi_i");
    assert_eq!(outer.iter_vars[0].var, shared);
}

#[test]
fn test_reuse_outer_extent_mismatch() {
    let (io, ii, vi) = (Var::index("io"), Var::index("ii"), Var::index("vi"));
    let div = division(mark(&io, 2), mark(&ii, 4));
    let (_, mut outer) = existing(3, io.to_expr());
    let mut inner = IterBindings::default();

    let err = derive_block_binding(&[IterVar::spatial(&vi, 8)], &div, &mut outer, &mut inner, true, true).unwrap_err();
    assert_eq!(
        err,
        ScheduleError::IterExtentMismatch { var: "shared_o".into(), expected: "2".into(), actual: "3".into() }
    );
}

#[test]
fn test_reuse_outer_binding_mismatch() {
    let (io, ii, vi) = (Var::index("io"), Var::index("ii"), Var::index("vi"));
    let div = division(mark(&io, 2), mark(&ii, 4));
    let (_, mut outer) = existing(2, ii.to_expr());
    let mut inner = IterBindings::default();

    let err = derive_block_binding(&[IterVar::spatial(&vi, 8)], &div, &mut outer, &mut inner, true, true).unwrap_err();
    assert!(matches!(err, ScheduleError::IterBindingMismatch { ref var, .. } if var == "shared_o"));
}
