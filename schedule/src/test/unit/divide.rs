use tessera_ir::arith::Analyzer;
use tessera_ir::expr::lt;
use tessera_ir::prelude::*;

use crate::primitive::blockize::binding::{IterBindings, derive_block_binding};
use crate::primitive::blockize::divide::{subspace_divide, trivial_subspace_division};
use crate::test::helpers::*;

/// Single-block program `A[v] = 0` with `v` bound to `binding` under `loops`.
fn bound_program(loops: &[(&Var, i64)], binding: PrimExpr, extent: i64) -> PrimFunc {
    let a = f32_buffer("A", &[extent]);
    let block = store_block("B", &a, &["v"]);
    PrimFunc::new("f", [a], loop_nest(loops, realize(vec![binding], block)))
}

#[test]
fn test_tiled_binding_divides() {
    let (i0, i1) = (Var::index("i0"), Var::index("i1"));
    let state = state(bound_program(&[(&i0, 2), (&i1, 4)], &i0 * 4 + &i1, 8));
    let block = state.find_blocks("B")[0];
    let loops = state.get_loops(block).unwrap();

    let mut analyzer = Analyzer::new();
    let (division, divided) = subspace_divide(&state, block, loops[1], &mut analyzer, true, false).unwrap();
    let division = division.expect("affine binding");

    assert_eq!(divided.inner.len(), 1);
    assert_eq!(divided.outer.len(), 1);
    let (outer, inner) = &division.marks[0];
    assert_eq!(outer.extent.as_int(), Some(2));
    assert_eq!(inner.extent.as_int(), Some(4));
    assert_eq!(outer.to_expr().to_string(), "i0");
    assert_eq!(inner.to_expr().to_string(), "i1");
    assert!(division.outer_predicate.is_const_true());
    assert!(division.inner_predicate.is_const_true());
}

#[test]
fn test_boundary_is_outer() {
    let (i0, i1) = (Var::index("i0"), Var::index("i1"));
    let state = state(bound_program(&[(&i0, 2), (&i1, 4)], &i0 * 4 + &i1, 8));
    let block = state.find_blocks("B")[0];
    let loops = state.get_loops(block).unwrap();

    let mut analyzer = Analyzer::new();
    let (division, divided) = subspace_divide(&state, block, loops[1], &mut analyzer, true, true).unwrap();
    assert!(divided.inner.is_empty());
    assert_eq!(divided.outer.len(), 2);
    let (outer, inner) = &division.unwrap().marks[0];
    assert_eq!(outer.extent.as_int(), Some(8));
    assert!(inner.is_unit());
}

#[test]
fn test_non_affine_falls_back_to_trivial() {
    let i = Var::index("i");
    let state = state(bound_program(&[(&i, 9)], floormod(&i, 3), 3));
    let block = state.find_blocks("B")[0];
    let lp = state.get_loops(block).unwrap()[0];

    let mut analyzer = Analyzer::new();
    let (division, _) = subspace_divide(&state, block, lp, &mut analyzer, true, false).unwrap();
    let (outer, inner) = &division.expect("trivial division").marks[0];
    assert!(outer.is_unit());
    assert_eq!(inner.extent.as_int(), Some(3));
    assert_eq!(inner.to_expr().to_string(), "i % 3");
}

#[test]
fn test_mixed_binding_is_not_divisible() {
    let (i, j) = (Var::index("i"), Var::index("j"));
    let state = state(bound_program(&[(&i, 4), (&j, 4)], &i * &j, 16));
    let block = state.find_blocks("B")[0];
    let loops = state.get_loops(block).unwrap();

    let mut analyzer = Analyzer::new();
    let (division, _) = subspace_divide(&state, block, loops[1], &mut analyzer, true, false).unwrap();
    assert!(division.is_none());
}

#[test]
fn test_trivial_division_needs_true_predicate() {
    let (i, j) = (Var::index("i"), Var::index("j"));
    let v = Var::index("v");
    let iter_vars = [IterVar::spatial(&v, 4)];
    let bindings = [j.to_expr()];

    let division = trivial_subspace_division(&iter_vars, &bindings, &PrimExpr::bool(true), &[i.clone()], &[j.clone()]);
    let (outer, inner) = &division.expect("binding uses only inner loops").marks[0];
    assert!(outer.is_unit());
    assert_eq!(inner.to_expr().to_string(), "j");

    let guarded = trivial_subspace_division(&iter_vars, &bindings, &lt(&j, 3), &[i], &[j]);
    assert!(guarded.is_none());
}

#[test]
fn test_loop_free_binding_keeps_value() {
    let (i, j) = (Var::index("i"), Var::index("j"));
    let v = Var::index("v");
    let iter_vars = [IterVar::spatial(&v, 4)];
    let division =
        trivial_subspace_division(&iter_vars, &[PrimExpr::int(2)], &PrimExpr::bool(true), &[i], &[j]).unwrap();
    let (outer, inner) = &division.marks[0];
    assert_eq!(outer.to_expr().as_int(), Some(2));
    assert!(outer.is_unit() && inner.is_unit());

    // Folding the unit iterators substitutes the bound value, not zero.
    let (mut outer_bindings, mut inner_bindings) = (IterBindings::default(), IterBindings::default());
    let subst =
        derive_block_binding(&iter_vars, &division, &mut outer_bindings, &mut inner_bindings, false, false).unwrap();
    assert_eq!(subst[&v].as_int(), Some(2));
    let dom = &outer_bindings.iter_vars[0].dom;
    assert_eq!((dom.min.as_int(), dom.extent.as_int()), (Some(2), Some(1)));
}
