use std::sync::Arc;

use tessera_ir::expr::lt;
use tessera_ir::prelude::*;
use tessera_ir::uses_var;
use test_case::test_case;

use crate::error::ScheduleError;
use crate::schedule::Target;
use crate::test::helpers::*;

fn names(block: &Block) -> Vec<&str> {
    block.iter_vars.iter().map(|iv| iv.var.name()).collect()
}

fn rendered(values: &[PrimExpr]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[test]
fn test_blockize_inner_loop() {
    let mut sch = schedule(elementwise(8, 8));
    let block = sch.get_block("compute").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let original = sch.state().get_block(block).unwrap();
    let outer = sch.blockize(Target::Loop(loops[1])).unwrap();
    let state = sch.state();

    let outer_realize = state.get_block_realize(outer).unwrap();
    let outer_block = &outer_realize.block;
    assert_eq!(outer_block.name, "compute_o");

    // The outer write covers the original point write over the whole inner loop.
    assert_eq!(outer_block.writes.len(), original.writes.len());
    assert_eq!(outer_block.writes[0].buffer, original.writes[0].buffer);
    let covered = &outer_block.writes[0].region[1];
    let vj_dom = &original.iter_vars[1].dom;
    assert_eq!((covered.min.as_int(), covered.extent.as_int()), (vj_dom.min.as_int(), vj_dom.extent.as_int()));
    assert_eq!(names(outer_block), ["vi_o", "vj_o"]);
    assert_eq!(outer_block.iter_vars[0].dom.extent.as_int(), Some(8));
    assert_eq!(outer_block.iter_vars[1].dom.extent.as_int(), Some(1));
    assert_eq!(rendered(&outer_realize.iter_values), ["i", "0"]);
    assert_eq!(outer_block.writes[0].to_string(), "A[vi_o, 0:8]");
    assert!(outer_block.init.is_none());

    // The old block handle now names the inner block.
    let inner = state.resolve(block).unwrap();
    let inner_realize = state.get_block_realize(inner).unwrap();
    assert_eq!(inner_realize.block.name, "compute");
    assert_eq!(names(&inner_realize.block), ["vj_i"]);
    assert_eq!(rendered(&inner_realize.iter_values), ["j"]);
    assert_eq!(inner_realize.block.writes[0].to_string(), "A[vi_o, vj_i]");

    assert_eq!(state.get_loops(outer).unwrap(), vec![state.resolve(loops[0]).unwrap()]);
    let inner_loops = state.get_loops(inner).unwrap();
    assert_eq!(inner_loops, vec![state.resolve(loops[1]).unwrap()]);
    assert_eq!(state.get_for(inner_loops[0]).unwrap().loop_var.name(), "j");
    assert_eq!(state.get_scope_root(inner).unwrap(), outer);
}

#[test]
fn test_blockize_whole_nest() {
    let mut sch = schedule(elementwise(4, 4));
    let block = sch.get_block("compute").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize(Target::Loop(loops[0])).unwrap();
    let state = sch.state();

    let outer_realize = state.get_block_realize(outer).unwrap();
    assert_eq!(rendered(&outer_realize.iter_values), ["0", "0"]);
    assert_eq!(outer_realize.block.writes[0].to_string(), "A[0:4, 0:4]");
    assert!(state.get_loops(outer).unwrap().is_empty());

    let inner = state.get_block_realize(block).unwrap();
    assert_eq!(names(&inner.block), ["vi_i", "vj_i"]);
    assert_eq!(state.get_loops(block).unwrap().len(), 2);
}

#[test_case(true, "A[vi_i, vu_o]" ; "unit iterator preserved")]
#[test_case(false, "A[vi_i, 0]" ; "unit iterator folded")]
fn test_preserve_unit_iters(preserve: bool, expected: &str) {
    let a = f32_buffer("A", &[8, 1]);
    let (i, u) = (Var::index("i"), Var::index("u"));
    let block = store_block("B", &a, &["vi", "vu"]);
    let body = loop_nest(&[(&i, 8), (&u, 1)], realize(vec![i.to_expr(), u.to_expr()], block));
    let mut sch = schedule(PrimFunc::new("unit", [a], body));

    let block = sch.get_block("B").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize_with().target(Target::Loop(loops[0])).preserve_unit_iters(preserve).call().unwrap();

    let inner = sch.state().get_block(block).unwrap();
    assert_eq!(inner.writes[0].to_string(), expected);
    assert_eq!(sch.state().get_block(outer).unwrap().iter_vars.len(), 2);
}

#[test]
fn test_outer_reduction_moves_init() {
    let mut sch = schedule(matmul(4, true));
    let block = sch.get_block("update").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let original_j = sch.state().get_for(loops[1]).unwrap().loop_var.clone();
    let outer = sch.blockize(Target::Loop(loops[1])).unwrap();
    let state = sch.state();

    let outer_realize = state.get_block_realize(outer).unwrap();
    let outer_block = &outer_realize.block;
    assert_eq!(names(outer_block), ["vi_o", "vj_o", "vk_o"]);
    assert_eq!(outer_block.iter_vars[2].iter_type, IterVarType::CommReduce);
    assert_eq!(rendered(&outer_realize.iter_values), ["i", "0", "0"]);

    let inner = state.get_block(block).unwrap();
    assert_eq!(names(&inner), ["vj_i", "vk_i"]);
    assert!(inner.init.is_none());
    // The inner block also reads what it accumulates into.
    assert_eq!(inner.reads.len(), 4);
    assert_eq!(inner.reads[0].to_string(), "C[vi_o, vj_i]");

    let init = outer_block.init.as_ref().expect("init moved to the outer block");
    let init_loop = init.as_for().expect("init is wrapped in a loop copy");
    assert_eq!(init_loop.loop_var.name(), "j");
    assert_ne!(init_loop.loop_var, original_j);
    assert_eq!(init_loop.extent.as_int(), Some(4));

    let init_realize = init_loop.body.as_block_realize().unwrap();
    assert_eq!(init_realize.block.name, "update_init");
    assert_eq!(names(&init_realize.block), ["vj_i_init"]);
    assert_eq!(rendered(&init_realize.iter_values), ["j"]);
    assert_eq!(init_realize.block.writes[0].to_string(), "C[vi_o, vj_i_init]");
}

#[test]
fn test_blockize_single_block_target() {
    let mut sch = schedule(elementwise(8, 8));
    let block = sch.get_block("compute").unwrap();
    let outer = sch.blockize(Target::Block(block)).unwrap();
    let state = sch.state();

    let outer_realize = state.get_block_realize(outer).unwrap();
    assert_eq!(outer_realize.block.name, "outer_compute_");
    assert_eq!(names(&outer_realize.block), ["vi", "vj"]);
    assert_eq!(rendered(&outer_realize.iter_values), ["i", "j"]);
    assert_eq!(outer_realize.block.writes[0].to_string(), "A[0:8, 0:8]");

    let inner = state.get_block_realize(block).unwrap();
    assert_eq!(names(&inner.block), ["vi_i", "vj_i"]);
    assert_eq!(rendered(&inner.iter_values), ["vi", "vj"]);
    assert_eq!(state.get_loops(outer).unwrap().len(), 2);
}

#[test]
fn test_not_single_child_block() {
    let x = f32_buffer("X", &[8]);
    let y = f32_buffer("Y", &[8]);
    let i = Var::index("i");
    let body = For::serial(
        &i,
        8,
        Stmt::seq([
            realize(vec![i.to_expr()], store_block("B0", &x, &["v"])),
            realize(vec![i.to_expr()], store_block("B1", &y, &["v"])),
        ]),
    );
    let mut sch = schedule(PrimFunc::new("pair", [x, y], body));
    let before = sch.mod_().body.clone();
    let lp = sch.state().get_loops(sch.state().find_blocks("B0")[0]).unwrap()[0];

    let err = sch.blockize(Target::Loop(lp)).unwrap_err();
    assert_eq!(err, ScheduleError::NotSingleChildBlock { loop_id: lp, count: 2 });
    assert!(sch.mod_().body.same_as(&before));
    assert!(sch.trace().is_empty());
}

#[test]
fn test_indivisible_binding() {
    let a = f32_buffer("A", &[16]);
    let (i, j) = (Var::index("i"), Var::index("j"));
    let body = loop_nest(&[(&i, 4), (&j, 4)], realize(vec![&i * &j], store_block("B", &a, &["v"])));
    let mut sch = schedule(PrimFunc::new("product", [a], body));
    let before = sch.mod_().body.clone();
    let block = sch.get_block("B").unwrap();
    let loops = sch.get_loops(block).unwrap();

    let err = sch.blockize(Target::Loop(loops[1])).unwrap_err();
    assert!(matches!(err, ScheduleError::SubspaceNotDivisible { ref block_name, .. } if block_name == "B"));
    assert_eq!(err.locations(), vec![block, loops[1]]);
    assert!(sch.mod_().body.same_as(&before));
}

#[test]
fn test_blockize_twice_nests_blocks() {
    let mut sch = schedule(elementwise(8, 8));
    let block = sch.get_block("compute").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let first = sch.blockize(Target::Loop(loops[1])).unwrap();
    let second = sch.blockize(Target::Loop(loops[0])).unwrap();
    let state = sch.state();

    assert_eq!(state.get_block(second).unwrap().name, "compute_o_o");
    assert_eq!(state.get_scope_root(first).unwrap(), second);
    assert_eq!(state.get_scope_root(block).unwrap(), state.resolve(first).unwrap());
    assert_eq!(state.block_info(second).unwrap().child_blocks, vec![state.resolve(first).unwrap()]);
}

#[test]
fn test_loop_free_binding_keeps_constant() {
    let a = f32_buffer("A", &[8, 4]);
    let j = Var::index("j");
    let body = For::serial(&j, 4, realize(vec![PrimExpr::int(3), j.to_expr()], store_block("B", &a, &["vc", "vj"])));
    let mut sch = schedule(PrimFunc::new("row", [a], body));
    let block = sch.get_block("B").unwrap();
    let lp = sch.get_loops(block).unwrap()[0];
    let outer = sch.blockize_with().target(Target::Loop(lp)).preserve_unit_iters(false).call().unwrap();
    let state = sch.state();

    let inner = state.get_block(block).unwrap();
    assert_eq!(inner.writes[0].to_string(), "A[3, vj_i]");
    let outer_realize = state.get_block_realize(outer).unwrap();
    assert_eq!(outer_realize.block.writes[0].to_string(), "A[3, 0:4]");
    assert_eq!(rendered(&outer_realize.iter_values)[0], "3");
    let vc_dom = &outer_realize.block.iter_vars[0].dom;
    assert_eq!((vc_dom.min.as_int(), vc_dom.extent.as_int()), (Some(3), Some(1)));
}

#[test]
fn test_offset_binding_domain() {
    let a = f32_buffer("A", &[6, 4]);
    let (i, j) = (Var::index("i"), Var::index("j"));
    let block = store_block("B", &a, &["vi", "vj"]);
    let body = loop_nest(&[(&i, 3), (&j, 4)], realize(vec![&i + 3, j.to_expr()], block));
    let mut sch = schedule(PrimFunc::new("shifted", [a], body));
    let block = sch.get_block("B").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize(Target::Loop(loops[1])).unwrap();

    let outer_realize = sch.state().get_block_realize(outer).unwrap();
    assert_eq!(rendered(&outer_realize.iter_values)[0], "i + 3");
    // The domain of the outer variable holds every value of `i + 3`.
    let dom = &outer_realize.block.iter_vars[0].dom;
    assert_eq!((dom.min.as_int(), dom.extent.as_int()), (Some(3), Some(3)));
    assert_eq!(outer_realize.block.writes[0].to_string(), "A[vi_o, 0:4]");
}

#[test]
fn test_guarded_imperfect_split() {
    let a = f32_buffer("A", &[10]);
    let (i, j) = (Var::index("i"), Var::index("j"));
    let fused = &i * 4 + &j;
    let guarded = BlockRealize::new(vec![fused.clone()], lt(fused, 10), Arc::new(store_block("B", &a, &["v"])));
    let body = loop_nest(&[(&i, 3), (&j, 4)], Stmt::from(guarded));
    let mut sch = schedule(PrimFunc::new("guarded", [a], body));
    let block = sch.get_block("B").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize(Target::Loop(loops[1])).unwrap();
    let state = sch.state();

    let outer_realize = state.get_block_realize(outer).unwrap();
    assert!(outer_realize.predicate.is_const_true());
    assert_eq!(rendered(&outer_realize.iter_values), ["i"]);
    assert_eq!(outer_realize.block.iter_vars[0].dom.extent.as_int(), Some(3));

    // The guard mixes both subspaces and stays on the inner block.
    let inner = state.get_block_realize(block).unwrap();
    assert_eq!(rendered(&inner.iter_values), ["j"]);
    assert!(!inner.predicate.is_const_true());
    assert!(uses_var(&inner.predicate, |v| *v == i));
    assert!(uses_var(&inner.predicate, |v| *v == j));
    let index = &inner.block.writes[0].region[0].min;
    let used: Vec<String> = tessera_ir::collect_vars(index).iter().map(|v| v.name().to_string()).collect();
    assert_eq!(names(&inner.block), ["v_i"]);
    assert!(used.contains(&"v_o".to_string()) && used.contains(&"v_i".to_string()), "{index}");
}
