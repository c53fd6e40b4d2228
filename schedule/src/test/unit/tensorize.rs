use tessera_ir::prelude::*;
use tessera_ir::{AnnotationValue, Annotations};

use crate::error::ScheduleError;
use crate::primitive::TensorizeComparator;
use crate::schedule::Target;
use crate::test::helpers::*;

fn sources(block: &Block) -> Vec<String> {
    block.match_buffers.iter().map(|m| m.source.to_string()).collect()
}

#[test]
fn test_tensorize_loop() {
    register_matmul_intrin("test_mma_16_loop", 16, Annotations::new());
    let mut sch = schedule(matmul(16, false));
    let block = sch.get_block("update").unwrap();
    let loops = sch.get_loops(block).unwrap();
    sch.tensorize(Target::Loop(loops[0]), "test_mma_16_loop").unwrap();

    let root = sch.mod_().root_block().unwrap();
    let realize = root.body.as_block_realize().expect("loop replaced by a block");
    let tensorized = &realize.block;
    assert_eq!(tensorized.name, "update_o");
    assert_eq!(sources(tensorized), ["A[0:16, 0:16]", "B[0:16, 0:16]", "C[0:16, 0:16]"]);
    let bound: Vec<&str> = tensorized.match_buffers.iter().map(|m| m.buffer.name()).collect();
    assert_eq!(bound, ["A_i", "B_i", "C_i"]);
    assert!(matches!(tensorized.body, Stmt::Evaluate(_)));
    assert_eq!(sch.state().find_blocks("update"), Vec::<NodeId>::new());
}

#[test]
fn test_tensorize_blockized_tile() {
    register_matmul_intrin("test_mma_16_tile", 16, Annotations::new());
    let mut sch = schedule(tiled_matmul(2, 16));
    let block = sch.get_block("update").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize(Target::Loop(loops[3])).unwrap();
    sch.tensorize(Target::Block(outer), "test_mma_16_tile").unwrap();

    let state = sch.state();
    let realize = state.get_block_realize(outer).unwrap();
    let tensorized = &realize.block;
    assert_eq!(tensorized.name, "update_o");
    assert_eq!(tensorized.iter_vars.len(), 3);
    assert_eq!(realize.iter_values.iter().map(ToString::to_string).collect::<Vec<_>>(), ["i0", "j0", "k0"]);
    assert_eq!(tensorized.match_buffers.len(), 3);

    // Every matched region lies inside the footprint the block records for
    // its buffer, and that footprint inside the 32 x 32 program buffer.
    let mut analyzer = Analyzer::new();
    for iv in &tensorized.iter_vars {
        analyzer.bind(&iv.var, &iv.dom);
    }
    for matched in &tensorized.match_buffers {
        let footprint = tensorized
            .reads
            .iter()
            .chain(&tensorized.writes)
            .find(|region| region.buffer == matched.source.buffer)
            .expect("matched buffer is accessed by the block");
        for (range, outer) in matched.source.region.iter().zip(&footprint.region) {
            assert_eq!(range.extent.as_int(), Some(16));
            assert!(analyzer.can_prove(&tessera_ir::expr::ge(range.min.clone(), outer.min.clone())));
            assert!(analyzer.can_prove(&tessera_ir::expr::le(
                &range.min + range.extent.clone(),
                &outer.min + outer.extent.clone()
            )));
            assert!(analyzer.can_prove(&tessera_ir::expr::ge(outer.min.clone(), 0)));
            assert!(analyzer.can_prove(&tessera_ir::expr::le(&outer.min + outer.extent.clone(), 32)));
        }
    }
    assert_eq!(tensorized.match_buffers[0].source.region[0].min.to_string(), "vi_o * 16");
    assert_eq!(state.get_loops(outer).unwrap().len(), 3);
}

#[test]
fn test_copies_implementation_annotations() {
    let annotations = annotation("mma_sync", AnnotationValue::Bool(true));
    register_matmul_intrin("test_mma_8_annotated", 8, annotations);
    let mut sch = schedule(matmul(8, false));
    let block = sch.get_block("update").unwrap();
    let loops = sch.get_loops(block).unwrap();
    sch.tensorize(Target::Loop(loops[0]), "test_mma_8_annotated").unwrap();

    let root = sch.mod_().root_block().unwrap();
    let tensorized = &root.body.as_block_realize().unwrap().block;
    assert_eq!(tensorized.annotations.get("mma_sync"), Some(&AnnotationValue::Bool(true)));
}

#[test]
fn test_shape_mismatch_leaves_program() {
    register_matmul_intrin("test_mma_8_mismatch", 8, Annotations::new());
    let mut sch = schedule(matmul(16, false));
    let before = sch.mod_().body.clone();
    let block = sch.get_block("update").unwrap();
    let loops = sch.get_loops(block).unwrap();

    let err = sch.tensorize(Target::Loop(loops[0]), "test_mma_8_mismatch").unwrap_err();
    assert!(matches!(err, ScheduleError::TensorizeMismatch { .. }), "{err}");
    assert!(sch.mod_().body.same_as(&before));
    assert_eq!(sch.trace().len(), 2);
}

#[test]
fn test_unknown_intrinsic() {
    let mut sch = schedule(matmul(4, false));
    let block = sch.get_block("update").unwrap();
    let err = sch.tensorize(Target::Block(block), "test_mma_missing").unwrap_err();
    assert_eq!(err, ScheduleError::IntrinNotFound { name: "test_mma_missing".into() });
}

#[test]
fn test_block_list_target_rejected() {
    let mut sch = schedule(matmul(4, false));
    let block = sch.get_block("update").unwrap();
    let err = sch.tensorize(vec![block], "test_mma_any").unwrap_err();
    assert!(matches!(err, ScheduleError::WrongTargetKind { op: "tensorize", found: "block list", .. }));
    assert_eq!(sch.tensorize(Vec::<NodeId>::new(), "test_mma_any").unwrap_err(), ScheduleError::EmptyTargets);
}

#[test]
fn test_block_without_regions_has_no_index_type() {
    register_matmul_intrin("test_mma_4_no_regions", 4, Annotations::new());
    let i = Var::index("i");
    let block = Block::builder().name("opaque").body(Stmt::Evaluate(PrimExpr::int(0))).build();
    let body = For::serial(&i, 4, realize(Vec::new(), block));
    let mut sch = schedule(PrimFunc::new("opaque", Vec::<Buffer>::new(), body));
    let block = sch.get_block("opaque").unwrap();
    let lp = sch.get_loops(block).unwrap()[0];

    let err = sch.tensorize(Target::Loop(lp), "test_mma_4_no_regions").unwrap_err();
    assert_eq!(err, ScheduleError::IndexBitsNotPositive { block: "opaque_o".into(), bits: 0 });
}

#[test]
fn test_comparator_binds_buffers_and_basis() {
    let (a, b, c) = (f32_buffer("A", &[4, 4]), f32_buffer("B", &[4, 4]), f32_buffer("C", &[4, 4]));
    let (ad, bd, cd) = (f32_buffer("A_d", &[4, 4]), f32_buffer("B_d", &[4, 4]), f32_buffer("C_d", &[4, 4]));
    let scope = |a: &Buffer, b: &Buffer, c: &Buffer| {
        let root = Block::builder()
            .name("scope")
            .reads(vec![BufferRegion::full(c), BufferRegion::full(a), BufferRegion::full(b)])
            .writes(vec![BufferRegion::full(c)])
            .body(matmul_nest(a, b, c, 4, false))
            .build();
        realize(Vec::new(), root)
    };

    let mut comparator = TensorizeComparator::new();
    comparator.compare_stmt(&scope(&a, &b, &c), &scope(&ad, &bd, &cd)).unwrap();
    assert_eq!(comparator.rhs_buffer_map.get(&ad), Some(&a));
    assert_eq!(comparator.rhs_buffer_map.get(&cd), Some(&c));
    let basis: Vec<String> = comparator.buffer_indices[&b].iter().map(ToString::to_string).collect();
    assert_eq!(basis, ["0", "0"]);
}

#[test]
fn test_comparator_rejects_different_operator() {
    let x = f32_buffer("X", &[4]);
    let (i, j) = (Var::index("i"), Var::index("j"));
    let mut comparator = TensorizeComparator::new();
    comparator.compare_expr(&i.to_expr(), &j.to_expr()).unwrap_err();

    let load = PrimExpr::load(&x, [PrimExpr::int(0)]);
    let one = PrimExpr::float(1.0, DType::Float32);
    let err = comparator.compare_expr(&(&load + one.clone()), &(&load * one));
    assert!(matches!(err, Err(ScheduleError::TensorizeMismatch { reason: "expression", .. })));
}
