use tessera_ir::Annotations;

use crate::schedule::Target;
use crate::test::helpers::*;
use crate::trace::Instruction;

#[test]
fn test_render_blockize_script() {
    let mut sch = schedule(elementwise(8, 8));
    let block = sch.get_block("compute").unwrap();
    let loops = sch.get_loops(block).unwrap();
    sch.blockize(Target::Loop(loops[1])).unwrap();

    let expected = "\
b0 = sch.get_block(name=\"compute\")
l1, l2 = sch.get_loops(block=b0)
b3 = sch.blockize(target=l2, preserve_unit_iters=True)
";
    assert_eq!(sch.trace().to_string(), expected);
    assert_eq!(sch.trace().len(), 3);
}

#[test]
fn test_render_tensorize() {
    register_matmul_intrin("test_trace_mma_4", 4, Annotations::new());
    let mut sch = schedule(matmul(4, false));
    let block = sch.get_block("update").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize_with().target(Target::Loop(loops[0])).preserve_unit_iters(false).call().unwrap();
    sch.tensorize(Target::Block(outer), "test_trace_mma_4").unwrap();

    let lines: Vec<String> = sch.trace().to_string().lines().map(str::to_string).collect();
    assert_eq!(lines[2], "b4 = sch.blockize(target=l1, preserve_unit_iters=False)");
    assert_eq!(lines[3], "sch.tensorize(block_or_loop=b4, tensor_intrin=\"test_trace_mma_4\", preserve_unit_iters=True)");
    assert_eq!(sch.trace().instructions()[3].name(), "tensorize");
}

#[test]
fn test_render_block_list() {
    let mut sch = schedule(elementwise(8, 1));
    let block = sch.get_block("compute").unwrap();
    let loops = sch.get_loops(block).unwrap();
    assert_eq!(loops.len(), 2);
    sch.blockize(vec![block]).unwrap();

    let rendered = sch.trace().to_string();
    assert!(rendered.contains("sch.blockize(target=[b0], preserve_unit_iters=True)"), "{rendered}");
}

#[test]
fn test_single_output_get_loops() {
    let a = f32_buffer("A", &[4]);
    let i = tessera_ir::Var::index("i");
    let body = tessera_ir::For::serial(&i, 4, realize(vec![i.to_expr()], store_block("B", &a, &["v"])));
    let mut sch = schedule(tessera_ir::PrimFunc::new("single", [a], body));
    let block = sch.get_block("B").unwrap();
    sch.get_loops(block).unwrap();
    assert_eq!(sch.trace().to_string().lines().nth(1), Some("l1, = sch.get_loops(block=b0)"));
}

#[test]
fn test_replay_reproduces_program() {
    let func = elementwise(8, 8);
    let mut sch = schedule(func.clone());
    let block = sch.get_block("compute").unwrap();
    let loops = sch.get_loops(block).unwrap();
    let outer = sch.blockize(Target::Loop(loops[1])).unwrap();
    sch.blockize(Target::Block(outer)).unwrap();

    let mut replayed = schedule(func);
    sch.trace().apply_to(&mut replayed).unwrap();

    assert_eq!(replayed.mod_().to_string(), sch.mod_().to_string());
    assert_eq!(replayed.trace().len(), sch.trace().len());
    assert!(matches!(replayed.trace().instructions()[3], Instruction::Blockize { target: Target::Block(_), .. }));
}
