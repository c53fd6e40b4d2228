use crate::expr::{PrimExpr, Var};
use crate::stmt::{AnnotationValue, Block, For, ForKind, IterVar, IterVarType, Stmt};
use tessera_dtype::DType;

fn eval(v: i64) -> Stmt {
    Stmt::Evaluate(PrimExpr::int(v))
}

#[test]
fn test_seq_flattens_nested() {
    let inner = Stmt::seq([eval(1), eval(2)]);
    let outer = Stmt::seq([eval(0), inner, eval(3)]);
    assert_eq!(outer.as_seq().map(<[Stmt]>::len), Some(4));
}

#[test]
fn test_seq_unwraps_single() {
    let single = Stmt::seq([eval(7)]);
    assert!(matches!(single, Stmt::Evaluate(ref e) if e.as_int() == Some(7)));
}

#[test]
fn test_to_fresh_renews_identity() {
    let i = Var::index("i");
    let lp = For::builder().loop_var(i.clone()).extent(PrimExpr::int(4)).body(eval(0)).build();
    let copy = lp.to_fresh();
    assert_ne!(lp.id(), copy.id());
    assert_eq!(copy.loop_var, i);

    let block = Block::builder().name("B").body(eval(0)).build();
    assert_ne!(block.id(), block.to_fresh().id());
}

#[test]
fn test_builder_defaults() {
    let i = Var::new("i", DType::Int64);
    let lp = For::builder().loop_var(i).extent(PrimExpr::const_int(4, DType::Int64)).body(eval(0)).build();
    assert_eq!(lp.kind, ForKind::Serial);
    assert_eq!(lp.min, PrimExpr::const_int(0, DType::Int64));
    assert!(lp.annotations.is_empty());

    let block = Block::builder().name("B").body(eval(0)).build();
    assert!(block.iter_vars.is_empty() && block.reads.is_empty() && block.init.is_none());
}

#[test]
fn test_has_reduction() {
    let (vi, vk) = (Var::index("vi"), Var::index("vk"));
    let spatial = Block::builder().name("S").iter_vars(vec![IterVar::spatial(&vi, 4)]).body(eval(0)).build();
    let reduce = Block::builder()
        .name("R")
        .iter_vars(vec![IterVar::spatial(&vi, 4), IterVar::reduce(&vk, 4)])
        .body(eval(0))
        .build();
    assert!(!spatial.has_reduction());
    assert!(reduce.has_reduction());
    assert_eq!(reduce.iter_vars[1].iter_type, IterVarType::CommReduce);
}

#[test]
fn test_annotation_display() {
    assert_eq!(AnnotationValue::Str("mma".into()).to_string(), "\"mma\"");
    assert_eq!(AnnotationValue::Int(4).to_string(), "4");
}
