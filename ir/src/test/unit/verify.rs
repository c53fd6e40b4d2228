use crate::buffer::{Buffer, BufferRegion, Range};
use crate::error::Error;
use crate::expr::{PrimExpr, Var};
use crate::func::PrimFunc;
use crate::stmt::{Block, BlockRealize, For, IterVar, Stmt};
use crate::verify::{verify_stmt, verify_well_formed};
use tessera_dtype::DType;

fn block_with(writes: Vec<BufferRegion>, a: &Buffer, vi: &Var) -> Block {
    Block::builder()
        .name("B")
        .iter_vars(vec![IterVar::spatial(vi, 8)])
        .writes(writes)
        .body(Stmt::store(a, PrimExpr::float(0.0, DType::Float32), [vi.to_expr(), vi.to_expr()]))
        .build()
}

#[test]
fn test_well_formed() {
    let (i, vi) = (Var::index("i"), Var::index("vi"));
    let a = Buffer::new("A", DType::Float32, [PrimExpr::int(8), PrimExpr::int(8)]);
    let block = block_with(vec![BufferRegion::from_point(&a, [vi.to_expr(), vi.to_expr()])], &a, &vi);
    let body = For::serial(&i, 8, Stmt::from(BlockRealize::unconditional(vec![i.to_expr()], block)));
    assert_eq!(verify_well_formed(&PrimFunc::new("diag", [a], body)), Ok(()));
}

#[test]
fn test_region_rank() {
    let vi = Var::index("vi");
    let a = Buffer::new("A", DType::Float32, [PrimExpr::int(8), PrimExpr::int(8)]);
    let block = block_with(vec![BufferRegion::new(a.clone(), [Range::point(vi.to_expr())])], &a, &vi);
    let stmt = Stmt::from(BlockRealize::unconditional(vec![PrimExpr::int(0)], block));
    assert_eq!(verify_stmt(&stmt), Err(Error::RegionRank { buffer: "A".into(), expected: 2, actual: 1 }));
}

#[test]
fn test_iter_value_count() {
    let vi = Var::index("vi");
    let a = Buffer::new("A", DType::Float32, [PrimExpr::int(8), PrimExpr::int(8)]);
    let block = block_with(Vec::new(), &a, &vi);
    let stmt = Stmt::from(BlockRealize::unconditional(Vec::new(), block));
    assert_eq!(
        verify_stmt(&stmt),
        Err(Error::IterValueCountMismatch { block: "B".into(), expected: 1, actual: 0 })
    );
}
