//! Program builders shared by the schedule tests.
//!
//! Every builder returns a fresh [`PrimFunc`]; variables and buffers are
//! created per call, so two programs never share identities.

use std::sync::Arc;

use tessera_ir::prelude::*;
use tessera_ir::{AnnotationValue, Annotations};

use crate::{Schedule, ScheduleConfig, ScheduleState, TensorIntrin};

/// Verification on, trace on, unit iterators preserved.
pub fn config() -> ScheduleConfig {
    ScheduleConfig::builder().verify(true).build()
}

pub fn schedule(func: PrimFunc) -> Schedule {
    Schedule::with_config(func, config()).expect("well-formed program")
}

pub fn state(func: PrimFunc) -> ScheduleState {
    ScheduleState::new(func, &config()).expect("well-formed program")
}

pub fn f32_buffer(name: &str, shape: &[i64]) -> Buffer {
    Buffer::new(name, DType::Float32, shape.iter().map(|&d| PrimExpr::int(d)))
}

/// Serial loops around `body`, outermost first.
pub fn loop_nest(loops: &[(&Var, i64)], body: Stmt) -> Stmt {
    loops.iter().rev().fold(body, |body, (var, extent)| For::serial(var, *extent, body))
}

pub fn realize(values: Vec<PrimExpr>, block: Block) -> Stmt {
    Stmt::from(BlockRealize::unconditional(values, block))
}

fn vars(names: &[&str]) -> Vec<Var> {
    names.iter().map(|n| Var::index(*n)).collect()
}

/// Spatial block `name` storing zero to `buffer[v0, v1, ..]`, one iteration
/// variable per dimension.
pub fn store_block(name: &str, buffer: &Buffer, iter_names: &[&str]) -> Block {
    let ivs = vars(iter_names);
    let indices: Vec<PrimExpr> = ivs.iter().map(Var::to_expr).collect();
    Block::builder()
        .name(name)
        .iter_vars(ivs.iter().zip(buffer.shape()).map(|(v, extent)| IterVar::spatial(v, extent)).collect())
        .writes(vec![BufferRegion::from_point(buffer, indices.clone())])
        .body(Stmt::store(buffer, PrimExpr::float(0.0, DType::Float32), indices))
        .build()
}

/// `A[vi, vj] = 0` under loops `i(n)`, `j(m)`.
pub fn elementwise(n: i64, m: i64) -> PrimFunc {
    let a = f32_buffer("A", &[n, m]);
    let (i, j) = (Var::index("i"), Var::index("j"));
    let block = store_block("compute", &a, &["vi", "vj"]);
    let body = loop_nest(&[(&i, n), (&j, m)], realize(vec![i.to_expr(), j.to_expr()], block));
    PrimFunc::new("elementwise", [a], body)
}

/// `C[vi, vj] += A[vi, vk] * B[vk, vj]` over an `extent³` domain, with
/// `vk` a reduction.
pub fn matmul_block(a: &Buffer, b: &Buffer, c: &Buffer, extent: i64, with_init: bool) -> Block {
    let (vi, vj, vk) = (Var::index("vi"), Var::index("vj"), Var::index("vk"));
    let (ei, ej, ek) = (vi.to_expr(), vj.to_expr(), vk.to_expr());
    let value = PrimExpr::load(c, [ei.clone(), ej.clone()])
        + PrimExpr::load(a, [ei.clone(), ek.clone()]) * PrimExpr::load(b, [ek.clone(), ej.clone()]);
    let init = Stmt::store(c, PrimExpr::float(0.0, DType::Float32), [ei.clone(), ej.clone()]);
    Block::builder()
        .name("update")
        .iter_vars(vec![IterVar::spatial(&vi, extent), IterVar::spatial(&vj, extent), IterVar::reduce(&vk, extent)])
        .reads(vec![
            BufferRegion::from_point(c, [ei.clone(), ej.clone()]),
            BufferRegion::from_point(a, [ei.clone(), ek.clone()]),
            BufferRegion::from_point(b, [ek.clone(), ej.clone()]),
        ])
        .writes(vec![BufferRegion::from_point(c, [ei.clone(), ej.clone()])])
        .maybe_init(with_init.then_some(init))
        .body(Stmt::store(c, value, [ei, ej]))
        .build()
}

/// Matmul loop nest `i, j, k` over `n³` around [`matmul_block`].
pub fn matmul_nest(a: &Buffer, b: &Buffer, c: &Buffer, n: i64, with_init: bool) -> Stmt {
    let (i, j, k) = (Var::index("i"), Var::index("j"), Var::index("k"));
    let block = matmul_block(a, b, c, n, with_init);
    loop_nest(&[(&i, n), (&j, n), (&k, n)], realize(vec![i.to_expr(), j.to_expr(), k.to_expr()], block))
}

/// `n × n × n` matmul over buffers `A`, `B`, `C`.
pub fn matmul(n: i64, with_init: bool) -> PrimFunc {
    let (a, b, c) = (f32_buffer("A", &[n, n]), f32_buffer("B", &[n, n]), f32_buffer("C", &[n, n]));
    let body = matmul_nest(&a, &b, &c, n, with_init);
    PrimFunc::new("matmul", [a, b, c], body)
}

/// Matmul over `(tiles·n)³` split into loops `i0, j0, k0` of extent
/// `tiles` and `i1, j1, k1` of extent `n`.
pub fn tiled_matmul(tiles: i64, n: i64) -> PrimFunc {
    let size = tiles * n;
    let (a, b, c) = (f32_buffer("A", &[size, size]), f32_buffer("B", &[size, size]), f32_buffer("C", &[size, size]));
    let outer = vars(&["i0", "j0", "k0"]);
    let inner = vars(&["i1", "j1", "k1"]);
    let values = outer.iter().zip(&inner).map(|(o, i)| o * n + i).collect();
    let block = matmul_block(&a, &b, &c, size, false);
    let loops: Vec<(&Var, i64)> =
        outer.iter().map(|v| (v, tiles)).chain(inner.iter().map(|v| (v, n))).collect();
    PrimFunc::new("tiled_matmul", [a, b, c], loop_nest(&loops, realize(values, block)))
}

/// Register an `n × n × n` matmul intrinsic under `name`. The
/// implementation body is an opaque evaluate carrying `annotations`.
pub fn register_matmul_intrin(name: &str, n: i64, annotations: Annotations) {
    let desc_buffers = [f32_buffer("A_d", &[n, n]), f32_buffer("B_d", &[n, n]), f32_buffer("C_d", &[n, n])];
    let [a, b, c] = &desc_buffers;
    let desc_root = Block::builder()
        .name("root")
        .reads(vec![BufferRegion::full(c), BufferRegion::full(a), BufferRegion::full(b)])
        .writes(vec![BufferRegion::full(c)])
        .body(matmul_nest(a, b, c, n, false))
        .build();
    let desc = PrimFunc::with_root(format!("{name}_desc"), desc_buffers.clone(), Arc::new(desc_root));

    let impl_buffers = [f32_buffer("A_i", &[n, n]), f32_buffer("B_i", &[n, n]), f32_buffer("C_i", &[n, n])];
    let [a, b, c] = &impl_buffers;
    let impl_root = Block::builder()
        .name("root")
        .reads(vec![BufferRegion::full(c), BufferRegion::full(a), BufferRegion::full(b)])
        .writes(vec![BufferRegion::full(c)])
        .body(Stmt::Evaluate(PrimExpr::int(0)))
        .annotations(annotations)
        .build();
    let implementation = PrimFunc::with_root(format!("{name}_impl"), impl_buffers.clone(), Arc::new(impl_root));

    TensorIntrin::register(name, desc, implementation, true).expect("matching parameter counts");
}

pub fn annotation(key: &str, value: AnnotationValue) -> Annotations {
    Annotations::from([(key.to_string(), value)])
}
