//! Human-readable rendering of expressions and statement trees.

use std::fmt::{self, Display, Formatter, Write};

use crate::buffer::{BufferRegion, Range};
use crate::expr::{BinaryOp, CmpOp, ExprKind, PrimExpr};
use crate::func::PrimFunc;
use crate::stmt::{Block, ForKind, Stmt};

fn precedence(expr: &PrimExpr) -> u8 {
    match expr.kind() {
        ExprKind::Or(..) => 1,
        ExprKind::And(..) => 2,
        ExprKind::Not(_) => 3,
        ExprKind::Cmp(..) => 4,
        ExprKind::Binary(BinaryOp::Add | BinaryOp::Sub, ..) => 5,
        ExprKind::Binary(BinaryOp::Mul | BinaryOp::FloorDiv | BinaryOp::FloorMod, ..) => 6,
        _ => 7,
    }
}

fn write_operand(f: &mut Formatter<'_>, expr: &PrimExpr, min_prec: u8) -> fmt::Result {
    if precedence(expr) < min_prec { write!(f, "({expr})") } else { write!(f, "{expr}") }
}

fn binary_symbol(op: BinaryOp) -> Option<&'static str> {
    match op {
        BinaryOp::Add => Some("+"),
        BinaryOp::Sub => Some("-"),
        BinaryOp::Mul => Some("*"),
        BinaryOp::FloorDiv => Some("//"),
        BinaryOp::FloorMod => Some("%"),
        BinaryOp::Min | BinaryOp::Max => None,
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

impl Display for PrimExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let prec = precedence(self);
        match self.kind() {
            ExprKind::Int(v) => write!(f, "{v}"),
            ExprKind::Float(v) => write!(f, "{:?}", v.0),
            ExprKind::Bool(v) => f.write_str(if *v { "True" } else { "False" }),
            ExprKind::Var(v) => write!(f, "{v}"),
            ExprKind::Binary(op, a, b) => match binary_symbol(*op) {
                Some(sym) => {
                    write_operand(f, a, prec)?;
                    write!(f, " {sym} ")?;
                    let rhs_prec = if matches!(op, BinaryOp::Add | BinaryOp::Mul) { prec } else { prec + 1 };
                    write_operand(f, b, rhs_prec)
                }
                None => write!(f, "T.{}({a}, {b})", op.as_ref().to_lowercase()),
            },
            ExprKind::Cmp(op, a, b) => {
                write_operand(f, a, prec + 1)?;
                write!(f, " {} ", cmp_symbol(*op))?;
                write_operand(f, b, prec + 1)
            }
            ExprKind::And(a, b) => {
                write_operand(f, a, prec)?;
                f.write_str(" and ")?;
                write_operand(f, b, prec + 1)
            }
            ExprKind::Or(a, b) => {
                write_operand(f, a, prec)?;
                f.write_str(" or ")?;
                write_operand(f, b, prec + 1)
            }
            ExprKind::Not(a) => {
                f.write_str("not ")?;
                write_operand(f, a, prec)
            }
            ExprKind::Select { cond, then_value, else_value } => {
                write!(f, "T.Select({cond}, {then_value}, {else_value})")
            }
            ExprKind::Cast(a) => write!(f, "T.Cast(\"{}\", {a})", self.dtype()),
            ExprKind::Load { buffer, indices } => {
                write!(f, "{buffer}[")?;
                write_joined(f, indices.iter())?;
                f.write_char(']')
            }
        }
    }
}

fn write_joined<T: Display>(f: &mut Formatter<'_>, items: impl Iterator<Item = T>) -> fmt::Result {
    for (k, item) in items.enumerate() {
        if k > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.extent.is_one() {
            return write!(f, "{}", self.min);
        }
        let end = &self.min + self.extent.clone();
        match (self.min.as_int(), self.extent.as_int()) {
            (Some(lo), Some(ext)) => write!(f, "{lo}:{}", lo + ext),
            (Some(0), None) => write!(f, "0:{}", self.extent),
            _ => write!(f, "{}:{end}", self.min),
        }
    }
}

impl Display for BufferRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.buffer)?;
        write_joined(f, self.region.iter())?;
        f.write_char(']')
    }
}

fn pad(f: &mut Formatter<'_>, level: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = level * 4)
}

fn write_block_header(f: &mut Formatter<'_>, block: &Block, values: &[PrimExpr], level: usize) -> fmt::Result {
    pad(f, level)?;
    writeln!(f, "with T.block(\"{}\"):", block.name)?;
    for (iv, value) in block.iter_vars.iter().zip(values) {
        pad(f, level + 1)?;
        writeln!(f, "{} = T.axis.{}({}, {value})", iv.var, iv.iter_type, iv.dom.extent)?;
    }
    if !block.reads.is_empty() || !block.writes.is_empty() {
        pad(f, level + 1)?;
        f.write_str("T.reads(")?;
        write_joined(f, block.reads.iter())?;
        f.write_str(")\n")?;
        pad(f, level + 1)?;
        f.write_str("T.writes(")?;
        write_joined(f, block.writes.iter())?;
        f.write_str(")\n")?;
    }
    for m in &block.match_buffers {
        pad(f, level + 1)?;
        writeln!(f, "{} = T.match_buffer({})", m.buffer, m.source)?;
    }
    for (key, value) in &block.annotations {
        pad(f, level + 1)?;
        writeln!(f, "T.block_attr({{{key:?}: {value}}})")?;
    }
    Ok(())
}

fn write_stmt(f: &mut Formatter<'_>, stmt: &Stmt, level: usize) -> fmt::Result {
    match stmt {
        Stmt::For(op) => {
            pad(f, level)?;
            let kind = match &op.kind {
                ForKind::Serial => "serial".to_string(),
                other => other.to_string(),
            };
            if op.min.is_zero() {
                writeln!(f, "for {} in T.{kind}({}):", op.loop_var, op.extent)?;
            } else {
                writeln!(f, "for {} in T.{kind}({}, {}):", op.loop_var, op.min, &op.min + op.extent.clone())?;
            }
            write_stmt(f, &op.body, level + 1)
        }
        Stmt::BlockRealize(op) => {
            write_block_header(f, &op.block, &op.iter_values, level)?;
            if !op.predicate.is_const_true() {
                pad(f, level + 1)?;
                writeln!(f, "T.where({})", op.predicate)?;
            }
            for buffer in &op.block.alloc_buffers {
                pad(f, level + 1)?;
                writeln!(f, "{buffer} = T.alloc_buffer({:?}, \"{}\")", buffer.shape().iter().map(|e| e.to_string()).collect::<Vec<_>>(), buffer.dtype())?;
            }
            if let Some(init) = &op.block.init {
                pad(f, level + 1)?;
                f.write_str("with T.init():\n")?;
                write_stmt(f, init, level + 2)?;
            }
            write_stmt(f, &op.block.body, level + 1)
        }
        Stmt::Seq(stmts) => stmts.iter().try_for_each(|s| write_stmt(f, s, level)),
        Stmt::IfThenElse(op) => {
            pad(f, level)?;
            writeln!(f, "if {}:", op.condition)?;
            write_stmt(f, &op.then_case, level + 1)?;
            if let Some(else_case) = &op.else_case {
                pad(f, level)?;
                f.write_str("else:\n")?;
                write_stmt(f, else_case, level + 1)?;
            }
            Ok(())
        }
        Stmt::BufferStore(op) => {
            pad(f, level)?;
            write!(f, "{}[", op.buffer)?;
            write_joined(f, op.indices.iter())?;
            writeln!(f, "] = {}", op.value)
        }
        Stmt::Evaluate(expr) => {
            pad(f, level)?;
            writeln!(f, "T.evaluate({expr})")
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl Display for PrimFunc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "@T.prim_func")?;
        write!(f, "def {}(", self.name)?;
        write_joined(
            f,
            self.buffer_map.iter().map(|(_, b)| format!("{}: T.Buffer(({}), \"{}\")", b.name(), b.shape().iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "), b.dtype())),
        )?;
        f.write_str("):\n")?;
        write_stmt(f, &self.body, 1)
    }
}
