//! Schedule state: the program under transformation plus an index of its
//! loops and blocks.
//!
//! Handles are [`NodeId`]s. A replacement forwards the ids of rebuilt nodes to
//! their successors, so a handle taken before a transformation keeps pointing
//! at the corresponding node afterwards. Handles of nodes that were removed
//! become stale.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt, ensure};
use tessera_ir::arith::{Analyzer, IterMapLevel, detect_iter_map};
use tessera_ir::mutate::{super_mutate_block, super_mutate_for, super_mutate_stmt};
use tessera_ir::verify::verify_well_formed;
use tessera_ir::visit::pre_order_visit;
use tessera_ir::{Block, BlockRealize, ExprMutator, For, NodeId, PrimExpr, PrimFunc, Range, Stmt, StmtMutator, Var};
use tracing::debug;

use crate::config::ScheduleConfig;
use crate::error::*;

/// Node a handle refers to.
#[derive(Debug, Clone)]
pub enum SRefNode {
    Loop(Arc<For>),
    Block(Arc<BlockRealize>),
}

impl SRefNode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Loop(_) => "loop",
            Self::Block(_) => "block",
        }
    }

    pub fn to_stmt(&self) -> Stmt {
        match self {
            Self::Loop(op) => Stmt::For(op.clone()),
            Self::Block(op) => Stmt::BlockRealize(op.clone()),
        }
    }
}

/// Position of a loop or block in the program tree.
#[derive(Debug, Clone)]
pub struct StmtSRef {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub node: SRefNode,
}

/// Per-block facts maintained by the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockInfo {
    /// The bindings are an affine map of the loops between the block and its scope root.
    pub affine_binding: bool,
    /// Blocks directly below this one.
    pub child_blocks: Vec<NodeId>,
}

/// Old → new block identities produced by a transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReuse(Vec<(NodeId, NodeId)>);

impl BlockReuse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `new` takes over from `old`. A later entry for the same
    /// `old` replaces the earlier one.
    pub fn insert(&mut self, old: NodeId, new: NodeId) {
        match self.0.iter_mut().find(|(o, _)| *o == old) {
            Some(entry) => entry.1 = new,
            None => self.0.push((old, new)),
        }
    }

    pub fn get(&self, old: NodeId) -> Option<NodeId> {
        self.0.iter().find_map(|(o, n)| (*o == old).then_some(*n))
    }

    pub fn pairs(&self) -> &[(NodeId, NodeId)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleState {
    func: PrimFunc,
    srefs: HashMap<NodeId, StmtSRef>,
    forward: HashMap<NodeId, NodeId>,
    block_info: HashMap<NodeId, BlockInfo>,
    verify: bool,
}

impl ScheduleState {
    pub fn new(func: PrimFunc, config: &ScheduleConfig) -> Result<Self> {
        let root = func.root_block().context(IrSnafu)?.id();
        if config.verify {
            verify_well_formed(&func).context(IrSnafu)?;
        }
        let srefs = build_index(&func.body);
        let mut state = Self { func, srefs, forward: HashMap::new(), block_info: HashMap::new(), verify: config.verify };
        state.refresh_scope_info(root)?;
        Ok(state)
    }

    pub fn func(&self) -> &PrimFunc {
        &self.func
    }

    pub fn root(&self) -> Result<NodeId> {
        Ok(self.func.root_block().context(IrSnafu)?.id())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Live id for `id`, following forwarding entries left by replacements.
    pub fn resolve(&self, id: NodeId) -> Result<NodeId> {
        let mut current = id;
        while !self.srefs.contains_key(&current) {
            current = *self.forward.get(&current).context(StaleSRefSnafu { node: id })?;
        }
        Ok(current)
    }

    pub fn get_sref(&self, id: NodeId) -> Result<&StmtSRef> {
        let id = self.resolve(id)?;
        self.srefs.get(&id).context(StaleSRefSnafu { node: id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.resolve(id).is_ok()
    }

    pub fn get_for(&self, id: NodeId) -> Result<Arc<For>> {
        let sref = self.get_sref(id)?;
        match &sref.node {
            SRefNode::Loop(op) => Ok(op.clone()),
            other => WrongTargetKindSnafu { op: "loop lookup", node: sref.id, expected: "loop", found: other.kind() }.fail(),
        }
    }

    pub fn get_block_realize(&self, id: NodeId) -> Result<Arc<BlockRealize>> {
        let sref = self.get_sref(id)?;
        match &sref.node {
            SRefNode::Block(op) => Ok(op.clone()),
            other => {
                WrongTargetKindSnafu { op: "block lookup", node: sref.id, expected: "block", found: other.kind() }.fail()
            }
        }
    }

    pub fn get_block(&self, id: NodeId) -> Result<Arc<Block>> {
        Ok(self.get_block_realize(id)?.block.clone())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get_sref(id)?.parent)
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut current = self.parent(id)?;
        while let Some(node) = current {
            result.push(node);
            current = self.parent(node)?;
        }
        Ok(result)
    }

    /// Deepest node that is `ids[k]` or an ancestor of it for every `k`.
    pub fn lowest_common_ancestor(&self, ids: &[NodeId]) -> Result<NodeId> {
        let mut paths = Vec::with_capacity(ids.len());
        for &id in ids {
            let mut path = self.ancestors(id)?;
            path.reverse();
            path.push(self.resolve(id)?);
            paths.push(path);
        }
        let Some((first, rest)) = paths.split_first() else {
            return self.root();
        };
        let mut lca = self.root()?;
        for (depth, node) in first.iter().enumerate() {
            if rest.iter().all(|p| p.get(depth) == Some(node)) {
                lca = *node;
            } else {
                break;
            }
        }
        Ok(lca)
    }

    /// Nearest block strictly above `id`; the root block is its own scope root.
    pub fn get_scope_root(&self, id: NodeId) -> Result<NodeId> {
        for ancestor in self.ancestors(id)? {
            if matches!(self.get_sref(ancestor)?.node, SRefNode::Block(_)) {
                return Ok(ancestor);
            }
        }
        self.resolve(id)
    }

    /// Loops between `id` and its scope root, outermost first.
    pub fn get_loops(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut loops = Vec::new();
        for ancestor in self.ancestors(id)? {
            match self.get_sref(ancestor)?.node {
                SRefNode::Loop(_) => loops.push(ancestor),
                SRefNode::Block(_) => break,
            }
        }
        loops.reverse();
        Ok(loops)
    }

    /// Blocks below `id` that are not nested in another block below `id`.
    pub fn child_blocks(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let body = match &self.get_sref(id)?.node {
            SRefNode::Loop(op) => op.body.clone(),
            SRefNode::Block(op) => op.block.body.clone(),
        };
        let mut children = Vec::new();
        pre_order_visit(&body, &mut |s| match s {
            Stmt::BlockRealize(r) => {
                children.push(r.block.id());
                false
            }
            _ => true,
        });
        Ok(children)
    }

    /// Blocks named `name`, in program order.
    pub fn find_blocks(&self, name: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        pre_order_visit(&self.func.body, &mut |s| {
            if let Stmt::BlockRealize(r) = s
                && r.block.name == name
            {
                found.push(r.block.id());
            }
            true
        });
        found
    }

    // ------------------------------------------------------------------
    // Block info
    // ------------------------------------------------------------------

    pub fn block_info(&self, id: NodeId) -> Result<&BlockInfo> {
        let id = self.resolve(id)?;
        self.block_info.get(&id).context(StaleSRefSnafu { node: id })
    }

    pub fn is_affine_block_binding(&self, id: NodeId) -> Result<bool> {
        Ok(self.block_info(id)?.affine_binding)
    }

    pub fn set_affine_block_binding(&mut self, id: NodeId, affine: bool) -> Result<()> {
        let id = self.resolve(id)?;
        self.block_info.entry(id).or_default().affine_binding = affine;
        Ok(())
    }

    /// Recompute the info of `scope` and of every block below it.
    pub fn refresh_scope_info(&mut self, scope: NodeId) -> Result<()> {
        let scope = self.resolve(scope)?;
        let root = self.root()?;
        let body = self.get_sref(scope)?.node.to_stmt();
        let mut blocks = Vec::new();
        pre_order_visit(&body, &mut |s| {
            if let Stmt::BlockRealize(r) = s {
                blocks.push(r.block.id());
            }
            true
        });
        for &block in &blocks {
            let affine_binding = block == root || self.compute_affine_binding(block)?;
            let child_blocks = self.child_blocks(block)?;
            self.block_info.insert(block, BlockInfo { affine_binding, child_blocks });
        }
        debug!(scope = %scope, blocks = blocks.len(), "refreshed scope info");
        Ok(())
    }

    fn compute_affine_binding(&self, id: NodeId) -> Result<bool> {
        let realize = self.get_block_realize(id)?;
        if realize.iter_values.is_empty() {
            return Ok(true);
        }
        let mut dom: Vec<(Var, Range)> = Vec::new();
        for loop_id in self.get_loops(id)? {
            let op = self.get_for(loop_id)?;
            dom.push((op.loop_var.clone(), Range::from_min_extent(op.min.clone(), op.extent.clone())));
        }
        let mut analyzer = Analyzer::new();
        for (var, range) in &dom {
            analyzer.bind(var, range);
        }
        let detected = detect_iter_map(
            &realize.iter_values,
            &dom,
            &realize.predicate,
            IterMapLevel::Surjective,
            &analyzer,
            false,
        );
        Ok(detected.is_some())
    }

    // ------------------------------------------------------------------
    // Replacement
    // ------------------------------------------------------------------

    /// Replace the loop or block `src` by `tgt`.
    ///
    /// Every ancestor of `src` is rebuilt. Afterwards the following ids
    /// forward to their successors: the rebuilt ancestors, `src` itself when
    /// `tgt` is a node of the same kind, the pairs of `reuse`, and loops of
    /// the removed subtree whose loop variable is still bound by a loop of
    /// `tgt`. Nothing changes when an error is returned.
    #[tracing::instrument(skip_all, fields(src = %src, reuse = reuse.len()))]
    pub fn replace(&mut self, src: NodeId, tgt: Stmt, reuse: &BlockReuse) -> Result<()> {
        let src = self.resolve(src)?;
        let old = self.get_sref(src)?.node.to_stmt();

        let mut replacer = SubtreeReplacer { src, tgt: tgt.clone(), copies: Vec::new(), found: false };
        let body = replacer.mutate_stmt(&self.func.body);
        ensure!(replacer.found, StaleSRefSnafu { node: src });
        let func = self.func.with_body(body);
        if self.verify {
            verify_well_formed(&func).context(IrSnafu)?;
        }
        let srefs = build_index(&func.body);

        let mut pairs = replacer.copies;
        if let Some(new_id) = tgt.node_id()
            && same_kind(&old, &tgt)
        {
            pairs.push((src, new_id));
        }
        pairs.extend(reuse.pairs().iter().copied());
        pairs.extend(surviving_loops(&old, &tgt));

        let mut successor_of = HashMap::new();
        for (old_id, new_id) in pairs {
            if old_id != new_id && !srefs.contains_key(&old_id) && srefs.contains_key(&new_id) {
                self.forward.insert(old_id, new_id);
                successor_of.insert(new_id, old_id);
            }
        }

        self.func = func;
        self.srefs = srefs;

        let old_info = std::mem::take(&mut self.block_info);
        let blocks: Vec<NodeId> =
            self.srefs.values().filter(|s| matches!(s.node, SRefNode::Block(_))).map(|s| s.id).collect();
        for id in blocks {
            let inherited = old_info.get(&id).or_else(|| successor_of.get(&id).and_then(|old| old_info.get(old)));
            let info = match inherited {
                Some(info) => BlockInfo {
                    affine_binding: info.affine_binding,
                    child_blocks: info.child_blocks.iter().filter_map(|c| self.resolve(*c).ok()).collect(),
                },
                None => BlockInfo { affine_binding: true, child_blocks: self.child_blocks(id)? },
            };
            self.block_info.insert(id, info);
        }
        debug!(forwarded = successor_of.len(), nodes = self.srefs.len(), "replaced subtree");
        Ok(())
    }
}

fn same_kind(a: &Stmt, b: &Stmt) -> bool {
    matches!((a, b), (Stmt::For(_), Stmt::For(_)) | (Stmt::BlockRealize(_), Stmt::BlockRealize(_)))
}

fn loops_by_var(stmt: &Stmt) -> HashMap<Var, NodeId> {
    let mut loops = HashMap::new();
    pre_order_visit(stmt, &mut |s| {
        if let Stmt::For(op) = s {
            loops.entry(op.loop_var.clone()).or_insert(op.id());
        }
        true
    });
    loops
}

fn surviving_loops(old: &Stmt, new: &Stmt) -> Vec<(NodeId, NodeId)> {
    let new_loops = loops_by_var(new);
    loops_by_var(old).into_iter().filter_map(|(var, old_id)| new_loops.get(&var).map(|new_id| (old_id, *new_id))).collect()
}

fn build_index(body: &Stmt) -> HashMap<NodeId, StmtSRef> {
    let mut srefs = HashMap::new();
    index_stmt(body, None, &mut srefs);
    srefs
}

fn index_stmt(stmt: &Stmt, parent: Option<NodeId>, srefs: &mut HashMap<NodeId, StmtSRef>) {
    match stmt {
        Stmt::For(op) => {
            srefs.insert(op.id(), StmtSRef { id: op.id(), parent, node: SRefNode::Loop(op.clone()) });
            index_stmt(&op.body, Some(op.id()), srefs);
        }
        Stmt::BlockRealize(op) => {
            let id = op.block.id();
            srefs.insert(id, StmtSRef { id, parent, node: SRefNode::Block(op.clone()) });
            if let Some(init) = &op.block.init {
                index_stmt(init, Some(id), srefs);
            }
            index_stmt(&op.block.body, Some(id), srefs);
        }
        Stmt::Seq(stmts) => stmts.iter().for_each(|s| index_stmt(s, parent, srefs)),
        Stmt::IfThenElse(op) => {
            index_stmt(&op.then_case, parent, srefs);
            if let Some(else_case) = &op.else_case {
                index_stmt(else_case, parent, srefs);
            }
        }
        Stmt::BufferStore(_) | Stmt::Evaluate(_) => {}
    }
}

/// Swaps one node for a new subtree and rebuilds the path above it.
struct SubtreeReplacer {
    src: NodeId,
    tgt: Stmt,
    copies: Vec<(NodeId, NodeId)>,
    found: bool,
}

impl ExprMutator for SubtreeReplacer {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        expr.clone()
    }
}

impl StmtMutator for SubtreeReplacer {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        if self.found {
            return stmt.clone();
        }
        if stmt.node_id() == Some(self.src) {
            self.found = true;
            return self.tgt.clone();
        }
        super_mutate_stmt(self, stmt)
    }

    fn mutate_for(&mut self, op: &Arc<For>) -> Stmt {
        let new = super_mutate_for(self, op);
        if let Some(id) = new.node_id()
            && id != op.id()
        {
            self.copies.push((op.id(), id));
        }
        new
    }

    fn mutate_block(&mut self, op: &Arc<Block>) -> Arc<Block> {
        let new = super_mutate_block(self, op);
        if !Arc::ptr_eq(&new, op) {
            self.copies.push((op.id(), new.id()));
        }
        new
    }
}
