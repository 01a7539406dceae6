//! The mutable control-flow graph.
//!
//! A [`Function`] owns two arenas: blocks and instructions. Handles into both
//! are stable for the lifetime of the function. Every block keeps a
//! predecessor side table with one entry per incoming edge, so a block
//! reached twice from the same `switch` lists that predecessor twice.
//!
//! All terminator edits go through [`Function::set_terminator`], the single
//! choke point that keeps three things in sync with the new successor list:
//!
//! 1. the successors' predecessor tables;
//! 2. the successors' PHI nodes (entries for a predecessor that lost its last
//!    edge are pruned; new edges must be given values by the caller, see
//!    [`Function::add_phi_incoming_like`]);
//! 3. the edge log, from which [`Function::take_dom_updates`] derives the
//!    dominator update batch for the current rule firing.

use super::types::*;
use crate::oracle::dom::{DomUpdate, UpdateKind};
use std::collections::BTreeMap;

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub(crate) insts: Vec<InstId>,
    pub(crate) term: Terminator,
    pub(crate) preds: Vec<BlockId>,
}

/// Where a value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum User {
    Inst(InstId),
    Term(BlockId),
}

/// A function in SSA form.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub ret_ty: Type,
    pub tables: Vec<ConstTable>,
    blocks: Vec<Option<Block>>,
    layout: Vec<BlockId>,
    insts: Vec<InstData>,
    /// Edge existence as first observed since the last flush.
    edge_log: BTreeMap<(BlockId, BlockId), bool>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<(String, Type)>, ret_ty: Type) -> Self {
        Function {
            name: name.into(),
            params,
            ret_ty,
            tables: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            insts: Vec::new(),
            edge_log: BTreeMap::new(),
        }
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    /// The entry block: always the first block ever added.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Appends a new block ending in `unreachable` to the layout.
    pub fn add_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let name = self.unique_block_name(name);
        self.blocks.push(Some(Block {
            name,
            insts: Vec::new(),
            term: Terminator::Unreachable,
            preds: Vec::new(),
        }));
        self.layout.push(id);
        id
    }

    /// Adds a new block placed right after `after` in the layout.
    pub fn add_block_after(&mut self, after: BlockId, name: &str) -> BlockId {
        let id = self.add_block(name);
        self.layout.pop();
        let pos = self
            .layout
            .iter()
            .position(|&b| b == after)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(pos, id);
        id
    }

    fn unique_block_name(&self, base: &str) -> String {
        let base = if base.is_empty() { "bb" } else { base };
        let taken = |n: &str| self.live_blocks().any(|b| b.name == n);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{base}{i}"))
            .find(|n| !taken(n))
            .unwrap_or_else(|| base.to_string())
    }

    fn live_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().flatten()
    }

    /// Live blocks in layout order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block_count(&self) -> usize {
        self.layout.len()
    }

    pub fn is_live(&self, b: BlockId) -> bool {
        matches!(self.blocks.get(b.0 as usize), Some(Some(_)))
    }

    pub fn block(&self, b: BlockId) -> &Block {
        match self.blocks.get(b.0 as usize) {
            Some(Some(block)) => block,
            _ => panic!("{b} is not a live block of @{}", self.name),
        }
    }

    fn block_mut(&mut self, b: BlockId) -> &mut Block {
        match self.blocks.get_mut(b.0 as usize) {
            Some(Some(block)) => block,
            _ => panic!("{b} is not a live block"),
        }
    }

    pub fn block_name(&self, b: BlockId) -> &str {
        &self.block(b).name
    }

    pub fn set_block_name(&mut self, b: BlockId, name: impl Into<String>) {
        self.block_mut(b).name = name.into();
    }

    /// Looks a block up by label.
    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.layout
            .iter()
            .copied()
            .find(|&b| self.block(b).name == name)
    }

    pub fn insts(&self, b: BlockId) -> &[InstId] {
        &self.block(b).insts
    }

    pub fn terminator(&self, b: BlockId) -> &Terminator {
        &self.block(b).term
    }

    /// Deletes a block that has no predecessors left (self-loops excepted).
    ///
    /// Outgoing edges are removed through [`Function::set_terminator`].
    /// Remaining uses of the block's instructions become `undef`, and
    /// remaining `blockaddress` uses become a non-null pointer constant.
    pub fn remove_block(&mut self, b: BlockId) {
        assert_ne!(b, self.entry(), "cannot remove the entry block");
        self.set_terminator(b, Terminator::Unreachable);
        assert!(
            self.block(b).preds.is_empty(),
            "removing {} which still has predecessors {:?}",
            self.block_name(b),
            self.block(b).preds
        );
        let insts = self.block(b).insts.clone();
        for &i in &insts {
            let ty = self.insts[i.0 as usize].ty;
            self.replace_all_uses(Value::Inst(i), Value::Undef(ty));
        }
        for &i in &insts {
            self.insts[i.0 as usize].block = None;
        }
        self.replace_all_uses(
            Value::BlockAddr(b),
            Value::Const(Constant::new(Type::Ptr, 1)),
        );
        self.blocks[b.0 as usize] = None;
        self.layout.retain(|&x| x != b);
    }

    // ── Edges ────────────────────────────────────────────────────────────────

    /// Replaces the terminator of `b`, keeping predecessor tables, PHI
    /// domains and the edge log consistent with the new successor list.
    pub fn set_terminator(&mut self, b: BlockId, term: Terminator) {
        let old_succs = self.block(b).term.successors();
        let new_succs = term.successors();
        for &s in &new_succs {
            assert!(self.is_live(s), "terminator of {b} targets dead block {s}");
        }

        for &s in &old_succs {
            let preds = &mut self.block_mut(s).preds;
            if let Some(pos) = preds.iter().position(|&p| p == b) {
                preds.remove(pos);
            }
        }
        for &s in &new_succs {
            self.block_mut(s).preds.push(b);
        }

        for &s in old_succs.iter().chain(new_succs.iter()) {
            let existed = old_succs.contains(&s);
            self.edge_log.entry((b, s)).or_insert(existed);
        }

        self.block_mut(b).term = term;

        let mut lost: Vec<BlockId> = old_succs
            .into_iter()
            .filter(|s| !new_succs.contains(s))
            .collect();
        lost.dedup();
        for s in lost {
            if self.is_live(s) {
                for phi in self.phis(s) {
                    self.remove_phi_incoming(phi, b);
                }
            }
        }
    }

    /// Edits the terminator of `b` in place through [`Function::set_terminator`].
    pub fn update_terminator<F: FnOnce(&mut Terminator)>(&mut self, b: BlockId, f: F) {
        let mut term = self.block(b).term.clone();
        f(&mut term);
        self.set_terminator(b, term);
    }

    /// Predecessor edges, one entry per edge.
    pub fn preds(&self, b: BlockId) -> &[BlockId] {
        &self.block(b).preds
    }

    /// Distinct predecessors, in first-edge order.
    pub fn unique_preds(&self, b: BlockId) -> Vec<BlockId> {
        dedup_stable(self.preds(b))
    }

    /// The predecessor when exactly one edge enters `b`.
    pub fn single_pred(&self, b: BlockId) -> Option<BlockId> {
        match self.preds(b) {
            [p] => Some(*p),
            _ => None,
        }
    }

    /// The predecessor when every edge into `b` comes from one block.
    pub fn unique_pred(&self, b: BlockId) -> Option<BlockId> {
        let preds = self.preds(b);
        let first = *preds.first()?;
        preds.iter().all(|&p| p == first).then_some(first)
    }

    pub fn succs(&self, b: BlockId) -> Vec<BlockId> {
        self.terminator(b).successors()
    }

    pub fn unique_succs(&self, b: BlockId) -> Vec<BlockId> {
        dedup_stable(&self.succs(b))
    }

    /// The successor when the terminator has exactly one successor slot.
    pub fn single_succ(&self, b: BlockId) -> Option<BlockId> {
        match self.succs(b).as_slice() {
            [s] => Some(*s),
            _ => None,
        }
    }

    /// The successor when every successor slot names the same block.
    pub fn unique_succ(&self, b: BlockId) -> Option<BlockId> {
        let succs = self.succs(b);
        let first = *succs.first()?;
        succs.iter().all(|&s| s == first).then_some(first)
    }

    pub fn has_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.is_live(from) && self.terminator(from).successors().contains(&to)
    }

    /// Whether any live operand takes the address of `b`.
    pub fn address_taken(&self, b: BlockId) -> bool {
        let target = Value::BlockAddr(b);
        let mut found = false;
        for blk in self.layout.iter().map(|&x| self.block(x)) {
            for &i in &blk.insts {
                self.insts[i.0 as usize]
                    .kind
                    .for_each_operand(|v| found |= *v == target);
            }
            blk.term.for_each_operand(|v| found |= *v == target);
        }
        found
    }

    /// Drains the edge log into a dominator update batch, inserts first.
    ///
    /// Each touched edge contributes at most one update: its state when first
    /// touched is compared with its state now.
    pub fn take_dom_updates(&mut self) -> Vec<DomUpdate> {
        let log = std::mem::take(&mut self.edge_log);
        let mut inserts = Vec::new();
        let mut deletes = Vec::new();
        for ((from, to), existed) in log {
            let exists = self.has_edge(from, to);
            match (existed, exists) {
                (false, true) => inserts.push(DomUpdate {
                    kind: UpdateKind::Insert,
                    from,
                    to,
                }),
                (true, false) => deletes.push(DomUpdate {
                    kind: UpdateKind::Delete,
                    from,
                    to,
                }),
                _ => {}
            }
        }
        inserts.extend(deletes);
        inserts
    }

    // ── Instructions ─────────────────────────────────────────────────────────

    pub fn inst(&self, i: InstId) -> &InstData {
        &self.insts[i.0 as usize]
    }

    /// Mutable access to an instruction's payload. PHI incoming lists should
    /// be edited through the dedicated PHI methods instead.
    pub fn inst_mut(&mut self, i: InstId) -> &mut InstData {
        &mut self.insts[i.0 as usize]
    }

    pub fn kind(&self, i: InstId) -> &InstKind {
        &self.insts[i.0 as usize].kind
    }

    /// The block currently holding `i`, if any.
    pub fn inst_block(&self, i: InstId) -> Option<BlockId> {
        self.insts[i.0 as usize].block
    }

    /// Type of an operand.
    pub fn value_type(&self, v: Value) -> Type {
        match v {
            Value::Inst(i) => self.inst(i).ty,
            Value::Arg(n) => self.params[n as usize].1,
            Value::Const(c) => c.ty(),
            Value::Undef(ty) => ty,
            Value::BlockAddr(_) => Type::Ptr,
        }
    }

    fn new_inst(&mut self, kind: InstKind, ty: Type, block: BlockId) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(InstData {
            kind,
            ty,
            name: None,
            block: Some(block),
        });
        id
    }

    /// Appends an instruction right before the terminator of `b`.
    pub fn append_inst(&mut self, b: BlockId, kind: InstKind, ty: Type) -> InstId {
        let id = self.new_inst(kind, ty, b);
        self.block_mut(b).insts.push(id);
        id
    }

    /// Inserts an instruction at position `pos` of `b`.
    pub fn insert_inst(&mut self, b: BlockId, pos: usize, kind: InstKind, ty: Type) -> InstId {
        let id = self.new_inst(kind, ty, b);
        self.block_mut(b).insts.insert(pos, id);
        id
    }

    /// Inserts an instruction immediately before `before`.
    pub fn insert_inst_before(&mut self, before: InstId, kind: InstKind, ty: Type) -> InstId {
        let b = self.attached_block(before);
        let pos = self.position(before);
        self.insert_inst(b, pos, kind, ty)
    }

    /// Adds a PHI after the existing PHIs of `b`.
    pub fn insert_phi(&mut self, b: BlockId, ty: Type, incoming: Vec<(BlockId, Value)>) -> InstId {
        let pos = self.phis(b).len();
        self.insert_inst(b, pos, InstKind::Phi { incoming }, ty)
    }

    pub fn set_inst_name(&mut self, i: InstId, name: impl Into<String>) {
        self.insts[i.0 as usize].name = Some(name.into());
    }

    fn attached_block(&self, i: InstId) -> BlockId {
        match self.insts[i.0 as usize].block {
            Some(b) => b,
            None => panic!("{i} is not attached to a block"),
        }
    }

    /// Index of `i` within its block.
    pub fn position(&self, i: InstId) -> usize {
        let b = self.attached_block(i);
        match self.block(b).insts.iter().position(|&x| x == i) {
            Some(p) => p,
            None => panic!("{i} missing from its block {b}"),
        }
    }

    /// Detaches `i` from its block. Callers rewrite remaining uses first.
    pub fn remove_inst(&mut self, i: InstId) {
        let b = self.attached_block(i);
        self.block_mut(b).insts.retain(|&x| x != i);
        self.insts[i.0 as usize].block = None;
    }

    /// Replaces every use of `i` with `v`, then detaches `i`.
    pub fn replace_inst(&mut self, i: InstId, v: Value) {
        self.replace_all_uses(Value::Inst(i), v);
        self.remove_inst(i);
    }

    /// Moves an attached instruction to position `pos` of `to`.
    pub fn move_inst(&mut self, i: InstId, to: BlockId, pos: usize) {
        self.remove_inst(i);
        self.insts[i.0 as usize].block = Some(to);
        let insts = &mut self.block_mut(to).insts;
        let pos = pos.min(insts.len());
        insts.insert(pos, i);
    }

    /// Moves `i` to just before the terminator of `to`.
    pub fn move_inst_to_end(&mut self, i: InstId, to: BlockId) {
        let len = self.insts(to).len();
        let len = if self.inst_block(i) == Some(to) { len - 1 } else { len };
        self.move_inst(i, to, len);
    }

    pub fn move_inst_before(&mut self, i: InstId, before: InstId) {
        self.remove_inst(i);
        let b = self.attached_block(before);
        let pos = self.position(before);
        self.insts[i.0 as usize].block = Some(b);
        self.block_mut(b).insts.insert(pos, i);
    }

    /// Appends a copy of `i` to `b`. The copy has no users yet.
    pub fn clone_inst_to_end(&mut self, i: InstId, b: BlockId) -> InstId {
        let data = self.inst(i).clone();
        let id = self.append_inst(b, data.kind, data.ty);
        self.insts[id.0 as usize].name = data.name;
        id
    }

    /// Every place that reads `v`.
    pub fn users(&self, v: Value) -> Vec<User> {
        let mut users = Vec::new();
        for &b in &self.layout {
            let blk = self.block(b);
            for &i in &blk.insts {
                let mut hit = false;
                self.insts[i.0 as usize]
                    .kind
                    .for_each_operand(|op| hit |= *op == v);
                if hit {
                    users.push(User::Inst(i));
                }
            }
            let mut hit = false;
            blk.term.for_each_operand(|op| hit |= *op == v);
            if hit {
                users.push(User::Term(b));
            }
        }
        users
    }

    /// Number of operand slots reading `v`.
    pub fn use_count(&self, v: Value) -> usize {
        let mut n = 0;
        for &b in &self.layout {
            let blk = self.block(b);
            for &i in &blk.insts {
                self.insts[i.0 as usize]
                    .kind
                    .for_each_operand(|op| n += (*op == v) as usize);
            }
            blk.term.for_each_operand(|op| n += (*op == v) as usize);
        }
        n
    }

    /// Block in which a user executes.
    pub fn user_block(&self, u: User) -> Option<BlockId> {
        match u {
            User::Inst(i) => self.inst_block(i),
            User::Term(b) => Some(b),
        }
    }

    /// Rewrites every live operand equal to `from` into `to`.
    pub fn replace_all_uses(&mut self, from: Value, to: Value) {
        if from == to {
            return;
        }
        for idx in 0..self.layout.len() {
            let b = self.layout[idx];
            let insts = self.block(b).insts.clone();
            for i in insts {
                self.insts[i.0 as usize].kind.for_each_operand_mut(|op| {
                    if *op == from {
                        *op = to;
                    }
                });
            }
            self.block_mut(b).term.for_each_operand_mut(|op| {
                if *op == from {
                    *op = to;
                }
            });
        }
    }

    /// Rewrites uses of `from` located inside block `b` only.
    pub fn replace_uses_in_block(&mut self, b: BlockId, from: Value, to: Value) {
        let insts = self.block(b).insts.clone();
        for i in insts {
            self.insts[i.0 as usize].kind.for_each_operand_mut(|op| {
                if *op == from {
                    *op = to;
                }
            });
        }
        self.block_mut(b).term.for_each_operand_mut(|op| {
            if *op == from {
                *op = to;
            }
        });
    }

    // ── PHI nodes ────────────────────────────────────────────────────────────

    /// PHIs at the head of `b`.
    pub fn phis(&self, b: BlockId) -> Vec<InstId> {
        self.insts(b)
            .iter()
            .copied()
            .take_while(|&i| self.kind(i).is_phi())
            .collect()
    }

    pub fn has_phis(&self, b: BlockId) -> bool {
        self.insts(b)
            .first()
            .is_some_and(|&i| self.kind(i).is_phi())
    }

    /// First instruction that is not a PHI.
    pub fn first_non_phi(&self, b: BlockId) -> Option<InstId> {
        self.insts(b)
            .iter()
            .copied()
            .find(|&i| !self.kind(i).is_phi())
    }

    /// First instruction that is neither a PHI nor a debug marker.
    pub fn first_non_phi_or_debug(&self, b: BlockId) -> Option<InstId> {
        self.insts(b).iter().copied().find(|&i| {
            let k = self.kind(i);
            !k.is_phi() && !k.is_debug()
        })
    }

    /// Instructions after the PHIs.
    pub fn body(&self, b: BlockId) -> Vec<InstId> {
        self.insts(b)
            .iter()
            .copied()
            .skip_while(|&i| self.kind(i).is_phi())
            .collect()
    }

    pub fn phi_incoming(&self, phi: InstId) -> &[(BlockId, Value)] {
        match self.kind(phi) {
            InstKind::Phi { incoming } => incoming,
            other => panic!("{phi} is not a phi: {other:?}"),
        }
    }

    fn phi_incoming_mut(&mut self, phi: InstId) -> &mut Vec<(BlockId, Value)> {
        match &mut self.insts[phi.0 as usize].kind {
            InstKind::Phi { incoming } => incoming,
            other => panic!("{phi} is not a phi: {other:?}"),
        }
    }

    /// Incoming value of `phi` for predecessor `pred`.
    pub fn phi_value(&self, phi: InstId, pred: BlockId) -> Option<Value> {
        self.phi_incoming(phi)
            .iter()
            .find(|(b, _)| *b == pred)
            .map(|(_, v)| *v)
    }

    /// Sets the incoming value for `pred`, adding the entry if missing.
    pub fn set_phi_value(&mut self, phi: InstId, pred: BlockId, v: Value) {
        let incoming = self.phi_incoming_mut(phi);
        match incoming.iter_mut().find(|(b, _)| *b == pred) {
            Some(entry) => entry.1 = v,
            None => incoming.push((pred, v)),
        }
    }

    pub fn remove_phi_incoming(&mut self, phi: InstId, pred: BlockId) {
        self.phi_incoming_mut(phi).retain(|(b, _)| *b != pred);
    }

    /// For every PHI of `succ`, gives `new_pred` the value `existing_pred`
    /// already supplies. Used when a rule adds an edge `new_pred -> succ`
    /// that mirrors an existing edge `existing_pred -> succ`.
    pub fn add_phi_incoming_like(&mut self, succ: BlockId, new_pred: BlockId, existing_pred: BlockId) {
        for phi in self.phis(succ) {
            if self.phi_value(phi, new_pred).is_some() {
                continue;
            }
            let v = match self.phi_value(phi, existing_pred) {
                Some(v) => v,
                None => panic!(
                    "phi {phi} in {} has no entry for {}",
                    self.block_name(succ),
                    self.block_name(existing_pred)
                ),
            };
            self.phi_incoming_mut(phi).push((new_pred, v));
        }
    }

    /// Relabels the PHI entries of `succ` from `old_pred` to `new_pred`.
    /// When `new_pred` already has an entry the old one is dropped.
    pub fn rename_phi_incoming(&mut self, succ: BlockId, old_pred: BlockId, new_pred: BlockId) {
        for phi in self.phis(succ) {
            let has_new = self.phi_value(phi, new_pred).is_some();
            let incoming = self.phi_incoming_mut(phi);
            if has_new {
                incoming.retain(|(b, _)| *b != old_pred);
            } else {
                for entry in incoming.iter_mut() {
                    if entry.0 == old_pred {
                        entry.0 = new_pred;
                    }
                }
            }
        }
    }

    /// Counts live instructions, terminators excluded.
    pub fn inst_count(&self) -> usize {
        self.layout.iter().map(|&b| self.insts(b).len()).sum()
    }
}

fn dedup_stable(items: &[BlockId]) -> Vec<BlockId> {
    let mut out: Vec<BlockId> = Vec::with_capacity(items.len());
    for &b in items {
        if !out.contains(&b) {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret0() -> Terminator {
        Terminator::Ret {
            value: Some(Value::constant(Type::I32, 0)),
        }
    }

    /// entry → (a | b) → join, with a PHI in join.
    fn diamond() -> (Function, [BlockId; 4], InstId) {
        let mut f = Function::new("f", vec![("c".into(), Type::I1)], Type::I32);
        let entry = f.add_block("entry");
        let a = f.add_block("a");
        let b = f.add_block("b");
        let join = f.add_block("join");
        f.set_terminator(
            entry,
            Terminator::CondBr {
                cond: Value::Arg(0),
                if_true: a,
                if_false: b,
                weights: None,
            },
        );
        f.set_terminator(a, Terminator::Br { target: join });
        f.set_terminator(b, Terminator::Br { target: join });
        let phi = f.insert_phi(
            join,
            Type::I32,
            vec![(a, Value::constant(Type::I32, 1)), (b, Value::constant(Type::I32, 2))],
        );
        f.set_terminator(join, Terminator::Ret { value: Some(Value::Inst(phi)) });
        (f, [entry, a, b, join], phi)
    }

    #[test]
    fn set_terminator_maintains_preds() {
        let (f, [entry, a, b, join], _) = diamond();
        assert_eq!(f.preds(a), &[entry]);
        assert_eq!(f.preds(join), &[a, b]);
        assert!(f.preds(entry).is_empty());
        assert_eq!(f.unique_pred(b), Some(entry));
    }

    #[test]
    fn losing_last_edge_prunes_phi_entry() {
        let (mut f, [_, a, _, join], phi) = diamond();
        f.set_terminator(a, Terminator::Unreachable);
        assert_eq!(f.phi_incoming(phi).len(), 1);
        assert!(f.phi_value(phi, a).is_none());
        assert_eq!(f.preds(join).len(), 1);
    }

    #[test]
    fn duplicate_edges_keep_phi_until_last_edge_goes() {
        let mut f = Function::new("f", vec![("x".into(), Type::I32)], Type::I32);
        let entry = f.add_block("entry");
        let t = f.add_block("t");
        f.set_terminator(
            entry,
            Terminator::Switch {
                cond: Value::Arg(0),
                default: t,
                cases: vec![SwitchCase {
                    value: Constant::new(Type::I32, 3),
                    dest: t,
                }],
                weights: None,
            },
        );
        let phi = f.insert_phi(t, Type::I32, vec![(entry, Value::constant(Type::I32, 9))]);
        f.set_terminator(t, Terminator::Ret { value: Some(Value::Inst(phi)) });
        assert_eq!(f.preds(t), &[entry, entry]);
        assert_eq!(f.single_pred(t), None);
        assert_eq!(f.unique_pred(t), Some(entry));

        f.set_terminator(entry, Terminator::Br { target: t });
        assert_eq!(f.phi_value(phi, entry), Some(Value::constant(Type::I32, 9)));
    }

    #[test]
    fn dom_updates_are_net_and_inserts_first() {
        let (mut f, [entry, a, b, join], _) = diamond();
        f.take_dom_updates();

        // Redirect a → b, then back: no net change for a → join.
        f.set_terminator(a, Terminator::Br { target: b });
        f.set_terminator(a, Terminator::Br { target: join });
        assert!(f.take_dom_updates().is_empty());

        f.set_terminator(entry, Terminator::Br { target: b });
        f.add_phi_incoming_like(join, entry, b);
        f.set_terminator(entry, Terminator::Br { target: join });
        let updates = f.take_dom_updates();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].kind, UpdateKind::Insert);
        assert_eq!((updates[0].from, updates[0].to), (entry, join));
        assert!(updates[1..].iter().all(|u| u.kind == UpdateKind::Delete));
    }

    #[test]
    fn remove_block_rewrites_leftover_uses() {
        let mut f = Function::new("f", vec![], Type::I32);
        let entry = f.add_block("entry");
        let dead = f.add_block("dead");
        f.set_terminator(entry, ret0());
        let v = f.append_inst(
            dead,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::constant(Type::I32, 1),
                rhs: Value::constant(Type::I32, 2),
            },
            Type::I32,
        );
        f.set_terminator(dead, Terminator::Br { target: dead });
        f.set_terminator(entry, Terminator::Ret { value: Some(Value::Inst(v)) });
        f.remove_block(dead);
        assert_eq!(f.block_count(), 1);
        assert_eq!(
            f.terminator(entry),
            &Terminator::Ret {
                value: Some(Value::Undef(Type::I32))
            }
        );
    }

    #[test]
    fn block_names_are_uniquified() {
        let mut f = Function::new("f", vec![], Type::Void);
        f.add_block("entry");
        let a = f.add_block("x");
        let b = f.add_block("x");
        assert_eq!(f.block_name(a), "x");
        assert_eq!(f.block_name(b), "x1");
        let c = f.add_block_after(a, "y");
        assert_eq!(f.layout(), &[BlockId(0), a, c, b]);
    }
}
