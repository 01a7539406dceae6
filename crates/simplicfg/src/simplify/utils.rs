//! Shared helpers for the rewrite rules.
//!
//! Branch-weight arithmetic, trivial dead-code removal, edge splitting and
//! the small structural queries several rules ask about a block.

use crate::ir::{BinOp, BlockId, CallFlags, Function, InstId, InstKind, Terminator, Type, User, Value};

// ── Branch weights ───────────────────────────────────────────────────────────

/// Branch weights of a conditional branch or switch, in successor-slot order.
pub(crate) fn successor_weights(term: &Terminator) -> Option<Vec<u64>> {
    match term {
        Terminator::CondBr {
            weights: Some([t, f]),
            ..
        } => Some(vec![*t as u64, *f as u64]),
        Terminator::Switch {
            weights: Some(w),
            cases,
            ..
        } if w.len() == cases.len() + 1 => Some(w.iter().map(|&x| x as u64).collect()),
        _ => None,
    }
}

/// Scales weights down until the largest one fits in 32 bits.
pub(crate) fn fit_weights(weights: &mut [u64]) {
    let max = weights.iter().copied().max().unwrap_or(0);
    if max > u32::MAX as u64 {
        let offset = 32 - max.leading_zeros();
        for w in weights.iter_mut() {
            *w >>= offset;
        }
    }
}

/// Fits `weights` and narrows them; `None` when they are all zero.
pub(crate) fn to_metadata(mut weights: Vec<u64>) -> Option<Vec<u32>> {
    fit_weights(&mut weights);
    if weights.iter().all(|&w| w == 0) {
        return None;
    }
    Some(weights.into_iter().map(|w| w as u32).collect())
}

/// Two-way variant of [`to_metadata`].
pub(crate) fn to_branch_metadata(t: u64, f: u64) -> Option<[u32; 2]> {
    to_metadata(vec![t, f]).map(|w| [w[0], w[1]])
}

// ── Dead code ────────────────────────────────────────────────────────────────

/// An attached instruction nothing reads (debug markers aside) and whose
/// removal is unobservable.
pub(crate) fn is_trivially_dead(func: &Function, i: InstId) -> bool {
    if func.inst_block(i).is_none() {
        return false;
    }
    let kind = func.kind(i);
    if kind.is_debug() || kind.may_have_side_effects() || kind.is_eh_pad() {
        return false;
    }
    if let InstKind::Call { flags, .. } = kind {
        if flags.musttail {
            return false;
        }
    }
    func.users(Value::Inst(i)).into_iter().all(|u| match u {
        User::Inst(user) => func.kind(user).is_debug() || user == i,
        User::Term(_) => false,
    })
}

/// Deletes `v` if it is a trivially dead instruction, then its operands
/// that became dead in turn.
pub(crate) fn delete_trivially_dead(func: &mut Function, v: Value) {
    let mut work = vec![v];
    while let Some(v) = work.pop() {
        let Value::Inst(i) = v else { continue };
        if !is_trivially_dead(func, i) {
            continue;
        }
        let operands = func.kind(i).operands();
        let ty = func.inst(i).ty;
        func.replace_inst(i, Value::Undef(ty));
        work.extend(operands.into_iter().filter(|op| *op != v));
    }
}

/// Installs `term` as the terminator of `b` and deletes the old condition
/// if nothing else uses it.
pub(crate) fn replace_terminator(func: &mut Function, b: BlockId, term: Terminator) {
    let old_cond = func.terminator(b).condition();
    func.set_terminator(b, term);
    if let Some(cond) = old_cond {
        delete_trivially_dead(func, cond);
    }
}

// ── Block shape ──────────────────────────────────────────────────────────────

/// Only PHIs and debug markers precede the terminator.
pub(crate) fn is_empty_block(func: &Function, b: BlockId) -> bool {
    func.first_non_phi_or_debug(b).is_none()
}

/// The block does nothing but reach `unreachable`.
pub(crate) fn is_unreachable_block(func: &Function, b: BlockId) -> bool {
    is_empty_block(func, b) && matches!(func.terminator(b), Terminator::Unreachable)
}

/// Name to derive generated names from.
pub(crate) fn value_name(func: &Function, v: Value) -> String {
    match v {
        Value::Inst(i) => func.inst(i).name.clone().unwrap_or_default(),
        Value::Arg(n) => func.params[n as usize].0.clone(),
        _ => String::new(),
    }
}

/// Inserts a named instruction right before the terminator of `b`.
pub(crate) fn emit(func: &mut Function, b: BlockId, kind: InstKind, ty: Type, name: &str) -> Value {
    let i = func.append_inst(b, kind, ty);
    if !name.is_empty() {
        func.set_inst_name(i, name);
    }
    Value::Inst(i)
}

/// Logical negation of an `i1`, emitted before the terminator of `b`.
pub(crate) fn emit_not(func: &mut Function, b: BlockId, v: Value) -> Value {
    if let Value::Const(c) = v {
        return Value::constant(Type::I1, c.is_zero() as i64);
    }
    let name = format!("{}.not", value_name(func, v));
    emit(
        func,
        b,
        InstKind::Binary {
            op: BinOp::Xor,
            lhs: v,
            rhs: Value::constant(Type::I1, 1),
        },
        Type::I1,
        &name,
    )
}

// ── Undefined behavior ───────────────────────────────────────────────────────

/// Whether the instruction always hands control to the next one.
pub(crate) fn transfers_execution(kind: &InstKind) -> bool {
    match kind {
        InstKind::Call { flags, .. } => flags.nounwind && flags.readnone,
        InstKind::Load { volatile, .. } | InstKind::Store { volatile, .. } => !volatile,
        _ => true,
    }
}

/// Whether feeding `v` into `phi` makes the program immediately undefined:
/// `v` is null or `undef` and the PHI's first use, in its own block with
/// nothing in between that could leave the block, dereferences it.
pub(crate) fn passing_value_is_always_undefined(func: &Function, v: Value, phi: InstId) -> bool {
    let is_null_or_undef = match v {
        Value::Const(c) => c.is_zero(),
        Value::Undef(_) => true,
        _ => false,
    };
    if !is_null_or_undef {
        return false;
    }
    let Some(block) = func.inst_block(phi) else {
        return false;
    };
    let first_use = func
        .users(Value::Inst(phi))
        .into_iter()
        .find(|u| !matches!(u, User::Inst(i) if func.kind(*i).is_debug()));
    let Some(User::Inst(user)) = first_use else {
        return false;
    };
    if user == phi || func.inst_block(user) != Some(block) {
        return false;
    }
    let (from, to) = (func.position(phi), func.position(user));
    if to < from {
        return false;
    }
    let insts = func.insts(block);
    if insts[from + 1..to]
        .iter()
        .any(|&i| !transfers_execution(func.kind(i)))
    {
        return false;
    }
    match func.kind(user) {
        InstKind::Load {
            ptr,
            volatile: false,
        } => *ptr == Value::Inst(phi),
        InstKind::Store {
            ptr,
            volatile: false,
            ..
        } => *ptr == Value::Inst(phi),
        _ => false,
    }
}

// ── Edge surgery ─────────────────────────────────────────────────────────────

/// Routes the edges from `preds` into `succ` through a new block, which is
/// returned. PHIs of `succ` get the new block's entry; values that differ
/// among `preds` are merged by a PHI in the new block.
///
/// Returns `None` when the edges cannot be split: `succ` starts with an
/// exception pad, or a predecessor branches indirectly.
pub(crate) fn split_block_predecessors(
    func: &mut Function,
    succ: BlockId,
    preds: &[BlockId],
    suffix: &str,
) -> Option<BlockId> {
    if func
        .first_non_phi(succ)
        .is_some_and(|i| func.kind(i).is_eh_pad())
    {
        return None;
    }
    let preds = dedup(preds);
    if preds.is_empty()
        || preds
            .iter()
            .any(|&p| matches!(func.terminator(p), Terminator::IndirectBr { .. }))
    {
        return None;
    }

    let phis = func.phis(succ);
    let values: Vec<Vec<Value>> = phis
        .iter()
        .map(|&phi| {
            preds
                .iter()
                .map(|&p| func.phi_value(phi, p).unwrap_or(Value::Undef(func.inst(phi).ty)))
                .collect()
        })
        .collect();

    let name = format!("{}{}", func.block_name(succ), suffix);
    let new_block = func.add_block_after(preds[0], &name);
    func.set_terminator(new_block, Terminator::Br { target: succ });
    for &p in &preds {
        func.update_terminator(p, |t| t.replace_successor(succ, new_block));
    }

    for (phi, vals) in phis.into_iter().zip(values) {
        let v = if vals.iter().all(|v| *v == vals[0]) {
            vals[0]
        } else {
            let ty = func.inst(phi).ty;
            let incoming = preds.iter().copied().zip(vals).collect();
            let merged = func.insert_phi(new_block, ty, incoming);
            if let Some(n) = func.inst(phi).name.clone() {
                func.set_inst_name(merged, format!("{n}.ph"));
            }
            Value::Inst(merged)
        };
        func.set_phi_value(phi, new_block, v);
    }
    Some(new_block)
}

/// Splits `b` before instruction index `at`; the tail, returned, takes the
/// rest of the instructions and the terminator and `b` branches to it.
pub(crate) fn split_block_at(func: &mut Function, b: BlockId, at: usize, name: &str) -> BlockId {
    let tail = func.add_block_after(b, name);
    let moved: Vec<InstId> = func.insts(b)[at..].to_vec();
    for (pos, i) in moved.into_iter().enumerate() {
        func.move_inst(i, tail, pos);
    }
    let term = func.terminator(b).clone();
    let succs = term.successors();
    func.set_terminator(tail, term);
    for s in dedup(&succs) {
        func.add_phi_incoming_like(s, tail, b);
    }
    func.set_terminator(b, Terminator::Br { target: tail });
    tail
}

/// Turns an unwinding terminator into its non-unwinding form: an `invoke`
/// becomes a call followed by a branch to the normal destination, a
/// `cleanupret` unwinds to the caller.
pub(crate) fn remove_unwind_edge(func: &mut Function, b: BlockId) {
    match func.terminator(b).clone() {
        Terminator::Invoke {
            callee,
            args,
            normal,
            ..
        } => {
            func.append_inst(
                b,
                InstKind::Call {
                    callee,
                    args,
                    flags: CallFlags::default(),
                },
                Type::Void,
            );
            func.set_terminator(b, Terminator::Br { target: normal });
        }
        Terminator::CleanupRet { pad, .. } => {
            func.set_terminator(b, Terminator::CleanupRet { pad, unwind: None });
        }
        other => panic!("{b} has no unwind edge to remove: {other:?}"),
    }
}

pub(crate) fn dedup(items: &[BlockId]) -> Vec<BlockId> {
    let mut out: Vec<BlockId> = Vec::with_capacity(items.len());
    for &b in items {
        if !out.contains(&b) {
            out.push(b);
        }
    }
    out
}
