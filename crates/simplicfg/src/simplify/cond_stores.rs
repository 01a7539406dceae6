//! Conditional-store merging.
//!
//! Two consecutive diamonds (or triangles) that each conditionally store to
//! the same address are rewritten to a single store in the block after the
//! second one, guarded by the union of both conditions:
//!
//! ```text
//!        pbb                    the P store moves out of PTB/PFB,
//!       /   \                   the Q store out of QTB/QFB, and
//!     PTB   PFB                 post gets
//!       \   /
//!        qbb                      %c = or %p.pred, %q.pred
//!       /   \                     br %c, post.store, post.cont
//!     QTB   QFB                 post.store:
//!       \   /                     store (Q value, else P value), %addr
//!        post
//! ```
//!
//! Fallthrough arms (a branch straight to the next block) are allowed on
//! either side.

use super::utils::{split_block_at, split_block_predecessors};
use super::Cx;
use crate::ir::{BinOp, BlockId, Function, InstId, InstKind, Terminator, Type, Value};
use crate::oracle::BASIC_COST;
use tracing::trace;

/// Every predecessor of `b` has the same single predecessor, returned.
fn common_grandparent(func: &Function, b: BlockId) -> Option<BlockId> {
    let mut common = None;
    for &p in func.preds(b) {
        let pp = func.single_pred(p)?;
        if common.is_some_and(|c| c != pp) {
            return None;
        }
        common = Some(pp);
    }
    common
}

fn has_one_pred_and_one_succ(func: &Function, b: BlockId, pred: BlockId, succ: BlockId) -> bool {
    func.single_pred(b) == Some(pred) && func.single_succ(b) == Some(succ)
}

fn store_addresses(func: &Function, blocks: &[Option<BlockId>]) -> Vec<Value> {
    let mut out = Vec::new();
    for &b in blocks.iter().flatten() {
        for &i in func.insts(b) {
            if let InstKind::Store { ptr, .. } = *func.kind(i) {
                if !out.contains(&ptr) {
                    out.push(ptr);
                }
            }
        }
    }
    out
}

/// The only store to `addr` in `blocks`.
fn unique_store(func: &Function, blocks: &[Option<BlockId>], addr: Value) -> Option<InstId> {
    let mut found = None;
    for &b in blocks.iter().flatten() {
        for &i in func.insts(b) {
            if matches!(func.kind(i), InstKind::Store { ptr, .. } if *ptr == addr) {
                if found.is_some() {
                    return None;
                }
                found = Some(i);
            }
        }
    }
    found
}

/// The arm only computes cheap arithmetic besides the stores being merged.
fn is_worthwhile(func: &Function, b: Option<BlockId>, free: [InstId; 2], cx: &Cx) -> bool {
    let Some(b) = b else {
        return true;
    };
    let budget = cx.opts.phi_folding_threshold * BASIC_COST;
    let mut cost = 0;
    for &i in func.insts(b) {
        let kind = func.kind(i);
        if kind.is_debug() || free.contains(&i) {
            continue;
        }
        if !matches!(kind, InstKind::Binary { .. }) {
            return false;
        }
        cost += cx.cost.speculation_cost(func, i);
        if cost > budget {
            return false;
        }
    }
    true
}

/// Makes `v`, computed in `b`, readable in `b`'s only successor. With an
/// `alternative`, the result takes that value when coming from the other
/// predecessor.
fn ensure_value_available_in_successor(
    func: &mut Function,
    v: Value,
    b: BlockId,
    alternative: Option<Value>,
) -> Value {
    let Some(succ) = func.single_succ(b) else {
        return v;
    };
    for phi in func.phis(succ) {
        if func.phi_value(phi, b) != Some(v) {
            continue;
        }
        match alternative {
            None => return Value::Inst(phi),
            Some(alt) => {
                let other = func.unique_preds(succ).into_iter().find(|&p| p != b);
                if other.and_then(|o| func.phi_value(phi, o)) == Some(alt) {
                    return Value::Inst(phi);
                }
            }
        }
    }
    let defined_here = v.as_inst().is_some_and(|i| func.inst_block(i) == Some(b));
    if alternative.is_none() && !defined_here {
        return v;
    }
    let ty = func.value_type(v);
    let mut incoming = vec![(b, v)];
    for p in func.unique_preds(succ) {
        if p != b {
            incoming.push((p, alternative.unwrap_or(Value::Undef(ty))));
        }
    }
    let phi = func.insert_phi(succ, ty, incoming);
    func.set_inst_name(phi, "simplifycfg.merge");
    Value::Inst(phi)
}

/// The arms of a two-level branch, canonicalized so that only the `*_true`
/// arms may be missing (a direct edge).
struct Shape {
    pbb: BlockId,
    qbb: BlockId,
    ptb: Option<BlockId>,
    pfb: BlockId,
    qtb: Option<BlockId>,
    qfb: BlockId,
    post: BlockId,
}

fn match_shape(func: &Function, pbb: BlockId, qbb: BlockId) -> Option<Shape> {
    let Terminator::CondBr {
        if_true: mut ptb,
        if_false: mut pfb,
        ..
    } = *func.terminator(pbb)
    else {
        return None;
    };
    let Terminator::CondBr {
        if_true: mut qtb,
        if_false: mut qfb,
        ..
    } = *func.terminator(qbb)
    else {
        return None;
    };
    let mut post = func.single_succ(qfb);
    if func.single_succ(qtb) == Some(qfb) {
        post = Some(qfb);
    }
    let post = post?;

    if pfb == qbb {
        std::mem::swap(&mut ptb, &mut pfb);
    }
    if qfb == post {
        std::mem::swap(&mut qtb, &mut qfb);
    }
    let ptb = (ptb != qbb).then_some(ptb);
    let qtb = (qtb != post).then_some(qtb);

    if !has_one_pred_and_one_succ(func, pfb, pbb, qbb) || !has_one_pred_and_one_succ(func, qfb, qbb, post) {
        return None;
    }
    if ptb.is_some_and(|b| !has_one_pred_and_one_succ(func, b, pbb, qbb))
        || qtb.is_some_and(|b| !has_one_pred_and_one_succ(func, b, qbb, post))
    {
        return None;
    }
    if func.preds(qbb).len() != 2 {
        return None;
    }
    Some(Shape {
        pbb,
        qbb,
        ptb,
        pfb,
        qtb,
        qfb,
        post,
    })
}

pub fn merge_conditional_stores(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Some(pbb) = common_grandparent(func, b) else {
        return false;
    };
    if pbb == b || !func.terminator(pbb).is_cond_br() || !func.terminator(b).is_cond_br() {
        return false;
    }
    let Some(shape) = match_shape(func, pbb, b) else {
        return false;
    };

    let p_addrs = store_addresses(func, &[shape.ptb, Some(shape.pfb)]);
    let q_addrs = store_addresses(func, &[shape.qtb, Some(shape.qfb)]);
    let common: Vec<Value> = p_addrs.into_iter().filter(|a| q_addrs.contains(a)).collect();

    let mut changed = false;
    let mut post = shape.post;
    for addr in common {
        if let Some(new_post) = merge_store_to_address(func, &shape, post, addr, cx) {
            post = new_post;
            changed = true;
        }
    }
    changed
}

/// Returns the block that now heads the merged store's guard.
fn merge_store_to_address(func: &mut Function, shape: &Shape, post: BlockId, addr: Value, cx: &Cx) -> Option<BlockId> {
    let p_store = unique_store(func, &[shape.ptb, Some(shape.pfb)], addr)?;
    let q_store = unique_store(func, &[shape.qtb, Some(shape.qfb)], addr)?;
    let (
        InstKind::Store {
            value: p_value,
            volatile: false,
            ..
        },
        InstKind::Store {
            value: q_value,
            volatile: false,
            ..
        },
    ) = (func.kind(p_store).clone(), func.kind(q_store).clone())
    else {
        return None;
    };
    if func.value_type(p_value) != func.value_type(q_value) {
        return None;
    }

    // Moving the P store down past the middle block and the Q arms must not
    // reorder it with another access.
    let touches_memory = |i: &InstId| func.kind(*i).may_read_or_write_memory();
    if func.insts(shape.qbb).iter().any(touches_memory) {
        return None;
    }
    for b in [shape.qtb, Some(shape.qfb)].into_iter().flatten() {
        if func.insts(b).iter().filter(|&&i| i != q_store).any(touches_memory) {
            return None;
        }
    }
    let p_block = func.inst_block(p_store)?;
    let after_p = &func.insts(p_block)[func.position(p_store) + 1..];
    if after_p.iter().any(touches_memory) {
        return None;
    }

    let free = [p_store, q_store];
    if ![shape.ptb, Some(shape.pfb), shape.qtb, Some(shape.qfb)]
        .into_iter()
        .all(|b| is_worthwhile(func, b, free, cx))
    {
        return None;
    }

    let mut post = post;
    if func.preds(post).len() > 2 {
        let true_pred = shape.qtb.unwrap_or(shape.qbb);
        post = split_block_predecessors(func, post, &[shape.qfb, true_pred], ".condstore.split")?;
    }
    trace!(block = %func.block_name(shape.qbb), into = %func.block_name(post), "merging conditional stores");

    let q_block = func.inst_block(q_store)?;
    let (p_cond, p_on_true) = branch_side(func, shape.pbb, p_block)?;
    let (q_cond, q_on_true) = branch_side(func, shape.qbb, q_block)?;
    let p_merged = ensure_value_available_in_successor(func, p_value, p_block, None);
    let q_merged = ensure_value_available_in_successor(func, q_value, q_block, Some(p_merged));

    // Conditions under which each store ran, computed at the head of post.
    let mut pos = func.phis(post).len();
    let p_pred = if p_on_true {
        p_cond
    } else {
        insert_at(func, post, &mut pos, not(p_cond))
    };
    let q_pred = if q_on_true {
        q_cond
    } else {
        insert_at(func, post, &mut pos, not(q_cond))
    };
    let combined = insert_at(
        func,
        post,
        &mut pos,
        InstKind::Binary {
            op: BinOp::Or,
            lhs: p_pred,
            rhs: q_pred,
        },
    );

    let tail_name = format!("{}.cont", func.block_name(post));
    let tail = split_block_at(func, post, pos, &tail_name);
    let store_name = format!("{}.store", func.block_name(post));
    let store_bb = func.add_block_after(post, &store_name);
    func.append_inst(
        store_bb,
        InstKind::Store {
            ptr: addr,
            value: q_merged,
            volatile: false,
        },
        Type::Void,
    );
    func.set_terminator(store_bb, Terminator::Br { target: tail });
    func.set_terminator(
        post,
        Terminator::CondBr {
            cond: combined,
            if_true: store_bb,
            if_false: tail,
            weights: None,
        },
    );
    func.remove_inst(q_store);
    func.remove_inst(p_store);
    Some(post)
}

/// The condition of the branch ending `branch`, and whether `arm` is its
/// true side.
fn branch_side(func: &Function, branch: BlockId, arm: BlockId) -> Option<(Value, bool)> {
    match *func.terminator(branch) {
        Terminator::CondBr { cond, if_true, .. } => Some((cond, if_true == arm)),
        _ => None,
    }
}

fn not(v: Value) -> InstKind {
    InstKind::Binary {
        op: BinOp::Xor,
        lhs: v,
        rhs: Value::constant(Type::I1, 1),
    }
}

fn insert_at(func: &mut Function, b: BlockId, pos: &mut usize, kind: InstKind) -> Value {
    let i = func.insert_inst(b, *pos, kind, Type::I1);
    *pos += 1;
    Value::Inst(i)
}
