//! Two-entry PHI folding: an if/else diamond (or if-then triangle) whose
//! merge PHIs can be computed with `select` is flattened.
//!
//! ```text
//!        dom                      dom: ...arms, hoisted...
//!       /   \                          %p = select %c, %x, %y
//!    then   else        →              br join
//!       \   /
//!       join: %p = phi [%x, then], [%y, else]
//! ```
//!
//! The arms must consist only of instructions that feed the PHIs, are safe
//! to speculate, and fit the `two_entry_phi_folding_threshold` budget. One
//! instruction is always allowed regardless of its cost.

use super::utils::emit;
use super::Cx;
use crate::ir::eval::phi_common_value;
use crate::ir::{BinOp, BlockId, Function, InstId, InstKind, Terminator, Type, Value};
use crate::oracle::BASIC_COST;
use std::collections::HashSet;

/// The branch deciding which PHI entry of `b` is taken.
struct IfCondition {
    dom: BlockId,
    cond: Value,
    /// Predecessor of `b` reached when `cond` is true.
    if_true: BlockId,
    if_false: BlockId,
}

fn if_condition(func: &Function, b: BlockId) -> Option<IfCondition> {
    let preds = func.unique_preds(b);
    let &[mut p1, mut p2] = preds.as_slice() else {
        return None;
    };
    let is_branch = |p: BlockId| matches!(func.terminator(p), Terminator::Br { .. } | Terminator::CondBr { .. });
    if !is_branch(p1) || !is_branch(p2) {
        return None;
    }
    if func.terminator(p2).is_cond_br() {
        // Both conditional: the condition is needed anyway.
        if func.terminator(p1).is_cond_br() {
            return None;
        }
        std::mem::swap(&mut p1, &mut p2);
    }

    if let Terminator::CondBr {
        cond,
        if_true,
        if_false,
        ..
    } = *func.terminator(p1)
    {
        func.single_pred(p2)?;
        return if if_true == b && if_false == p2 {
            Some(IfCondition {
                dom: p1,
                cond,
                if_true: p1,
                if_false: p2,
            })
        } else if if_true == p2 && if_false == b {
            Some(IfCondition {
                dom: p1,
                cond,
                if_true: p2,
                if_false: p1,
            })
        } else {
            None
        };
    }

    let common = func.single_pred(p1)?;
    if func.single_pred(p2) != Some(common) {
        return None;
    }
    let Terminator::CondBr { cond, if_true, .. } = *func.terminator(common) else {
        return None;
    };
    let (t, f) = if if_true == p1 { (p1, p2) } else { (p2, p1) };
    Some(IfCondition {
        dom: common,
        cond,
        if_true: t,
        if_false: f,
    })
}

/// Speculation state shared across the PHIs of the merge block.
struct Hoist {
    insts: HashSet<InstId>,
    cost: u32,
    budget: u32,
}

/// Whether `v` is available at the end of the dominating block, possibly
/// after hoisting the arm instructions computing it.
fn dominates_merge_point(func: &Function, v: Value, b: BlockId, cx: &Cx, hoist: &mut Hoist, depth: u32) -> bool {
    let Value::Inst(i) = v else {
        return true;
    };
    let Some(block) = func.inst_block(i) else {
        return false;
    };
    if block == b {
        return false;
    }
    // Only instructions of an arm (a block ending in `br b`) need hoisting.
    if *func.terminator(block) != (Terminator::Br { target: b }) {
        return true;
    }
    if hoist.insts.contains(&i) {
        return true;
    }
    if !cx.cost.is_safe_to_speculate(func, i) {
        return false;
    }
    hoist.cost += cx.cost.speculation_cost(func, i);
    if hoist.cost > hoist.budget && (!hoist.insts.is_empty() || depth > 0) {
        return false;
    }
    for op in func.kind(i).operands() {
        if !dominates_merge_point(func, op, b, cx, hoist, depth + 1) {
            return false;
        }
    }
    hoist.insts.insert(i);
    true
}

/// Boolean and/or chains are left as branches; they lower to switches and
/// combined conditions more usefully.
fn is_logic_op(func: &Function, v: Value) -> bool {
    let Value::Inst(i) = v else {
        return false;
    };
    match func.kind(i) {
        InstKind::Binary { op, .. } => matches!(op, BinOp::And | BinOp::Or),
        InstKind::Select { .. } => func.inst(i).ty == Type::I1,
        _ => false,
    }
}

/// Branch probability at or above the target's "predictable" threshold.
fn is_predictable(cx: &Cx, weight: u32, total: u64) -> bool {
    u64::from(weight) * 100 >= u64::from(cx.cost.predictable_branch_percent()) * total
}

pub fn fold_two_entry_phi(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Some(&first) = func.phis(b).first() else {
        return false;
    };
    if func.phi_incoming(first).len() != 2 {
        return false;
    }
    let Some(IfCondition {
        dom,
        cond,
        if_true,
        if_false,
    }) = if_condition(func, b)
    else {
        return false;
    };
    if matches!(cond, Value::Const(_)) {
        return false;
    }
    let if_blocks: Vec<BlockId> = func
        .phi_incoming(first)
        .iter()
        .map(|&(p, _)| p)
        .filter(|&p| func.terminator(p).is_unconditional_br())
        .collect();

    // Speculating an arm that is almost never entered does not pay off.
    if let Terminator::CondBr {
        weights: Some([t, f]),
        if_true: s0,
        ..
    } = *func.terminator(dom)
    {
        let total = u64::from(t) + u64::from(f);
        if total != 0 {
            if if_blocks.len() == 1 {
                let to_merge = if s0 == b { t } else { f };
                if is_predictable(cx, to_merge, total) {
                    return false;
                }
            } else if is_predictable(cx, t, total) || is_predictable(cx, f, total) {
                return false;
            }
        }
    }
    if cond
        .as_inst()
        .is_some_and(|i| func.kind(i).is_phi() && func.inst_block(i) == Some(b))
    {
        return false;
    }
    if func.phis(b).len() > 3 {
        return false;
    }

    let mut hoist = Hoist {
        insts: HashSet::new(),
        cost: 0,
        budget: cx.opts.two_entry_phi_folding_threshold * BASIC_COST,
    };
    let mut changed = false;
    for phi in func.phis(b) {
        if let Some(v) = phi_common_value(func, phi) {
            func.replace_inst(phi, v);
            changed = true;
            continue;
        }
        let incoming = func.phi_incoming(phi).to_vec();
        for (_, v) in incoming {
            if !dominates_merge_point(func, v, b, cx, &mut hoist, 0) {
                return changed;
            }
        }
    }

    let phis = func.phis(b);
    let Some(&first) = phis.first() else {
        return true;
    };
    if func.inst(first).ty == Type::I1 {
        let incoming = func.phi_incoming(first);
        if incoming.iter().any(|&(_, v)| is_logic_op(func, v)) || is_logic_op(func, cond) {
            return changed;
        }
    }
    for &ib in &if_blocks {
        if func
            .insts(ib)
            .iter()
            .any(|&i| !func.kind(i).is_debug() && !hoist.insts.contains(&i))
        {
            return changed;
        }
    }
    if if_blocks.iter().any(|&ib| func.address_taken(ib)) {
        return changed;
    }

    for &ib in &if_blocks {
        for i in func.insts(ib).to_vec() {
            func.move_inst_to_end(i, dom);
        }
    }
    for phi in phis {
        let ty = func.inst(phi).ty;
        let on_true = func.phi_value(phi, if_true).unwrap_or(Value::Undef(ty));
        let on_false = func.phi_value(phi, if_false).unwrap_or(Value::Undef(ty));
        let name = func.inst(phi).name.clone().unwrap_or_default();
        let sel = emit(
            func,
            dom,
            InstKind::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
            &name,
        );
        func.replace_inst(phi, sel);
    }
    func.set_terminator(dom, Terminator::Br { target: b });
    true
}
