//! Single-instruction speculation.
//!
//! ```text
//!   bb:   br %c, then, end             bb:  %x = ...
//!   then: %x = ...                           %spec.select = select %c, %x, %v
//!         br end                  →          br %c, then, end
//!   end:  phi [%x, then], [%v, bb]     end:  phi [%spec.select, then], [%spec.select, bb]
//! ```
//!
//! The now empty `then` is left for the empty-block rules.

use super::utils::{emit, passing_value_is_always_undefined};
use super::Cx;
use crate::ir::{BlockId, Function, InstId, InstKind, Terminator, Value};
use crate::oracle::BASIC_COST;
use std::collections::HashMap;
use tracing::trace;

/// How many trailing instructions of the branching block are searched for
/// an earlier store to the same address.
const STORE_LOOKBACK: usize = 9;

/// If `i` is a plain store whose address `bb` already stores to, with no
/// other side effect in between, returns the value stored there.
fn previous_store_value(func: &Function, i: InstId, bb: BlockId) -> Option<Value> {
    let InstKind::Store {
        ptr,
        value,
        volatile: false,
    } = *func.kind(i)
    else {
        return None;
    };
    let ty = func.value_type(value);
    // The terminator takes the first slot of the window.
    let window = func
        .insts(bb)
        .iter()
        .rev()
        .filter(|&&x| !func.kind(x).is_debug())
        .take(STORE_LOOKBACK - 1);
    for &cur in window {
        match *func.kind(cur) {
            InstKind::Store {
                ptr: p,
                value: v,
                volatile,
            } => {
                return (p == ptr && func.value_type(v) == ty && !volatile).then_some(v);
            }
            ref k if k.may_have_side_effects() => return None,
            _ => {}
        }
    }
    None
}

pub fn speculatively_execute(func: &mut Function, b: BlockId, then_bb: BlockId, cx: &Cx) -> bool {
    let Terminator::CondBr {
        cond,
        if_true,
        if_false,
        weights,
    } = *func.terminator(b)
    else {
        return false;
    };
    let invert = then_bb != if_true;
    let end = if invert { if_true } else { if_false };
    if func.single_succ(then_bb) != Some(end) || then_bb == b {
        return false;
    }

    if let Some([t, f]) = weights {
        let total = u64::from(t) + u64::from(f);
        let to_end = u64::from(if invert { t } else { f });
        if total != 0 && to_end * 100 >= u64::from(cx.cost.predictable_branch_percent()) * total {
            return false;
        }
    }

    let budget = cx.opts.phi_folding_threshold * BASIC_COST;
    let mut speculated = 0u32;
    let mut debug_markers = Vec::new();
    let mut store: Option<(InstId, Value)> = None;
    let mut sink_candidates: HashMap<InstId, usize> = HashMap::new();
    for &i in func.insts(then_bb) {
        if func.kind(i).is_debug() {
            debug_markers.push(i);
            continue;
        }
        speculated += 1;
        if speculated > 1 {
            return false;
        }
        let prev = if cx.cost.is_safe_to_speculate(func, i) {
            None
        } else if cx.opts.speculate_stores {
            match previous_store_value(func, i, b) {
                Some(v) => Some(v),
                None => return false,
            }
        } else {
            return false;
        };
        if prev.is_none() && cx.cost.speculation_cost(func, i) > budget {
            return false;
        }
        if let Some(v) = prev {
            store = Some((i, v));
        }
        // Operands computed in `b` only for `then` would lose the chance to
        // sink there.
        for op in func.kind(i).operands() {
            if let Value::Inst(op) = op {
                if func.inst_block(op) == Some(b) && !func.kind(op).may_have_side_effects() {
                    *sink_candidates.entry(op).or_default() += 1;
                }
            }
        }
    }
    for (&op, &count) in &sink_candidates {
        if func.use_count(Value::Inst(op)) == count {
            speculated += 1;
            if speculated > 1 {
                return false;
            }
        }
    }

    // Selects needed at the join, and their cost.
    let mut rewrites = Vec::new();
    let mut cost = 0u32;
    for phi in func.phis(end) {
        let (Some(orig), Some(then_v)) = (func.phi_value(phi, b), func.phi_value(phi, then_bb)) else {
            continue;
        };
        if orig == then_v {
            continue;
        }
        cost += cx.cost.select_cost(func.inst(phi).ty);
        if passing_value_is_always_undefined(func, orig, phi)
            || passing_value_is_always_undefined(func, then_v, phi)
        {
            return false;
        }
        rewrites.push((phi, orig, then_v));
    }
    if (store.is_none() && rewrites.is_empty()) || cost > budget {
        return false;
    }

    trace!(block = %func.block_name(b), then = %func.block_name(then_bb), "speculating");
    let arm = |on_then: Value, other: Value| if invert { (other, on_then) } else { (on_then, other) };
    if let Some((st, prev)) = store {
        if let InstKind::Store { value, .. } = *func.kind(st) {
            let (on_true, on_false) = arm(value, prev);
            let ty = func.value_type(value);
            let sel = emit(
                func,
                b,
                InstKind::Select {
                    cond,
                    on_true,
                    on_false,
                },
                ty,
                "spec.store.select",
            );
            func.inst_mut(st).kind.set_operand(0, sel);
        }
    }
    for i in func.insts(then_bb).to_vec() {
        if !func.kind(i).is_debug() {
            func.move_inst_to_end(i, b);
        }
    }
    for (phi, orig, then_v) in rewrites {
        let (on_true, on_false) = arm(then_v, orig);
        let ty = func.inst(phi).ty;
        let sel = emit(
            func,
            b,
            InstKind::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
            "spec.select",
        );
        func.set_phi_value(phi, b, sel);
        func.set_phi_value(phi, then_bb, sel);
    }
    for i in debug_markers {
        func.remove_inst(i);
    }
    true
}
