//! Then/else hoisting.
//!
//! When both successors of a conditional branch are entered only from the
//! branch, the instructions the two arms start with in lockstep are moved
//! into the branching block. If the arms end up with identical terminators
//! the terminator is hoisted too, with a `select` for every successor PHI
//! that receives different values from the two arms.

use super::utils::{emit, passing_value_is_always_undefined, replace_terminator, value_name};
use super::Cx;
use crate::ir::{BlockId, Function, InstId, InstKind, Terminator, Value};
use std::collections::HashMap;
use tracing::trace;

/// Cursor position within an arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Inst(InstId),
    Term,
}

fn at(func: &Function, b: BlockId, idx: usize) -> Item {
    func.insts(b).get(idx).map_or(Item::Term, |&i| Item::Inst(i))
}

fn is_debug(func: &Function, item: Item) -> bool {
    matches!(item, Item::Inst(i) if func.kind(i).is_debug())
}

/// Debug markers pair up when they describe the same value, whatever their
/// location.
fn debug_pair(func: &Function, a: Item, b: Item) -> bool {
    match (a, b) {
        (Item::Inst(x), Item::Inst(y)) => matches!(
            (func.kind(x), func.kind(y)),
            (InstKind::Debug { value: v1, .. }, InstKind::Debug { value: v2, .. }) if v1 == v2
        ),
        _ => false,
    }
}

/// Steps both cursors over debug markers that do not pair up.
fn skip_debug(func: &Function, bb1: BlockId, c1: &mut usize, bb2: BlockId, c2: &mut usize) {
    if debug_pair(func, at(func, bb1, *c1), at(func, bb2, *c2)) {
        return;
    }
    while is_debug(func, at(func, bb1, *c1)) {
        *c1 += 1;
    }
    while is_debug(func, at(func, bb2, *c2)) {
        *c2 += 1;
    }
}

fn identical(func: &Function, bb1: BlockId, a: Item, bb2: BlockId, b: Item) -> bool {
    match (a, b) {
        (Item::Term, Item::Term) => func.terminator(bb1).is_identical_to(func.terminator(bb2)),
        (Item::Inst(x), Item::Inst(y)) => {
            debug_pair(func, a, b)
                || (func.inst(x).ty == func.inst(y).ty && func.kind(x).is_identical_to(func.kind(y)))
        }
        _ => false,
    }
}

fn call_flags(kind: &InstKind) -> Option<crate::ir::CallFlags> {
    match kind {
        InstKind::Call { flags, .. } => Some(*flags),
        _ => None,
    }
}

pub fn hoist_then_else(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Terminator::CondBr {
        cond,
        if_true: bb1,
        if_false: bb2,
        ..
    } = *func.terminator(b)
    else {
        return false;
    };
    if bb1 == bb2 || bb1 == b || bb2 == b || func.address_taken(bb1) || func.address_taken(bb2) {
        return false;
    }

    let (mut c1, mut c2) = (0usize, 0usize);
    skip_debug(func, bb1, &mut c1, bb2, &mut c2);
    let (first1, first2) = (at(func, bb1, c1), at(func, bb2, c2));
    if matches!(first1, Item::Inst(i) if func.kind(i).is_phi())
        || !identical(func, bb1, first1, bb2, first2)
    {
        return false;
    }

    let mut changed = false;
    loop {
        match (at(func, bb1, c1), at(func, bb2, c2)) {
            (Item::Term, Item::Term) => return hoist_terminator(func, b, cond, bb1, bb2) || changed,
            (Item::Inst(i1), Item::Inst(i2)) => {
                let (f1, f2) = (call_flags(func.kind(i1)), call_flags(func.kind(i2)));
                if let (Some(f1), Some(f2)) = (f1, f2) {
                    if f1.musttail != f2.musttail {
                        return changed;
                    }
                }
                if !cx.cost.is_profitable_to_hoist(func, i1) || !cx.cost.is_profitable_to_hoist(func, i2) {
                    return changed;
                }
                if f1.is_some_and(|f| f.nomerge) || f2.is_some_and(|f| f.nomerge) {
                    return changed;
                }
                if func.kind(i1).is_debug() {
                    // Both markers survive; their locations cannot be merged.
                    func.move_inst_to_end(i1, b);
                    func.move_inst_to_end(i2, b);
                } else {
                    func.move_inst_to_end(i1, b);
                    func.replace_inst(i2, Value::Inst(i1));
                }
                trace!(block = %func.block_name(b), "hoisted common instruction");
                changed = true;
            }
            _ => return changed,
        }
        skip_debug(func, bb1, &mut c1, bb2, &mut c2);
        if !identical(func, bb1, at(func, bb1, c1), bb2, at(func, bb2, c2)) {
            return changed;
        }
    }
}

/// Replaces the branch in `b` with a copy of the arms' shared terminator.
fn hoist_terminator(func: &mut Function, b: BlockId, cond: Value, bb1: BlockId, bb2: BlockId) -> bool {
    let term = func.terminator(bb1).clone();
    let succs = func.unique_succs(bb1);
    let mut disagreeing = Vec::new();
    for &succ in &succs {
        for phi in func.phis(succ) {
            let (Some(v1), Some(v2)) = (func.phi_value(phi, bb1), func.phi_value(phi, bb2)) else {
                continue;
            };
            if v1 == v2 {
                continue;
            }
            // The unwind edge of a hoisted invoke has nowhere to place a select.
            if matches!(term, Terminator::Invoke { .. }) {
                return false;
            }
            if passing_value_is_always_undefined(func, v1, phi) || passing_value_is_always_undefined(func, v2, phi) {
                return false;
            }
            disagreeing.push((phi, v1, v2));
        }
    }

    let mut selects: HashMap<(Value, Value), Value> = HashMap::new();
    for (phi, v1, v2) in disagreeing {
        let sel = match selects.get(&(v1, v2)) {
            Some(&sel) => sel,
            None => {
                let ty = func.inst(phi).ty;
                let names = [value_name(func, v1), value_name(func, v2)];
                let name = if names.iter().any(|n| n.is_empty()) {
                    String::new()
                } else {
                    names.join(".")
                };
                let sel = emit(
                    func,
                    b,
                    InstKind::Select {
                        cond,
                        on_true: v1,
                        on_false: v2,
                    },
                    ty,
                    &name,
                );
                selects.insert((v1, v2), sel);
                sel
            }
        };
        func.set_phi_value(phi, bb1, sel);
        func.set_phi_value(phi, bb2, sel);
    }
    for &succ in &succs {
        func.add_phi_incoming_like(succ, b, bb1);
    }
    trace!(block = %func.block_name(b), "hoisted common terminator");
    replace_terminator(func, b, term);
    true
}
