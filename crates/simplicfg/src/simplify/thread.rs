//! Threading a branch on a PHI through its block.
//!
//! When a block branches on one of its own PHIs and some predecessors feed
//! that PHI a constant, those predecessors already know where the branch
//! goes. Their edges are split off into a new block that runs a copy of the
//! (small) block body and jumps straight to the known destination:
//!
//! ```text
//!   a: br join                      a: ...body copy...
//!   join: %p = phi [true, a], ...  →   br t
//!         ...body...
//!         br %p, t, f               join: %p = phi ...
//! ```

use super::merge_blocks::merge_into_predecessor;
use super::utils::split_block_predecessors;
use crate::ir::eval::fold_constant_operands;
use crate::ir::{BlockId, Function, Terminator, User, Value};
use std::collections::HashMap;
use tracing::trace;

/// Largest block body, terminator included, that is copied per threaded
/// edge.
const MAX_THREADED_BLOCK_SIZE: usize = 10;

/// Small enough to copy, and no value of `b` is used outside of it.
pub(crate) fn simple_enough_to_thread_through(func: &Function, b: BlockId) -> bool {
    let mut size = 1;
    for &i in func.insts(b) {
        let kind = func.kind(i);
        if kind.is_debug() {
            continue;
        }
        if !kind.is_phi() {
            size += 1;
            if size > MAX_THREADED_BLOCK_SIZE {
                return false;
            }
        }
        let local = func.users(Value::Inst(i)).into_iter().all(|u| match u {
            User::Term(t) => t == b,
            User::Inst(ui) => func.inst_block(ui) == Some(b) && !func.kind(ui).is_phi(),
        });
        if !local {
            return false;
        }
    }
    true
}

pub fn fold_branch_on_phi(func: &mut Function, b: BlockId) -> bool {
    let Terminator::CondBr {
        cond,
        if_true,
        if_false,
        ..
    } = *func.terminator(b)
    else {
        return false;
    };
    let Value::Inst(pn) = cond else {
        return false;
    };
    if !func.kind(pn).is_phi() || func.inst_block(pn) != Some(b) {
        return false;
    }
    let incoming = func.phi_incoming(pn).to_vec();
    if let [(_, only)] = incoming.as_slice() {
        func.replace_inst(pn, *only);
        return true;
    }

    // Predecessors grouped by the branch direction they already know.
    let mut known: Vec<(bool, Vec<BlockId>)> = Vec::new();
    for (p, v) in incoming {
        let Value::Const(c) = v else {
            continue;
        };
        let taken = !c.is_zero();
        match known.iter_mut().find(|(k, _)| *k == taken) {
            Some((_, preds)) => preds.push(p),
            None => known.push((taken, vec![p])),
        }
    }
    if known.is_empty() || !simple_enough_to_thread_through(func, b) {
        return false;
    }

    for (taken, preds) in known {
        let real_dest = if taken { if_true } else { if_false };
        if real_dest == b {
            continue;
        }
        let Some(edge) = split_block_predecessors(func, b, &preds, ".critedge") else {
            continue;
        };
        let name = format!("{}.critedge", func.block_name(real_dest));
        func.set_block_name(edge, name);
        trace!(block = %func.block_name(b), to = %func.block_name(real_dest), "threading branch on phi");
        func.add_phi_incoming_like(real_dest, edge, b);

        let mut translate: HashMap<Value, Value> = HashMap::new();
        for i in func.insts(b).to_vec() {
            let kind = func.kind(i);
            if kind.is_debug() {
                continue;
            }
            if kind.is_phi() {
                let ty = func.inst(i).ty;
                let v = func.phi_value(i, edge).unwrap_or(Value::Undef(ty));
                translate.insert(Value::Inst(i), v);
                continue;
            }
            let copy = func.clone_inst_to_end(i, edge);
            func.inst_mut(copy).kind.for_each_operand_mut(|v| {
                if let Some(&t) = translate.get(v) {
                    *v = t;
                }
            });
            if let Some(name) = func.inst(i).name.clone() {
                func.set_inst_name(copy, format!("{name}.c"));
            }
            match fold_constant_operands(func, copy) {
                Some(c) => {
                    translate.insert(Value::Inst(i), Value::Const(c));
                    func.remove_inst(copy);
                }
                None => {
                    translate.insert(Value::Inst(i), Value::Inst(copy));
                }
            }
        }
        func.set_terminator(edge, Terminator::Br { target: real_dest });
        merge_into_predecessor(func, edge);
        return true;
    }
    false
}
