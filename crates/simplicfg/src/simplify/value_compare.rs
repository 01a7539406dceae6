//! Folds over value-equality comparisons.
//!
//! A *value comparison* is a `switch` on `V`, or a conditional branch on a
//! single-use `icmp eq/ne V, K`. Both are viewed as a case list plus a
//! default destination, so a branch and a switch on the same `V` combine
//! freely:
//!
//! ```text
//!   entry: br (x == 1), r10, next          entry: switch x, r4 [1: r10,
//!   next:  br (x == 2), r20, r4      →                          2: r20]
//! ```
//!
//! The implied-condition fold lives here as well: a branch whose outcome is
//! fixed by the branch of its sole predecessor.

use super::utils::{dedup, replace_terminator, split_block_predecessors, successor_weights, to_metadata};
use crate::ir::eval::eval_cmp;
use crate::ir::{BlockId, CmpPred, Constant, Function, InstKind, SwitchCase, Terminator, Value};
use tracing::trace;

/// A terminator viewed as `switch value, default [cases]`.
#[derive(Debug, Clone)]
pub(crate) struct ValueComparison {
    pub value: Value,
    pub default: BlockId,
    pub cases: Vec<SwitchCase>,
    /// `[default, case 0, ...]`, when the terminator carries weights.
    pub weights: Option<Vec<u64>>,
}

impl ValueComparison {
    /// Cases that do not simply go to the default.
    fn explicit_cases(&self) -> Vec<SwitchCase> {
        self.cases
            .iter()
            .copied()
            .filter(|c| c.dest != self.default)
            .collect()
    }
}

/// Views the terminator of `b` as a value comparison.
///
/// Switches are only considered while `b` has few predecessors, so that
/// merging large switches into many predecessors stays bounded.
pub(crate) fn is_value_comparison(func: &Function, b: BlockId) -> Option<ValueComparison> {
    let term = func.terminator(b);
    match term {
        Terminator::Switch {
            cond,
            default,
            cases,
            ..
        } => {
            if func.preds(b).len() >= 128 / (cases.len() + 1) {
                return None;
            }
            Some(ValueComparison {
                value: *cond,
                default: *default,
                cases: cases.clone(),
                weights: successor_weights(term),
            })
        }
        Terminator::CondBr {
            cond: Value::Inst(c),
            if_true,
            if_false,
            weights,
        } => {
            if func.use_count(Value::Inst(*c)) != 1 {
                return None;
            }
            let InstKind::Cmp {
                pred,
                lhs,
                rhs: Value::Const(k),
            } = *func.kind(*c)
            else {
                return None;
            };
            if !pred.is_equality() || !k.ty().is_integer() {
                return None;
            }
            let eq = pred == CmpPred::Eq;
            let (dest, default) = if eq {
                (*if_true, *if_false)
            } else {
                (*if_false, *if_true)
            };
            let weights = weights.map(|[t, f]| {
                let (t, f) = (u64::from(t), u64::from(f));
                if eq {
                    vec![f, t]
                } else {
                    vec![t, f]
                }
            });
            Some(ValueComparison {
                value: lhs,
                default,
                cases: vec![SwitchCase { value: k, dest }],
                weights,
            })
        }
        _ => None,
    }
}

// ── Threading through the sole predecessor ───────────────────────────────────

/// Removes the switch cases of `b` whose value is in `dead`, with their
/// weights.
pub(super) fn prune_switch_cases(func: &mut Function, b: BlockId, dead: &[Constant]) {
    let Terminator::Switch {
        cond,
        default,
        cases,
        weights,
    } = func.terminator(b).clone()
    else {
        return;
    };
    let weights = weights.filter(|w| w.len() == cases.len() + 1);
    let mut kept = Vec::with_capacity(cases.len());
    let mut kept_weights = weights.as_ref().map(|w| vec![w[0]]);
    for (i, case) in cases.into_iter().enumerate() {
        if dead.contains(&case.value) {
            continue;
        }
        kept.push(case);
        if let (Some(kw), Some(w)) = (kept_weights.as_mut(), weights.as_ref()) {
            kw.push(w[i + 1]);
        }
    }
    func.set_terminator(
        b,
        Terminator::Switch {
            cond,
            default,
            cases: kept,
            weights: kept_weights,
        },
    );
}

/// When `b` and its sole predecessor compare the same value, the values that
/// can reach `b` are known and decide (or prune) `b`'s own comparison.
pub fn thread_with_only_predecessor(func: &mut Function, b: BlockId) -> bool {
    let Some(this) = is_value_comparison(func, b) else {
        return false;
    };
    let Some(pred) = func.single_pred(b) else {
        return false;
    };
    let Some(pc) = is_value_comparison(func, pred) else {
        return false;
    };
    if pc.value != this.value {
        return false;
    }
    let pred_cases = pc.explicit_cases();
    let this_cases = this.explicit_cases();

    if pc.default == b {
        // The value is none of the predecessor's explicit cases.
        let dead: Vec<Constant> = this_cases
            .iter()
            .map(|c| c.value)
            .filter(|v| pred_cases.iter().any(|p| p.value == *v))
            .collect();
        if dead.is_empty() {
            return false;
        }
        trace!(block = %func.block_name(b), dead = dead.len(), "cases excluded by predecessor");
        match func.terminator(b) {
            Terminator::CondBr { .. } => {
                replace_terminator(func, b, Terminator::Br { target: this.default });
            }
            _ => prune_switch_cases(func, b, &dead),
        }
        return true;
    }

    let mut known = None;
    for c in &pred_cases {
        if c.dest == b {
            if known.is_some() {
                return false;
            }
            known = Some(c.value);
        }
    }
    let Some(k) = known else {
        return false;
    };
    let target = this_cases
        .iter()
        .find(|c| c.value == k)
        .map_or(this.default, |c| c.dest);
    trace!(block = %func.block_name(b), value = k.as_i64(), "comparison decided by predecessor");
    replace_terminator(func, b, Terminator::Br { target });
    true
}

// ── Folding into predecessors ────────────────────────────────────────────────

/// Successors shared by `b` and `pred` whose PHIs see different values from
/// the two blocks.
fn conflicting_successors(func: &Function, b: BlockId, pred: BlockId) -> Vec<BlockId> {
    let b_succs = func.unique_succs(b);
    func.unique_succs(pred)
        .into_iter()
        .filter(|s| b_succs.contains(s))
        .filter(|&s| {
            func.phis(s)
                .iter()
                .any(|&phi| func.phi_value(phi, b) != func.phi_value(phi, pred))
        })
        .collect()
}

/// Merges the comparison of `b` into the comparison of `pred`, which
/// compares the same value and branches to `b`.
fn fold_into_predecessor(func: &mut Function, b: BlockId, pred: BlockId) {
    let (Some(this), Some(pc)) = (is_value_comparison(func, b), is_value_comparison(func, pred)) else {
        return;
    };
    let has_weights = this.weights.is_some() || pc.weights.is_some();
    let mut weights = pc.weights.unwrap_or_else(|| vec![1; pc.cases.len() + 1]);
    let succ_weights = this.weights.unwrap_or_else(|| vec![1; this.cases.len() + 1]);
    let mut default = pc.default;
    let mut cases: Vec<SwitchCase> = Vec::new();
    let mut new_succs: Vec<BlockId> = Vec::new();

    if pc.default == b {
        // b sees every value the predecessor does not handle explicitly.
        let mut handled: Vec<Constant> = Vec::new();
        let mut kept_weights = vec![weights[0]];
        for (i, c) in pc.cases.iter().enumerate() {
            if c.dest == b {
                kept_weights[0] += weights[i + 1];
            } else {
                handled.push(c.value);
                cases.push(*c);
                kept_weights.push(weights[i + 1]);
            }
        }
        weights = kept_weights;
        if default != this.default {
            default = this.default;
            new_succs.push(this.default);
        }
        let from_pred = weights.len();
        let mut valid_total = 0u64;
        for (i, c) in this.cases.iter().enumerate() {
            if handled.contains(&c.value) || c.dest == this.default {
                continue;
            }
            cases.push(*c);
            new_succs.push(c.dest);
            weights.push(weights[0].saturating_mul(succ_weights[i + 1]));
            valid_total += succ_weights[i + 1];
        }
        valid_total += succ_weights[0];
        for w in &mut weights[1..from_pred] {
            *w = w.saturating_mul(valid_total);
        }
        weights[0] = weights[0].saturating_mul(succ_weights[0]);
    } else {
        // Only the values the predecessor sends to b are decided by b.
        let mut handled: Vec<(Constant, u64)> = Vec::new();
        let mut kept_weights = vec![weights[0]];
        for (i, c) in pc.cases.iter().enumerate() {
            if c.dest == b {
                handled.push((c.value, weights[i + 1]));
            } else {
                cases.push(*c);
                kept_weights.push(weights[i + 1]);
            }
        }
        weights = kept_weights;
        for c in &this.cases {
            if let Some(pos) = handled.iter().position(|(v, _)| *v == c.value) {
                let (_, w) = handled.remove(pos);
                cases.push(*c);
                weights.push(w);
                new_succs.push(c.dest);
            }
        }
        for (value, w) in handled {
            cases.push(SwitchCase {
                value,
                dest: this.default,
            });
            weights.push(w);
            new_succs.push(this.default);
        }
    }

    for s in dedup(&new_succs) {
        if s != b {
            func.add_phi_incoming_like(s, pred, b);
        }
    }

    // Values for which b branches to itself loop forever.
    let loops_to_b = default == b || cases.iter().any(|c| c.dest == b);
    if loops_to_b {
        let infloop = func.add_block("infloop");
        func.set_terminator(infloop, Terminator::Br { target: infloop });
        if default == b {
            default = infloop;
        }
        for c in cases.iter_mut().filter(|c| c.dest == b) {
            c.dest = infloop;
        }
    }

    trace!(from = %func.block_name(b), into = %func.block_name(pred), cases = cases.len(), "folding value comparison");
    let weights = if has_weights { to_metadata(weights) } else { None };
    replace_terminator(
        func,
        pred,
        Terminator::Switch {
            cond: this.value,
            default,
            cases,
            weights,
        },
    );
}

/// Folds the comparison of `b` into every predecessor comparing the same
/// value, when `b` holds nothing but its own compare.
pub fn fold_into_predecessors_if_trivial(func: &mut Function, b: BlockId) -> bool {
    let Some(this) = is_value_comparison(func, b) else {
        return false;
    };
    let real: Vec<Value> = func
        .insts(b)
        .iter()
        .filter(|&&i| !func.kind(i).is_debug())
        .map(|&i| Value::Inst(i))
        .collect();
    let trivial = match func.terminator(b) {
        Terminator::Switch { .. } => real.is_empty(),
        Terminator::CondBr { cond, .. } => real.as_slice() == [*cond],
        _ => false,
    };
    if !trivial {
        return false;
    }

    let mut changed = false;
    for pred in dedup(func.preds(b)).into_iter().rev() {
        if pred == b || !func.has_edge(pred, b) {
            continue;
        }
        match is_value_comparison(func, pred) {
            Some(pc) if pc.value == this.value => {}
            _ => continue,
        }
        for s in conflicting_successors(func, b, pred) {
            if split_block_predecessors(func, s, &[b], ".fold.split").is_none() {
                return changed;
            }
        }
        fold_into_predecessor(func, b, pred);
        changed = true;
    }
    changed
}

// ── Implied conditions ───────────────────────────────────────────────────────

/// Value of `cond` given that `known_cond` evaluated to `known`.
fn implied_value(func: &Function, known_cond: Value, known: bool, cond: Value) -> Option<bool> {
    if cond == known_cond {
        return Some(known);
    }
    let (Some(ki), Some(ci)) = (known_cond.as_inst(), cond.as_inst()) else {
        return None;
    };
    let InstKind::Cmp {
        pred: kp,
        lhs: kl,
        rhs: kr,
    } = *func.kind(ki)
    else {
        return None;
    };
    let InstKind::Cmp {
        pred: cp,
        lhs: cl,
        rhs: cr,
    } = *func.kind(ci)
    else {
        return None;
    };
    if kl != cl {
        return None;
    }
    if kr == cr {
        if cp == kp {
            return Some(known);
        }
        if cp == kp.inverse() {
            return Some(!known);
        }
    }
    let (Value::Const(kc), Value::Const(cc)) = (kr, cr) else {
        return None;
    };
    let equal = match kp {
        CmpPred::Eq => known,
        CmpPred::Ne => !known,
        _ => return None,
    };
    if equal {
        // The compared value is exactly kc.
        return Some(eval_cmp(cp, kc, cc));
    }
    if kc == cc && cp.is_equality() {
        return Some(cp == CmpPred::Ne);
    }
    None
}

/// Resolves the conditional branch of `b` when the branch of its sole
/// predecessor already decides it.
pub fn fold_implied_condition(func: &mut Function, b: BlockId) -> bool {
    let Terminator::CondBr {
        cond,
        if_true,
        if_false,
        ..
    } = *func.terminator(b)
    else {
        return false;
    };
    if matches!(cond, Value::Const(_)) {
        return false;
    }
    let Some(pred) = func.single_pred(b) else {
        return false;
    };
    let Terminator::CondBr {
        cond: pred_cond,
        if_true: pt,
        if_false: pf,
        ..
    } = *func.terminator(pred)
    else {
        return false;
    };
    if pt == pf || pred == b {
        return false;
    }
    let Some(taken) = implied_value(func, pred_cond, pt == b, cond) else {
        return false;
    };
    let target = if taken { if_true } else { if_false };
    trace!(block = %func.block_name(b), taken, "condition implied by predecessor");
    replace_terminator(func, b, Terminator::Br { target });
    true
}
