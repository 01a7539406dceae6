//! Branch-to-common-destination folding.
//!
//! A conditional branch whose predecessor also branches conditionally to
//! one of its successors is merged into that predecessor by combining the
//! two conditions:
//!
//! ```text
//!   pred: br %a, bb, F             pred: %or.cond = and %a, %b
//!   bb:   br %b, T, F        →           br %or.cond, T, F
//! ```
//!
//! The instructions `bb` needs to compute `%b` ("bonus" instructions) are
//! cloned into the predecessor; `bb` itself is left for dead-block removal
//! once it loses its last predecessor.
//!
//! An empty block branching on a condition computed elsewhere is merged into
//! a predecessor branch the same way, with `select`s feeding the shared
//! destination's PHIs. When both branches test the same condition, the
//! outcome in `bb` is known per predecessor.

use super::thread::simple_enough_to_thread_through;
use super::utils::{emit, emit_not, to_branch_metadata, value_name};
use super::Cx;
use crate::ir::{BinOp, BlockId, Constant, Function, InstId, InstKind, Terminator, Type, User, Value};
use std::collections::HashMap;
use tracing::trace;

/// Cost of the combining `and`/`or` (plus a `not`) above which the fold is
/// not done.
const BRANCH_FOLD_THRESHOLD: u32 = 2;

/// How the condition of a predecessor combines with the one of `bb`.
#[derive(Debug, Clone, Copy)]
struct Recipe {
    op: BinOp,
    /// The predecessor's condition is negated first.
    invert_pred: bool,
}

fn branch_parts(term: &Terminator) -> Option<(Value, BlockId, BlockId, Option<[u32; 2]>)> {
    match *term {
        Terminator::CondBr {
            cond,
            if_true,
            if_false,
            weights,
        } => Some((cond, if_true, if_false, weights)),
        _ => None,
    }
}

/// Picks the combining operation for `pred -> b`, unless the predecessor's
/// branch is predictable enough that speculating `b`'s condition would not
/// pay off.
fn fold_recipe(func: &Function, b: BlockId, pred: BlockId, cx: &Cx) -> Option<Recipe> {
    let (_, bt, bf, _) = branch_parts(func.terminator(b))?;
    let (_, pt, pf, weights) = branch_parts(func.terminator(pred))?;
    let pct = u64::from(cx.cost.predictable_branch_percent());
    let (likely_true, likely_false) = match weights {
        Some([t, f]) if u64::from(t) + u64::from(f) != 0 => {
            let total = u64::from(t) + u64::from(f);
            (u64::from(t) * 100 >= pct * total, u64::from(f) * 100 >= pct * total)
        }
        _ => (false, false),
    };
    let recipe = |op, invert_pred| Recipe { op, invert_pred };
    if pt == bt {
        (!likely_true).then(|| recipe(BinOp::Or, false))
    } else if pf == bf {
        (!likely_false).then(|| recipe(BinOp::And, false))
    } else if pt == bf {
        (!likely_true).then(|| recipe(BinOp::And, true))
    } else if pf == bt {
        (!likely_false).then(|| recipe(BinOp::Or, true))
    } else {
        None
    }
}

/// PHIs of successors shared by `a` and `b` receive the same value from
/// both blocks.
pub(crate) fn safe_to_merge_terminators(func: &Function, a: BlockId, b: BlockId) -> bool {
    if a == b {
        return false;
    }
    let a_succs = func.unique_succs(a);
    func.unique_succs(b)
        .into_iter()
        .filter(|s| a_succs.contains(s))
        .all(|s| {
            func.phis(s)
                .iter()
                .all(|&phi| func.phi_value(phi, a) == func.phi_value(phi, b))
        })
}

/// Swaps the successors of the conditional branch ending `b` and negates its
/// condition, in place when it is a single-use compare.
pub(crate) fn invert_branch(func: &mut Function, b: BlockId) {
    let Some((cond, if_true, if_false, weights)) = branch_parts(func.terminator(b)) else {
        return;
    };
    let single_use_cmp = cond
        .as_inst()
        .filter(|&c| func.use_count(cond) == 1 && matches!(func.kind(c), InstKind::Cmp { .. }));
    let cond = match single_use_cmp {
        Some(c) => {
            if let InstKind::Cmp { pred, .. } = &mut func.inst_mut(c).kind {
                *pred = pred.inverse();
            }
            cond
        }
        None => emit_not(func, b, cond),
    };
    func.set_terminator(
        b,
        Terminator::CondBr {
            cond,
            if_true: if_false,
            if_false: if_true,
            weights: weights.map(|[t, f]| [f, t]),
        },
    );
}

/// Every use of `i` is later in `b` or a PHI entry for the edge from `b`,
/// so a clone in the predecessor only needs to take over PHI entries.
fn uses_stay_block_closed(func: &Function, b: BlockId, i: InstId) -> bool {
    let v = Value::Inst(i);
    func.users(v).into_iter().all(|u| match u {
        User::Term(tb) => tb == b,
        User::Inst(ui) if func.kind(ui).is_phi() => func
            .phi_incoming(ui)
            .iter()
            .all(|&(pred, x)| x != v || pred == b),
        User::Inst(ui) => func.inst_block(ui) == Some(b) && func.position(ui) > func.position(i),
    })
}

pub fn fold_branch_to_common_dest(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Some((cond, if_true, if_false, _)) = branch_parts(func.terminator(b)) else {
        return false;
    };
    let Value::Inst(ci) = cond else {
        return false;
    };
    if func.inst_block(ci) != Some(b)
        || !matches!(
            func.kind(ci),
            InstKind::Cmp { .. } | InstKind::Binary { .. } | InstKind::Select { .. }
        )
        || func.use_count(cond) != 1
    {
        return false;
    }
    if if_true == b || if_false == b {
        return false;
    }

    let mut preds = Vec::new();
    for p in func.unique_preds(b) {
        if p == b || !func.terminator(p).is_cond_br() || !safe_to_merge_terminators(func, b, p) {
            continue;
        }
        let Some(recipe) = fold_recipe(func, b, p, cx) else {
            continue;
        };
        let mut cost = cx.cost.arithmetic_cost(recipe.op, Type::I1);
        if recipe.invert_pred {
            let pc = func.terminator(p).condition();
            let cmp_in_place = pc.is_some_and(|pc| {
                func.use_count(pc) == 1
                    && pc
                        .as_inst()
                        .is_some_and(|i| matches!(func.kind(i), InstKind::Cmp { .. }))
            });
            if !cmp_in_place {
                cost += cx.cost.arithmetic_cost(BinOp::Xor, Type::I1);
            }
        }
        if cost <= BRANCH_FOLD_THRESHOLD {
            preds.push(p);
        }
    }
    let Some(&pred) = preds.first() else {
        return false;
    };

    // Bonus instructions are cloned into every qualifying predecessor.
    let pred_count = preds.len() as u32;
    let mut bonus = 0u32;
    for &i in func.insts(b) {
        if i == ci || func.kind(i).is_debug() {
            continue;
        }
        if !cx.cost.is_safe_to_speculate(func, i) {
            return false;
        }
        if cx.cost.speculation_cost(func, i) != 0 {
            bonus += pred_count;
            if bonus > cx.opts.bonus_instruction_budget {
                return false;
            }
        }
        if !uses_stay_block_closed(func, b, i) {
            return false;
        }
    }

    perform_fold(func, b, pred, cx);
    true
}

fn perform_fold(func: &mut Function, b: BlockId, pred: BlockId, cx: &Cx) {
    let Some(recipe) = fold_recipe(func, b, pred, cx) else {
        return;
    };
    trace!(block = %func.block_name(b), into = %func.block_name(pred), op = recipe.op.mnemonic(), "folding branch to common destination");
    if recipe.invert_pred {
        invert_branch(func, pred);
    }
    let Some((pcond, pt, pf, pw)) = branch_parts(func.terminator(pred)) else {
        return;
    };
    let Some((bcond, bt, bf, bw)) = branch_parts(func.terminator(b)) else {
        return;
    };
    let unique_succ = if pt == b { bt } else { bf };
    func.add_phi_incoming_like(unique_succ, pred, b);

    let weights = if pw.is_some() || bw.is_some() {
        let [ptw, pfw] = pw.map_or([1, 1], |w| w.map(u64::from));
        let [stw, sfw] = bw.map_or([1, 1], |w| w.map(u64::from));
        if pt == b {
            to_branch_metadata(ptw * stw, pfw * (sfw + stw) + ptw * sfw)
        } else {
            to_branch_metadata(ptw * (sfw + stw) + pfw * stw, pfw * sfw)
        }
    } else {
        None
    };

    let mut cloned: HashMap<InstId, Value> = HashMap::new();
    for i in func.insts(b).to_vec() {
        if func.kind(i).is_debug() {
            continue;
        }
        let copy = func.clone_inst_to_end(i, pred);
        func.inst_mut(copy).kind.for_each_operand_mut(|v| {
            if let Value::Inst(x) = v {
                if let Some(&c) = cloned.get(x) {
                    *v = c;
                }
            }
        });
        if let Some(name) = func.inst(i).name.clone() {
            func.set_inst_name(i, format!("{name}.old"));
        }
        cloned.insert(i, Value::Inst(copy));
        // PHI entries for the new edge from pred read the clone.
        for u in func.users(Value::Inst(i)) {
            if let User::Inst(phi) = u {
                if func.kind(phi).is_phi() && func.phi_value(phi, pred) == Some(Value::Inst(i)) {
                    func.set_phi_value(phi, pred, Value::Inst(copy));
                }
            }
        }
    }

    let Some(&new_bcond) = bcond.as_inst().and_then(|c| cloned.get(&c)) else {
        return;
    };
    let or_cond = emit(
        func,
        pred,
        InstKind::Binary {
            op: recipe.op,
            lhs: pcond,
            rhs: new_bcond,
        },
        Type::I1,
        "or.cond",
    );
    let (if_true, if_false) = if pt == b { (unique_succ, pf) } else { (pt, unique_succ) };
    func.set_terminator(
        pred,
        Terminator::CondBr {
            cond: or_cond,
            if_true,
            if_false,
            weights,
        },
    );
}

// ── Branch to branch ─────────────────────────────────────────────────────────

/// Most PHIs the shared destination may have before the merge is not done.
const MAX_COMMON_DEST_PHIS: usize = 3;

/// Merges the conditional branch ending `b` into a conditional branch of one
/// of its predecessors.
pub fn fold_cond_branch_to_cond_branch(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    if branch_parts(func.terminator(b)).is_none() {
        return false;
    }
    for pred in func.unique_preds(b) {
        if pred == b || !func.terminator(pred).is_cond_br() {
            continue;
        }
        if fold_same_condition(func, pred, b) || merge_into_predecessor_branch(func, pred, b, cx) {
            return true;
        }
    }
    false
}

/// `pred` and `b` branch on the same condition, so `b`'s outcome is known
/// on the edge from `pred`.
fn fold_same_condition(func: &mut Function, pred: BlockId, b: BlockId) -> bool {
    let Some((pcond, pt, pf, _)) = branch_parts(func.terminator(pred)) else {
        return false;
    };
    let Some((cond, ..)) = branch_parts(func.terminator(b)) else {
        return false;
    };
    if pcond != cond || pt == pf || cond.as_const().is_some() {
        return false;
    }

    let known = if func.single_pred(b) == Some(pred) {
        Value::Const(Constant::bool(pt == b))
    } else {
        // The outcome per predecessor goes through a PHI that branch-on-PHI
        // threading can then consume.
        let defined_in_b = cond.as_inst().is_some_and(|i| func.inst_block(i) == Some(b));
        if defined_in_b || !simple_enough_to_thread_through(func, b) {
            return false;
        }
        let incoming = func
            .unique_preds(b)
            .into_iter()
            .map(|p| {
                let v = match branch_parts(func.terminator(p)) {
                    Some((c, t, f, _)) if c == cond && t != f => Value::Const(Constant::bool(t == b)),
                    _ => cond,
                };
                (p, v)
            })
            .collect();
        let phi = func.insert_phi(b, Type::I1, incoming);
        func.set_inst_name(phi, format!("{}.pr", value_name(func, cond)));
        Value::Inst(phi)
    };
    trace!(block = %func.block_name(b), pred = %func.block_name(pred), "branch condition known from predecessor");
    func.update_terminator(b, |t| {
        if let Terminator::CondBr { cond, .. } = t {
            *cond = known;
        }
    });
    true
}

/// ```text
///   pred: br %a, C, bb              pred: %brmerge = or %a, %b
///   bb:   br %b, C, O         →           br %brmerge, C, O
/// ```
///
/// `bb` holds nothing but its branch. PHIs of `C` that disagree between
/// `pred` and `bb` read `select %a, <pred value>, <bb value>`.
fn merge_into_predecessor_branch(func: &mut Function, pred: BlockId, b: BlockId, cx: &Cx) -> bool {
    let Some((pcond, pt, pf, pw)) = branch_parts(func.terminator(pred)) else {
        return false;
    };
    let Some((cond, bt, bf, bw)) = branch_parts(func.terminator(b)) else {
        return false;
    };
    if bt == bf || !func.insts(b).iter().all(|&i| func.kind(i).is_debug()) {
        return false;
    }
    let (pred_succs, succs) = ([pt, pf], [bt, bf]);
    let Some((pop, op)) = [(0, 0), (0, 1), (1, 0), (1, 1)]
        .into_iter()
        .find(|&(p, s)| pred_succs[p] == succs[s])
    else {
        return false;
    };
    let common = pred_succs[pop];
    if common == b || func.phis(common).len() > MAX_COMMON_DEST_PHIS {
        return false;
    }
    // A predecessor that almost always goes to the shared destination
    // gains nothing from evaluating `b`'s condition.
    if let Some(w) = pw {
        let total = u64::from(w[0]) + u64::from(w[1]);
        let pct = u64::from(cx.cost.predictable_branch_percent());
        if total != 0 && u64::from(w[pop]) * 100 >= pct * total {
            return false;
        }
    }

    let mut other = succs[op ^ 1];
    if other == b {
        let infloop = func.add_block("infloop");
        func.set_terminator(infloop, Terminator::Br { target: infloop });
        other = infloop;
    }
    trace!(block = %func.block_name(b), into = %func.block_name(pred), "merging conditional branch into predecessor branch");

    let pcond = if pop == 1 { emit_not(func, pred, pcond) } else { pcond };
    let cond = if op == 1 { emit_not(func, pred, cond) } else { cond };
    let merged = emit(
        func,
        pred,
        InstKind::Binary {
            op: BinOp::Or,
            lhs: pcond,
            rhs: cond,
        },
        Type::I1,
        "brmerge",
    );

    let weights = if pw.is_some() || bw.is_some() {
        let pw = pw.map_or([1, 1], |w| w.map(u64::from));
        let bw = bw.map_or([1, 1], |w| w.map(u64::from));
        let (pred_common, pred_other) = (pw[pop], pw[pop ^ 1]);
        let (succ_common, succ_other) = (bw[op], bw[op ^ 1]);
        to_branch_metadata(
            pred_common
                .saturating_mul(succ_common + succ_other)
                .saturating_add(pred_other * succ_common),
            pred_other * succ_other,
        )
    } else {
        None
    };
    func.set_terminator(
        pred,
        Terminator::CondBr {
            cond: merged,
            if_true: common,
            if_false: other,
            weights,
        },
    );
    func.add_phi_incoming_like(other, pred, b);

    for phi in func.phis(common) {
        let (Some(bv), Some(pv)) = (func.phi_value(phi, b), func.phi_value(phi, pred)) else {
            continue;
        };
        if bv == pv {
            continue;
        }
        let ty = func.inst(phi).ty;
        let name = format!("{}.mux", value_name(func, pv));
        let mux = emit(
            func,
            pred,
            InstKind::Select {
                cond: pcond,
                on_true: pv,
                on_false: bv,
            },
            ty,
            &name,
        );
        func.set_phi_value(phi, pred, mux);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_function, CmpPred};
    use crate::oracle::TargetCostModel;
    use crate::simplify::SimplifyOptions;

    fn fold(f: &mut Function, block: &str) -> bool {
        let b = f.block_by_name(block).unwrap();
        let opts = SimplifyOptions::default();
        let cx = Cx {
            cost: &TargetCostModel,
            opts: &opts,
        };
        fold_branch_to_common_dest(f, b, &cx)
    }

    fn or_cond(f: &Function) -> InstId {
        let cond = f.terminator(f.entry()).condition().unwrap();
        let i = cond.as_inst().unwrap();
        assert_eq!(f.inst(i).name.as_deref(), Some("or.cond"));
        i
    }

    //   entry: br c1, a, b
    //   a:     br c2, c, b      → entry: br (c1 & c2), c, b
    #[test]
    fn shared_false_destination_ands_conditions() {
        let mut f = parse_function(
            "
func @f(i32 %x, i32 %y) -> i32 {
entry:
  %c1 = icmp eq i32 %x, 0
  br %c1, label %a, label %b !prof 3, 1
a:
  %c2 = icmp slt i32 %y, 5
  br %c2, label %c, label %b !prof 1, 1
c:
  ret i32 1
b:
  ret i32 2
}
",
        )
        .unwrap();
        let [a, b, c] = ["a", "b", "c"].map(|n| f.block_by_name(n).unwrap());
        assert!(fold(&mut f, "a"));
        match f.terminator(f.entry()) {
            Terminator::CondBr {
                if_true,
                if_false,
                weights,
                ..
            } => {
                assert_eq!((*if_true, *if_false), (c, b));
                // 3/4 · 1/2 of the flow reaches c.
                assert_eq!(*weights, Some([3, 5]));
            }
            other => panic!("expected a conditional branch, got {other:?}"),
        }
        let i = or_cond(&f);
        assert!(matches!(f.kind(i), InstKind::Binary { op: BinOp::And, .. }));
        assert!(f.preds(a).is_empty());
    }

    #[test]
    fn predecessor_condition_is_inverted_in_place() {
        let mut f = parse_function(
            "
func @f(i32 %x, i32 %y) -> i32 {
entry:
  %c1 = icmp eq i32 %x, 0
  br %c1, label %b, label %a
a:
  %c2 = icmp slt i32 %y, 5
  br %c2, label %c, label %b
c:
  ret i32 1
b:
  ret i32 2
}
",
        )
        .unwrap();
        assert!(fold(&mut f, "a"));
        let c1 = f.insts(f.entry())[0];
        assert!(matches!(f.kind(c1), InstKind::Cmp { pred: CmpPred::Ne, .. }));
        let c = f.block_by_name("c").unwrap();
        let b = f.block_by_name("b").unwrap();
        match f.terminator(f.entry()) {
            Terminator::CondBr {
                if_true, if_false, ..
            } => assert_eq!((*if_true, *if_false), (c, b)),
            other => panic!("expected a conditional branch, got {other:?}"),
        }
    }

    #[test]
    fn bonus_instruction_feeds_successor_phi() {
        let mut f = parse_function(
            "
func @f(i1 %c1, i32 %y) -> i32 {
entry:
  br %c1, label %c, label %a
a:
  %t = add i32 %y, 1
  %c2 = icmp slt i32 %t, 5
  br %c2, label %c, label %b
c:
  %p = phi i32 [ 0, %entry ], [ %t, %a ]
  ret i32 %p
b:
  ret i32 2
}
",
        )
        .unwrap();
        // entry and a both reach c with different values: not mergeable.
        assert!(!fold(&mut f, "a"));
    }

    #[test]
    fn bonus_instruction_is_cloned_and_renamed() {
        let mut f = parse_function(
            "
func @f(i1 %c1, i32 %y) -> i32 {
entry:
  br %c1, label %a, label %b
a:
  %t = add i32 %y, 1
  %c2 = icmp slt i32 %t, 5
  br %c2, label %c, label %b
c:
  %p = phi i32 [ %t, %a ]
  ret i32 %p
b:
  ret i32 2
}
",
        )
        .unwrap();
        let c = f.block_by_name("c").unwrap();
        assert!(fold(&mut f, "a"));
        let phi = f.phis(c)[0];
        let clone = f.phi_value(phi, f.entry()).and_then(|v| v.as_inst()).unwrap();
        assert_eq!(f.inst_block(clone), Some(f.entry()));
        assert_eq!(f.inst(clone).name.as_deref(), Some("t"));
        let a = f.block_by_name("a").unwrap();
        assert_eq!(f.inst(f.insts(a)[0]).name.as_deref(), Some("t.old"));
    }

    #[test]
    fn too_many_bonus_instructions() {
        let mut f = parse_function(
            "
func @f(i1 %c1, i32 %y) -> i32 {
entry:
  br %c1, label %a, label %b
a:
  %t = add i32 %y, 1
  %u = mul i32 %t, 3
  %c2 = icmp slt i32 %u, 5
  br %c2, label %c, label %b
c:
  ret i32 1
b:
  ret i32 2
}
",
        )
        .unwrap();
        assert!(!fold(&mut f, "a"));
    }

    #[test]
    fn predictable_predecessor_is_left_alone() {
        let mut f = parse_function(
            "
func @f(i32 %x, i32 %y) -> i32 {
entry:
  %c1 = icmp eq i32 %x, 0
  br %c1, label %c, label %a !prof 1000, 1
a:
  %c2 = icmp slt i32 %y, 5
  br %c2, label %c, label %b
c:
  ret i32 1
b:
  ret i32 2
}
",
        )
        .unwrap();
        assert!(!fold(&mut f, "a"));
    }

    // ── Branch to branch ──

    fn merge(f: &mut Function, block: &str) -> bool {
        let b = f.block_by_name(block).unwrap();
        let opts = SimplifyOptions::default();
        let cx = Cx {
            cost: &TargetCostModel,
            opts: &opts,
        };
        fold_cond_branch_to_cond_branch(f, b, &cx)
    }

    fn entry_branch(f: &Function) -> (InstId, BlockId, BlockId, Option<[u32; 2]>) {
        let Terminator::CondBr {
            cond,
            if_true,
            if_false,
            weights,
        } = *f.terminator(f.entry())
        else {
            panic!("expected a conditional branch");
        };
        (cond.as_inst().unwrap(), if_true, if_false, weights)
    }

    //   entry: br p, t, mid
    //   mid:   br q, t, f        → entry: br (p | q), t, f
    #[test]
    fn empty_block_merges_into_predecessor_branch() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q) -> i32 {
entry:
  br %p, label %t, label %mid !prof 1, 3
mid:
  br %q, label %t, label %e !prof 1, 1
t:
  %r = phi i32 [ 1, %entry ], [ 2, %mid ]
  ret i32 %r
e:
  ret i32 3
}
",
        )
        .unwrap();
        let (t, e) = (f.block_by_name("t").unwrap(), f.block_by_name("e").unwrap());
        assert!(merge(&mut f, "mid"));

        let (merged, if_true, if_false, weights) = entry_branch(&f);
        assert_eq!(f.inst(merged).name.as_deref(), Some("brmerge"));
        assert_eq!(
            *f.kind(merged),
            InstKind::Binary {
                op: BinOp::Or,
                lhs: Value::Arg(0),
                rhs: Value::Arg(1)
            }
        );
        assert_eq!((if_true, if_false), (t, e));
        assert_eq!(weights, Some([5, 3]));

        let phi = f.phis(t)[0];
        let mux = f.phi_value(phi, f.entry()).and_then(|v| v.as_inst()).unwrap();
        assert_eq!(
            *f.kind(mux),
            InstKind::Select {
                cond: Value::Arg(0),
                on_true: Value::constant(Type::I32, 1),
                on_false: Value::constant(Type::I32, 2)
            }
        );
        let mid = f.block_by_name("mid").unwrap();
        assert!(f.preds(mid).is_empty());
        crate::verify::assert_valid(&f);
    }

    //   entry: br p, mid, t
    //   mid:   br q, e, t        → entry: br (!p | !q), t, e
    #[test]
    fn shared_false_sides_negate_both_conditions() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q) -> i32 {
entry:
  br %p, label %mid, label %t
mid:
  br %q, label %e, label %t
t:
  ret i32 1
e:
  ret i32 3
}
",
        )
        .unwrap();
        let (t, e) = (f.block_by_name("t").unwrap(), f.block_by_name("e").unwrap());
        assert!(merge(&mut f, "mid"));
        let (merged, if_true, if_false, weights) = entry_branch(&f);
        assert_eq!((if_true, if_false, weights), (t, e, None));
        let InstKind::Binary { op: BinOp::Or, lhs, rhs } = *f.kind(merged) else {
            panic!("expected an or");
        };
        let names: Vec<_> = [lhs, rhs]
            .iter()
            .map(|v| f.inst(v.as_inst().unwrap()).name.clone().unwrap())
            .collect();
        assert_eq!(names, ["p.not", "q.not"]);
    }

    #[test]
    fn self_loop_becomes_infloop_block() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q) -> i32 {
entry:
  br %p, label %t, label %spin
spin:
  br %q, label %t, label %spin
t:
  ret i32 1
}
",
        )
        .unwrap();
        assert!(merge(&mut f, "spin"));
        let (_, _, if_false, _) = entry_branch(&f);
        assert_eq!(f.block_name(if_false), "infloop");
        assert_eq!(f.terminator(if_false), &Terminator::Br { target: if_false });
    }

    #[test]
    fn block_with_instructions_is_not_merged() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q) -> i32 {
entry:
  br %p, label %t, label %mid
mid:
  call void @g()
  br %q, label %t, label %e
t:
  ret i32 1
e:
  ret i32 3
}
",
        )
        .unwrap();
        assert!(!merge(&mut f, "mid"));
    }

    #[test]
    fn many_phis_in_shared_destination_block_the_merge() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q) -> i32 {
entry:
  br %p, label %t, label %mid
mid:
  br %q, label %t, label %e
t:
  %a = phi i32 [ 1, %entry ], [ 2, %mid ]
  %b = phi i32 [ 1, %entry ], [ 2, %mid ]
  %c = phi i32 [ 1, %entry ], [ 2, %mid ]
  %d = phi i32 [ 1, %entry ], [ 2, %mid ]
  ret i32 %a
e:
  ret i32 3
}
",
        )
        .unwrap();
        assert!(!merge(&mut f, "mid"));
    }

    #[test]
    fn predecessor_predictably_taking_shared_destination_is_left_alone() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q) -> i32 {
entry:
  br %p, label %t, label %mid !prof 1000, 1
mid:
  br %q, label %t, label %e
t:
  ret i32 1
e:
  ret i32 3
}
",
        )
        .unwrap();
        assert!(!merge(&mut f, "mid"));
    }

    // ── Same condition ──

    //   entry: br p, mid, e
    //   mid:   br p, a, e        → mid: br true, a, e
    #[test]
    fn sole_predecessor_decides_repeated_condition() {
        let mut f = parse_function(
            "
func @f(i1 %p) -> i32 {
entry:
  br %p, label %mid, label %e
mid:
  br %p, label %a, label %e
a:
  ret i32 1
e:
  ret i32 3
}
",
        )
        .unwrap();
        assert!(merge(&mut f, "mid"));
        let mid = f.block_by_name("mid").unwrap();
        assert_eq!(f.terminator(mid).condition(), Some(Value::Const(Constant::bool(true))));
    }

    //   entry: br p, mid, side
    //   side:  call g; br mid
    //   mid:   br p, a, e        → mid: %p.pr = phi [true, entry], [p, side]
    #[test]
    fn repeated_condition_with_several_predecessors_goes_through_phi() {
        let mut f = parse_function(
            "
func @f(i1 %p) -> i32 {
entry:
  br %p, label %mid, label %side
side:
  call void @g()
  br label %mid
mid:
  br %p, label %a, label %e
a:
  ret i32 1
e:
  ret i32 3
}
",
        )
        .unwrap();
        let (mid, side) = (f.block_by_name("mid").unwrap(), f.block_by_name("side").unwrap());
        assert!(merge(&mut f, "mid"));
        let phi = f.phis(mid)[0];
        assert_eq!(f.inst(phi).name.as_deref(), Some("p.pr"));
        assert_eq!(f.phi_value(phi, f.entry()), Some(Value::Const(Constant::bool(true))));
        assert_eq!(f.phi_value(phi, side), Some(Value::Arg(0)));
        assert_eq!(f.terminator(mid).condition(), Some(Value::Inst(phi)));
        crate::verify::assert_valid(&f);
    }
}
