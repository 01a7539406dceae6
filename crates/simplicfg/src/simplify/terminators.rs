//! Rules keyed on a block's terminator kind: returns, exception exits,
//! `unreachable`, indirect branches and branches on a `select`.

use super::utils::{delete_trivially_dead, emit, is_empty_block, remove_unwind_edge, replace_terminator, transfers_execution};
use super::{Cx, Rule};
use crate::ir::{BlockId, Constant, Function, InstId, InstKind, Terminator, Value};
use tracing::trace;

/// Resolves `v` as seen on the edge `pred -> b`: a PHI of `b` yields its
/// incoming value for `pred`.
fn value_on_edge(func: &Function, v: Value, b: BlockId, pred: BlockId) -> Value {
    match v.as_inst() {
        Some(i) if func.kind(i).is_phi() && func.inst_block(i) == Some(b) => {
            func.phi_value(i, pred).unwrap_or(Value::Undef(func.inst(i).ty))
        }
        _ => v,
    }
}

/// Only debug markers between the pad (or the PHIs) and the terminator.
fn only_debug_after(func: &Function, b: BlockId, first: usize) -> bool {
    func.insts(b)[first..].iter().all(|&i| func.kind(i).is_debug())
}

// ── Return ───────────────────────────────────────────────────────────────────

/// A return block holding nothing but PHIs is either duplicated into its
/// unconditional predecessors, or a conditional predecessor choosing
/// between two such returns becomes `select` + `ret`.
pub fn simplify_return(func: &mut Function, b: BlockId, cx: &Cx) -> Option<Rule> {
    if !is_empty_block(func, b) {
        return None;
    }
    let mut uncond = Vec::new();
    let mut cond = Vec::new();
    for p in func.unique_preds(b) {
        match func.terminator(p) {
            Terminator::Br { .. } => uncond.push(p),
            Terminator::CondBr { .. } => cond.push(p),
            _ => {}
        }
    }

    if cx.opts.duplicate_returns && !uncond.is_empty() {
        for &p in uncond.iter().rev() {
            trace!(from = %func.block_name(b), into = %func.block_name(p), "duplicating return");
            fold_return_into_pred(func, b, p);
        }
        if func.preds(b).is_empty() && b != func.entry() {
            func.remove_block(b);
        }
        return Some(Rule::DuplicateReturn);
    }

    for &p in cond.iter().rev() {
        if fold_cond_branch_to_two_returns(func, p) {
            return Some(Rule::TwoReturns);
        }
    }
    None
}

fn fold_return_into_pred(func: &mut Function, b: BlockId, pred: BlockId) {
    let Terminator::Ret { value } = *func.terminator(b) else {
        return;
    };
    for i in func.body(b) {
        let InstKind::Debug { value: v, .. } = *func.kind(i) else {
            continue;
        };
        let copy = func.clone_inst_to_end(i, pred);
        let v = value_on_edge(func, v, b, pred);
        func.inst_mut(copy).kind.set_operand(0, v);
    }
    let value = value.map(|v| value_on_edge(func, v, b, pred));
    func.set_terminator(pred, Terminator::Ret { value });
}

fn fold_cond_branch_to_two_returns(func: &mut Function, p: BlockId) -> bool {
    let Terminator::CondBr {
        cond,
        if_true,
        if_false,
        ..
    } = *func.terminator(p)
    else {
        return false;
    };
    if if_true == if_false {
        return false;
    }
    let (Terminator::Ret { value: tv }, Terminator::Ret { value: fv }) =
        (func.terminator(if_true).clone(), func.terminator(if_false).clone())
    else {
        return false;
    };
    if !is_empty_block(func, if_true) || !is_empty_block(func, if_false) {
        return false;
    }

    let value = match (tv, fv) {
        (Some(tv), Some(fv)) => {
            let tv = value_on_edge(func, tv, if_true, p);
            let fv = value_on_edge(func, fv, if_false, p);
            if tv == fv || fv.is_undef() {
                Some(tv)
            } else if tv.is_undef() {
                Some(fv)
            } else {
                let ty = func.value_type(tv);
                Some(emit(
                    func,
                    p,
                    InstKind::Select {
                        cond,
                        on_true: tv,
                        on_false: fv,
                    },
                    ty,
                    "retval",
                ))
            }
        }
        _ => None,
    };
    trace!(block = %func.block_name(p), "branch between two returns");
    replace_terminator(func, p, Terminator::Ret { value });
    true
}

// ── Exception exits ──────────────────────────────────────────────────────────

/// Every predecessor of the landing pad `b` reaches it through an
/// `invoke` unwind edge that can be turned into a call.
fn preds_unwind_into(func: &Function, b: BlockId) -> bool {
    func.preds(b).iter().all(|&p| match func.terminator(p) {
        Terminator::Invoke { normal, unwind, .. } => *unwind == b && *normal != b,
        Terminator::CleanupRet { unwind, .. } => *unwind == Some(b),
        _ => false,
    })
}

/// `resume` of the exception its own landing pad caught, or of a PHI over
/// such trivial landing pads: the unwinding invokes become plain calls.
pub fn simplify_resume(func: &mut Function, b: BlockId) -> bool {
    let Terminator::Resume { value } = *func.terminator(b) else {
        return false;
    };
    let Some(i) = value.as_inst() else {
        return false;
    };
    if func.kind(i).is_phi() && func.inst_block(i) == Some(b) {
        return simplify_common_resume(func, b, i);
    }

    let Some(pad) = func.first_non_phi(b) else {
        return false;
    };
    if pad != i || !matches!(func.kind(pad), InstKind::LandingPad) {
        return false;
    }
    if b == func.entry() || !only_debug_after(func, b, func.position(pad) + 1) || !preds_unwind_into(func, b) {
        return false;
    }
    for p in func.unique_preds(b) {
        remove_unwind_edge(func, p);
    }
    func.remove_block(b);
    true
}

fn simplify_common_resume(func: &mut Function, b: BlockId, phi: InstId) -> bool {
    let phis = func.phis(b).len();
    if !only_debug_after(func, b, phis) {
        return false;
    }
    let trivial: Vec<BlockId> = func
        .phi_incoming(phi)
        .iter()
        .filter(|&&(pad_block, v)| {
            if func.unique_succ(pad_block) != Some(b) {
                return false;
            }
            let Some(pad) = func.first_non_phi(pad_block) else {
                return false;
            };
            matches!(func.kind(pad), InstKind::LandingPad)
                && v == Value::Inst(pad)
                && only_debug_after(func, pad_block, func.position(pad) + 1)
                && preds_unwind_into(func, pad_block)
        })
        .map(|&(pad_block, _)| pad_block)
        .collect();
    if trivial.is_empty() {
        return false;
    }

    for pad_block in trivial {
        for p in func.unique_preds(pad_block) {
            remove_unwind_edge(func, p);
        }
        // Only b may be deleted here; the pad is left for dead-block removal.
        func.set_terminator(pad_block, Terminator::Unreachable);
    }
    if func.preds(b).is_empty() && b != func.entry() {
        func.remove_block(b);
    }
    true
}

/// Merges a cleanup pad into the cleanup it unwinds to, or removes a
/// cleanup that does nothing.
pub fn simplify_cleanup_return(func: &mut Function, b: BlockId) -> bool {
    let Terminator::CleanupRet { pad, unwind } = *func.terminator(b) else {
        return false;
    };
    if pad.is_undef() {
        return false;
    }
    merge_cleanup_pad(func, b, pad, unwind) || remove_empty_cleanup(func, b, pad, unwind)
}

fn merge_cleanup_pad(func: &mut Function, b: BlockId, pad: Value, unwind: Option<BlockId>) -> bool {
    let Some(dest) = unwind else {
        return false;
    };
    if func.single_pred(dest) != Some(b) {
        return false;
    }
    let Some(&dest_pad) = func.insts(dest).first() else {
        return false;
    };
    if !matches!(func.kind(dest_pad), InstKind::CleanupPad) {
        return false;
    }
    func.replace_inst(dest_pad, pad);
    func.set_terminator(b, Terminator::Br { target: dest });
    true
}

fn remove_empty_cleanup(func: &mut Function, b: BlockId, pad: Value, unwind: Option<BlockId>) -> bool {
    let Some(cp) = pad.as_inst() else {
        return false;
    };
    if func.inst_block(cp) != Some(b) || func.first_non_phi(b) != Some(cp) {
        return false;
    }
    if func.use_count(pad) != 1 || !only_debug_after(func, b, func.position(cp) + 1) {
        return false;
    }
    if b == func.entry() || unwind == Some(b) || !preds_unwind_into(func, b) {
        return false;
    }
    let preds = func.unique_preds(b);

    if let Some(dest) = unwind {
        // Route b's PHI entry in dest through each of b's predecessors.
        for dest_phi in func.phis(dest) {
            let Some(src) = func.phi_value(dest_phi, b) else {
                continue;
            };
            for &p in &preds {
                let v = value_on_edge(func, src, b, p);
                func.set_phi_value(dest_phi, p, v);
            }
            func.remove_phi_incoming(dest_phi, b);
        }

        // PHIs of b still used elsewhere move into dest. Predecessors of
        // dest that never went through b unwound from the caller's side and
        // keep the PHI's own value.
        let dest_preds = func.unique_preds(dest);
        let mut pos = func.phis(dest).len();
        for phi in func.phis(b) {
            let used_outside = func
                .users(Value::Inst(phi))
                .into_iter()
                .any(|u| func.user_block(u) != Some(b));
            if !used_outside {
                continue;
            }
            for &p in &dest_preds {
                if p != b {
                    func.set_phi_value(phi, p, Value::Inst(phi));
                }
            }
            func.move_inst(phi, dest, pos);
            pos += 1;
        }
        for &p in &preds {
            func.update_terminator(p, |t| t.replace_successor(b, dest));
        }
    } else {
        for &p in &preds {
            remove_unwind_edge(func, p);
        }
    }
    func.remove_block(b);
    true
}

// ── Unreachable ──────────────────────────────────────────────────────────────

/// Drops the instructions leading into `unreachable` that always fall
/// through, then cuts every edge into a block that is nothing but
/// `unreachable`.
pub fn simplify_unreachable(func: &mut Function, b: BlockId) -> bool {
    let mut changed = false;
    while let Some(&last) = func.insts(b).last() {
        if !transfers_execution(func.kind(last)) {
            break;
        }
        let ty = func.inst(last).ty;
        func.replace_inst(last, Value::Undef(ty));
        changed = true;
    }
    if !func.insts(b).is_empty() {
        return changed;
    }

    for p in func.unique_preds(b) {
        match func.terminator(p).clone() {
            Terminator::Br { .. } => {
                func.set_terminator(p, Terminator::Unreachable);
                changed = true;
            }
            Terminator::CondBr {
                if_true, if_false, ..
            } => {
                let target = if if_true == b { if_false } else { if_true };
                let term = if target == b {
                    Terminator::Unreachable
                } else {
                    Terminator::Br { target }
                };
                replace_terminator(func, p, term);
                changed = true;
            }
            Terminator::Switch {
                cond,
                default,
                cases,
                weights,
            } => {
                let weights = weights.filter(|w| w.len() == cases.len() + 1);
                let mut kept = Vec::with_capacity(cases.len());
                let mut kept_weights = weights.as_ref().map(|w| vec![w[0]]);
                for (i, case) in cases.iter().enumerate() {
                    if case.dest == b {
                        continue;
                    }
                    kept.push(*case);
                    if let (Some(kw), Some(w)) = (kept_weights.as_mut(), weights.as_ref()) {
                        kw.push(w[i + 1]);
                    }
                }
                if kept.len() != cases.len() {
                    func.set_terminator(
                        p,
                        Terminator::Switch {
                            cond,
                            default,
                            cases: kept,
                            weights: kept_weights,
                        },
                    );
                    changed = true;
                }
            }
            Terminator::Invoke { unwind, .. } if unwind == b => {
                remove_unwind_edge(func, p);
                // The call just added is known not to unwind.
                if let Some(&call) = func.insts(p).last() {
                    if let InstKind::Call { flags, .. } = &mut func.inst_mut(call).kind {
                        flags.nounwind = true;
                    }
                }
                changed = true;
            }
            Terminator::CleanupRet { .. } => {
                func.set_terminator(p, Terminator::Unreachable);
                changed = true;
            }
            _ => {}
        }
    }

    if func.preds(b).is_empty() && b != func.entry() {
        func.remove_block(b);
        return true;
    }
    changed
}

// ── Branches on a select ─────────────────────────────────────────────────────

/// Replaces the terminator of `b` with a branch on `cond` between
/// `if_true` and `if_false`, keeping only edges the old terminator had.
fn terminator_on_select(
    func: &mut Function,
    b: BlockId,
    cond: Value,
    if_true: BlockId,
    if_false: BlockId,
    weights: Option<[u32; 2]>,
) {
    let succs = func.succs(b);
    let has_true = succs.contains(&if_true);
    let has_false = succs.contains(&if_false);
    let term = if has_true && has_false {
        if if_true == if_false {
            Terminator::Br { target: if_true }
        } else {
            Terminator::CondBr {
                cond,
                if_true,
                if_false,
                weights,
            }
        }
    } else if has_true {
        // The other selected target is not a successor: that path is dead.
        Terminator::Br { target: if_true }
    } else if has_false {
        Terminator::Br { target: if_false }
    } else {
        Terminator::Unreachable
    };
    let old = match func.terminator(b) {
        Terminator::IndirectBr { addr, .. } => Some(*addr),
        t => t.condition(),
    };
    func.set_terminator(b, term);
    if let Some(old) = old {
        delete_trivially_dead(func, old);
    }
}

/// Drops duplicate and non-address-taken destinations of an `indirectbr`
/// and turns a branch on a `select` of two block addresses into a
/// conditional branch.
pub fn simplify_indirect_br(func: &mut Function, b: BlockId) -> bool {
    let Terminator::IndirectBr { addr, dests } = func.terminator(b).clone() else {
        return false;
    };
    let mut kept: Vec<BlockId> = Vec::with_capacity(dests.len());
    for &d in &dests {
        if func.address_taken(d) && !kept.contains(&d) {
            kept.push(d);
        }
    }
    let changed = kept.len() != dests.len();

    match kept.as_slice() {
        [] => {
            func.set_terminator(b, Terminator::Unreachable);
            delete_trivially_dead(func, addr);
            return true;
        }
        &[only] => {
            func.set_terminator(b, Terminator::Br { target: only });
            delete_trivially_dead(func, addr);
            return true;
        }
        _ => {}
    }
    if changed {
        func.set_terminator(b, Terminator::IndirectBr { addr, dests: kept });
    }

    if let Some(sel) = addr.as_inst() {
        if let InstKind::Select {
            cond,
            on_true: Value::BlockAddr(t),
            on_false: Value::BlockAddr(f),
        } = *func.kind(sel)
        {
            terminator_on_select(func, b, cond, t, f, None);
            return true;
        }
    }
    changed
}

/// A `switch` on `select %c, K1, K2` becomes a branch on `%c` between the
/// destinations of `K1` and `K2`.
pub fn simplify_switch_on_select(func: &mut Function, b: BlockId) -> bool {
    let Terminator::Switch {
        cond: Value::Inst(sel),
        default,
        ref cases,
        ..
    } = *func.terminator(b)
    else {
        return false;
    };
    let InstKind::Select {
        cond,
        on_true: Value::Const(tv),
        on_false: Value::Const(fv),
    } = *func.kind(sel)
    else {
        return false;
    };
    // Successor slot of a case value: 0 for the default.
    let slot = |v: Constant| {
        cases
            .iter()
            .position(|c| c.value == v)
            .map_or((0, default), |i| (i + 1, cases[i].dest))
    };
    let (ti, if_true) = slot(tv);
    let (fi, if_false) = slot(fv);
    let weights = match func.terminator(b) {
        Terminator::Switch {
            weights: Some(w), ..
        } if w.len() == cases.len() + 1 => {
            let (t, f) = (w[ti], w[fi]);
            (t != f).then_some([t, f])
        }
        _ => None,
    };
    terminator_on_select(func, b, cond, if_true, if_false, weights);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_function, Type};
    use crate::oracle::TargetCostModel;
    use crate::simplify::SimplifyOptions;

    fn ret(f: &mut Function, block: &str, opts: &SimplifyOptions) -> Option<Rule> {
        let b = f.block_by_name(block).unwrap();
        let cx = Cx {
            cost: &TargetCostModel,
            opts,
        };
        simplify_return(f, b, &cx)
    }

    // ── Returns ──

    #[test]
    fn branch_to_two_returns_becomes_select() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %b
a:
  ret i32 1
b:
  ret i32 2
}
",
        )
        .unwrap();
        assert_eq!(ret(&mut f, "a", &SimplifyOptions::default()), Some(Rule::TwoReturns));
        let entry = f.entry();
        let sel = f.insts(entry)[0];
        assert_eq!(f.inst(sel).name.as_deref(), Some("retval"));
        assert_eq!(
            f.terminator(entry),
            &Terminator::Ret {
                value: Some(Value::Inst(sel))
            }
        );
    }

    #[test]
    fn undef_return_value_takes_the_other_side() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %b
a:
  ret i32 undef
b:
  ret i32 2
}
",
        )
        .unwrap();
        assert_eq!(ret(&mut f, "b", &SimplifyOptions::default()), Some(Rule::TwoReturns));
        assert!(f.insts(f.entry()).is_empty());
        assert_eq!(
            f.terminator(f.entry()),
            &Terminator::Ret {
                value: Some(Value::constant(Type::I32, 2))
            }
        );
    }

    //   entry
    //   /   \
    //  x     y
    //   \   /
    //    ret: %p = phi [1, x], [2, y]
    #[test]
    fn return_is_duplicated_into_unconditional_preds() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %x, label %y
x:
  br label %exit
y:
  br label %exit
exit:
  %p = phi i32 [ 1, %x ], [ 2, %y ]
  ret i32 %p
}
",
        )
        .unwrap();
        let opts = SimplifyOptions {
            duplicate_returns: true,
            ..SimplifyOptions::default()
        };
        assert_eq!(ret(&mut f, "exit", &opts), Some(Rule::DuplicateReturn));
        assert!(f.block_by_name("exit").is_none());
        let x = f.block_by_name("x").unwrap();
        assert_eq!(
            f.terminator(x),
            &Terminator::Ret {
                value: Some(Value::constant(Type::I32, 1))
            }
        );
    }

    #[test]
    fn return_is_not_duplicated_by_default() {
        let src = "
func @f(i1 %c) -> void {
entry:
  br %c, label %x, label %exit
x:
  call void @g()
  br label %exit
exit:
  ret void
}
";
        let mut f = parse_function(src).unwrap();
        assert_eq!(ret(&mut f, "exit", &SimplifyOptions::default()), None);
    }

    // ── Exception exits ──

    #[test]
    fn trivial_landing_pad_turns_invoke_into_call() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  invoke @g() to label %ok unwind label %lp
ok:
  ret void
lp:
  %e = landingpad
  resume %e
}
",
        )
        .unwrap();
        let lp = f.block_by_name("lp").unwrap();
        let ok = f.block_by_name("ok").unwrap();
        assert!(simplify_resume(&mut f, lp));
        assert!(!f.is_live(lp));
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: ok });
        assert!(matches!(f.kind(f.insts(f.entry())[0]), InstKind::Call { .. }));
    }

    #[test]
    fn landing_pad_with_work_is_kept() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  invoke @g() to label %ok unwind label %lp
ok:
  ret void
lp:
  %e = landingpad
  call void @cleanup()
  resume %e
}
",
        )
        .unwrap();
        let lp = f.block_by_name("lp").unwrap();
        assert!(!simplify_resume(&mut f, lp));
    }

    //  a → lp1 ┐
    //          ├→ res: resume phi
    //  b → lp2 ┘
    #[test]
    fn shared_resume_strips_trivial_pads() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> void {
entry:
  br %c, label %a, label %b
a:
  invoke @g() to label %ok unwind label %lp1
b:
  invoke @h() to label %ok unwind label %lp2
ok:
  ret void
lp1:
  %e1 = landingpad
  br label %res
lp2:
  %e2 = landingpad
  br label %res
res:
  %e = phi token [ %e1, %lp1 ], [ %e2, %lp2 ]
  resume %e
}
",
        )
        .unwrap();
        let res = f.block_by_name("res").unwrap();
        let ok = f.block_by_name("ok").unwrap();
        assert!(simplify_resume(&mut f, res));
        assert!(!f.is_live(res));
        for name in ["a", "b"] {
            let blk = f.block_by_name(name).unwrap();
            assert_eq!(f.terminator(blk), &Terminator::Br { target: ok });
        }
        let lp1 = f.block_by_name("lp1").unwrap();
        assert_eq!(f.terminator(lp1), &Terminator::Unreachable);
    }

    #[test]
    fn empty_cleanup_unwinding_to_caller_is_removed() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  invoke @g() to label %ok unwind label %cp
ok:
  ret void
cp:
  %t = cleanuppad
  cleanupret %t unwind to caller
}
",
        )
        .unwrap();
        let cp = f.block_by_name("cp").unwrap();
        assert!(simplify_cleanup_return(&mut f, cp));
        assert!(!f.is_live(cp));
        assert!(f.terminator(f.entry()).is_unconditional_br());
    }

    #[test]
    fn empty_cleanup_forwards_to_next_pad() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  invoke @g() to label %ok unwind label %cp1
ok:
  ret void
cp1:
  %t1 = cleanuppad
  cleanupret %t1 unwind label %cp2
cp2:
  %t2 = cleanuppad
  call void @release()
  cleanupret %t2 unwind to caller
}
",
        )
        .unwrap();
        let cp1 = f.block_by_name("cp1").unwrap();
        let cp2 = f.block_by_name("cp2").unwrap();
        // cp1 is cp2's only predecessor: the two pads merge.
        assert!(simplify_cleanup_return(&mut f, cp1));
        assert_eq!(f.terminator(cp1), &Terminator::Br { target: cp2 });
        assert!(!f.insts(cp2).iter().any(|&i| matches!(f.kind(i), InstKind::CleanupPad)));
    }

    #[test]
    fn undef_pad_is_left_alone() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  ret void
cp:
  cleanupret undef unwind to caller
}
",
        )
        .unwrap();
        let cp = f.block_by_name("cp").unwrap();
        assert!(!simplify_cleanup_return(&mut f, cp));
    }

    // ── Unreachable ──

    #[test]
    fn conditional_edge_into_unreachable_is_cut() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %u, label %ok
u:
  %x = add i32 1, 2
  unreachable
ok:
  ret i32 0
}
",
        )
        .unwrap();
        let u = f.block_by_name("u").unwrap();
        let ok = f.block_by_name("ok").unwrap();
        assert!(simplify_unreachable(&mut f, u));
        assert!(!f.is_live(u));
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: ok });
    }

    #[test]
    fn call_that_may_not_return_is_kept() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> void {
entry:
  br %c, label %u, label %ok
u:
  call void @abort()
  unreachable
ok:
  ret void
}
",
        )
        .unwrap();
        let u = f.block_by_name("u").unwrap();
        assert!(!simplify_unreachable(&mut f, u));
        assert_eq!(f.insts(u).len(), 1);
    }

    #[test]
    fn switch_cases_into_unreachable_are_dropped() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [
    1, label %u
    2, label %a
    3, label %u
  ] !prof 5, 1, 7, 2
a:
  ret i32 1
d:
  ret i32 0
u:
  unreachable
}
",
        )
        .unwrap();
        let u = f.block_by_name("u").unwrap();
        assert!(simplify_unreachable(&mut f, u));
        match f.terminator(f.entry()) {
            Terminator::Switch { cases, weights, .. } => {
                assert_eq!(cases.len(), 1);
                assert_eq!(weights.as_deref(), Some(&[5, 7][..]));
            }
            other => panic!("expected a switch, got {other:?}"),
        }
        assert!(!f.is_live(u));
    }

    #[test]
    fn unwinding_into_unreachable_makes_a_nounwind_call() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  invoke @g() to label %ok unwind label %u
ok:
  ret void
u:
  %e = landingpad
  unreachable
}
",
        )
        .unwrap();
        let u = f.block_by_name("u").unwrap();
        assert!(simplify_unreachable(&mut f, u));
        let call = f.insts(f.entry())[0];
        match f.kind(call) {
            InstKind::Call { flags, .. } => assert!(flags.nounwind),
            other => panic!("expected a call, got {other:?}"),
        }
    }

    // ── Indirect branches and selects ──

    #[test]
    fn indirect_branch_on_select_of_addresses() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  %a = select %c, ptr blockaddress(%x), blockaddress(%y)
  indirectbr ptr %a, [label %x, label %y, label %x]
x:
  ret i32 1
y:
  ret i32 2
}
",
        )
        .unwrap();
        let x = f.block_by_name("x").unwrap();
        let y = f.block_by_name("y").unwrap();
        let entry = f.entry();
        assert!(simplify_indirect_br(&mut f, entry));
        assert_eq!(
            f.terminator(f.entry()),
            &Terminator::CondBr {
                cond: Value::Arg(0),
                if_true: x,
                if_false: y,
                weights: None,
            }
        );
        assert!(f.insts(f.entry()).is_empty());
    }

    #[test]
    fn destinations_without_taken_address_are_dropped() {
        let mut f = parse_function(
            "
func @f(ptr %p) -> i32 {
entry:
  dbg ptr blockaddress(%x), !1
  indirectbr ptr %p, [label %x, label %y]
x:
  ret i32 1
y:
  ret i32 2
}
",
        )
        .unwrap();
        let x = f.block_by_name("x").unwrap();
        let entry = f.entry();
        assert!(simplify_indirect_br(&mut f, entry));
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: x });
    }

    #[test]
    fn switch_on_select_of_constants() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  %s = select %c, i32 1, 2
  switch i32 %s, label %d [
    1, label %a
    2, label %b
  ] !prof 1, 10, 20
a:
  ret i32 10
b:
  ret i32 20
d:
  ret i32 0
}
",
        )
        .unwrap();
        let a = f.block_by_name("a").unwrap();
        let b = f.block_by_name("b").unwrap();
        let d = f.block_by_name("d").unwrap();
        let entry = f.entry();
        assert!(simplify_switch_on_select(&mut f, entry));
        assert_eq!(
            f.terminator(f.entry()),
            &Terminator::CondBr {
                cond: Value::Arg(0),
                if_true: a,
                if_false: b,
                weights: Some([10, 20]),
            }
        );
        assert!(f.preds(d).is_empty());
        assert!(f.insts(f.entry()).is_empty());
    }

    #[test]
    fn select_of_non_constants_is_not_a_switch_fold() {
        let mut f = parse_function(
            "
func @f(i1 %c, i32 %x) -> i32 {
entry:
  %s = select %c, i32 %x, 2
  switch i32 %s, label %d [
    2, label %a
  ]
a:
  ret i32 10
d:
  ret i32 0
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(!simplify_switch_on_select(&mut f, entry));
    }
}
