//! Block merging and empty-block forwarding.
//!
//! Two shapes collapse a straight-line edge:
//!
//! - **Merge into predecessor**: `B` has a unique predecessor `P` whose every
//!   successor slot is `B`. `B`'s PHIs are resolved to `P`'s value, its
//!   instructions are appended to `P` and `P` inherits `B`'s terminator.
//!
//! - **Empty-block forwarding**: `B` holds only PHIs and `br Succ`. Every
//!   predecessor of `B` is retargeted to `Succ` and `Succ`'s PHIs take over
//!   the values `B` would have passed on:
//!
//!   ```text
//!     P1   P2            P1   P2
//!      \   /              \   /
//!        B        →        Succ
//!        |
//!       Succ
//!   ```

use super::utils::{dedup, is_empty_block, replace_terminator};
use super::Cx;
use crate::ir::{BlockId, Function, InstId, Terminator, User, Value};
use tracing::trace;

// ── Merge into predecessor ───────────────────────────────────────────────────

/// Splices `b` into its unique predecessor. Deletes `b` on success.
pub fn merge_into_predecessor(func: &mut Function, b: BlockId) -> bool {
    if b == func.entry() || func.address_taken(b) {
        return false;
    }
    let Some(pred) = func.unique_pred(b) else {
        return false;
    };
    if pred == b || func.unique_succ(pred) != Some(b) {
        return false;
    }
    if !matches!(
        func.terminator(pred),
        Terminator::Br { .. } | Terminator::CondBr { .. } | Terminator::Switch { .. }
    ) {
        return false;
    }
    if func.succs(b).contains(&b) {
        return false;
    }
    let phis = func.phis(b);
    if phis
        .iter()
        .any(|&phi| func.phi_value(phi, pred) == Some(Value::Inst(phi)))
    {
        return false;
    }

    for phi in phis {
        let ty = func.inst(phi).ty;
        let v = func.phi_value(phi, pred).unwrap_or(Value::Undef(ty));
        func.replace_inst(phi, v);
    }
    for i in func.insts(b).to_vec() {
        func.move_inst_to_end(i, pred);
    }
    let term = func.terminator(b).clone();
    for s in dedup(&term.successors()) {
        func.add_phi_incoming_like(s, pred, b);
    }
    replace_terminator(func, pred, term);
    func.remove_block(b);
    true
}

// ── Empty-block forwarding ───────────────────────────────────────────────────

/// Values may be merged into one PHI entry when equal or when one is `undef`.
fn can_merge_values(a: Value, b: Value) -> bool {
    a == b || a.is_undef() || b.is_undef()
}

/// Whether redirecting every predecessor of `b` to `succ` would give some
/// PHI of `succ` two different values for the same predecessor.
fn can_propagate_predecessors_for_phis(func: &Function, b: BlockId, succ: BlockId, preds: &[BlockId]) -> bool {
    if func.single_pred(succ).is_some() {
        return true;
    }
    for phi in func.phis(succ) {
        let Some(incoming) = func.phi_value(phi, b) else {
            continue;
        };
        let from_b_phi = incoming
            .as_inst()
            .filter(|&i| func.kind(i).is_phi() && func.inst_block(i) == Some(b));
        for &(pred, v) in func.phi_incoming(phi) {
            if !preds.contains(&pred) {
                continue;
            }
            let forwarded = match from_b_phi {
                Some(b_phi) => func.phi_value(b_phi, pred).unwrap_or(v),
                None => incoming,
            };
            if !can_merge_values(forwarded, v) {
                return false;
            }
        }
    }
    true
}

/// Every use of a PHI of `b` is an incoming value of a PHI in `succ` for the
/// edge from `b`.
fn phi_uses_stay_in_successor(func: &Function, b: BlockId, succ: BlockId, phi: InstId) -> bool {
    func.users(Value::Inst(phi)).into_iter().all(|u| match u {
        User::Inst(user) => {
            func.inst_block(user) == Some(succ)
                && func.kind(user).is_phi()
                && func
                    .phi_incoming(user)
                    .iter()
                    .all(|&(pred, v)| v != Value::Inst(phi) || pred == b)
        }
        User::Term(_) => false,
    })
}

/// Folds `b`, which only forwards to its successor, into that successor.
pub fn forward_empty_block(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Terminator::Br { target: succ } = *func.terminator(b) else {
        return false;
    };
    if succ == b || b == func.entry() || !is_empty_block(func, b) {
        return false;
    }
    let preds = func.unique_preds(b);
    if func.preds(b).len() >= 2 && (cx.opts.is_loop_header(b) || cx.opts.is_loop_header(succ)) {
        trace!(block = %func.block_name(b), "keeping loop header");
        return false;
    }
    if func.address_taken(b)
        || preds
            .iter()
            .any(|&p| matches!(func.terminator(p), Terminator::IndirectBr { .. }))
        || func
            .first_non_phi(succ)
            .is_some_and(|i| func.kind(i).is_eh_pad())
    {
        return false;
    }
    if !can_propagate_predecessors_for_phis(func, b, succ, &preds) {
        return false;
    }
    let b_phis = func.phis(b);
    let succ_has_single_pred = func.single_pred(succ).is_some();
    if !succ_has_single_pred
        && !b_phis
            .iter()
            .all(|&phi| phi_uses_stay_in_successor(func, b, succ, phi))
    {
        return false;
    }

    // Give succ's PHIs one entry per predecessor of b.
    for phi in func.phis(succ) {
        let Some(incoming) = func.phi_value(phi, b) else {
            continue;
        };
        func.remove_phi_incoming(phi, b);
        let from_b_phi = incoming
            .as_inst()
            .filter(|&i| func.kind(i).is_phi() && func.inst_block(i) == Some(b));
        for &pred in &preds {
            let v = match from_b_phi {
                Some(b_phi) => func.phi_value(b_phi, pred).unwrap_or(incoming),
                None => incoming,
            };
            match func.phi_value(phi, pred) {
                Some(existing) if !existing.is_undef() => {}
                _ => func.set_phi_value(phi, pred, v),
            }
        }
    }

    if succ_has_single_pred {
        // succ ends up with exactly b's predecessors: b's PHIs move over.
        for (pos, phi) in b_phis.into_iter().enumerate() {
            func.move_inst(phi, succ, pos);
        }
    } else {
        for phi in b_phis {
            let ty = func.inst(phi).ty;
            func.replace_inst(phi, Value::Undef(ty));
        }
    }

    for &pred in &preds {
        func.update_terminator(pred, |t| t.replace_successor(b, succ));
    }
    func.remove_block(b);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_function, Type};
    use crate::oracle::TargetCostModel;
    use crate::simplify::SimplifyOptions;
    use std::collections::BTreeSet;

    fn forward(f: &mut Function, name: &str, opts: &SimplifyOptions) -> bool {
        let b = f.block_by_name(name).unwrap();
        let cx = Cx {
            cost: &TargetCostModel,
            opts,
        };
        forward_empty_block(f, b, &cx)
    }

    // ── Merge into predecessor ──

    // entry → next → ret: next is spliced into entry.
    #[test]
    fn straight_line_merges() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  %a = add i32 %x, 1
  br label %next
next:
  %p = phi i32 [ %a, %entry ]
  %b = mul i32 %p, 2
  ret i32 %b
}
",
        )
        .unwrap();
        let next = f.block_by_name("next").unwrap();
        assert!(merge_into_predecessor(&mut f, next));
        assert_eq!(f.block_count(), 1);
        assert_eq!(f.insts(f.entry()).len(), 2);
        assert!(matches!(f.terminator(f.entry()), Terminator::Ret { .. }));
    }

    #[test]
    fn successor_phis_are_relabelled() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br label %mid
mid:
  br %c, label %x, label %join
x:
  br label %join
join:
  %p = phi i32 [ 1, %mid ], [ 2, %x ]
  ret i32 %p
}
",
        )
        .unwrap();
        let mid = f.block_by_name("mid").unwrap();
        let join = f.block_by_name("join").unwrap();
        assert!(merge_into_predecessor(&mut f, mid));
        let phi = f.phis(join)[0];
        assert_eq!(f.phi_value(phi, f.entry()), Some(Value::constant(Type::I32, 1)));
        assert!(f.phi_value(phi, mid).is_none());
    }

    #[test]
    fn conditional_predecessor_is_not_merged() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> void {
entry:
  br %c, label %a, label %b
a:
  ret void
b:
  ret void
}
",
        )
        .unwrap();
        let a = f.block_by_name("a").unwrap();
        assert!(!merge_into_predecessor(&mut f, a));
    }

    // ── Empty-block forwarding ──

    //   p1  p2
    //    \  /
    //    fwd      fwd only has a PHI and `br join`
    //     |
    //    join ← p3
    #[test]
    fn empty_block_with_phi_is_forwarded() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %p3 [
    0, label %p1
    1, label %p2
  ]
p1:
  br label %fwd
p2:
  br label %fwd
fwd:
  %q = phi i32 [ 10, %p1 ], [ 20, %p2 ]
  br label %join
p3:
  br label %join
join:
  %r = phi i32 [ %q, %fwd ], [ 30, %p3 ]
  ret i32 %r
}
",
        )
        .unwrap();
        let opts = SimplifyOptions::default();
        assert!(forward(&mut f, "fwd", &opts));
        let join = f.block_by_name("join").unwrap();
        let p1 = f.block_by_name("p1").unwrap();
        let p2 = f.block_by_name("p2").unwrap();
        let phi = f.phis(join)[0];
        assert_eq!(f.phi_incoming(phi).len(), 3);
        assert_eq!(f.phi_value(phi, p1), Some(Value::constant(Type::I32, 10)));
        assert_eq!(f.phi_value(phi, p2), Some(Value::constant(Type::I32, 20)));
    }

    // entry branches to both fwd and join; join's PHI would need two values
    // for entry.
    #[test]
    fn conflicting_phi_values_block_forwarding() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %fwd, label %join
fwd:
  br label %join
join:
  %r = phi i32 [ 1, %fwd ], [ 2, %entry ]
  ret i32 %r
}
",
        )
        .unwrap();
        assert!(!forward(&mut f, "fwd", &SimplifyOptions::default()));
    }

    #[test]
    fn loop_header_hint_blocks_forwarding() {
        let src = "
func @f(i1 %c) -> void {
entry:
  br %c, label %a, label %b
a:
  br label %hdr
b:
  br label %hdr
hdr:
  br label %body
body:
  br label %hdr
}
";
        let mut f = parse_function(src).unwrap();
        let hdr = f.block_by_name("hdr").unwrap();
        let opts = SimplifyOptions {
            loop_header_hints: Some(BTreeSet::from([hdr])),
            ..SimplifyOptions::default()
        };
        assert!(!forward(&mut f, "hdr", &opts));
        assert!(forward(&mut f, "hdr", &SimplifyOptions::default()));
    }
}
