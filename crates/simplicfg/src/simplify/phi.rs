//! PHI cleanups: duplicate PHI merging and removal of predecessors that feed
//! a value whose use is immediately undefined.

use super::utils::{passing_value_is_always_undefined, replace_terminator};
use crate::ir::{BlockId, Function, InstId, Terminator, Type, Value};

/// Replaces every PHI of `b` that repeats an earlier one (same type, same
/// value per predecessor) with the earlier PHI.
pub fn merge_duplicate_phis(func: &mut Function, b: BlockId) -> bool {
    let mut seen: Vec<(InstId, Type, Vec<(BlockId, Value)>)> = Vec::new();
    let mut changed = false;
    for phi in func.phis(b) {
        let mut key = func.phi_incoming(phi).to_vec();
        key.sort_by_key(|(pred, _)| *pred);
        let ty = func.inst(phi).ty;
        match seen.iter().find(|(_, t, k)| *t == ty && *k == key) {
            Some(&(first, _, _)) => {
                func.replace_inst(phi, Value::Inst(first));
                changed = true;
            }
            None => seen.push((phi, ty, key)),
        }
    }
    changed
}

/// Cuts the edge from a predecessor that passes null or `undef` into a PHI
/// that is dereferenced right away: that path is undefined behavior.
///
/// Only predecessors ending in a branch are rewritten. An unconditional
/// branch becomes `unreachable`, a conditional one a branch to its other
/// target.
pub fn remove_undef_introducing_preds(func: &mut Function, b: BlockId) -> bool {
    for phi in func.phis(b) {
        let incoming = func.phi_incoming(phi).to_vec();
        for (pred, v) in incoming {
            if !passing_value_is_always_undefined(func, v, phi) {
                continue;
            }
            let term = match *func.terminator(pred) {
                Terminator::Br { .. } => Terminator::Unreachable,
                Terminator::CondBr {
                    if_true, if_false, ..
                } => Terminator::Br {
                    target: if if_true == b { if_false } else { if_true },
                },
                _ => continue,
            };
            replace_terminator(func, pred, term);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_function;

    #[test]
    fn identical_phis_are_merged() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %join
a:
  br label %join
join:
  %p = phi i32 [ 1, %entry ], [ 2, %a ]
  %q = phi i32 [ 2, %a ], [ 1, %entry ]
  %s = add i32 %p, %q
  ret i32 %s
}
",
        )
        .unwrap();
        let join = f.block_by_name("join").unwrap();
        assert!(merge_duplicate_phis(&mut f, join));
        assert_eq!(f.phis(join).len(), 1);
        assert!(!merge_duplicate_phis(&mut f, join));
    }

    #[test]
    fn different_values_are_kept() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %join
a:
  br label %join
join:
  %p = phi i32 [ 1, %entry ], [ 2, %a ]
  %q = phi i32 [ 1, %entry ], [ 3, %a ]
  %s = add i32 %p, %q
  ret i32 %s
}
",
        )
        .unwrap();
        let join = f.block_by_name("join").unwrap();
        assert!(!merge_duplicate_phis(&mut f, join));
    }

    //   entry
    //   /   \
    //  a    join ← a passes null, join loads through the PHI
    #[test]
    fn null_feeding_load_cuts_edge() {
        let mut f = parse_function(
            "
func @f(i1 %c, ptr %p) -> i32 {
entry:
  br %c, label %a, label %join
a:
  br label %join
join:
  %ptr = phi ptr [ %p, %entry ], [ null, %a ]
  %v = load i32, %ptr
  ret i32 %v
}
",
        )
        .unwrap();
        let join = f.block_by_name("join").unwrap();
        let a = f.block_by_name("a").unwrap();
        assert!(remove_undef_introducing_preds(&mut f, join));
        assert_eq!(f.terminator(a), &Terminator::Unreachable);
        assert_eq!(f.phi_incoming(f.phis(join)[0]).len(), 1);
    }

    #[test]
    fn conditional_predecessor_branches_to_other_side() {
        let mut f = parse_function(
            "
func @f(i1 %c, ptr %p) -> void {
entry:
  br %c, label %join, label %other
other:
  ret void
join:
  %ptr = phi ptr [ undef, %entry ]
  store i32 1, %ptr
  ret void
}
",
        )
        .unwrap();
        let other = f.block_by_name("other").unwrap();
        let join = f.block_by_name("join").unwrap();
        assert!(remove_undef_introducing_preds(&mut f, join));
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: other });
    }

    #[test]
    fn call_between_phi_and_use_blocks_rewrite() {
        let mut f = parse_function(
            "
func @f(i1 %c, ptr %p) -> i32 {
entry:
  br %c, label %a, label %join
a:
  br label %join
join:
  %ptr = phi ptr [ %p, %entry ], [ null, %a ]
  call void @may_exit()
  %v = load i32, %ptr
  ret i32 %v
}
",
        )
        .unwrap();
        let join = f.block_by_name("join").unwrap();
        assert!(!remove_undef_introducing_preds(&mut f, join));
    }
}
