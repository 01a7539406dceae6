//! Dead block elimination.
//!
//! A block is dead when it is not the entry and nothing but itself branches
//! to it. Deleting it removes its outgoing edges (which prunes the PHI entries
//! of its successors) and replaces any leftover uses of its values with
//! `undef`.

use crate::ir::{BlockId, Function, Terminator};
use std::collections::BTreeSet;

/// Whether `b` can never execute.
pub fn is_dead(func: &Function, b: BlockId) -> bool {
    b != func.entry() && (func.preds(b).is_empty() || func.unique_pred(b) == Some(b))
}

/// Deletes `b` if it is dead.
pub fn eliminate(func: &mut Function, b: BlockId) -> bool {
    if !is_dead(func, b) {
        return false;
    }
    func.remove_block(b);
    true
}

/// Deletes every block unreachable from the entry, including unreachable
/// cycles. Returns the number of blocks removed.
pub fn remove_unreachable_blocks(func: &mut Function) -> usize {
    let mut reachable = BTreeSet::new();
    let mut work = vec![func.entry()];
    while let Some(b) = work.pop() {
        if reachable.insert(b) {
            work.extend(func.succs(b));
        }
    }
    let dead: Vec<BlockId> = func
        .layout()
        .iter()
        .copied()
        .filter(|b| !reachable.contains(b))
        .collect();
    // Cut every outgoing edge first so cycles among dead blocks fall apart.
    for &b in &dead {
        func.set_terminator(b, Terminator::Unreachable);
    }
    for &b in &dead {
        func.remove_block(b);
    }
    dead.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_function, Value};

    #[test]
    fn entry_is_never_dead() {
        let f = parse_function("func @f() -> void {\nentry:\n  ret void\n}\n").unwrap();
        assert!(!is_dead(&f, f.entry()));
    }

    // entry → join ← dead
    #[test]
    fn dead_predecessor_is_removed_and_phi_pruned() {
        let mut f = parse_function(
            "
func @f() -> i32 {
entry:
  br label %join
dead:
  br label %join
join:
  %p = phi i32 [ 1, %entry ], [ 2, %dead ]
  ret i32 %p
}
",
        )
        .unwrap();
        let dead = f.block_by_name("dead").unwrap();
        let join = f.block_by_name("join").unwrap();
        assert!(eliminate(&mut f, dead));
        assert_eq!(f.block_count(), 2);
        let phi = f.phis(join)[0];
        assert_eq!(f.phi_incoming(phi), &[(f.entry(), Value::constant(crate::ir::Type::I32, 1))]);
    }

    #[test]
    fn self_loop_is_dead() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  ret void
spin:
  br label %spin
}
",
        )
        .unwrap();
        let spin = f.block_by_name("spin").unwrap();
        assert!(is_dead(&f, spin));
        assert!(eliminate(&mut f, spin));
        assert!(!f.is_live(spin));
    }

    // a ⇄ b, neither reachable from entry.
    #[test]
    fn unreachable_cycle_is_removed() {
        let mut f = parse_function(
            "
func @f() -> void {
entry:
  ret void
a:
  br label %b
b:
  br label %a
}
",
        )
        .unwrap();
        assert_eq!(remove_unreachable_blocks(&mut f), 2);
        assert_eq!(f.block_count(), 1);
    }
}
