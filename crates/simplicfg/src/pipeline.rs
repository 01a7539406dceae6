//! Whole-function simplification.
//!
//! [`simplify_function`] is what a pass manager would run. Each sweep drops
//! unreachable blocks, funnels empty return blocks into one, then runs the
//! per-block driver over the layout. Sweeps repeat until one changes
//! nothing, so a second call on the result is a no-op.

use crate::ir::{BlockId, Function, InstId, Terminator, Value};
use crate::oracle::{CostOracle, DomOracle};
use crate::simplify::{remove_unreachable_blocks, Simplifier, SimplifyOptions, SimplifyStats};
use std::fmt;
use tracing::{debug, info};

/// What a whole-function run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub rules: SimplifyStats,
    /// Sweeps over the layout, including the final one that changed nothing.
    pub sweeps: usize,
    pub merged_returns: usize,
    pub unreachable_removed: usize,
}

impl PipelineStats {
    pub fn changed(&self) -> bool {
        self.rules.total() > 0 || self.merged_returns > 0 || self.unreachable_removed > 0
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rules)?;
        writeln!(f, "{:>6}  merged-return-blocks", self.merged_returns)?;
        writeln!(f, "{:>6}  unreachable-blocks-removed", self.unreachable_removed)?;
        writeln!(f, "{:>6}  sweeps", self.sweeps)
    }
}

/// A block that only returns, possibly through a PHI feeding the return.
fn is_empty_return(func: &Function, b: BlockId) -> bool {
    let Terminator::Ret { value } = func.terminator(b) else {
        return false;
    };
    match func.insts(b) {
        [] => true,
        [phi] => {
            func.kind(*phi).is_phi()
                && *value == Some(Value::Inst(*phi))
                && func.use_count(Value::Inst(*phi)) == 1
        }
        _ => false,
    }
}

/// The PHI a return block returns, if any.
fn return_phi(func: &Function, b: BlockId) -> Option<InstId> {
    func.phis(b).first().copied()
}

/// Value `b` returns when entered from `pred`.
fn returned_from(func: &Function, b: BlockId, pred: BlockId) -> Option<Value> {
    match return_phi(func, b) {
        Some(phi) => func.phi_value(phi, pred),
        None => match func.terminator(b) {
            Terminator::Ret { value } => *value,
            _ => None,
        },
    }
}

/// Redirects every empty return block into the first one, adding a
/// `merge` PHI there when the returned values differ. Blocks without
/// predecessors (the entry among them) never take part. A block is skipped
/// when one of its predecessors already reaches the canonical block with a
/// different value. Returns the number of blocks folded away.
pub fn merge_empty_return_blocks(func: &mut Function) -> usize {
    let mut canonical: Option<BlockId> = None;
    let mut merged = 0;
    for b in func.layout().to_vec() {
        if !func.is_live(b) || !is_empty_return(func, b) {
            continue;
        }
        let preds = func.unique_preds(b);
        if preds.is_empty() {
            continue;
        }
        let Some(ret) = canonical else {
            canonical = Some(b);
            continue;
        };

        let incoming: Vec<(BlockId, Option<Value>)> =
            preds.iter().map(|&p| (p, returned_from(func, b, p))).collect();
        let shared = incoming
            .iter()
            .any(|&(p, v)| func.has_edge(p, ret) && returned_from(func, ret, p) != v);
        if shared {
            continue;
        }

        let mut phi = return_phi(func, ret);
        let ret_value = match func.terminator(ret) {
            Terminator::Ret { value } => *value,
            _ => None,
        };
        if phi.is_none() && incoming.iter().any(|&(_, v)| v != ret_value) {
            // Returns differ: materialize the returned value as a PHI.
            let Some(v0) = ret_value else {
                continue;
            };
            let existing = func
                .unique_preds(ret)
                .into_iter()
                .map(|p| (p, v0))
                .collect();
            let new_phi = func.insert_phi(ret, func.ret_ty, existing);
            func.set_inst_name(new_phi, "merge");
            func.set_terminator(
                ret,
                Terminator::Ret {
                    value: Some(Value::Inst(new_phi)),
                },
            );
            phi = Some(new_phi);
        }

        for (p, v) in incoming {
            func.update_terminator(p, |t| t.replace_successor(b, ret));
            if let (Some(phi), Some(v)) = (phi, v) {
                func.set_phi_value(phi, p, v);
            }
        }
        debug!(from = %func.block_name(b), into = %func.block_name(ret), "merged return block");
        func.remove_block(b);
        merged += 1;
    }
    merged
}

/// Simplifies every block of `func` until nothing changes.
///
/// Edge changes are streamed to `dom` when given, including those of the
/// return merging and unreachable-block removal around the driver.
pub fn simplify_function<'a>(
    func: &mut Function,
    cost: &'a dyn CostOracle,
    dom: Option<&'a mut dyn DomOracle>,
    options: &'a SimplifyOptions,
) -> PipelineStats {
    let mut stats = PipelineStats::default();
    let mut simplifier = Simplifier::new(cost, dom, options);

    // Edits made before we were called are the caller's to report.
    func.take_dom_updates();
    loop {
        stats.sweeps += 1;
        let mut removed = remove_unreachable_blocks(func);
        let merged = merge_empty_return_blocks(func);
        simplifier.sync_dominators(func);

        let mut changed = false;
        for b in func.layout().to_vec() {
            if func.is_live(b) {
                changed |= simplifier.run(func, b);
            }
        }
        removed += remove_unreachable_blocks(func);
        simplifier.sync_dominators(func);

        stats.merged_returns += merged;
        stats.unreachable_removed += removed;
        if !changed && merged == 0 && removed == 0 {
            break;
        }
        if stats.sweeps >= options.max_iterations {
            panic!(
                "simplification of @{} did not converge after {} sweeps",
                func.name, stats.sweeps
            );
        }
    }

    stats.rules = simplifier.into_stats();
    info!(
        func = %func.name,
        rules = stats.rules.total(),
        sweeps = stats.sweeps,
        blocks = func.block_count(),
        "function simplified"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_function, Constant, Type};
    use crate::oracle::{DominatorTree, TargetCostModel};
    use crate::verify::verify;

    fn run(src: &str) -> (Function, PipelineStats) {
        let mut f = parse_function(src).unwrap();
        let stats = simplify_function(&mut f, &TargetCostModel, None, &SimplifyOptions::default());
        verify(&f).unwrap();
        (f, stats)
    }

    // ── Return merging ──────────────────────────────────────────────────

    //       entry
    //      /     \
    //     a       b
    //     |       |
    //    r1       r2      (ret 1 / ret 2)
    #[test]
    fn differing_returns_share_a_merge_phi() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %b
a:
  call void @g()
  br label %r1
b:
  call void @h()
  br label %r2
r1:
  ret i32 1
r2:
  ret i32 2
}
",
        )
        .unwrap();
        assert_eq!(merge_empty_return_blocks(&mut f), 1);
        verify(&f).unwrap();
        assert!(f.block_by_name("r2").is_none());
        let r1 = f.block_by_name("r1").unwrap();
        let a = f.block_by_name("a").unwrap();
        let b = f.block_by_name("b").unwrap();
        let phi = f.phis(r1)[0];
        assert_eq!(f.phi_value(phi, a), Some(Value::Const(Constant::new(Type::I32, 1))));
        assert_eq!(f.phi_value(phi, b), Some(Value::Const(Constant::new(Type::I32, 2))));
        assert_eq!(
            f.terminator(r1),
            &Terminator::Ret {
                value: Some(Value::Inst(phi))
            }
        );
    }

    // Both arms of one branch return different constants: merging would
    // need two values for the same edge.
    #[test]
    fn one_predecessor_two_values_is_skipped() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %r1, label %r2
r1:
  ret i32 1
r2:
  ret i32 2
}
",
        )
        .unwrap();
        assert_eq!(merge_empty_return_blocks(&mut f), 0);
    }

    #[test]
    fn identical_void_returns_merge_without_a_phi() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> void {
entry:
  switch i32 %x, label %d [ 1, label %a  2, label %b ]
a:
  call void @g()
  br label %ra
ra:
  ret void
b:
  call void @h()
  br label %rb
rb:
  ret void
d:
  unreachable
}
",
        )
        .unwrap();
        assert_eq!(merge_empty_return_blocks(&mut f), 1);
        let ra = f.block_by_name("ra").unwrap();
        assert!(!f.has_phis(ra));
        assert_eq!(f.preds(ra).len(), 2);
    }

    #[test]
    fn shared_predecessor_with_conflicting_values_is_skipped() {
        let mut f = parse_function(
            "
func @f(i1 %c, i1 %d) -> i32 {
entry:
  br %c, label %r1, label %mid
mid:
  call void @g()
  br %d, label %r1, label %r2
r1:
  %p = phi i32 [ 1, %entry ], [ 3, %mid ]
  ret i32 %p
r2:
  ret i32 2
}
",
        )
        .unwrap();
        assert_eq!(merge_empty_return_blocks(&mut f), 0);
        assert!(f.block_by_name("r2").is_some());
    }

    // entry returns directly; tail is only reached from dead code.
    const DEAD_TAIL: &str = "
func @f(i32 %x) -> i32 {
entry:
  ret i32 3
dead:
  br label %tail
tail:
  ret i32 %x
}
";

    #[test]
    fn entry_return_is_never_canonical() {
        let mut f = parse_function(DEAD_TAIL).unwrap();
        assert_eq!(merge_empty_return_blocks(&mut f), 0);
        assert!(!f.has_phis(f.entry()));
        assert!(f.block_by_name("tail").is_some());
    }

    // ── Whole function ──────────────────────────────────────────────────

    #[test]
    fn diamond_with_constants_collapses() {
        let (f, stats) = run("
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %b
a:
  br label %join
b:
  br label %join
join:
  %p = phi i32 [ 1, %a ], [ 2, %b ]
  ret i32 %p
}
");
        assert!(stats.changed());
        assert_eq!(f.block_count(), 1);
        assert!(matches!(f.terminator(f.entry()), Terminator::Ret { .. }));
    }

    #[test]
    fn unreachable_cycle_is_removed() {
        let (f, stats) = run("
func @f() -> void {
entry:
  ret void
l1:
  br label %l2
l2:
  br label %l1
}
");
        assert_eq!(stats.unreachable_removed, 2);
        assert_eq!(f.block_count(), 1);
    }

    #[test]
    fn dead_return_block_does_not_reach_the_entry() {
        let (f, stats) = run(DEAD_TAIL);
        assert_eq!(stats.unreachable_removed, 2);
        assert_eq!(stats.merged_returns, 0);
        assert_eq!(f.block_count(), 1);
        assert!(f.insts(f.entry()).is_empty());
        assert_eq!(
            f.terminator(f.entry()),
            &Terminator::Ret {
                value: Some(Value::Const(Constant::new(Type::I32, 3)))
            }
        );
        parse_function(&f.to_string()).unwrap();
    }

    #[test]
    fn second_run_changes_nothing() {
        let src = "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [ 0, label %a  1, label %b  2, label %c ]
a:
  br label %join
b:
  br label %join
c:
  br label %join
d:
  br label %join
join:
  %p = phi i32 [ 10, %a ], [ 20, %b ], [ 30, %c ], [ 0, %d ]
  ret i32 %p
}
";
        let (mut f, _) = run(src);
        let printed = f.to_string();
        let again = simplify_function(&mut f, &TargetCostModel, None, &SimplifyOptions::default());
        assert!(!again.changed());
        assert_eq!(f.to_string(), printed);
    }

    #[test]
    fn dominator_tree_tracks_every_phase() {
        let mut f = parse_function(
            "
func @f(i1 %c) -> i32 {
entry:
  call void @g()
  br %c, label %a, label %b
a:
  call void @h()
  br label %ra
ra:
  ret i32 1
b:
  call void @k()
  br label %rb
rb:
  ret i32 2
dead:
  br label %ra
}
",
        )
        .unwrap();
        let mut dt = DominatorTree::new(&f);
        let opts = SimplifyOptions {
            require_dominator_preservation: true,
            ..SimplifyOptions::default()
        };
        let stats = simplify_function(&mut f, &TargetCostModel, Some(&mut dt), &opts);
        assert!(stats.changed());
        assert!(dt.matches(&f));
        assert!(dt.is_consistent_with(&f));
    }
}
