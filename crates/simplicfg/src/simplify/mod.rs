//! The CFG simplifier: local rewrite rules and the per-block fixpoint driver.
//!
//! [`simplify`] repeatedly applies the first rule that fires on a block until
//! none does. Each rule inspects the block's terminator and a fixed
//! neighborhood, and either rewrites the graph completely or leaves it
//! untouched and returns `false`. After every firing the edge changes are
//! flushed to the dominator oracle as one batch.
//!
//! Rules are tried in a fixed order: block-level rules first (dead block,
//! constant terminator, PHI cleanups, merging, sinking, two-entry PHIs), then
//! the rules keyed on the terminator kind.

use crate::ir::{BlockId, Function, Terminator};
use crate::oracle::{CostOracle, DomOracle};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

mod options;
pub use options::{FoldPriority, SimplifyOptions};

// ── Rules ────────────────────────────────────────────────────────────────────
mod common_dest;
mod compare_chain;
mod cond_stores;
mod const_fold;
mod dead_blocks;
mod hoist;
pub mod lookup_table;
mod merge_blocks;
mod phi;
mod sink;
mod speculate;
mod switch;
mod terminators;
mod thread;
mod two_entry;
pub(crate) mod utils;
mod value_compare;

pub(crate) use dead_blocks::remove_unreachable_blocks;

/// Context handed to every rule.
pub(crate) struct Cx<'a> {
    pub cost: &'a dyn CostOracle,
    pub opts: &'a SimplifyOptions,
}

/// Identifies a rewrite rule, for statistics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    DeadBlock,
    ConstantTerminator,
    DuplicatePhis,
    UndefPredecessor,
    MergeIntoPredecessor,
    SinkCommonCode,
    TwoEntryPhi,
    DuplicateReturn,
    TwoReturns,
    Resume,
    CleanupReturn,
    Unreachable,
    IndirectBranch,
    EmptyBlockForwarding,
    EqualityThreading,
    ValueComparisonFold,
    CompareChainToSwitch,
    ImpliedCondition,
    CommonDestination,
    HoistThenElse,
    Speculation,
    BranchOnPhi,
    ConditionalStores,
    CondBranchToCondBranch,
    SelectCondition,
    SwitchRangeToCompare,
    DeadSwitchCases,
    SwitchToSelect,
    ForwardSwitchCondition,
    SwitchToLookupTable,
    ReduceSwitchRange,
}

impl Rule {
    pub fn name(self) -> &'static str {
        match self {
            Rule::DeadBlock => "dead-block",
            Rule::ConstantTerminator => "constant-terminator",
            Rule::DuplicatePhis => "duplicate-phis",
            Rule::UndefPredecessor => "undef-predecessor",
            Rule::MergeIntoPredecessor => "merge-into-predecessor",
            Rule::SinkCommonCode => "sink-common-code",
            Rule::TwoEntryPhi => "two-entry-phi",
            Rule::DuplicateReturn => "duplicate-return",
            Rule::TwoReturns => "two-returns",
            Rule::Resume => "resume",
            Rule::CleanupReturn => "cleanup-return",
            Rule::Unreachable => "unreachable",
            Rule::IndirectBranch => "indirect-branch",
            Rule::EmptyBlockForwarding => "empty-block-forwarding",
            Rule::EqualityThreading => "equality-threading",
            Rule::ValueComparisonFold => "value-comparison-fold",
            Rule::CompareChainToSwitch => "compare-chain-to-switch",
            Rule::ImpliedCondition => "implied-condition",
            Rule::CommonDestination => "common-destination",
            Rule::HoistThenElse => "hoist-then-else",
            Rule::Speculation => "speculation",
            Rule::BranchOnPhi => "branch-on-phi",
            Rule::ConditionalStores => "conditional-stores",
            Rule::CondBranchToCondBranch => "cond-branch-to-cond-branch",
            Rule::SelectCondition => "select-condition",
            Rule::SwitchRangeToCompare => "switch-range-to-compare",
            Rule::DeadSwitchCases => "dead-switch-cases",
            Rule::SwitchToSelect => "switch-to-select",
            Rule::ForwardSwitchCondition => "forward-switch-condition",
            Rule::SwitchToLookupTable => "switch-to-lookup-table",
            Rule::ReduceSwitchRange => "reduce-switch-range",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rule firing counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    pub firings: BTreeMap<Rule, usize>,
}

impl SimplifyStats {
    pub fn total(&self) -> usize {
        self.firings.values().sum()
    }

    pub fn count(&self, rule: Rule) -> usize {
        self.firings.get(&rule).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &SimplifyStats) {
        for (&rule, &n) in &other.firings {
            *self.firings.entry(rule).or_default() += n;
        }
    }
}

impl fmt::Display for SimplifyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (rule, n) in &self.firings {
            writeln!(f, "{n:>6}  {rule}")?;
        }
        Ok(())
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Per-block fixpoint driver.
pub struct Simplifier<'a> {
    cost: &'a dyn CostOracle,
    dom: Option<&'a mut dyn DomOracle>,
    options: &'a SimplifyOptions,
    stats: SimplifyStats,
}

impl<'a> Simplifier<'a> {
    /// Panics if the options require dominator preservation and no oracle
    /// is supplied.
    pub fn new(
        cost: &'a dyn CostOracle,
        dom: Option<&'a mut dyn DomOracle>,
        options: &'a SimplifyOptions,
    ) -> Self {
        assert!(
            dom.is_some() || !options.require_dominator_preservation,
            "require_dominator_preservation is set but no dominator oracle was supplied"
        );
        Simplifier {
            cost,
            dom,
            options,
            stats: SimplifyStats::default(),
        }
    }

    pub fn stats(&self) -> &SimplifyStats {
        &self.stats
    }

    pub fn into_stats(self) -> SimplifyStats {
        self.stats
    }

    /// Hands edits made outside the driver to the dominator oracle.
    pub fn sync_dominators(&mut self, func: &mut Function) {
        let updates = func.take_dom_updates();
        if let Some(dom) = self.dom.as_deref_mut() {
            dom.apply_updates(&updates);
        }
    }

    /// Simplifies `block` to a fixpoint. Returns whether anything changed.
    ///
    /// Stops early once the block itself has been deleted.
    pub fn run(&mut self, func: &mut Function, block: BlockId) -> bool {
        // Edits made outside the driver are not ours to report.
        func.take_dom_updates();
        let mut changed = false;
        let mut iterations = 0usize;
        while func.is_live(block) {
            let Some(rule) = self.simplify_once(func, block) else {
                break;
            };
            if iterations == self.options.max_iterations {
                panic!(
                    "simplification of {} in @{} did not converge after {} rule firings",
                    block, func.name, iterations
                );
            }
            changed = true;
            iterations += 1;
            debug!(rule = rule.name(), block = %block, func = %func.name, "rule fired");
            *self.stats.firings.entry(rule).or_default() += 1;

            let updates = func.take_dom_updates();
            if let Some(dom) = self.dom.as_deref_mut() {
                dom.apply_updates(&updates);
            }
            #[cfg(debug_assertions)]
            crate::verify::assert_valid(func);
        }
        changed
    }

    /// Tries the rules in order and returns the first one that fired.
    fn simplify_once(&self, func: &mut Function, b: BlockId) -> Option<Rule> {
        let cx = Cx {
            cost: self.cost,
            opts: self.options,
        };
        macro_rules! attempt {
            ($rule:expr, $e:expr) => {
                if $e {
                    return Some($rule);
                }
            };
        }

        attempt!(Rule::DeadBlock, dead_blocks::eliminate(func, b));
        attempt!(Rule::ConstantTerminator, const_fold::fold_terminator(func, b));
        attempt!(Rule::DuplicatePhis, phi::merge_duplicate_phis(func, b));
        attempt!(Rule::UndefPredecessor, phi::remove_undef_introducing_preds(func, b));
        attempt!(Rule::MergeIntoPredecessor, merge_blocks::merge_into_predecessor(func, b));
        if cx.opts.enable_sinking {
            attempt!(Rule::SinkCommonCode, sink::sink_common_code(func, b, &cx));
        }
        attempt!(Rule::TwoEntryPhi, two_entry::fold_two_entry_phi(func, b, &cx));

        match func.terminator(b) {
            Terminator::Br { .. } => {
                attempt!(Rule::EmptyBlockForwarding, merge_blocks::forward_empty_block(func, b, &cx));
            }
            Terminator::CondBr { .. } => return self.simplify_cond_branch(func, b, &cx),
            Terminator::Ret { .. } => return terminators::simplify_return(func, b, &cx),
            Terminator::Resume { .. } => {
                attempt!(Rule::Resume, terminators::simplify_resume(func, b));
            }
            Terminator::CleanupRet { .. } => {
                attempt!(Rule::CleanupReturn, terminators::simplify_cleanup_return(func, b));
            }
            Terminator::Unreachable => {
                attempt!(Rule::Unreachable, terminators::simplify_unreachable(func, b));
            }
            Terminator::IndirectBr { .. } => {
                attempt!(Rule::IndirectBranch, terminators::simplify_indirect_br(func, b));
            }
            Terminator::Switch { .. } => return self.simplify_switch(func, b, &cx),
            Terminator::Invoke { .. } => {}
        }
        None
    }

    fn simplify_cond_branch(&self, func: &mut Function, b: BlockId, cx: &Cx) -> Option<Rule> {
        let value_comparison = |func: &mut Function| -> Option<Rule> {
            if value_compare::thread_with_only_predecessor(func, b) {
                return Some(Rule::EqualityThreading);
            }
            if value_compare::fold_into_predecessors_if_trivial(func, b) {
                return Some(Rule::ValueComparisonFold);
            }
            if compare_chain::fold_compare_chain_to_switch(func, b) {
                return Some(Rule::CompareChainToSwitch);
            }
            None
        };
        let common_destination = |func: &mut Function| -> Option<Rule> {
            common_dest::fold_branch_to_common_dest(func, b, cx).then_some(Rule::CommonDestination)
        };

        match cx.opts.fold_priority {
            FoldPriority::ValueComparisonFirst => {
                if let Some(rule) = value_comparison(func) {
                    return Some(rule);
                }
                if value_compare::fold_implied_condition(func, b) {
                    return Some(Rule::ImpliedCondition);
                }
                if let Some(rule) = common_destination(func) {
                    return Some(rule);
                }
            }
            FoldPriority::CommonDestinationFirst => {
                if let Some(rule) = common_destination(func) {
                    return Some(rule);
                }
                if let Some(rule) = value_comparison(func) {
                    return Some(rule);
                }
                if value_compare::fold_implied_condition(func, b) {
                    return Some(Rule::ImpliedCondition);
                }
            }
        }

        let Terminator::CondBr {
            if_true, if_false, ..
        } = *func.terminator(b)
        else {
            return None;
        };
        if func.single_pred(if_true) == Some(b) {
            if func.single_pred(if_false) == Some(b) && cx.opts.enable_hoisting {
                if hoist::hoist_then_else(func, b, cx) {
                    return Some(Rule::HoistThenElse);
                }
            } else if func.single_succ(if_true) == Some(if_false)
                && speculate::speculatively_execute(func, b, if_true, cx)
            {
                return Some(Rule::Speculation);
            }
        } else if func.single_pred(if_false) == Some(b)
            && func.single_succ(if_false) == Some(if_true)
            && speculate::speculatively_execute(func, b, if_false, cx)
        {
            return Some(Rule::Speculation);
        }

        if thread::fold_branch_on_phi(func, b) {
            return Some(Rule::BranchOnPhi);
        }
        if cx.opts.merge_conditional_stores && cond_stores::merge_conditional_stores(func, b, cx) {
            return Some(Rule::ConditionalStores);
        }
        if common_dest::fold_cond_branch_to_cond_branch(func, b, cx) {
            return Some(Rule::CondBranchToCondBranch);
        }
        None
    }

    fn simplify_switch(&self, func: &mut Function, b: BlockId, cx: &Cx) -> Option<Rule> {
        if value_compare::is_value_comparison(func, b).is_some() {
            if value_compare::thread_with_only_predecessor(func, b) {
                return Some(Rule::EqualityThreading);
            }
            if terminators::simplify_switch_on_select(func, b) {
                return Some(Rule::SelectCondition);
            }
            if value_compare::fold_into_predecessors_if_trivial(func, b) {
                return Some(Rule::ValueComparisonFold);
            }
        }
        if switch::range_to_compare(func, b) {
            return Some(Rule::SwitchRangeToCompare);
        }
        if switch::eliminate_dead_cases(func, b) {
            return Some(Rule::DeadSwitchCases);
        }
        if switch::switch_to_select(func, b) {
            return Some(Rule::SwitchToSelect);
        }
        if switch::forward_condition_to_phi(func, b) {
            return Some(Rule::ForwardSwitchCondition);
        }
        if cx.opts.enable_lookup_tables && lookup_table::switch_to_lookup_table(func, b, cx) {
            return Some(Rule::SwitchToLookupTable);
        }
        if switch::reduce_range(func, b, cx) {
            return Some(Rule::ReduceSwitchRange);
        }
        None
    }
}

/// Simplifies `block` of `func` to a fixpoint. Returns whether anything
/// changed. Dominator updates are streamed to `dom` when given.
pub fn simplify<'a>(
    func: &mut Function,
    block: BlockId,
    cost: &'a dyn CostOracle,
    dom: Option<&'a mut dyn DomOracle>,
    options: &'a SimplifyOptions,
) -> bool {
    simplify_with_stats(func, block, cost, dom, options).0
}

/// Like [`simplify`], also returning which rules fired.
pub fn simplify_with_stats<'a>(
    func: &mut Function,
    block: BlockId,
    cost: &'a dyn CostOracle,
    dom: Option<&'a mut dyn DomOracle>,
    options: &'a SimplifyOptions,
) -> (bool, SimplifyStats) {
    let mut simplifier = Simplifier::new(cost, dom, options);
    let changed = simplifier.run(func, block);
    (changed, simplifier.into_stats())
}
