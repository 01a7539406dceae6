//! Simplifier configuration.

use crate::ir::BlockId;
use std::collections::BTreeSet;

/// Which of two overlapping conditional-branch folds is tried first.
///
/// Both the value-comparison folds and the common-destination fold can
/// apply to the same block; they produce different but equally valid code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoldPriority {
    /// Thread and merge equality comparisons before combining conditions.
    #[default]
    ValueComparisonFirst,
    /// Combine conditions into a common destination first.
    CommonDestinationFirst,
}

/// Knobs of the CFG simplifier. `Default` gives the standard configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifyOptions {
    /// Hoist identical leading instructions of both branch arms.
    pub enable_hoisting: bool,
    /// Sink identical trailing instructions of predecessors.
    pub enable_sinking: bool,
    /// Turn switches into constant-table lookups.
    pub enable_lookup_tables: bool,
    /// Extra instructions the common-destination fold may duplicate into
    /// each predecessor.
    pub bonus_instruction_budget: u32,
    /// Budget, in basic-cost units, for speculating a branch arm.
    pub phi_folding_threshold: u32,
    /// Budget for speculating both arms of a diamond into selects.
    pub two_entry_phi_folding_threshold: u32,
    /// A dominator oracle must be supplied to the driver.
    pub require_dominator_preservation: bool,
    /// Loop headers that empty-block forwarding must not remove.
    pub loop_header_hints: Option<BTreeSet<BlockId>>,
    pub fold_priority: FoldPriority,
    /// Allow speculating a store whose address the branching block stores to.
    pub speculate_stores: bool,
    /// Merge paired conditional stores to one address.
    pub merge_conditional_stores: bool,
    /// Fold return blocks into their unconditional predecessors.
    pub duplicate_returns: bool,
    /// Rule firings on one block after which the driver panics.
    pub max_iterations: usize,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        SimplifyOptions {
            enable_hoisting: true,
            enable_sinking: true,
            enable_lookup_tables: true,
            bonus_instruction_budget: 1,
            phi_folding_threshold: 2,
            two_entry_phi_folding_threshold: 4,
            require_dominator_preservation: false,
            loop_header_hints: None,
            fold_priority: FoldPriority::ValueComparisonFirst,
            speculate_stores: true,
            merge_conditional_stores: true,
            duplicate_returns: false,
            max_iterations: 1000,
        }
    }
}

impl SimplifyOptions {
    /// Whether `b` was declared a loop header.
    pub fn is_loop_header(&self, b: BlockId) -> bool {
        self.loop_header_hints
            .as_ref()
            .is_some_and(|hints| hints.contains(&b))
    }
}
