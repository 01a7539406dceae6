//! Oracles consulted by the simplifier: legality/cost and dominance.

pub mod cost;
pub mod dom;

pub use cost::{CostOracle, TargetCostModel, BASIC_COST};
pub use dom::{DomOracle, DomUpdate, DominatorTree, UpdateKind};
