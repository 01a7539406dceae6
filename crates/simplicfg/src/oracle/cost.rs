//! Legality and cost oracle.
//!
//! Rules consult a [`CostOracle`] before speculating, duplicating or sinking
//! instructions and before building lookup tables. The trait is the seam
//! where a target plugs in; [`TargetCostModel`] is a conservative generic
//! model with a 64-bit register file.

use crate::ir::{BinOp, Function, InstId, InstKind, Type, Value};

/// Abstract cost of a cheap instruction.
pub const BASIC_COST: u32 = 1;

/// Capability interface answering legality and profitability questions.
pub trait CostOracle {
    /// Whether `inst` may execute on paths where it did not originally run.
    fn is_safe_to_speculate(&self, func: &Function, inst: InstId) -> bool;

    /// Cost of executing `inst` unconditionally.
    fn speculation_cost(&self, func: &Function, inst: InstId) -> u32;

    /// Cost of an arithmetic operation on `ty`.
    fn arithmetic_cost(&self, _op: BinOp, _ty: Type) -> u32 {
        BASIC_COST
    }

    /// Cost of a `select` producing `ty`.
    fn select_cost(&self, _ty: Type) -> u32 {
        BASIC_COST
    }

    /// Whether hoisting `inst` out of a conditional region pays off.
    fn is_profitable_to_hoist(&self, _func: &Function, _inst: InstId) -> bool {
        true
    }

    /// Whether switches may be turned into table lookups at all.
    fn should_build_lookup_tables(&self) -> bool {
        true
    }

    /// Widest integer held in one register.
    fn largest_legal_int_width(&self) -> u32 {
        64
    }

    /// Whether values of `ty` live in a register natively.
    fn is_type_legal(&self, ty: Type) -> bool {
        (ty.is_integer() && ty.bits() >= 8 && ty.bits() <= self.largest_legal_int_width())
            || ty == Type::Ptr
    }

    /// Probability, in percent, above which a branch counts as predictable.
    fn predictable_branch_percent(&self) -> u32 {
        99
    }
}

/// Generic cost model.
///
/// Division is four basic units, truncation and debug markers are free,
/// everything else is one unit. Memory operations and exception pads are
/// never speculated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetCostModel;

impl CostOracle for TargetCostModel {
    fn is_safe_to_speculate(&self, func: &Function, inst: InstId) -> bool {
        match func.kind(inst) {
            InstKind::Binary { op, rhs, .. } if op.is_div_rem() => match rhs {
                // Signed division by -1 traps on the minimum value.
                Value::Const(c) => {
                    !c.is_zero() && !(matches!(op, BinOp::SDiv | BinOp::SRem) && c.is_all_ones())
                }
                _ => false,
            },
            InstKind::Binary { .. }
            | InstKind::Cmp { .. }
            | InstKind::Select { .. }
            | InstKind::Cast { .. }
            | InstKind::Debug { .. } => true,
            InstKind::Call { flags, .. } => flags.readnone && flags.nounwind && !flags.musttail,
            InstKind::Phi { .. }
            | InstKind::Load { .. }
            | InstKind::Store { .. }
            | InstKind::TableLoad { .. }
            | InstKind::LandingPad
            | InstKind::CleanupPad => false,
        }
    }

    fn speculation_cost(&self, func: &Function, inst: InstId) -> u32 {
        let data = func.inst(inst);
        match &data.kind {
            InstKind::Binary { op, .. } if op.is_div_rem() => 4 * BASIC_COST,
            InstKind::Binary { op, .. } => self.arithmetic_cost(*op, data.ty),
            InstKind::Select { .. } => self.select_cost(data.ty),
            InstKind::Cast {
                op: crate::ir::CastOp::Trunc,
                ..
            }
            | InstKind::Debug { .. } => 0,
            _ => BASIC_COST,
        }
    }
}
