//! IR type definitions.
//!
//! These types describe an SSA-form control-flow graph: a function owns an
//! arena of basic blocks and an arena of instructions, both addressed by
//! stable ids. Every block lists its instructions in order (PHI nodes first)
//! and ends in exactly one [`Terminator`].

use std::fmt;

/// Stable handle of a basic block inside its [`Function`](super::Function).
/// Handles are never reused, even after the block is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Stable handle of an instruction inside its function's instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// Index of a constant table owned by the function (see [`ConstTable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

/// Value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    I1,
    I8,
    I16,
    I32,
    I64,
    /// 64-bit address.
    Ptr,
    /// Exception-handling value produced by pads. Only landing-pad values
    /// are merged by PHIs, on the way to a shared `resume`.
    Token,
    Void,
}

impl Type {
    /// Width in bits; zero for `token` and `void`.
    pub fn bits(self) -> u32 {
        match self {
            Type::I1 => 1,
            Type::I8 => 8,
            Type::I16 => 16,
            Type::I32 => 32,
            Type::I64 | Type::Ptr => 64,
            Type::Token | Type::Void => 0,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Type::I1 | Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    /// Smallest integer type at least `bits` wide.
    pub fn int_with_bits(bits: u64) -> Option<Type> {
        match bits {
            0..=1 => Some(Type::I1),
            2..=8 => Some(Type::I8),
            9..=16 => Some(Type::I16),
            17..=32 => Some(Type::I32),
            33..=64 => Some(Type::I64),
            _ => None,
        }
    }

    /// All-ones mask covering the type's width.
    pub fn mask(self) -> u64 {
        match self.bits() {
            0 => 0,
            64 => u64::MAX,
            n => (1u64 << n) - 1,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Type::I1 => "i1",
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::Ptr => "ptr",
            Type::Token => "token",
            Type::Void => "void",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Type> {
        Some(match s {
            "i1" => Type::I1,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "ptr" => Type::Ptr,
            "token" => Type::Token,
            "void" => Type::Void,
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// ── Constants and values ─────────────────────────────────────────────────────

/// Integer constant. The payload is kept sign-extended from the type's width,
/// so two constants of the same type are equal iff their bit patterns are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constant {
    ty: Type,
    bits: i64,
}

impl Constant {
    pub fn new(ty: Type, value: i64) -> Self {
        let width = ty.bits();
        let bits = if width == 0 || width >= 64 {
            value
        } else {
            let shift = 64 - width;
            (value << shift) >> shift
        };
        Constant { ty, bits }
    }

    /// Builds a constant from an unsigned bit pattern, truncated to `ty`.
    pub fn from_u64(ty: Type, value: u64) -> Self {
        Constant::new(ty, value as i64)
    }

    pub fn bool(value: bool) -> Self {
        Constant::new(Type::I1, value as i64)
    }

    pub fn zero(ty: Type) -> Self {
        Constant::new(ty, 0)
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Signed interpretation.
    pub fn as_i64(&self) -> i64 {
        self.bits
    }

    /// Unsigned interpretation (zero-extended from the type's width).
    pub fn as_u64(&self) -> u64 {
        (self.bits as u64) & self.ty.mask()
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    pub fn is_one(&self) -> bool {
        self.as_u64() == 1
    }

    pub fn is_all_ones(&self) -> bool {
        self.bits == -1
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::I1 => write!(f, "{}", if self.is_zero() { "false" } else { "true" }),
            _ => write!(f, "{}", self.bits),
        }
    }
}

/// An SSA operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Result of an instruction.
    Inst(InstId),
    /// Function parameter by position.
    Arg(u32),
    Const(Constant),
    Undef(Type),
    /// Address of a block, consumed by `indirectbr`.
    BlockAddr(BlockId),
}

impl Value {
    pub fn constant(ty: Type, value: i64) -> Value {
        Value::Const(Constant::new(ty, value))
    }

    pub fn as_const(&self) -> Option<Constant> {
        match self {
            Value::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef(_))
    }
}

// ── Operators ────────────────────────────────────────────────────────────────

/// Two-operand integer arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    pub const ALL: [BinOp; 13] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::UDiv,
        BinOp::SDiv,
        BinOp::URem,
        BinOp::SRem,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Shl,
        BinOp::LShr,
        BinOp::AShr,
    ];

    pub fn is_div_rem(self) -> bool {
        matches!(self, BinOp::UDiv | BinOp::SDiv | BinOp::URem | BinOp::SRem)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::UDiv => "udiv",
            BinOp::SDiv => "sdiv",
            BinOp::URem => "urem",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<BinOp> {
        BinOp::ALL.into_iter().find(|op| op.mnemonic() == s)
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPred {
    pub const ALL: [CmpPred; 10] = [
        CmpPred::Eq,
        CmpPred::Ne,
        CmpPred::Ult,
        CmpPred::Ule,
        CmpPred::Ugt,
        CmpPred::Uge,
        CmpPred::Slt,
        CmpPred::Sle,
        CmpPred::Sgt,
        CmpPred::Sge,
    ];

    /// The predicate that is true exactly when `self` is false.
    pub fn inverse(self) -> CmpPred {
        match self {
            CmpPred::Eq => CmpPred::Ne,
            CmpPred::Ne => CmpPred::Eq,
            CmpPred::Ult => CmpPred::Uge,
            CmpPred::Ule => CmpPred::Ugt,
            CmpPred::Ugt => CmpPred::Ule,
            CmpPred::Uge => CmpPred::Ult,
            CmpPred::Slt => CmpPred::Sge,
            CmpPred::Sle => CmpPred::Sgt,
            CmpPred::Sgt => CmpPred::Sle,
            CmpPred::Sge => CmpPred::Slt,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CmpPred::Eq | CmpPred::Ne)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<CmpPred> {
        CmpPred::ALL.into_iter().find(|p| p.mnemonic() == s)
    }
}

/// Integer width conversions. The destination type is the instruction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<CastOp> {
        match s {
            "zext" => Some(CastOp::ZExt),
            "sext" => Some(CastOp::SExt),
            "trunc" => Some(CastOp::Trunc),
            _ => None,
        }
    }
}

/// Call-site attributes that affect movement and duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallFlags {
    /// Must be immediately followed by a `ret` of its result.
    pub musttail: bool,
    /// Two call sites must never be merged into one.
    pub nomerge: bool,
    /// Does not touch memory.
    pub readnone: bool,
    /// Cannot unwind.
    pub nounwind: bool,
}

// ── Instructions ─────────────────────────────────────────────────────────────

/// Non-terminator instruction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    /// SSA merge: one incoming value per distinct predecessor.
    Phi { incoming: Vec<(BlockId, Value)> },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    /// Produces an `i1`.
    Cmp { pred: CmpPred, lhs: Value, rhs: Value },
    Select {
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Cast { op: CastOp, value: Value },
    Load { ptr: Value, volatile: bool },
    Store {
        ptr: Value,
        value: Value,
        volatile: bool,
    },
    Call {
        callee: String,
        args: Vec<Value>,
        flags: CallFlags,
    },
    /// Reads element `index` of a function-owned constant table.
    TableLoad { table: TableId, index: Value },
    /// Head of an `invoke` unwind destination; yields the in-flight exception.
    LandingPad,
    /// Head of a cleanup funclet; yields its token.
    CleanupPad,
    /// Debug-value marker. Free to execute, carries a source location.
    Debug { value: Value, loc: u32 },
}

impl InstKind {
    /// Calls `f` with every operand read by the instruction, in order.
    pub fn for_each_operand<F: FnMut(&Value)>(&self, mut f: F) {
        match self {
            InstKind::Phi { incoming } => {
                for (_, v) in incoming {
                    f(v);
                }
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                f(cond);
                f(on_true);
                f(on_false);
            }
            InstKind::Cast { value, .. } => f(value),
            InstKind::Load { ptr, .. } => f(ptr),
            InstKind::Store { ptr, value, .. } => {
                f(value);
                f(ptr);
            }
            InstKind::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            InstKind::TableLoad { index, .. } => f(index),
            InstKind::LandingPad | InstKind::CleanupPad => {}
            InstKind::Debug { value, .. } => f(value),
        }
    }

    /// Mutable counterpart of [`InstKind::for_each_operand`], same order.
    pub fn for_each_operand_mut<F: FnMut(&mut Value)>(&mut self, mut f: F) {
        match self {
            InstKind::Phi { incoming } => {
                for (_, v) in incoming {
                    f(v);
                }
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                f(cond);
                f(on_true);
                f(on_false);
            }
            InstKind::Cast { value, .. } => f(value),
            InstKind::Load { ptr, .. } => f(ptr),
            InstKind::Store { ptr, value, .. } => {
                f(value);
                f(ptr);
            }
            InstKind::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            InstKind::TableLoad { index, .. } => f(index),
            InstKind::LandingPad | InstKind::CleanupPad => {}
            InstKind::Debug { value, .. } => f(value),
        }
    }

    pub fn operands(&self) -> Vec<Value> {
        let mut ops = Vec::new();
        self.for_each_operand(|v| ops.push(*v));
        ops
    }

    /// Overwrites operand `idx` (in [`InstKind::for_each_operand`] order).
    pub fn set_operand(&mut self, idx: usize, value: Value) {
        let mut i = 0;
        self.for_each_operand_mut(|v| {
            if i == idx {
                *v = value;
            }
            i += 1;
        });
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, InstKind::Debug { .. })
    }

    pub fn is_eh_pad(&self) -> bool {
        matches!(self, InstKind::LandingPad | InstKind::CleanupPad)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, InstKind::Call { .. })
    }

    /// Writes memory, may unwind, or is volatile.
    pub fn may_have_side_effects(&self) -> bool {
        match self {
            InstKind::Store { .. } => true,
            InstKind::Load { volatile, .. } => *volatile,
            InstKind::Call { flags, .. } => !flags.readnone || !flags.nounwind,
            InstKind::LandingPad | InstKind::CleanupPad => true,
            _ => false,
        }
    }

    pub fn may_read_or_write_memory(&self) -> bool {
        match self {
            InstKind::Load { .. } | InstKind::Store { .. } | InstKind::TableLoad { .. } => true,
            InstKind::Call { flags, .. } => !flags.readnone,
            _ => false,
        }
    }

    /// Same opcode and non-operand attributes; operands may differ.
    pub fn same_operation_as(&self, other: &InstKind) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        if a.operands().len() != b.operands().len() {
            return false;
        }
        a.for_each_operand_mut(|v| *v = Value::Undef(Type::Void));
        b.for_each_operand_mut(|v| *v = Value::Undef(Type::Void));
        a == b
    }

    /// Structurally identical, operands included. PHIs are never identical
    /// because their meaning depends on the block they live in.
    pub fn is_identical_to(&self, other: &InstKind) -> bool {
        !self.is_phi() && self == other
    }
}

/// Arena slot of one instruction.
#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    /// Result type; `void` for instructions without a result.
    pub ty: Type,
    /// Preferred printing name.
    pub name: Option<String>,
    /// Owning block; `None` once the instruction is removed.
    pub(crate) block: Option<BlockId>,
}

impl InstData {
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }
}

/// Read-only table of integer constants created by switch lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstTable {
    pub name: String,
    pub elem_ty: Type,
    pub values: Vec<Constant>,
}

// ── Terminators ──────────────────────────────────────────────────────────────

/// One `switch` case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCase {
    pub value: Constant,
    pub dest: BlockId,
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional branch.
    Br { target: BlockId },
    /// Two-way branch on an `i1`. Weights are `[true, false]`.
    CondBr {
        cond: Value,
        if_true: BlockId,
        if_false: BlockId,
        weights: Option<[u32; 2]>,
    },
    /// Multi-way branch. Weights are `[default, case 0, case 1, ...]`.
    Switch {
        cond: Value,
        default: BlockId,
        cases: Vec<SwitchCase>,
        weights: Option<Vec<u32>>,
    },
    Ret { value: Option<Value> },
    Unreachable,
    /// Continue unwinding with the given exception.
    Resume { value: Value },
    /// Leave a cleanup funclet, unwinding to `unwind` or to the caller.
    CleanupRet { pad: Value, unwind: Option<BlockId> },
    IndirectBr { addr: Value, dests: Vec<BlockId> },
    /// Call that transfers to `normal` on return and `unwind` on exception.
    Invoke {
        callee: String,
        args: Vec<Value>,
        normal: BlockId,
        unwind: BlockId,
    },
}

impl Terminator {
    /// Successor slots in order, duplicates included.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br { target } => vec![*target],
            Terminator::CondBr {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            Terminator::Switch { default, cases, .. } => std::iter::once(*default)
                .chain(cases.iter().map(|c| c.dest))
                .collect(),
            Terminator::Ret { .. } | Terminator::Unreachable | Terminator::Resume { .. } => {
                vec![]
            }
            Terminator::CleanupRet { unwind, .. } => unwind.iter().copied().collect(),
            Terminator::IndirectBr { dests, .. } => dests.clone(),
            Terminator::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
        }
    }

    /// Calls `f` with every successor slot, in [`Terminator::successors`] order.
    pub fn for_each_successor_mut<F: FnMut(&mut BlockId)>(&mut self, mut f: F) {
        match self {
            Terminator::Br { target } => f(target),
            Terminator::CondBr {
                if_true, if_false, ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Switch { default, cases, .. } => {
                f(default);
                for c in cases {
                    f(&mut c.dest);
                }
            }
            Terminator::Ret { .. } | Terminator::Unreachable | Terminator::Resume { .. } => {}
            Terminator::CleanupRet { unwind, .. } => {
                if let Some(u) = unwind {
                    f(u);
                }
            }
            Terminator::IndirectBr { dests, .. } => {
                for d in dests {
                    f(d);
                }
            }
            Terminator::Invoke { normal, unwind, .. } => {
                f(normal);
                f(unwind);
            }
        }
    }

    /// Replaces every successor slot equal to `from` with `to`.
    pub fn replace_successor(&mut self, from: BlockId, to: BlockId) {
        self.for_each_successor_mut(|s| {
            if *s == from {
                *s = to;
            }
        });
    }

    pub fn for_each_operand<F: FnMut(&Value)>(&self, mut f: F) {
        match self {
            Terminator::CondBr { cond, .. } | Terminator::Switch { cond, .. } => f(cond),
            Terminator::Ret { value: Some(v) } | Terminator::Resume { value: v } => f(v),
            Terminator::CleanupRet { pad, .. } => f(pad),
            Terminator::IndirectBr { addr, .. } => f(addr),
            Terminator::Invoke { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Terminator::Br { .. } | Terminator::Ret { value: None } | Terminator::Unreachable => {}
        }
    }

    pub fn for_each_operand_mut<F: FnMut(&mut Value)>(&mut self, mut f: F) {
        match self {
            Terminator::CondBr { cond, .. } | Terminator::Switch { cond, .. } => f(cond),
            Terminator::Ret { value: Some(v) } | Terminator::Resume { value: v } => f(v),
            Terminator::CleanupRet { pad, .. } => f(pad),
            Terminator::IndirectBr { addr, .. } => f(addr),
            Terminator::Invoke { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Terminator::Br { .. } | Terminator::Ret { value: None } | Terminator::Unreachable => {}
        }
    }

    /// Identical apart from profile weights.
    pub fn is_identical_to(&self, other: &Terminator) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.clear_weights();
        b.clear_weights();
        a == b
    }

    pub fn clear_weights(&mut self) {
        match self {
            Terminator::CondBr { weights, .. } => *weights = None,
            Terminator::Switch { weights, .. } => *weights = None,
            _ => {}
        }
    }

    /// The branch condition of a `br` or `switch`.
    pub fn condition(&self) -> Option<Value> {
        match self {
            Terminator::CondBr { cond, .. } | Terminator::Switch { cond, .. } => Some(*cond),
            _ => None,
        }
    }

    /// Terminators that leave through the exception path.
    pub fn is_exceptional(&self) -> bool {
        matches!(
            self,
            Terminator::Invoke { .. } | Terminator::Resume { .. } | Terminator::CleanupRet { .. }
        )
    }

    pub fn is_unconditional_br(&self) -> bool {
        matches!(self, Terminator::Br { .. })
    }

    pub fn is_cond_br(&self) -> bool {
        matches!(self, Terminator::CondBr { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_normalize_to_width() {
        let c = Constant::new(Type::I8, 255);
        assert_eq!(c.as_i64(), -1);
        assert_eq!(c.as_u64(), 255);
        assert_eq!(c, Constant::new(Type::I8, -1));
        assert!(Constant::bool(true).is_one());
        assert_eq!(Constant::from_u64(Type::I32, u64::MAX).as_u64(), 0xffff_ffff);
    }

    #[test]
    fn int_with_bits_rounds_up() {
        assert_eq!(Type::int_with_bits(1), Some(Type::I1));
        assert_eq!(Type::int_with_bits(9), Some(Type::I16));
        assert_eq!(Type::int_with_bits(64), Some(Type::I64));
        assert_eq!(Type::int_with_bits(65), None);
    }

    #[test]
    fn same_operation_ignores_operands() {
        let a = InstKind::Binary {
            op: BinOp::Add,
            lhs: Value::Arg(0),
            rhs: Value::constant(Type::I32, 1),
        };
        let b = InstKind::Binary {
            op: BinOp::Add,
            lhs: Value::Arg(1),
            rhs: Value::constant(Type::I32, 2),
        };
        let c = InstKind::Binary {
            op: BinOp::Sub,
            lhs: Value::Arg(0),
            rhs: Value::constant(Type::I32, 1),
        };
        assert!(a.same_operation_as(&b));
        assert!(!a.same_operation_as(&c));
        assert!(!a.is_identical_to(&b));
    }

    #[test]
    fn successors_cover_every_terminator() {
        let sw = Terminator::Switch {
            cond: Value::Arg(0),
            default: BlockId(1),
            cases: vec![
                SwitchCase {
                    value: Constant::new(Type::I32, 0),
                    dest: BlockId(2),
                },
                SwitchCase {
                    value: Constant::new(Type::I32, 1),
                    dest: BlockId(2),
                },
            ],
            weights: None,
        };
        assert_eq!(sw.successors(), vec![BlockId(1), BlockId(2), BlockId(2)]);
        assert!(Terminator::Unreachable.successors().is_empty());
        let cr = Terminator::CleanupRet {
            pad: Value::Arg(0),
            unwind: None,
        };
        assert!(cr.successors().is_empty());
    }

    #[test]
    fn replace_successor_rewrites_all_slots() {
        let mut t = Terminator::CondBr {
            cond: Value::Arg(0),
            if_true: BlockId(3),
            if_false: BlockId(3),
            weights: Some([1, 2]),
        };
        t.replace_successor(BlockId(3), BlockId(4));
        assert_eq!(t.successors(), vec![BlockId(4), BlockId(4)]);
    }
}
