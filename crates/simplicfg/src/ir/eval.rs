//! Constant evaluation.
//!
//! ## What it does
//!
//! Evaluates integer operations on [`Constant`]s with the IR's wrapping
//! semantics. The simplifier uses it to fold instructions whose operands
//! became constant (threading through PHIs, computing lookup-table results)
//! and the reference interpreter uses it to execute instructions.
//!
//! ## Safety
//!
//! Operations that trap at runtime are **not** folded:
//! - `udiv`/`sdiv`/`urem`/`srem` with divisor 0
//! - `sdiv(MIN, -1)`, whose result overflows

use super::types::*;
use super::Function;

// ── Operators ────────────────────────────────────────────────────────────────

/// Evaluates `lhs op rhs`. Returns `None` when the operation would trap.
///
/// Both operands are expected to have the same type; the result has it too.
pub fn eval_binary(op: BinOp, lhs: Constant, rhs: Constant) -> Option<Constant> {
    let ty = lhs.ty();
    let bits = ty.bits();
    let (a, b) = (lhs.as_i64(), rhs.as_i64());
    let (ua, ub) = (lhs.as_u64(), rhs.as_u64());
    // Shift amounts wrap modulo the width.
    let shamt = if bits == 0 { 0 } else { (ub % bits as u64) as u32 };
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::UDiv => ua.checked_div(ub)? as i64,
        BinOp::URem => ua.checked_rem(ub)? as i64,
        BinOp::SDiv => {
            if b == 0 || (b == -1 && a == min_signed(ty)) {
                return None;
            }
            a / b
        }
        BinOp::SRem => {
            if b == 0 {
                return None;
            }
            if b == -1 {
                0
            } else {
                a % b
            }
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => (ua as i64).wrapping_shl(shamt),
        BinOp::LShr => ua.wrapping_shr(shamt) as i64,
        BinOp::AShr => a.wrapping_shr(shamt),
    };
    Some(Constant::new(ty, v))
}

fn min_signed(ty: Type) -> i64 {
    match ty.bits() {
        0 => 0,
        64 => i64::MIN,
        n => -(1i64 << (n - 1)),
    }
}

/// Evaluates an integer comparison.
pub fn eval_cmp(pred: CmpPred, lhs: Constant, rhs: Constant) -> bool {
    let (a, b) = (lhs.as_i64(), rhs.as_i64());
    let (ua, ub) = (lhs.as_u64(), rhs.as_u64());
    match pred {
        CmpPred::Eq => a == b,
        CmpPred::Ne => a != b,
        CmpPred::Ult => ua < ub,
        CmpPred::Ule => ua <= ub,
        CmpPred::Ugt => ua > ub,
        CmpPred::Uge => ua >= ub,
        CmpPred::Slt => a < b,
        CmpPred::Sle => a <= b,
        CmpPred::Sgt => a > b,
        CmpPred::Sge => a >= b,
    }
}

/// Converts `value` to type `to`.
pub fn eval_cast(op: CastOp, value: Constant, to: Type) -> Constant {
    match op {
        CastOp::ZExt => Constant::from_u64(to, value.as_u64()),
        CastOp::SExt | CastOp::Trunc => Constant::new(to, value.as_i64()),
    }
}

// ── Instructions ─────────────────────────────────────────────────────────────

/// Folds an instruction to a constant, resolving operands through `lookup`.
///
/// Only pure instructions fold; PHIs, memory operations and calls never do.
/// `tables` resolves `tableload` reads.
pub fn fold_inst<F>(kind: &InstKind, ty: Type, tables: &[ConstTable], lookup: F) -> Option<Constant>
where
    F: Fn(Value) -> Option<Constant>,
{
    match kind {
        InstKind::Binary { op, lhs, rhs } => eval_binary(*op, lookup(*lhs)?, lookup(*rhs)?),
        InstKind::Cmp { pred, lhs, rhs } => {
            Some(Constant::bool(eval_cmp(*pred, lookup(*lhs)?, lookup(*rhs)?)))
        }
        InstKind::Select {
            cond,
            on_true,
            on_false,
        } => {
            let c = lookup(*cond)?;
            lookup(if c.is_zero() { *on_false } else { *on_true })
        }
        InstKind::Cast { op, value } => Some(eval_cast(*op, lookup(*value)?, ty)),
        InstKind::TableLoad { table, index } => {
            let idx = lookup(*index)?.as_u64();
            tables
                .get(table.0 as usize)?
                .values
                .get(usize::try_from(idx).ok()?)
                .copied()
        }
        _ => None,
    }
}

/// Folds an instruction of `func` whose operands are all constants.
pub fn fold_constant_operands(func: &Function, inst: InstId) -> Option<Constant> {
    let data = func.inst(inst);
    fold_inst(&data.kind, data.ty, &func.tables, |v| v.as_const())
}

/// If every incoming value of `phi` is the same (ignoring self references),
/// returns it.
pub fn phi_common_value(func: &Function, phi: InstId) -> Option<Value> {
    let mut common = None;
    for &(_, v) in func.phi_incoming(phi) {
        if v == Value::Inst(phi) {
            continue;
        }
        match common {
            None => common = Some(v),
            Some(c) if c == v => {}
            Some(_) => return None,
        }
    }
    common
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c32(v: i64) -> Constant {
        Constant::new(Type::I32, v)
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(eval_binary(BinOp::Add, c32(i32::MAX as i64), c32(1)), Some(c32(i32::MIN as i64)));
        assert_eq!(eval_binary(BinOp::Mul, c32(7), c32(6)), Some(c32(42)));
        assert_eq!(eval_binary(BinOp::Sub, c32(0), c32(1)), Some(c32(-1)));
    }

    #[test]
    fn div_by_zero_not_folded() {
        assert_eq!(eval_binary(BinOp::UDiv, c32(1), c32(0)), None);
        assert_eq!(eval_binary(BinOp::SRem, c32(1), c32(0)), None);
    }

    #[test]
    fn sdiv_overflow_not_folded() {
        assert_eq!(eval_binary(BinOp::SDiv, c32(i32::MIN as i64), c32(-1)), None);
        assert_eq!(eval_binary(BinOp::SRem, c32(i32::MIN as i64), c32(-1)), Some(c32(0)));
    }

    #[test]
    fn shifts_respect_width() {
        let i8c = |v| Constant::new(Type::I8, v);
        assert_eq!(eval_binary(BinOp::LShr, i8c(-1), i8c(4)), Some(i8c(0x0f)));
        assert_eq!(eval_binary(BinOp::AShr, i8c(-128), i8c(7)), Some(i8c(-1)));
        assert_eq!(eval_binary(BinOp::Shl, i8c(1), i8c(7)), Some(i8c(-128)));
    }

    #[test]
    fn unsigned_comparison_uses_width() {
        assert!(eval_cmp(CmpPred::Ugt, c32(-1), c32(5)));
        assert!(eval_cmp(CmpPred::Slt, c32(-1), c32(5)));
    }

    #[test]
    fn casts() {
        let b = Constant::new(Type::I8, -1);
        assert_eq!(eval_cast(CastOp::ZExt, b, Type::I32), c32(255));
        assert_eq!(eval_cast(CastOp::SExt, b, Type::I32), c32(-1));
        assert_eq!(eval_cast(CastOp::Trunc, c32(0x1ff), Type::I8).as_u64(), 0xff);
    }
}
