//! Compare chains to switches.
//!
//! A branch on an `or` of equality compares against one value, or on an
//! `and` of inequalities, becomes a switch on that value:
//!
//! ```text
//!   %a = icmp eq i32 %x, 1
//!   %b = icmp eq i32 %x, 7               switch i32 %x, label %F [
//!   %c = or i1 %a, %b              →       1, label %T
//!   br %c, label %T, label %F              7, label %T ]
//! ```
//!
//! A compare that pins the value to a handful of values (`icmp ult %x, 3`,
//! possibly through an `add` of a constant) contributes all of them. One
//! leaf of the chain that is not such a compare is tested first, in the
//! block itself, and the switch moves to a new `switch.early.test` block.

use super::utils::{replace_terminator, split_block_at};
use crate::ir::{BinOp, BlockId, CmpPred, Constant, Function, InstKind, SwitchCase, Terminator, Type, Value};
use std::collections::HashSet;
use tracing::trace;

/// Most values one ranged compare may contribute.
const MAX_RANGE_VALUES: u128 = 8;

/// A non-empty run of values modulo `2^bits`, starting at `lo`.
#[derive(Debug, Clone, Copy)]
struct Span {
    lo: u128,
    size: u128,
    modulus: u128,
}

impl Span {
    /// The values `x` for which `icmp pred x, c` holds.
    fn allowed(pred: CmpPred, c: Constant) -> Span {
        let modulus = 1u128 << c.ty().bits();
        let smin = modulus / 2;
        let c = u128::from(c.as_u64());
        let wrap = |v: u128| v % modulus;
        let (lo, size) = match pred {
            CmpPred::Eq => (c, 1),
            CmpPred::Ne => (c + 1, modulus - 1),
            CmpPred::Ult => (0, c),
            CmpPred::Ule => (0, c + 1),
            CmpPred::Ugt => (c + 1, modulus - c - 1),
            CmpPred::Uge => (c, modulus - c),
            CmpPred::Slt => (smin, wrap(c + modulus - smin)),
            CmpPred::Sle => (smin, wrap(c + modulus - smin) + 1),
            CmpPred::Sgt => (c + 1, wrap(smin + 2 * modulus - c - 1)),
            CmpPred::Sge => (c, wrap(smin + 2 * modulus - c - 1) + 1),
        };
        Span {
            lo: wrap(lo),
            size,
            modulus,
        }
    }

    fn inverse(self) -> Span {
        Span {
            lo: (self.lo + self.size) % self.modulus,
            size: self.modulus - self.size,
            modulus: self.modulus,
        }
    }

    /// The values `x` with `x + k` in the span.
    fn subtract(self, k: Constant) -> Span {
        let k = u128::from(k.as_u64()) % self.modulus;
        Span {
            lo: (self.lo + self.modulus - k) % self.modulus,
            ..self
        }
    }

    fn values(self, ty: Type) -> impl Iterator<Item = Constant> {
        (0..self.size).map(move |j| Constant::from_u64(ty, ((self.lo + j) % self.modulus) as u64))
    }
}

/// The compares of a chain that test one value against constants.
#[derive(Debug, Default)]
struct Gathered {
    value: Option<Value>,
    values: Vec<Constant>,
    /// The one leaf that is not such a compare.
    extra: Option<Value>,
    used_compares: usize,
}

impl Gathered {
    /// Walks the `or` (`is_eq`) or `and` tree rooted at `cond`.
    fn gather(func: &Function, cond: Value, is_eq: bool) -> Option<Gathered> {
        let chain_op = if is_eq { BinOp::Or } else { BinOp::And };
        let mut g = Gathered::default();
        let mut visited = HashSet::new();
        let mut work = vec![cond];
        while let Some(v) = work.pop() {
            if !visited.insert(v) {
                continue;
            }
            if let Value::Inst(i) = v {
                if let InstKind::Binary { op, lhs, rhs } = *func.kind(i) {
                    if op == chain_op && func.value_type(v) == Type::I1 {
                        work.push(rhs);
                        work.push(lhs);
                        continue;
                    }
                }
                if g.match_compare(func, v, is_eq) {
                    continue;
                }
            }
            if g.extra.is_some() {
                return None;
            }
            g.extra = Some(v);
        }
        g.value.is_some().then_some(g)
    }

    fn match_compare(&mut self, func: &Function, v: Value, is_eq: bool) -> bool {
        let Value::Inst(i) = v else {
            return false;
        };
        let InstKind::Cmp {
            pred,
            lhs,
            rhs: Value::Const(c),
        } = *func.kind(i)
        else {
            return false;
        };
        if lhs.as_const().is_some() || !func.value_type(lhs).is_integer() {
            return false;
        }

        let wanted = if is_eq { CmpPred::Eq } else { CmpPred::Ne };
        if pred == wanted {
            if !self.set_value_once(lhs) {
                return false;
            }
            self.values.push(c);
            self.used_compares += 1;
            return true;
        }

        let mut span = Span::allowed(pred, c);
        let mut candidate = lhs;
        if let Value::Inst(a) = lhs {
            if let InstKind::Binary {
                op: BinOp::Add,
                lhs: inner,
                rhs: Value::Const(k),
            } = *func.kind(a)
            {
                span = span.subtract(k);
                candidate = inner;
            }
        }
        if !is_eq {
            span = span.inverse();
        }
        if span.size == 0 || span.size > MAX_RANGE_VALUES || !self.set_value_once(candidate) {
            return false;
        }
        self.values.extend(span.values(c.ty()));
        self.used_compares += 1;
        true
    }

    fn set_value_once(&mut self, v: Value) -> bool {
        match self.value {
            Some(existing) => existing == v,
            None => {
                self.value = Some(v);
                true
            }
        }
    }
}

pub fn fold_compare_chain_to_switch(func: &mut Function, b: BlockId) -> bool {
    let Terminator::CondBr {
        cond,
        if_true,
        if_false,
        ..
    } = *func.terminator(b)
    else {
        return false;
    };
    let Value::Inst(ci) = cond else {
        return false;
    };
    let is_eq = match *func.kind(ci) {
        InstKind::Binary { op: BinOp::Or, .. } => true,
        InstKind::Binary { op: BinOp::And, .. } => false,
        _ => return false,
    };
    if if_true == if_false {
        return false;
    }
    let Some(Gathered {
        value: Some(value),
        mut values,
        extra,
        used_compares,
    }) = Gathered::gather(func, cond, is_eq)
    else {
        return false;
    };
    if used_compares <= 1 {
        return false;
    }
    values.sort_by_key(|c| c.as_u64());
    values.dedup();
    if extra.is_some() && values.len() < 2 {
        return false;
    }

    let (edge, default) = if is_eq { (if_true, if_false) } else { (if_false, if_true) };
    trace!(block = %func.block_name(b), cases = values.len(), extra = extra.is_some(), "turning compare chain into switch");

    let mut at = b;
    if let Some(extra) = extra {
        let tail = split_block_at(func, b, func.insts(b).len(), "switch.early.test");
        let (if_true, if_false) = if is_eq { (edge, tail) } else { (tail, edge) };
        func.set_terminator(
            b,
            Terminator::CondBr {
                cond: extra,
                if_true,
                if_false,
                weights: None,
            },
        );
        func.add_phi_incoming_like(edge, b, tail);
        at = tail;
    }

    let cases = values.into_iter().map(|value| SwitchCase { value, dest: edge }).collect();
    replace_terminator(
        func,
        at,
        Terminator::Switch {
            cond: value,
            default,
            cases,
            weights: None,
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_function;

    fn case_values(f: &Function, b: BlockId) -> Vec<i64> {
        match f.terminator(b) {
            Terminator::Switch { cases, .. } => cases.iter().map(|c| c.value.as_i64()).collect(),
            other => panic!("expected a switch, got {other:?}"),
        }
    }

    // ── Equality chains ──

    //   entry: br (x == 1 | x == 7), t, f   →   entry: switch x [1 → t, 7 → t], f
    #[test]
    fn or_of_equalities_becomes_switch() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  %a = icmp eq i32 %x, 7
  %b = icmp eq i32 %x, 1
  %c = or i1 %a, %b
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(fold_compare_chain_to_switch(&mut f, entry));
        let (t, fb) = (f.block_by_name("t").unwrap(), f.block_by_name("f").unwrap());
        let Terminator::Switch {
            cond, default, cases, ..
        } = f.terminator(entry).clone()
        else {
            panic!("expected a switch");
        };
        assert_eq!(cond, Value::Arg(0));
        assert_eq!(default, fb);
        assert!(cases.iter().all(|c| c.dest == t));
        assert_eq!(case_values(&f, entry), vec![1, 7]);
        // The chain is gone.
        assert!(f.insts(entry).is_empty());
    }

    //   entry: br (x != 3 & x != 4 & x != 3), go, stop
    //     → switch x [3 → stop, 4 → stop], go
    #[test]
    fn and_of_inequalities_sends_cases_to_false_side() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  %a = icmp ne i32 %x, 3
  %b = icmp ne i32 %x, 4
  %ab = and i1 %a, %b
  %c = icmp ne i32 %x, 3
  %all = and i1 %ab, %c
  br %all, label %go, label %stop
go:
  ret i32 1
stop:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(fold_compare_chain_to_switch(&mut f, entry));
        let (go, stop) = (f.block_by_name("go").unwrap(), f.block_by_name("stop").unwrap());
        let Terminator::Switch { default, cases, .. } = f.terminator(entry).clone() else {
            panic!("expected a switch");
        };
        assert_eq!(default, go);
        assert!(cases.iter().all(|c| c.dest == stop));
        assert_eq!(case_values(&f, entry), vec![3, 4]);
    }

    // ── Ranges ──

    #[test]
    fn small_ranges_contribute_every_value() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  %off = add i32 %x, -10
  %low = icmp ult i32 %off, 3
  %is5 = icmp eq i32 %x, 5
  %c = or i1 %low, %is5
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(fold_compare_chain_to_switch(&mut f, entry));
        assert_eq!(case_values(&f, entry), vec![5, 10, 11, 12]);
    }

    #[test]
    fn signed_range_wraps_around_zero() {
        let mut f = parse_function(
            "
func @f(i8 %x) -> i32 {
entry:
  %hi = icmp sgt i8 %x, 125
  %lo = icmp slt i8 %x, -127
  %c = or i1 %hi, %lo
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(fold_compare_chain_to_switch(&mut f, entry));
        // 126, 127 and -128 as unsigned bytes.
        assert_eq!(case_values(&f, entry), vec![126, 127, -128]);
    }

    #[test]
    fn wide_range_is_left_alone() {
        let mut f = parse_function(
            "
func @f(i32 %x) -> i32 {
entry:
  %low = icmp ult i32 %x, 100
  %is500 = icmp eq i32 %x, 500
  %c = or i1 %low, %is500
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(!fold_compare_chain_to_switch(&mut f, entry));
    }

    // ── Extra leaf ──

    //   entry: br (p | x == 1 | x == 2), t, f
    //     → entry: br p, t, switch.early.test
    //       switch.early.test: switch x [1 → t, 2 → t], f
    #[test]
    fn one_foreign_leaf_is_tested_first() {
        let mut f = parse_function(
            "
func @f(i1 %p, i32 %x) -> i32 {
entry:
  %a = icmp eq i32 %x, 1
  %b = icmp eq i32 %x, 2
  %ab = or i1 %a, %b
  %c = or i1 %p, %ab
  br %c, label %t, label %f
t:
  %r = phi i32 [ 1, %entry ]
  ret i32 %r
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(fold_compare_chain_to_switch(&mut f, entry));
        let t = f.block_by_name("t").unwrap();
        let early = f.block_by_name("switch.early.test").unwrap();
        let Terminator::CondBr {
            cond,
            if_true,
            if_false,
            ..
        } = *f.terminator(entry)
        else {
            panic!("expected a conditional branch");
        };
        assert_eq!((cond, if_true, if_false), (Value::Arg(0), t, early));
        assert_eq!(case_values(&f, early), vec![1, 2]);
        let phi = f.phis(t)[0];
        assert_eq!(f.phi_value(phi, early), Some(Value::constant(Type::I32, 1)));
        crate::verify::assert_valid(&f);
    }

    #[test]
    fn two_foreign_leaves_are_left_alone() {
        let mut f = parse_function(
            "
func @f(i1 %p, i1 %q, i32 %x) -> i32 {
entry:
  %a = icmp eq i32 %x, 1
  %b = icmp eq i32 %x, 2
  %ab = or i1 %a, %b
  %pq = or i1 %p, %q
  %c = or i1 %pq, %ab
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(!fold_compare_chain_to_switch(&mut f, entry));
    }

    #[test]
    fn single_compare_is_not_a_chain() {
        let mut f = parse_function(
            "
func @f(i1 %p, i32 %x) -> i32 {
entry:
  %a = icmp eq i32 %x, 1
  %c = or i1 %p, %a
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        assert!(!fold_compare_chain_to_switch(&mut f, entry));
    }

    #[test]
    fn compare_against_another_value_is_the_extra_leaf() {
        let mut f = parse_function(
            "
func @f(i32 %x, i32 %y) -> i32 {
entry:
  %a = icmp eq i32 %x, 1
  %b = icmp eq i32 %y, 2
  %c0 = icmp eq i32 %x, 3
  %ab = or i1 %a, %b
  %c = or i1 %ab, %c0
  br %c, label %t, label %f
t:
  ret i32 1
f:
  ret i32 2
}
",
        )
        .unwrap();
        let entry = f.entry();
        // %b becomes the extra leaf, %x is compared twice.
        assert!(fold_compare_chain_to_switch(&mut f, entry));
        let early = f.block_by_name("switch.early.test").unwrap();
        assert_eq!(case_values(&f, early), vec![1, 3]);
    }
}
