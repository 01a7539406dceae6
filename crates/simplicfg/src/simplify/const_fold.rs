//! Constant terminator folding.
//!
//! - `br true, A, B` → `br A`; `br %c, A, A` → `br A`
//! - switch cases that go to the default are dropped, their weight moves to
//!   the default
//! - a switch on a constant, or with a single live destination, becomes `br`
//! - a switch with a single case becomes `icmp eq` + conditional branch
//! - `indirectbr blockaddress(X)` → `br X`

use super::utils::{is_unreachable_block, replace_terminator, successor_weights, to_branch_metadata, to_metadata};
use crate::ir::{BlockId, CmpPred, Function, InstKind, SwitchCase, Terminator, Type, Value};

pub fn fold_terminator(func: &mut Function, b: BlockId) -> bool {
    match func.terminator(b).clone() {
        Terminator::CondBr {
            cond,
            if_true,
            if_false,
            ..
        } => {
            if if_true == if_false {
                replace_terminator(func, b, Terminator::Br { target: if_true });
                return true;
            }
            if let Value::Const(c) = cond {
                let target = if c.is_zero() { if_false } else { if_true };
                func.set_terminator(b, Terminator::Br { target });
                return true;
            }
            false
        }
        Terminator::Switch {
            cond,
            default,
            cases,
            ..
        } => {
            let weights = successor_weights(func.terminator(b));
            fold_switch(func, b, cond, default, cases, weights)
        }
        Terminator::IndirectBr {
            addr: Value::BlockAddr(target),
            dests,
        } => {
            let term = if dests.contains(&target) {
                Terminator::Br { target }
            } else {
                // Jumping to an address the branch does not list is undefined.
                Terminator::Unreachable
            };
            func.set_terminator(b, term);
            true
        }
        _ => false,
    }
}

fn fold_switch(
    func: &mut Function,
    b: BlockId,
    cond: Value,
    default: BlockId,
    mut cases: Vec<SwitchCase>,
    mut weights: Option<Vec<u64>>,
) -> bool {
    let known = cond.as_const();
    let mut only_dest = Some(default);
    if is_unreachable_block(func, default) {
        if let Some(first) = cases.first() {
            only_dest = Some(first.dest);
        }
    }

    let mut changed = false;
    let mut i = 0;
    while i < cases.len() {
        let case = cases[i];
        if Some(case.value) == known {
            only_dest = Some(case.dest);
            break;
        }
        if case.dest == default {
            if let Some(w) = weights.as_mut() {
                w[0] += w[i + 1];
                w.remove(i + 1);
            }
            cases.remove(i);
            changed = true;
            continue;
        }
        if Some(case.dest) != only_dest {
            only_dest = None;
        }
        i += 1;
    }
    if known.is_some() && only_dest.is_none() {
        only_dest = Some(default);
    }

    if let Some(target) = only_dest {
        replace_terminator(func, b, Terminator::Br { target });
        return true;
    }

    if cases.len() == 1 {
        let case = cases[0];
        let cmp = func.append_inst(
            b,
            InstKind::Cmp {
                pred: CmpPred::Eq,
                lhs: cond,
                rhs: Value::Const(case.value),
            },
            Type::I1,
        );
        func.set_inst_name(cmp, "cond");
        let weights = weights.and_then(|w| to_branch_metadata(w[1], w[0]));
        replace_terminator(
            func,
            b,
            Terminator::CondBr {
                cond: Value::Inst(cmp),
                if_true: case.dest,
                if_false: default,
                weights,
            },
        );
        return true;
    }

    if changed {
        func.set_terminator(
            b,
            Terminator::Switch {
                cond,
                default,
                cases,
                weights: weights.and_then(to_metadata),
            },
        );
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_function;

    fn parse(src: &str) -> Function {
        parse_function(src).unwrap()
    }

    #[test]
    fn branch_on_constant_becomes_unconditional() {
        let mut f = parse(
            "
func @f() -> i32 {
entry:
  br false, label %a, label %b
a:
  ret i32 1
b:
  ret i32 2
}
",
        );
        let b = f.block_by_name("b").unwrap();
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: b });
        assert!(f.preds(f.block_by_name("a").unwrap()).is_empty());
    }

    #[test]
    fn branch_to_same_block_drops_condition() {
        let mut f = parse(
            "
func @f(i32 %x) -> void {
entry:
  %c = icmp eq i32 %x, 0
  br %c, label %a, label %a
a:
  ret void
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        assert!(f.insts(f.entry()).is_empty());
        assert_eq!(f.preds(f.block_by_name("a").unwrap()).len(), 1);
    }

    #[test]
    fn switch_on_constant_picks_case() {
        let mut f = parse(
            "
func @f() -> i32 {
entry:
  switch i32 7, label %d [
    5, label %a
    7, label %b
  ]
a:
  ret i32 1
b:
  ret i32 2
d:
  ret i32 3
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        let b = f.block_by_name("b").unwrap();
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: b });
    }

    #[test]
    fn switch_on_unlisted_constant_goes_to_default() {
        let mut f = parse(
            "
func @f() -> i32 {
entry:
  switch i32 9, label %d [
    5, label %a
    7, label %b
  ]
a:
  ret i32 1
b:
  ret i32 2
d:
  ret i32 3
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        let d = f.block_by_name("d").unwrap();
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: d });
    }

    #[test]
    fn cases_to_default_are_removed_with_weights() {
        let mut f = parse(
            "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [
    1, label %a
    2, label %d
    3, label %b
  ] !prof 10, 1, 5, 2
a:
  ret i32 1
b:
  ret i32 2
d:
  ret i32 3
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        match f.terminator(f.entry()) {
            Terminator::Switch { cases, weights, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(weights.as_deref(), Some(&[15, 1, 2][..]));
            }
            other => panic!("expected a switch, got {other:?}"),
        }
    }

    #[test]
    fn single_case_switch_becomes_compare() {
        let mut f = parse(
            "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [
    4, label %a
  ] !prof 3, 9
a:
  ret i32 1
d:
  ret i32 3
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        let a = f.block_by_name("a").unwrap();
        let d = f.block_by_name("d").unwrap();
        match f.terminator(f.entry()) {
            Terminator::CondBr {
                if_true,
                if_false,
                weights,
                cond,
            } => {
                assert_eq!((*if_true, *if_false), (a, d));
                assert_eq!(*weights, Some([9, 3]));
                let cmp = cond.as_inst().unwrap();
                assert_eq!(f.inst(cmp).name.as_deref(), Some("cond"));
            }
            other => panic!("expected a conditional branch, got {other:?}"),
        }
    }

    #[test]
    fn switch_with_unreachable_default_and_one_destination() {
        let mut f = parse(
            "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [
    1, label %a
    2, label %a
  ]
a:
  ret i32 1
d:
  unreachable
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        let a = f.block_by_name("a").unwrap();
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: a });
    }

    #[test]
    fn indirect_branch_on_known_address() {
        let mut f = parse(
            "
func @f() -> i32 {
entry:
  indirectbr ptr blockaddress(%b), [label %a, label %b]
a:
  ret i32 1
b:
  ret i32 2
}
",
        );
        let entry = f.entry();
        assert!(fold_terminator(&mut f, entry));
        let b = f.block_by_name("b").unwrap();
        assert_eq!(f.terminator(f.entry()), &Terminator::Br { target: b });
    }

    #[test]
    fn non_constant_branch_is_left_alone() {
        let mut f = parse(
            "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %b
a:
  ret i32 1
b:
  ret i32 2
}
",
        );
        let entry = f.entry();
        assert!(!fold_terminator(&mut f, entry));
    }
}
