//! Reference interpreter.
//!
//! Runs a function on concrete arguments and records what an outside
//! observer could see: the outcome, the side-effecting calls in order and
//! the final memory. Simplification must preserve all three whenever the
//! original run is well defined, which is what [`Execution::refines`]
//! checks.
//!
//! The world model is deliberately small. Memory is a map from address to
//! value, zero where never written. A call returns a value derived from its
//! callee name and arguments. Calls to callees named `throw*` unwind.

use crate::ir::eval::{eval_binary, eval_cast, eval_cmp};
use crate::ir::{BlockId, Constant, Function, InstId, InstKind, Terminator, Type, Value};
use anyhow::{bail, Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

/// High bit pattern marking a block address.
const BLOCK_ADDR_TAG: u64 = 0xb10c << 48;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Returned(Option<Constant>),
    /// An exception left the function.
    Unwound,
    /// Reached `unreachable` or an operation with undefined behavior.
    Undefined,
    /// Ran out of steps.
    OutOfFuel,
}

/// One observable call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub callee: String,
    pub args: Vec<Constant>,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub outcome: Outcome,
    pub calls: Vec<CallEvent>,
    pub memory: BTreeMap<u64, Constant>,
    /// Instructions and terminators executed.
    pub steps: usize,
}

impl Execution {
    /// Whether `self` is an acceptable behavior for a program that behaved
    /// like `original`. Undefined and unfinished original runs allow
    /// anything.
    pub fn refines(&self, original: &Execution) -> bool {
        match original.outcome {
            Outcome::Undefined | Outcome::OutOfFuel => true,
            _ => self.outcome == original.outcome && self.calls == original.calls && self.memory == original.memory,
        }
    }
}

/// Runs `func` on `args` for at most `fuel` steps.
///
/// Errors are reserved for malformed IR (a missing PHI entry, a value read
/// before its definition, an argument count mismatch).
pub fn execute(func: &Function, args: &[Constant], fuel: usize) -> Result<Execution> {
    if args.len() != func.params.len() {
        bail!("@{} takes {} arguments, {} given", func.name, func.params.len(), args.len());
    }
    let mut machine = Machine {
        func,
        args,
        values: HashMap::new(),
        exec: Execution {
            outcome: Outcome::OutOfFuel,
            calls: Vec::new(),
            memory: BTreeMap::new(),
            steps: 0,
        },
    };
    machine.exec.outcome = machine.run(fuel)?;
    Ok(machine.exec)
}

struct Machine<'a> {
    func: &'a Function,
    args: &'a [Constant],
    values: HashMap<InstId, Constant>,
    exec: Execution,
}

/// What executing one instruction asks the block loop to do.
enum Step {
    Continue,
    Stop(Outcome),
}

impl Machine<'_> {
    fn value(&self, v: Value) -> Result<Constant> {
        Ok(match v {
            Value::Inst(i) => *self
                .values
                .get(&i)
                .with_context(|| format!("{i} is read before it is defined"))?,
            Value::Arg(n) => *self.args.get(n as usize).with_context(|| format!("no argument {n}"))?,
            Value::Const(c) => c,
            Value::Undef(ty) => Constant::zero(ty),
            Value::BlockAddr(b) => Constant::from_u64(Type::Ptr, BLOCK_ADDR_TAG | u64::from(b.0)),
        })
    }

    fn run(&mut self, fuel: usize) -> Result<Outcome> {
        let func = self.func;
        let mut prev: Option<BlockId> = None;
        let mut b = func.entry();
        loop {
            // PHIs read their inputs simultaneously.
            let mut incoming = Vec::new();
            for phi in func.phis(b) {
                let pred = prev.with_context(|| format!("phi {phi} in the entry block"))?;
                let v = func
                    .phi_value(phi, pred)
                    .with_context(|| format!("phi {phi} in {} has no entry for {}", func.block_name(b), func.block_name(pred)))?;
                incoming.push((phi, self.value(v)?));
            }
            self.values.extend(incoming);

            for i in func.body(b) {
                self.exec.steps += 1;
                if self.exec.steps > fuel {
                    return Ok(Outcome::OutOfFuel);
                }
                if let Step::Stop(outcome) = self.step(i)? {
                    return Ok(outcome);
                }
            }

            self.exec.steps += 1;
            if self.exec.steps > fuel {
                return Ok(Outcome::OutOfFuel);
            }
            let next = match func.terminator(b) {
                Terminator::Br { target } => *target,
                Terminator::CondBr {
                    cond, if_true, if_false, ..
                } => {
                    if self.value(*cond)?.is_zero() {
                        *if_false
                    } else {
                        *if_true
                    }
                }
                Terminator::Switch {
                    cond, default, cases, ..
                } => {
                    let c = self.value(*cond)?;
                    cases.iter().find(|case| case.value == c).map_or(*default, |case| case.dest)
                }
                Terminator::Ret { value } => {
                    let v = value.map(|v| self.value(v)).transpose()?;
                    return Ok(Outcome::Returned(v));
                }
                Terminator::Unreachable => return Ok(Outcome::Undefined),
                Terminator::Resume { .. } => return Ok(Outcome::Unwound),
                Terminator::CleanupRet { unwind, .. } => match unwind {
                    Some(d) => *d,
                    None => return Ok(Outcome::Unwound),
                },
                Terminator::IndirectBr { addr, dests } => {
                    let a = self.value(*addr)?.as_u64();
                    let target = BlockId((a & !BLOCK_ADDR_TAG) as u32);
                    if a & BLOCK_ADDR_TAG != BLOCK_ADDR_TAG || !dests.contains(&target) {
                        return Ok(Outcome::Undefined);
                    }
                    target
                }
                Terminator::Invoke {
                    callee,
                    args,
                    normal,
                    unwind,
                } => {
                    let args = args.iter().map(|&a| self.value(a)).collect::<Result<Vec<_>>>()?;
                    self.exec.calls.push(CallEvent {
                        callee: callee.clone(),
                        args,
                    });
                    if unwinds(callee) {
                        *unwind
                    } else {
                        *normal
                    }
                }
            };
            prev = Some(b);
            b = next;
        }
    }

    fn step(&mut self, i: InstId) -> Result<Step> {
        let data = self.func.inst(i);
        let ty = data.ty;
        let result = match &data.kind {
            InstKind::Phi { .. } => bail!("phi {i} after the head of its block"),
            InstKind::Binary { op, lhs, rhs } => {
                match eval_binary(*op, self.value(*lhs)?, self.value(*rhs)?) {
                    Some(c) => Some(c),
                    None => return Ok(Step::Stop(Outcome::Undefined)),
                }
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                Some(Constant::bool(eval_cmp(*pred, self.value(*lhs)?, self.value(*rhs)?)))
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                let pick = if self.value(*cond)?.is_zero() { on_false } else { on_true };
                Some(self.value(*pick)?)
            }
            InstKind::Cast { op, value } => Some(eval_cast(*op, self.value(*value)?, ty)),
            InstKind::Load { ptr, volatile } => {
                let addr = self.value(*ptr)?.as_u64();
                let stored = self.exec.memory.get(&addr).copied();
                if *volatile {
                    self.exec.calls.push(CallEvent {
                        callee: "volatile.load".to_string(),
                        args: vec![Constant::from_u64(Type::Ptr, addr)],
                    });
                }
                Some(stored.map_or(Constant::zero(ty), |c| Constant::from_u64(ty, c.as_u64())))
            }
            InstKind::Store { ptr, value, volatile } => {
                let addr = self.value(*ptr)?.as_u64();
                let v = self.value(*value)?;
                if *volatile {
                    self.exec.calls.push(CallEvent {
                        callee: "volatile.store".to_string(),
                        args: vec![Constant::from_u64(Type::Ptr, addr), v],
                    });
                }
                self.exec.memory.insert(addr, v);
                None
            }
            InstKind::Call { callee, args, flags } => {
                let args = args.iter().map(|&a| self.value(a)).collect::<Result<Vec<_>>>()?;
                let result = (ty != Type::Void).then(|| call_result(callee, &args, ty));
                if !flags.readnone {
                    self.exec.calls.push(CallEvent {
                        callee: callee.clone(),
                        args,
                    });
                }
                if unwinds(callee) {
                    return Ok(Step::Stop(Outcome::Unwound));
                }
                result
            }
            InstKind::TableLoad { table, index } => {
                let idx = self.value(*index)?.as_u64();
                let table = self
                    .func
                    .tables
                    .get(table.0 as usize)
                    .with_context(|| format!("no table {}", table.0))?;
                match usize::try_from(idx).ok().and_then(|i| table.values.get(i)) {
                    Some(&c) => Some(c),
                    None => return Ok(Step::Stop(Outcome::Undefined)),
                }
            }
            InstKind::LandingPad | InstKind::CleanupPad => Some(Constant::zero(Type::Token)),
            InstKind::Debug { .. } => None,
        };
        if let Some(c) = result {
            self.values.insert(i, c);
        }
        Ok(Step::Continue)
    }
}

fn unwinds(callee: &str) -> bool {
    callee.starts_with("throw")
}

fn call_result(callee: &str, args: &[Constant], ty: Type) -> Constant {
    let mut h = DefaultHasher::new();
    callee.hash(&mut h);
    args.hash(&mut h);
    Constant::from_u64(ty, h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_function;

    fn i32c(v: i64) -> Constant {
        Constant::new(Type::I32, v)
    }

    fn run(src: &str, args: &[Constant]) -> Execution {
        let f = parse_function(src).unwrap();
        execute(&f, args, 1000).unwrap()
    }

    const DIAMOND: &str = "
func @f(i32 %x) -> i32 {
entry:
  %c = icmp slt i32 %x, 0
  br %c, label %neg, label %pos
neg:
  %n = sub i32 0, %x
  br label %join
pos:
  br label %join
join:
  %p = phi i32 [ %n, %neg ], [ %x, %pos ]
  ret i32 %p
}
";

    #[test]
    fn phi_picks_the_taken_edge() {
        assert_eq!(run(DIAMOND, &[i32c(-5)]).outcome, Outcome::Returned(Some(i32c(5))));
        assert_eq!(run(DIAMOND, &[i32c(7)]).outcome, Outcome::Returned(Some(i32c(7))));
    }

    #[test]
    fn stores_and_calls_are_observed() {
        let e = run(
            "
func @f(ptr %p, i32 %v) -> void {
entry:
  store i32 %v, %p
  call void @g(i32 %v)
  call readnone i32 @h(i32 %v)
  ret void
}
",
            &[Constant::from_u64(Type::Ptr, 64), i32c(3)],
        );
        assert_eq!(e.memory.get(&64), Some(&i32c(3)));
        assert_eq!(
            e.calls,
            vec![CallEvent {
                callee: "g".to_string(),
                args: vec![i32c(3)],
            }]
        );
    }

    #[test]
    fn division_by_zero_is_undefined() {
        let e = run(
            "
func @f(i32 %x) -> i32 {
entry:
  %d = udiv i32 1, %x
  ret i32 %d
}
",
            &[i32c(0)],
        );
        assert_eq!(e.outcome, Outcome::Undefined);
    }

    #[test]
    fn throwing_invoke_takes_the_unwind_edge() {
        let e = run(
            "
func @f() -> i32 {
entry:
  invoke @throw_it() to label %ok unwind label %lp
ok:
  ret i32 0
lp:
  %e = landingpad
  resume %e
}
",
            &[],
        );
        assert_eq!(e.outcome, Outcome::Unwound);
        assert_eq!(e.calls.len(), 1);
    }

    #[test]
    fn infinite_loop_runs_out_of_fuel() {
        let e = run("func @f() -> void {\nentry:\n  br label %l\nl:\n  br label %l\n}\n", &[]);
        assert_eq!(e.outcome, Outcome::OutOfFuel);
    }

    #[test]
    fn undefined_original_is_refined_by_anything() {
        let original = Execution {
            outcome: Outcome::Undefined,
            calls: Vec::new(),
            memory: BTreeMap::new(),
            steps: 1,
        };
        let other = Execution {
            outcome: Outcome::Returned(None),
            calls: Vec::new(),
            memory: BTreeMap::new(),
            steps: 3,
        };
        assert!(other.refines(&original));
        assert!(!original.refines(&other));
    }
}
