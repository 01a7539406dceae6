//! Textual rendering of functions.
//!
//! The output is accepted by [`super::parser`]. Instruction names are taken
//! from [`InstData::name`] when present and unique, otherwise a fresh
//! numbered name is used.

use super::types::*;
use super::Function;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write};

/// Names assigned to instruction results for one rendering.
struct Namer {
    inst: HashMap<InstId, String>,
}

impl Namer {
    fn new(func: &Function) -> Self {
        let mut used: HashSet<String> = func.params.iter().map(|(n, _)| n.clone()).collect();
        let mut inst = HashMap::new();
        let mut next = 0u32;
        for &b in func.layout() {
            for &i in func.insts(b) {
                let data = func.inst(i);
                if data.ty == Type::Void {
                    continue;
                }
                let name = match &data.name {
                    Some(n) if !used.contains(n) => n.clone(),
                    Some(n) => fresh(&mut used, n, &mut 1),
                    None => {
                        let mut candidate = next.to_string();
                        while used.contains(&candidate) {
                            next += 1;
                            candidate = next.to_string();
                        }
                        next += 1;
                        candidate
                    }
                };
                used.insert(name.clone());
                inst.insert(i, name);
            }
        }
        Namer { inst }
    }
}

fn fresh(used: &mut HashSet<String>, base: &str, counter: &mut u32) -> String {
    loop {
        let candidate = format!("{base}.{counter}");
        *counter += 1;
        if !used.contains(&candidate) {
            return candidate;
        }
    }
}

struct Printer<'a> {
    func: &'a Function,
    names: Namer,
}

impl Printer<'_> {
    fn value(&self, v: Value) -> String {
        match v {
            Value::Inst(i) => match self.names.inst.get(&i) {
                Some(n) => format!("%{n}"),
                None => format!("%<detached {i}>"),
            },
            Value::Arg(n) => format!("%{}", self.func.params[n as usize].0),
            Value::Const(c) if c.ty() == Type::Ptr && c.is_zero() => "null".to_string(),
            Value::Const(c) => c.to_string(),
            Value::Undef(_) => "undef".to_string(),
            Value::BlockAddr(b) => {
                if self.func.is_live(b) {
                    format!("blockaddress(%{})", self.func.block_name(b))
                } else {
                    format!("blockaddress(<dead {b}>)")
                }
            }
        }
    }

    fn typed(&self, v: Value) -> String {
        format!("{} {}", self.func.value_type(v), self.value(v))
    }

    fn label(&self, b: BlockId) -> String {
        format!("label %{}", self.func.block_name(b))
    }

    fn inst(&self, out: &mut String, i: InstId) -> fmt::Result {
        let data = self.func.inst(i);
        out.push_str("  ");
        if data.ty != Type::Void {
            write!(out, "{} = ", self.value(Value::Inst(i)))?;
        }
        match &data.kind {
            InstKind::Phi { incoming } => {
                write!(out, "phi {} ", data.ty)?;
                let entries: Vec<String> = incoming
                    .iter()
                    .map(|(b, v)| format!("[ {}, %{} ]", self.value(*v), self.func.block_name(*b)))
                    .collect();
                out.push_str(&entries.join(", "));
            }
            InstKind::Binary { op, lhs, rhs } => {
                write!(out, "{} {}, {}", op.mnemonic(), self.typed(*lhs), self.value(*rhs))?;
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                write!(
                    out,
                    "icmp {} {}, {}",
                    pred.mnemonic(),
                    self.typed(*lhs),
                    self.value(*rhs)
                )?;
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                write!(
                    out,
                    "select {}, {}, {}",
                    self.value(*cond),
                    self.typed(*on_true),
                    self.value(*on_false)
                )?;
            }
            InstKind::Cast { op, value } => {
                write!(out, "{} {} to {}", op.mnemonic(), self.typed(*value), data.ty)?;
            }
            InstKind::Load { ptr, volatile } => {
                let vol = if *volatile { "volatile " } else { "" };
                write!(out, "load {vol}{}, {}", data.ty, self.value(*ptr))?;
            }
            InstKind::Store {
                ptr,
                value,
                volatile,
            } => {
                let vol = if *volatile { "volatile " } else { "" };
                write!(out, "store {vol}{}, {}", self.typed(*value), self.value(*ptr))?;
            }
            InstKind::Call {
                callee,
                args,
                flags,
            } => {
                out.push_str("call ");
                for (set, name) in [
                    (flags.musttail, "musttail"),
                    (flags.nomerge, "nomerge"),
                    (flags.readnone, "readnone"),
                    (flags.nounwind, "nounwind"),
                ] {
                    if set {
                        write!(out, "{name} ")?;
                    }
                }
                write!(out, "{} @{callee}({})", data.ty, self.args(args))?;
            }
            InstKind::TableLoad { table, index } => {
                let name = &self.func.tables[table.0 as usize].name;
                write!(out, "tableload {}, @{name}, {}", data.ty, self.typed(*index))?;
            }
            InstKind::LandingPad => out.push_str("landingpad"),
            InstKind::CleanupPad => out.push_str("cleanuppad"),
            InstKind::Debug { value, loc } => {
                write!(out, "dbg {}, !{loc}", self.typed(*value))?;
            }
        }
        out.push('\n');
        Ok(())
    }

    fn args(&self, args: &[Value]) -> String {
        args.iter()
            .map(|a| self.typed(*a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn terminator(&self, out: &mut String, term: &Terminator) -> fmt::Result {
        out.push_str("  ");
        match term {
            Terminator::Br { target } => write!(out, "br {}", self.label(*target))?,
            Terminator::CondBr {
                cond,
                if_true,
                if_false,
                weights,
            } => {
                write!(
                    out,
                    "br {}, {}, {}",
                    self.value(*cond),
                    self.label(*if_true),
                    self.label(*if_false)
                )?;
                if let Some([t, f]) = weights {
                    write!(out, " !prof {t}, {f}")?;
                }
            }
            Terminator::Switch {
                cond,
                default,
                cases,
                weights,
            } => {
                writeln!(out, "switch {}, {} [", self.typed(*cond), self.label(*default))?;
                for case in cases {
                    writeln!(out, "    {}, {}", case.value, self.label(case.dest))?;
                }
                out.push_str("  ]");
                if let Some(w) = weights {
                    let w: Vec<String> = w.iter().map(u32::to_string).collect();
                    write!(out, " !prof {}", w.join(", "))?;
                }
            }
            Terminator::Ret { value: None } => out.push_str("ret void"),
            Terminator::Ret { value: Some(v) } => write!(out, "ret {}", self.typed(*v))?,
            Terminator::Unreachable => out.push_str("unreachable"),
            Terminator::Resume { value } => write!(out, "resume {}", self.value(*value))?,
            Terminator::CleanupRet { pad, unwind } => {
                write!(out, "cleanupret {} unwind ", self.value(*pad))?;
                match unwind {
                    Some(u) => out.push_str(&self.label(*u)),
                    None => out.push_str("to caller"),
                }
            }
            Terminator::IndirectBr { addr, dests } => {
                let dests: Vec<String> = dests.iter().map(|d| self.label(*d)).collect();
                write!(out, "indirectbr {}, [{}]", self.typed(*addr), dests.join(", "))?;
            }
            Terminator::Invoke {
                callee,
                args,
                normal,
                unwind,
            } => {
                write!(
                    out,
                    "invoke @{callee}({}) to {} unwind {}",
                    self.args(args),
                    self.label(*normal),
                    self.label(*unwind)
                )?;
            }
        }
        out.push('\n');
        Ok(())
    }

    fn function(&self) -> Result<String, fmt::Error> {
        let func = self.func;
        let mut out = String::new();
        for table in &func.tables {
            let values: Vec<String> = table.values.iter().map(|c| c.as_i64().to_string()).collect();
            writeln!(out, "table @{} {} [{}]", table.name, table.elem_ty, values.join(", "))?;
        }
        let params: Vec<String> = func
            .params
            .iter()
            .map(|(n, t)| format!("{t} %{n}"))
            .collect();
        writeln!(out, "func @{}({}) -> {} {{", func.name, params.join(", "), func.ret_ty)?;
        for &b in func.layout() {
            writeln!(out, "{}:", func.block_name(b))?;
            for &i in func.insts(b) {
                self.inst(&mut out, i)?;
            }
            self.terminator(&mut out, func.terminator(b))?;
        }
        out.push_str("}\n");
        Ok(out)
    }
}

/// Renders `func` in textual form.
pub fn print_function(func: &Function) -> String {
    let printer = Printer {
        func,
        names: Namer::new(func),
    };
    printer.function().unwrap_or_default()
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_function(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn prints_branch_weights_and_phi() {
        let mut b = FunctionBuilder::new("f", &[("x", Type::I32)], Type::I32);
        b.block("entry");
        let a = b.block("a");
        let c = b.block("b");
        let x = b.arg(0);
        let one = b.iconst(Type::I32, 1);
        let cmp = b.icmp(CmpPred::Eq, x, one);
        b.name(cmp, "c");
        b.cond_br_weighted(cmp, a, c, [3, 7]);
        b.switch_to(a);
        b.ret(Some(Value::constant(Type::I32, 10)));
        b.switch_to(c);
        b.ret(Some(Value::constant(Type::I32, 4)));
        let text = print_function(&b.finish());
        assert!(text.contains("func @f(i32 %x) -> i32 {"), "{text}");
        assert!(text.contains("%c = icmp eq i32 %x, 1"), "{text}");
        assert!(text.contains("br %c, label %a, label %b !prof 3, 7"), "{text}");
        assert!(text.contains("ret i32 10"), "{text}");
    }

    #[test]
    fn unnamed_results_get_numbers() {
        let mut b = FunctionBuilder::new("g", &[("x", Type::I32)], Type::I32);
        b.block("entry");
        let x = b.arg(0);
        let s = b.add(x, x);
        let t = b.add(s, x);
        b.ret(Some(t));
        let text = print_function(&b.finish());
        assert!(text.contains("%0 = add i32 %x, %x"), "{text}");
        assert!(text.contains("%1 = add i32 %0, %x"), "{text}");
    }
}
