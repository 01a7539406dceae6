//! Fixture harness for end-to-end simplification tests.
//!
//! A fixture is a `.cfg` file under `data/` holding one function in the
//! textual IR. Directives ride along in `;` comments:
//!
//! ```text
//! ; OPTION: no-hoisting          adjust SimplifyOptions
//! ; CHECK: select                output must contain the text
//! ; CHECK-NOT: switch            output must not contain the text
//! ; CHECK-COUNT: 1 store         exact number of occurrences
//! ; BLOCKS: 1                    live blocks after simplification
//! ; EQUIV                        simplified code must refine the input
//! ```
//!
//! `EQUIV` runs both functions in the reference interpreter over a grid of
//! arguments per parameter type.

use anyhow::{bail, ensure, Context, Result};
use simplicfg::interp::execute;
use simplicfg::ir::{Constant, Type};
use simplicfg::verify::verify;
use simplicfg::{
    parse_function, simplify_function, FoldPriority, Function, PipelineStats, SimplifyOptions,
    TargetCostModel,
};
use std::fs;
use std::path::PathBuf;

const FUEL: usize = 10_000;

/// One expectation about the simplified output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Contains(String),
    NotContains(String),
    Count(usize, String),
    Blocks(usize),
}

/// A parsed fixture file.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: String,
    pub source: String,
    pub options: SimplifyOptions,
    pub checks: Vec<Check>,
    pub equiv: bool,
}

/// Result of simplifying a fixture.
#[derive(Debug)]
pub struct Simplified {
    pub before: Function,
    pub after: Function,
    pub text: String,
    pub stats: PipelineStats,
}

pub fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// Names of every fixture in `data/`, sorted.
pub fn fixture_names() -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(data_dir()).context("failed to list fixtures")? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "cfg") {
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn apply_option(options: &mut SimplifyOptions, flag: &str) -> Result<()> {
    match flag {
        "no-hoisting" => options.enable_hoisting = false,
        "no-sinking" => options.enable_sinking = false,
        "no-lookup-tables" => options.enable_lookup_tables = false,
        "no-speculate-stores" => options.speculate_stores = false,
        "no-merge-conditional-stores" => options.merge_conditional_stores = false,
        "duplicate-returns" => options.duplicate_returns = true,
        "common-destination-first" => options.fold_priority = FoldPriority::CommonDestinationFirst,
        other => bail!("unknown fixture option {other:?}"),
    }
    Ok(())
}

/// Parses the directives of fixture `name` from `source`.
pub fn parse_fixture(name: &str, source: &str) -> Result<Fixture> {
    let mut fixture = Fixture {
        name: name.to_string(),
        source: source.to_string(),
        options: SimplifyOptions::default(),
        checks: Vec::new(),
        equiv: false,
    };
    for (n, line) in source.lines().enumerate() {
        let Some(directive) = line.trim().strip_prefix(';') else {
            continue;
        };
        let directive = directive.trim();
        let context = || format!("{name}.cfg:{}: bad directive {directive:?}", n + 1);
        if directive == "EQUIV" {
            fixture.equiv = true;
        } else if let Some(flag) = directive.strip_prefix("OPTION:") {
            apply_option(&mut fixture.options, flag.trim()).with_context(context)?;
        } else if let Some(text) = directive.strip_prefix("CHECK-NOT:") {
            fixture.checks.push(Check::NotContains(text.trim().to_string()));
        } else if let Some(rest) = directive.strip_prefix("CHECK-COUNT:") {
            let (count, text) = rest.trim().split_once(' ').with_context(context)?;
            let count = count.parse().with_context(context)?;
            fixture.checks.push(Check::Count(count, text.trim().to_string()));
        } else if let Some(text) = directive.strip_prefix("CHECK:") {
            fixture.checks.push(Check::Contains(text.trim().to_string()));
        } else if let Some(n) = directive.strip_prefix("BLOCKS:") {
            fixture.checks.push(Check::Blocks(n.trim().parse().with_context(context)?));
        }
    }
    Ok(fixture)
}

/// Loads `data/<name>.cfg`.
pub fn load(name: &str) -> Result<Fixture> {
    let path = data_dir().join(format!("{name}.cfg"));
    let source =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_fixture(name, &source)
}

/// Parses, verifies and simplifies a fixture.
pub fn simplify_fixture(fixture: &Fixture) -> Result<Simplified> {
    let before = parse_function(&fixture.source)
        .with_context(|| format!("failed to parse fixture {}", fixture.name))?;
    verify(&before).with_context(|| format!("fixture {} is malformed", fixture.name))?;

    let mut after = before.clone();
    let stats = simplify_function(&mut after, &TargetCostModel, None, &fixture.options);
    verify(&after).with_context(|| format!("simplified {} is malformed", fixture.name))?;

    let text = after.to_string();
    Ok(Simplified {
        before,
        after,
        text,
        stats,
    })
}

fn grid(ty: Type) -> Vec<Constant> {
    let values: &[i64] = match ty {
        Type::I1 => &[0, 1],
        Type::Ptr => &[16, 32],
        _ => &[-1, 0, 1, 2, 3, 5, 9],
    };
    values.iter().map(|&v| Constant::new(ty, v)).collect()
}

/// Every combination of grid values for the function's parameters.
pub fn argument_grid(func: &Function) -> Vec<Vec<Constant>> {
    let mut out = vec![Vec::new()];
    for (_, ty) in &func.params {
        let column = grid(*ty);
        out = out
            .into_iter()
            .flat_map(|prefix| {
                column.iter().map(move |&c| {
                    let mut args = prefix.clone();
                    args.push(c);
                    args
                })
            })
            .collect();
    }
    out
}

/// Checks that `after` refines `before` on every grid argument.
pub fn check_equivalent(before: &Function, after: &Function) -> Result<()> {
    for args in argument_grid(before) {
        let want = execute(before, &args, FUEL).context("original failed to run")?;
        let got = execute(after, &args, FUEL).context("simplified failed to run")?;
        ensure!(
            got.refines(&want),
            "arguments {args:?}: {want:?} became {got:?}\nafter:\n{after}"
        );
    }
    Ok(())
}

/// Simplifies fixture `name` and checks all its directives.
pub fn check_fixture(name: &str) -> Result<Simplified> {
    let fixture = load(name)?;
    let out = simplify_fixture(&fixture)?;
    for check in &fixture.checks {
        match check {
            Check::Contains(text) => {
                ensure!(out.text.contains(text.as_str()), "{name}: missing {text:?} in\n{}", out.text)
            }
            Check::NotContains(text) => {
                ensure!(!out.text.contains(text.as_str()), "{name}: unexpected {text:?} in\n{}", out.text)
            }
            Check::Count(n, text) => {
                let found = out.text.matches(text.as_str()).count();
                ensure!(found == *n, "{name}: {found} × {text:?}, expected {n} in\n{}", out.text)
            }
            Check::Blocks(n) => {
                let found = out.after.block_count();
                ensure!(found == *n, "{name}: {found} blocks, expected {n} in\n{}", out.text)
            }
        }
    }
    if fixture.equiv {
        check_equivalent(&out.before, &out.after).with_context(|| format!("{name} changed behavior"))?;
    }
    Ok(out)
}
