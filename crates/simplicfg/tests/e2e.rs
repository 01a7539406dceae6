//! End-to-end integration tests for simplicfg.
//!
//! These tests run the complete pipeline: text → Function → simplified
//! Function → text, and compare observable behavior before and after with
//! the reference interpreter.

use anyhow::{Context, Result};
use simplicfg::interp::{execute, Outcome};
use simplicfg::ir::{Constant, Type};
use simplicfg::{parse_function, simplify_text, Function, SimplifyOptions};

/// Simplifies `source` with default options and reparses the result.
fn simplify_src(source: &str) -> Result<(Function, String)> {
    let (text, _) = simplify_text(source, &SimplifyOptions::default())?;
    let func = parse_function(&text).context("simplified output does not parse")?;
    Ok((func, text))
}

/// Asserts both functions return the same value for every `i32` argument
/// in `inputs`.
fn assert_same_results(before: &str, after: &Function, inputs: impl IntoIterator<Item = i64>) -> Result<()> {
    let before = parse_function(before)?;
    for x in inputs {
        let args = [Constant::new(Type::I32, x)];
        let want = execute(&before, &args, 1000)?;
        let got = execute(after, &args, 1000)?;
        assert_eq!(got.outcome, want.outcome, "x = {x}");
        assert_eq!(got.calls, want.calls, "x = {x}");
        assert_eq!(got.memory, want.memory, "x = {x}");
    }
    Ok(())
}

#[test]
fn test_constant_branch() -> Result<()> {
    let src = "
func @f() -> i32 {
entry:
  br true, label %a, label %b
a:
  ret i32 1
b:
  ret i32 2
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(func.block_count(), 1);
    assert!(text.contains("ret i32 1"));
    assert!(!text.contains("ret i32 2"));
    Ok(())
}

#[test]
fn test_diamond_becomes_select() -> Result<()> {
    let src = "
func @f(i32 %x) -> i32 {
entry:
  %c = icmp slt i32 %x, 10
  br %c, label %a, label %b
a:
  br label %join
b:
  br label %join
join:
  %p = phi i32 [ 10, %a ], [ 20, %b ]
  ret i32 %p
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(func.block_count(), 1);
    assert!(text.contains("select"));
    assert_same_results(src, &func, -2..14)
}

#[test]
fn test_switch_becomes_lookup_table() -> Result<()> {
    let src = "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [ 0, label %a  1, label %b  2, label %c  3, label %e ]
a:
  br label %join
b:
  br label %join
c:
  br label %join
e:
  br label %join
d:
  br label %join
join:
  %p = phi i32 [ 7, %a ], [ 13, %b ], [ 2, %c ], [ 40, %e ], [ 0, %d ]
  ret i32 %p
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert!(!text.contains("switch i32"));
    assert_same_results(src, &func, -3..8)
}

#[test]
fn test_arithmetic_switch_needs_no_table() -> Result<()> {
    let cases: String = (0..10).map(|i| format!("  {i}, label %c{i}")).collect();
    let arms: String = (0..10).map(|i| format!("c{i}:\n  br label %join\n")).collect();
    let incoming: Vec<String> = (0..10).map(|i| format!("[ {}, %c{i} ]", 2 * i)).collect();
    let src = format!(
        "func @f(i32 %x) -> i32 {{\nentry:\n  switch i32 %x, label %d [{cases} ]\n{arms}d:\n  br label %join\njoin:\n  %p = phi i32 {}, [ -1, %d ]\n  ret i32 %p\n}}\n",
        incoming.join(", ")
    );
    let (func, text) = simplify_src(&src)?;

    println!("Simplified:\n{}", text);

    assert!(!text.contains("switch i32"));
    assert!(func.tables.is_empty());
    assert!(!text.contains("tableload"));
    assert_same_results(&src, &func, -2..12)
}

//   entry: x == 1 ? ret 10 : next
//   next:  x == 2 ? ret 20 : ret 4
#[test]
fn test_chained_equalities_keep_their_results() -> Result<()> {
    let src = "
func @f(i32 %x) -> i32 {
entry:
  %is1 = icmp eq i32 %x, 1
  br %is1, label %r10, label %next
next:
  %is2 = icmp eq i32 %x, 2
  br %is2, label %r20, label %r4
r10:
  ret i32 10
r20:
  ret i32 20
r4:
  ret i32 4
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_same_results(src, &func, [0, 1, 2, 3, -1])?;
    for (x, want) in [(0, 4), (1, 10), (2, 20), (3, 4), (-1, 4)] {
        let run = execute(&func, &[Constant::new(Type::I32, x)], 1000)?;
        assert_eq!(run.outcome, Outcome::Returned(Some(Constant::new(Type::I32, want))), "x = {x}");
    }
    Ok(())
}

#[test]
fn test_two_case_switch_becomes_selects() -> Result<()> {
    let src = "
func @f(i32 %x) -> i32 {
entry:
  switch i32 %x, label %c [ 5, label %a  7, label %b ]
a:
  br label %join
b:
  br label %join
c:
  br label %join
join:
  %p = phi i32 [ 100, %a ], [ 200, %b ], [ 300, %c ]
  ret i32 %p
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert!(!text.contains("switch i32"));
    assert_eq!(text.matches(" = select ").count(), 2);
    for (x, want) in [(5, 100), (7, 200), (9, 300)] {
        let run = execute(&func, &[Constant::new(Type::I32, x)], 1000)?;
        assert_eq!(run.outcome, Outcome::Returned(Some(Constant::new(Type::I32, want))), "x = {x}");
    }
    assert_same_results(src, &func, 4..10)
}

#[test]
fn test_identical_calls_are_hoisted() -> Result<()> {
    let src = "
func @f(i32 %x) -> void {
entry:
  %c = icmp eq i32 %x, 0
  br %c, label %a, label %b
a:
  call void @log(i32 %x)
  call void @left()
  ret void
b:
  call void @log(i32 %x)
  call void @right()
  ret void
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(text.matches("call void @log").count(), 1);
    assert_same_results(src, &func, -1..2)
}

#[test]
fn test_common_tail_is_sunk() -> Result<()> {
    let src = "
func @f(i32 %x) -> void {
entry:
  %c = icmp ugt i32 %x, 4
  br %c, label %a, label %b
a:
  call void @left()
  store i32 %x, 64
  br label %join
b:
  call void @right()
  store i32 %x, 64
  br label %join
join:
  ret void
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(text.matches("store i32").count(), 1);
    assert_same_results(src, &func, 0..8)
}

#[test]
fn test_unreachable_code_is_removed() -> Result<()> {
    let src = "
func @f(i32 %x) -> i32 {
entry:
  ret i32 %x
orphan:
  call void @never()
  br label %loop
loop:
  br label %orphan
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(func.block_count(), 1);
    assert!(!text.contains("@never"));
    Ok(())
}

#[test]
fn test_entry_return_survives_dead_return_block() -> Result<()> {
    let src = "
func @f(i32 %x) -> i32 {
entry:
  ret i32 3
dead:
  br label %tail
tail:
  ret i32 %x
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(func.block_count(), 1);
    assert!(!text.contains("phi"));
    assert_same_results(src, &func, -2..3)
}

#[test]
fn test_unreachable_arm_is_dropped() -> Result<()> {
    let src = "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %trap
a:
  ret i32 5
trap:
  unreachable
}
";
    let (func, text) = simplify_src(src)?;

    println!("Simplified:\n{}", text);

    assert_eq!(func.block_count(), 1);
    let run = execute(&func, &[Constant::bool(true)], 100)?;
    assert_eq!(run.outcome, Outcome::Returned(Some(Constant::new(Type::I32, 5))));
    Ok(())
}

#[test]
fn test_malformed_input_is_reported() {
    let err = simplify_text("func @f( -> {", &SimplifyOptions::default()).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse function"), "{err:#}");
}

#[test]
fn test_phi_missing_an_edge_is_rejected() {
    let src = "
func @f(i1 %c) -> i32 {
entry:
  br %c, label %a, label %join
a:
  br label %join
join:
  %p = phi i32 [ 1, %a ]
  ret i32 %p
}
";
    let err = simplify_text(src, &SimplifyOptions::default()).unwrap_err();
    assert!(format!("{err:#}").contains("IR invariant violated"), "{err:#}");
}
