//! Conditional-branch folding on fixtures.

use anyhow::Result;
use simplicfg::simplify::Rule;
use simplicfg_tests::check_fixture;

#[test]
fn test_diamond_becomes_select() -> Result<()> {
    let out = check_fixture("diamond_select")?;
    assert_eq!(out.after.block_count(), 1);
    Ok(())
}

#[test]
fn test_cheap_arm_is_speculated() -> Result<()> {
    let out = check_fixture("speculate_arm")?;
    assert_eq!(out.stats.rules.count(Rule::Speculation), 1);
    Ok(())
}

#[test]
fn test_shared_destination_combines_conditions() -> Result<()> {
    let out = check_fixture("common_dest")?;
    assert_eq!(out.stats.rules.count(Rule::CommonDestination), 1);
    Ok(())
}

#[test]
fn test_branch_on_constant_phi_is_threaded() -> Result<()> {
    let out = check_fixture("branch_on_phi")?;
    assert!(out.stats.rules.count(Rule::BranchOnPhi) >= 1);
    assert!(out.after.block_by_name("join").is_none());
    Ok(())
}

#[test]
fn test_equality_or_chain_becomes_switch() -> Result<()> {
    let out = check_fixture("compare_chain")?;
    assert_eq!(out.stats.rules.count(Rule::CompareChainToSwitch), 1);
    Ok(())
}

#[test]
fn test_empty_branch_block_joins_predecessor_branch() -> Result<()> {
    let out = check_fixture("branch_merge")?;
    assert_eq!(out.stats.rules.count(Rule::CondBranchToCondBranch), 1);
    assert!(out.after.block_by_name("mid").is_none());
    Ok(())
}
