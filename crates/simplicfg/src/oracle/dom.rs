//! Dominator oracle.
//!
//! The simplifier never queries dominance for its own decisions; it only
//! keeps an attached oracle in sync. After every rule firing the driver hands
//! the oracle one batch of edge updates, inserts before deletes.
//!
//! [`DominatorTree`] is a straightforward implementation: it mirrors the
//! edge set and recomputes immediate dominators after each batch with the
//! Cooper–Harvey–Kennedy iterative algorithm. It panics on an update that
//! does not match its edge set, which is how rule bugs surface in tests.

use crate::ir::{BlockId, Function};
use std::collections::{BTreeSet, HashMap};

/// Kind of edge change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Insert,
    Delete,
}

/// One CFG edge change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomUpdate {
    pub kind: UpdateKind,
    pub from: BlockId,
    pub to: BlockId,
}

/// Capability interface of a dominator analysis kept alive across rewrites.
pub trait DomOracle {
    /// Applies one batch of edge updates.
    fn apply_updates(&mut self, updates: &[DomUpdate]);

    /// Whether every path from the entry to `b` passes through `a`.
    fn dominates(&self, a: BlockId, b: BlockId) -> bool;
}

/// Incrementally updated dominator tree over a function's edge set.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BlockId,
    edges: BTreeSet<(BlockId, BlockId)>,
    idom: HashMap<BlockId, BlockId>,
    /// Number of batches applied.
    batches: usize,
}

impl DominatorTree {
    pub fn new(func: &Function) -> Self {
        let mut tree = DominatorTree {
            entry: func.entry(),
            edges: edge_set(func),
            idom: HashMap::new(),
            batches: 0,
        };
        tree.recompute();
        tree
    }

    /// Immediate dominator of a reachable non-entry block.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        if b == self.entry {
            return None;
        }
        self.idom.get(&b).copied()
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.idom.contains_key(&b)
    }

    pub fn batches_applied(&self) -> usize {
        self.batches
    }

    /// Whether the tree's edge set equals the function's.
    pub fn matches(&self, func: &Function) -> bool {
        self.edges == edge_set(func)
    }

    /// Immediate dominators recomputed from scratch would equal ours.
    pub fn is_consistent_with(&self, func: &Function) -> bool {
        let fresh = DominatorTree::new(func);
        fresh.edges == self.edges && fresh.idom == self.idom
    }

    fn recompute(&mut self) {
        let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &(a, b) in &self.edges {
            succs.entry(a).or_default().push(b);
            preds.entry(b).or_default().push(a);
        }

        // Reverse postorder from the entry.
        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![(self.entry, 0usize)];
        visited.insert(self.entry);
        while let Some((b, idx)) = stack.pop() {
            let next = succs.get(&b).and_then(|s| s.get(idx)).copied();
            match next {
                Some(s) => {
                    stack.push((b, idx + 1));
                    if visited.insert(s) {
                        stack.push((s, 0));
                    }
                }
                None => order.push(b),
            }
        }
        order.reverse();
        let rpo: HashMap<BlockId, usize> = order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(self.entry, self.entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &b in order.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in preds.get(&b).map(Vec::as_slice).unwrap_or(&[]) {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &rpo, p, cur),
                    });
                }
                if let Some(n) = new_idom {
                    if idom.get(&b) != Some(&n) {
                        idom.insert(b, n);
                        changed = true;
                    }
                }
            }
        }
        self.idom = idom;
    }
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    rpo: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo[&a] > rpo[&b] {
            a = idom[&a];
        }
        while rpo[&b] > rpo[&a] {
            b = idom[&b];
        }
    }
    a
}

fn edge_set(func: &Function) -> BTreeSet<(BlockId, BlockId)> {
    func.layout()
        .iter()
        .flat_map(|&b| func.succs(b).into_iter().map(move |s| (b, s)))
        .collect()
}

impl DomOracle for DominatorTree {
    fn apply_updates(&mut self, updates: &[DomUpdate]) {
        for u in updates {
            match u.kind {
                UpdateKind::Insert => assert!(
                    self.edges.insert((u.from, u.to)),
                    "dominator update inserts existing edge {} -> {}",
                    u.from,
                    u.to
                ),
                UpdateKind::Delete => assert!(
                    self.edges.remove(&(u.from, u.to)),
                    "dominator update deletes unknown edge {} -> {}",
                    u.from,
                    u.to
                ),
            }
        }
        self.batches += 1;
        self.recompute();
    }

    fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        // Unreachable blocks are dominated by everything.
        if !self.idom.contains_key(&b) {
            return true;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            if cur == self.entry {
                return false;
            }
            cur = self.idom[&cur];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_function;

    const DIAMOND: &str = "
func @f(i1 %c) -> void {
entry:
  br %c, label %a, label %b
a:
  br label %join
b:
  br label %join
join:
  ret void
}
";

    fn ids(f: &Function) -> [BlockId; 4] {
        ["entry", "a", "b", "join"].map(|n| f.block_by_name(n).unwrap())
    }

    #[test]
    fn diamond_idoms() {
        let f = parse_function(DIAMOND).unwrap();
        let [entry, a, b, join] = ids(&f);
        let dt = DominatorTree::new(&f);
        assert_eq!(dt.idom(a), Some(entry));
        assert_eq!(dt.idom(join), Some(entry));
        assert!(dt.dominates(entry, b));
        assert!(!dt.dominates(a, join));
    }

    #[test]
    fn updates_track_edge_changes() {
        let mut f = parse_function(DIAMOND).unwrap();
        let [entry, a, _, join] = ids(&f);
        let mut dt = DominatorTree::new(&f);
        f.set_terminator(entry, crate::ir::Terminator::Br { target: a });
        let updates = f.take_dom_updates();
        dt.apply_updates(&updates);
        assert!(dt.matches(&f));
        assert_eq!(dt.idom(join), Some(a));
        assert!(dt.is_consistent_with(&f));
    }

    #[test]
    #[should_panic(expected = "deletes unknown edge")]
    fn deleting_unknown_edge_panics() {
        let f = parse_function(DIAMOND).unwrap();
        let [_, a, b, _] = ids(&f);
        let mut dt = DominatorTree::new(&f);
        dt.apply_updates(&[DomUpdate {
            kind: UpdateKind::Delete,
            from: a,
            to: b,
        }]);
    }

    #[test]
    #[should_panic(expected = "inserts existing edge")]
    fn inserting_existing_edge_panics() {
        let f = parse_function(DIAMOND).unwrap();
        let [entry, a, _, _] = ids(&f);
        let mut dt = DominatorTree::new(&f);
        dt.apply_updates(&[DomUpdate {
            kind: UpdateKind::Insert,
            from: entry,
            to: a,
        }]);
    }
}
