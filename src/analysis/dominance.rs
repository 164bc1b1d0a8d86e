//! Dominator tree of a shader's control-flow graph.
//!
//! A block `d` **dominates** a block `n` if every path from the entry to `n`
//! passes through `d`. The **immediate dominator** of `n` is the closest strict
//! dominator; linking every block to its immediate dominator forms the
//! dominator tree rooted at the entry.
//!
//! # Algorithm
//!
//! The tree is computed with the iterative scheme of Cooper, Harvey and
//! Kennedy: blocks are visited in reverse post-order and each immediate
//! dominator is refined by intersecting the dominator paths of the already
//! processed predecessors until nothing changes. Shader CFGs are small and
//! reducible, so this converges in two or three sweeps and is simpler than
//! Lengauer-Tarjan while producing the same tree.
//!
//! Blocks unreachable from the entry have no immediate dominator and are
//! dominated by nothing but themselves.

use crate::{
    analysis::{Analysis, AnalysisKind, DependencyMask},
    ir::{BlockId, InstrId, Shader},
};

const UNVISITED: usize = usize::MAX;

/// Dominator tree and reverse post-order of a shader.
///
/// # Examples
///
/// ```rust
/// use shadeopt::{analysis::Dominance, ir::{Builder, Cursor, Shader, ShaderStage}};
///
/// let mut shader = Shader::new("diamond", ShaderStage::Fragment);
/// let entry = shader.entry();
/// let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
/// let cond = b.imm_bool(true);
/// let blocks = b.push_if(cond);
///
/// let dom = shader.require::<Dominance>();
/// assert!(dom.dominates(entry, blocks.merge_block));
/// assert!(!dom.dominates(blocks.then_block, blocks.merge_block));
/// assert_eq!(dom.immediate_dominator(blocks.merge_block), Some(entry));
/// ```
#[derive(Debug, Clone)]
pub struct Dominance {
    entry: BlockId,
    /// Immediate dominator per block index; the entry maps to itself.
    idom: Vec<Option<BlockId>>,
    /// Reachable blocks in reverse post-order.
    rpo: Vec<BlockId>,
    /// Position of each block in `rpo`, [`UNVISITED`] when unreachable.
    rpo_index: Vec<usize>,
    children: Vec<Vec<BlockId>>,
}

impl Analysis for Dominance {
    const KIND: AnalysisKind = AnalysisKind::Dominance;
    const DEPENDENCIES: DependencyMask = DependencyMask::BLOCKS;

    fn compute(shader: &mut Shader) -> Self {
        Dominance::build(shader)
    }
}

impl Dominance {
    /// Computes the dominator tree without going through the metadata cache.
    #[must_use]
    pub fn build(shader: &Shader) -> Self {
        let n = shader.block_capacity();
        let entry = shader.entry();
        let rpo = reverse_postorder(shader);
        let mut rpo_index = vec![UNVISITED; n];
        for (i, b) in rpo.iter().enumerate() {
            rpo_index[b.index()] = i;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        idom[entry.index()] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in shader.predecessors(block) {
                    if idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_index, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block.index()] != new_idom {
                    idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children = vec![Vec::new(); n];
        for &block in rpo.iter().skip(1) {
            if let Some(parent) = idom[block.index()] {
                children[parent.index()].push(block);
            }
        }

        Dominance {
            entry,
            idom,
            rpo,
            rpo_index,
            children,
        }
    }

    /// Entry block (root of the tree).
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Whether `block` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_index
            .get(block.index())
            .is_some_and(|&i| i != UNVISITED)
    }

    /// Immediate dominator, or `None` for the entry and unreachable blocks.
    #[must_use]
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            None
        } else {
            self.idom.get(block.index()).copied().flatten()
        }
    }

    /// Whether `a` dominates `b`. A block dominates itself.
    ///
    /// # Complexity
    ///
    /// O(depth of `b` in the tree).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        while let Some(parent) = self.immediate_dominator(current) {
            if parent == a {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Whether `a` dominates `b` and differs from it.
    #[must_use]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Dominators of `block` from the block itself up to the entry.
    pub fn dominators(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::successors(Some(block), move |&b| self.immediate_dominator(b))
    }

    /// Depth in the dominator tree; the entry has depth 0.
    #[must_use]
    pub fn depth(&self, block: BlockId) -> usize {
        self.dominators(block).count() - 1
    }

    /// Blocks immediately dominated by `block`, in reverse post-order.
    #[must_use]
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        &self.children[block.index()]
    }

    /// Reachable blocks in reverse post-order.
    #[must_use]
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Whether instruction `a` executes before `b` on every path reaching `b`.
    ///
    /// Within a block this is program order; across blocks it is block
    /// dominance. An instruction does not dominate itself.
    #[must_use]
    pub fn instr_dominates(&self, shader: &Shader, a: InstrId, b: InstrId) -> bool {
        let (ba, bb) = (shader.instr(a).block(), shader.instr(b).block());
        if ba == bb {
            shader.position(a) < shader.position(b)
        } else {
            self.strictly_dominates(ba, bb)
        }
    }
}

fn intersect(idom: &[Option<BlockId>], rpo_index: &[usize], a: BlockId, b: BlockId) -> BlockId {
    let (mut a, mut b) = (a, b);
    while a != b {
        while rpo_index[a.index()] > rpo_index[b.index()] {
            a = idom[a.index()].unwrap_or(a);
        }
        while rpo_index[b.index()] > rpo_index[a.index()] {
            b = idom[b.index()].unwrap_or(b);
        }
    }
    a
}

/// Reachable blocks of `shader` in reverse post-order (iterative DFS).
#[must_use]
pub fn reverse_postorder(shader: &Shader) -> Vec<BlockId> {
    let mut visited = vec![false; shader.block_capacity()];
    let mut postorder = Vec::new();
    let entry = shader.entry();
    let mut stack = vec![(entry, shader.successors(entry), 0usize)];
    visited[entry.index()] = true;

    while let Some((block, succs, next)) = stack.last_mut() {
        if let Some(&succ) = succs.get(*next) {
            *next += 1;
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                let succ_succs = shader.successors(succ);
                stack.push((succ, succ_succs, 0));
            }
        } else {
            postorder.push(*block);
            stack.pop();
        }
    }

    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Cursor, ShaderStage, Terminator};

    #[test]
    fn test_diamond() {
        let mut shader = Shader::new("diamond", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let c = b.imm_bool(false);
        let ifb = b.push_if(c);

        let dom = Dominance::build(&shader);
        assert_eq!(dom.immediate_dominator(ifb.then_block), Some(entry));
        assert_eq!(dom.immediate_dominator(ifb.else_block), Some(entry));
        assert_eq!(dom.immediate_dominator(ifb.merge_block), Some(entry));
        assert!(!dom.dominates(ifb.then_block, ifb.merge_block));
        assert_eq!(dom.reverse_postorder()[0], entry);
        assert_eq!(*dom.reverse_postorder().last().unwrap(), ifb.merge_block);
        assert_eq!(dom.children(entry).len(), 3);
        assert_eq!(dom.depth(ifb.merge_block), 1);
    }

    #[test]
    fn test_loop() {
        let mut shader = Shader::new("loop", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let l = b.push_loop();
        let c = b.imm_bool(true);
        b.loop_exit_if(&l, c);

        let dom = Dominance::build(&shader);
        assert!(dom.dominates(l.header, l.body));
        assert!(dom.dominates(l.header, l.exit));
        assert!(!dom.dominates(l.body, l.header));
        assert_eq!(
            dom.dominators(l.body).collect::<Vec<_>>(),
            vec![l.body, l.header, entry]
        );
    }

    #[test]
    fn test_unreachable_block() {
        let mut shader = Shader::new("dead", ShaderStage::Fragment);
        let entry = shader.entry();
        let orphan = shader.create_block();
        let exit = shader.create_block();
        shader.set_terminator(entry, Terminator::Jump(exit));
        shader.set_terminator(orphan, Terminator::Jump(exit));

        let dom = shader.require::<Dominance>();
        assert!(!dom.is_reachable(orphan));
        assert_eq!(dom.immediate_dominator(orphan), None);
        assert_eq!(dom.immediate_dominator(exit), Some(entry));
        assert!(!dom.dominates(entry, orphan));
        assert!(dom.dominates(orphan, orphan));
    }
}
