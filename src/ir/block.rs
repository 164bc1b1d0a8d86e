//! Basic blocks and terminators.

use crate::ir::{BlockId, InstrId, ValueId};

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminator {
    /// Unconditional jump.
    Jump(BlockId),
    /// Two-way branch on a 1-bit value.
    Branch {
        /// Condition value; recorded as a [`Use::Branch`](crate::ir::Use::Branch).
        cond: ValueId,
        /// Target when the condition is true.
        then_block: BlockId,
        /// Target when the condition is false.
        else_block: BlockId,
    },
    /// Leaves the shader.
    Return,
}

impl Terminator {
    /// Successor blocks in edge order (a branch to the same block twice yields it twice).
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            Terminator::Jump(target) => vec![target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Terminator::Return => Vec::new(),
        }
    }

    /// Branch condition, if any.
    #[must_use]
    pub const fn condition(&self) -> Option<ValueId> {
        match self {
            Terminator::Branch { cond, .. } => Some(*cond),
            _ => None,
        }
    }

    /// Same terminator with every edge to `from` redirected to `to`.
    #[must_use]
    pub fn retarget(self, from: BlockId, to: BlockId) -> Terminator {
        let fix = |b: BlockId| if b == from { to } else { b };
        match self {
            Terminator::Jump(t) => Terminator::Jump(fix(t)),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => Terminator::Branch {
                cond,
                then_block: fix(then_block),
                else_block: fix(else_block),
            },
            Terminator::Return => Terminator::Return,
        }
    }
}

/// A basic block: phis, then ordinary instructions, then a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) instrs: Vec<InstrId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) terminator: Terminator,
    pub(crate) live: bool,
}

impl Block {
    pub(crate) fn new(id: BlockId) -> Self {
        Block {
            id,
            instrs: Vec::new(),
            preds: Vec::new(),
            terminator: Terminator::Return,
            live: true,
        }
    }

    /// Block id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Instructions in execution order.
    #[must_use]
    pub fn instrs(&self) -> &[InstrId] {
        &self.instrs
    }

    /// Predecessors, one entry per incoming edge.
    #[must_use]
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    /// The terminator.
    #[must_use]
    pub const fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// Successors, one entry per outgoing edge.
    #[must_use]
    pub fn succs(&self) -> Vec<BlockId> {
        self.terminator.successors()
    }

    /// Whether the block is still part of its shader.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}
