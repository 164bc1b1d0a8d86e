//! Insertion points.

use crate::ir::{BlockId, InstrId};

/// Where the next instruction is inserted.
///
/// Phis always stay at the top of their block: `BlockStart` means "after the
/// last phi", so ordinary instructions inserted there never land between phis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Immediately before an instruction.
    Before(InstrId),
    /// Immediately after an instruction.
    After(InstrId),
    /// After the phis of a block.
    BlockStart(BlockId),
    /// After the last instruction of a block, before its terminator.
    BlockEnd(BlockId),
}

impl Cursor {
    /// Cursor to use after `inserted` was placed at `self`, so consecutive
    /// insertions come out in program order.
    #[must_use]
    pub const fn advance(self, inserted: InstrId) -> Cursor {
        match self {
            Cursor::Before(_) | Cursor::BlockEnd(_) => self,
            Cursor::After(_) | Cursor::BlockStart(_) => Cursor::After(inserted),
        }
    }
}
