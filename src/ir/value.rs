//! SSA values and their use sets.

use std::collections::BTreeSet;

use crate::ir::{BlockId, InstrId, ValueId};

/// A place that reads a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Use {
    /// Operand `slot` of `instr`.
    Src {
        /// The reading instruction.
        instr: InstrId,
        /// Operand index.
        slot: u16,
    },
    /// Branch condition of a block's terminator.
    Branch(BlockId),
}

impl Use {
    /// Operand use.
    ///
    /// # Panics
    ///
    /// Panics if `slot` does not fit in 16 bits.
    #[must_use]
    pub fn src(instr: InstrId, slot: usize) -> Self {
        Use::Src {
            instr,
            slot: u16::try_from(slot).expect("operand slot overflow"),
        }
    }

    /// The reading instruction, if this is an operand use.
    #[must_use]
    pub const fn instr(&self) -> Option<InstrId> {
        match self {
            Use::Src { instr, .. } => Some(*instr),
            Use::Branch(_) => None,
        }
    }
}

/// An SSA value: produced once, read by the uses in its use set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub(crate) id: ValueId,
    pub(crate) bit_size: u8,
    pub(crate) num_components: u8,
    pub(crate) parent: Option<InstrId>,
    pub(crate) uses: BTreeSet<Use>,
    pub(crate) live: bool,
}

impl Value {
    pub(crate) fn new(id: ValueId, bit_size: u8, num_components: u8) -> Self {
        Value {
            id,
            bit_size,
            num_components,
            parent: None,
            uses: BTreeSet::new(),
            live: true,
        }
    }

    /// Value id.
    #[must_use]
    pub const fn id(&self) -> ValueId {
        self.id
    }

    /// Width of each component in bits.
    #[must_use]
    pub const fn bit_size(&self) -> u8 {
        self.bit_size
    }

    /// Number of components.
    #[must_use]
    pub const fn num_components(&self) -> u8 {
        self.num_components
    }

    /// Instruction producing the value, once inserted.
    #[must_use]
    pub const fn parent(&self) -> Option<InstrId> {
        self.parent
    }

    /// Whether the value is still part of its shader.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }

    /// All uses, in a deterministic order.
    pub fn uses(&self) -> impl Iterator<Item = Use> + '_ {
        self.uses.iter().copied()
    }

    /// Number of uses.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    /// Whether anything reads the value.
    #[must_use]
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }

    /// The only use, if there is exactly one.
    #[must_use]
    pub fn single_use(&self) -> Option<Use> {
        let mut iter = self.uses.iter();
        match (iter.next(), iter.next()) {
            (Some(u), None) => Some(*u),
            _ => None,
        }
    }

    /// Whether the value is used by anything other than operands of `instr`.
    #[must_use]
    pub fn used_outside(&self, instr: InstrId) -> bool {
        self.uses.iter().any(|u| u.instr() != Some(instr))
    }
}
