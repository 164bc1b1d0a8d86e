//! Arena handles for values, instructions and blocks.
//!
//! Every entity of a [`Shader`](crate::ir::Shader) lives in an index arena owned
//! by the shader. Ids are plain indices: they carry no semantic information,
//! are unique within one shader, and are never reused after the entity is
//! removed (removed slots are tombstoned), so a stale id can be detected
//! instead of silently aliasing a newer entity.

use std::fmt;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from an arena index.
            ///
            /// # Panics
            ///
            /// Panics if `index` does not fit in 32 bits.
            #[must_use]
            pub fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect(concat!(stringify!($name), " arena overflow")))
            }

            pub(crate) const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the arena index.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Handle of an SSA value (`ssa_N`).
    ValueId,
    "ssa_"
);

arena_id!(
    /// Handle of an instruction (`iN`).
    InstrId,
    "i"
);

arena_id!(
    /// Handle of a basic block (`block_N`).
    BlockId,
    "block_"
);
