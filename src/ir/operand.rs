//! Instruction operands: SSA values or raw registers, plus source modifiers.
//!
//! An [`Operand`] names where a source comes from ([`Src`]) and how it is
//! read: a 16-lane [`Swizzle`] selecting components of the source value, and
//! the `negate`/`abs` modifiers that only have a meaning on typed (float or
//! signed integer) inputs.
//!
//! # Modifier algebra
//!
//! Copy propagation folds a move into its users by composing the user's
//! operand (the *outer* one) with the move's operand (the *inner* one):
//!
//! - `swizzle[i] = inner.swizzle[outer.swizzle[i]]`
//! - `abs = outer.abs | inner.abs`
//! - `negate = outer.negate` when the outer operand takes the absolute value
//!   (the inner sign is discarded), `outer.negate ^ inner.negate` otherwise.

use std::fmt;

use strum::Display;

use crate::ir::ValueId;

/// Maximum number of components a value may have.
pub const MAX_COMPONENTS: usize = 16;

/// Component selection of an operand.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle(pub [u8; MAX_COMPONENTS]);

impl Swizzle {
    /// `xyzw...`: lane `i` reads component `i`.
    pub const IDENTITY: Swizzle = Swizzle([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);

    /// Every lane reads component `c`.
    #[must_use]
    pub const fn splat(c: u8) -> Self {
        Swizzle([c; MAX_COMPONENTS])
    }

    /// Swizzle from explicit lanes; lanes past `lanes.len()` repeat the last entry.
    ///
    /// # Panics
    ///
    /// Panics if `lanes` is empty or longer than [`MAX_COMPONENTS`].
    #[must_use]
    pub fn from_lanes(lanes: &[u8]) -> Self {
        assert!(
            !lanes.is_empty() && lanes.len() <= MAX_COMPONENTS,
            "swizzle needs 1..={MAX_COMPONENTS} lanes"
        );
        let last = lanes[lanes.len() - 1];
        let mut out = [last; MAX_COMPONENTS];
        out[..lanes.len()].copy_from_slice(lanes);
        Swizzle(out)
    }

    /// Component read by lane `lane`.
    #[must_use]
    pub const fn lane(&self, lane: usize) -> u8 {
        self.0[lane]
    }

    /// `self` applied on top of `inner`: lane `i` reads `inner[self[i]]`.
    #[must_use]
    pub fn compose(&self, inner: &Swizzle) -> Swizzle {
        let mut out = [0u8; MAX_COMPONENTS];
        for (slot, &sel) in out.iter_mut().zip(&self.0) {
            *slot = inner.0[sel as usize];
        }
        Swizzle(out)
    }

    /// Whether the first `n` lanes read components `0..n` in order.
    #[must_use]
    pub fn is_identity(&self, n: usize) -> bool {
        self.0[..n].iter().enumerate().all(|(i, &c)| c as usize == i)
    }

    /// Mask of the components read by the first `n` lanes.
    #[must_use]
    pub fn read_mask(&self, n: usize) -> u32 {
        self.0[..n].iter().fold(0, |m, &c| m | (1 << c))
    }
}

impl Default for Swizzle {
    fn default() -> Self {
        Swizzle::IDENTITY
    }
}

impl fmt::Debug for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", swizzle_letters(self, MAX_COMPONENTS))
    }
}

/// Renders the first `n` lanes (`xyzw`, then `efghijklmnop` for 16-wide values).
#[must_use]
pub fn swizzle_letters(swizzle: &Swizzle, n: usize) -> String {
    const LETTERS: &[u8; MAX_COMPONENTS] = b"xyzwefghijklmnop";
    swizzle.0[..n]
        .iter()
        .map(|&c| LETTERS[c as usize % MAX_COMPONENTS] as char)
        .collect()
}

/// Register file of a raw register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RegFile {
    /// Virtual general register, allocated per shader.
    Vgrf,
    /// Address register.
    Address,
    /// Accumulator.
    Accumulator,
    /// Flag register.
    Flag,
    /// Fixed hardware register outside the general file.
    Fixed,
}

impl RegFile {
    /// Architecture register whose reads block load materialization.
    #[must_use]
    pub const fn blocks_materialization(self) -> bool {
        matches!(self, RegFile::Address | RegFile::Accumulator | RegFile::Flag)
    }
}

/// Reference to a region of a raw register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegRef {
    /// Register file.
    pub file: RegFile,
    /// Register number within the file.
    pub nr: u32,
    /// Byte offset into the register allocation.
    pub offset: u32,
    /// Element stride in units of the element type (`0` broadcasts one element).
    pub stride: u8,
    /// Element type width in bits.
    pub type_bits: u8,
}

impl RegRef {
    /// Contiguous VGRF region starting at byte 0.
    #[must_use]
    pub const fn vgrf(nr: u32, type_bits: u8) -> Self {
        RegRef {
            file: RegFile::Vgrf,
            nr,
            offset: 0,
            stride: 1,
            type_bits,
        }
    }

    /// Same register at `offset` bytes.
    #[must_use]
    pub const fn at_offset(self, offset: u32) -> Self {
        RegRef { offset, ..self }
    }

    /// Element size in bytes.
    #[must_use]
    pub const fn type_bytes(&self) -> u32 {
        (self.type_bits as u32).div_ceil(8)
    }

    /// Whether this names VGRF `nr`.
    #[must_use]
    pub fn is_vgrf(&self, nr: u32) -> bool {
        self.file == RegFile::Vgrf && self.nr == nr
    }
}

impl fmt::Display for RegRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.file {
            RegFile::Vgrf => "r",
            RegFile::Address => "a",
            RegFile::Accumulator => "acc",
            RegFile::Flag => "f",
            RegFile::Fixed => "g",
        };
        write!(f, "{prefix}{}+{}", self.nr, self.offset)?;
        if self.stride != 1 {
            write!(f, "<{}>", self.stride)?;
        }
        write!(f, ":{}", self.type_bits)
    }
}

/// Where an operand's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Src {
    /// An SSA value; the operand is recorded in the value's use set.
    Value(ValueId),
    /// A raw register, not tracked by use sets.
    Reg(RegRef),
}

/// A source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    /// Source of the data.
    pub src: Src,
    /// Component selection.
    pub swizzle: Swizzle,
    /// Negate after taking the absolute value.
    pub negate: bool,
    /// Take the absolute value.
    pub abs: bool,
}

impl Operand {
    /// Plain read of `value` with the identity swizzle.
    #[must_use]
    pub const fn value(value: ValueId) -> Self {
        Operand {
            src: Src::Value(value),
            swizzle: Swizzle::IDENTITY,
            negate: false,
            abs: false,
        }
    }

    /// Plain read of a raw register.
    #[must_use]
    pub const fn reg(reg: RegRef) -> Self {
        Operand {
            src: Src::Reg(reg),
            swizzle: Swizzle::IDENTITY,
            negate: false,
            abs: false,
        }
    }

    /// Replaces the swizzle.
    #[must_use]
    pub fn swizzled(mut self, lanes: &[u8]) -> Self {
        self.swizzle = Swizzle::from_lanes(lanes);
        self
    }

    /// Toggles negation.
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Sets the absolute-value modifier.
    #[must_use]
    pub const fn absolute(mut self) -> Self {
        self.abs = true;
        self
    }

    /// The SSA value read, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<ValueId> {
        match self.src {
            Src::Value(v) => Some(v),
            Src::Reg(_) => None,
        }
    }

    /// The raw register read, if any.
    #[must_use]
    pub const fn as_reg(&self) -> Option<&RegRef> {
        match &self.src {
            Src::Reg(r) => Some(r),
            Src::Value(_) => None,
        }
    }

    /// Whether the operand has a negate or abs modifier.
    #[must_use]
    pub const fn has_modifiers(&self) -> bool {
        self.negate || self.abs
    }

    /// Same source, swizzle and modifiers on the first `n` lanes.
    #[must_use]
    pub fn equal_over(&self, other: &Operand, n: usize) -> bool {
        self.src == other.src
            && self.negate == other.negate
            && self.abs == other.abs
            && self.swizzle.0[..n] == other.swizzle.0[..n]
    }

    /// Folds `self` (reading the result of a move) onto the move's own operand.
    #[must_use]
    pub fn compose(&self, inner: &Operand) -> Operand {
        Operand {
            src: inner.src,
            swizzle: self.swizzle.compose(&inner.swizzle),
            abs: self.abs || inner.abs,
            negate: if self.abs {
                self.negate
            } else {
                self.negate ^ inner.negate
            },
        }
    }

    /// Writes the operand reading `n` lanes, e.g. `-|ssa_2.yx|`.
    pub fn write_lanes(&self, f: &mut impl fmt::Write, n: usize) -> fmt::Result {
        if self.negate {
            f.write_char('-')?;
        }
        if self.abs {
            f.write_char('|')?;
        }
        match &self.src {
            Src::Value(v) => write!(f, "{v}.{}", swizzle_letters(&self.swizzle, n))?,
            Src::Reg(r) => write!(f, "{r}")?,
        }
        if self.abs {
            f.write_char('|')?;
        }
        Ok(())
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Operand::value(value)
    }
}
