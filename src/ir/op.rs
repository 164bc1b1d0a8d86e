//! Opcode tables.
//!
//! Opcodes are closed enums dispatched with exhaustive `match`. Each ALU op
//! describes its arity, operand sizes and operand types; each intrinsic its
//! source count and whether it produces a value or has side effects.
//!
//! # Operand sizes
//!
//! An input or output size of `0` means the operand is *per-component*: it has
//! as many components as the instruction's destination and is read through the
//! operand swizzle one lane at a time. A non-zero size names a fixed width, as
//! for the dot products (`fdot3` reads three components of each source and
//! produces a scalar) or the vector constructors (`vec4` reads one component of
//! each of four sources).

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Base type of an ALU operand or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AluType {
    /// IEEE float of the operand's bit size.
    Float,
    /// Two's complement signed integer.
    Int,
    /// Unsigned integer or raw bits.
    Uint,
    /// 1-bit boolean.
    Bool,
    /// Untyped; the bits are passed through.
    Any,
}

impl AluType {
    /// Whether source modifiers (`-`, `|..|`) have a meaning for this type.
    #[must_use]
    pub const fn accepts_modifiers(self) -> bool {
        matches!(self, AluType::Float | AluType::Int)
    }
}

/// ALU opcodes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum AluOp {
    /// Untyped copy.
    Mov,
    /// Builds a 2-vector from two scalars.
    Vec2,
    /// Builds a 3-vector from three scalars.
    Vec3,
    /// Builds a 4-vector from four scalars.
    Vec4,

    /// Float negation.
    Fneg,
    /// Float absolute value.
    Fabs,
    /// Float addition.
    Fadd,
    /// Float multiplication.
    Fmul,
    /// Fused multiply-add `a * b + c`.
    Ffma,
    /// Float reciprocal.
    Frcp,
    /// Float minimum.
    Fmin,
    /// Float maximum.
    Fmax,
    /// Two-component dot product.
    Fdot2,
    /// Three-component dot product.
    Fdot3,
    /// Four-component dot product.
    Fdot4,
    /// Ordered float equality.
    Feq,
    /// Unordered float inequality.
    Fneu,
    /// Ordered float less-than.
    Flt,
    /// Ordered float greater-or-equal.
    Fge,

    /// Integer negation.
    Ineg,
    /// Integer absolute value.
    Iabs,
    /// Integer addition.
    Iadd,
    /// Integer subtraction.
    Isub,
    /// Low half of an integer product.
    Imul,
    /// High half of a signed product.
    ImulHigh,
    /// High half of an unsigned product.
    UmulHigh,
    /// Carry out of an unsigned addition (`1` or `0`).
    UaddCarry,
    /// Bitwise and.
    Iand,
    /// Bitwise or.
    Ior,
    /// Bitwise exclusive or.
    Ixor,
    /// Bitwise not.
    Inot,
    /// Shift left.
    Ishl,
    /// Arithmetic shift right.
    Ishr,
    /// Logical shift right.
    Ushr,
    /// Integer equality.
    Ieq,
    /// Integer inequality.
    Ine,
    /// Signed less-than.
    Ilt,
    /// Signed greater-or-equal.
    Ige,
    /// Unsigned less-than.
    Ult,
    /// Signed minimum.
    Imin,
    /// Signed maximum.
    Imax,
    /// Unsigned minimum.
    Umin,
    /// Unsigned maximum.
    Umax,

    /// `cond ? a : b`, per component.
    Bcsel,
    /// Boolean to float (`1.0` / `0.0`).
    B2f,
    /// Boolean to integer (`1` / `0`).
    B2i,
    /// Unsigned width conversion.
    U2u,
    /// Signed width conversion.
    I2i,

    /// Bit reversal.
    BitfieldReverse,
    /// Population count, always a 32-bit result.
    BitCount,

    /// Arc tangent.
    Atan,
    /// Two-argument arc tangent `atan2(y, x)`.
    Atan2,

    /// Integer multiply-accumulate into the implicit accumulator register.
    Mac,
    /// Systolic matrix multiply-accumulate.
    Dpas,
}

use AluType::{Any, Bool, Float, Int, Uint};

impl AluOp {
    /// Number of operands.
    #[must_use]
    pub const fn num_inputs(self) -> usize {
        match self {
            AluOp::Mov
            | AluOp::Fneg
            | AluOp::Fabs
            | AluOp::Frcp
            | AluOp::Ineg
            | AluOp::Iabs
            | AluOp::Inot
            | AluOp::B2f
            | AluOp::B2i
            | AluOp::U2u
            | AluOp::I2i
            | AluOp::BitfieldReverse
            | AluOp::BitCount
            | AluOp::Atan => 1,
            AluOp::Vec3 | AluOp::Ffma | AluOp::Bcsel | AluOp::Dpas => 3,
            AluOp::Vec4 => 4,
            _ => 2,
        }
    }

    /// Fixed width of input `i`, or `0` for a per-component input.
    #[must_use]
    pub const fn input_size(self, _i: usize) -> u8 {
        match self {
            AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 => 1,
            AluOp::Fdot2 => 2,
            AluOp::Fdot3 => 3,
            AluOp::Fdot4 => 4,
            _ => 0,
        }
    }

    /// Fixed width of the result, or `0` for a per-component result.
    #[must_use]
    pub const fn output_size(self) -> u8 {
        match self {
            AluOp::Vec2 => 2,
            AluOp::Vec3 => 3,
            AluOp::Vec4 => 4,
            AluOp::Fdot2 | AluOp::Fdot3 | AluOp::Fdot4 => 1,
            _ => 0,
        }
    }

    /// Base type of input `i`.
    #[must_use]
    pub const fn input_type(self, i: usize) -> AluType {
        match self {
            AluOp::Mov | AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 => Any,
            AluOp::Fneg
            | AluOp::Fabs
            | AluOp::Fadd
            | AluOp::Fmul
            | AluOp::Ffma
            | AluOp::Frcp
            | AluOp::Fmin
            | AluOp::Fmax
            | AluOp::Fdot2
            | AluOp::Fdot3
            | AluOp::Fdot4
            | AluOp::Feq
            | AluOp::Fneu
            | AluOp::Flt
            | AluOp::Fge
            | AluOp::Atan
            | AluOp::Atan2
            | AluOp::Dpas => Float,
            AluOp::Ineg
            | AluOp::Iabs
            | AluOp::Iadd
            | AluOp::Isub
            | AluOp::Imul
            | AluOp::ImulHigh
            | AluOp::Ieq
            | AluOp::Ine
            | AluOp::Ilt
            | AluOp::Ige
            | AluOp::Imin
            | AluOp::Imax
            | AluOp::I2i
            | AluOp::Mac => Int,
            AluOp::Ishr => {
                if i == 0 {
                    Int
                } else {
                    Uint
                }
            }
            AluOp::UmulHigh
            | AluOp::UaddCarry
            | AluOp::Iand
            | AluOp::Ior
            | AluOp::Ixor
            | AluOp::Inot
            | AluOp::Ishl
            | AluOp::Ushr
            | AluOp::Ult
            | AluOp::Umin
            | AluOp::Umax
            | AluOp::U2u
            | AluOp::BitfieldReverse
            | AluOp::BitCount => Uint,
            AluOp::Bcsel => {
                if i == 0 {
                    Bool
                } else {
                    Any
                }
            }
            AluOp::B2f | AluOp::B2i => Bool,
        }
    }

    /// Base type of the result.
    #[must_use]
    pub const fn output_type(self) -> AluType {
        match self {
            AluOp::Feq
            | AluOp::Fneu
            | AluOp::Flt
            | AluOp::Fge
            | AluOp::Ieq
            | AluOp::Ine
            | AluOp::Ilt
            | AluOp::Ige
            | AluOp::Ult => Bool,
            AluOp::B2f => Float,
            AluOp::B2i => Int,
            AluOp::Mov | AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 | AluOp::Bcsel => Any,
            op => op.input_type(0),
        }
    }

    /// Comparison producing a 1-bit boolean.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self.output_type(), Bool)
    }

    /// Vector constructor (`vec2`..`vec4`).
    #[must_use]
    pub const fn is_vec(self) -> bool {
        matches!(self, AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4)
    }

    /// Shift whose second operand is a 32-bit shift count.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, AluOp::Ishl | AluOp::Ishr | AluOp::Ushr)
    }

    /// Width conversion whose result size is chosen by the builder.
    #[must_use]
    pub const fn is_conversion(self) -> bool {
        matches!(self, AluOp::B2f | AluOp::B2i | AluOp::U2u | AluOp::I2i)
    }

    /// Reads the accumulator register without naming it as an operand.
    #[must_use]
    pub const fn reads_accumulator_implicitly(self) -> bool {
        matches!(self, AluOp::Mac)
    }

    /// Vector constructor for `n` components, if one exists.
    #[must_use]
    pub const fn vec(n: usize) -> Option<AluOp> {
        match n {
            1 => Some(AluOp::Mov),
            2 => Some(AluOp::Vec2),
            3 => Some(AluOp::Vec3),
            4 => Some(AluOp::Vec4),
            _ => None,
        }
    }
}

/// Shader intrinsics: I/O, memory and image access.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Intrinsic {
    /// `load_input(offset)`
    LoadInput,
    /// `load_per_vertex_input(vertex, offset)`
    LoadPerVertexInput,
    /// `load_per_primitive_input(offset)`
    LoadPerPrimitiveInput,
    /// `load_interpolated_input(offset)`
    LoadInterpolatedInput,
    /// `load_output(offset)`: reads back a previously written output
    LoadOutput,
    /// `load_per_vertex_output(vertex, offset)`
    LoadPerVertexOutput,
    /// `store_output(value, offset)`
    StoreOutput,
    /// `store_per_vertex_output(value, vertex, offset)`
    StorePerVertexOutput,
    /// `store_per_primitive_output(value, offset)`
    StorePerPrimitiveOutput,
    /// `load_ssbo(buffer, offset)`
    LoadSsbo,
    /// `store_ssbo(value, buffer, offset)`
    StoreSsbo,
    /// `ssbo_atomic(buffer, offset, data)`
    SsboAtomic,
    /// `image_load(image, coord)`
    ImageLoad,
    /// `image_store(image, coord, data)`
    ImageStore,
    /// `image_atomic(image, coord, data)`
    ImageAtomic,
    /// `image_size(image)`: a query, does not read texels
    ImageSize,
}

impl Intrinsic {
    /// Number of sources.
    #[must_use]
    pub const fn num_srcs(self) -> usize {
        match self {
            Intrinsic::LoadInput
            | Intrinsic::LoadPerPrimitiveInput
            | Intrinsic::LoadInterpolatedInput
            | Intrinsic::LoadOutput
            | Intrinsic::ImageSize => 1,
            Intrinsic::LoadPerVertexInput
            | Intrinsic::LoadPerVertexOutput
            | Intrinsic::StoreOutput
            | Intrinsic::StorePerPrimitiveOutput
            | Intrinsic::LoadSsbo
            | Intrinsic::ImageLoad => 2,
            Intrinsic::StorePerVertexOutput
            | Intrinsic::StoreSsbo
            | Intrinsic::SsboAtomic
            | Intrinsic::ImageStore
            | Intrinsic::ImageAtomic => 3,
        }
    }

    /// Whether the intrinsic produces a value.
    #[must_use]
    pub const fn has_dest(self) -> bool {
        !self.is_store()
    }

    /// Writes an output or memory.
    #[must_use]
    pub const fn is_store(self) -> bool {
        matches!(
            self,
            Intrinsic::StoreOutput
                | Intrinsic::StorePerVertexOutput
                | Intrinsic::StorePerPrimitiveOutput
                | Intrinsic::StoreSsbo
                | Intrinsic::ImageStore
        )
    }

    /// Has an effect beyond its result and must not be removed when unused.
    #[must_use]
    pub const fn has_side_effects(self) -> bool {
        self.is_store() || matches!(self, Intrinsic::SsboAtomic | Intrinsic::ImageAtomic)
    }

    /// Writes a stage output.
    #[must_use]
    pub const fn is_output_store(self) -> bool {
        matches!(
            self,
            Intrinsic::StoreOutput
                | Intrinsic::StorePerVertexOutput
                | Intrinsic::StorePerPrimitiveOutput
        )
    }

    /// Reads a stage input.
    #[must_use]
    pub const fn is_input_load(self) -> bool {
        matches!(
            self,
            Intrinsic::LoadInput
                | Intrinsic::LoadPerVertexInput
                | Intrinsic::LoadPerPrimitiveInput
                | Intrinsic::LoadInterpolatedInput
        )
    }

    /// Reads back a stage output.
    #[must_use]
    pub const fn is_output_load(self) -> bool {
        matches!(self, Intrinsic::LoadOutput | Intrinsic::LoadPerVertexOutput)
    }

    /// Reads a storage buffer.
    #[must_use]
    pub const fn is_ssbo_read(self) -> bool {
        matches!(self, Intrinsic::LoadSsbo | Intrinsic::SsboAtomic)
    }

    /// Reads image texels.
    #[must_use]
    pub const fn is_image_read(self) -> bool {
        matches!(self, Intrinsic::ImageLoad | Intrinsic::ImageAtomic)
    }

    /// Writes memory that a later read could observe.
    #[must_use]
    pub const fn is_memory_store(self) -> bool {
        matches!(
            self,
            Intrinsic::StoreSsbo | Intrinsic::SsboAtomic | Intrinsic::ImageStore | Intrinsic::ImageAtomic
        )
    }

    /// Index of the stored value for store intrinsics.
    #[must_use]
    pub const fn stored_value_src(self) -> Option<usize> {
        if self.is_store() {
            Some(0)
        } else {
            None
        }
    }
}
